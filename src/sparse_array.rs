//! Sparse array storing values at a subset of positions in a large universe.
#![cfg(target_pointer_width = "64")]

use std::io::{Read, Write};

use anyhow::{anyhow, Result};

use crate::bit_vector::BitVector;
use crate::select_index::SelectIndex;
use crate::{BitGetter, Ranker, Selector, Serializable};

/// Sparse array over a universe of `n` positions, storing one value per
/// occupied position in space proportional to the number of stored values.
///
/// Occupancy is kept in a presence bit vector and the values in a densely
/// packed list in position order. The array is built by appending values at
/// strictly increasing positions and then frozen with [`Self::finalize()`],
/// which indexes the presence bits with a [`SelectIndex`]; lookups are
/// answered by combining rank (position to dense offset) and select (dense
/// offset to position).
///
/// # Examples
///
/// ```
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use rsarray::SparseArray;
///
/// let mut sa = SparseArray::new(10);
/// sa.append("foo", 1)?;
/// sa.append("bar", 5)?;
/// sa.append("baz", 9)?;
/// sa.finalize()?;
///
/// assert_eq!(sa.get_at_rank(1), Some(&"bar"));
/// assert_eq!(sa.get_at_index(5), Some(&"bar"));
/// assert_eq!(sa.get_at_index(3), None);
/// assert_eq!(sa.get_index_of(2), Some(5));
/// assert_eq!(sa.number_of_elements_at(9), Some(3));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparseArray<T> {
    universe: usize,
    last_pos: Option<usize>,
    bits: Option<BitVector>,      // Some while building
    index: Option<SelectIndex>,   // Some once finalized
    values: Vec<T>,
}

impl<T> SparseArray<T> {
    /// Creates an empty sparse array over `universe` positions,
    /// ready for appends.
    ///
    /// # Arguments
    ///
    ///  - `universe`: Number of addressable positions.
    pub fn new(universe: usize) -> Self {
        Self {
            universe,
            last_pos: None,
            bits: Some(BitVector::from_bit(false, universe)),
            index: None,
            values: vec![],
        }
    }

    /// Appends `value` at `position`.
    ///
    /// Positions must be supplied in strictly increasing order; the array
    /// never reorders values on the caller's behalf.
    ///
    /// # Arguments
    ///
    ///  - `value`: Value stored.
    ///  - `position`: Position in the universe.
    ///
    /// # Errors
    ///
    /// An error is returned if
    ///
    ///  - `self.len() <= position`,
    ///  - `position` does not exceed the last appended position, or
    ///  - [`Self::finalize()`] has already been called.
    pub fn append(&mut self, value: T, position: usize) -> Result<()> {
        let Some(bits) = self.bits.as_mut() else {
            return Err(anyhow!("append() is not allowed after finalize()."));
        };
        if self.universe <= position {
            return Err(anyhow!(
                "position must be less than self.len()={}, but got {position}.",
                self.universe
            ));
        }
        if let Some(last) = self.last_pos {
            if position <= last {
                return Err(anyhow!(
                    "positions must be appended in increasing order, but got {position} after {last}."
                ));
            }
        }
        bits.set_bit(position, true)?;
        self.values.push(value);
        self.last_pos = Some(position);
        Ok(())
    }

    /// Ends the build phase, indexing the presence bits for rank/select
    /// queries. No further appends are accepted.
    ///
    /// # Errors
    ///
    /// An error is returned if the array is already finalized.
    pub fn finalize(&mut self) -> Result<()> {
        let Some(bits) = self.bits.take() else {
            return Err(anyhow!("finalize() has already been called."));
        };
        self.index = Some(SelectIndex::from_bit_vector(bits)?);
        Ok(())
    }

    /// Returns the `r`-th (0-indexed) stored value in position order, or
    /// [`None`] if fewer than `r + 1` values are stored.
    ///
    /// This reads the dense list only and is valid in both phases.
    ///
    /// # Arguments
    ///
    ///  - `r`: Rank of the value.
    pub fn get_at_rank(&self, r: usize) -> Option<&T> {
        self.values.get(r)
    }

    /// Returns the value stored at universe position `pos`, or [`None`] if
    /// the position is unoccupied or out of bounds.
    ///
    /// # Arguments
    ///
    ///  - `pos`: Position in the universe.
    ///
    /// # Complexity
    ///
    /// Constant
    ///
    /// # Panics
    ///
    /// It panics if [`Self::finalize()`] has not been called.
    pub fn get_at_index(&self, pos: usize) -> Option<&T> {
        let index = self.finalized_index();
        if !index.get_bit(pos)? {
            return None;
        }
        self.values.get(index.rank1(pos).unwrap())
    }

    /// Returns the universe position of the `r`-th (1-indexed) stored value,
    /// or [`None`] if `r == 0` or fewer than `r` values are stored.
    ///
    /// # Arguments
    ///
    ///  - `r`: 1-indexed rank of the value.
    ///
    /// # Complexity
    ///
    /// $`O(\lg n)`$
    ///
    /// # Panics
    ///
    /// It panics if [`Self::finalize()`] has not been called.
    pub fn get_index_of(&self, r: usize) -> Option<usize> {
        let index = self.finalized_index();
        if r == 0 || self.values.len() < r {
            return None;
        }
        // select1 lands one past the position of the r-th one.
        index.select1(r).map(|pos| pos - 1)
    }

    /// Returns the number of stored values at positions `0..=pos`
    /// (the inclusive rank), or [`None`] if `self.len() <= pos`.
    ///
    /// # Arguments
    ///
    ///  - `pos`: Position in the universe.
    ///
    /// # Complexity
    ///
    /// Constant
    ///
    /// # Panics
    ///
    /// It panics if [`Self::finalize()`] has not been called.
    pub fn number_of_elements_at(&self, pos: usize) -> Option<usize> {
        let index = self.finalized_index();
        Some(index.rank1(pos)? + usize::from(index.get_bit(pos)?))
    }

    /// Gets the universe size.
    #[inline(always)]
    pub const fn len(&self) -> usize {
        self.universe
    }

    /// Checks if the universe is empty.
    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.universe == 0
    }

    /// Gets the number of stored values.
    #[inline(always)]
    pub fn num_elements(&self) -> usize {
        self.values.len()
    }

    /// Checks if [`Self::finalize()`] has been called.
    #[inline(always)]
    pub const fn is_finalized(&self) -> bool {
        self.index.is_some()
    }

    /// Gets the reference of the select index over the presence bits, or
    /// [`None`] if the array is still building.
    pub const fn select_index(&self) -> Option<&SelectIndex> {
        self.index.as_ref()
    }

    fn finalized_index(&self) -> &SelectIndex {
        if let Some(index) = self.index.as_ref() {
            index
        } else {
            panic!("finalize() must be called before lookup queries.")
        }
    }
}

impl<T> Serializable for SparseArray<T>
where
    T: Serializable,
{
    fn serialize_into<W: Write>(&self, mut writer: W) -> Result<usize> {
        let mut mem = self.universe.serialize_into(&mut writer)?;
        mem += self.last_pos.serialize_into(&mut writer)?;
        mem += self.bits.serialize_into(&mut writer)?;
        mem += self.index.serialize_into(&mut writer)?;
        mem += self.values.serialize_into(&mut writer)?;
        Ok(mem)
    }

    fn deserialize_from<R: Read>(mut reader: R) -> Result<Self> {
        let universe = usize::deserialize_from(&mut reader)?;
        let last_pos = Option::<usize>::deserialize_from(&mut reader)?;
        let bits = Option::<BitVector>::deserialize_from(&mut reader)?;
        let index = Option::<SelectIndex>::deserialize_from(&mut reader)?;
        let values = Vec::<T>::deserialize_from(&mut reader)?;

        match (&bits, &index) {
            (Some(bv), None) => {
                if bv.len() != universe {
                    return Err(anyhow!(
                        "serialized presence bits of len={} are inconsistent with universe={universe}.",
                        bv.len()
                    ));
                }
            }
            (None, Some(ix)) => {
                if ix.len() != universe || ix.num_ones() != values.len() {
                    return Err(anyhow!(
                        "serialized index is inconsistent with universe={universe} and {} values.",
                        values.len()
                    ));
                }
            }
            _ => {
                return Err(anyhow!(
                    "serialized data must hold either presence bits or their index."
                ));
            }
        }

        Ok(Self {
            universe,
            last_pos,
            bits,
            index,
            values,
        })
    }

    fn size_in_bytes(&self) -> usize {
        self.universe.size_in_bytes()
            + self.last_pos.size_in_bytes()
            + self.bits.size_in_bytes()
            + self.index.size_in_bytes()
            + self.values.size_in_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaChaRng;

    fn build_sample() -> SparseArray<String> {
        let mut sa = SparseArray::new(100);
        sa.append("foo".to_string(), 1).unwrap();
        sa.append("bar".to_string(), 5).unwrap();
        sa.append("baz".to_string(), 9).unwrap();
        sa.finalize().unwrap();
        sa
    }

    #[test]
    fn test_lookups() {
        let sa = build_sample();
        assert_eq!(sa.len(), 100);
        assert_eq!(sa.num_elements(), 3);

        assert_eq!(sa.get_at_rank(1), Some(&"bar".to_string()));
        assert_eq!(sa.get_at_rank(3), None);

        assert_eq!(sa.get_at_index(3), None);
        assert_eq!(sa.get_at_index(5), Some(&"bar".to_string()));
        assert_eq!(sa.get_at_index(100), None);

        assert_eq!(sa.get_index_of(1), Some(1));
        assert_eq!(sa.get_index_of(3), Some(9));
        assert_eq!(sa.get_index_of(4), None);

        assert_eq!(sa.number_of_elements_at(0), Some(0));
        assert_eq!(sa.number_of_elements_at(9), Some(3));
        assert_eq!(sa.number_of_elements_at(100), None);
    }

    #[test]
    fn test_get_index_of_zero() {
        let sa = build_sample();
        assert_eq!(sa.get_index_of(0), None);
    }

    #[test]
    fn test_append_after_finalize() {
        let mut sa = build_sample();
        let e = sa.append("qux".to_string(), 11);
        assert_eq!(
            e.err().map(|x| x.to_string()),
            Some("append() is not allowed after finalize().".to_string())
        );
    }

    #[test]
    fn test_append_oob() {
        let mut sa = SparseArray::new(10);
        let e = sa.append("foo", 10);
        assert_eq!(
            e.err().map(|x| x.to_string()),
            Some("position must be less than self.len()=10, but got 10.".to_string())
        );
    }

    #[test]
    fn test_append_out_of_order() {
        let mut sa = SparseArray::new(10);
        sa.append("foo", 5).unwrap();
        let e = sa.append("bar", 5);
        assert_eq!(
            e.err().map(|x| x.to_string()),
            Some("positions must be appended in increasing order, but got 5 after 5.".to_string())
        );
    }

    #[test]
    fn test_double_finalize() {
        let mut sa = build_sample();
        let e = sa.finalize();
        assert_eq!(
            e.err().map(|x| x.to_string()),
            Some("finalize() has already been called.".to_string())
        );
    }

    #[test]
    fn test_get_at_rank_while_building() {
        let mut sa = SparseArray::new(10);
        sa.append("foo", 3).unwrap();
        assert_eq!(sa.get_at_rank(0), Some(&"foo"));
        assert!(!sa.is_finalized());
    }

    #[test]
    #[should_panic]
    fn test_get_at_index_before_finalize() {
        let mut sa = SparseArray::new(10);
        sa.append("foo", 3).unwrap();
        sa.get_at_index(3);
    }

    #[test]
    #[should_panic]
    fn test_get_index_of_before_finalize() {
        let sa = SparseArray::<String>::new(10);
        sa.get_index_of(1);
    }

    #[test]
    #[should_panic]
    fn test_number_of_elements_at_before_finalize() {
        let sa = SparseArray::<String>::new(10);
        sa.number_of_elements_at(0);
    }

    #[test]
    fn test_empty_universe() {
        let mut sa = SparseArray::<String>::new(0);
        sa.finalize().unwrap();
        assert_eq!(sa.get_at_index(0), None);
        assert_eq!(sa.get_index_of(1), None);
        assert_eq!(sa.number_of_elements_at(0), None);
    }

    #[test]
    fn test_no_appends() {
        let mut sa = SparseArray::<String>::new(50);
        sa.finalize().unwrap();
        assert_eq!(sa.get_at_index(17), None);
        assert_eq!(sa.number_of_elements_at(49), Some(0));
        assert_eq!(sa.get_index_of(1), None);
    }

    #[test]
    fn test_random_consistency() {
        let mut rng = ChaChaRng::seed_from_u64(42);
        let universe = 5000;
        let mut sa = SparseArray::new(universe);
        let mut appended = vec![];
        for pos in 0..universe {
            if rng.gen_bool(0.1) {
                let value = format!("v{pos}");
                sa.append(value.clone(), pos).unwrap();
                appended.push((value, pos));
            }
        }
        sa.finalize().unwrap();

        assert_eq!(sa.num_elements(), appended.len());
        for (r, (value, pos)) in appended.iter().enumerate() {
            assert_eq!(sa.get_index_of(r + 1), Some(*pos));
            assert_eq!(sa.get_at_index(*pos), Some(value));
            assert_eq!(sa.get_at_rank(r), Some(value));
            assert_eq!(sa.number_of_elements_at(*pos), Some(r + 1));
        }
    }

    #[test]
    fn test_serialize_finalized() {
        let mut bytes = vec![];
        let sa = build_sample();
        let size = sa.serialize_into(&mut bytes).unwrap();
        let other = SparseArray::<String>::deserialize_from(&bytes[..]).unwrap();
        assert_eq!(sa, other);
        assert_eq!(size, bytes.len());
        assert_eq!(size, sa.size_in_bytes());

        for pos in 0..other.len() {
            assert_eq!(sa.get_at_index(pos), other.get_at_index(pos));
        }
    }

    #[test]
    fn test_serialize_while_building() {
        let mut bytes = vec![];
        let mut sa = SparseArray::new(20);
        sa.append("foo".to_string(), 4).unwrap();
        let size = sa.serialize_into(&mut bytes).unwrap();
        let mut other = SparseArray::<String>::deserialize_from(&bytes[..]).unwrap();
        assert_eq!(sa, other);
        assert_eq!(size, bytes.len());

        // The reloaded array continues building where the original stopped.
        other.append("bar".to_string(), 8).unwrap();
        other.finalize().unwrap();
        assert_eq!(other.get_at_index(8), Some(&"bar".to_string()));
    }

    #[test]
    fn test_deserialize_inconsistent_universe() {
        let mut bytes = vec![];
        let sa = SparseArray::<String>::new(20);
        sa.serialize_into(&mut bytes).unwrap();
        // Corrupt the universe field.
        bytes[..8].copy_from_slice(&21usize.to_le_bytes());
        assert!(SparseArray::<String>::deserialize_from(&bytes[..]).is_err());
    }
}
