//! Logarithmic-time select queries layered on the rank index.
#![cfg(target_pointer_width = "64")]

use std::io::{Read, Write};

use anyhow::Result;

use crate::bit_vector::BitVector;
use crate::rank_index::RankIndex;
use crate::{BitGetter, Ranker, Selector, Serializable};

/// Select index over a bit vector, wrapping a [`RankIndex`] with no
/// additional state.
///
/// `select1(k)` returns the smallest position `pos` such that
/// `rank1(pos) >= k`, located by binary search over the monotone rank
/// function; each probe is a constant-time rank query, so a select costs
/// $`O(\lg n)`$. Since rank grows by at most 1 per position, the answer is
/// exactly the leftmost position whose exclusive rank equals `k` whenever
/// `k` does not exceed the number of ones. The bit at the returned position
/// need not be set: the result is the generalized inverse of the rank step
/// function.
///
/// # Examples
///
/// ```
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use rsarray::{Ranker, SelectIndex, Selector};
///
/// let si = SelectIndex::from_bits([true, false, false, true])?;
///
/// assert_eq!(si.select1(0), Some(0));
/// assert_eq!(si.select1(1), Some(1));
/// assert_eq!(si.select1(2), Some(4));
/// assert_eq!(si.select1(3), None);
///
/// assert_eq!(si.rank1(si.select1(2).unwrap()), Some(2));
/// # Ok(())
/// # }
/// ```
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct SelectIndex {
    index: RankIndex,
}

impl SelectIndex {
    /// Creates the select view over a built rank index.
    pub fn new(index: RankIndex) -> Self {
        Self { index }
    }

    /// Builds the index from a finished bit vector `bv`.
    pub fn from_bit_vector(bv: BitVector) -> Result<Self> {
        Ok(Self::new(RankIndex::new(bv)?))
    }

    /// Builds the index from input bit stream `bits`.
    ///
    /// # Arguments
    ///
    /// - `bits`: Bit stream.
    pub fn from_bits<I>(bits: I) -> Result<Self>
    where
        I: IntoIterator<Item = bool>,
    {
        Self::from_bit_vector(BitVector::from_bits(bits))
    }

    /// Gets the reference of the wrapped rank index.
    pub const fn rank_index(&self) -> &RankIndex {
        &self.index
    }

    /// Gets the number of bits.
    #[inline(always)]
    pub const fn len(&self) -> usize {
        self.index.len()
    }

    /// Checks if the bit vector is empty.
    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Gets the number of bits set.
    #[inline(always)]
    pub const fn num_ones(&self) -> usize {
        self.index.num_ones()
    }

    /// Gets the number of bits unset.
    #[inline(always)]
    pub const fn num_zeros(&self) -> usize {
        self.index.num_zeros()
    }

    /// Gets the number of auxiliary bits held besides the bit vector itself
    /// (just wrapping [`RankIndex::overhead_bits()`]; select adds no state).
    pub const fn overhead_bits(&self) -> usize {
        self.index.overhead_bits()
    }

    /// Searches the boundary of a monotone predicate over `[0, n]`:
    /// the smallest position whose image under `rank` reaches `k`.
    fn binsearch<F>(&self, k: usize, rank: F) -> usize
    where
        F: Fn(usize) -> usize,
    {
        let (mut left, mut right) = (0, self.len());
        while left < right {
            let center = left + (right - left) / 2;
            if rank(center) < k {
                left = center + 1;
            } else {
                right = center;
            }
        }
        left
    }
}

impl BitGetter for SelectIndex {
    /// Returns the `pos`-th bit, or [`None`] if out of bounds.
    fn get_bit(&self, pos: usize) -> Option<bool> {
        self.index.get_bit(pos)
    }
}

impl Ranker for SelectIndex {
    /// Returns the number of ones from the 0-th bit to the `pos-1`-th bit, or
    /// [`None`] if `self.len() < pos` (just wrapping the rank index).
    ///
    /// # Complexity
    ///
    /// Constant
    fn rank1(&self, pos: usize) -> Option<usize> {
        self.index.rank1(pos)
    }

    /// Returns the number of zeros from the 0-th bit to the `pos-1`-th bit, or
    /// [`None`] if `self.len() < pos` (just wrapping the rank index).
    ///
    /// # Complexity
    ///
    /// Constant
    fn rank0(&self, pos: usize) -> Option<usize> {
        self.index.rank0(pos)
    }
}

impl Selector for SelectIndex {
    /// Returns the smallest position `pos` in `[0, n]` such that
    /// `self.rank1(pos) >= k`, or [`None`] if `self.num_ones() < k`.
    ///
    /// `select1(0) == Some(0)` always: the empty prefix has rank 0.
    ///
    /// # Complexity
    ///
    /// $`O(\lg n)`$
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use rsarray::{SelectIndex, Selector};
    ///
    /// let si = SelectIndex::from_bits([false, true, true, false])?;
    /// assert_eq!(si.select1(1), Some(2));
    /// assert_eq!(si.select1(2), Some(3));
    /// assert_eq!(si.select1(3), None);
    /// # Ok(())
    /// # }
    /// ```
    fn select1(&self, k: usize) -> Option<usize> {
        if self.num_ones() < k {
            return None;
        }
        Some(self.binsearch(k, |pos| self.index.rank1(pos).unwrap()))
    }

    /// Returns the smallest position `pos` in `[0, n]` such that
    /// `self.rank0(pos) >= k`, or [`None`] if `self.num_zeros() < k`.
    ///
    /// # Complexity
    ///
    /// $`O(\lg n)`$
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use rsarray::{SelectIndex, Selector};
    ///
    /// let si = SelectIndex::from_bits([false, true, true, false])?;
    /// assert_eq!(si.select0(1), Some(1));
    /// assert_eq!(si.select0(2), Some(4));
    /// assert_eq!(si.select0(3), None);
    /// # Ok(())
    /// # }
    /// ```
    fn select0(&self, k: usize) -> Option<usize> {
        if self.num_zeros() < k {
            return None;
        }
        Some(self.binsearch(k, |pos| self.index.rank0(pos).unwrap()))
    }
}

impl Serializable for SelectIndex {
    fn serialize_into<W: Write>(&self, writer: W) -> Result<usize> {
        self.index.serialize_into(writer)
    }

    fn deserialize_from<R: Read>(reader: R) -> Result<Self> {
        RankIndex::deserialize_from(reader).map(Self::new)
    }

    fn size_in_bytes(&self) -> usize {
        self.index.size_in_bytes()
    }
}
