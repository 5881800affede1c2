//! Constant-time rank index over a bit vector, with two levels of
//! precomputed cumulative counts.
#![cfg(target_pointer_width = "64")]

use std::io::{Read, Write};

use anyhow::{anyhow, Result};

use crate::bit_vector::{BitVector, WORD_LEN};
use crate::compact_vector::CompactVector;
use crate::{broadword, utils, BitGetter, IntGetter, Ranker, Serializable};

/// Rank index over a bit vector, answering `rank1`/`rank0` in constant time.
///
/// The index owns the bit vector and partitions it into chunks of
/// $`\lceil \lg^2 n \rceil`$ bits and subchunks of
/// $`\lfloor \frac{\lg n}{2} \rfloor`$ bits. Cumulative counts of set bits
/// are precomputed at every chunk start (absolute) and every subchunk start
/// (relative to the enclosing chunk) into two [`CompactVector`]s whose bit
/// widths fit the largest stored count. A query then adds two table lookups
/// and a popcount over the residual subchunk prefix.
///
/// Both partition sizes are clamped to at least 1, so degenerate lengths
/// (`n < 4`, where $`\lfloor \frac{\lg n}{2} \rfloor`$ vanishes) are
/// well-defined.
///
/// The bit vector must be fully built beforehand; the index never mutates it.
///
/// # Examples
///
/// ```
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use rsarray::{RankIndex, Ranker};
///
/// let ri = RankIndex::from_bits([true, false, false, true])?;
///
/// assert_eq!(ri.len(), 4);
/// assert_eq!(ri.num_ones(), 2);
///
/// assert_eq!(ri.rank1(1), Some(1));
/// assert_eq!(ri.rank1(4), Some(2));
/// assert_eq!(ri.rank0(3), Some(2));
/// assert_eq!(ri.rank1(5), None);
/// # Ok(())
/// # }
/// ```
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct RankIndex {
    bv: BitVector,
    num_ones: usize,
    chunk_size: usize,
    num_chunks: usize,
    chunk_ranks: CompactVector,
    subchunk_size: usize,
    subchunks_per_chunk: usize,
    subchunk_ranks: CompactVector,
}

impl RankIndex {
    /// Builds the index from a finished bit vector `bv`.
    ///
    /// Two passes are taken over the bits: the first finds the largest
    /// count each table will hold, fixing the [`CompactVector`] widths;
    /// the second fills the tables. Both are linear in the length.
    ///
    /// # Errors
    ///
    /// Never in practice; construction is total for any bit vector.
    pub fn new(bv: BitVector) -> Result<Self> {
        let len = bv.len();
        let log_len = broadword::msb(len as u64).unwrap_or(0);
        let chunk_size = (log_len * log_len).max(1);
        let subchunk_size = (log_len / 2).max(1);
        let num_chunks = utils::ceiled_divide(len, chunk_size);
        let subchunks_per_chunk = utils::ceiled_divide(chunk_size, subchunk_size);

        // Sizing pass: the largest counts that will be written decide the
        // table widths.
        let mut max_chunk_rank = 0;
        let mut max_subchunk_rank = 0;
        let mut total = 0;
        let mut in_chunk = 0;
        for (pos, bit) in bv.iter().enumerate() {
            let offset = pos % chunk_size;
            if offset == 0 {
                max_chunk_rank = max_chunk_rank.max(total);
                in_chunk = 0;
            }
            if offset % subchunk_size == 0 {
                max_subchunk_rank = max_subchunk_rank.max(in_chunk);
            }
            if bit {
                total += 1;
                in_chunk += 1;
            }
        }

        let mut chunk_ranks = CompactVector::new(num_chunks, max_chunk_rank);
        let mut subchunk_ranks =
            CompactVector::new(num_chunks * subchunks_per_chunk, max_subchunk_rank);

        // Fill pass: write the count at every chunk and subchunk start.
        let mut total = 0;
        let mut in_chunk = 0;
        for (pos, bit) in bv.iter().enumerate() {
            let chunk = pos / chunk_size;
            let offset = pos % chunk_size;
            if offset == 0 {
                chunk_ranks.set_int(chunk, total)?;
                in_chunk = 0;
            }
            if offset % subchunk_size == 0 {
                subchunk_ranks
                    .set_int(chunk * subchunks_per_chunk + offset / subchunk_size, in_chunk)?;
            }
            if bit {
                total += 1;
                in_chunk += 1;
            }
        }

        Ok(Self {
            bv,
            num_ones: total,
            chunk_size,
            num_chunks,
            chunk_ranks,
            subchunk_size,
            subchunks_per_chunk,
            subchunk_ranks,
        })
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
        Self::new(BitVector::from_bits(bits))
    }

    /// Gets the reference of the indexed bit vector.
    pub const fn bit_vector(&self) -> &BitVector {
        &self.bv
    }

    /// Gets the number of bits.
    #[inline(always)]
    pub const fn len(&self) -> usize {
        self.bv.len()
    }

    /// Checks if the bit vector is empty.
    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.bv.is_empty()
    }

    /// Gets the number of bits set.
    #[inline(always)]
    pub const fn num_ones(&self) -> usize {
        self.num_ones
    }

    /// Gets the number of bits unset.
    #[inline(always)]
    pub const fn num_zeros(&self) -> usize {
        self.len() - self.num_ones
    }

    /// Gets the number of auxiliary bits held besides the bit vector itself:
    /// the packed payloads of both rank tables plus the scalar fields
    /// (length, number of ones, and the four partition parameters).
    ///
    /// This is the space-overhead metric of the index.
    pub const fn overhead_bits(&self) -> usize {
        self.chunk_ranks.size_in_bits() + self.subchunk_ranks.size_in_bits() + 6 * WORD_LEN
    }
}

impl BitGetter for RankIndex {
    /// Returns the `pos`-th bit, or [`None`] if out of bounds.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use rsarray::{BitGetter, RankIndex};
    ///
    /// let ri = RankIndex::from_bits([true, false, false])?;
    /// assert_eq!(ri.get_bit(0), Some(true));
    /// assert_eq!(ri.get_bit(1), Some(false));
    /// assert_eq!(ri.get_bit(3), None);
    /// # Ok(())
    /// # }
    /// ```
    fn get_bit(&self, pos: usize) -> Option<bool> {
        self.bv.get_bit(pos)
    }
}

impl Ranker for RankIndex {
    /// Returns the number of ones from the 0-th bit to the `pos-1`-th bit, or
    /// [`None`] if `self.len() < pos`.
    ///
    /// # Complexity
    ///
    /// Constant
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use rsarray::{RankIndex, Ranker};
    ///
    /// let ri = RankIndex::from_bits([true, false, false, true])?;
    /// assert_eq!(ri.rank1(1), Some(1));
    /// assert_eq!(ri.rank1(2), Some(1));
    /// assert_eq!(ri.rank1(3), Some(1));
    /// assert_eq!(ri.rank1(4), Some(2));
    /// assert_eq!(ri.rank1(5), None);
    /// # Ok(())
    /// # }
    /// ```
    fn rank1(&self, pos: usize) -> Option<usize> {
        if self.len() < pos {
            return None;
        }
        if pos == self.len() {
            return Some(self.num_ones);
        }
        let chunk = pos / self.chunk_size;
        let offset = pos % self.chunk_size;
        let mut r = self.chunk_ranks.get_int(chunk).unwrap()
            + self
                .subchunk_ranks
                .get_int(chunk * self.subchunks_per_chunk + offset / self.subchunk_size)
                .unwrap();
        let residual = offset % self.subchunk_size;
        if residual != 0 {
            r += broadword::popcount(self.bv.get_bits(pos - residual, residual).unwrap());
        }
        Some(r)
    }

    /// Returns the number of zeros from the 0-th bit to the `pos-1`-th bit, or
    /// [`None`] if `self.len() < pos`.
    ///
    /// # Complexity
    ///
    /// Constant
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use rsarray::{RankIndex, Ranker};
    ///
    /// let ri = RankIndex::from_bits([true, false, false, true])?;
    /// assert_eq!(ri.rank0(1), Some(0));
    /// assert_eq!(ri.rank0(4), Some(2));
    /// assert_eq!(ri.rank0(5), None);
    /// # Ok(())
    /// # }
    /// ```
    fn rank0(&self, pos: usize) -> Option<usize> {
        Some(pos - self.rank1(pos)?)
    }
}

impl Serializable for RankIndex {
    fn serialize_into<W: Write>(&self, mut writer: W) -> Result<usize> {
        let mut mem = self.bv.serialize_into(&mut writer)?;
        mem += self.num_ones.serialize_into(&mut writer)?;
        mem += self.chunk_size.serialize_into(&mut writer)?;
        mem += self.num_chunks.serialize_into(&mut writer)?;
        mem += self.chunk_ranks.serialize_into(&mut writer)?;
        mem += self.subchunk_size.serialize_into(&mut writer)?;
        mem += self.subchunks_per_chunk.serialize_into(&mut writer)?;
        mem += self.subchunk_ranks.serialize_into(&mut writer)?;
        Ok(mem)
    }

    fn deserialize_from<R: Read>(mut reader: R) -> Result<Self> {
        let bv = BitVector::deserialize_from(&mut reader)?;
        let num_ones = usize::deserialize_from(&mut reader)?;
        let chunk_size = usize::deserialize_from(&mut reader)?;
        let num_chunks = usize::deserialize_from(&mut reader)?;
        let chunk_ranks = CompactVector::deserialize_from(&mut reader)?;
        let subchunk_size = usize::deserialize_from(&mut reader)?;
        let subchunks_per_chunk = usize::deserialize_from(&mut reader)?;
        let subchunk_ranks = CompactVector::deserialize_from(&mut reader)?;

        if chunk_size == 0 || subchunk_size == 0 {
            return Err(anyhow!("serialized partition sizes must not be zero."));
        }
        if num_ones > bv.len() {
            return Err(anyhow!(
                "serialized num_ones={num_ones} exceeds the bit vector length {}.",
                bv.len()
            ));
        }
        if num_chunks != utils::ceiled_divide(bv.len(), chunk_size)
            || subchunks_per_chunk != utils::ceiled_divide(chunk_size, subchunk_size)
        {
            return Err(anyhow!(
                "serialized partition counts are inconsistent with the partition sizes."
            ));
        }
        if chunk_ranks.len() != num_chunks
            || subchunk_ranks.len() != num_chunks * subchunks_per_chunk
        {
            return Err(anyhow!(
                "serialized rank tables are inconsistent with the partition counts."
            ));
        }

        Ok(Self {
            bv,
            num_ones,
            chunk_size,
            num_chunks,
            chunk_ranks,
            subchunk_size,
            subchunks_per_chunk,
            subchunk_ranks,
        })
    }

    fn size_in_bytes(&self) -> usize {
        self.bv.size_in_bytes()
            + usize::size_of().unwrap() * 5
            + self.chunk_ranks.size_in_bytes()
            + self.subchunk_ranks.size_in_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaChaRng;

    fn gen_random_bits(len: usize, density: f64, seed: u64) -> Vec<bool> {
        let mut rng = ChaChaRng::seed_from_u64(seed);
        (0..len).map(|_| rng.gen_bool(density)).collect()
    }

    fn test_rank(bits: &[bool], ri: &RankIndex) {
        let mut cur_rank = 0;
        for i in 0..bits.len() {
            assert_eq!(ri.rank1(i), Some(cur_rank));
            assert_eq!(ri.rank0(i), Some(i - cur_rank));
            if bits[i] {
                cur_rank += 1;
            }
        }
        assert_eq!(ri.rank1(bits.len()), Some(cur_rank));
        assert_eq!(cur_rank, ri.num_ones());
    }

    #[test]
    fn test_all_set() {
        let ri = RankIndex::from_bits(vec![true; 128]).unwrap();
        assert_eq!(ri.rank1(8), Some(8));
        assert_eq!(ri.rank1(127), Some(127));
        assert_eq!(ri.rank1(128), Some(128));
    }

    #[test]
    fn test_segments() {
        // Ones at [10,30), [40,45), and [61,63) in a vector of 70 bits.
        let bits: Vec<bool> = (0..70)
            .map(|i| (10..30).contains(&i) || (40..45).contains(&i) || (61..63).contains(&i))
            .collect();
        let ri = RankIndex::from_bits(bits.iter().cloned()).unwrap();
        assert_eq!(ri.rank1(9), Some(0));
        assert_eq!(ri.rank1(25), Some(15));
        assert_eq!(ri.rank1(43), Some(23));
        test_rank(&bits, &ri);
    }

    #[test]
    fn test_all_unset_long() {
        let ri = RankIndex::from_bits(vec![false; 20000]).unwrap();
        for i in (0..20000).step_by(97) {
            assert_eq!(ri.rank1(i), Some(0));
        }
        assert_eq!(ri.rank1(19999), Some(0));
        assert_eq!(ri.num_ones(), 0);
    }

    #[test]
    fn test_tiny_lengths() {
        for len in 0..8 {
            for pattern in 0u32..1 << len {
                let bits: Vec<bool> = (0..len).map(|i| (pattern >> i) & 1 == 1).collect();
                let ri = RankIndex::from_bits(bits.iter().cloned()).unwrap();
                test_rank(&bits, &ri);
            }
        }
    }

    #[test]
    fn test_rank_oob() {
        let ri = RankIndex::from_bits([true, false, true]).unwrap();
        assert_eq!(ri.rank1(4), None);
        assert_eq!(ri.rank0(4), None);
    }

    #[test]
    fn test_random_bits() {
        for seed in 0..10 {
            for density in [0.01, 0.5, 0.99] {
                let bits = gen_random_bits(3000, density, seed);
                let ri = RankIndex::from_bits(bits.iter().cloned()).unwrap();
                test_rank(&bits, &ri);
            }
        }
    }

    #[test]
    fn test_monotonicity() {
        let bits = gen_random_bits(2000, 0.3, 42);
        let ri = RankIndex::from_bits(bits.iter().cloned()).unwrap();
        for i in 0..bits.len() {
            let (r0, r1) = (ri.rank1(i).unwrap(), ri.rank1(i + 1).unwrap());
            assert!(r0 <= r1);
            assert!(r1 - r0 <= 1);
        }
    }

    #[test]
    fn test_overhead_accounting() {
        // For 20000 zeros: chunks of 196 bits (log2 = 14), subchunks of 7,
        // 103 chunks of 28 subchunks, and both tables 1 bit wide.
        let ri = RankIndex::from_bits(vec![false; 20000]).unwrap();
        assert_eq!(ri.overhead_bits(), 103 + 103 * 28 + 6 * 64);
    }

    #[test]
    fn test_serialize() {
        let mut bytes = vec![];
        let ri = RankIndex::from_bits(gen_random_bits(10000, 0.5, 42)).unwrap();
        let size = ri.serialize_into(&mut bytes).unwrap();
        let other = RankIndex::deserialize_from(&bytes[..]).unwrap();
        assert_eq!(ri, other);
        assert_eq!(size, bytes.len());
        assert_eq!(size, ri.size_in_bytes());
    }

    #[test]
    fn test_deserialize_inconsistent_tables() {
        let mut bytes = vec![];
        let ri = RankIndex::from_bits(gen_random_bits(10000, 0.5, 42)).unwrap();
        ri.serialize_into(&mut bytes).unwrap();
        // Corrupt chunk_size, which no longer matches the serialized counts.
        let at = ri.bit_vector().size_in_bytes() + 8;
        bytes[at..at + 8].copy_from_slice(&7usize.to_le_bytes());
        assert!(RankIndex::deserialize_from(&bytes[..]).is_err());
    }
}
