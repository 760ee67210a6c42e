//! Succinct bit vector with optional rank/select support.
//!
//! The payload words and the rank/select auxiliaries live in one owning
//! struct, so moving or deserializing the vector never leaves the
//! auxiliaries pointing at stale storage. Read-only after construction.

use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::persist;

/// Words per rank block (512 bits).
const BLOCK_WORDS: usize = 8;

/// A packed bit array supporting `get`, and `rank1`/`select1` when enabled.
///
/// `rank1(i)` counts 1-bits in `[0, i)`. `select1(k)` returns the position of
/// the k-th 1-bit, 0-indexed. Rank is O(1) plus a bounded word scan; select
/// binary-searches the rank blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitVec {
    words: Vec<u64>,
    len: usize,
    // Cumulative 1-bit counts: blocks[i] = ones in words[..i * BLOCK_WORDS].
    blocks: Vec<u64>,
    use_rank: bool,
    use_select: bool,
}

impl BitVec {
    /// Build from a boolean sequence.
    pub fn from_bools(bits: &[bool], use_rank: bool, use_select: bool) -> Self {
        let mut words = vec![0u64; bits.len().div_ceil(64)];
        for (i, &b) in bits.iter().enumerate() {
            if b {
                words[i >> 6] |= 1u64 << (i & 63);
            }
        }
        Self::from_words(words, bits.len(), use_rank, use_select)
    }

    /// Build from pre-packed words holding `len` bits.
    pub fn from_words(mut words: Vec<u64>, len: usize, use_rank: bool, use_select: bool) -> Self {
        assert!(words.len() == len.div_ceil(64));
        // Trailing bits beyond `len` must be clear for popcounts.
        if len % 64 != 0 {
            if let Some(last) = words.last_mut() {
                *last &= (1u64 << (len % 64)) - 1;
            }
        }
        let mut bv = Self {
            words,
            len,
            blocks: Vec::new(),
            use_rank,
            use_select,
        };
        if use_rank || use_select {
            bv.build_blocks();
        }
        bv
    }

    fn build_blocks(&mut self) {
        let num_blocks = self.words.len().div_ceil(BLOCK_WORDS);
        let mut blocks = Vec::with_capacity(num_blocks + 1);
        let mut acc = 0u64;
        blocks.push(0);
        for chunk in self.words.chunks(BLOCK_WORDS) {
            acc += chunk.iter().map(|w| w.count_ones() as u64).sum::<u64>();
            blocks.push(acc);
        }
        self.blocks = blocks;
    }

    /// Number of bits.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total number of 1-bits.
    pub fn num_ones(&self) -> u64 {
        match self.blocks.last() {
            Some(&n) => n,
            None => self.words.iter().map(|w| w.count_ones() as u64).sum(),
        }
    }

    /// Read bit `i`.
    #[inline]
    pub fn get(&self, i: usize) -> bool {
        debug_assert!(i < self.len);
        (self.words[i >> 6] >> (i & 63)) & 1 == 1
    }

    /// Count of 1-bits in `[0, i)`.
    #[inline]
    pub fn rank1(&self, i: usize) -> u64 {
        debug_assert!(i <= self.len);
        debug_assert!(!self.blocks.is_empty(), "rank support not built");
        let w = i >> 6;
        let mut r = self.blocks[w / BLOCK_WORDS];
        for j in (w / BLOCK_WORDS) * BLOCK_WORDS..w {
            r += self.words[j].count_ones() as u64;
        }
        let rem = i & 63;
        if rem != 0 {
            r += (self.words[w] & ((1u64 << rem) - 1)).count_ones() as u64;
        }
        r
    }

    /// Position of the k-th 1-bit (0-indexed).
    pub fn select1(&self, k: u64) -> usize {
        debug_assert!(!self.blocks.is_empty(), "select support not built");
        debug_assert!(k < self.num_ones());
        // Largest block whose cumulative count is <= k.
        let block = self.blocks.partition_point(|&c| c <= k) - 1;
        let mut rem = k - self.blocks[block];
        let mut w = block * BLOCK_WORDS;
        loop {
            let ones = self.words[w].count_ones() as u64;
            if rem < ones {
                return (w << 6) + select_in_word(self.words[w], rem as u32);
            }
            rem -= ones;
            w += 1;
        }
    }

    pub fn serialize_into<W: Write>(&self, wtr: &mut W) -> Result<()> {
        persist::write_u64(wtr, self.len as u64)?;
        persist::write_u64(wtr, self.words.len() as u64)?;
        for &w in &self.words {
            persist::write_u64(wtr, w)?;
        }
        let flags = (self.use_rank as u8) | ((self.use_select as u8) << 1);
        persist::write_u8(wtr, flags)?;
        persist::write_u64(wtr, self.blocks.len() as u64)?;
        for &b in &self.blocks {
            persist::write_u64(wtr, b)?;
        }
        Ok(())
    }

    pub fn deserialize_from<R: Read>(rdr: &mut R) -> Result<Self> {
        let len = persist::read_u64(rdr)? as usize;
        let num_words = persist::read_u64(rdr)? as usize;
        if num_words != len.div_ceil(64) {
            return Err(Error::Parse(format!(
                "bit vector length {len} does not match {num_words} words"
            )));
        }
        let mut words = Vec::with_capacity(num_words);
        for _ in 0..num_words {
            words.push(persist::read_u64(rdr)?);
        }
        let flags = persist::read_u8(rdr)?;
        let num_blocks = persist::read_u64(rdr)? as usize;
        let mut blocks = Vec::with_capacity(num_blocks);
        for _ in 0..num_blocks {
            blocks.push(persist::read_u64(rdr)?);
        }
        let bv = Self {
            words,
            len,
            blocks,
            use_rank: flags & 1 != 0,
            use_select: flags & 2 != 0,
        };
        if (bv.use_rank || bv.use_select) && bv.blocks.len() != bv.words.len().div_ceil(BLOCK_WORDS) + 1
        {
            return Err(Error::Parse("bit vector rank blocks truncated".into()));
        }
        Ok(bv)
    }
}

/// Position of the r-th set bit within `word` (0-indexed).
#[inline]
fn select_in_word(mut word: u64, mut r: u32) -> usize {
    loop {
        let tz = word.trailing_zeros();
        if r == 0 {
            return tz as usize;
        }
        word &= word - 1;
        r -= 1;
    }
}
