//! Fixed-width packed integer vector.
//!
//! Stores `len` unsigned values of `width` bits each (1..=64), packed back to
//! back over `u64` words. Backing store for key symbols, id lists, child
//! labels, and vertical code words.

use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::persist;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackedVec {
    words: Vec<u64>,
    len: usize,
    width: usize,
}

impl PackedVec {
    /// Allocate `len` zeroed values of `width` bits each.
    pub fn new(len: usize, width: usize) -> Self {
        assert!(width >= 1 && width <= 64);
        let total_bits = len * width;
        Self {
            words: vec![0u64; total_bits.div_ceil(64)],
            len,
            width,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    fn value_mask(width: usize) -> u64 {
        if width == 64 {
            u64::MAX
        } else {
            (1u64 << width) - 1
        }
    }

    /// Read value `i`.
    #[inline]
    pub fn get(&self, i: usize) -> u64 {
        debug_assert!(i < self.len);
        let bit = i * self.width;
        let w = bit >> 6;
        let off = bit & 63;
        let mask = Self::value_mask(self.width);
        if off + self.width <= 64 {
            (self.words[w] >> off) & mask
        } else {
            ((self.words[w] >> off) | (self.words[w + 1] << (64 - off))) & mask
        }
    }

    /// Write value `i`; bits above `width` are discarded.
    #[inline]
    pub fn set(&mut self, i: usize, v: u64) {
        debug_assert!(i < self.len);
        let mask = Self::value_mask(self.width);
        let v = v & mask;
        let bit = i * self.width;
        let w = bit >> 6;
        let off = bit & 63;
        self.words[w] = (self.words[w] & !(mask << off)) | (v << off);
        if off + self.width > 64 {
            let spill = 64 - off;
            self.words[w + 1] = (self.words[w + 1] & !(mask >> spill)) | (v >> spill);
        }
    }

    /// Iterate all values in order.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.len).map(move |i| self.get(i))
    }

    pub fn serialize_into<W: Write>(&self, wtr: &mut W) -> Result<()> {
        persist::write_u64(wtr, self.len as u64)?;
        persist::write_u8(wtr, self.width as u8)?;
        for &w in &self.words {
            persist::write_u64(wtr, w)?;
        }
        Ok(())
    }

    pub fn deserialize_from<R: Read>(rdr: &mut R) -> Result<Self> {
        let len = persist::read_u64(rdr)? as usize;
        let width = persist::read_u8(rdr)? as usize;
        if width == 0 || width > 64 {
            return Err(Error::Parse(format!("packed vector width {width} out of range")));
        }
        let num_words = (len * width).div_ceil(64);
        let mut words = Vec::with_capacity(num_words);
        for _ in 0..num_words {
            words.push(persist::read_u64(rdr)?);
        }
        Ok(Self { words, len, width })
    }
}
