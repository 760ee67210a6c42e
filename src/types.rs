//! Core type definitions for sketchdb

use crate::error::{Error, Result};

/// Maximum sketch dimension (symbols per sketch).
pub const MAX_DIM: usize = 64;

/// Maximum alphabet width in bits per symbol.
pub const MAX_BITS: usize = 8;

/// Per-level child representation policy for the trie's medium layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepType {
    /// Pick dense or sparse per level from the average fanout.
    Hybrid,
    /// Always use the dense child bitmap.
    Dht,
    /// Always use the sparse child list.
    List,
}

impl RepType {
    pub(crate) fn to_tag(self) -> u8 {
        match self {
            RepType::Hybrid => 1,
            RepType::Dht => 2,
            RepType::List => 3,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(RepType::Hybrid),
            2 => Ok(RepType::Dht),
            3 => Ok(RepType::List),
            _ => Err(Error::Parse(format!("unknown rep_type tag: {tag}"))),
        }
    }
}

/// Immutable per-index configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// Sketch dimension, 1..=64 symbols.
    pub dim: usize,
    /// Bits per symbol, 1..=8; alphabet size is `1 << bits`.
    pub bits: usize,
    /// Number of column blocks for the multi-block wrapper.
    pub blocks: usize,
    /// Suffix-collapse threshold for the trie.
    pub suf_thr: f32,
    /// Medium-layer representation policy.
    pub rep_type: RepType,
}

impl Config {
    /// Create a configuration, validating every range up front.
    pub fn new(dim: usize, bits: usize) -> Result<Self> {
        let conf = Self {
            dim,
            bits,
            ..Self::default()
        };
        conf.validate()?;
        Ok(conf)
    }

    /// Set the number of column blocks.
    pub fn with_blocks(mut self, blocks: usize) -> Self {
        self.blocks = blocks;
        self
    }

    /// Set the suffix-collapse threshold.
    pub fn with_suf_thr(mut self, suf_thr: f32) -> Self {
        self.suf_thr = suf_thr;
        self
    }

    /// Set the medium-layer representation policy.
    pub fn with_rep_type(mut self, rep_type: RepType) -> Self {
        self.rep_type = rep_type;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.dim == 0 || self.dim > MAX_DIM {
            return Err(Error::Config(format!(
                "dim must be in 1..={MAX_DIM}, got {}",
                self.dim
            )));
        }
        if self.bits == 0 || self.bits > MAX_BITS {
            return Err(Error::Config(format!(
                "bits must be in 1..={MAX_BITS}, got {}",
                self.bits
            )));
        }
        if self.blocks == 0 {
            return Err(Error::Config("blocks must be >= 1".into()));
        }
        Ok(())
    }

    /// Alphabet size `1 << bits`.
    #[inline]
    pub fn sigma(&self) -> usize {
        1 << self.bits
    }

    /// Per-symbol mask `sigma - 1`.
    #[inline]
    pub fn mask(&self) -> u8 {
        ((1usize << self.bits) - 1) as u8
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dim: 32,
            bits: 2,
            blocks: 1,
            suf_thr: 2.0,
            rep_type: RepType::Hybrid,
        }
    }
}

/// A single query answer: the stored sketch's id and its exact Hamming distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    pub id: u32,
    pub errs: u32,
}

impl Score {
    pub fn new(id: u32, errs: u32) -> Self {
        Self { id, errs }
    }
}

/// Query-side instrumentation, accumulated across queries sharing the object.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stat {
    /// Candidates handed to the verification step.
    pub num_cands: u64,
    /// Reserved; never written by the current query paths.
    pub num_actnodes: u64,
}

/// Number of bits needed to store values below `n`; `bit_width(n) >= 1`.
#[inline]
pub(crate) fn bit_width(n: usize) -> usize {
    debug_assert!(n > 0);
    (usize::BITS - n.leading_zeros()) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_ranges() {
        assert!(Config::new(32, 2).is_ok());
        assert!(Config::new(64, 8).is_ok());
        assert!(Config::new(0, 2).is_err());
        assert!(Config::new(65, 2).is_err());
        assert!(Config::new(32, 0).is_err());
        assert!(Config::new(32, 9).is_err());
    }

    #[test]
    fn test_sigma_and_mask() {
        let conf = Config::new(4, 2).unwrap();
        assert_eq!(conf.sigma(), 4);
        assert_eq!(conf.mask(), 3);

        let conf = Config::new(4, 8).unwrap();
        assert_eq!(conf.sigma(), 256);
        assert_eq!(conf.mask(), 255);
    }

    #[test]
    fn test_bit_width() {
        assert_eq!(bit_width(1), 1);
        assert_eq!(bit_width(2), 2);
        assert_eq!(bit_width(3), 2);
        assert_eq!(bit_width(1000), 10);
    }
}
