//! # sketchdb - Embedded Exact Hamming Search over Integer Sketches
//!
//! Exact near-neighbor search for short, low-alphabet integer sketches:
//! given a query and an error budget `k`, return every stored sketch within
//! Hamming distance `k`, with the exact distance. Built for corpora of
//! millions of sketches queried thousands of times per session.
//!
//! ## Architecture
//! - Signature-probed FNV-1a hash index over the unique keys
//! - Three-layer succinct trie (implicit perfect prefix, hybrid dense/sparse
//!   middle, vertical-bitcode suffixes)
//! - Pigeonhole multi-block wrapper splitting the error budget across
//!   column-block sub-indexes, with SIMD-friendly vertical-code verification
//! - Immutable after build; lock-free concurrent queries with one searcher
//!   per thread
//! - Deterministic binary persistence for every index kind
//!
//! ## Example
//!
//! ```
//! use sketchdb::{Config, Searcher, SketchIndex, SketchSet, Stat, TrieIndex};
//!
//! let conf = Config::new(4, 2)?;
//! let keys = SketchSet::from_rows(&[[0u8, 0, 0, 0], [0, 0, 0, 1], [3, 3, 3, 3]], &conf)?;
//! let index = TrieIndex::build(keys.view(), &conf)?;
//!
//! let mut searcher = index.searcher();
//! let mut stat = Stat::default();
//! let scores = searcher.run(&[0, 0, 0, 0], 1, &mut stat)?;
//! assert_eq!(scores.len(), 2); // ids 0 and 1
//! # Ok::<(), sketchdb::Error>(())
//! ```

use std::io::{Read, Write};

pub mod bitvec;
pub mod entries;
pub mod error;
pub mod hash_index;
pub mod multi_index;
pub mod packed;
pub mod persist;
pub mod search;
pub mod siggen;
pub mod storage;
pub mod trie_index;
pub mod types;
pub mod vcode;

pub use error::{Error, Result};
pub use hash_index::HashIndex;
pub use multi_index::MultiIndex;
pub use persist::{load_index, save_index};
pub use search::{linear_search, search_batch, validate};
pub use siggen::SIG_LIMIT;
pub use storage::{convert_ascii, SketchSet, SketchView};
pub use trie_index::TrieIndex;
pub use types::{Config, RepType, Score, Stat};

/// Capability set shared by every index kind.
///
/// Indexes are built once from the full key set, are immutable afterwards,
/// and may be shared across threads; all per-query state lives in the
/// [`Searcher`] values they hand out.
pub trait SketchIndex: Sized {
    /// On-disk kind tag written next to the format header.
    const KIND: u8;

    /// Per-query scratch bound to a borrowed index.
    type Searcher<'i>: Searcher
    where
        Self: 'i;

    /// Build from a key corpus; fails on invalid configuration or zero keys.
    fn build(keys: SketchView<'_>, conf: &Config) -> Result<Self>;

    /// Create a fresh query session over this index.
    fn searcher(&self) -> Self::Searcher<'_>;

    /// Number of indexed sketches (duplicates included).
    fn num_keys(&self) -> usize;

    fn config(&self) -> &Config;

    fn serialize_into<W: Write>(&self, wtr: &mut W) -> Result<()>;

    fn deserialize_from<R: Read>(rdr: &mut R) -> Result<Self>;
}

/// A query session owning its scratch state.
///
/// One searcher must never be shared between concurrent queries; distinct
/// searchers over the same index are safe in parallel.
pub trait Searcher {
    /// Collect every `(id, errs)` within `max_errs` of `query`.
    ///
    /// The result slice borrows the searcher and is overwritten by the next
    /// call. Result order is unspecified; ids are never duplicated.
    fn run(&mut self, query: &[u8], max_errs: usize, stat: &mut Stat) -> Result<&[Score]>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use tempfile::TempDir;

    fn run_sorted<I: SketchIndex>(index: &I, q: &[u8], k: usize) -> Vec<Score> {
        let mut searcher = index.searcher();
        let mut stat = Stat::default();
        let mut out = searcher.run(q, k, &mut stat).unwrap().to_vec();
        out.sort_by_key(|sc| sc.id);
        out
    }

    fn three_keys(conf: &Config) -> SketchSet {
        SketchSet::from_rows(&[[0u8, 0, 0, 0], [0, 0, 0, 1], [3, 3, 3, 3]], conf).unwrap()
    }

    #[test]
    fn test_scenario_radius_zero_and_one() {
        let conf = Config::new(4, 2).unwrap();
        let keys = three_keys(&conf);
        let hash = HashIndex::build(keys.view(), &conf).unwrap();
        let trie = TrieIndex::build(keys.view(), &conf).unwrap();

        for scores in [run_sorted(&hash, &[0, 0, 0, 0], 0), run_sorted(&trie, &[0, 0, 0, 0], 0)] {
            assert_eq!(scores, vec![Score::new(0, 0)]);
        }
        for scores in [run_sorted(&hash, &[0, 0, 0, 0], 1), run_sorted(&trie, &[0, 0, 0, 0], 1)] {
            assert_eq!(scores, vec![Score::new(0, 0), Score::new(1, 1)]);
        }
    }

    #[test]
    fn test_scenario_wide_radius() {
        let conf = Config::new(4, 2).unwrap();
        let keys = three_keys(&conf);
        let hash = HashIndex::build(keys.view(), &conf).unwrap();
        let trie = TrieIndex::build(keys.view(), &conf).unwrap();

        for scores in [run_sorted(&hash, &[3, 3, 3, 3], 2), run_sorted(&trie, &[3, 3, 3, 3], 2)] {
            assert_eq!(scores, vec![Score::new(2, 0)]);
        }
        for scores in [run_sorted(&hash, &[3, 3, 3, 3], 4), run_sorted(&trie, &[3, 3, 3, 3], 4)] {
            assert_eq!(
                scores,
                vec![Score::new(0, 4), Score::new(1, 4), Score::new(2, 0)]
            );
        }
    }

    #[test]
    fn test_scenario_duplicate_inputs() {
        let conf = Config::new(4, 2).unwrap();
        let keys =
            SketchSet::from_rows(&[[1u8, 2, 3, 0], [1, 2, 3, 0], [0, 0, 0, 0]], &conf).unwrap();
        let hash = HashIndex::build(keys.view(), &conf).unwrap();
        let trie = TrieIndex::build(keys.view(), &conf).unwrap();

        let expected = vec![Score::new(0, 0), Score::new(1, 0)];
        assert_eq!(run_sorted(&hash, &[1, 2, 3, 0], 0), expected);
        assert_eq!(run_sorted(&trie, &[1, 2, 3, 0], 0), expected);
    }

    #[test]
    fn test_scenario_multi_block_mutation() {
        let conf = Config::new(8, 2).unwrap().with_blocks(2);
        let mut rng = StdRng::seed_from_u64(42);
        let rows: Vec<[u8; 8]> = (0..128)
            .map(|_| std::array::from_fn(|_| rng.gen_range(0..4u8)))
            .collect();
        let keys = SketchSet::from_rows(&rows, &conf).unwrap();

        let mut q = keys.row(0).to_vec();
        for pos in [0usize, 3, 7] {
            q[pos] = (q[pos] + 2) & conf.mask();
        }

        let index = MultiIndex::<TrieIndex>::build(keys.view(), &conf).unwrap();
        let scores = run_sorted(&index, &q, 3);

        assert!(scores.contains(&Score::new(0, 3)));
        let mut expected = linear_search(&keys.view(), &q, 3);
        expected.sort_by_key(|sc| sc.id);
        assert_eq!(scores, expected);
    }

    #[test]
    fn test_scenario_empty_result_is_quiet() {
        let conf = Config::new(8, 2).unwrap().with_blocks(2);
        let keys = SketchSet::from_rows(&[[0u8; 8], [1u8; 8]], &conf).unwrap();
        let index = MultiIndex::<HashIndex>::build(keys.view(), &conf).unwrap();

        let mut searcher = index.searcher();
        let mut stat = Stat::default();
        let scores = searcher.run(&[2u8; 8], 2, &mut stat).unwrap();
        assert!(scores.is_empty());
    }

    #[test]
    fn test_scenario_persisted_trie_answers_identically() {
        let conf = Config::new(4, 2).unwrap();
        let keys = three_keys(&conf);
        let index = TrieIndex::build(keys.view(), &conf).unwrap();

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index.4m2b1B.trie");
        save_index(&index, &path).unwrap();
        let loaded: TrieIndex = load_index(&path).unwrap();

        for k in 0..=4 {
            assert_eq!(
                run_sorted(&loaded, &[0, 0, 0, 0], k),
                run_sorted(&index, &[0, 0, 0, 0], k)
            );
        }
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let conf = Config::new(4, 2).unwrap();
        let keys = three_keys(&conf);
        let index = HashIndex::build(keys.view(), &conf).unwrap();

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index.hash");
        save_index(&index, &path).unwrap();
        assert!(matches!(
            load_index::<TrieIndex, _>(&path),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_k_zero_identity_on_random_corpus() {
        let conf = Config::new(12, 3).unwrap();
        let mut rng = StdRng::seed_from_u64(77);
        let rows: Vec<[u8; 12]> = (0..256)
            .map(|_| std::array::from_fn(|_| rng.gen_range(0..8u8)))
            .collect();
        let keys = SketchSet::from_rows(&rows, &conf).unwrap();
        let trie = TrieIndex::build(keys.view(), &conf).unwrap();
        let hash = HashIndex::build(keys.view(), &conf).unwrap();

        for qi in (0..keys.len()).step_by(17) {
            let q = keys.row(qi);
            let expected: Vec<Score> = keys
                .iter()
                .filter(|(_, row)| *row == q)
                .map(|(id, _)| Score::new(id, 0))
                .collect();
            assert_eq!(run_sorted(&trie, q, 0), expected);
            assert_eq!(run_sorted(&hash, q, 0), expected);
        }
    }

    #[test]
    fn test_concurrent_searchers() {
        use std::sync::Arc;
        use std::thread;

        let conf = Config::new(8, 2).unwrap();
        let mut rng = StdRng::seed_from_u64(99);
        let rows: Vec<[u8; 8]> = (0..512)
            .map(|_| std::array::from_fn(|_| rng.gen_range(0..4u8)))
            .collect();
        let keys = SketchSet::from_rows(&rows, &conf).unwrap();
        let index = Arc::new(TrieIndex::build(keys.view(), &conf).unwrap());
        let keys = Arc::new(keys);

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let index = Arc::clone(&index);
                let keys = Arc::clone(&keys);
                thread::spawn(move || {
                    let mut searcher = index.searcher();
                    let mut stat = Stat::default();
                    for qi in (t..64).step_by(4) {
                        let q = keys.row(qi);
                        let got = searcher.run(q, 2, &mut stat).unwrap();
                        assert!(got.iter().any(|sc| sc.id == qi as u32 && sc.errs == 0));
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
    }
}
