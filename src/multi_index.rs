//! Multi-block index
//!
//! Splits the sketch columns into `B` contiguous blocks and builds one
//! sub-index per block. A query hands each block a share of the error budget
//! derived from the generalized pigeonhole principle: any sketch within
//! distance `k` of the query matches at least one block within that block's
//! share. Surviving candidates are verified against full-width vertical
//! codes with an early-exit Hamming check.

use std::io::{Read, Write};

use tracing::debug;

use crate::error::{Error, Result};
use crate::packed::PackedVec;
use crate::persist;
use crate::storage::SketchView;
use crate::types::{Config, Score, Stat, MAX_BITS, MAX_DIM};
use crate::vcode::{hamdist_vertical, to_vertical};
use crate::{Searcher, SketchIndex};

/// Pigeonhole wrapper over `B >= 2` per-block sub-indexes.
#[derive(Debug)]
pub struct MultiIndex<I> {
    conf: Config,
    dims: Vec<usize>,
    indexes: Vec<I>,
    vert_codes: PackedVec,
}

impl<I: SketchIndex> MultiIndex<I> {
    /// Number of column blocks.
    pub fn num_blocks(&self) -> usize {
        self.conf.blocks
    }
}

impl<I: SketchIndex> SketchIndex for MultiIndex<I> {
    const KIND: u8 = 0x80 | I::KIND;
    type Searcher<'i> = MultiSearcher<'i, I> where Self: 'i;

    fn build(keys: SketchView<'_>, conf: &Config) -> Result<Self> {
        conf.validate()?;
        if conf.blocks < 2 {
            return Err(Error::Config(format!(
                "multi-block index needs blocks >= 2, got {}",
                conf.blocks
            )));
        }
        if keys.is_empty() {
            return Err(Error::Config("cannot build an index over zero keys".into()));
        }

        let blocks = conf.blocks;
        let mut dims = Vec::with_capacity(blocks);
        let mut indexes = Vec::with_capacity(blocks);

        let mut dim_beg = 0usize;
        for b in 0..blocks {
            let sub_dim = (conf.dim + b) / blocks;
            let sub_conf = Config {
                dim: sub_dim,
                ..*conf
            };
            indexes.push(I::build(keys.columns(dim_beg, sub_dim), &sub_conf)?);
            dims.push(sub_dim);
            dim_beg += sub_dim;
        }
        debug_assert_eq!(dim_beg, conf.dim);

        // Full-width vertical codes for candidate verification.
        let mut vert_codes = PackedVec::new(keys.len() * conf.bits, conf.dim);
        let mut vbuf = [0u64; MAX_BITS];
        for i in 0..keys.len() {
            to_vertical(keys.row(i), conf.bits, conf.dim, &mut vbuf);
            for (j, &w) in vbuf.iter().take(conf.bits).enumerate() {
                vert_codes.set(i * conf.bits + j, w);
            }
        }

        debug!(keys = keys.len(), blocks, "built multi-block index");

        Ok(Self {
            conf: *conf,
            dims,
            indexes,
            vert_codes,
        })
    }

    fn searcher(&self) -> MultiSearcher<'_, I> {
        let blocks = self.conf.blocks;
        let mut dim_begs = Vec::with_capacity(blocks + 1);
        let mut dim_beg = 0usize;
        for &d in &self.dims {
            dim_begs.push(dim_beg);
            dim_beg += d;
        }
        dim_begs.push(dim_beg);

        MultiSearcher {
            index: self,
            subs: self.indexes.iter().map(|ix| ix.searcher()).collect(),
            dim_begs,
            dupflags: vec![0u64; self.num_keys() / 64 + 1],
            scores: Vec::with_capacity(1 << 10),
        }
    }

    fn num_keys(&self) -> usize {
        self.indexes[0].num_keys()
    }

    fn config(&self) -> &Config {
        &self.conf
    }

    fn serialize_into<W: Write>(&self, wtr: &mut W) -> Result<()> {
        persist::write_config(wtr, &self.conf)?;
        persist::write_u64(wtr, self.dims.len() as u64)?;
        for &d in &self.dims {
            persist::write_u32(wtr, d as u32)?;
        }
        for index in &self.indexes {
            index.serialize_into(wtr)?;
        }
        self.vert_codes.serialize_into(wtr)?;
        Ok(())
    }

    fn deserialize_from<R: Read>(rdr: &mut R) -> Result<Self> {
        let conf = persist::read_config(rdr)?;
        let num_dims = persist::read_u64(rdr)? as usize;
        let mut dims = Vec::with_capacity(num_dims);
        for _ in 0..num_dims {
            dims.push(persist::read_u32(rdr)? as usize);
        }
        let mut indexes = Vec::with_capacity(num_dims);
        for _ in 0..num_dims {
            indexes.push(I::deserialize_from(rdr)?);
        }
        let vert_codes = PackedVec::deserialize_from(rdr)?;
        Ok(Self {
            conf,
            dims,
            indexes,
            vert_codes,
        })
    }
}

/// Per-query scratch for [`MultiIndex`]: one sub-searcher per block plus the
/// dedup bitmap and the query's vertical code.
pub struct MultiSearcher<'i, I: SketchIndex + 'i> {
    index: &'i MultiIndex<I>,
    subs: Vec<I::Searcher<'i>>,
    dim_begs: Vec<usize>,
    dupflags: Vec<u64>,
    scores: Vec<Score>,
}

impl<'i, I: SketchIndex> Searcher for MultiSearcher<'i, I> {
    fn run(&mut self, query: &[u8], max_errs: usize, stat: &mut Stat) -> Result<&[Score]> {
        self.scores.clear();

        let conf = &self.index.conf;
        if query.len() < conf.dim {
            return Err(Error::Config(format!(
                "query has {} symbols, index dim is {}",
                query.len(),
                conf.dim
            )));
        }

        let blocks = conf.blocks;
        // Pigeonhole: with B blocks, a sketch at distance k keeps at least one
        // block within floor((k - B + 1 + b) / B) errors.
        let gph_errs = max_errs as isize - blocks as isize + 1;
        if gph_errs < 0 {
            return Ok(&self.scores);
        }
        let gph_errs = gph_errs as usize;

        self.dupflags.fill(0);

        let mask = conf.mask();
        let mut q = [0u8; MAX_DIM];
        for (i, slot) in q.iter_mut().take(conf.dim).enumerate() {
            *slot = query[i] & mask;
        }

        let mut vq = [0u64; MAX_BITS];
        to_vertical(&q, conf.bits, conf.dim, &mut vq);

        for b in 0..blocks {
            let sub_q = &q[self.dim_begs[b]..self.dim_begs[b + 1]];
            let sub_errs = (gph_errs + b) / blocks;
            let cands = self.subs[b].run(sub_q, sub_errs, stat)?;

            for cand in cands {
                let id = cand.id as usize;
                if self.dupflags[id / 64] & (1 << (id % 64)) != 0 {
                    continue;
                }
                self.dupflags[id / 64] |= 1 << (id % 64);
                stat.num_cands += 1;

                let mut vcode = [0u64; MAX_BITS];
                for (j, slot) in vcode.iter_mut().take(conf.bits).enumerate() {
                    *slot = self.index.vert_codes.get(id * conf.bits + j);
                }
                let dist = hamdist_vertical(&vq[..conf.bits], &vcode[..conf.bits], max_errs);
                if dist <= max_errs {
                    self.scores.push(Score::new(cand.id, dist as u32));
                }
            }
        }

        Ok(&self.scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash_index::HashIndex;
    use crate::search::linear_search;
    use crate::storage::SketchSet;
    use crate::trie_index::TrieIndex;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_set(n: usize, conf: &Config, seed: u64) -> SketchSet {
        let mut rng = StdRng::seed_from_u64(seed);
        let sigma = conf.sigma() as u16;
        let rows: Vec<Vec<u8>> = (0..n)
            .map(|_| (0..conf.dim).map(|_| rng.gen_range(0..sigma) as u8).collect())
            .collect();
        SketchSet::from_rows(&rows, conf).unwrap()
    }

    fn run<I: SketchIndex>(index: &MultiIndex<I>, q: &[u8], k: usize) -> (Vec<Score>, Stat) {
        let mut s = index.searcher();
        let mut stat = Stat::default();
        let mut out = s.run(q, k, &mut stat).unwrap().to_vec();
        out.sort_by_key(|sc| sc.id);
        (out, stat)
    }

    #[test]
    fn test_blocks_must_be_at_least_two() {
        let conf = Config::new(8, 2).unwrap();
        let set = random_set(16, &conf, 1);
        assert!(matches!(
            MultiIndex::<TrieIndex>::build(set.view(), &conf),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_budget_below_blocks_is_empty() {
        let conf = Config::new(8, 2).unwrap().with_blocks(2);
        let set = random_set(16, &conf, 2);
        let index = MultiIndex::<TrieIndex>::build(set.view(), &conf).unwrap();
        let (scores, _) = run(&index, set.row(0), 0);
        assert!(scores.is_empty());
    }

    #[test]
    fn test_mutated_key_is_recovered() {
        let conf = Config::new(8, 2).unwrap().with_blocks(2);
        let set = random_set(64, &conf, 3);

        let mut q = set.row(0).to_vec();
        for pos in [1usize, 4, 6] {
            q[pos] = (q[pos] + 1) & conf.mask();
        }

        let index = MultiIndex::<TrieIndex>::build(set.view(), &conf).unwrap();
        let (scores, stat) = run(&index, &q, 3);

        assert!(scores.contains(&Score::new(0, 3)));
        assert!(stat.num_cands >= scores.len() as u64);

        let mut expected = linear_search(&set.view(), &q, 3);
        expected.sort_by_key(|sc| sc.id);
        assert_eq!(scores, expected);
    }

    #[test]
    fn test_matches_linear_scan_for_both_sub_kinds() {
        let conf = Config::new(12, 2).unwrap().with_blocks(3);
        let set = random_set(300, &conf, 7);

        let trie = MultiIndex::<TrieIndex>::build(set.view(), &conf).unwrap();
        let hash = MultiIndex::<HashIndex>::build(set.view(), &conf).unwrap();

        for k in 2..=5 {
            for qi in (0..set.len()).step_by(41) {
                let q = set.row(qi);
                let mut expected = linear_search(&set.view(), q, k);
                expected.sort_by_key(|sc| sc.id);
                assert_eq!(run(&trie, q, k).0, expected, "trie k={k}");
                assert_eq!(run(&hash, q, k).0, expected, "hash k={k}");
            }
        }
    }

    #[test]
    fn test_no_duplicate_ids() {
        let conf = Config::new(8, 1).unwrap().with_blocks(2);
        let set = random_set(128, &conf, 11);
        let index = MultiIndex::<HashIndex>::build(set.view(), &conf).unwrap();

        let (scores, _) = run(&index, set.row(5), 4);
        let mut ids: Vec<u32> = scores.iter().map(|s| s.id).collect();
        ids.dedup();
        assert_eq!(ids.len(), scores.len());
    }

    #[test]
    fn test_roundtrip() {
        let conf = Config::new(8, 2).unwrap().with_blocks(2);
        let set = random_set(64, &conf, 13);
        let index = MultiIndex::<TrieIndex>::build(set.view(), &conf).unwrap();

        let mut buf = Vec::new();
        index.serialize_into(&mut buf).unwrap();
        let loaded = MultiIndex::<TrieIndex>::deserialize_from(&mut buf.as_slice()).unwrap();

        assert_eq!(loaded.num_keys(), index.num_keys());
        for k in 1..=3 {
            for qi in 0..8 {
                assert_eq!(run(&loaded, set.row(qi), k).0, run(&index, set.row(qi), k).0);
            }
        }
    }
}
