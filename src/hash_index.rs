//! Hash-table index
//!
//! Open-addressed table over the unique keys, probed at query time with every
//! signature within the error budget. Keys are FNV-1a hashed; collisions walk
//! the table linearly. The key symbols and id groups live in packed stores so
//! the whole index is a handful of flat arrays.

use std::io::{Read, Write};

use tracing::{debug, warn};

use crate::entries::make_entries;
use crate::error::{Error, Result};
use crate::packed::PackedVec;
use crate::persist;
use crate::siggen::{expected_signatures, SigGenerator, SIG_LIMIT};
use crate::storage::SketchView;
use crate::types::{bit_width, Config, Score, Stat, MAX_DIM};
use crate::{Searcher, SketchIndex};

const EMPTY_SLOT: u32 = u32::MAX;
const LOAD_FACTOR: f64 = 1.5;

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

#[derive(Debug, Clone, Copy)]
struct Slot {
    key_pos: u32,
    id_beg: u32,
    id_end: u32,
}

/// Signature-probed exact Hamming index.
#[derive(Debug)]
pub struct HashIndex {
    conf: Config,
    table: Vec<Slot>,
    keys: PackedVec,
    ids: PackedVec,
}

impl HashIndex {
    /// True when the stored key at `key_pos` equals `sig`.
    #[inline]
    fn key_equals(&self, key_pos: usize, sig: &[u8]) -> bool {
        let base = key_pos * self.conf.dim;
        sig.iter()
            .enumerate()
            .all(|(j, &c)| self.keys.get(base + j) == u64::from(c))
    }

    fn probe(&self, sig: &[u8], errs: u32, scores: &mut Vec<Score>) -> Result<()> {
        let mut pos = (fnv1a(sig) % self.table.len() as u64) as usize;
        for _ in 0..=self.table.len() {
            let slot = self.table[pos];
            if slot.key_pos == EMPTY_SLOT {
                return Ok(());
            }
            if self.key_equals(slot.key_pos as usize, sig) {
                for i in slot.id_beg..slot.id_end {
                    scores.push(Score::new(self.ids.get(i as usize) as u32, errs));
                }
                return Ok(());
            }
            pos += 1;
            if pos == self.table.len() {
                pos = 0;
            }
        }
        Err(Error::Invariant(
            "hash probe cycled through the whole table".into(),
        ))
    }
}

impl SketchIndex for HashIndex {
    const KIND: u8 = 1;
    type Searcher<'i> = HashSearcher<'i> where Self: 'i;

    fn build(keys: SketchView<'_>, conf: &Config) -> Result<Self> {
        conf.validate()?;
        if keys.is_empty() {
            return Err(Error::Config("cannot build an index over zero keys".into()));
        }

        let entries = make_entries(&keys);
        let num_slots = (entries.len() as f64 * LOAD_FACTOR).ceil() as usize;

        let mut table = vec![
            Slot {
                key_pos: EMPTY_SLOT,
                id_beg: 0,
                id_end: 0,
            };
            num_slots
        ];
        let mut key_store = PackedVec::new(entries.len() * conf.dim, conf.bits);
        let mut ids = PackedVec::new(keys.len(), bit_width(keys.len()));

        let mut id_beg = 0u32;
        for (i, e) in entries.iter().enumerate() {
            let key = keys.row(e.row as usize);
            let mut pos = (fnv1a(key) % num_slots as u64) as usize;
            let mut steps = 0usize;
            while table[pos].key_pos != EMPTY_SLOT {
                pos += 1;
                if pos == num_slots {
                    pos = 0;
                }
                steps += 1;
                if steps > num_slots {
                    return Err(Error::Invariant("hash table overflow during build".into()));
                }
            }

            table[pos].key_pos = i as u32;
            for (j, &c) in key.iter().enumerate() {
                key_store.set(i * conf.dim + j, u64::from(c));
            }

            table[pos].id_beg = id_beg;
            for &id in &e.ids {
                ids.set(id_beg as usize, u64::from(id));
                id_beg += 1;
            }
            table[pos].id_end = id_beg;
        }

        debug!(
            keys = keys.len(),
            entries = entries.len(),
            slots = num_slots,
            "built hash index"
        );

        Ok(Self {
            conf: *conf,
            table,
            keys: key_store,
            ids,
        })
    }

    fn searcher(&self) -> HashSearcher<'_> {
        HashSearcher {
            index: self,
            gen: SigGenerator::new(),
            scores: Vec::with_capacity(1 << 10),
        }
    }

    fn num_keys(&self) -> usize {
        self.ids.len()
    }

    fn config(&self) -> &Config {
        &self.conf
    }

    fn serialize_into<W: Write>(&self, wtr: &mut W) -> Result<()> {
        persist::write_config(wtr, &self.conf)?;
        persist::write_u64(wtr, self.table.len() as u64)?;
        for slot in &self.table {
            persist::write_u32(wtr, slot.key_pos)?;
            persist::write_u32(wtr, slot.id_beg)?;
            persist::write_u32(wtr, slot.id_end)?;
        }
        self.keys.serialize_into(wtr)?;
        self.ids.serialize_into(wtr)?;
        Ok(())
    }

    fn deserialize_from<R: Read>(rdr: &mut R) -> Result<Self> {
        let conf = persist::read_config(rdr)?;
        let num_slots = persist::read_u64(rdr)? as usize;
        let mut table = Vec::with_capacity(num_slots);
        for _ in 0..num_slots {
            table.push(Slot {
                key_pos: persist::read_u32(rdr)?,
                id_beg: persist::read_u32(rdr)?,
                id_end: persist::read_u32(rdr)?,
            });
        }
        let keys = PackedVec::deserialize_from(rdr)?;
        let ids = PackedVec::deserialize_from(rdr)?;
        Ok(Self {
            conf,
            table,
            keys,
            ids,
        })
    }
}

/// Per-query scratch for [`HashIndex`]; never share one across threads.
pub struct HashSearcher<'i> {
    index: &'i HashIndex,
    gen: SigGenerator,
    scores: Vec<Score>,
}

impl<'i> Searcher for HashSearcher<'i> {
    fn run(&mut self, query: &[u8], max_errs: usize, _stat: &mut Stat) -> Result<&[Score]> {
        self.scores.clear();

        let conf = &self.index.conf;
        if query.len() < conf.dim {
            return Err(Error::Config(format!(
                "query has {} symbols, index dim is {}",
                query.len(),
                conf.dim
            )));
        }

        // The enumeration would be slower than a linear scan past this point.
        let expected = expected_signatures(conf.bits, conf.dim, max_errs);
        if expected >= SIG_LIMIT {
            warn!(max_errs, expected, "query aborted: massive signature count");
            return Err(Error::SearchAbort { expected });
        }

        let mut q = [0u8; MAX_DIM];
        for (i, slot) in q.iter_mut().take(conf.dim).enumerate() {
            *slot = query[i] & conf.mask();
        }

        for errs in 0..=max_errs.min(conf.dim) {
            self.gen.set(&q, conf.dim, conf.bits, errs);
            while self.gen.has_next() {
                let sig = self.gen.next();
                self.index.probe(sig, errs as u32, &mut self.scores)?;
            }
        }

        Ok(&self.scores)
    }
}

#[inline]
fn fnv1a(key: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &c in key {
        hash ^= u64::from(c);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
