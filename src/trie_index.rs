//! Succinct sketch trie index
//!
//! Root-to-leaf paths spell out the unique keys. Three depth regimes share
//! the storage:
//!
//! - a perfect prefix where every node has all `sigma` children, stored
//!   implicitly (node rank is the base-sigma value of the prefix read so far)
//! - a medium layer where each depth picks a dense child bitmap (DHT) or a
//!   sparse child list (LIST) from its average fanout
//! - a suffix layer where the residual tails are stored flat as vertical
//!   bitcodes and checked with budgeted Hamming distance
//!
//! The descent carries an error budget; once it is spent only exact symbols
//! are followed.

use std::io::{Read, Write};

use tracing::debug;

use crate::bitvec::BitVec;
use crate::entries::{make_entries, trie_node_begs};
use crate::error::{Error, Result};
use crate::packed::PackedVec;
use crate::persist;
use crate::storage::SketchView;
use crate::types::{bit_width, Config, RepType, Score, Stat, MAX_BITS, MAX_DIM};
use crate::vcode::{hamdist_vertical, to_vertical};
use crate::{Searcher, SketchIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeRep {
    Dht,
    List,
}

/// Per-level addressing record for the medium layer.
///
/// `begin` is the level's offset into its backing array; `prefix_sum` is the
/// node count accumulated by earlier levels of the same array (child nodes
/// for DHT levels, own nodes for LIST levels). Together they turn a node
/// rank into an array region without scanning prior levels.
#[derive(Debug, Clone, Copy)]
struct MediumAux {
    rep: NodeRep,
    begin: u64,
    prefix_sum: u64,
}

/// Three-layer succinct trie over the unique keys.
#[derive(Debug)]
pub struct TrieIndex {
    conf: Config,

    // Perfect prefix.
    perf_height: usize,

    // Medium layer.
    medium: Vec<MediumAux>,
    dhts: BitVec,
    list_bits: BitVec,
    list_chars: PackedVec,

    // Suffix layer.
    suf_dim: usize,
    vert_sufs: PackedVec,
    suf_begs: BitVec,

    // Id lists.
    ids: PackedVec,
    id_begs: BitVec,
}

impl TrieIndex {
    /// Depth of the implicit sigma-complete prefix.
    pub fn perf_height(&self) -> usize {
        self.perf_height
    }

    /// Number of trailing symbols stored as vertical-bitcode suffixes.
    pub fn suffix_dim(&self) -> usize {
        self.suf_dim
    }

    fn trie_height(&self) -> usize {
        self.conf.dim - self.suf_dim
    }
}

impl SketchIndex for TrieIndex {
    const KIND: u8 = 2;
    type Searcher<'i> = TrieSearcher<'i> where Self: 'i;

    fn build(keys: SketchView<'_>, conf: &Config) -> Result<Self> {
        conf.validate()?;
        if keys.is_empty() {
            return Err(Error::Config("cannot build an index over zero keys".into()));
        }

        let dim = conf.dim;
        let bits = conf.bits;
        let entries = make_entries(&keys);
        let node_begs = trie_node_begs(&entries, &keys, dim)?;
        let num_nodes = |h: usize| node_begs[h].len() - 1;

        // 1. Perfect prefix: extend while every node is sigma-complete.
        let mut h = 0;
        while h < dim {
            if (num_nodes(h) << bits) != num_nodes(h + 1) {
                break;
            }
            h += 1;
        }
        let perf_height = h;

        // 2. Medium layer.
        let mut medium = Vec::new();
        let mut dht_scratch: Vec<bool> = Vec::new();
        let mut list_bits_scratch: Vec<bool> = Vec::new();
        let mut list_chars_scratch: Vec<u8> = Vec::new();

        let mut dht_aux = MediumAux {
            rep: NodeRep::Dht,
            begin: 0,
            prefix_sum: 0,
        };
        let mut list_aux = MediumAux {
            rep: NodeRep::List,
            begin: 0,
            prefix_sum: 0,
        };

        let ds_thr = match conf.rep_type {
            RepType::Hybrid => conf.sigma() as f32 / (bits + 1) as f32,
            RepType::Dht => 0.0,
            RepType::List => conf.sigma() as f32 + 1.0,
        };

        while h < dim {
            // Wide enough that storing children beats collapsing to suffixes?
            if num_nodes(h + 1) as f32 * conf.suf_thr > entries.len() as f32 {
                break;
            }

            let ave_degree = num_nodes(h + 1) as f32 / num_nodes(h) as f32;
            let rep = if ave_degree >= ds_thr {
                NodeRep::Dht
            } else {
                NodeRep::List
            };

            let dht_beg = dht_scratch.len();
            if rep == NodeRep::Dht {
                dht_scratch.resize(dht_beg + (num_nodes(h) << bits), false);
            }

            let prev = &node_begs[h];
            for i in 1..prev.len() {
                let e_beg = prev[i - 1] as usize;
                let e_end = prev[i] as usize;
                let mut prev_c = keys.row(entries[e_beg].row as usize)[h];
                let node_beg = dht_beg + ((i - 1) << bits);

                if rep == NodeRep::List {
                    list_bits_scratch.push(true);
                }

                for j in e_beg + 1..e_end {
                    let cur_c = keys.row(entries[j].row as usize)[h];
                    if prev_c != cur_c {
                        if cur_c < prev_c {
                            return Err(Error::Invariant(format!(
                                "children out of lexicographic order at depth {h}"
                            )));
                        }
                        match rep {
                            NodeRep::Dht => dht_scratch[node_beg + prev_c as usize] = true,
                            NodeRep::List => {
                                list_bits_scratch.push(false);
                                list_chars_scratch.push(prev_c);
                            }
                        }
                        prev_c = cur_c;
                    }
                }
                match rep {
                    NodeRep::Dht => dht_scratch[node_beg + prev_c as usize] = true,
                    NodeRep::List => list_chars_scratch.push(prev_c),
                }
            }

            match rep {
                NodeRep::Dht => {
                    medium.push(dht_aux);
                    dht_aux.begin = dht_scratch.len() as u64;
                    dht_aux.prefix_sum += num_nodes(h + 1) as u64;
                }
                NodeRep::List => {
                    medium.push(list_aux);
                    list_aux.begin = list_bits_scratch.len() as u64;
                    list_aux.prefix_sum += num_nodes(h) as u64;
                }
            }
            h += 1;
        }

        // Terminator cell; run walks stop here and never read it as a child.
        list_bits_scratch.push(true);
        list_chars_scratch.push(0);

        let dhts = BitVec::from_bools(&dht_scratch, true, false);
        let list_bits = BitVec::from_bools(&list_bits_scratch, false, true);
        let mut list_chars = PackedVec::new(list_chars_scratch.len(), bits);
        for (i, &c) in list_chars_scratch.iter().enumerate() {
            list_chars.set(i, u64::from(c));
        }

        // 3. Suffix layer and id lists.
        let trie_height = h;
        let suf_dim = dim - trie_height;

        let mut vert_sufs = if suf_dim != 0 {
            PackedVec::new(entries.len() * bits, suf_dim)
        } else {
            PackedVec::new(0, 1)
        };
        let mut suf_begs_scratch = if suf_dim != 0 {
            vec![false; entries.len() + 1]
        } else {
            Vec::new()
        };

        let mut ids = PackedVec::new(keys.len(), bit_width(keys.len()));
        let mut id_begs_scratch = vec![false; keys.len() + 1];

        let prev = &node_begs[trie_height];
        let mut ids_size = 0usize;
        let mut sufs_size = 0usize;
        let mut vbuf = [0u64; MAX_BITS];

        for i in 1..prev.len() {
            let e_beg = prev[i - 1] as usize;
            let e_end = prev[i] as usize;

            if suf_dim != 0 {
                suf_begs_scratch[sufs_size] = true;
            }

            for e in &entries[e_beg..e_end] {
                if suf_dim != 0 {
                    let row = keys.row(e.row as usize);
                    to_vertical(&row[trie_height..], bits, suf_dim, &mut vbuf);
                    for (j, &w) in vbuf.iter().take(bits).enumerate() {
                        vert_sufs.set(sufs_size * bits + j, w);
                    }
                    sufs_size += 1;
                }

                id_begs_scratch[ids_size] = true;
                for &id in &e.ids {
                    ids.set(ids_size, u64::from(id));
                    ids_size += 1;
                }
            }
        }

        let suf_begs = if suf_dim != 0 {
            suf_begs_scratch[sufs_size] = true;
            BitVec::from_bools(&suf_begs_scratch, false, true)
        } else {
            BitVec::default()
        };

        id_begs_scratch[ids_size] = true;
        let id_begs = BitVec::from_bools(&id_begs_scratch, false, true);

        debug!(
            keys = keys.len(),
            entries = entries.len(),
            perf_height,
            suf_dim,
            medium_levels = medium.len(),
            "built trie index"
        );

        Ok(Self {
            conf: *conf,
            perf_height,
            medium,
            dhts,
            list_bits,
            list_chars,
            suf_dim,
            vert_sufs,
            suf_begs,
            ids,
            id_begs,
        })
    }

    fn searcher(&self) -> TrieSearcher<'_> {
        TrieSearcher {
            index: self,
            q: [0; MAX_DIM],
            q_vert_suf: [0; MAX_BITS],
            max_errs: 0,
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
        persist::write_u32(wtr, self.perf_height as u32)?;
        persist::write_u64(wtr, self.medium.len() as u64)?;
        for aux in &self.medium {
            persist::write_u8(wtr, matches!(aux.rep, NodeRep::List) as u8)?;
            persist::write_u64(wtr, aux.begin)?;
            persist::write_u64(wtr, aux.prefix_sum)?;
        }
        self.dhts.serialize_into(wtr)?;
        self.list_bits.serialize_into(wtr)?;
        self.list_chars.serialize_into(wtr)?;
        persist::write_u32(wtr, self.suf_dim as u32)?;
        self.vert_sufs.serialize_into(wtr)?;
        self.suf_begs.serialize_into(wtr)?;
        self.ids.serialize_into(wtr)?;
        self.id_begs.serialize_into(wtr)?;
        Ok(())
    }

    fn deserialize_from<R: Read>(rdr: &mut R) -> Result<Self> {
        let conf = persist::read_config(rdr)?;
        let perf_height = persist::read_u32(rdr)? as usize;
        let num_medium = persist::read_u64(rdr)? as usize;
        let mut medium = Vec::with_capacity(num_medium);
        for _ in 0..num_medium {
            let rep = if persist::read_u8(rdr)? == 0 {
                NodeRep::Dht
            } else {
                NodeRep::List
            };
            medium.push(MediumAux {
                rep,
                begin: persist::read_u64(rdr)?,
                prefix_sum: persist::read_u64(rdr)?,
            });
        }
        let dhts = BitVec::deserialize_from(rdr)?;
        let list_bits = BitVec::deserialize_from(rdr)?;
        let list_chars = PackedVec::deserialize_from(rdr)?;
        let suf_dim = persist::read_u32(rdr)? as usize;
        let vert_sufs = PackedVec::deserialize_from(rdr)?;
        let suf_begs = BitVec::deserialize_from(rdr)?;
        let ids = PackedVec::deserialize_from(rdr)?;
        let id_begs = BitVec::deserialize_from(rdr)?;
        Ok(Self {
            conf,
            perf_height,
            medium,
            dhts,
            list_bits,
            list_chars,
            suf_dim,
            vert_sufs,
            suf_begs,
            ids,
            id_begs,
        })
    }
}

/// Per-query scratch for [`TrieIndex`]; never share one across threads.
pub struct TrieSearcher<'i> {
    index: &'i TrieIndex,
    q: [u8; MAX_DIM],
    q_vert_suf: [u64; MAX_BITS],
    max_errs: usize,
    scores: Vec<Score>,
}

impl<'i> Searcher for TrieSearcher<'i> {
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

        let mask = conf.mask();
        for i in 0..conf.dim {
            self.q[i] = query[i] & mask;
        }
        self.max_errs = max_errs;

        if self.index.suf_dim != 0 {
            let trie_height = self.index.trie_height();
            to_vertical(
                &self.q[trie_height..],
                conf.bits,
                self.index.suf_dim,
                &mut self.q_vert_suf,
            );
        }

        self.descend_prefix(0, 0, 0);
        Ok(&self.scores)
    }
}

impl<'i> TrieSearcher<'i> {
    /// Implicit perfect-prefix descent; node rank is base-sigma arithmetic.
    fn descend_prefix(&mut self, h: usize, errs: usize, rank: u64) {
        if h == self.index.perf_height {
            self.descend(h, errs, rank);
            return;
        }

        let sigma = self.index.conf.sigma() as u64;
        let c = u64::from(self.q[h]);
        let rank = rank * sigma;

        if errs == self.max_errs {
            self.descend_prefix(h + 1, errs, rank + c);
        } else {
            for i in 0..sigma {
                let e = if i == c { errs } else { errs + 1 };
                self.descend_prefix(h + 1, e, rank + i);
            }
        }
    }

    fn descend(&mut self, h: usize, errs: usize, rank: u64) {
        let index = self.index;
        debug_assert!(errs <= self.max_errs);

        if h == index.trie_height() {
            self.emit_leaf(errs, rank);
            return;
        }

        let aux = &index.medium[h - index.perf_height];
        let bits = index.conf.bits;
        let c = u64::from(self.q[h]);

        match aux.rep {
            NodeRep::Dht => {
                let pos_beg = aux.begin as usize + ((rank as usize) << bits);

                if errs == self.max_errs {
                    let pos = pos_beg + c as usize;
                    if !index.dhts.get(pos) {
                        return;
                    }
                    let next_rank = index.dhts.rank1(pos) - aux.prefix_sum;
                    self.descend(h + 1, errs, next_rank);
                    return;
                }

                let mut next_rank = index.dhts.rank1(pos_beg) - aux.prefix_sum;
                for i in 0..index.conf.sigma() as u64 {
                    if !index.dhts.get(pos_beg + i as usize) {
                        continue;
                    }
                    let e = if i == c { errs } else { errs + 1 };
                    self.descend(h + 1, e, next_rank);
                    next_rank += 1;
                }
            }
            NodeRep::List => {
                let mut pos = index.list_bits.select1(rank + aux.prefix_sum);
                loop {
                    let child_c = index.list_chars.get(pos);
                    let child_rank = (pos as u64) - aux.begin;
                    if child_c == c {
                        self.descend(h + 1, errs, child_rank);
                    } else if errs < self.max_errs {
                        self.descend(h + 1, errs + 1, child_rank);
                    }
                    pos += 1;
                    if index.list_bits.get(pos) {
                        break;
                    }
                }
            }
        }
    }

    /// Emit ids under a medium leaf, verifying suffixes when present.
    fn emit_leaf(&mut self, errs: usize, rank: u64) {
        let index = self.index;
        let bits = index.conf.bits;

        if index.suf_dim == 0 {
            let mut idp = index.id_begs.select1(rank);
            loop {
                self.scores
                    .push(Score::new(index.ids.get(idp) as u32, errs as u32));
                idp += 1;
                if index.id_begs.get(idp) {
                    break;
                }
            }
            return;
        }

        let mut suf = index.suf_begs.select1(rank);
        loop {
            let mut vsuf = [0u64; MAX_BITS];
            for (j, slot) in vsuf.iter_mut().take(bits).enumerate() {
                *slot = index.vert_sufs.get(suf * bits + j);
            }
            let ham = hamdist_vertical(
                &vsuf[..bits],
                &self.q_vert_suf[..bits],
                self.max_errs - errs,
            );

            if errs + ham <= self.max_errs {
                let total = (errs + ham) as u32;
                let mut idp = index.id_begs.select1(suf as u64);
                loop {
                    self.scores
                        .push(Score::new(index.ids.get(idp) as u32, total));
                    idp += 1;
                    if index.id_begs.get(idp) {
                        break;
                    }
                }
            }

            suf += 1;
            if index.suf_begs.get(suf) {
                break;
            }
        }
    }
}
