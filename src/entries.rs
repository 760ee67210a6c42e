//! Entry aggregation
//!
//! Groups a raw sketch corpus into unique keys with their id lists, sorted
//! lexicographically, and derives the per-depth node-begin table the trie
//! builder walks.

use crate::error::{Error, Result};
use crate::storage::SketchView;

/// A unique sketch value with the ids of every input row that carried it.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Row index of a representative carrier of this key.
    pub row: u32,
    /// Original input ids, in ascending order.
    pub ids: Vec<u32>,
}

/// Aggregate a corpus into lexicographically sorted unique-key entries.
///
/// The entries partition the input id space: the id lists are disjoint and
/// their sizes sum to `keys.len()`.
pub fn make_entries(keys: &SketchView<'_>) -> Vec<Entry> {
    let mut perms: Vec<u32> = (0..keys.len() as u32).collect();
    // Stable sort keeps ids ascending inside each equal-key group.
    perms.sort_by(|&a, &b| keys.row(a as usize).cmp(keys.row(b as usize)));

    let mut entries = Vec::new();
    let mut beg = 0usize;
    for i in 1..=perms.len() {
        if i < perms.len() && keys.row(perms[i - 1] as usize) == keys.row(perms[i] as usize) {
            continue;
        }
        entries.push(Entry {
            row: perms[beg],
            ids: perms[beg..i].to_vec(),
        });
        beg = i;
    }
    entries
}

/// Build the depth-indexed node-begin table over sorted entries.
///
/// `node_begs[h]` lists the entry indices at which distinct length-`h`
/// prefixes begin, terminated by `entries.len()`; depth `h` of the trie has
/// `node_begs[h].len() - 1` nodes.
pub fn trie_node_begs(
    entries: &[Entry],
    keys: &SketchView<'_>,
    dim: usize,
) -> Result<Vec<Vec<u32>>> {
    let mut node_begs: Vec<Vec<u32>> = Vec::with_capacity(dim + 1);
    node_begs.push(vec![0, entries.len() as u32]);

    for h in 0..dim {
        let mut next = vec![0u32];
        let prev = &node_begs[h];
        for i in 1..prev.len() {
            let e_beg = prev[i - 1] as usize;
            let e_end = prev[i] as usize;
            let mut prev_c = keys.row(entries[e_beg].row as usize)[h];
            for j in e_beg + 1..e_end {
                let cur_c = keys.row(entries[j].row as usize)[h];
                if cur_c < prev_c {
                    return Err(Error::Invariant(format!(
                        "entries out of lexicographic order at depth {h}, entry {j}"
                    )));
                }
                if cur_c != prev_c {
                    next.push(j as u32);
                    prev_c = cur_c;
                }
            }
            next.push(e_end as u32);
        }
        node_begs.push(next);
    }

    Ok(node_begs)
}
