//! Brute-force scan, parallel batch search, and validation
//!
//! The linear scan is the ground truth every index must agree with; the batch
//! helper fans queries out over rayon workers with one private searcher per
//! worker, which is the only sanctioned way to query one index from many
//! threads.

use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::storage::{SketchSet, SketchView};
use crate::types::{Score, Stat};
use crate::vcode::hamdist;
use crate::{Searcher, SketchIndex};

/// Exact scan over the whole corpus; the reference answer set.
///
/// Corpus and query are expected to be alphabet-masked already (loaders and
/// `SketchSet` constructors guarantee this for stored data).
pub fn linear_search(keys: &SketchView<'_>, query: &[u8], max_errs: usize) -> Vec<Score> {
    let dim = keys.dim();
    let mut scores = Vec::new();
    for i in 0..keys.len() {
        let errs = hamdist(keys.row(i), query, dim, max_errs);
        if errs <= max_errs {
            scores.push(Score::new(i as u32, errs as u32));
        }
    }
    scores
}

/// Run every query against the index in parallel, one searcher per worker.
pub fn search_batch<I>(index: &I, queries: &SketchSet, max_errs: usize) -> Result<Vec<Vec<Score>>>
where
    I: SketchIndex + Sync,
    for<'a> I::Searcher<'a>: Send,
{
    (0..queries.len())
        .into_par_iter()
        .map_init(
            || (index.searcher(), Stat::default()),
            |(searcher, stat), i| {
                searcher
                    .run(queries.row(i), max_errs, stat)
                    .map(|scores| scores.to_vec())
            },
        )
        .collect()
}

/// Cross-check the index against the brute-force scan for every query.
///
/// Answer sets must match in size and, after sorting by id, in every
/// `(id, errs)` pair.
pub fn validate<I: SketchIndex>(
    index: &I,
    keys: &SketchSet,
    queries: &SketchSet,
    max_errs: usize,
) -> Result<()> {
    let mut searcher = index.searcher();
    let mut stat = Stat::default();

    for (qi, q) in queries.iter() {
        let mut searched = searcher.run(q, max_errs, &mut stat)?.to_vec();
        let mut truth = linear_search(&keys.view(), q, max_errs);

        if searched.len() != truth.len() {
            return Err(Error::Validation(format!(
                "query {qi}: {} answers, brute force found {}",
                searched.len(),
                truth.len()
            )));
        }

        searched.sort_by_key(|s| s.id);
        truth.sort_by_key(|s| s.id);
        for (s, t) in searched.iter().zip(truth.iter()) {
            if s != t {
                return Err(Error::Validation(format!(
                    "query {qi}: got ({}, {}), brute force found ({}, {})",
                    s.id, s.errs, t.id, t.errs
                )));
            }
        }
    }
    Ok(())
}
