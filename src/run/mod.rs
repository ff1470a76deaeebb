//! Ranked result sets and their TREC text formats
//!
//! A [`Run`] maps query ids to a [`RankedList`] of document scores. Both levels
//! are [`OrderedMap`]s: the order a list was produced or loaded in is the
//! ranking, and nothing downstream re-sorts by key.

mod ordered;
mod qrels;
mod trec;

pub use ordered::OrderedMap;
pub use qrels::{load_qrels, write_qrels, Qrels};
pub use trec::{load_trec_run, write_trec_run, WriteMode, RUN_TAG};

use std::cmp::Ordering;
use std::collections::HashSet;

/// Document id → score, in rank order
pub type RankedList = OrderedMap<f64>;

/// Query id → ranked documents
pub type Run = OrderedMap<RankedList>;

/// Descending score comparison; NaN sorts last
pub fn by_score_desc(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

impl OrderedMap<f64> {
    /// First `n` documents in stored order
    pub fn first_n(&self, n: usize) -> RankedList {
        self.iter()
            .take(n)
            .map(|(docid, &score)| (docid.to_string(), score))
            .collect()
    }

    /// Stable sort by descending score, ties keep stored order
    pub fn sort_by_score(&mut self) {
        self.sort_by(|a, b| by_score_desc(a.1, b.1));
    }

    /// Highest-scoring `n` documents; a no-op when the list already fits
    pub fn keep_top(&mut self, n: usize) {
        if self.len() <= n {
            return;
        }
        self.sort_by_score();
        self.truncate(n);
    }
}

impl OrderedMap<RankedList> {
    /// Every document id that appears for any query
    pub fn doc_ids(&self) -> HashSet<String> {
        self.values()
            .flat_map(|docs| docs.keys().map(str::to_string))
            .collect()
    }

    /// Total number of (query, document) entries
    pub fn entry_count(&self) -> usize {
        self.values().map(|docs| docs.len()).sum()
    }

    /// Queries whose id satisfies `keep`, with at most `depth` documents each
    pub fn select_queries<F>(&self, mut keep: F, depth: Option<usize>) -> Run
    where
        F: FnMut(&str) -> bool,
    {
        self.iter()
            .filter(|(qid, _)| keep(qid))
            .map(|(qid, docs)| {
                let docs = match depth {
                    Some(depth) => docs.first_n(depth),
                    None => docs.clone(),
                };
                (qid.to_string(), docs)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(entries: &[(&str, f64)]) -> RankedList {
        entries.iter().map(|&(d, s)| (d, s)).collect()
    }

    #[test]
    fn test_first_n_uses_stored_order() {
        // stored order deliberately disagrees with score order
        let docs = list(&[("d3", 0.1), ("d1", 0.9), ("d2", 0.5)]);
        let head = docs.first_n(2);
        assert_eq!(head.keys().collect::<Vec<_>>(), vec!["d3", "d1"]);
    }

    #[test]
    fn test_keep_top_sorts_and_cuts() {
        let mut docs = list(&[("a", 0.1), ("b", 0.7), ("c", 0.3), ("d", 0.9), ("e", 0.5)]);
        docs.keep_top(3);
        assert_eq!(docs.keys().collect::<Vec<_>>(), vec!["d", "b", "e"]);
    }

    #[test]
    fn test_keep_top_noop_when_short() {
        let mut docs = list(&[("a", 0.1), ("b", 0.7)]);
        docs.keep_top(3);
        assert_eq!(docs.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_sort_is_stable_on_ties() {
        let mut docs = list(&[("x", 1.0), ("y", 2.0), ("z", 1.0)]);
        docs.sort_by_score();
        assert_eq!(docs.keys().collect::<Vec<_>>(), vec!["y", "x", "z"]);
    }

    #[test]
    fn test_select_queries_with_depth() {
        let mut run = Run::new();
        run.insert("q1", list(&[("a", 3.0), ("b", 2.0), ("c", 1.0)]));
        run.insert("q2", list(&[("d", 1.0)]));

        let subset = run.select_queries(|qid| qid == "q1", Some(2));
        assert_eq!(subset.len(), 1);
        assert_eq!(subset.get("q1").unwrap().len(), 2);
        assert_eq!(run.entry_count(), 4);
    }
}
