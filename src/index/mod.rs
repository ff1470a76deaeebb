//! Index statistics consumed by the BM25 scoring engine
//!
//! [`IndexStats`] is the seam to whatever index backs an experiment.
//! [`MemoryIndex`] is a small in-memory implementation built from a JSONL
//! corpus, enough for re-scoring candidate sets and for tests.

mod analyzer;
mod memory;

pub use analyzer::{Analyzer, StemmerKind};
pub use memory::{CorpusDocument, MemoryIndex};

/// Term and document statistics of an index
pub trait IndexStats {
    /// Length of a document in analyzed terms, `None` when it is not indexed
    fn doc_len(&self, docid: &str) -> Option<u64>;

    /// Occurrences of `term` in `docid` (0 when absent)
    fn term_freq(&self, term: &str, docid: &str) -> u64;

    /// Inverse document frequency of `term`
    fn idf(&self, term: &str) -> f64;

    /// Average document length across the collection
    fn avg_doc_len(&self) -> f64;

    /// Analyze query text with the same pipeline the index was built with
    fn analyze(&self, text: &str) -> Vec<String>;

    /// Every indexed document id
    fn doc_ids(&self) -> Vec<String>;
}

/// Lucene's BM25 idf: `ln(1 + (N - df + 0.5) / (df + 0.5))`
pub fn bm25_idf(doc_freq: u64, total_docs: u64) -> f64 {
    let df = doc_freq as f64;
    let n = total_docs as f64;
    (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
}
