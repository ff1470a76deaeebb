//! Foldrank - staged IR experiments with cross-validated reranking
//!
//! Loads and writes TREC runs, scores BM25 parameter grids, rewrites runs
//! (filter, passage dedup, top-N) and drives a search → rank → rerank →
//! evaluate pipeline per cross-validation fold, caching every stage on disk.

pub mod cli;
pub mod config;
pub mod crossval;
pub mod error;
pub mod eval;
pub mod index;
pub mod pipeline;
pub mod postprocess;
pub mod rerank;
pub mod run;
pub mod search;
pub mod stage;
pub mod topics;

pub use error::{FoldrankError, Result};
