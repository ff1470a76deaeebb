//! First-stage searchers
//!
//! A [`Searcher`] turns a topic file into one or more run files inside an
//! output directory. Every implementation guards its work with a
//! [`Stage`](crate::stage::Stage), so searching twice into the same
//! directory does the work once.

mod anserini;
pub mod bm25;
mod models;
mod params;

pub use anserini::{AnseriniRunner, AnseriniSearcher, DEFAULT_JAVA_OPTS};
pub use bm25::{Bm25Reranker, GridPoint};
pub use models::ScoringModel;
pub use params::ParamList;

use crate::error::{FoldrankError, Result};
use crate::postprocess::{self, DocList};
use crate::stage::Stage;
use std::fs;
use std::path::{Path, PathBuf};

/// Something that can produce run files for a topic file
pub trait Searcher {
    /// Short name used in logs
    fn name(&self) -> String;

    /// Search every topic in `topics` and write run files into `output_dir`.
    ///
    /// Returns the directory holding the run files, which may be a
    /// subdirectory of `output_dir`.
    fn query_from_file(&self, topics: &Path, output_dir: &Path) -> Result<PathBuf>;
}

impl<S: Searcher + ?Sized> Searcher for &S {
    fn name(&self) -> String {
        (**self).name()
    }

    fn query_from_file(&self, topics: &Path, output_dir: &Path) -> Result<PathBuf> {
        (**self).query_from_file(topics, output_dir)
    }
}

impl<S: Searcher + ?Sized> Searcher for Box<S> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn query_from_file(&self, topics: &Path, output_dir: &Path) -> Result<PathBuf> {
        (**self).query_from_file(topics, output_dir)
    }
}

/// Serves a precomputed run file, for benchmarks that ship a tuned baseline
#[derive(Debug, Clone)]
pub struct StaticRunSearcher {
    run_path: PathBuf,
}

impl StaticRunSearcher {
    pub const FILE_NAME: &'static str = "static.run";

    pub fn new(run_path: impl Into<PathBuf>) -> Self {
        Self {
            run_path: run_path.into(),
        }
    }
}

impl Searcher for StaticRunSearcher {
    fn name(&self) -> String {
        "static".to_string()
    }

    fn query_from_file(&self, _topics: &Path, output_dir: &Path) -> Result<PathBuf> {
        Stage::new("search", output_dir).run(|dir| {
            let target = dir.join(Self::FILE_NAME);
            fs::copy(&self.run_path, &target).map_err(|e| {
                FoldrankError::io(
                    e,
                    format!(
                        "Failed to copy static run {} -> {}",
                        self.run_path.display(),
                        target.display()
                    ),
                )
            })?;
            Ok(())
        })
    }
}

/// Post-processing applied after a search
#[derive(Debug, Clone, Default)]
pub struct PostProcessing {
    pub remove: Option<DocList>,
    pub keep: Option<DocList>,
    /// Passage delimiter; `None` disables deduplication
    pub dedup: Option<String>,
    pub topn: Option<usize>,
}

impl PostProcessing {
    pub fn is_noop(&self) -> bool {
        self.remove.as_ref().map_or(true, DocList::is_empty)
            && self.keep.as_ref().map_or(true, DocList::is_empty)
            && self.dedup.is_none()
            && self.topn.is_none()
    }
}

/// Wraps a searcher and rewrites its runs with filter, dedup and top-N
pub struct PostProcessedSearcher<S> {
    inner: S,
    steps: PostProcessing,
}

impl<S: Searcher> PostProcessedSearcher<S> {
    pub const OUTPUT_DIR: &'static str = "postprocessed";

    pub fn new(inner: S, steps: PostProcessing) -> Self {
        Self { inner, steps }
    }

    fn apply(&self, source: &Path, target: &Path) -> Result<()> {
        for path in postprocess::run_files(source)? {
            if let Some(name) = path.file_name() {
                let copy = target.join(name);
                fs::copy(&path, &copy).map_err(|e| {
                    FoldrankError::io(e, format!("Failed to copy run {}", path.display()))
                })?;
            }
        }

        let has_filter = self.steps.remove.as_ref().map_or(false, |l| !l.is_empty())
            || self.steps.keep.as_ref().map_or(false, |l| !l.is_empty());
        // top-N is applied once, by the last step that runs
        let filter_topn = if self.steps.dedup.is_some() {
            None
        } else {
            self.steps.topn
        };

        if has_filter {
            postprocess::filter_dir(
                target,
                self.steps.remove.as_ref(),
                self.steps.keep.as_ref(),
                filter_topn,
            )?;
        }
        if let Some(delimiter) = &self.steps.dedup {
            postprocess::dedup_dir(target, delimiter, self.steps.topn)?;
        }
        if !has_filter && self.steps.dedup.is_none() {
            if let Some(n) = self.steps.topn {
                postprocess::keep_topn_dir(target, n)?;
            }
        }
        Ok(())
    }
}

impl<S: Searcher> Searcher for PostProcessedSearcher<S> {
    fn name(&self) -> String {
        format!("{}+postprocess", self.inner.name())
    }

    fn query_from_file(&self, topics: &Path, output_dir: &Path) -> Result<PathBuf> {
        let source = self.inner.query_from_file(topics, output_dir)?;
        if self.steps.is_noop() {
            return Ok(source);
        }

        Stage::new("postprocess", output_dir.join(Self::OUTPUT_DIR))
            .run(|target| self.apply(&source, target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::load_trec_run;
    use tempfile::TempDir;

    #[test]
    fn test_static_searcher_copies_once() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("baseline.run");
        fs::write(&source, "q1 Q0 d1 1 2.0 x\n").unwrap();

        let searcher = StaticRunSearcher::new(&source);
        let out = searcher
            .query_from_file(Path::new("unused"), &temp.path().join("search"))
            .unwrap();
        let run = load_trec_run(&out.join(StaticRunSearcher::FILE_NAME)).unwrap();
        assert_eq!(run.entry_count(), 1);

        // a second call does not touch the (now missing) source
        fs::remove_file(&source).unwrap();
        assert!(searcher
            .query_from_file(Path::new("unused"), &temp.path().join("search"))
            .is_ok());
    }

    #[test]
    fn test_postprocessed_searcher_dedups_and_cuts() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("passages.run");
        fs::write(
            &source,
            "q1 Q0 a.0 1 3.0 x\nq1 Q0 a.1 2 2.5 x\nq1 Q0 b.0 3 2.0 x\nq1 Q0 c.0 4 1.0 x\n",
        )
        .unwrap();

        let searcher = PostProcessedSearcher::new(
            StaticRunSearcher::new(&source),
            PostProcessing {
                dedup: Some(".".to_string()),
                topn: Some(2),
                ..Default::default()
            },
        );
        let out = searcher
            .query_from_file(Path::new("unused"), &temp.path().join("search"))
            .unwrap();

        assert!(out.ends_with("postprocessed"));
        let run = load_trec_run(&out.join(StaticRunSearcher::FILE_NAME)).unwrap();
        assert_eq!(run.get("q1").unwrap().keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
