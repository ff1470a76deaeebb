//! Staged search → rank → rerank → evaluate pipeline
//!
//! Every stage writes below one experiment root and is guarded by a
//! completion marker, so re-running an experiment only does the work that
//! is missing:
//!
//! ```text
//! <root>/search/                  searcher output (runs.path points at it)
//! <root>/rank/fold-<id>/best.json best first-stage run for the fold
//! <root>/rerank/fold-<id>/        cross-validation results
//! ```

use crate::crossval::{
    fold_dir_name, CrossFoldReport, CrossValidationSettings, CrossValidator, Folds,
};
use crate::error::{FoldrankError, Result};
use crate::eval::Evaluator;
use crate::postprocess::run_files;
use crate::rerank::Trainer;
use crate::run::{load_trec_run, Qrels};
use crate::search::Searcher;
use crate::stage::Stage;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// File in the search stage directory naming the searcher's run directory
pub const RUN_DIR_POINTER: &str = "runs.path";

/// Cached result of the rank stage
pub const BEST_RUN_FILE: &str = "best.json";

/// First-stage run chosen for a fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestRun {
    pub path: PathBuf,
    pub metric: String,
    pub score: f64,
}

/// Pick the run file in `run_dir` scoring highest on `metric` over `qids`.
///
/// Files are tried in name order and a later file must score strictly
/// higher to win.
pub fn select_best_run<E>(
    run_dir: &Path,
    qids: &HashSet<String>,
    qrels: &Qrels,
    evaluator: &E,
    metric: &str,
    relevance_level: i32,
) -> Result<BestRun>
where
    E: Evaluator + ?Sized,
{
    let metrics = vec![metric.to_string()];
    let mut best: Option<BestRun> = None;

    for path in run_files(run_dir)? {
        let run = load_trec_run(&path)?.select_queries(|qid| qids.contains(qid), None);
        let scores = evaluator.eval_runs(&run, qrels, &metrics, relevance_level)?;
        let score = scores.get(metric).copied().unwrap_or(0.0);
        tracing::debug!("{} = {} for {}", metric, score, path.display());

        if best.as_ref().map_or(true, |b| score > b.score) {
            best = Some(BestRun {
                path,
                metric: metric.to_string(),
                score,
            });
        }
    }

    best.ok_or_else(|| {
        FoldrankError::InvalidArgument(format!("no run files in {}", run_dir.display()))
    })
}

/// Where and how one fold of an experiment runs
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub root: PathBuf,
    pub topics: PathBuf,
    pub fold: String,
    /// Also carries the metric the rank stage and the trainer maximize
    pub crossval: CrossValidationSettings,
}

pub struct Pipeline<S, T, E> {
    searcher: S,
    crossval: CrossValidator<T, E>,
    root: PathBuf,
    topics: PathBuf,
    optimize: String,
    relevance_level: i32,
}

impl<S: Searcher, T: Trainer, E: Evaluator> Pipeline<S, T, E> {
    pub fn new(
        config: PipelineConfig,
        searcher: S,
        trainer: T,
        evaluator: E,
        folds: Folds,
        qrels: Qrels,
    ) -> Result<Self> {
        let relevance_level = config.crossval.relevance_level;
        let optimize = config.crossval.optimize.clone();
        let crossval = CrossValidator::new(
            trainer,
            evaluator,
            folds,
            &config.fold,
            qrels,
            &config.root.join("rerank"),
            config.crossval,
        )?;
        Ok(Self {
            searcher,
            crossval,
            root: config.root,
            topics: config.topics,
            optimize,
            relevance_level,
        })
    }

    pub fn crossval(&self) -> &CrossValidator<T, E> {
        &self.crossval
    }

    pub fn searcher(&self) -> &S {
        &self.searcher
    }

    pub fn search_dir(&self) -> PathBuf {
        self.root.join("search")
    }

    pub fn rank_dir(&self) -> PathBuf {
        self.root
            .join("rank")
            .join(fold_dir_name(self.crossval.fold_name()))
    }

    /// Run the searcher once; returns the directory holding its run files
    pub fn search(&self) -> Result<PathBuf> {
        let stage = Stage::new("search", self.search_dir());
        let pointer = stage.output_dir().join(RUN_DIR_POINTER);
        stage.run(|dir| {
            tracing::info!("Searching with {}", self.searcher.name());
            let run_dir = self.searcher.query_from_file(&self.topics, &dir.join("runs"))?;
            fs::write(&pointer, run_dir.display().to_string()).map_err(|e| {
                FoldrankError::io(e, format!("Failed to write {}", pointer.display()))
            })
        })?;

        let content = fs::read_to_string(&pointer)
            .map_err(|e| FoldrankError::io(e, format!("Failed to read {}", pointer.display())))?;
        Ok(PathBuf::from(content.trim()))
    }

    /// Choose the fold's best first-stage run on its training queries
    pub fn rank(&self, run_dir: &Path) -> Result<BestRun> {
        let stage = Stage::new("rank", self.rank_dir());
        let best_path = stage.output_dir().join(BEST_RUN_FILE);
        stage.run(|_| {
            let best = select_best_run(
                run_dir,
                &self.crossval.fold().train_qids,
                self.crossval.qrels(),
                self.crossval.evaluator(),
                &self.optimize,
                self.relevance_level,
            )?;
            tracing::info!(
                "Best run for fold {}: {} ({} = {})",
                self.crossval.fold_name(),
                best.path.display(),
                best.metric,
                best.score
            );
            let json = serde_json::to_string_pretty(&best).map_err(|e| FoldrankError::Json {
                source: e,
                context: "Failed to serialize best run".to_string(),
            })?;
            fs::write(&best_path, json).map_err(|e| {
                FoldrankError::io(e, format!("Failed to write {}", best_path.display()))
            })
        })?;

        let content = fs::read_to_string(&best_path)
            .map_err(|e| FoldrankError::io(e, format!("Failed to read {}", best_path.display())))?;
        serde_json::from_str(&content).map_err(|e| FoldrankError::Json {
            source: e,
            context: format!("Failed to parse {}", best_path.display()),
        })
    }

    /// Search, rank and train this fold
    pub fn train(&mut self) -> Result<PathBuf> {
        let run_dir = self.search()?;
        let best = self.rank(&run_dir)?;
        let base = load_trec_run(&best.path)?;
        self.crossval.rerank_run(&base)
    }

    /// Everything still missing for this fold, then the cross-fold report
    pub fn evaluate(&mut self) -> Result<CrossFoldReport> {
        let run_dir = self.search()?;
        let best = self.rank(&run_dir)?;
        self.crossval.evaluate(|| load_trec_run(&best.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::Metrics;
    use crate::rerank::TrainRequest;
    use crate::run::Run;
    use std::cell::Cell;

    /// Scores a run by how many of its documents are named "rel"
    struct ScoresByName;

    impl Evaluator for ScoresByName {
        fn eval_runs(&self, run: &Run, _: &Qrels, metrics: &[String], _: i32) -> Result<Metrics> {
            let hits = run
                .values()
                .flat_map(|docs| docs.keys())
                .filter(|docid| *docid == "rel")
                .count();
            Ok(metrics.iter().map(|m| (m.clone(), hits as f64)).collect())
        }
    }

    #[test]
    fn test_select_best_run_prefers_first_on_ties() {
        let temp = tempfile::TempDir::new().unwrap();
        fs::write(temp.path().join("a"), "1 Q0 rel 1 1.0 x\n").unwrap();
        fs::write(temp.path().join("b"), "1 Q0 rel 1 1.0 x\n").unwrap();
        fs::write(temp.path().join("c"), "1 Q0 other 1 1.0 x\n").unwrap();
        fs::write(temp.path().join("done"), "done\n").unwrap();

        let qids = HashSet::from(["1".to_string()]);
        let best =
            select_best_run(temp.path(), &qids, &Qrels::new(), &ScoresByName, "map", 1).unwrap();
        assert_eq!(best.path, temp.path().join("a"));
        assert_eq!(best.score, 1.0);
    }

    #[test]
    fn test_select_best_run_ignores_other_queries() {
        let temp = tempfile::TempDir::new().unwrap();
        fs::write(temp.path().join("a"), "9 Q0 rel 1 1.0 x\n1 Q0 other 1 1.0 x\n").unwrap();
        fs::write(temp.path().join("b"), "1 Q0 rel 1 1.0 x\n").unwrap();

        let qids = HashSet::from(["1".to_string()]);
        let best =
            select_best_run(temp.path(), &qids, &Qrels::new(), &ScoresByName, "map", 1).unwrap();
        assert_eq!(best.path, temp.path().join("b"));
    }

    #[test]
    fn test_empty_run_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        let result = select_best_run(
            temp.path(),
            &HashSet::new(),
            &Qrels::new(),
            &ScoresByName,
            "map",
            1,
        );
        assert!(matches!(result, Err(FoldrankError::InvalidArgument(_))));
    }

    struct NoopTrainer;

    impl Trainer for NoopTrainer {
        fn prepare(&mut self, _: &Run) -> Result<()> {
            Ok(())
        }
        fn train(&mut self, _: &TrainRequest<'_>) -> Result<()> {
            Ok(())
        }
        fn load_best_model(&mut self, _: &Path) -> Result<()> {
            Ok(())
        }
        fn predict(&mut self, run: &Run, _: &Path) -> Result<Run> {
            Ok(run.clone())
        }
    }

    struct FixedSearcher {
        calls: Cell<usize>,
    }

    impl Searcher for FixedSearcher {
        fn name(&self) -> String {
            "fixed".to_string()
        }

        fn query_from_file(&self, _: &Path, output_dir: &Path) -> Result<PathBuf> {
            self.calls.set(self.calls.get() + 1);
            fs::create_dir_all(output_dir).unwrap();
            fs::write(output_dir.join("run"), "1 Q0 rel 1 2.0 x\n2 Q0 rel 1 2.0 x\n").unwrap();
            Ok(output_dir.to_path_buf())
        }
    }

    #[test]
    fn test_search_and_rank_run_once() {
        let temp = tempfile::TempDir::new().unwrap();
        let folds: Folds = serde_json::from_str(
            r#"{"s1": {"train_qids": ["1"], "predict": {"dev": ["2"], "test": ["2"]}}}"#,
        )
        .unwrap();
        let searcher = FixedSearcher {
            calls: Cell::new(0),
        };
        let config = PipelineConfig {
            root: temp.path().to_path_buf(),
            topics: temp.path().join("topics.txt"),
            fold: "s1".to_string(),
            crossval: CrossValidationSettings {
                threshold: 10,
                optimize: "map".to_string(),
                metrics: vec!["map".to_string()],
                relevance_level: 1,
                include_train: false,
            },
        };
        let mut pipeline = Pipeline::new(
            config,
            &searcher,
            NoopTrainer,
            ScoresByName,
            folds,
            Qrels::new(),
        )
        .unwrap();

        let first = pipeline.evaluate().unwrap();
        let second = pipeline.evaluate().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.folds_included, 1);
        assert_eq!(searcher.calls.get(), 1);
        assert!(pipeline.rank_dir().join(BEST_RUN_FILE).exists());
    }
}
