//! Fold-driven train / predict / evaluate
//!
//! Each fold gets a results directory `<rerank root>/fold-<name>`. Training,
//! dev and test predictions and the fold's test metrics all live below it:
//!
//! ```text
//! fold-s1/
//!   done
//!   train/               trainer output, best checkpoint
//!   pred/dev/best
//!   pred/test/best
//!   pred/test/metrics.json
//!   pred/train/best      only with include_train
//! ```
//!
//! Cross-fold aggregation finds the other folds' results by swapping the
//! `fold-<name>` path component.

mod folds;

pub use folds::{predict_split, train_split, Fold, FoldPredict, Folds, Split};

use crate::error::{FoldrankError, Result};
use crate::eval::{
    file_digest, mean_metrics, read_metrics, write_metrics, Evaluator, Metrics, MetricsCache,
};
use crate::rerank::{TrainRequest, Trainer};
use crate::run::{load_trec_run, write_trec_run, OrderedMap, Qrels, Run, WriteMode};
use crate::stage::Stage;
use serde::Serialize;
use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// File name of a prediction set
pub const PREDICTION_FILE: &str = "best";

/// File name of cached fold metrics
pub const METRICS_FILE: &str = "metrics.json";

pub fn fold_dir_name(fold: &str) -> String {
    format!("fold-{}", fold)
}

/// Replace the `fold-<current>` component of `path` with `fold-<other>`
pub fn substitute_fold(path: &Path, current: &str, other: &str) -> PathBuf {
    let from = fold_dir_name(current);
    let to = fold_dir_name(other);
    path.components()
        .map(|component| match component {
            Component::Normal(name) if name == OsStr::new(&from) => PathBuf::from(&to),
            other => PathBuf::from(other.as_os_str()),
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct CrossValidationSettings {
    /// Documents per query handed to the reranker when predicting
    pub threshold: usize,
    /// Metric the trainer selects its best dev checkpoint by
    pub optimize: String,
    pub metrics: Vec<String>,
    pub relevance_level: i32,
    /// Also predict the training queries
    pub include_train: bool,
}

/// Metrics of one fold plus their mean over every fold with results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossFoldReport {
    pub fold: String,
    pub metrics: Metrics,
    pub per_fold: OrderedMap<Metrics>,
    pub folds_included: usize,
    pub folds_declared: usize,
    pub missing_folds: Vec<String>,
}

pub struct CrossValidator<T, E> {
    trainer: T,
    evaluator: E,
    folds: Folds,
    fold_name: String,
    fold: Fold,
    qrels: Qrels,
    fold_dir: PathBuf,
    settings: CrossValidationSettings,
}

impl<T: Trainer, E: Evaluator> CrossValidator<T, E> {
    /// Driver for fold `fold_name`, with fold results under `rerank_root`
    pub fn new(
        trainer: T,
        evaluator: E,
        folds: Folds,
        fold_name: &str,
        qrels: Qrels,
        rerank_root: &Path,
        settings: CrossValidationSettings,
    ) -> Result<Self> {
        let fold = folds.get(fold_name)?.clone();
        Ok(Self {
            trainer,
            evaluator,
            folds,
            fold_name: fold_name.to_string(),
            fold,
            qrels,
            fold_dir: rerank_root.join(fold_dir_name(fold_name)),
            settings,
        })
    }

    pub fn fold_name(&self) -> &str {
        &self.fold_name
    }

    pub fn fold(&self) -> &Fold {
        &self.fold
    }

    pub fn qrels(&self) -> &Qrels {
        &self.qrels
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub fn trainer(&self) -> &T {
        &self.trainer
    }

    pub fn fold_dir(&self) -> &Path {
        &self.fold_dir
    }

    pub fn train_dir(&self) -> PathBuf {
        self.fold_dir.join("train")
    }

    pub fn pred_dir(&self, split: Split) -> PathBuf {
        self.fold_dir.join("pred").join(split.as_str())
    }

    pub fn prediction_path(&self, split: Split) -> PathBuf {
        self.pred_dir(split).join(PREDICTION_FILE)
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.pred_dir(Split::Test).join(METRICS_FILE)
    }

    pub fn stage(&self) -> Stage {
        Stage::new("rerank", &self.fold_dir)
    }

    /// Train on this fold and write dev, test and optionally train predictions
    pub fn rerank_run(&mut self, base: &Run) -> Result<PathBuf> {
        let stage = self.stage();
        stage.run(|_| self.train_and_predict(base))
    }

    fn train_and_predict(&mut self, base: &Run) -> Result<()> {
        self.trainer.prepare(base)?;

        let train_run = train_split(base, &self.fold);
        let dev_run = predict_split(base, &self.fold.predict.dev, self.settings.threshold);
        let train_dir = self.train_dir();
        let dev_dir = self.pred_dir(Split::Dev);
        tracing::info!(
            "Training fold {} on {} queries ({} dev)",
            self.fold_name,
            train_run.len(),
            dev_run.len()
        );
        self.trainer.train(&TrainRequest {
            train_run: &train_run,
            dev_run: &dev_run,
            qrels: &self.qrels,
            output_dir: &train_dir,
            dev_output_dir: &dev_dir,
            optimize: &self.settings.optimize,
            relevance_level: self.settings.relevance_level,
        })?;

        self.trainer.load_best_model(&train_dir)?;
        self.predict_into(base, Split::Dev)?;
        self.predict_into(base, Split::Test)?;
        if self.settings.include_train {
            self.predict_into(base, Split::Train)?;
        }
        Ok(())
    }

    fn predict_into(&mut self, base: &Run, split: Split) -> Result<Run> {
        let run = match split {
            Split::Train => train_split(base, &self.fold),
            Split::Dev | Split::Test => {
                predict_split(base, self.fold.qids(split), self.settings.threshold)
            }
        };
        let dir = self.pred_dir(split);
        let predictions = self.trainer.predict(&run, &dir)?;
        let path = dir.join(PREDICTION_FILE);
        let metrics_path = dir.join(METRICS_FILE);
        if metrics_path.exists() {
            fs::remove_file(&metrics_path).map_err(|e| {
                FoldrankError::io(e, format!("Failed to remove {}", metrics_path.display()))
            })?;
        }
        write_trec_run(&predictions, &path, WriteMode::Truncate)?;
        tracing::info!(
            "Wrote {} predictions for {} queries to {}",
            split.as_str(),
            predictions.len(),
            path.display()
        );
        Ok(predictions)
    }

    /// Load the best model and predict the thresholded test split
    pub fn predict(&mut self, base: &Run) -> Result<Run> {
        self.trainer.load_best_model(&self.train_dir())?;
        self.predict_into(base, Split::Test)
    }

    /// Test predictions for this fold, computing only what is missing.
    ///
    /// `base` is called only when predictions have to be produced.
    pub fn ensure_test_predictions<F>(&mut self, base: F) -> Result<PathBuf>
    where
        F: FnOnce() -> Result<Run>,
    {
        let path = self.prediction_path(Split::Test);
        if path.exists() {
            tracing::debug!("Reusing test predictions {}", path.display());
            return Ok(path);
        }

        let base = base()?;
        if self.stage().is_done() {
            self.predict(&base)?;
        } else {
            self.rerank_run(&base)?;
        }
        Ok(path)
    }

    /// Test metrics of this fold, cached next to the predictions
    pub fn fold_metrics(&self) -> Result<Metrics> {
        self.metrics_for(&self.prediction_path(Split::Test))
    }

    fn metrics_for(&self, prediction_path: &Path) -> Result<Metrics> {
        let digest = file_digest(prediction_path)?;
        if let Some(values) = self.cached_metrics(prediction_path, Some(&digest)) {
            return Ok(values);
        }

        let predictions = load_trec_run(prediction_path)?;
        let values = self.evaluator.eval_runs(
            &predictions,
            &self.qrels,
            &self.settings.metrics,
            self.settings.relevance_level,
        )?;
        let cache = MetricsCache {
            metrics: self.settings.metrics.clone(),
            relevance_level: self.settings.relevance_level,
            predictions: digest,
            values,
        };
        write_metrics(&cache, &prediction_path.with_file_name(METRICS_FILE))?;
        Ok(cache.values)
    }

    /// Cached metrics for `prediction_path`, if they were computed with the
    /// current settings (and from `digest`, when given)
    fn cached_metrics(&self, prediction_path: &Path, digest: Option<&str>) -> Option<Metrics> {
        let metrics_path = prediction_path.with_file_name(METRICS_FILE);
        if !metrics_path.exists() {
            return None;
        }
        match read_metrics(&metrics_path) {
            Ok(cache)
                if cache.matches(
                    &self.settings.metrics,
                    self.settings.relevance_level,
                    digest,
                ) =>
            {
                Some(cache.values)
            }
            Ok(_) => {
                tracing::debug!("Metrics in {} are stale", metrics_path.display());
                None
            }
            Err(e) => {
                tracing::warn!("Ignoring unreadable metrics cache: {}", e);
                None
            }
        }
    }

    /// Mean test metrics over every declared fold that has predictions
    pub fn aggregate(&self) -> Result<CrossFoldReport> {
        let test_path = self.prediction_path(Split::Test);
        let mut per_fold = OrderedMap::new();
        let mut missing_folds = Vec::new();

        for name in self.folds.names() {
            let path = substitute_fold(&test_path, &self.fold_name, name);
            if path.exists() {
                per_fold.insert(name, self.metrics_for(&path)?);
                continue;
            }
            if let Some(values) = self.cached_metrics(&path, None) {
                per_fold.insert(name, values);
            } else {
                let missing = FoldrankError::MissingFold {
                    fold: name.to_string(),
                    path,
                };
                tracing::warn!("Skipping fold in aggregate: {}", missing);
                missing_folds.push(name.to_string());
            }
        }

        let report = CrossFoldReport {
            fold: self.fold_name.clone(),
            metrics: mean_metrics(per_fold.values()),
            folds_included: per_fold.len(),
            folds_declared: self.folds.len(),
            per_fold,
            missing_folds,
        };
        tracing::info!(
            "Aggregated {}/{} folds",
            report.folds_included,
            report.folds_declared
        );
        Ok(report)
    }

    /// Predict this fold if needed, score it, and aggregate across folds
    pub fn evaluate<F>(&mut self, base: F) -> Result<CrossFoldReport>
    where
        F: FnOnce() -> Result<Run>,
    {
        self.ensure_test_predictions(base)?;
        let metrics = self.fold_metrics()?;
        tracing::info!("Fold {} test metrics: {:?}", self.fold_name, metrics);
        self.aggregate()
    }
}
