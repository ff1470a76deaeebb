use crate::config::{Config, SearchEngine, SCHEMA_VERSION};
use crate::error::{FoldrankError, Result, ValidationError};
use crate::search::ScoringModel;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_experiment(config, &mut errors);
        Self::validate_benchmark(config, &mut errors);
        Self::validate_search(config, &mut errors);
        Self::validate_postprocess(config, &mut errors);
        Self::validate_rerank(config, &mut errors);
        Self::validate_eval(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(FoldrankError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_experiment(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.experiment.output_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "experiment.output_dir",
                "Output directory cannot be empty",
            ));
        }

        if config.experiment.fold.trim().is_empty() {
            errors.push(ValidationError::new(
                "experiment.fold",
                "Fold name cannot be empty",
            ));
        }
    }

    fn validate_benchmark(config: &Config, errors: &mut Vec<ValidationError>) {
        // Existence is checked when the files are read; paths may be
        // relative to a working directory chosen later.
        let paths = [
            ("benchmark.topics", &config.benchmark.topics),
            ("benchmark.qrels", &config.benchmark.qrels),
            ("benchmark.folds", &config.benchmark.folds),
        ];
        for (key, path) in paths {
            if path.as_os_str().is_empty() {
                errors.push(ValidationError::new(key, "Path cannot be empty"));
            }
        }
    }

    fn validate_search(config: &Config, errors: &mut Vec<ValidationError>) {
        let search = &config.search;
        if search.hits == 0 {
            errors.push(ValidationError::new(
                "search.hits",
                "Hits must be greater than 0",
            ));
        }

        match search.engine {
            SearchEngine::Anserini => {
                if config.anserini.threads == 0 {
                    errors.push(ValidationError::new(
                        "anserini.threads",
                        "Thread count must be greater than 0",
                    ));
                }
                if config.anserini.jar.as_os_str().is_empty() {
                    errors.push(ValidationError::new(
                        "anserini.jar",
                        "Anserini jar path cannot be empty",
                    ));
                }
            }
            SearchEngine::Memory => {
                if !matches!(
                    search.model,
                    ScoringModel::Bm25 { .. } | ScoringModel::Bm25Grid { .. }
                ) {
                    errors.push(ValidationError::new(
                        "search.model.name",
                        format!(
                            "The memory engine only scores bm25 and bm25_grid, got '{}'",
                            search.model.name()
                        ),
                    ));
                }
                if config.index.corpus.is_none() {
                    errors.push(ValidationError::new(
                        "index.corpus",
                        "The memory engine needs a JSONL corpus",
                    ));
                }
            }
            SearchEngine::Static => {
                if search.static_run.is_none() {
                    errors.push(ValidationError::new(
                        "search.static_run",
                        "The static engine needs a run file",
                    ));
                }
            }
        }

        for (name, values) in search.model.param_lists() {
            if values.values().iter().any(|v| !v.is_finite() || *v < 0.0) {
                errors.push(ValidationError::new(
                    format!("search.model.{}", name),
                    format!("Parameter values must be finite and non-negative: {}", values),
                ));
            }
        }
    }

    fn validate_postprocess(config: &Config, errors: &mut Vec<ValidationError>) {
        let postprocess = &config.postprocess;
        if postprocess.dedup && postprocess.delimiter.is_empty() {
            errors.push(ValidationError::new(
                "postprocess.delimiter",
                "Passage delimiter cannot be empty when dedup is enabled",
            ));
        }

        if postprocess.topn == Some(0) {
            errors.push(ValidationError::new(
                "postprocess.topn",
                "Top-N must be greater than 0",
            ));
        }
    }

    fn validate_rerank(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.rerank.command.is_empty() {
            errors.push(ValidationError::new(
                "rerank.command",
                "Trainer command cannot be empty",
            ));
        }

        if config.rerank.threshold == 0 {
            errors.push(ValidationError::new(
                "rerank.threshold",
                "Threshold must be greater than 0",
            ));
        }

        if config.rerank.optimize.trim().is_empty() {
            errors.push(ValidationError::new(
                "rerank.optimize",
                "Optimize metric cannot be empty",
            ));
        }
    }

    fn validate_eval(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.eval.metrics.is_empty() {
            errors.push(ValidationError::new(
                "eval.metrics",
                "At least one metric is required",
            ));
        }

        if config.eval.trec_eval.is_empty() {
            errors.push(ValidationError::new(
                "eval.trec_eval",
                "trec_eval program cannot be empty",
            ));
        }
    }
}
