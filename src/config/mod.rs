//! Configuration management for foldrank
//!
//! One TOML file describes an experiment: benchmark inputs, the first-stage
//! searcher, post-processing, the reranker and evaluation. Selected keys can
//! be overridden from the environment.

use crate::error::{FoldrankError, Result};
use crate::eval::default_metrics;
use crate::index::StemmerKind;
use crate::search::{ScoringModel, DEFAULT_JAVA_OPTS};
use crate::topics::TopicField;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub experiment: ExperimentConfig,
    pub benchmark: BenchmarkConfig,
    pub search: SearchConfig,
    #[serde(default)]
    pub anserini: AnseriniConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub postprocess: PostprocessConfig,
    pub rerank: RerankConfig,
    #[serde(default)]
    pub eval: EvalConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Where results go and which fold runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub output_dir: PathBuf,
    pub fold: String,
}

/// Benchmark inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    pub topics: PathBuf,
    pub qrels: PathBuf,
    pub folds: PathBuf,
    #[serde(default = "default_field")]
    pub field: TopicField,
}

fn default_field() -> TopicField {
    TopicField::Title
}

/// Which first-stage engine runs the scoring model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchEngine {
    /// Anserini SearchCollection subprocess
    Anserini,
    /// In-process BM25 over `index.corpus`
    Memory,
    /// Copy of `search.static_run`
    Static,
}

/// First-stage search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub engine: SearchEngine,
    #[serde(default = "default_hits")]
    pub hits: usize,
    #[serde(default)]
    pub model: ScoringModel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_run: Option<PathBuf>,
    /// Restrict in-process BM25 to the documents of this run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates: Option<PathBuf>,
}

fn default_hits() -> usize {
    1000
}

/// Java invocation of Anserini
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnseriniConfig {
    pub java: String,
    pub jar: PathBuf,
    pub java_opts: Vec<String>,
    pub threads: usize,
}

impl Default for AnseriniConfig {
    fn default() -> Self {
        Self {
            java: "java".to_string(),
            jar: PathBuf::from("anserini-fatjar.jar"),
            java_opts: DEFAULT_JAVA_OPTS.iter().map(|s| s.to_string()).collect(),
            threads: 8,
        }
    }
}

/// Index location and analysis options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Anserini index directory
    pub path: PathBuf,
    /// JSONL corpus for the in-process index
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corpus: Option<PathBuf>,
    pub stemmer: StemmerKind,
    pub keep_stopwords: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("index"),
            corpus: None,
            stemmer: StemmerKind::Porter,
            keep_stopwords: false,
        }
    }
}

/// Run rewriting applied after search
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostprocessConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remove_list: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_list: Option<PathBuf>,
    pub dedup: bool,
    pub delimiter: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topn: Option<usize>,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            remove_list: None,
            keep_list: None,
            dedup: false,
            delimiter: crate::postprocess::PASSAGE_DELIMITER.to_string(),
            topn: None,
        }
    }
}

/// Reranker training and prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    /// External trainer program and its leading arguments
    pub command: Vec<String>,
    pub threshold: usize,
    pub optimize: String,
    #[serde(default)]
    pub include_train: bool,
}

/// Evaluation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub trec_eval: String,
    pub metrics: Vec<String>,
    pub relevance_level: i32,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            trec_eval: "trec_eval".to_string(),
            metrics: default_metrics(),
            relevance_level: 1,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FoldrankError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| FoldrankError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FoldrankError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| FoldrankError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: FOLDRANK_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("FOLDRANK_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "EXPERIMENT__FOLD" => {
                self.experiment.fold = value.to_string();
            }
            "EXPERIMENT__OUTPUT_DIR" => {
                self.experiment.output_dir = PathBuf::from(value);
            }
            "RERANK__THRESHOLD" => {
                self.rerank.threshold = parse_number(path, value)?;
            }
            "RERANK__OPTIMIZE" => {
                self.rerank.optimize = value.to_string();
            }
            "ANSERINI__THREADS" => {
                self.anserini.threads = parse_number(path, value)?;
            }
            "SEARCH__HITS" => {
                self.search.hits = parse_number(path, value)?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            FoldrankError::Config("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("foldrank").join("config.toml"))
    }
}

fn parse_number(path: &str, value: &str) -> Result<usize> {
    value.parse().map_err(|_| FoldrankError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}' as a positive integer", value),
    })
}

impl Default for Config {
    fn default() -> Self {
        let benchmark_dir = PathBuf::from("benchmark");

        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            experiment: ExperimentConfig {
                output_dir: PathBuf::from("results"),
                fold: "s1".to_string(),
            },
            benchmark: BenchmarkConfig {
                topics: benchmark_dir.join("topics.txt"),
                qrels: benchmark_dir.join("qrels.txt"),
                folds: benchmark_dir.join("folds.json"),
                field: TopicField::Title,
            },
            search: SearchConfig {
                engine: SearchEngine::Anserini,
                hits: default_hits(),
                model: ScoringModel::default(),
                static_run: None,
                candidates: None,
            },
            anserini: AnseriniConfig::default(),
            index: IndexConfig::default(),
            postprocess: PostprocessConfig::default(),
            rerank: RerankConfig {
                command: vec!["foldrank-trainer".to_string()],
                threshold: 100,
                optimize: "map".to_string(),
                include_train: false,
            },
            eval: EvalConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::ParamList;
    use tempfile::TempDir;

    #[test]
    fn test_default_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        Config::default().save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.experiment.fold, "s1");
        assert_eq!(loaded.search.model, ScoringModel::default());
        assert_eq!(loaded.eval.metrics, default_metrics());
    }

    #[test]
    fn test_grid_model_from_toml() {
        let toml = r#"
[_meta]
schema_version = "1.0.0"

[experiment]
output_dir = "out"
fold = "s2"

[benchmark]
topics = "topics.txt"
qrels = "qrels.txt"
folds = "folds.json"
field = "description"

[search]
engine = "memory"
hits = 50

[search.model]
name = "bm25"
k1 = "0.9,1.2"
b = [0.4, 0.6]

[index]
corpus = "corpus.jsonl"

[rerank]
command = ["python", "train.py"]
threshold = 20
optimize = "P_20"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.search.engine, SearchEngine::Memory);
        assert_eq!(config.benchmark.field, TopicField::Description);
        assert_eq!(
            config.search.model,
            ScoringModel::Bm25 {
                k1: ParamList::new(vec![0.9, 1.2]).unwrap(),
                b: ParamList::new(vec![0.4, 0.6]).unwrap(),
            }
        );
        assert_eq!(config.anserini.threads, 8);
        assert_eq!(config.postprocess.delimiter, ".");
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load(Path::new("/nonexistent/foldrank.toml"));
        assert!(matches!(result, Err(FoldrankError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_env_override_values() {
        let mut config = Config::default();
        config.set_value_from_env("RERANK__THRESHOLD", "250").unwrap();
        config.set_value_from_env("EXPERIMENT__FOLD", "s3").unwrap();
        assert_eq!(config.rerank.threshold, 250);
        assert_eq!(config.experiment.fold, "s3");
        assert!(config.set_value_from_env("ANSERINI__THREADS", "many").is_err());
    }
}
