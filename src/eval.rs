//! Run evaluation against relevance judgments
//!
//! Metric formulas stay external: [`TrecEval`] shells out to `trec_eval`.
//! Per-fold metrics are cached as JSON next to the predictions they score.

use crate::error::{FoldrankError, Result};
use crate::run::{write_qrels, write_trec_run, Qrels, Run, WriteMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Metric name → value
pub type Metrics = BTreeMap<String, f64>;

pub const DEFAULT_METRICS: [&str; 6] = [
    "map",
    "P_20",
    "ndcg_cut_20",
    "P_10",
    "ndcg_cut_10",
    "recip_rank",
];

pub fn default_metrics() -> Vec<String> {
    DEFAULT_METRICS.iter().map(|m| m.to_string()).collect()
}

/// Scores a run against judgments
pub trait Evaluator {
    fn eval_runs(
        &self,
        run: &Run,
        qrels: &Qrels,
        metrics: &[String],
        relevance_level: i32,
    ) -> Result<Metrics>;
}

impl<E: Evaluator + ?Sized> Evaluator for &E {
    fn eval_runs(
        &self,
        run: &Run,
        qrels: &Qrels,
        metrics: &[String],
        relevance_level: i32,
    ) -> Result<Metrics> {
        (**self).eval_runs(run, qrels, metrics, relevance_level)
    }
}

/// `trec_eval` subprocess
#[derive(Debug, Clone)]
pub struct TrecEval {
    program: PathBuf,
}

impl TrecEval {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn command_args(
        metrics: &[String],
        relevance_level: i32,
        qrels: &Path,
        run: &Path,
    ) -> Vec<String> {
        let mut args = vec!["-l".to_string(), relevance_level.to_string()];
        for metric in metrics {
            args.push("-m".to_string());
            args.push(trec_eval_measure(metric));
        }
        args.push(qrels.display().to_string());
        args.push(run.display().to_string());
        args
    }
}

impl Default for TrecEval {
    fn default() -> Self {
        Self::new("trec_eval")
    }
}

impl Evaluator for TrecEval {
    fn eval_runs(
        &self,
        run: &Run,
        qrels: &Qrels,
        metrics: &[String],
        relevance_level: i32,
    ) -> Result<Metrics> {
        let scratch = tempfile::Builder::new()
            .prefix("foldrank-eval")
            .tempdir()
            .map_err(|e| FoldrankError::io(e, "Failed to create evaluation scratch directory"))?;
        let run_path = scratch.path().join("run");
        let qrels_path = scratch.path().join("qrels");
        write_trec_run(run, &run_path, WriteMode::Truncate)?;
        write_qrels(qrels, &qrels_path)?;

        let args = Self::command_args(metrics, relevance_level, &qrels_path, &run_path);
        tracing::debug!("{} {}", self.program.display(), args.join(" "));
        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| {
                FoldrankError::io(e, format!("Failed to start {}", self.program.display()))
            })?;

        if !output.status.success() {
            return Err(FoldrankError::ExternalProcess {
                program: self.program.display().to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_trec_eval_output(&stdout, metrics))
    }
}

/// `P_10` is requested as `P.10`; names without a numeric cutoff pass through
pub fn trec_eval_measure(metric: &str) -> String {
    match metric.rsplit_once('_') {
        Some((base, cutoff)) if !cutoff.is_empty() && cutoff.bytes().all(|b| b.is_ascii_digit()) => {
            format!("{}.{}", base, cutoff)
        }
        _ => metric.to_string(),
    }
}

/// Summary lines (`<measure> all <value>`) for the requested metrics
fn parse_trec_eval_output(stdout: &str, metrics: &[String]) -> Metrics {
    let mut parsed = Metrics::new();
    for line in stdout.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if let [name, "all", value] = fields.as_slice() {
            if metrics.iter().any(|m| m == name) {
                if let Ok(value) = value.parse::<f64>() {
                    parsed.insert(name.to_string(), value);
                }
            }
        }
    }
    parsed
}

/// Per-metric mean over every input that reports the metric
pub fn mean_metrics<'a, I>(all: I) -> Metrics
where
    I: IntoIterator<Item = &'a Metrics>,
{
    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for metrics in all {
        for (name, value) in metrics {
            let entry = sums.entry(name.clone()).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(name, (sum, count))| (name, sum / count as f64))
        .collect()
}

/// Metrics cached next to the predictions they were computed from.
///
/// A cache entry only answers for the same metric list, relevance level and
/// prediction file content it was written for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsCache {
    pub metrics: Vec<String>,
    pub relevance_level: i32,
    /// blake3 digest of the scored prediction file
    pub predictions: String,
    pub values: Metrics,
}

impl MetricsCache {
    /// Whether this entry was computed with `metrics` at `relevance_level`.
    /// When `predictions` is given it must also match the stored digest.
    pub fn matches(&self, metrics: &[String], relevance_level: i32, predictions: Option<&str>) -> bool {
        self.metrics == metrics
            && self.relevance_level == relevance_level
            && predictions.map_or(true, |digest| digest == self.predictions)
    }
}

/// Hex blake3 digest of a file's content
pub fn file_digest(path: &Path) -> Result<String> {
    let bytes = fs::read(path)
        .map_err(|e| FoldrankError::io(e, format!("Failed to read {}", path.display())))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

pub fn read_metrics(path: &Path) -> Result<MetricsCache> {
    let content = fs::read_to_string(path)
        .map_err(|e| FoldrankError::io(e, format!("Failed to read metrics: {}", path.display())))?;
    serde_json::from_str(&content).map_err(|e| FoldrankError::Json {
        source: e,
        context: format!("Failed to parse metrics: {}", path.display()),
    })
}

pub fn write_metrics(cache: &MetricsCache, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            FoldrankError::io(e, format!("Failed to create directory: {}", parent.display()))
        })?;
    }
    let json = serde_json::to_string_pretty(cache).map_err(|e| FoldrankError::Json {
        source: e,
        context: "Failed to serialize metrics".to_string(),
    })?;
    fs::write(path, json)
        .map_err(|e| FoldrankError::io(e, format!("Failed to write metrics: {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_measure_names() {
        assert_eq!(trec_eval_measure("P_10"), "P.10");
        assert_eq!(trec_eval_measure("ndcg_cut_20"), "ndcg_cut.20");
        assert_eq!(trec_eval_measure("map"), "map");
        assert_eq!(trec_eval_measure("recip_rank"), "recip_rank");
    }

    #[test]
    fn test_command_args() {
        let metrics = vec!["map".to_string(), "P_10".to_string()];
        let args = TrecEval::command_args(&metrics, 2, Path::new("q"), Path::new("r"));
        assert_eq!(args.join(" "), "-l 2 -m map -m P.10 q r");
    }

    #[test]
    fn test_parse_summary_lines() {
        let stdout = "map                   \tall\t0.2500\nP_10                  \tall\t0.4000\nmap\t301\t0.1\n";
        let metrics = vec!["map".to_string(), "P_10".to_string()];
        let parsed = parse_trec_eval_output(stdout, &metrics);
        assert_eq!(parsed.get("map"), Some(&0.25));
        assert_eq!(parsed.get("P_10"), Some(&0.4));
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn test_mean_skips_absent_metrics() {
        let a = Metrics::from([("map".to_string(), 0.2), ("P_10".to_string(), 0.5)]);
        let b = Metrics::from([("map".to_string(), 0.4)]);
        let mean = mean_metrics([&a, &b]);
        assert!((mean["map"] - 0.3).abs() < 1e-12);
        assert_eq!(mean["P_10"], 0.5);
    }

    #[test]
    fn test_metrics_cache_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("pred/test/metrics.json");
        let cache = MetricsCache {
            metrics: vec!["map".to_string()],
            relevance_level: 1,
            predictions: "abc".to_string(),
            values: Metrics::from([("map".to_string(), 0.31)]),
        };
        write_metrics(&cache, &path).unwrap();
        assert_eq!(read_metrics(&path).unwrap(), cache);
    }

    #[test]
    fn test_metrics_cache_matching() {
        let cache = MetricsCache {
            metrics: vec!["map".to_string()],
            relevance_level: 1,
            predictions: "abc".to_string(),
            values: Metrics::new(),
        };
        let map = vec!["map".to_string()];
        assert!(cache.matches(&map, 1, Some("abc")));
        assert!(cache.matches(&map, 1, None));
        assert!(!cache.matches(&map, 1, Some("def")));
        assert!(!cache.matches(&map, 2, Some("abc")));
        assert!(!cache.matches(&["P_10".to_string()], 1, Some("abc")));
    }

    #[test]
    fn test_file_digest_follows_content() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("best");
        fs::write(&path, "1 Q0 a 1 1 x\n").unwrap();
        let first = file_digest(&path).unwrap();
        assert_eq!(first, file_digest(&path).unwrap());
        fs::write(&path, "1 Q0 b 1 1 x\n").unwrap();
        assert_ne!(first, file_digest(&path).unwrap());
    }
}
