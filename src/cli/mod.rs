//! CLI command definitions and parsing
use crate::search::ParamList;
use crate::topics::TopicField;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "foldrank",
    version,
    author = "neur0map",
    about = "Run processing and cross-validated reranking for IR experiments",
    long_about = "foldrank searches a benchmark, post-processes the resulting runs, trains a reranker \
                  per cross-validation fold and aggregates test metrics across folds. Every expensive \
                  stage is cached on disk and skipped when its output is complete."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/foldrank/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the configured first-stage searcher
    Search {
        /// Output directory (defaults to <experiment.output_dir>/search/runs)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Score topics with in-process BM25 over a JSONL corpus
    Bm25 {
        /// TREC topic file
        topics: PathBuf,

        /// JSONL corpus with `id` and `contents` fields
        corpus: PathBuf,

        /// Output directory for the grid run files
        output: PathBuf,

        /// k1 values: `0.9`, `0.9,1.2` or `0.5..1.5,0.1`
        #[arg(long, default_value = "0.9")]
        k1: ParamList,

        /// b values, same syntax as k1
        #[arg(long, default_value = "0.4")]
        b: ParamList,

        /// Documents kept per query
        #[arg(long, default_value = "1000")]
        hits: usize,

        /// Topic field used as query text
        #[arg(long, default_value = "title")]
        field: TopicField,

        /// Only score the documents of this run
        #[arg(long)]
        candidates: Option<PathBuf>,

        /// Cache directory for analyzed topics (defaults to <output>/cache)
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Disable Porter stemming
        #[arg(long)]
        no_stem: bool,

        /// Keep stopwords
        #[arg(long)]
        keep_stopwords: bool,
    },

    /// Remove or keep listed documents in every run of a directory
    Filter {
        /// Directory of run files, rewritten in place
        run_dir: PathBuf,

        /// Documents to remove (`docid` or `qid docid` per line)
        #[arg(long)]
        remove: Option<PathBuf>,

        /// Documents to keep (`docid` or `qid docid` per line)
        #[arg(long)]
        keep: Option<PathBuf>,

        /// Keep only the best N documents afterwards
        #[arg(long)]
        topn: Option<usize>,
    },

    /// Collapse passage ids into documents, keeping each document's best passage
    Dedup {
        /// Directory of run files, rewritten in place
        run_dir: PathBuf,

        /// Separator between document id and passage suffix
        #[arg(long, default_value = ".")]
        delimiter: String,

        /// Keep only the best N documents afterwards
        #[arg(long)]
        topn: Option<usize>,
    },

    /// Keep the best N documents per query in every run of a directory
    Topn {
        /// Directory of run files, rewritten in place
        run_dir: PathBuf,

        /// Documents kept per query
        n: usize,
    },

    /// Train, predict and evaluate the reranker for one fold
    Rerank {
        #[command(subcommand)]
        action: RerankAction,
    },

    /// Run the whole pipeline and print the cross-fold report
    Run {
        /// Run every declared fold instead of the configured one
        #[arg(long)]
        all_folds: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum RerankAction {
    /// Search, rank and train; writes dev and test predictions
    Train {
        /// Fold to train (defaults to experiment.fold)
        #[arg(short, long)]
        fold: Option<String>,
    },

    /// Evaluate test predictions, producing whatever is missing
    Evaluate {
        /// Fold to evaluate (defaults to experiment.fold)
        #[arg(short, long)]
        fold: Option<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Train, then evaluate
    Traineval {
        /// Fold to run (defaults to experiment.fold)
        #[arg(short, long)]
        fold: Option<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show only a specific section
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_bm25_grid_arguments() {
        let cli = Cli::try_parse_from([
            "foldrank", "bm25", "topics.txt", "corpus.jsonl", "out", "--k1", "0.9,1.2", "--b",
            "0.4..0.8,0.2", "--field", "desc",
        ])
        .unwrap();

        match cli.command {
            Commands::Bm25 { k1, b, field, .. } => {
                assert_eq!(k1.values(), &[0.9, 1.2]);
                assert_eq!(b.values(), &[0.4, 0.6]);
                assert_eq!(field, TopicField::Description);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_rerank_fold_override() {
        let cli = Cli::try_parse_from(["foldrank", "-v", "rerank", "evaluate", "--fold", "s3"])
            .unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Rerank {
                action: RerankAction::Evaluate { fold: Some(ref f), .. }
            } if f == "s3"
        ));
    }
}
