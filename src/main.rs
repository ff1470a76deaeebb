use foldrank::cli::{Cli, Commands, ConfigAction, RerankAction};
use foldrank::config::{Config, SearchEngine};
use foldrank::crossval::{fold_dir_name, CrossFoldReport, CrossValidationSettings, Folds};
use foldrank::error::{FoldrankError, Result};
use foldrank::eval::TrecEval;
use foldrank::index::{Analyzer, MemoryIndex, StemmerKind};
use foldrank::pipeline::{Pipeline, PipelineConfig};
use foldrank::postprocess::{self, DocList};
use foldrank::rerank::CommandTrainer;
use foldrank::run::{load_qrels, load_trec_run, Qrels};
use foldrank::search::{
    AnseriniRunner, AnseriniSearcher, Bm25Reranker, PostProcessedSearcher, PostProcessing,
    Searcher, StaticRunSearcher,
};
use std::path::{Path, PathBuf};

type ExperimentPipeline<'a> = Pipeline<&'a dyn Searcher, CommandTrainer, TrecEval>;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Search { output } => {
            cmd_search(cli.config, output)?;
        }
        Commands::Bm25 {
            topics,
            corpus,
            output,
            k1,
            b,
            hits,
            field,
            candidates,
            cache_dir,
            no_stem,
            keep_stopwords,
        } => {
            let stemmer = if no_stem {
                StemmerKind::None
            } else {
                StemmerKind::Porter
            };
            let index = MemoryIndex::from_jsonl(&corpus, Analyzer::new(stemmer, keep_stopwords))?;
            let cache_dir = cache_dir.unwrap_or_else(|| output.join("cache"));
            let mut reranker = Bm25Reranker::new(&index, &k1, &b, hits, field, cache_dir);
            if let Some(path) = candidates {
                reranker = reranker.with_candidates(load_trec_run(&path)?);
            }
            let run_dir = reranker.rerank(&topics, &output)?;
            println!("✓ {} run(s) written to {}", reranker.grid().len(), run_dir.display());
        }
        Commands::Filter {
            run_dir,
            remove,
            keep,
            topn,
        } => {
            let remove = remove.as_deref().map(DocList::load).transpose()?;
            let keep = keep.as_deref().map(DocList::load).transpose()?;
            postprocess::filter_dir(&run_dir, remove.as_ref(), keep.as_ref(), topn)?;
            println!("✓ Filtered runs in {}", run_dir.display());
        }
        Commands::Dedup {
            run_dir,
            delimiter,
            topn,
        } => {
            postprocess::dedup_dir(&run_dir, &delimiter, topn)?;
            println!("✓ Deduplicated runs in {}", run_dir.display());
        }
        Commands::Topn { run_dir, n } => {
            postprocess::keep_topn_dir(&run_dir, n)?;
            println!("✓ Kept top {} documents per query in {}", n, run_dir.display());
        }
        Commands::Rerank { action } => {
            cmd_rerank(cli.config, action)?;
        }
        Commands::Run { all_folds, json } => {
            cmd_run(cli.config, all_folds, json)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "foldrank=debug" } else { "foldrank=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn cmd_search(config_path: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;

    let run_dir = with_searcher(&config, |searcher| match &output {
        Some(output) => searcher.query_from_file(&config.benchmark.topics, output),
        None => build_pipeline(&config, searcher)?.search(),
    })?;

    println!("✓ Runs written to {}", run_dir.display());
    Ok(())
}

fn cmd_rerank(config_path: Option<PathBuf>, action: RerankAction) -> Result<()> {
    let mut config = load_config(config_path)?;

    let (fold, train, evaluate, json) = match action {
        RerankAction::Train { fold } => (fold, true, false, false),
        RerankAction::Evaluate { fold, json } => (fold, false, true, json),
        RerankAction::Traineval { fold, json } => (fold, true, true, json),
    };
    if let Some(fold) = fold {
        config.experiment.fold = fold;
    }

    with_searcher(&config, |searcher| {
        let mut pipeline = build_pipeline(&config, searcher)?;
        if train {
            let checkpoint = pipeline.train()?;
            println!(
                "✓ Fold {} trained, predictions under {}",
                config.experiment.fold,
                checkpoint.display()
            );
        }
        if evaluate {
            let report = pipeline.evaluate()?;
            print_report(&report, json)?;
        }
        Ok(())
    })
}

fn cmd_run(config_path: Option<PathBuf>, all_folds: bool, json: bool) -> Result<()> {
    let config = load_config(config_path)?;

    let folds: Vec<String> = if all_folds {
        Folds::load(&config.benchmark.folds)?
            .names()
            .map(str::to_string)
            .collect()
    } else {
        vec![config.experiment.fold.clone()]
    };

    let report = with_searcher(&config, |searcher| {
        let mut last = None;
        for fold in &folds {
            let mut fold_config = config.clone();
            fold_config.experiment.fold = fold.clone();
            tracing::info!("Running fold {}", fold);
            last = Some(build_pipeline(&fold_config, searcher)?.evaluate()?);
        }
        last.ok_or_else(|| FoldrankError::InvalidArgument("no folds to run".to_string()))
    })?;

    print_report(&report, json)
}

/// Build the configured searcher and hand it to `body`
fn with_searcher<R>(
    config: &Config,
    body: impl FnOnce(&dyn Searcher) -> Result<R>,
) -> Result<R> {
    let steps = postprocessing(config)?;

    match config.search.engine {
        SearchEngine::Anserini => {
            let searcher = AnseriniSearcher::new(
                AnseriniRunner::from_config(config),
                config.search.model.clone(),
                config.search.hits,
                config.benchmark.field,
            );
            with_postprocessing(&searcher, steps, body)
        }
        SearchEngine::Static => {
            let path = config.search.static_run.as_ref().ok_or_else(|| {
                FoldrankError::Config("search.static_run is required for the static engine".to_string())
            })?;
            with_postprocessing(&StaticRunSearcher::new(path), steps, body)
        }
        SearchEngine::Memory => {
            let corpus = config.index.corpus.as_ref().ok_or_else(|| {
                FoldrankError::Config("index.corpus is required for the memory engine".to_string())
            })?;
            let (k1, b) = config.search.model.bm25_grid().ok_or_else(|| {
                FoldrankError::Config(format!(
                    "the memory engine cannot score model '{}'",
                    config.search.model.name()
                ))
            })?;

            let analyzer = Analyzer::new(config.index.stemmer, config.index.keep_stopwords);
            let index = MemoryIndex::from_jsonl(corpus, analyzer)?;

            let cache_dir = config.experiment.output_dir.join("cache");
            let mut searcher = Bm25Reranker::new(
                &index,
                &k1,
                &b,
                config.search.hits,
                config.benchmark.field,
                cache_dir,
            );
            if let Some(path) = &config.search.candidates {
                searcher = searcher.with_candidates(load_trec_run(path)?);
            }
            with_postprocessing(&searcher, steps, body)
        }
    }
}

fn with_postprocessing<R>(
    searcher: &dyn Searcher,
    steps: PostProcessing,
    body: impl FnOnce(&dyn Searcher) -> Result<R>,
) -> Result<R> {
    if steps.is_noop() {
        body(searcher)
    } else {
        body(&PostProcessedSearcher::new(searcher, steps))
    }
}

fn postprocessing(config: &Config) -> Result<PostProcessing> {
    let post = &config.postprocess;
    Ok(PostProcessing {
        remove: post.remove_list.as_deref().map(DocList::load).transpose()?,
        keep: post.keep_list.as_deref().map(DocList::load).transpose()?,
        dedup: post.dedup.then(|| post.delimiter.clone()),
        topn: post.topn,
    })
}

fn build_pipeline<'a>(config: &Config, searcher: &'a dyn Searcher) -> Result<ExperimentPipeline<'a>> {
    let root = config.experiment.output_dir.clone();
    let fold = config.experiment.fold.clone();

    let folds = Folds::load(&config.benchmark.folds)?;
    let qrels: Qrels = load_qrels(&config.benchmark.qrels)?;
    let trainer = CommandTrainer::new(
        config.rerank.command.clone(),
        root.join("rerank").join(fold_dir_name(&fold)).join("trainer"),
    )?;
    let evaluator = TrecEval::new(&config.eval.trec_eval);

    let pipeline_config = PipelineConfig {
        root,
        topics: config.benchmark.topics.clone(),
        fold,
        crossval: CrossValidationSettings {
            threshold: config.rerank.threshold,
            optimize: config.rerank.optimize.clone(),
            metrics: config.eval.metrics.clone(),
            relevance_level: config.eval.relevance_level,
            include_train: config.rerank.include_train,
        },
    };

    Pipeline::new(pipeline_config, searcher, trainer, evaluator, folds, qrels)
}

fn print_report(report: &CrossFoldReport, json: bool) -> Result<()> {
    if json {
        let json = serde_json::to_string_pretty(report).map_err(|e| FoldrankError::Json {
            source: e,
            context: "Failed to serialize report".to_string(),
        })?;
        println!("{}", json);
        return Ok(());
    }

    if let Some(metrics) = report.per_fold.get(&report.fold) {
        println!("Fold {}:", report.fold);
        for (metric, value) in metrics {
            println!("  {:<16} {:.4}", metric, value);
        }
    }

    println!(
        "Average over {} of {} folds:",
        report.folds_included, report.folds_declared
    );
    for (metric, value) in &report.metrics {
        println!("  {:<16} {:.4}", metric, value);
    }
    if !report.missing_folds.is_empty() {
        println!("Missing folds: {}", report.missing_folds.join(", "));
    }
    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path)?;
            let mut value = serde_json::to_value(&config).map_err(|e| FoldrankError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;

            if let Some(section) = section {
                value = value.get(&section).cloned().ok_or_else(|| {
                    FoldrankError::InvalidArgument(format!("Unknown config section: {}", section))
                })?;
            }

            let json = serde_json::to_string_pretty(&value).map_err(|e| FoldrankError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => expand_path(&path)?,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'foldrank config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        return Ok(config);
    }

    Config::load(&path)
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| FoldrankError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| FoldrankError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
