//! Anserini `SearchCollection` subprocess
//!
//! The runner carries everything shared by all scoring models: the Java
//! invocation, the index and its analysis options, and the thread count.
//! Models only contribute their own arguments.

use super::{ScoringModel, Searcher};
use crate::config::Config;
use crate::error::{FoldrankError, Result};
use crate::index::StemmerKind;
use crate::stage::Stage;
use crate::topics::TopicField;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

/// Default JVM heap options
pub const DEFAULT_JAVA_OPTS: [&str; 2] = ["-Xms512M", "-Xmx31G"];

#[derive(Debug, Clone)]
pub struct AnseriniRunner {
    pub java: String,
    pub jar: PathBuf,
    pub java_opts: Vec<String>,
    pub index_path: PathBuf,
    pub stemmer: StemmerKind,
    pub keep_stopwords: bool,
    pub threads: usize,
}

impl AnseriniRunner {
    pub fn from_config(config: &Config) -> Self {
        Self {
            java: config.anserini.java.clone(),
            jar: config.anserini.jar.clone(),
            java_opts: config.anserini.java_opts.clone(),
            index_path: config.index.path.clone(),
            stemmer: config.index.stemmer,
            keep_stopwords: config.index.keep_stopwords,
            threads: config.anserini.threads,
        }
    }

    /// Arguments after the `java` program name
    pub fn command_args(
        &self,
        topics: &Path,
        output_dir: &Path,
        field: TopicField,
        model_args: &[String],
    ) -> Vec<String> {
        let mut args = vec!["-classpath".to_string(), self.jar.display().to_string()];
        args.extend(self.java_opts.iter().cloned());
        args.extend(
            [
                "-Dapp.name=SearchCollection",
                "io.anserini.search.SearchCollection",
                "-topicreader",
                "Trec",
                "-index",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args.push(self.index_path.display().to_string());
        args.push("-stemmer".to_string());
        args.push(self.stemmer.as_str().to_string());
        if self.keep_stopwords {
            args.push("-keepstopwords".to_string());
        }
        args.push("-topics".to_string());
        args.push(topics.display().to_string());
        args.push("-output".to_string());
        args.push(output_dir.join("searcher").display().to_string());
        args.push("-topicfield".to_string());
        args.push(field.as_str().to_string());
        args.push("-inmem".to_string());
        args.push("-threads".to_string());
        args.push(self.threads.to_string());
        args.extend(model_args.iter().cloned());
        args
    }

    /// Run SearchCollection into `output_dir` unless that stage is done
    pub fn run(
        &self,
        topics: &Path,
        output_dir: &Path,
        field: TopicField,
        model_args: &[String],
    ) -> Result<PathBuf> {
        if !topics.exists() {
            return Err(FoldrankError::io(
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
                format!("Could not find topics file: {}", topics.display()),
            ));
        }

        Stage::new("search", output_dir).run(|dir| {
            let args = self.command_args(topics, dir, field, model_args);
            tracing::info!("Anserini writing runs to {}", dir.join("searcher").display());
            tracing::debug!("{} {}", self.java, args.join(" "));
            self.spawn(&args)
        })
    }

    fn spawn(&self, args: &[String]) -> Result<()> {
        let mut child = Command::new(&self.java)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| FoldrankError::io(e, format!("Failed to start {}", self.java)))?;

        let stderr_reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf);
                buf
            })
        });

        if let Some(stdout) = child.stdout.take() {
            if let Err(e) = relay_output(BufReader::new(stdout)) {
                // Reap the engine before reporting; its stderr thread is left detached
                let _ = child.kill();
                let _ = child.wait();
                return Err(FoldrankError::io(e, "Failed to read SearchCollection output"));
            }
        }

        let status = child
            .wait()
            .map_err(|e| FoldrankError::io(e, format!("Failed to wait for {}", self.java)))?;
        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            return Err(FoldrankError::ExternalProcess {
                program: self.java.clone(),
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

fn relay_output<R: BufRead>(reader: R) -> std::io::Result<()> {
    for line in reader.lines() {
        log_engine_line(&line?);
    }
    Ok(())
}

/// Anserini is chatty; its DEBUG lines are dropped
fn log_engine_line(line: &str) {
    if is_debug_line(line) {
        return;
    }
    let line = line.trim_end();
    if !line.is_empty() {
        tracing::info!("anserini: {}", line);
    }
}

fn is_debug_line(line: &str) -> bool {
    line.contains(" DEBUG ")
}

/// A scoring model run through Anserini
#[derive(Debug, Clone)]
pub struct AnseriniSearcher {
    runner: AnseriniRunner,
    model: ScoringModel,
    hits: usize,
    field: TopicField,
}

impl AnseriniSearcher {
    pub fn new(runner: AnseriniRunner, model: ScoringModel, hits: usize, field: TopicField) -> Self {
        Self {
            runner,
            model,
            hits,
            field,
        }
    }
}

impl Searcher for AnseriniSearcher {
    fn name(&self) -> String {
        self.model.name().to_string()
    }

    fn query_from_file(&self, topics: &Path, output_dir: &Path) -> Result<PathBuf> {
        let model_args = self.model.engine_args(self.hits);
        self.runner.run(topics, output_dir, self.field, &model_args)
    }
}
