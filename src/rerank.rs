//! Neural reranker seam
//!
//! Training loops live outside this crate. [`Trainer`] is what the
//! cross-validation driver needs from one; [`CommandTrainer`] drives an
//! external program through run files on disk.

use crate::error::{FoldrankError, Result};
use crate::run::{load_trec_run, write_qrels, write_trec_run, Qrels, Run, WriteMode};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// File a trainer leaves its best checkpoint under, inside the train output
pub const BEST_MODEL: &str = "best_model";

/// Inputs for one training session
#[derive(Debug, Clone, Copy)]
pub struct TrainRequest<'a> {
    pub train_run: &'a Run,
    pub dev_run: &'a Run,
    pub qrels: &'a Qrels,
    /// Checkpoints and training logs
    pub output_dir: &'a Path,
    /// Dev predictions written while training
    pub dev_output_dir: &'a Path,
    /// Metric the best dev checkpoint is selected by
    pub optimize: &'a str,
    /// Minimum qrels grade counted as relevant
    pub relevance_level: i32,
}

pub trait Trainer {
    /// One-time preparation over every document of the base run
    fn prepare(&mut self, base: &Run) -> Result<()>;

    fn train(&mut self, request: &TrainRequest<'_>) -> Result<()>;

    /// Load the best checkpoint written under `train_output_dir`
    fn load_best_model(&mut self, train_output_dir: &Path) -> Result<()>;

    /// Score `run` with the loaded model; `output_dir` is scratch space
    fn predict(&mut self, run: &Run, output_dir: &Path) -> Result<Run>;
}

impl<T: Trainer + ?Sized> Trainer for &mut T {
    fn prepare(&mut self, base: &Run) -> Result<()> {
        (**self).prepare(base)
    }

    fn train(&mut self, request: &TrainRequest<'_>) -> Result<()> {
        (**self).train(request)
    }

    fn load_best_model(&mut self, train_output_dir: &Path) -> Result<()> {
        (**self).load_best_model(train_output_dir)
    }

    fn predict(&mut self, run: &Run, output_dir: &Path) -> Result<Run> {
        (**self).predict(run, output_dir)
    }
}

impl<T: Trainer + ?Sized> Trainer for Box<T> {
    fn prepare(&mut self, base: &Run) -> Result<()> {
        (**self).prepare(base)
    }

    fn train(&mut self, request: &TrainRequest<'_>) -> Result<()> {
        (**self).train(request)
    }

    fn load_best_model(&mut self, train_output_dir: &Path) -> Result<()> {
        (**self).load_best_model(train_output_dir)
    }

    fn predict(&mut self, run: &Run, output_dir: &Path) -> Result<Run> {
        (**self).predict(run, output_dir)
    }
}

/// Trainer backed by an external program.
///
/// The program is called as `<command> <subcommand> [--flag value]...` with
/// the subcommands `prepare`, `train` and `predict`. Runs and qrels are
/// exchanged as TREC files.
#[derive(Debug, Clone)]
pub struct CommandTrainer {
    command: Vec<String>,
    work_dir: PathBuf,
    model: Option<PathBuf>,
}

impl CommandTrainer {
    pub fn new(command: Vec<String>, work_dir: impl Into<PathBuf>) -> Result<Self> {
        if command.is_empty() {
            return Err(FoldrankError::InvalidArgument(
                "trainer command cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            command,
            work_dir: work_dir.into(),
            model: None,
        })
    }

    fn ensure_dir(dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .map_err(|e| FoldrankError::io(e, format!("Failed to create directory: {}", dir.display())))
    }

    fn invoke(&self, subcommand: &str, flags: &[(&str, &OsStr)]) -> Result<()> {
        let program = &self.command[0];
        let mut cmd = Command::new(program);
        cmd.args(&self.command[1..]).arg(subcommand);
        for (flag, value) in flags {
            cmd.arg(format!("--{}", flag)).arg(value);
        }

        tracing::info!("Running trainer {} {}", program, subcommand);
        let output = cmd
            .output()
            .map_err(|e| FoldrankError::io(e, format!("Failed to start trainer {}", program)))?;
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            tracing::debug!("trainer: {}", line);
        }

        if !output.status.success() {
            return Err(FoldrankError::ExternalProcess {
                program: program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

impl Trainer for CommandTrainer {
    fn prepare(&mut self, base: &Run) -> Result<()> {
        Self::ensure_dir(&self.work_dir)?;
        let base_path = self.work_dir.join("base.run");
        write_trec_run(base, &base_path, WriteMode::Truncate)?;
        self.invoke("prepare", &[("run", base_path.as_os_str())])
    }

    fn train(&mut self, request: &TrainRequest<'_>) -> Result<()> {
        Self::ensure_dir(request.output_dir)?;
        Self::ensure_dir(request.dev_output_dir)?;
        let train_path = request.output_dir.join("train.run");
        let dev_path = request.output_dir.join("dev.run");
        let qrels_path = request.output_dir.join("qrels.txt");
        write_trec_run(request.train_run, &train_path, WriteMode::Truncate)?;
        write_trec_run(request.dev_run, &dev_path, WriteMode::Truncate)?;
        write_qrels(request.qrels, &qrels_path)?;

        let relevance_level = request.relevance_level.to_string();
        self.invoke(
            "train",
            &[
                ("train-run", train_path.as_os_str()),
                ("dev-run", dev_path.as_os_str()),
                ("qrels", qrels_path.as_os_str()),
                ("output", request.output_dir.as_os_str()),
                ("dev-output", request.dev_output_dir.as_os_str()),
                ("optimize", OsStr::new(request.optimize)),
                ("relevance-level", OsStr::new(&relevance_level)),
            ],
        )
    }

    fn load_best_model(&mut self, train_output_dir: &Path) -> Result<()> {
        let model = train_output_dir.join(BEST_MODEL);
        if !model.exists() {
            return Err(FoldrankError::io(
                std::io::Error::new(std::io::ErrorKind::NotFound, "no checkpoint"),
                format!("No trained model at {}", model.display()),
            ));
        }
        tracing::debug!("Using model {}", model.display());
        self.model = Some(model);
        Ok(())
    }

    fn predict(&mut self, run: &Run, output_dir: &Path) -> Result<Run> {
        let model = self.model.clone().ok_or_else(|| {
            FoldrankError::InvalidArgument("predict called before load_best_model".to_string())
        })?;
        Self::ensure_dir(output_dir)?;
        let input = output_dir.join("candidates.run");
        let predictions = output_dir.join("predictions.run");
        write_trec_run(run, &input, WriteMode::Truncate)?;

        self.invoke(
            "predict",
            &[
                ("model", model.as_os_str()),
                ("run", input.as_os_str()),
                ("output", predictions.as_os_str()),
            ],
        )?;
        load_trec_run(&predictions)
    }
}
