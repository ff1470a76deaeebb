//! Completion-marker guarded stages
//!
//! A stage owns an output directory. It is done once a `done` marker exists
//! in that directory, and the marker is only written after the stage body
//! returned successfully. Re-running a done stage is a no-op.

use crate::error::{FoldrankError, Result};
use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name of the completion marker
pub const DONE_MARKER: &str = "done";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    NotStarted,
    InProgress,
    Done,
}

/// An expensive step whose output lives in one directory
#[derive(Debug, Clone)]
pub struct Stage {
    name: String,
    output_dir: PathBuf,
}

impl Stage {
    pub fn new(name: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn marker_path(&self) -> PathBuf {
        self.output_dir.join(DONE_MARKER)
    }

    pub fn is_done(&self) -> bool {
        self.marker_path().exists()
    }

    pub fn state(&self) -> StageState {
        if self.is_done() {
            StageState::Done
        } else if self.output_dir.exists() {
            StageState::InProgress
        } else {
            StageState::NotStarted
        }
    }

    /// Run `body` unless the stage is already done, then mark it done.
    ///
    /// Returns the output directory either way. When `body` fails no marker
    /// is written and the error is returned.
    pub fn run<F>(&self, body: F) -> Result<PathBuf>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        if self.is_done() {
            tracing::debug!(
                "Skipping {} stage, marker exists: {}",
                self.name,
                self.marker_path().display()
            );
            return Ok(self.output_dir.clone());
        }

        fs::create_dir_all(&self.output_dir).map_err(|e| {
            FoldrankError::io(
                e,
                format!(
                    "Failed to create {} output directory: {}",
                    self.name,
                    self.output_dir.display()
                ),
            )
        })?;

        tracing::info!("Running {} stage in {}", self.name, self.output_dir.display());
        body(&self.output_dir)?;
        self.mark_done()?;
        tracing::info!("{} stage done", self.name);

        Ok(self.output_dir.clone())
    }

    /// Write the marker through a temporary file and rename it into place
    pub fn mark_done(&self) -> Result<()> {
        let marker = self.marker_path();
        let temp = self.output_dir.join(format!(".{}.tmp", DONE_MARKER));

        let mut file = fs::File::create(&temp).map_err(|e| {
            FoldrankError::io(e, format!("Failed to create marker: {}", temp.display()))
        })?;
        writeln!(file, "done {}", Utc::now().to_rfc3339()).map_err(|e| {
            FoldrankError::io(e, format!("Failed to write marker: {}", temp.display()))
        })?;
        file.sync_all().map_err(|e| {
            FoldrankError::io(e, format!("Failed to sync marker: {}", temp.display()))
        })?;
        drop(file);

        fs::rename(&temp, &marker).map_err(|e| {
            FoldrankError::io(
                e,
                format!(
                    "Failed to rename marker into place: {} -> {}",
                    temp.display(),
                    marker.display()
                ),
            )
        })
    }
}

/// True for directory entries that are stage bookkeeping rather than output
pub fn is_marker_file(name: &str) -> bool {
    name == DONE_MARKER || name.starts_with(&format!(".{}", DONE_MARKER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::TempDir;

    #[test]
    fn test_state_transitions() {
        let temp = TempDir::new().unwrap();
        let stage = Stage::new("search", temp.path().join("search"));
        assert_eq!(stage.state(), StageState::NotStarted);

        fs::create_dir_all(stage.output_dir()).unwrap();
        assert_eq!(stage.state(), StageState::InProgress);

        stage.run(|_| Ok(())).unwrap();
        assert_eq!(stage.state(), StageState::Done);
    }

    #[test]
    fn test_done_stage_is_skipped() {
        let temp = TempDir::new().unwrap();
        let stage = Stage::new("search", temp.path().join("out"));
        let calls = Cell::new(0);

        let first = stage
            .run(|dir| {
                calls.set(calls.get() + 1);
                fs::write(dir.join("searcher"), "q1 Q0 d1 1 1.0 t\n").unwrap();
                Ok(())
            })
            .unwrap();
        let second = stage
            .run(|_| {
                calls.set(calls.get() + 1);
                Ok(())
            })
            .unwrap();

        assert_eq!(calls.get(), 1);
        assert_eq!(first, second);
    }

    #[test]
    fn test_failed_stage_leaves_no_marker() {
        let temp = TempDir::new().unwrap();
        let stage = Stage::new("search", temp.path().join("out"));

        let result = stage.run(|_| {
            Err(FoldrankError::ExternalProcess {
                program: "java".to_string(),
                status: "exit status: 1".to_string(),
                stderr: String::new(),
            })
        });

        assert!(result.is_err());
        assert!(!stage.is_done());
        assert_eq!(stage.state(), StageState::InProgress);
    }

    #[test]
    fn test_marker_names() {
        assert!(is_marker_file("done"));
        assert!(is_marker_file(".done.tmp"));
        assert!(!is_marker_file("searcher_k1=0.9,b=0.4"));
    }
}
