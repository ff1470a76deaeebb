//! TREC run file reading and writing
//!
//! One line per result: `qid Q0 docid rank score tag`. The rank column is
//! informational; file order and score define the ranking.

use super::{RankedList, Run};
use crate::error::{FoldrankError, Result};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Tag written in the last column of every run line
pub const RUN_TAG: &str = "foldrank";

/// How [`write_trec_run`] treats an existing file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Create the file or truncate it
    Truncate,
    /// Append to the file, creating it when missing
    Append,
}

/// Load a run file, grouping lines by query in encounter order
pub fn load_trec_run(path: &Path) -> Result<Run> {
    let file = fs::File::open(path)
        .map_err(|e| FoldrankError::io(e, format!("Failed to open run file: {}", path.display())))?;
    let reader = BufReader::new(file);
    let mut run = Run::new();

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|e| {
            FoldrankError::io(e, format!("Failed to read run file: {}", path.display()))
        })?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 5 && fields.len() != 6 {
            return Err(FoldrankError::format(
                path,
                line_no,
                format!("expected 5 or 6 fields, found {}", fields.len()),
            ));
        }

        let (qid, docid, rank, score) = (fields[0], fields[2], fields[3], fields[4]);
        rank.parse::<i64>().map_err(|_| {
            FoldrankError::format(path, line_no, format!("invalid rank '{}'", rank))
        })?;
        let score: f64 = score.parse().map_err(|_| {
            FoldrankError::format(path, line_no, format!("invalid score '{}'", score))
        })?;

        let docs: &mut RankedList = run.get_or_default(qid);
        if docs.insert(docid, score).is_some() {
            return Err(FoldrankError::format(
                path,
                line_no,
                format!("duplicate document {} for query {}", docid, qid),
            ));
        }
    }

    Ok(run)
}

/// Write a run in stored order, creating parent directories.
///
/// A query without documents has no line to live on and is absent on reload.
pub fn write_trec_run(run: &Run, path: &Path, mode: WriteMode) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                FoldrankError::io(e, format!("Failed to create run directory: {}", parent.display()))
            })?;
        }
    }

    let mut options = OpenOptions::new();
    match mode {
        WriteMode::Truncate => options.write(true).create(true).truncate(true),
        WriteMode::Append => options.append(true).create(true),
    };
    let file = options
        .open(path)
        .map_err(|e| FoldrankError::io(e, format!("Failed to open run file: {}", path.display())))?;
    let mut writer = BufWriter::new(file);

    for (qid, docs) in run.iter() {
        for (rank, (docid, score)) in docs.iter().enumerate() {
            writeln!(writer, "{} Q0 {} {} {} {}", qid, docid, rank + 1, score, RUN_TAG).map_err(
                |e| FoldrankError::io(e, format!("Failed to write run file: {}", path.display())),
            )?;
        }
    }

    writer
        .flush()
        .map_err(|e| FoldrankError::io(e, format!("Failed to flush run file: {}", path.display())))
}
