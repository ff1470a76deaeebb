//! Run post-processing: filtering, passage deduplication and top-N cuts
//!
//! Each operator has a pure form over a [`Run`] and a directory form that
//! rewrites every run file in a stage output directory in place, skipping
//! the completion marker.

mod doc_list;

pub use doc_list::DocList;

use crate::error::{FoldrankError, Result};
use crate::run::{load_trec_run, write_trec_run, RankedList, Run, WriteMode};
use crate::stage::is_marker_file;
use std::fs;
use std::path::{Path, PathBuf};

/// Default separator between document id and passage suffix
pub const PASSAGE_DELIMITER: &str = ".";

/// Remove denied documents, or keep only allowed ones.
///
/// The deny list wins when both are given. A per-query allow list drops
/// every document of queries it has no entry for; a per-query deny list
/// leaves such queries untouched. Queries left without documents are
/// removed, since a run file cannot hold them.
pub fn filter_run(run: Run, remove: Option<&DocList>, keep: Option<&DocList>) -> Result<Run> {
    let remove = remove.filter(|list| !list.is_empty());
    let keep = keep.filter(|list| !list.is_empty());

    let mut filtered: Run = match (remove, keep) {
        (Some(remove), _) => run
            .into_iter()
            .map(|(qid, mut docs)| {
                if let Some(denied) = remove.for_query(&qid) {
                    docs.retain(|docid, _| !denied.contains(docid));
                }
                (qid, docs)
            })
            .collect(),
        (None, Some(keep)) => run
            .into_iter()
            .map(|(qid, mut docs)| {
                match keep.for_query(&qid) {
                    Some(allowed) => docs.retain(|docid, _| allowed.contains(docid)),
                    None => docs = RankedList::new(),
                }
                (qid, docs)
            })
            .collect(),
        (None, None) => {
            return Err(FoldrankError::InvalidArgument(
                "filter needs a list of documents to remove or to keep".to_string(),
            ))
        }
    };
    filtered.retain(|_, docs| !docs.is_empty());
    Ok(filtered)
}

/// Collapse passages into documents, scoring each document by its best passage
pub fn dedup_run(run: &Run, delimiter: &str) -> Run {
    run.iter()
        .map(|(qid, passages)| {
            let mut docs = RankedList::with_capacity(passages.len());
            for (pid, &score) in passages.iter() {
                let docid = pid.split_once(delimiter).map_or(pid, |(docid, _)| docid);
                match docs.get_mut(docid) {
                    Some(best) => *best = best.max(score),
                    None => {
                        docs.insert(docid, score);
                    }
                }
            }
            (qid.to_string(), docs)
        })
        .collect()
}

/// Keep the `n` highest-scoring documents of every query
pub fn keep_topn(mut run: Run, n: usize) -> Run {
    for (_, docs) in run.iter_mut() {
        docs.keep_top(n);
    }
    run
}

/// Run files of a directory in file-name order, markers excluded
pub fn run_files(run_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(run_dir).map_err(|e| {
        FoldrankError::io(e, format!("Failed to list run directory: {}", run_dir.display()))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            FoldrankError::io(e, format!("Failed to list run directory: {}", run_dir.display()))
        })?;
        let path = entry.path();
        let is_marker = entry.file_name().to_str().map_or(false, is_marker_file);
        if path.is_file() && !is_marker {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn rewrite_each<F>(run_dir: &Path, mut transform: F) -> Result<PathBuf>
where
    F: FnMut(Run) -> Result<Run>,
{
    for path in run_files(run_dir)? {
        let run = load_trec_run(&path)?;
        let before = run.entry_count();
        let run = transform(run)?;
        tracing::debug!(
            "Rewrote {}: {} -> {} entries",
            path.display(),
            before,
            run.entry_count()
        );
        write_trec_run(&run, &path, WriteMode::Truncate)?;
    }
    Ok(run_dir.to_path_buf())
}

/// [`filter_run`] over every run file in `run_dir`, then an optional top-N
pub fn filter_dir(
    run_dir: &Path,
    remove: Option<&DocList>,
    keep: Option<&DocList>,
    topn: Option<usize>,
) -> Result<PathBuf> {
    if remove.map_or(true, DocList::is_empty) && keep.map_or(true, DocList::is_empty) {
        return Err(FoldrankError::InvalidArgument(
            "filter needs a list of documents to remove or to keep".to_string(),
        ));
    }

    tracing::info!("Filtering runs in {}", run_dir.display());
    rewrite_each(run_dir, |run| {
        let run = filter_run(run, remove, keep)?;
        Ok(match topn {
            Some(n) => keep_topn(run, n),
            None => run,
        })
    })
}

/// [`dedup_run`] over every run file in `run_dir`, then an optional top-N
pub fn dedup_dir(run_dir: &Path, delimiter: &str, topn: Option<usize>) -> Result<PathBuf> {
    if delimiter.is_empty() {
        return Err(FoldrankError::InvalidArgument(
            "passage delimiter cannot be empty".to_string(),
        ));
    }

    tracing::info!("Deduplicating passages in {}", run_dir.display());
    rewrite_each(run_dir, |run| {
        let run = dedup_run(&run, delimiter);
        Ok(match topn {
            Some(n) => keep_topn(run, n),
            None => run,
        })
    })
}

/// [`keep_topn`] over every run file in `run_dir`
pub fn keep_topn_dir(run_dir: &Path, n: usize) -> Result<PathBuf> {
    tracing::info!("Keeping top {} documents per query in {}", n, run_dir.display());
    rewrite_each(run_dir, |run| Ok(keep_topn(run, n)))
}
