use crate::error::{FoldrankError, Result};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Document ids to keep or remove, for every query or per query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocList {
    Global(HashSet<String>),
    PerQuery(HashMap<String, HashSet<String>>),
}

impl DocList {
    pub fn global<I, S>(docids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Global(docids.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Global(docs) => docs.is_empty(),
            Self::PerQuery(map) => map.values().all(HashSet::is_empty),
        }
    }

    /// Documents listed for `qid`, `None` when a per-query list has no entry
    pub fn for_query(&self, qid: &str) -> Option<&HashSet<String>> {
        match self {
            Self::Global(docs) => Some(docs),
            Self::PerQuery(map) => map.get(qid),
        }
    }

    /// Load from a text file: one `docid` per line for a global list, or
    /// `qid docid` per line for a per-query list
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FoldrankError::io(e, format!("Failed to read document list: {}", path.display()))
        })?;

        let mut global = HashSet::new();
        let mut per_query: HashMap<String, HashSet<String>> = HashMap::new();

        for (idx, line) in content.lines().enumerate() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                [] => continue,
                [docid] => {
                    global.insert(docid.to_string());
                }
                [qid, docid] => {
                    per_query
                        .entry(qid.to_string())
                        .or_default()
                        .insert(docid.to_string());
                }
                _ => {
                    return Err(FoldrankError::format(
                        path,
                        idx + 1,
                        format!("expected 1 or 2 fields, found {}", fields.len()),
                    ))
                }
            }
        }

        match (global.is_empty(), per_query.is_empty()) {
            (false, false) => Err(FoldrankError::format(
                path,
                0,
                "mixes global and per-query entries",
            )),
            (true, false) => Ok(Self::PerQuery(per_query)),
            _ => Ok(Self::Global(global)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_global_and_per_query() {
        let temp = TempDir::new().unwrap();
        let global = temp.path().join("global.txt");
        std::fs::write(&global, "d1\nd2\n\n").unwrap();
        assert_eq!(DocList::load(&global).unwrap(), DocList::global(["d1", "d2"]));

        let per_query = temp.path().join("per_query.txt");
        std::fs::write(&per_query, "q1 d1\nq1 d2\nq2 d3\n").unwrap();
        let list = DocList::load(&per_query).unwrap();
        assert_eq!(list.for_query("q1").unwrap().len(), 2);
        assert!(list.for_query("q9").is_none());
    }

    #[test]
    fn test_mixed_file_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("mixed.txt");
        std::fs::write(&path, "d1\nq1 d2\n").unwrap();
        assert!(DocList::load(&path).is_err());
    }
}
