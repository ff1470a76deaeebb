//! Relevance judgments in TREC qrels format (`qid iter docid grade`)

use super::OrderedMap;
use crate::error::{FoldrankError, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Query id → document id → relevance grade
pub type Qrels = OrderedMap<OrderedMap<i32>>;

pub fn load_qrels(path: &Path) -> Result<Qrels> {
    let content = fs::read_to_string(path)
        .map_err(|e| FoldrankError::io(e, format!("Failed to read qrels: {}", path.display())))?;
    let mut qrels = Qrels::new();

    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 4 {
            return Err(FoldrankError::format(
                path,
                idx + 1,
                format!("expected 4 fields, found {}", fields.len()),
            ));
        }
        let grade: i32 = fields[3].parse().map_err(|_| {
            FoldrankError::format(path, idx + 1, format!("invalid grade '{}'", fields[3]))
        })?;
        qrels.get_or_default(fields[0]).insert(fields[2], grade);
    }

    Ok(qrels)
}

pub fn write_qrels(qrels: &Qrels, path: &Path) -> Result<()> {
    let mut out = String::new();
    for (qid, docs) in qrels.iter() {
        for (docid, grade) in docs.iter() {
            out.push_str(&format!("{} 0 {} {}\n", qid, docid, grade));
        }
    }

    let mut file = fs::File::create(path)
        .map_err(|e| FoldrankError::io(e, format!("Failed to create qrels: {}", path.display())))?;
    file.write_all(out.as_bytes())
        .map_err(|e| FoldrankError::io(e, format!("Failed to write qrels: {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_qrels() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("qrels.txt");
        fs::write(&path, "301 0 d1 1\n301 0 d2 0\n302 0 d3 2\n").unwrap();

        let qrels = load_qrels(&path).unwrap();
        assert_eq!(qrels.get("301").unwrap().get("d1"), Some(&1));
        assert_eq!(qrels.get("302").unwrap().get("d3"), Some(&2));

        let copy = temp.path().join("copy.txt");
        write_qrels(&qrels, &copy).unwrap();
        assert_eq!(load_qrels(&copy).unwrap(), qrels);
    }

    #[test]
    fn test_rejects_short_line() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("qrels.txt");
        fs::write(&path, "301 d1 1\n").unwrap();
        assert!(matches!(load_qrels(&path), Err(FoldrankError::Format { line: 1, .. })));
    }
}
