use super::{bm25_idf, Analyzer, IndexStats};
use crate::error::{FoldrankError, Result};
use ahash::AHashMap;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One line of a JSONL corpus
#[derive(Debug, Clone, Deserialize)]
pub struct CorpusDocument {
    pub id: String,
    pub contents: String,
}

/// In-memory term statistics
pub struct MemoryIndex {
    analyzer: Analyzer,
    doc_lens: AHashMap<String, u64>,
    doc_order: Vec<String>,
    /// term → docid → term frequency
    postings: AHashMap<String, AHashMap<String, u64>>,
    total_len: u64,
}

impl MemoryIndex {
    pub fn new(analyzer: Analyzer) -> Self {
        Self {
            analyzer,
            doc_lens: AHashMap::new(),
            doc_order: Vec::new(),
            postings: AHashMap::new(),
            total_len: 0,
        }
    }

    /// Add or replace a document
    pub fn add_document(&mut self, docid: &str, text: &str) {
        if let Some(old_len) = self.doc_lens.remove(docid) {
            self.total_len -= old_len;
            for docs in self.postings.values_mut() {
                docs.remove(docid);
            }
            self.doc_order.retain(|id| id != docid);
        }

        let terms = self.analyzer.analyze(text);
        let len = terms.len() as u64;
        for term in terms {
            *self
                .postings
                .entry(term)
                .or_default()
                .entry(docid.to_string())
                .or_insert(0) += 1;
        }

        self.doc_lens.insert(docid.to_string(), len);
        self.doc_order.push(docid.to_string());
        self.total_len += len;
    }

    /// Build from a JSONL file of `{"id": .., "contents": ..}` records
    pub fn from_jsonl(path: &Path, analyzer: Analyzer) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            FoldrankError::io(e, format!("Failed to open corpus: {}", path.display()))
        })?;
        let mut index = Self::new(analyzer);

        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| {
                FoldrankError::io(e, format!("Failed to read corpus: {}", path.display()))
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let doc: CorpusDocument = serde_json::from_str(&line).map_err(|e| {
                FoldrankError::format(path, idx + 1, format!("invalid corpus record: {}", e))
            })?;
            index.add_document(&doc.id, &doc.contents);
        }

        tracing::info!(
            "Indexed {} documents from {} (avg length {:.1})",
            index.doc_order.len(),
            path.display(),
            index.avg_doc_len()
        );
        Ok(index)
    }

    pub fn num_docs(&self) -> usize {
        self.doc_order.len()
    }
}

impl IndexStats for MemoryIndex {
    fn doc_len(&self, docid: &str) -> Option<u64> {
        self.doc_lens.get(docid).copied()
    }

    fn term_freq(&self, term: &str, docid: &str) -> u64 {
        self.postings
            .get(term)
            .and_then(|docs| docs.get(docid))
            .copied()
            .unwrap_or(0)
    }

    fn idf(&self, term: &str) -> f64 {
        let df = self.postings.get(term).map_or(0, |docs| docs.len()) as u64;
        bm25_idf(df, self.doc_order.len() as u64)
    }

    fn avg_doc_len(&self) -> f64 {
        if self.doc_order.is_empty() {
            return 0.0;
        }
        self.total_len as f64 / self.doc_order.len() as f64
    }

    fn analyze(&self, text: &str) -> Vec<String> {
        self.analyzer.analyze(text)
    }

    fn doc_ids(&self) -> Vec<String> {
        self.doc_order.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::StemmerKind;
    use tempfile::TempDir;

    fn index() -> MemoryIndex {
        let mut index = MemoryIndex::new(Analyzer::new(StemmerKind::None, true));
        index.add_document("d1", "organized crime crime");
        index.add_document("d2", "polio vaccine");
        index
    }

    #[test]
    fn test_statistics() {
        let index = index();
        assert_eq!(index.doc_len("d1"), Some(3));
        assert_eq!(index.doc_len("missing"), None);
        assert_eq!(index.term_freq("crime", "d1"), 2);
        assert_eq!(index.term_freq("crime", "d2"), 0);
        assert!((index.avg_doc_len() - 2.5).abs() < 1e-12);
        assert!(index.idf("crime") > 0.0);
    }

    #[test]
    fn test_replacing_a_document() {
        let mut index = index();
        index.add_document("d1", "crime");
        assert_eq!(index.doc_len("d1"), Some(1));
        assert_eq!(index.term_freq("organized", "d1"), 0);
        assert_eq!(index.doc_ids(), vec!["d2".to_string(), "d1".to_string()]);
    }

    #[test]
    fn test_from_jsonl() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("corpus.jsonl");
        std::fs::write(
            &path,
            "{\"id\": \"a\", \"contents\": \"one two\"}\n\n{\"id\": \"b\", \"contents\": \"two\"}\n",
        )
        .unwrap();

        let index = MemoryIndex::from_jsonl(&path, Analyzer::new(StemmerKind::None, true)).unwrap();
        assert_eq!(index.num_docs(), 2);
        assert_eq!(index.term_freq("two", "b"), 1);
    }
}
