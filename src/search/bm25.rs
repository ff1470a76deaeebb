//! Grid BM25 over candidate documents
//!
//! Scores each candidate directly from index statistics for every `(k1, b)`
//! point of a grid, writing one run file per point. Term frequencies,
//! document length and idf are fetched once per document and reused across
//! the whole grid.

use super::{ParamList, Searcher};
use crate::error::{FoldrankError, Result};
use crate::index::IndexStats;
use crate::run::{write_trec_run, OrderedMap, RankedList, Run, WriteMode};
use crate::stage::Stage;
use crate::topics::{load_trec_topics, TopicField};
use std::fs;
use std::path::{Path, PathBuf};

/// Prefix of every grid run file
pub const RUN_FILE_PREFIX: &str = "searcher_";

/// Analyzed query terms by query id
pub type AnalyzedTopics = OrderedMap<Vec<String>>;

/// One `(k1, b)` combination
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPoint {
    pub k1: f64,
    pub b: f64,
}

impl GridPoint {
    /// `k1=<k1>,b=<b>`
    pub fn name(&self) -> String {
        format!("k1={},b={}", self.k1, self.b)
    }

    pub fn file_name(&self) -> String {
        format!("{}{}", RUN_FILE_PREFIX, self.name())
    }
}

/// Cartesian product with k1 as the outer loop
pub fn expand_grid(k1: &ParamList, b: &ParamList) -> Vec<GridPoint> {
    k1.values()
        .iter()
        .flat_map(|&k1| b.values().iter().map(move |&b| GridPoint { k1, b }))
        .collect()
}

/// Result of scoring one query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryScores {
    /// One ranked list per grid point, in grid order
    pub lists: Vec<RankedList>,
    /// Candidates dropped because the index does not know their length
    pub excluded: usize,
}

/// Score `candidates` for `terms` at every grid point.
///
/// Each list is stably sorted by descending score and cut to `hits`.
pub fn score_candidates<I>(
    index: &I,
    terms: &[String],
    candidates: &[String],
    grid: &[GridPoint],
    avg_doc_len: f64,
    hits: usize,
) -> QueryScores
where
    I: IndexStats + ?Sized,
{
    let idfs: Vec<f64> = terms.iter().map(|term| index.idf(term)).collect();
    let mut lists: Vec<RankedList> = grid
        .iter()
        .map(|_| RankedList::with_capacity(candidates.len()))
        .collect();
    let mut excluded = 0;

    for docid in candidates {
        let Some(doc_len) = index.doc_len(docid) else {
            excluded += 1;
            continue;
        };
        let tfs: Vec<f64> = terms
            .iter()
            .map(|term| index.term_freq(term, docid) as f64)
            .collect();
        let len_ratio = if avg_doc_len > 0.0 {
            doc_len as f64 / avg_doc_len
        } else {
            0.0
        };

        for (point, list) in grid.iter().zip(lists.iter_mut()) {
            let norm = point.k1 * (1.0 - point.b + point.b * len_ratio);
            let score: f64 = tfs
                .iter()
                .zip(&idfs)
                .filter(|(&tf, _)| tf > 0.0)
                .map(|(&tf, &idf)| idf * tf / (tf + norm))
                .sum();
            list.insert(docid.as_str(), score);
        }
    }

    for list in &mut lists {
        list.sort_by_score();
        list.truncate(hits);
    }

    QueryScores { lists, excluded }
}

/// BM25 re-scoring as a searcher
pub struct Bm25Reranker<'a, I: ?Sized> {
    index: &'a I,
    grid: Vec<GridPoint>,
    hits: usize,
    field: TopicField,
    cache_dir: PathBuf,
    candidates: Option<Run>,
}

impl<'a, I: IndexStats + ?Sized> Bm25Reranker<'a, I> {
    pub fn new(
        index: &'a I,
        k1: &ParamList,
        b: &ParamList,
        hits: usize,
        field: TopicField,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            index,
            grid: expand_grid(k1, b),
            hits,
            field,
            cache_dir: cache_dir.into(),
            candidates: None,
        }
    }

    /// Restrict scoring to the queries and documents of `run`
    pub fn with_candidates(mut self, run: Run) -> Self {
        self.candidates = Some(run);
        self
    }

    pub fn grid(&self) -> &[GridPoint] {
        &self.grid
    }

    /// Cache file for a topic file and field, keyed by content
    pub fn topic_cache_path(&self, topics: &Path) -> Result<PathBuf> {
        let bytes = fs::read(topics).map_err(|e| {
            FoldrankError::io(e, format!("Failed to read topics: {}", topics.display()))
        })?;
        let mut hasher = blake3::Hasher::new();
        hasher.update(&bytes);
        hasher.update(self.field.as_str().as_bytes());
        let hex = hasher.finalize().to_hex();
        let key = &hex.as_str()[..16];
        Ok(self.cache_dir.join(format!("topic.analyze.{}.json", key)))
    }

    /// Analyzed topics, read from the cache when present
    pub fn analyzed_topics(&self, topics: &Path) -> Result<AnalyzedTopics> {
        let cache_path = self.topic_cache_path(topics)?;
        if cache_path.exists() {
            tracing::info!("Loading analyzed topics from cache {}", cache_path.display());
            let content = fs::read_to_string(&cache_path).map_err(|e| {
                FoldrankError::io(e, format!("Failed to read topic cache: {}", cache_path.display()))
            })?;
            return serde_json::from_str(&content).map_err(|e| FoldrankError::Json {
                source: e,
                context: format!("Failed to parse topic cache: {}", cache_path.display()),
            });
        }

        let parsed = load_trec_topics(topics)?;
        let analyzed: AnalyzedTopics = parsed
            .field(self.field)
            .iter()
            .map(|(qid, text)| (qid.to_string(), self.index.analyze(text)))
            .collect();

        fs::create_dir_all(&self.cache_dir).map_err(|e| {
            FoldrankError::io(
                e,
                format!("Failed to create cache directory: {}", self.cache_dir.display()),
            )
        })?;
        let json = serde_json::to_string(&analyzed).map_err(|e| FoldrankError::Json {
            source: e,
            context: "Failed to serialize analyzed topics".to_string(),
        })?;
        fs::write(&cache_path, json).map_err(|e| {
            FoldrankError::io(e, format!("Failed to write topic cache: {}", cache_path.display()))
        })?;
        tracing::info!("Stored analyzed topics in cache {}", cache_path.display());

        Ok(analyzed)
    }

    /// Score every topic and write one run file per grid point
    pub fn rerank(&self, topics: &Path, output_dir: &Path) -> Result<PathBuf> {
        Stage::new("bm25", output_dir).run(|dir| self.score_into(topics, dir))
    }

    fn score_into(&self, topics: &Path, dir: &Path) -> Result<()> {
        let analyzed = self.analyzed_topics(topics)?;
        let avg_doc_len = self.index.avg_doc_len();
        let all_docs = match self.candidates {
            Some(_) => Vec::new(),
            None => self.index.doc_ids(),
        };

        let mut mode = WriteMode::Truncate;
        let mut excluded_total = 0;
        for (qid, terms) in analyzed.iter() {
            let candidates: Vec<String> = match &self.candidates {
                Some(run) => match run.get(qid) {
                    Some(docs) => docs.keys().map(str::to_string).collect(),
                    None => continue,
                },
                None => all_docs.clone(),
            };
            if candidates.is_empty() {
                continue;
            }

            let scores = score_candidates(
                self.index,
                terms,
                &candidates,
                &self.grid,
                avg_doc_len,
                self.hits,
            );
            if scores.excluded > 0 {
                tracing::warn!(
                    "Query {}: {} candidate(s) missing from the index were excluded",
                    qid,
                    scores.excluded
                );
                excluded_total += scores.excluded;
            }

            for (point, list) in self.grid.iter().zip(scores.lists) {
                let mut run = Run::new();
                run.insert(qid, list);
                write_trec_run(&run, &dir.join(point.file_name()), mode)?;
            }
            mode = WriteMode::Append;
        }

        tracing::info!(
            "BM25 wrote {} grid run(s) to {} ({} candidates excluded)",
            self.grid.len(),
            dir.display(),
            excluded_total
        );
        Ok(())
    }
}

impl<I: IndexStats + ?Sized> Searcher for Bm25Reranker<'_, I> {
    fn name(&self) -> String {
        "bm25_reranker".to_string()
    }

    fn query_from_file(&self, topics: &Path, output_dir: &Path) -> Result<PathBuf> {
        self.rerank(topics, output_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Analyzer, MemoryIndex, StemmerKind};
    use crate::run::load_trec_run;
    use tempfile::TempDir;

    fn index() -> MemoryIndex {
        let mut index = MemoryIndex::new(Analyzer::new(StemmerKind::None, true));
        index.add_document("d1", "apple banana apple");
        index.add_document("d2", "banana cherry");
        index.add_document("d3", "cherry cherry cherry date");
        index
    }

    fn terms(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_grid_names() {
        let k1 = ParamList::new(vec![0.9, 1.2]).unwrap();
        let b = ParamList::new(vec![0.4, 0.6]).unwrap();
        let names: Vec<String> = expand_grid(&k1, &b).iter().map(GridPoint::name).collect();
        assert_eq!(
            names,
            vec!["k1=0.9,b=0.4", "k1=0.9,b=0.6", "k1=1.2,b=0.4", "k1=1.2,b=0.6"]
        );
    }

    #[test]
    fn test_score_matches_formula() {
        let index = index();
        let grid = [GridPoint { k1: 0.9, b: 0.4 }];
        let avg = index.avg_doc_len();
        let scores = score_candidates(&index, &terms(&["apple"]), &terms(&["d1", "d2"]), &grid, avg, 10);

        let expected = index.idf("apple") * 2.0 / (2.0 + 0.9 * (1.0 - 0.4 + 0.4 * 3.0 / avg));
        let list = &scores.lists[0];
        assert!((list.get("d1").unwrap() - expected).abs() < 1e-12);
        assert_eq!(list.get("d2"), Some(&0.0));
        assert_eq!(list.keys().collect::<Vec<_>>(), vec!["d1", "d2"]);
    }

    #[test]
    fn test_unknown_documents_are_excluded() {
        let index = index();
        let grid = [GridPoint { k1: 0.9, b: 0.4 }];
        let scores = score_candidates(
            &index,
            &terms(&["banana"]),
            &terms(&["d1", "ghost", "d2"]),
            &grid,
            index.avg_doc_len(),
            10,
        );
        assert_eq!(scores.excluded, 1);
        assert!(!scores.lists[0].contains_key("ghost"));
        assert_eq!(scores.lists[0].len(), 2);
    }

    #[test]
    fn test_hits_truncates_after_sorting() {
        let index = index();
        let grid = [GridPoint { k1: 1.2, b: 0.75 }];
        let scores = score_candidates(
            &index,
            &terms(&["cherry"]),
            &terms(&["d1", "d2", "d3"]),
            &grid,
            index.avg_doc_len(),
            1,
        );
        assert_eq!(scores.lists[0].keys().collect::<Vec<_>>(), vec!["d3"]);
    }

    #[test]
    fn test_rerank_writes_grid_files_and_cache() {
        let temp = TempDir::new().unwrap();
        let topics = temp.path().join("topics.txt");
        fs::write(
            &topics,
            "<top>\n<num> Number: 1\n<title> apple\n</top>\n<top>\n<num> Number: 2\n<title> cherry\n</top>\n",
        )
        .unwrap();

        let index = index();
        let reranker = Bm25Reranker::new(
            &index,
            &ParamList::new(vec![0.9, 1.2]).unwrap(),
            &ParamList::new(vec![0.4, 0.6]).unwrap(),
            1000,
            TopicField::Title,
            temp.path().join("cache"),
        );
        let out = reranker.rerank(&topics, &temp.path().join("bm25")).unwrap();

        for point in reranker.grid() {
            let run = load_trec_run(&out.join(point.file_name())).unwrap();
            assert_eq!(run.keys().collect::<Vec<_>>(), vec!["1", "2"]);
        }
        assert!(reranker.topic_cache_path(&topics).unwrap().exists());
    }

    #[test]
    fn test_topic_cache_key_follows_content_and_field() {
        let temp = TempDir::new().unwrap();
        let topics = temp.path().join("topics.txt");
        fs::write(&topics, "<top>\n<num> Number: 1\n<title> apple\n</top>\n").unwrap();

        let index = index();
        let k1 = ParamList::single(0.9);
        let b = ParamList::single(0.4);
        let title = Bm25Reranker::new(&index, &k1, &b, 10, TopicField::Title, temp.path());
        let desc = Bm25Reranker::new(&index, &k1, &b, 10, TopicField::Description, temp.path());

        let path = title.topic_cache_path(&topics).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        let key = name
            .strip_prefix("topic.analyze.")
            .and_then(|rest| rest.strip_suffix(".json"))
            .unwrap();
        assert_eq!(key.len(), 16);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(path, title.topic_cache_path(&topics).unwrap());
        assert_ne!(path, desc.topic_cache_path(&topics).unwrap());

        fs::write(&topics, "<top>\n<num> Number: 1\n<title> cherry\n</top>\n").unwrap();
        assert_ne!(path, title.topic_cache_path(&topics).unwrap());
    }

    #[test]
    fn test_candidates_limit_queries() {
        let temp = TempDir::new().unwrap();
        let topics = temp.path().join("topics.txt");
        fs::write(
            &topics,
            "<top>\n<num> Number: 1\n<title> apple\n</top>\n<top>\n<num> Number: 2\n<title> cherry\n</top>\n",
        )
        .unwrap();

        let mut candidates = Run::new();
        candidates.get_or_default("2").insert("d2", 1.0);
        candidates.get_or_default("2").insert("d3", 0.5);

        let index = index();
        let reranker = Bm25Reranker::new(
            &index,
            &ParamList::single(0.9),
            &ParamList::single(0.4),
            1000,
            TopicField::Title,
            temp.path().join("cache"),
        )
        .with_candidates(candidates);
        let out = reranker.rerank(&topics, &temp.path().join("bm25")).unwrap();

        let run = load_trec_run(&out.join("searcher_k1=0.9,b=0.4")).unwrap();
        assert_eq!(run.len(), 1);
        assert_eq!(run.get("2").unwrap().keys().collect::<Vec<_>>(), vec!["d3", "d2"]);
    }
}
