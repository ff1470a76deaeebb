use crate::error::{FoldrankError, Result};
use crate::run::{OrderedMap, Run};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Query ids a fold predicts on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldPredict {
    pub dev: HashSet<String>,
    pub test: HashSet<String>,
}

/// One cross-validation fold
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub train_qids: HashSet<String>,
    pub predict: FoldPredict,
}

/// Split a fold predicts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Dev,
    Test,
}

impl Split {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Dev => "dev",
            Self::Test => "test",
        }
    }
}

impl Fold {
    pub fn qids(&self, split: Split) -> &HashSet<String> {
        match split {
            Split::Train => &self.train_qids,
            Split::Dev => &self.predict.dev,
            Split::Test => &self.predict.test,
        }
    }
}

/// Folds in declaration order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Folds(OrderedMap<Fold>);

impl Folds {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| FoldrankError::io(e, format!("Failed to read folds: {}", path.display())))?;
        let folds: Self = serde_json::from_str(&content).map_err(|e| FoldrankError::Json {
            source: e,
            context: format!("Failed to parse folds: {}", path.display()),
        })?;
        tracing::debug!("Loaded {} folds from {}", folds.len(), path.display());
        Ok(folds)
    }

    pub fn get(&self, name: &str) -> Result<&Fold> {
        self.0
            .get(name)
            .ok_or_else(|| FoldrankError::UnknownFold(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Fold)> for Folds {
    fn from_iter<T: IntoIterator<Item = (K, Fold)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Training queries of `fold` with all their documents
pub fn train_split(base: &Run, fold: &Fold) -> Run {
    base.select_queries(|qid| fold.train_qids.contains(qid), None)
}

/// Queries in `qids`, each cut to its first `threshold` documents
pub fn predict_split(base: &Run, qids: &HashSet<String>, threshold: usize) -> Run {
    base.select_queries(|qid| qids.contains(qid), Some(threshold))
}
