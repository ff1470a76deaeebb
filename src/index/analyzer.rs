use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Stemmer applied after tokenization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StemmerKind {
    #[default]
    Porter,
    None,
}

impl StemmerKind {
    /// Name understood by the external search engine's `-stemmer` flag
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Porter => "porter",
            Self::None => "none",
        }
    }
}

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// Lowercasing tokenizer with optional stopword removal and stemming
pub struct Analyzer {
    stemmer: Option<Stemmer>,
    stopwords: Option<HashSet<&'static str>>,
}

impl Analyzer {
    pub fn new(stemmer: StemmerKind, keep_stopwords: bool) -> Self {
        let stemmer = match stemmer {
            StemmerKind::Porter => Some(Stemmer::create(Algorithm::English)),
            StemmerKind::None => None,
        };
        let stopwords = if keep_stopwords {
            None
        } else {
            Some(STOPWORDS.iter().copied().collect())
        };
        Self { stemmer, stopwords }
    }

    pub fn analyze(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .filter(|token| {
                self.stopwords
                    .as_ref()
                    .map_or(true, |stops| !stops.contains(*token))
            })
            .map(|token| match &self.stemmer {
                Some(stemmer) => stemmer.stem(token).into_owned(),
                None => token.to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopwords_and_stemming() {
        let analyzer = Analyzer::new(StemmerKind::Porter, false);
        assert_eq!(
            analyzer.analyze("The Running of the Bulls"),
            vec!["run".to_string(), "bull".to_string()]
        );
    }

    #[test]
    fn test_plain_tokens() {
        let analyzer = Analyzer::new(StemmerKind::None, true);
        assert_eq!(
            analyzer.analyze("Post-Polio, the 1990s"),
            vec!["post", "polio", "the", "1990s"]
        );
    }
}
