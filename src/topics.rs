//! TREC topic files
//!
//! Parses `<top>` blocks with `<num>`, `<title>`, `<desc>` and `<narr>`
//! fields. Field text may continue over several lines.

use crate::error::{FoldrankError, Result};
use crate::run::OrderedMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Which topic field becomes the query text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicField {
    Title,
    Description,
    Narrative,
}

impl TopicField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Description => "description",
            Self::Narrative => "narrative",
        }
    }
}

impl fmt::Display for TopicField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopicField {
    type Err = FoldrankError;

    /// Accepts the TREC names plus the `query` / `question` aliases used by
    /// question-style benchmarks
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "title" | "query" => Ok(Self::Title),
            "desc" | "description" | "question" => Ok(Self::Description),
            "narr" | "narrative" => Ok(Self::Narrative),
            other => Err(FoldrankError::InvalidArgument(format!(
                "unknown topic field '{}'",
                other
            ))),
        }
    }
}

/// Parsed topics, one table per field
#[derive(Debug, Clone, Default)]
pub struct Topics {
    pub title: OrderedMap<String>,
    pub description: OrderedMap<String>,
    pub narrative: OrderedMap<String>,
}

impl Topics {
    pub fn field(&self, field: TopicField) -> &OrderedMap<String> {
        match field {
            TopicField::Title => &self.title,
            TopicField::Description => &self.description,
            TopicField::Narrative => &self.narrative,
        }
    }
}

pub fn load_trec_topics(path: &Path) -> Result<Topics> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| FoldrankError::io(e, format!("Failed to read topics: {}", path.display())))?;
    parse_trec_topics(&content, path)
}

fn parse_trec_topics(content: &str, path: &Path) -> Result<Topics> {
    let tag_line = Regex::new(
        r"^<(num|title|desc|narr)>\s*(?:Number:|Description:|Narrative:)?\s*(.*?)\s*(?:</\w+>)?$",
    )
    .map_err(|e| FoldrankError::Other(e.into()))?;

    let mut topics = Topics::default();
    let mut qid: Option<String> = None;
    let mut block: Option<TopicField> = None;

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("<top>") || line.starts_with("</top>") {
            block = None;
            continue;
        }

        let (field, text) = match tag_line.captures(line) {
            Some(caps) => {
                let text = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
                match &caps[1] {
                    "num" => {
                        let id = text.split_whitespace().last().ok_or_else(|| {
                            FoldrankError::format(path, idx + 1, "topic number is empty")
                        })?;
                        qid = Some(id.to_string());
                        block = None;
                        continue;
                    }
                    "title" => (TopicField::Title, text),
                    "desc" => (TopicField::Description, text),
                    _ => (TopicField::Narrative, text),
                }
            }
            None => match block {
                Some(field) => (field, line),
                None => continue,
            },
        };

        let id = qid.as_deref().ok_or_else(|| {
            FoldrankError::format(path, idx + 1, "topic field appears before <num>")
        })?;
        block = Some(field);
        append_text(&mut topics, field, id, text);
    }

    Ok(topics)
}

fn append_text(topics: &mut Topics, field: TopicField, qid: &str, text: &str) {
    let table = match field {
        TopicField::Title => &mut topics.title,
        TopicField::Description => &mut topics.description,
        TopicField::Narrative => &mut topics.narrative,
    };
    let current = table.get_or_default(qid);
    for word in text.split_whitespace() {
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
}
