//! Document and segment types shared by chunking, enrichment and indexing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

const CONTEXT_OPEN: &str = "[CONTEXT: ";
const CONTEXT_CLOSE: &str = "]\n\n";

/// A loaded document. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub metadata: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The first `max_chars` characters of the text.
    pub fn preview(&self, max_chars: usize) -> &str {
        truncate_chars(&self.text, max_chars)
    }
}

/// A contiguous slice of a document produced by the segmenter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub document_id: String,
    /// 0-based position within the document.
    pub index: usize,
    pub text: String,
    /// Character offset of `text` within the document.
    pub start_offset: usize,
    pub metadata: Map<String, Value>,
}

impl Segment {
    /// Stable identifier derived from the document id and position.
    pub fn chunk_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.document_id.as_bytes());
        hasher.update(b":");
        hasher.update(self.index.to_le_bytes());
        hex::encode(&hasher.finalize()[..12])
    }
}

/// A segment plus its generated context note, if enrichment succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedSegment {
    pub segment: Segment,
    pub context: Option<String>,
}

impl EnrichedSegment {
    pub fn unenriched(segment: Segment) -> Self {
        Self {
            segment,
            context: None,
        }
    }

    /// Whitespace in `note` is collapsed so the tag stays on one line.
    pub fn with_context(segment: Segment, note: &str) -> Self {
        let note = note.split_whitespace().collect::<Vec<_>>().join(" ");
        Self {
            segment,
            context: Some(note),
        }
    }

    pub fn index(&self) -> usize {
        self.segment.index
    }

    pub fn is_enriched(&self) -> bool {
        self.context.is_some()
    }

    /// `[CONTEXT: note]\n\nbody` when enriched, otherwise the original text.
    pub fn text(&self) -> String {
        match &self.context {
            Some(note) => format_with_context(note, &self.segment.text),
            None => self.segment.text.clone(),
        }
    }
}

pub fn format_with_context(note: &str, body: &str) -> String {
    format!("{}{}{}{}", CONTEXT_OPEN, note.trim(), CONTEXT_CLOSE, body)
}

/// Splits an enriched text into `(note, body)`.
pub fn parse_context(text: &str) -> Option<(&str, &str)> {
    let rest = text.strip_prefix(CONTEXT_OPEN)?;
    let close = rest.find(CONTEXT_CLOSE)?;
    let note = &rest[..close];
    if note.contains('\n') {
        return None;
    }
    Some((note, &rest[close + CONTEXT_CLOSE.len()..]))
}

/// Removes a leading context tag, if any.
pub fn strip_context(text: &str) -> &str {
    parse_context(text).map(|(_, body)| body).unwrap_or(text)
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
