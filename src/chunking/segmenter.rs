//! Similarity-driven document segmentation.
//!
//! # Algorithm Overview
//!
//! 1. Split the document into sentence units (see `sentences`)
//! 2. Embed every unit and score each adjacent pair by cosine similarity
//! 3. Greedily pack units, opening a new segment when the similarity to the
//!    previous unit drops below `similarity_threshold` or the segment would
//!    grow past `max_segment_chars`
//! 4. Optionally prepend `overlap_units` trailing units of the previous
//!    segment, as long as the result still fits

use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::sentences::{split_units, Unit};
use super::types::{Document, Segment};
use crate::embedding::Embedder;
use crate::vector_math::adjacent_similarities;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Maximum segment size in characters.
    pub max_segment_chars: usize,
    /// Adjacent units scoring below this start a new segment. Range [0, 1].
    pub similarity_threshold: f32,
    /// Units of the previous segment repeated at the start of the next.
    pub overlap_units: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            max_segment_chars: 1000,
            similarity_threshold: 0.5,
            overlap_units: 0,
        }
    }
}

pub struct BoundarySegmenter {
    config: SegmenterConfig,
    embedder: Arc<dyn Embedder>,
}

impl BoundarySegmenter {
    pub fn new(config: SegmenterConfig, embedder: Arc<dyn Embedder>) -> Self {
        Self { config, embedder }
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Segments `document` in order. Never yields an empty segment.
    ///
    /// If the embedder fails the document is packed by size alone.
    pub async fn segment(&self, document: &Document) -> Vec<Segment> {
        let text = document.text.as_str();
        let units = split_units(text, self.config.max_segment_chars);
        if units.is_empty() {
            return Vec::new();
        }

        let similarities = self.similarities(&document.id, text, &units).await;
        let groups = pack_units(&units, &similarities, &self.config);

        groups
            .into_iter()
            .enumerate()
            .map(|(index, range)| {
                let first = units[range.start];
                let last = units[range.end - 1];
                let mut metadata = document.metadata.clone();
                metadata.insert("document_id".to_string(), Value::from(document.id.clone()));
                metadata.insert("chunk_index".to_string(), Value::from(index));
                metadata.insert("start_offset".to_string(), Value::from(first.char_start));

                Segment {
                    document_id: document.id.clone(),
                    index,
                    text: text[first.start..last.end].to_string(),
                    start_offset: first.char_start,
                    metadata,
                }
            })
            .collect()
    }

    async fn similarities(&self, document_id: &str, text: &str, units: &[Unit]) -> Vec<f32> {
        if units.len() < 2 {
            return Vec::new();
        }

        let inputs: Vec<String> = units.iter().map(|u| u.text(text).to_string()).collect();
        match self.embedder.embed(&inputs).await {
            Ok(vectors) if vectors.len() == inputs.len() => adjacent_similarities(&vectors),
            Ok(vectors) => {
                tracing::warn!(
                    "Segmenter fell back to size-only packing for {} (embedding count {} != {})",
                    document_id,
                    vectors.len(),
                    inputs.len()
                );
                vec![1.0; units.len() - 1]
            }
            Err(err) => {
                tracing::warn!(
                    "Segmenter fell back to size-only packing for {}: {}",
                    document_id,
                    err
                );
                vec![1.0; units.len() - 1]
            }
        }
    }
}

/// Groups unit indices into segments. `similarities[i]` scores units
/// `i` and `i + 1`.
pub fn pack_units(units: &[Unit], similarities: &[f32], config: &SegmenterConfig) -> Vec<Range<usize>> {
    if units.is_empty() {
        return Vec::new();
    }

    let max_chars = config.max_segment_chars.max(1);
    let span = |from: usize, to: usize| units[to].char_end - units[from].char_start;

    let mut cores = Vec::new();
    let mut start = 0;
    for i in 1..units.len() {
        let similarity = similarities.get(i - 1).copied().unwrap_or(1.0);
        if similarity < config.similarity_threshold || span(start, i) > max_chars {
            cores.push(start..i);
            start = i;
        }
    }
    cores.push(start..units.len());

    if config.overlap_units == 0 {
        return cores;
    }

    cores
        .into_iter()
        .map(|core| {
            let mut overlap = config.overlap_units.min(core.start);
            while overlap > 0 && span(core.start - overlap, core.end - 1) > max_chars {
                overlap -= 1;
            }
            (core.start - overlap)..core.end
        })
        .collect()
}
