//! Second chance for segments the first pass left unenriched.
//!
//! The first pass yields an immutable result list. Positions still lacking
//! a note are retried with a larger budget, producing a patch map that
//! `merge` applies in one step.

use std::collections::BTreeMap;

use super::engine::ContextEnricher;
use crate::chunking::EnrichedSegment;

/// Replacement segments keyed by position in the first-pass results.
pub type PatchMap = BTreeMap<usize, EnrichedSegment>;

pub fn pending_positions(results: &[EnrichedSegment]) -> Vec<usize> {
    results
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.is_enriched())
        .map(|(pos, _)| pos)
        .collect()
}

/// Applies `patches` by position. Length and order are unchanged.
pub fn merge(results: Vec<EnrichedSegment>, mut patches: PatchMap) -> Vec<EnrichedSegment> {
    results
        .into_iter()
        .enumerate()
        .map(|(pos, original)| patches.remove(&pos).unwrap_or(original))
        .collect()
}

impl ContextEnricher {
    /// Retries each pending position with the reconciliation budget. Only
    /// successes are patched.
    pub async fn reconcile(
        &mut self,
        results: &[EnrichedSegment],
        pending: &[usize],
        document_preview: &str,
    ) -> PatchMap {
        let retry = self.config().reconcile_pass();
        let mut patches = PatchMap::new();

        for (done, &pos) in pending.iter().enumerate() {
            let Some(failed) = results.get(pos) else {
                continue;
            };
            if self.policy().is_exhausted() {
                tracing::warn!(
                    "Skipping reconciliation of {} segments: no usable credential",
                    pending.len() - done
                );
                break;
            }

            let retried = self.enrich_with(&failed.segment, document_preview, &retry).await;
            if retried.is_enriched() {
                tracing::info!("Recovered segment {} on reconciliation", retried.index());
                patches.insert(pos, retried);
            } else {
                tracing::warn!("Segment {} stays unenriched after reconciliation", failed.index());
            }
        }
        patches
    }
}
