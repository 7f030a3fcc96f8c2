use std::sync::Arc;
use std::time::Duration;

use serde_json::Map;
use tokio::time::Instant;

use super::*;
use crate::chunking::{Document, Segment};
use crate::core::errors::ProviderError;
use crate::llm::tests::ScriptedProvider;
use crate::llm::{Credential, ModelCandidate};

fn segment(index: usize, text: &str) -> Segment {
    Segment {
        document_id: "doc".to_string(),
        index,
        text: text.to_string(),
        start_offset: 0,
        metadata: Map::new(),
    }
}

fn two_models(max_retries: u32) -> EnrichmentConfig {
    EnrichmentConfig {
        max_retries,
        models: vec![ModelCandidate::new("lite", 10), ModelCandidate::new("flash", 5)],
        ..Default::default()
    }
}

fn unlimited(max_retries: u32) -> EnrichmentConfig {
    EnrichmentConfig {
        max_retries,
        models: vec![ModelCandidate::new("lite", 0)],
        ..Default::default()
    }
}

fn keys() -> Vec<Credential> {
    Credential::from_keys(["secret-a", "secret-b"])
}

fn route(label: &str, model: &str) -> (String, String) {
    (label.to_string(), model.to_string())
}

fn quota() -> ProviderError {
    ProviderError::QuotaExceeded("RESOURCE_EXHAUSTED".to_string())
}

#[tokio::test(start_paused = true)]
async fn invalid_credential_fails_over_to_unthrottled_within_the_attempt() {
    let provider = Arc::new(ScriptedProvider::new(|cred, _, _| {
        if cred.label() == "key#1" {
            Err(ProviderError::InvalidCredential("API_KEY_INVALID".to_string()))
        } else {
            Ok("Part of the 2024 outlook.".to_string())
        }
    }));
    let prod = Credential::new("secret-prod", "unthrottled");
    let mut enricher = ContextEnricher::new(provider.clone(), two_models(5), keys(), Some(prod));

    let start = Instant::now();
    let first = enricher.enrich(&segment(0, "Rates rise."), "preview").await;
    for i in 1..4 {
        assert!(enricher.enrich(&segment(i, "More."), "preview").await.is_enriched());
    }

    assert_eq!(first.text(), "[CONTEXT: Part of the 2024 outlook.]\n\nRates rise.");
    let routes = provider.routes();
    assert_eq!(routes[0], route("key#1", "lite"));
    assert_eq!(routes[1], route("unthrottled", "lite"));
    assert!(routes[2..].iter().all(|r| r.0 == "unthrottled"));
    assert_eq!(enricher.policy().active_credentials().len(), 3);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn quota_failures_walk_credentials_then_models() {
    let provider = Arc::new(ScriptedProvider::new(|_, _, _| Err(quota())));
    let mut enricher = ContextEnricher::new(provider.clone(), two_models(5), keys(), None);

    let original = segment(0, "Unchanged body.");
    let out = enricher.enrich(&original, "preview").await;

    assert_eq!(
        provider.routes(),
        vec![
            route("key#1", "lite"),
            route("key#2", "lite"),
            route("key#1", "flash"),
            route("key#2", "flash"),
        ]
    );
    assert!(!out.is_enriched());
    assert_eq!(out.text(), original.text);
}

#[tokio::test(start_paused = true)]
async fn successive_calls_on_a_pair_are_spaced_by_rpm() {
    let provider = Arc::new(ScriptedProvider::always("note"));
    let config = EnrichmentConfig {
        models: vec![ModelCandidate::new("flash", 5)],
        ..Default::default()
    };
    let mut enricher = ContextEnricher::new(provider.clone(), config, keys(), None);

    let start = Instant::now();
    enricher.enrich(&segment(0, "a"), "p").await;
    enricher.enrich(&segment(1, "b"), "p").await;

    assert!(start.elapsed() >= Duration::from_secs(12));
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_back_off_exponentially_on_the_same_route() {
    let provider = Arc::new(ScriptedProvider::new(|_, _, call| {
        if call < 2 {
            Err(ProviderError::Transient("connection reset".to_string()))
        } else {
            Ok("note".to_string())
        }
    }));
    let mut enricher = ContextEnricher::new(provider.clone(), unlimited(5), keys(), None);

    let start = Instant::now();
    let out = enricher.enrich(&segment(0, "body"), "p").await;

    assert!(out.is_enriched());
    // 2s after attempt 0, 4s after attempt 1
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(6) && elapsed < Duration::from_millis(6_500));
    assert!(provider.routes().iter().all(|r| r.0 == "key#1"));
}

#[tokio::test(start_paused = true)]
async fn empty_output_is_retried() {
    let provider = Arc::new(ScriptedProvider::new(|_, _, call| {
        Ok(if call == 0 { "   ".to_string() } else { " note ".to_string() })
    }));
    let mut enricher = ContextEnricher::new(provider.clone(), unlimited(3), keys(), None);

    let out = enricher.enrich(&segment(0, "body"), "p").await;

    assert_eq!(out.context.as_deref(), Some("note"));
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn retry_budget_bounds_transient_failures() {
    let provider = Arc::new(ScriptedProvider::new(|_, _, _| {
        Err(ProviderError::Transient("timeout".to_string()))
    }));
    let mut enricher = ContextEnricher::new(provider.clone(), unlimited(3), keys(), None);

    let out = enricher.enrich(&segment(0, "body"), "p").await;

    assert!(!out.is_enriched());
    assert_eq!(provider.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn last_working_route_is_kept_for_the_next_segment() {
    let provider = Arc::new(ScriptedProvider::new(|_, _, call| {
        if call == 0 {
            Err(quota())
        } else {
            Ok("note".to_string())
        }
    }));
    let mut enricher = ContextEnricher::new(provider.clone(), unlimited(5), keys(), None);

    enricher.enrich(&segment(0, "a"), "p").await;
    enricher.enrich(&segment(1, "b"), "p").await;

    assert_eq!(
        provider.routes(),
        vec![route("key#1", "lite"), route("key#2", "lite"), route("key#2", "lite")]
    );
}

#[tokio::test(start_paused = true)]
async fn reconciliation_recovers_failed_segments_in_place() {
    let provider = Arc::new(ScriptedProvider::new(|_, _, call| {
        if call == 1 {
            Err(ProviderError::Transient("503".to_string()))
        } else {
            Ok(format!("note {}", call))
        }
    }));
    let mut enricher = ContextEnricher::new(provider.clone(), unlimited(1), keys(), None);
    let doc = Document::new("doc", "a b c");
    let segments = vec![segment(0, "a"), segment(1, "b"), segment(2, "c")];

    let report = enricher.enrich_document(&doc, segments).await;

    let indices: Vec<usize> = report.segments.iter().map(|s| s.index()).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert_eq!(report.segments[1].context.as_deref(), Some("note 3"));
    assert_eq!(report.segments[2].context.as_deref(), Some("note 2"));
    assert_eq!((report.enriched, report.recovered, report.unenriched), (3, 1, 0));
}

#[tokio::test(start_paused = true)]
async fn total_quota_collapse_keeps_every_segment_unenriched() {
    let provider = Arc::new(ScriptedProvider::new(|_, _, _| Err(quota())));
    let mut enricher = ContextEnricher::new(
        provider.clone(),
        unlimited(2),
        Credential::from_keys(["only"]),
        None,
    );
    let doc = Document::new("doc", "first second");
    let segments = vec![segment(0, "first"), segment(1, "second")];

    let report = enricher.enrich_document(&doc, segments.clone()).await;

    assert_eq!(report.segments.len(), 2);
    for (out, original) in report.segments.iter().zip(&segments) {
        assert_eq!(out.index(), original.index);
        assert_eq!(out.text(), original.text);
    }
    assert_eq!(report.unenriched, 2);
    // one exhausted attempt each, then 2 x 2 reconciliation attempts each
    assert_eq!(provider.call_count(), 2 + 2 * 4);
}

#[tokio::test(start_paused = true)]
async fn no_calls_once_every_credential_is_invalid() {
    let provider = Arc::new(ScriptedProvider::new(|_, _, _| {
        Err(ProviderError::InvalidCredential("revoked".to_string()))
    }));
    let mut enricher = ContextEnricher::new(provider.clone(), unlimited(5), keys(), None);
    let doc = Document::new("doc", "x y z");
    let segments = vec![segment(0, "x"), segment(1, "y"), segment(2, "z")];

    let report = enricher.enrich_document(&doc, segments).await;

    assert_eq!(provider.call_count(), 2);
    assert_eq!(report.unenriched, 3);
    assert!(enricher.policy().is_exhausted());
}

#[tokio::test(start_paused = true)]
async fn prompt_carries_the_bounded_document_preview() {
    let provider = Arc::new(ScriptedProvider::always("note"));
    let config = EnrichmentConfig {
        preview_chars: 10,
        chunk_prompt_chars: 4,
        ..unlimited(1)
    };
    let mut enricher = ContextEnricher::new(provider.clone(), config, keys(), None);
    let doc = Document::new("doc", "0123456789abcdef");

    enricher.enrich_document(&doc, vec![segment(0, "abcdef")]).await;

    let prompt = &provider.prompts()[0];
    assert!(prompt.contains("DOCUMENT: 0123456789\n\n"));
    assert!(prompt.contains("CHUNK: abcd\n\n"));
}
