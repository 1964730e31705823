// src/learning/worker.rs
//
// One research job: discover candidate sources, validate them against
// the trust tables, extract what survives, and fold everything into a
// LearningResult. Every step can fail on its own without taking the
// job down; "no reliable sources" is a normal outcome, not an error.

use chrono::Utc;
use metrics::counter;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::learning::trust::SourceScorer;
use crate::learning::types::{
    ContentExtractor, LearningResult, Outcome, SourceDiscovery,
};

/// Maximum key points kept per result.
const MAX_KEY_POINTS: usize = 10;
/// Leading sentences taken from each extracted source.
const SENTENCES_PER_SOURCE: usize = 3;

/// Shared collaborators handed to every worker.
pub struct WorkerContext {
    pub scorer: SourceScorer,
    pub discovery: Vec<Arc<dyn SourceDiscovery>>,
    pub extractor: Arc<dyn ContentExtractor>,
}

/// Run one topic's research end to end. The caller owns cleanup of any
/// shared bookkeeping; this future holds no state that outlives it, so
/// aborting it at any suspension point is safe.
pub(crate) async fn research_topic(
    ctx: &WorkerContext,
    topic: &str,
    supplied: Option<Vec<String>>,
) -> LearningResult {
    // 1) Candidate URLs: caller-supplied, or discovered.
    let candidates = match supplied {
        Some(urls) if !urls.is_empty() => urls,
        _ => discover_candidates(ctx, topic).await,
    };

    // 2) Validate and rank. Zero survivors is a reportable outcome.
    let accepted = ctx.scorer.validate(&candidates);
    if accepted.is_empty() {
        warn!(topic = %topic, candidates = candidates.len(), "no reliable sources");
        return LearningResult::no_reliable_sources(topic);
    }

    // 3) Extract each accepted source; failures skip that source only.
    let mut key_points: Vec<String> = Vec::new();
    let mut confidence_sum = 0.0f32;
    for cand in &accepted {
        match ctx.extractor.extract(&cand.url).await {
            Ok(Some(text)) => {
                key_points.extend(lead_sentences(&text, SENTENCES_PER_SOURCE));
                confidence_sum += cand.confidence;
            }
            Ok(None) => {
                debug!(url = %cand.url, "nothing extractable");
            }
            Err(e) => {
                warn!(url = %cand.url, error = ?e, "extraction failed, skipping source");
                counter!("learning_extraction_errors_total").increment(1);
            }
        }
    }

    dedup_in_place(&mut key_points);
    key_points.truncate(MAX_KEY_POINTS);

    // Mean of per-source contributions over all accepted sources,
    // capped at 1.0. Sources that failed extraction dilute it.
    let confidence = (confidence_sum / accepted.len() as f32).min(1.0);

    LearningResult {
        topic: topic.to_string(),
        outcome: Outcome::Learned,
        sources: accepted,
        key_points,
        confidence,
        produced_at: Utc::now(),
    }
}

/// Ask every discovery provider; a failing provider just contributes
/// nothing. Duplicates are dropped, first occurrence wins.
async fn discover_candidates(ctx: &WorkerContext, topic: &str) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for provider in &ctx.discovery {
        match provider.discover(topic).await {
            Ok(urls) => {
                for u in urls {
                    if seen.insert(u.clone()) {
                        out.push(u);
                    }
                }
            }
            Err(e) => {
                warn!(provider = provider.name(), topic = %topic, error = ?e, "discovery failed");
                counter!("learning_discovery_errors_total").increment(1);
            }
        }
    }
    out
}

/// First `n` sentences of at least a few words each.
fn lead_sentences(text: &str, n: usize) -> Vec<String> {
    text.split_terminator(['.', '?', '!'])
        .map(str::trim)
        .filter(|s| s.split_whitespace().count() >= 4)
        .take(n)
        .map(|s| format!("{s}."))
        .collect()
}

/// Case-insensitive dedup preserving first occurrence.
fn dedup_in_place(points: &mut Vec<String>) {
    let mut seen: HashSet<String> = HashSet::new();
    points.retain(|p| seen.insert(p.to_lowercase()));
}
