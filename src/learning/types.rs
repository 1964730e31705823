// src/learning/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};

/// Discrete trust rank for a candidate source. Order matters:
/// only `Reliable` and above proceed to extraction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TrustTier {
    Untrusted,
    General,
    Reliable,
    Verified,
    Academic,
}

impl TrustTier {
    /// Tiers eligible for extraction.
    pub fn is_acceptable(self) -> bool {
        self >= TrustTier::Reliable
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SourceCandidate {
    pub url: String,
    pub tier: TrustTier,
    pub confidence: f32,
}

/// One unit of background research work, keyed by topic.
#[derive(Debug, Clone)]
pub struct TopicJob {
    pub topic: String,
    pub sources: Option<Vec<String>>,
    pub queued_at: DateTime<Utc>,
}

/// How a topic job ended. All three are ordinary results, not errors:
/// the pipeline never surfaces a worker problem as a crash.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Learned,
    NoReliableSources,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LearningResult {
    pub topic: String,
    pub outcome: Outcome,
    pub sources: Vec<SourceCandidate>,
    pub key_points: Vec<String>,
    /// Aggregate confidence in [0.0, 1.0].
    pub confidence: f32,
    pub produced_at: DateTime<Utc>,
}

impl LearningResult {
    /// Terminal record for a topic with no acceptable sources.
    pub fn no_reliable_sources(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            outcome: Outcome::NoReliableSources,
            sources: Vec::new(),
            key_points: Vec::new(),
            confidence: 0.0,
            produced_at: Utc::now(),
        }
    }
}

/// Finds candidate URLs for a topic. Fallible; the worker treats a
/// provider error as "fewer candidates", never as a fatal job error.
#[async_trait::async_trait]
pub trait SourceDiscovery: Send + Sync {
    async fn discover(&self, topic: &str) -> Result<Vec<String>>;
    fn name(&self) -> &'static str;
}

/// Fetches one URL and extracts readable text. `Ok(None)` means the
/// page had nothing usable; `Err` means the fetch itself failed.
#[async_trait::async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, url: &str) -> Result<Option<String>>;
}
