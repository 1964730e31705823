// src/learning/mod.rs
pub mod config;
pub mod discovery;
pub mod pipeline;
pub mod trust;
pub mod types;
pub mod worker;

pub use config::LearningConfig;
pub use pipeline::LearningPipeline;
pub use trust::{SourceScorer, TrustConfig};
pub use types::{
    ContentExtractor, LearningResult, Outcome, SourceCandidate, SourceDiscovery, TopicJob,
    TrustTier,
};
pub use worker::WorkerContext;

use metrics::{describe_counter, describe_gauge};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "learning_topics_enqueued_total",
            "Topics accepted into the learning queue."
        );
        describe_counter!(
            "learning_topics_rejected_total",
            "Enqueue attempts rejected (duplicate, full queue, shutdown)."
        );
        describe_counter!(
            "learning_topics_completed_total",
            "Topic jobs that produced a result."
        );
        describe_counter!(
            "learning_topics_failed_total",
            "Topic jobs that ended in a worker error."
        );
        describe_counter!(
            "learning_topics_cancelled_total",
            "Topic jobs cancelled before completion."
        );
        describe_counter!(
            "learning_discovery_errors_total",
            "Source discovery provider errors."
        );
        describe_counter!(
            "learning_extraction_errors_total",
            "Per-source extraction errors."
        );
        describe_gauge!(
            "learning_workers_active",
            "Research workers currently running."
        );
        describe_gauge!("learning_history_size", "Results held in the history ring.");
    });
}
