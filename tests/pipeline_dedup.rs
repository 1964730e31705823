// tests/pipeline_dedup.rs
//
// Enqueueing the same topic twice before it completes: the second
// call returns false and exactly one worker ever runs for it.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assistant_orchestrator::learning::{
    ContentExtractor, LearningConfig, LearningPipeline, SourceDiscovery, SourceScorer,
    TrustConfig, WorkerContext,
};

struct NoDiscovery;

#[async_trait]
impl SourceDiscovery for NoDiscovery {
    async fn discover(&self, _topic: &str) -> Result<Vec<String>> {
        Ok(vec![])
    }
    fn name(&self) -> &'static str {
        "none"
    }
}

struct SlowExtractor {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ContentExtractor for SlowExtractor {
    async fn extract(&self, _url: &str) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(Some(
            "A full sentence with enough words to count as a key point.".to_string(),
        ))
    }
}

fn pipeline_with(calls: Arc<AtomicUsize>) -> LearningPipeline {
    let ctx = WorkerContext {
        scorer: SourceScorer::new(TrustConfig::default_seed()),
        discovery: vec![Arc::new(NoDiscovery)],
        extractor: Arc::new(SlowExtractor { calls }),
    };
    LearningPipeline::new(LearningConfig::default(), ctx)
}

async fn wait_until<F: Fn() -> bool>(pred: F, max: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + max;
    while tokio::time::Instant::now() < deadline {
        if pred() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    pred()
}

#[tokio::test]
async fn duplicate_enqueue_is_rejected_and_runs_one_worker() {
    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline_with(calls.clone());
    pipeline.start();

    let sources = Some(vec!["https://stackoverflow.com/q/1".to_string()]);
    assert!(pipeline.enqueue("Rust lifetimes", sources.clone()));
    // second request for the same topic while the first is in flight
    assert!(!pipeline.enqueue("Rust lifetimes", sources.clone()));
    // dedup key is case-insensitive
    assert!(!pipeline.enqueue("rust LIFETIMES", sources));

    assert!(
        wait_until(
            || pipeline.summary("rust lifetimes").is_some(),
            Duration::from_secs(5)
        )
        .await,
        "topic should complete"
    );

    assert_eq!(calls.load(Ordering::SeqCst), 1, "one extraction, one worker");
    assert!(pipeline.active_topics().is_empty());

    // completed topic can be requeued
    assert!(pipeline.enqueue(
        "Rust lifetimes",
        Some(vec!["https://stackoverflow.com/q/1".to_string()])
    ));

    pipeline.stop().await;
}

#[tokio::test]
async fn enqueue_after_stop_is_rejected() {
    let pipeline = pipeline_with(Arc::new(AtomicUsize::new(0)));
    pipeline.start();
    pipeline.stop().await;
    assert!(!pipeline.enqueue("anything", None));
}
