// tests/pipeline_backpressure.rs
//
// The dispatcher never runs more than max_parallel workers at once;
// extra topics wait for a slot instead of erroring.

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

/// Tracks how many extractions overlap.
struct GaugedExtractor {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl ContentExtractor for GaugedExtractor {
    async fn extract(&self, _url: &str) -> Result<Option<String>> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(Some(
            "One observable sentence with plenty of words inside.".to_string(),
        ))
    }
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
async fn worker_pool_is_capped_and_overflow_only_delays() {
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let cfg = LearningConfig {
        max_parallel: 2,
        ..LearningConfig::default()
    };
    let ctx = WorkerContext {
        scorer: SourceScorer::new(TrustConfig::default_seed()),
        discovery: vec![Arc::new(NoDiscovery)],
        extractor: Arc::new(GaugedExtractor {
            current: current.clone(),
            peak: peak.clone(),
        }),
    };
    let pipeline = LearningPipeline::new(cfg, ctx);
    pipeline.start();

    let topics = [
        "topic one",
        "topic two",
        "topic three",
        "topic four",
        "topic five",
        "topic six",
    ];
    for t in topics {
        // more topics than worker slots: every enqueue still succeeds
        assert!(pipeline.enqueue(t, Some(vec!["https://stackoverflow.com/q/9".into()])));
    }

    assert!(
        wait_until(
            || topics.iter().all(|t| pipeline.summary(t).is_some()),
            Duration::from_secs(10)
        )
        .await,
        "all topics should eventually complete"
    );

    assert!(
        peak.load(Ordering::SeqCst) <= 2,
        "observed {} concurrent workers, cap is 2",
        peak.load(Ordering::SeqCst)
    );
    assert!(pipeline.active_topics().is_empty());

    pipeline.stop().await;
}

#[tokio::test]
async fn full_queue_rejects_without_marking_active() {
    let cfg = LearningConfig {
        max_parallel: 1,
        queue_bound: 1,
        ..LearningConfig::default()
    };
    let ctx = WorkerContext {
        scorer: SourceScorer::new(TrustConfig::default_seed()),
        discovery: vec![Arc::new(NoDiscovery)],
        extractor: Arc::new(GaugedExtractor {
            current: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }),
    };
    // never started: jobs sit in the bounded queue
    let pipeline = LearningPipeline::new(cfg, ctx);

    assert!(pipeline.enqueue("first", None));
    assert!(!pipeline.enqueue("second", None), "queue of one is full");
    // the rejected topic was rolled back out of the active set
    assert_eq!(pipeline.active_topics(), vec!["first".to_string()]);
}
