// tests/no_reliable_sources.rs
//
// A topic with zero usable sources ends as an ordinary reportable
// result (confidence 0.0, explicit marker), never as an error.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use assistant_orchestrator::learning::{
    ContentExtractor, LearningConfig, LearningPipeline, Outcome, SourceDiscovery, SourceScorer,
    TrustConfig, WorkerContext,
};

struct EmptyDiscovery;

#[async_trait]
impl SourceDiscovery for EmptyDiscovery {
    async fn discover(&self, _topic: &str) -> Result<Vec<String>> {
        Ok(vec![])
    }
    fn name(&self) -> &'static str {
        "empty"
    }
}

struct BrokenDiscovery;

#[async_trait]
impl SourceDiscovery for BrokenDiscovery {
    async fn discover(&self, _topic: &str) -> Result<Vec<String>> {
        Err(anyhow!("search backend unavailable"))
    }
    fn name(&self) -> &'static str {
        "broken"
    }
}

struct NeverCalledExtractor;

#[async_trait]
impl ContentExtractor for NeverCalledExtractor {
    async fn extract(&self, url: &str) -> Result<Option<String>> {
        panic!("extractor must not run without accepted sources: {url}");
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
async fn zero_discoverable_sources_reports_no_reliable_sources() {
    let ctx = WorkerContext {
        scorer: SourceScorer::new(TrustConfig::default_seed()),
        discovery: vec![Arc::new(EmptyDiscovery), Arc::new(BrokenDiscovery)],
        extractor: Arc::new(NeverCalledExtractor),
    };
    let pipeline = LearningPipeline::new(LearningConfig::default(), ctx);
    pipeline.start();

    assert!(pipeline.enqueue("quantum computing", None));
    assert!(
        wait_until(
            || pipeline.summary("quantum computing").is_some(),
            Duration::from_secs(5)
        )
        .await,
        "job must terminate with a result, not hang or crash"
    );

    let result = pipeline.summary("quantum computing").unwrap();
    assert_eq!(result.outcome, Outcome::NoReliableSources);
    assert_eq!(result.confidence, 0.0);
    assert!(result.sources.is_empty());
    assert!(result.key_points.is_empty());
    assert!(pipeline.active_topics().is_empty());

    pipeline.stop().await;
}

#[tokio::test]
async fn untrusted_supplied_sources_also_report_no_reliable_sources() {
    let mut cfg = TrustConfig::default_seed();
    cfg.blocked_domains.insert("junkfarm.example".to_string());
    let ctx = WorkerContext {
        scorer: SourceScorer::new(cfg),
        discovery: vec![Arc::new(EmptyDiscovery)],
        extractor: Arc::new(NeverCalledExtractor),
    };
    let pipeline = LearningPipeline::new(LearningConfig::default(), ctx);
    pipeline.start();

    assert!(pipeline.enqueue(
        "dubious topic",
        Some(vec![
            "https://junkfarm.example/a".to_string(),
            "https://random-unknown.example/b".to_string(),
        ])
    ));
    assert!(
        wait_until(
            || pipeline.summary("dubious topic").is_some(),
            Duration::from_secs(5)
        )
        .await
    );

    let result = pipeline.summary("dubious topic").unwrap();
    assert_eq!(result.outcome, Outcome::NoReliableSources);

    pipeline.stop().await;
}
