// tests/e2e_supervision.rs
//
// End-to-end smoke: the real learning pipeline and llm handle run
// under the supervisor, a topic is learned while supervised, and a
// full shutdown leaves every service stopped.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assistant_orchestrator::connector::Connector;
use assistant_orchestrator::learning::{
    ContentExtractor, LearningConfig, LearningPipeline, Outcome, SourceDiscovery, SourceScorer,
    TrustConfig, WorkerContext,
};
use assistant_orchestrator::llm::{DisabledLlm, LlmHandle};
use assistant_orchestrator::services::{ConnectorService, LlmService, PipelineService};
use assistant_orchestrator::supervisor::{Supervisor, SupervisorConfig, SupervisorState};

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

struct InstantExtractor;

#[async_trait]
impl ContentExtractor for InstantExtractor {
    async fn extract(&self, _url: &str) -> Result<Option<String>> {
        Ok(Some(
            "Consensus requires a quorum of replicas to agree on each entry.".to_string(),
        ))
    }
}

/// In-process stand-in for a chat-platform connector.
struct StubConnector {
    initialized: AtomicBool,
    running: AtomicBool,
}

impl StubConnector {
    fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Connector for StubConnector {
    async fn initialize(&self) -> bool {
        self.initialized.store(true, Ordering::SeqCst);
        true
    }
    async fn start(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }
    async fn stop(&self, _timeout: Duration) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }
    async fn restart(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }
    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
    fn healthy(&self) -> bool {
        self.initialized.load(Ordering::SeqCst) && self.running()
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
async fn supervised_pipeline_learns_and_shuts_down_cleanly() {
    let ctx = WorkerContext {
        scorer: SourceScorer::new(TrustConfig::default_seed()),
        discovery: vec![Arc::new(NoDiscovery)],
        extractor: Arc::new(InstantExtractor),
    };
    let pipeline = Arc::new(LearningPipeline::new(LearningConfig::default(), ctx));
    let llm = Arc::new(DisabledLlm::new());
    let connector = Arc::new(StubConnector::new());

    let sup = Supervisor::new(SupervisorConfig {
        health_interval: Duration::from_millis(100),
        reconnect_interval: Duration::from_millis(200),
        max_reconnect_failures: 3,
    });
    sup.register(
        Arc::new(LlmService::new(llm.clone())),
        Duration::from_secs(5),
    );
    sup.register(
        Arc::new(PipelineService::new(pipeline.clone())),
        Duration::from_secs(10),
    );
    sup.register_connector(
        Arc::new(ConnectorService::new(connector.clone())),
        Duration::from_secs(10),
    );

    sup.start().await.unwrap();
    assert_eq!(sup.state(), SupervisorState::Running);
    assert!(pipeline.healthy());
    assert!(connector.healthy());

    assert!(pipeline.enqueue(
        "raft consensus",
        Some(vec!["https://stackoverflow.com/q/11".into()])
    ));
    assert!(
        wait_until(
            || pipeline.summary("raft consensus").is_some(),
            Duration::from_secs(5)
        )
        .await
    );
    assert_eq!(
        pipeline.summary("raft consensus").unwrap().outcome,
        Outcome::Learned
    );

    sup.shutdown("test complete").await;
    assert_eq!(sup.state(), SupervisorState::Stopped);
    assert!(!pipeline.healthy());
    assert!(!connector.running());
    assert!(!llm.healthy());
    assert!(!pipeline.enqueue("anything else", None));
}
