//! Assistant Orchestrator — Binary Entrypoint
//! Wires the LLM handle, the learning pipeline, and the REST connector
//! under the service supervisor, then runs until a shutdown signal or
//! a fatal health event.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use assistant_orchestrator::connector::{self, AppState, RestConnector};
use assistant_orchestrator::learning::discovery::{HttpExtractor, StackExchangeDiscovery};
use assistant_orchestrator::learning::{
    LearningConfig, LearningPipeline, SourceScorer, WorkerContext,
};
use assistant_orchestrator::llm::{DisabledLlm, HttpLlm, LlmHandle};
use assistant_orchestrator::metrics::Metrics;
use assistant_orchestrator::services::{ConnectorService, LlmService, PipelineService};
use assistant_orchestrator::supervisor::{Supervisor, SupervisorConfig};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("assistant_orchestrator=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let learning_cfg = LearningConfig::from_env();
    let metrics = Metrics::init(learning_cfg.cache_ttl.as_secs());

    // --- Learning pipeline ---
    let ctx = WorkerContext {
        scorer: SourceScorer::from_default_config(),
        discovery: vec![Arc::new(StackExchangeDiscovery::new()?)],
        extractor: Arc::new(HttpExtractor::new()?),
    };
    let pipeline = Arc::new(LearningPipeline::new(learning_cfg, ctx));

    // --- LLM handle ---
    let llm: Arc<dyn LlmHandle> = if std::env::var("OPENAI_API_KEY").is_ok() {
        Arc::new(HttpLlm::new(None))
    } else {
        tracing::warn!("OPENAI_API_KEY not set, running with the disabled llm handle");
        Arc::new(DisabledLlm::new())
    };

    // --- REST connector ---
    let state = AppState {
        pipeline: pipeline.clone(),
        llm: llm.clone(),
    };
    let router = connector::router(state).merge(metrics.router());
    let rest = Arc::new(RestConnector::new(
        RestConnector::bind_addr_from_env(),
        router,
    ));

    // --- Supervisor: start order llm → pipeline → connector,
    //     shutdown in reverse with per-service timeouts. ---
    let supervisor = Supervisor::new(SupervisorConfig::from_env());
    supervisor.register(Arc::new(LlmService::new(llm)), Duration::from_secs(5));
    supervisor.register(
        Arc::new(PipelineService::new(pipeline)),
        Duration::from_secs(10),
    );
    supervisor.register_connector(
        Arc::new(ConnectorService::new(rest)),
        Duration::from_secs(10),
    );

    supervisor.run().await
}
