// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod cache;
pub mod connector;
pub mod learning;
pub mod llm;
pub mod metrics;
pub mod services;
pub mod supervisor;

// ---- Re-exports for stable public API ----
pub use crate::cache::TtlCache;
pub use crate::connector::{Connector, RestConnector};
pub use crate::learning::{
    LearningConfig, LearningPipeline, LearningResult, Outcome, SourceScorer, TrustConfig,
    TrustTier, WorkerContext,
};
pub use crate::llm::{DisabledLlm, HttpLlm, LlmHandle};
pub use crate::services::{ConnectorService, LlmService, PipelineService};
pub use crate::supervisor::{ManagedService, Supervisor, SupervisorConfig, SupervisorState};
