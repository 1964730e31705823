// src/services.rs
//
// ManagedService adapters: the supervisor speaks one lifecycle
// contract; these wrap the LLM handle, the learning pipeline, and any
// connector behind it.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::connector::Connector;
use crate::learning::LearningPipeline;
use crate::llm::LlmHandle;
use crate::supervisor::ManagedService;

pub struct LlmService {
    handle: Arc<dyn LlmHandle>,
}

impl LlmService {
    pub fn new(handle: Arc<dyn LlmHandle>) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl ManagedService for LlmService {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn start(&self) -> Result<()> {
        if self.handle.initialize().await {
            Ok(())
        } else {
            bail!("llm handle failed to initialize")
        }
    }

    async fn stop(&self, _timeout: Duration) -> Result<()> {
        self.handle.cleanup().await;
        Ok(())
    }

    async fn restart(&self) -> Result<()> {
        self.handle.cleanup().await;
        if self.handle.initialize().await {
            Ok(())
        } else {
            bail!("llm handle failed to re-initialize")
        }
    }

    fn healthy(&self) -> bool {
        self.handle.healthy()
    }
}

pub struct PipelineService {
    pipeline: Arc<LearningPipeline>,
}

impl PipelineService {
    pub fn new(pipeline: Arc<LearningPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl ManagedService for PipelineService {
    fn name(&self) -> &'static str {
        "learning-pipeline"
    }

    async fn start(&self) -> Result<()> {
        self.pipeline.start();
        Ok(())
    }

    async fn stop(&self, _timeout: Duration) -> Result<()> {
        self.pipeline.stop().await;
        Ok(())
    }

    async fn restart(&self) -> Result<()> {
        // The pipeline's queue and shutdown flag are single-use.
        bail!("learning pipeline does not support restart")
    }

    fn healthy(&self) -> bool {
        self.pipeline.healthy()
    }
}

pub struct ConnectorService {
    connector: Arc<dyn Connector>,
}

impl ConnectorService {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl ManagedService for ConnectorService {
    fn name(&self) -> &'static str {
        "connector"
    }

    async fn start(&self) -> Result<()> {
        if !self.connector.initialize().await {
            bail!("connector failed to initialize");
        }
        self.connector.start().await
    }

    async fn stop(&self, timeout: Duration) -> Result<()> {
        self.connector.stop(timeout).await
    }

    async fn restart(&self) -> Result<()> {
        self.connector.restart().await
    }

    fn healthy(&self) -> bool {
        self.connector.healthy()
    }

    fn running(&self) -> bool {
        self.connector.running()
    }
}
