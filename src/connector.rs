//! # REST Connector
//! HTTP front-end for the assistant: chat, background learning
//! requests, and status queries. Implements the `Connector` lifecycle
//! contract so the supervisor can start, stop, and restart it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::learning::{LearningPipeline, Outcome};
use crate::llm::LlmHandle;

/// Chat/API front-end lifecycle contract.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn initialize(&self) -> bool;
    async fn start(&self) -> Result<()>;
    async fn stop(&self, timeout: Duration) -> Result<()>;
    async fn restart(&self) -> Result<()>;
    fn running(&self) -> bool;
    fn healthy(&self) -> bool;
}

const SYSTEM_PROMPT: &str = "You are a helpful, precise personal assistant. \
Answer concisely and use any provided learned context when it is relevant.";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<LearningPipeline>,
    pub llm: Arc<dyn LlmHandle>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/chat", post(chat))
        .route("/learn", post(learn))
        .route("/summary", get(summary))
        .route("/status", get(status))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Deserialize)]
struct ChatReq {
    message: String,
}

#[derive(serde::Deserialize)]
struct LearnReq {
    topic: String,
    #[serde(default)]
    sources: Option<Vec<String>>,
}

#[derive(serde::Serialize)]
struct LearnResp {
    accepted: bool,
}

#[derive(serde::Deserialize)]
struct SummaryQuery {
    topic: String,
}

async fn chat(State(state): State<AppState>, Json(body): Json<ChatReq>) -> impl IntoResponse {
    // Fold relevant learned knowledge into the prompt when we have it.
    let learned = state
        .pipeline
        .summary(&body.message)
        .filter(|r| r.outcome == Outcome::Learned && !r.key_points.is_empty())
        .map(|r| format!("Learned context:\n{}\n\n", r.key_points.join("\n")))
        .unwrap_or_default();

    let prompt = format!(
        "{SYSTEM_PROMPT}\n\n{learned}User: {}\nAssistant:",
        body.message
    );

    match state.llm.generate(&prompt).await {
        Ok(text) => (StatusCode::OK, Json(json!({ "response": text }))),
        Err(e) => {
            warn!(error = ?e, "chat generation failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "generation unavailable" })),
            )
        }
    }
}

async fn learn(State(state): State<AppState>, Json(body): Json<LearnReq>) -> impl IntoResponse {
    let accepted = state.pipeline.enqueue(&body.topic, body.sources);
    let code = if accepted {
        StatusCode::ACCEPTED
    } else {
        StatusCode::CONFLICT
    };
    (code, Json(LearnResp { accepted }))
}

async fn summary(
    State(state): State<AppState>,
    Query(q): Query<SummaryQuery>,
) -> impl IntoResponse {
    match state.pipeline.summary(&q.topic) {
        Some(result) => (StatusCode::OK, Json(json!(result))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "topic": q.topic, "status": "not yet known" })),
        ),
    }
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "active_topics": state.pipeline.active_topics(),
        "recent": state.pipeline.history_snapshot(20),
    }))
}

/// Axum-backed connector: `start` binds and serves, `stop` signals
/// graceful shutdown and joins the server task within the timeout.
pub struct RestConnector {
    addr: SocketAddr,
    router: Router,
    initialized: AtomicBool,
    server: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl RestConnector {
    pub fn new(addr: SocketAddr, router: Router) -> Self {
        Self {
            addr,
            router,
            initialized: AtomicBool::new(false),
            server: Mutex::new(None),
            shutdown_tx: Mutex::new(None),
        }
    }

    pub fn bind_addr_from_env() -> SocketAddr {
        std::env::var("CONNECTOR_BIND")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8000)))
    }
}

#[async_trait]
impl Connector for RestConnector {
    async fn initialize(&self) -> bool {
        self.initialized.store(true, Ordering::SeqCst);
        true
    }

    async fn start(&self) -> Result<()> {
        if self.running() {
            return Ok(());
        }

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("binding connector to {}", self.addr))?;
        let local = listener.local_addr().unwrap_or(self.addr);

        let (tx, mut rx) = watch::channel(false);
        let app = self.router.clone();
        let handle = tokio::spawn(async move {
            let shutdown = async move {
                let _ = rx.wait_for(|stop| *stop).await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(error = ?e, "connector server error");
            }
        });

        *self.server.lock().expect("server mutex poisoned") = Some(handle);
        *self.shutdown_tx.lock().expect("shutdown mutex poisoned") = Some(tx);
        info!(addr = %local, "rest connector listening");
        Ok(())
    }

    async fn stop(&self, timeout: Duration) -> Result<()> {
        if let Some(tx) = self
            .shutdown_tx
            .lock()
            .expect("shutdown mutex poisoned")
            .take()
        {
            let _ = tx.send(true);
        }
        let handle = self.server.lock().expect("server mutex poisoned").take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(timeout, &mut handle).await.is_err() {
                warn!("connector did not stop in time, aborting");
                handle.abort();
            }
        }
        info!("rest connector stopped");
        Ok(())
    }

    async fn restart(&self) -> Result<()> {
        self.stop(Duration::from_secs(5)).await?;
        self.start().await
    }

    fn running(&self) -> bool {
        self.server
            .lock()
            .expect("server mutex poisoned")
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    fn healthy(&self) -> bool {
        self.initialized.load(Ordering::SeqCst) && self.running()
    }
}
