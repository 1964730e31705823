//! # LLM Handle
//! Provider abstraction for the language model the assistant answers
//! with, plus a TTL response cache so repeated prompts inside the
//! cache window cost nothing.
//!
//! The supervisor drives the lifecycle: `initialize` before traffic,
//! `cleanup` on shutdown, `healthy` in the monitor loop.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

use crate::cache::TtlCache;

/// Response cache TTL.
const RESPONSE_TTL: Duration = Duration::from_secs(3600);
/// Hard cap on a sanitized response.
const MAX_RESPONSE_CHARS: usize = 2000;

#[async_trait]
pub trait LlmHandle: Send + Sync {
    /// Prepare the model for traffic. `false` means the handle cannot
    /// serve and the supervisor should abort startup.
    async fn initialize(&self) -> bool;
    /// Generate a completion for a fully constructed prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;
    /// Release resources. The handle is unhealthy afterwards.
    async fn cleanup(&self);
    fn healthy(&self) -> bool;
    fn name(&self) -> &'static str;
}

/// Chat-completions client for an OpenAI-compatible endpoint.
/// Requires an API key; `initialize` fails without one.
pub struct HttpLlm {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    cache: TtlCache<String, String>,
    initialized: AtomicBool,
    shut_down: AtomicBool,
}

impl HttpLlm {
    /// `model_override`: pass Some("gpt-4o-mini") to override the
    /// `LLM_MODEL` env var and the built-in default.
    pub fn new(model_override: Option<&str>) -> Self {
        let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        let endpoint = std::env::var("LLM_ENDPOINT")
            .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string());
        let model = model_override
            .map(str::to_string)
            .or_else(|| std::env::var("LLM_MODEL").ok())
            .unwrap_or_else(|| "gpt-4o-mini".to_string());
        let http = reqwest::Client::builder()
            .user_agent(concat!(
                "assistant-orchestrator/",
                env!("CARGO_PKG_VERSION")
            ))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            model,
            endpoint,
            cache: TtlCache::new(RESPONSE_TTL),
            initialized: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        }
    }

    async fn fetch_completion(&self, prompt: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let req = Req {
            model: &self.model,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
            temperature: 0.7,
            max_tokens: 512,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await?;

        if !resp.status().is_success() {
            bail!("llm endpoint returned HTTP {}", resp.status());
        }
        let body: Resp = resp.json().await?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or("");
        let cleaned = sanitize_response(content);
        if cleaned.is_empty() {
            bail!("llm returned an empty completion");
        }
        Ok(cleaned)
    }
}

#[async_trait]
impl LlmHandle for HttpLlm {
    async fn initialize(&self) -> bool {
        if self.shut_down.load(Ordering::SeqCst) {
            return false;
        }
        if self.api_key.is_empty() {
            warn!("no LLM API key configured");
            return false;
        }
        self.initialized.store(true, Ordering::SeqCst);
        info!(model = %self.model, "llm handle initialized");
        true
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        if !self.healthy() {
            return Err(anyhow!("llm handle is not initialized"));
        }

        let key = prompt_digest(prompt);
        if let Some(hit) = self.cache.get(&key) {
            counter!("llm_cache_hits_total").increment(1);
            return Ok(hit);
        }

        counter!("llm_requests_total").increment(1);
        let fresh = self.fetch_completion(prompt).await?;
        self.cache.put(key, fresh.clone());
        Ok(fresh)
    }

    async fn cleanup(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        self.initialized.store(false, Ordering::SeqCst);
        self.cache.clear();
        info!("llm handle cleaned up");
    }

    fn healthy(&self) -> bool {
        self.initialized.load(Ordering::SeqCst) && !self.shut_down.load(Ordering::SeqCst)
    }

    fn name(&self) -> &'static str {
        "http-llm"
    }
}

/// No-op handle used when no API key is configured. Always healthy
/// until cleaned up; every generation returns a fixed notice.
pub struct DisabledLlm {
    shut_down: AtomicBool,
}

impl DisabledLlm {
    pub fn new() -> Self {
        Self {
            shut_down: AtomicBool::new(false),
        }
    }
}

impl Default for DisabledLlm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmHandle for DisabledLlm {
    async fn initialize(&self) -> bool {
        !self.shut_down.load(Ordering::SeqCst)
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        Ok("The language model is not configured on this instance.".to_string())
    }

    async fn cleanup(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }

    fn healthy(&self) -> bool {
        !self.shut_down.load(Ordering::SeqCst)
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

fn prompt_digest(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Collapse whitespace runs, trim, and cap the length. Keeps the text
/// single-spaced but preserves non-ASCII content.
pub(crate) fn sanitize_response(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(MAX_RESPONSE_CHARS));
    let mut chars = 0usize;
    let mut prev_space = false;
    for ch in input.chars() {
        let c = match ch {
            '\r' | '\n' | '\t' => ' ',
            c => c,
        };
        if c == ' ' {
            if !prev_space && !out.is_empty() {
                out.push(' ');
                chars += 1;
            }
            prev_space = true;
        } else {
            out.push(c);
            chars += 1;
            prev_space = false;
        }
        if chars >= MAX_RESPONSE_CHARS {
            break;
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_collapses_whitespace_and_trims() {
        assert_eq!(
            sanitize_response("  Hello\n\n  world\t again  "),
            "Hello world again"
        );
    }

    #[test]
    fn sanitize_caps_length() {
        let long = "word ".repeat(1000);
        assert!(sanitize_response(&long).chars().count() <= MAX_RESPONSE_CHARS);
    }

    #[test]
    fn digest_is_stable_and_distinct() {
        assert_eq!(prompt_digest("a"), prompt_digest("a"));
        assert_ne!(prompt_digest("a"), prompt_digest("b"));
    }

    #[tokio::test]
    async fn http_llm_without_key_refuses_to_initialize() {
        let llm = HttpLlm {
            http: reqwest::Client::new(),
            api_key: String::new(),
            model: "m".into(),
            endpoint: "http://localhost:1/v1".into(),
            cache: TtlCache::new(RESPONSE_TTL),
            initialized: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        };
        assert!(!llm.initialize().await);
        assert!(!llm.healthy());
        assert!(llm.generate("hi").await.is_err());
    }

    #[tokio::test]
    async fn disabled_llm_lifecycle() {
        let llm = DisabledLlm::new();
        assert!(llm.initialize().await);
        assert!(llm.healthy());
        assert!(llm.generate("hi").await.is_ok());
        llm.cleanup().await;
        assert!(!llm.healthy());
        assert!(!llm.initialize().await);
    }
}
