//! outbound completion calls.
//!
//! two transports with the same contract:
//! - [`LlmTransport`]: goes through the `llm` crate's openai-compatible provider.
//! - [`HttpTransport`]: posts the json body itself (`ureq` on native, `gloo-net` on wasm),
//!   so it can send the gateway's identifying headers.
//!
//! both take a fully built [`CompletionRequest`] and hand back the first
//! choice's text. anything else is a [`CompletionError`].

use async_trait::async_trait;
use bevy::prelude::*;
use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::{ChatMessage, ChatProvider};
use llm::error::LLMError;
use serde::{Deserialize, Serialize};

use crate::config::{API_KEY_VAR, DeepBotConfig};
use crate::error::CompletionError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

impl WireMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self { role: role.to_string(), content: content.into() }
    }
}

/// openai-style `chat/completions` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// turn a raw http outcome into reply text: non-2xx keeps the body for the
/// error, 2xx must carry `choices[0].message.content`.
pub fn parse_completion(status: u16, body: &str) -> Result<String, CompletionError> {
    if !(200..300).contains(&status) {
        return Err(CompletionError::status(status, body));
    }
    let parsed: CompletionResponse =
        serde_json::from_str(body).map_err(|e| CompletionError::Malformed(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| CompletionError::Malformed("no choices[0].message.content".into()))
}

/// the capability the dispatcher is parameterized over.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait CompletionTransport: Send + Sync {
    /// short name for logs.
    fn name(&self) -> &'static str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

fn require_key(key: &Option<String>) -> Result<&str, CompletionError> {
    key.as_deref()
        .filter(|k| !k.is_empty())
        .ok_or(CompletionError::MissingCredential(API_KEY_VAR))
}

// ---------------------- raw http ----------------------

#[derive(Clone)]
pub struct HttpTransport {
    url: String,
    api_key: Option<String>,
    referer: String,
    title: String,
    #[cfg(not(target_arch = "wasm32"))]
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn from_config(cfg: &DeepBotConfig) -> Self {
        Self {
            url: cfg.completions_url(),
            api_key: cfg.api_key.clone(),
            referer: cfg.referer.clone(),
            title: cfg.title.clone(),
            // non-2xx must come back as a response so its body can be read
            #[cfg(not(target_arch = "wasm32"))]
            agent: ureq::Agent::config_builder()
                .http_status_as_error(false)
                .build()
                .into(),
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[async_trait]
impl CompletionTransport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let key = require_key(&self.api_key)?.to_string();
        let this = self.clone();
        let body = request.clone();
        debug!(target: "deepbot", "http POST {} msgs={}", this.url, body.messages.len());

        // ureq blocks; keep it off the async workers
        tokio::task::spawn_blocking(move || {
            let res = this
                .agent
                .post(&this.url)
                .header("authorization", &format!("Bearer {key}"))
                .header("content-type", "application/json")
                .header("http-referer", &this.referer)
                .header("x-title", &this.title)
                .send_json(&body)
                .map_err(|e| CompletionError::Transport(e.to_string()))?;
            let status = res.status().as_u16();
            let text = res
                .into_body()
                .read_to_string()
                .map_err(|e| CompletionError::Transport(e.to_string()))?;
            debug!(target: "deepbot", "http status={} body_len={}", status, text.len());
            parse_completion(status, &text)
        })
        .await
        .map_err(|e| CompletionError::Transport(e.to_string()))?
    }
}

#[cfg(target_arch = "wasm32")]
#[async_trait(?Send)]
impl CompletionTransport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        use gloo_net::http::Request;

        let key = require_key(&self.api_key)?;
        let resp = Request::post(&self.url)
            .header("authorization", &format!("Bearer {key}"))
            .header("content-type", "application/json")
            .header("http-referer", &self.referer)
            .header("x-title", &self.title)
            .json(request)
            .map_err(|e| CompletionError::Transport(e.to_string()))?
            .send()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| CompletionError::Transport(e.to_string()))?;
        parse_completion(status, &text)
    }
}

// ---------------------- llm client binding ----------------------

/// openai-compatible provider from the `llm` crate. a provider is built per
/// call so model and sampling settings always follow the request.
#[derive(Clone)]
pub struct LlmTransport {
    base_url: String,
    api_key: Option<String>,
}

impl LlmTransport {
    pub fn from_config(cfg: &DeepBotConfig) -> Self {
        // the provider resolves endpoints relative to the base, which needs a trailing slash
        let base_url = format!("{}/", cfg.base_url.trim_end_matches('/'));
        Self { base_url, api_key: cfg.api_key.clone() }
    }

    fn to_chat_messages(request: &CompletionRequest) -> (Option<String>, Vec<ChatMessage>) {
        let mut system = None;
        let mut out = Vec::with_capacity(request.messages.len());
        for m in &request.messages {
            match m.role.as_str() {
                "system" => system = Some(m.content.clone()),
                "assistant" => out.push(ChatMessage::assistant().content(m.content.clone()).build()),
                _ => out.push(ChatMessage::user().content(m.content.clone()).build()),
            }
        }
        (system, out)
    }
}

fn lift_llm_error(err: LLMError) -> CompletionError {
    match err {
        LLMError::AuthError(msg) => CompletionError::status(401, msg),
        other => CompletionError::from_provider_message(other.to_string()),
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl CompletionTransport for LlmTransport {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let key = require_key(&self.api_key)?;
        let (system, messages) = Self::to_chat_messages(request);

        let mut b = LLMBuilder::new()
            .backend(LLMBackend::OpenAI)
            .base_url(self.base_url.clone())
            .api_key(key.to_string())
            .model(request.model.clone())
            .max_tokens(request.max_tokens);
        if let Some(t) = request.temperature {
            b = b.temperature(t);
        }
        if let Some(s) = system {
            b = b.system(s);
        }
        let provider = b.build().map_err(lift_llm_error)?;

        let resp = provider.chat(&messages).await.map_err(lift_llm_error)?;
        resp.text()
            .ok_or_else(|| CompletionError::Malformed("provider returned no text".into()))
    }
}
