//! debug page support: credential presence check and a one-shot probe call.

use std::fmt;

use crate::config::{ChatSettings, DeepBotConfig};
use crate::error::CompletionError;
use crate::transport::{CompletionRequest, CompletionTransport, WireMessage};

pub const PROBE_PROMPT: &str = "Say 'Hello, test successful!'";
const PROBE_MAX_TOKENS: u32 = 50;
/// characters of the key shown before masking.
const VISIBLE_PREFIX: usize = 6;

/// what the debug page may show about the credential. the key itself is
/// never kept here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialReport {
    pub present: bool,
    pub length: usize,
    pub masked_prefix: String,
}

impl CredentialReport {
    pub fn from_config(cfg: &DeepBotConfig) -> Self {
        match cfg.api_key.as_deref() {
            Some(key) if !key.is_empty() => Self {
                present: true,
                length: key.chars().count(),
                masked_prefix: format!("{}...", key.chars().take(VISIBLE_PREFIX).collect::<String>()),
            },
            _ => Self { present: false, length: 0, masked_prefix: "None".to_string() },
        }
    }
}

impl fmt::Display for CredentialReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "API Key Exists: {}", if self.present { "Yes" } else { "No" })?;
        writeln!(f, "API Key Length: {}", self.length)?;
        write!(f, "API Key Prefix: {}", self.masked_prefix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success(String),
    Failure(CompletionError),
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Success(text) => write!(f, "✅ SUCCESS: {text}"),
            ProbeOutcome::Failure(err) => write!(f, "❌ ERROR: {err}"),
        }
    }
}

/// single user message, no system prompt, no history.
pub fn probe_request(settings: &ChatSettings) -> CompletionRequest {
    CompletionRequest {
        model: settings.model.clone(),
        messages: vec![WireMessage::new("user", PROBE_PROMPT)],
        max_tokens: PROBE_MAX_TOKENS,
        temperature: None,
    }
}

pub async fn probe<T>(transport: &T, settings: &ChatSettings) -> ProbeOutcome
where
    T: CompletionTransport + ?Sized,
{
    match transport.complete(&probe_request(settings)).await {
        Ok(text) => ProbeOutcome::Success(text),
        Err(err) => ProbeOutcome::Failure(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::tests::FakeTransport;
    use pretty_assertions::assert_eq;

    #[test]
    fn report_masks_the_key() {
        let cfg = DeepBotConfig::default().with_api_key("sk-or-v1-abcdef0123456789");
        let r = CredentialReport::from_config(&cfg);
        assert!(r.present);
        assert_eq!(r.length, 25);
        assert_eq!(r.masked_prefix, "sk-or-...");
        assert!(!r.to_string().contains("abcdef"));
    }

    #[test]
    fn report_without_key() {
        let r = CredentialReport::from_config(&DeepBotConfig::default());
        assert_eq!(r, CredentialReport { present: false, length: 0, masked_prefix: "None".into() });
        assert!(r.to_string().starts_with("API Key Exists: No"));
    }

    #[tokio::test]
    async fn probe_reports_success_text() {
        let fake = FakeTransport::ok("Hello, test successful!");
        let out = probe(&fake, &ChatSettings::default()).await;
        assert_eq!(out.to_string(), "✅ SUCCESS: Hello, test successful!");

        let sent = fake.seen.lock().unwrap();
        assert_eq!(sent[0].messages, vec![WireMessage::new("user", PROBE_PROMPT)]);
        assert_eq!(sent[0].max_tokens, 50);
    }

    #[tokio::test]
    async fn probe_reports_failure() {
        let fake = FakeTransport::failing(401, "bad key");
        let out = probe(&fake, &ChatSettings::default()).await;
        assert_eq!(out.to_string(), "❌ ERROR: HTTP 401: bad key");
    }
}
