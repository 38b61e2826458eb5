//! completion failures and the sentence each one turns into.
//!
//! nothing here is fatal: every failure ends up as an assistant message
//! in the conversation (see `dispatch::resolve`).

use thiserror::Error;

/// prefix shared by every user-facing failure sentence.
pub const APOLOGY: &str = "Sorry, I encountered an error. ";

/// closed set of failure kinds the chat view knows how to explain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    MissingCredential,
    Unauthorized,
    Forbidden,
    RateLimited,
    Other,
}

impl ErrorCategory {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            429 => Self::RateLimited,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    #[error("API key not found. Set {0} and restart.")]
    MissingCredential(&'static str),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed completion response: {0}")]
    Malformed(String),
}

impl CompletionError {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status { status, body: body.into() }
    }

    /// lift a provider's error text into a structured error.
    ///
    /// the `llm` client binding only reports failures as text, so the http
    /// status is recovered once here (first 4xx/5xx token) instead of being
    /// string-matched at every call site.
    pub fn from_provider_message(message: impl Into<String>) -> Self {
        let message = message.into();
        match status_in_text(&message) {
            Some(status) => Self::Status { status, body: message },
            None => Self::Transport(message),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingCredential(_) => ErrorCategory::MissingCredential,
            Self::Status { status, .. } => ErrorCategory::from_status(*status),
            Self::Transport(_) | Self::Malformed(_) => ErrorCategory::Other,
        }
    }

    /// the assistant-origin sentence shown in the conversation.
    pub fn user_message(&self) -> String {
        let detail = match self.category() {
            ErrorCategory::MissingCredential => {
                "Please check your API key configuration.".to_string()
            }
            ErrorCategory::Unauthorized => {
                "Invalid API key. Please check your OpenRouter API key.".to_string()
            }
            ErrorCategory::Forbidden => {
                "Access denied. Please check your OpenRouter account and billing.".to_string()
            }
            ErrorCategory::RateLimited => "Rate limit exceeded. Please try again later.".to_string(),
            ErrorCategory::Other => format!("Error: {self}"),
        };
        format!("{APOLOGY}{detail}")
    }
}

/// first standalone three-digit token in the 400..=599 range.
fn status_in_text(text: &str) -> Option<u16> {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|tok| tok.len() == 3)
        .filter_map(|tok| tok.parse::<u16>().ok())
        .find(|code| (400..=599).contains(code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn status_codes_map_to_categories() {
        assert_eq!(CompletionError::status(401, "").category(), ErrorCategory::Unauthorized);
        assert_eq!(CompletionError::status(403, "").category(), ErrorCategory::Forbidden);
        assert_eq!(CompletionError::status(429, "").category(), ErrorCategory::RateLimited);
        assert_eq!(CompletionError::status(500, "").category(), ErrorCategory::Other);
        assert_eq!(
            CompletionError::MissingCredential("OPENROUTER_API_KEY").category(),
            ErrorCategory::MissingCredential
        );
    }

    #[test]
    fn rate_limit_sentence_is_specific() {
        let msg = CompletionError::status(429, "slow down").user_message();
        assert_eq!(msg, "Sorry, I encountered an error. Rate limit exceeded. Please try again later.");
        assert!(!msg.contains("Error: "));
    }

    #[test]
    fn uncategorized_failures_embed_the_raw_error() {
        let msg = CompletionError::Transport("connection reset".into()).user_message();
        assert_eq!(msg, "Sorry, I encountered an error. Error: transport error: connection reset");

        let msg = CompletionError::status(502, "bad gateway").user_message();
        assert!(msg.ends_with("Error: HTTP 502: bad gateway"), "{msg}");
    }

    #[test]
    fn provider_text_is_parsed_once() {
        let e = CompletionError::from_provider_message("OpenAI API returned error status: 429 Too Many Requests");
        assert_eq!(e.category(), ErrorCategory::RateLimited);

        let e = CompletionError::from_provider_message("HTTP 403: key has no credits");
        assert_eq!(e.category(), ErrorCategory::Forbidden);

        // digits that are not a standalone status do not count
        let e = CompletionError::from_provider_message("request id 14290 failed");
        assert_eq!(e, CompletionError::Transport("request id 14290 failed".into()));
    }
}
