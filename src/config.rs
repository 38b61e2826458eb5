//! runtime configuration: gateway location, credential, request shape.
//!
//! nothing secret lives in source. the credential comes from the process
//! environment on native and from `localStorage` on wasm; its absence is
//! reported later as a chat message, not here.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const API_KEY_VAR: &str = "OPENROUTER_API_KEY";
pub const BASE_URL_VAR: &str = "DEEPBOT_BASE_URL";
pub const MODEL_VAR: &str = "DEEPBOT_MODEL";
pub const REFERER_VAR: &str = "DEEPBOT_REFERER";
/// path to a json file whose fields replace the defaults (native only).
pub const CONFIG_PATH_VAR: &str = "DEEPBOT_CONFIG";

/// `localStorage` key holding the credential in the browser build.
pub const API_KEY_STORAGE_KEY: &str = "deepbot.api_key";

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "deepseek/deepseek-chat-v3-0324:free";
pub const DEFAULT_REFERER: &str = "http://localhost:5173";
pub const DEFAULT_TITLE: &str = "DeepBot";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are DeepBot, an AI knowledge assistant. You help users with information retrieval, document analysis, and knowledge discovery. Be helpful, concise, and informative.";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config field `{0}` must not be empty")]
    Empty(&'static str),
    #[error("temperature {0} outside 0.0..=2.0")]
    Temperature(f32),
}

/// the parts of the config that shape a completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub model: String,
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tokens: 1000,
            temperature: Some(0.7),
        }
    }
}

#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeepBotConfig {
    pub base_url: String,
    /// never serialized back out.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub referer: String,
    pub title: String,
    pub chat: ChatSettings,
}

impl Default for DeepBotConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            referer: DEFAULT_REFERER.to_string(),
            title: DEFAULT_TITLE.to_string(),
            chat: ChatSettings::default(),
        }
    }
}

impl DeepBotConfig {
    /// defaults, then the `DEEPBOT_CONFIG` file, then single env vars.
    /// the credential only ever comes from the environment.
    pub fn from_env() -> Self {
        #[cfg(not(target_arch = "wasm32"))]
        let mut cfg = Self::file_or_default(std::env::var(CONFIG_PATH_VAR).ok().as_deref());
        #[cfg(target_arch = "wasm32")]
        let mut cfg = Self::default();
        #[cfg(not(target_arch = "wasm32"))]
        {
            if let Ok(v) = std::env::var(BASE_URL_VAR) {
                cfg.base_url = v;
            }
            if let Ok(v) = std::env::var(MODEL_VAR) {
                cfg.chat.model = v;
            }
            if let Ok(v) = std::env::var(REFERER_VAR) {
                cfg.referer = v;
            }
            cfg.api_key = std::env::var(API_KEY_VAR).ok();
        }
        #[cfg(target_arch = "wasm32")]
        {
            cfg.api_key = web_sys::window()
                .and_then(|w| w.local_storage().ok().flatten())
                .and_then(|s| s.get_item(API_KEY_STORAGE_KEY).ok().flatten());
        }
        cfg.api_key = cfg.api_key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty());
        info!(
            target: "deepbot",
            "config: base_url='{}', model='{}', key_present={}",
            cfg.base_url, cfg.chat.model, cfg.api_key.is_some()
        );
        cfg
    }

    /// parse a json override; absent fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// a broken override file is logged and skipped, never fatal.
    #[cfg(not(target_arch = "wasm32"))]
    fn file_or_default(path: Option<&str>) -> Self {
        let Some(path) = path.map(str::trim).filter(|p| !p.is_empty()) else {
            return Self::default();
        };
        match Self::from_file(path) {
            Ok(mut cfg) => {
                info!(target: "deepbot", "config: loaded overrides from '{}'", path);
                cfg.api_key = None;
                cfg
            }
            Err(e) => {
                warn!(target: "deepbot", "config: ignoring '{}': {}", path, e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Empty("base_url"));
        }
        if self.chat.model.trim().is_empty() {
            return Err(ConfigError::Empty("chat.model"));
        }
        if let Some(t) = self.chat.temperature
            && !(0.0..=2.0).contains(&t)
        {
            return Err(ConfigError::Temperature(t));
        }
        Ok(())
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// `{base}/chat/completions`, tolerant of a trailing slash on the base.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn json_override_keeps_defaults() {
        let cfg = DeepBotConfig::from_json(r#"{ "chat": { "model": "x/y", "temperature": null } }"#)
            .expect("valid config");
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.chat.model, "x/y");
        assert_eq!(cfg.chat.temperature, None);
        assert_eq!(cfg.chat.max_tokens, 1000);
        assert_eq!(cfg.api_key, None);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            DeepBotConfig::from_json(r#"{ "base_url": " " }"#),
            Err(ConfigError::Empty("base_url"))
        ));
        let mut cfg = DeepBotConfig::default();
        cfg.chat.temperature = Some(3.5);
        assert!(matches!(cfg.validate(), Err(ConfigError::Temperature(_))));
        assert!(matches!(DeepBotConfig::from_json("{"), Err(ConfigError::Json(_))));
    }

    #[test]
    fn config_file_replaces_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{ "base_url": "http://localhost:9000/v1", "api_key": "sk-from-file", "chat": {{ "max_tokens": 64 }} }}"#
        )
        .expect("write");

        let path = file.path().to_str().expect("utf-8 path");
        let cfg = DeepBotConfig::file_or_default(Some(path));
        assert_eq!(cfg.base_url, "http://localhost:9000/v1");
        assert_eq!(cfg.chat.max_tokens, 64);
        assert_eq!(cfg.chat.model, DEFAULT_MODEL);
        // credentials are env-only
        assert_eq!(cfg.api_key, None);
    }

    #[test]
    fn broken_config_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{ "chat": {{ "temperature": 9.0 }} }}"#).expect("write");
        let path = file.path().to_str().expect("utf-8 path");
        assert!(matches!(DeepBotConfig::from_file(path), Err(ConfigError::Temperature(_))));
        assert_eq!(DeepBotConfig::file_or_default(Some(path)), DeepBotConfig::default());

        let missing = file.path().with_extension("missing");
        assert!(matches!(DeepBotConfig::from_file(&missing), Err(ConfigError::Io(_))));
        assert_eq!(DeepBotConfig::file_or_default(missing.to_str()), DeepBotConfig::default());
        assert_eq!(DeepBotConfig::file_or_default(Some("  ")), DeepBotConfig::default());
        assert_eq!(DeepBotConfig::file_or_default(None), DeepBotConfig::default());
    }

    #[test]
    fn api_key_is_not_serialized() {
        let cfg = DeepBotConfig::default().with_api_key("sk-test");
        let json = serde_json::to_string(&cfg).expect("serialize");
        assert!(!json.contains("sk-test"));
    }

    #[test]
    fn completions_url_joins_cleanly() {
        let mut cfg = DeepBotConfig::default();
        assert_eq!(cfg.completions_url(), "https://openrouter.ai/api/v1/chat/completions");
        cfg.base_url = "http://localhost:8080/v1/".into();
        assert_eq!(cfg.completions_url(), "http://localhost:8080/v1/chat/completions");
    }
}
