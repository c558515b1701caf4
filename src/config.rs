use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::functions::{FunctionDeclaration, FunctionSource};

const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Read-only view of the client configuration.
///
/// Implementations must be side-effect free; the client snapshots the values
/// it needs once per run.
pub trait ClientConfiguration {
    fn api_base(&self) -> String;
    fn api_key(&self) -> String;
    fn model_name(&self) -> String;
    fn connect_timeout_secs(&self) -> u64;
    fn request_timeout_secs(&self) -> u64;

    /// Full chat-completions endpoint, derived from the base.
    fn api_url(&self) -> String {
        format!(
            "{}{}",
            self.api_base().trim_end_matches('/'),
            CHAT_COMPLETIONS_PATH
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API base, e.g. "https://api.openai.com".
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Bearer token. Usually supplied via environment instead.
    pub api_key: Option<String>,

    /// Default model (optional)
    pub model: Option<String>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Advertise declared functions and serialize function-call history.
    #[serde(default)]
    pub function_calling: bool,

    /// Send message content as typed parts with inline images.
    #[serde(default)]
    pub vision: bool,

    /// Sampling temperature in tenths (7 = 0.7).
    #[serde(default = "default_temperature_tenths")]
    pub temperature_tenths: u32,

    /// System prompt prepended to every request.
    pub system_prompt: Option<String>,

    /// Declared functions, offered to the model when function calling is on.
    #[serde(default)]
    pub functions: Vec<FunctionDeclaration>,
}

fn default_api_base() -> String {
    "https://api.openai.com".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    600
}

fn default_temperature_tenths() -> u32 {
    7
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: None,
            model: None,
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            function_calling: false,
            vision: false,
            temperature_tenths: default_temperature_tenths(),
            system_prompt: None,
            functions: Vec::new(),
        }
    }
}

impl Config {
    /// Load config if the file exists, otherwise return Ok(None).
    pub fn load_optional(path: impl AsRef<Path>) -> anyhow::Result<Option<Self>> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("failed to read config: {}", path.display()))
            }
        };

        let s = String::from_utf8(bytes).context("config is not valid UTF-8")?;
        let cfg: Config = toml::from_str(&s)
            .with_context(|| format!("failed to parse TOML: {}", path.display()))?;
        Ok(Some(cfg))
    }
}

impl ClientConfiguration for Config {
    fn api_base(&self) -> String {
        self.api_base.clone()
    }

    fn api_key(&self) -> String {
        self.api_key.clone().unwrap_or_default()
    }

    fn model_name(&self) -> String {
        self.model.clone().unwrap_or_default()
    }

    fn connect_timeout_secs(&self) -> u64 {
        self.connect_timeout_secs
    }

    fn request_timeout_secs(&self) -> u64 {
        self.request_timeout_secs
    }
}

impl FunctionSource for Config {
    fn declarations(&self) -> Vec<FunctionDeclaration> {
        self.functions.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_joins_base_and_chat_path() {
        let cfg = Config {
            api_base: "https://api.openai.com/".to_string(),
            ..Config::default()
        };
        assert_eq!(cfg.api_url(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn minimal_toml_fills_defaults() {
        let cfg: Config = toml::from_str(r#"model = "gpt-4""#).unwrap();
        assert_eq!(cfg.model_name(), "gpt-4");
        assert_eq!(cfg.connect_timeout_secs, 10);
        assert_eq!(cfg.temperature_tenths, 7);
        assert!(!cfg.function_calling);
        assert!(cfg.functions.is_empty());
    }

    #[test]
    fn functions_parse_from_config_tables() {
        let cfg: Config = toml::from_str(
            r#"
            function_calling = true

            [[functions]]
            name = "get_current_weather"
            description = "Get the current weather in a given location"

            [[functions.params]]
            name = "location"
            required = true
            "#,
        )
        .unwrap();

        let decls = cfg.declarations();
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].name, "get_current_weather");
    }
}
