use anyhow::Context;

use chatstream::client::{ChatClient, ModelDescriptor};
use chatstream::config::Config;
use chatstream::functions::FunctionSource;

/// Prompt used when the config file does not carry one.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Answer concisely and use Markdown code blocks for code.";

/// Assemble a client from config file values and environment overrides.
pub fn build_client(cfg: Option<&Config>, model_override: Option<String>) -> anyhow::Result<ChatClient> {
    let mut config = cfg.cloned().unwrap_or_default();

    if let Ok(key) = std::env::var("CHATSTREAM_API_KEY") {
        config.api_key = Some(key);
    }
    if let Some(model) = model_override {
        config.model = Some(model);
    }
    if config.model.is_none() {
        config.model = Some("gpt-4".to_string());
    }
    if config.api_key.as_deref().unwrap_or("").is_empty() {
        anyhow::bail!(
            "No API key found. Set CHATSTREAM_API_KEY or api_key in config.toml"
        );
    }

    let descriptor = ModelDescriptor::from_configuration(
        &config,
        config.function_calling,
        config.vision,
        config.temperature_tenths,
    );
    let system_prompt = config
        .system_prompt
        .clone()
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
    let functions = config.declarations();

    ChatClient::new(descriptor, system_prompt, functions).context("failed to build client")
}
