//! Server configuration, sourced from the environment at startup.

use std::path::PathBuf;

/// Runtime configuration for the HTTP server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Port to listen on. Use 0 for an OS-assigned port.
    pub port: u16,
    /// Root directory of the markdown vault.
    pub vault_path: PathBuf,
    /// Model name advertised on the wire and used as the default
    /// in responses when the request omits one.
    pub model_name: String,
    /// Base URL of the upstream chat completions API.
    pub upstream_base_url: String,
    /// Bearer token for the upstream API, if it requires one.
    pub upstream_api_key: Option<String>,
    /// Model identifier sent to the upstream API.
    pub upstream_model: String,
    /// Maximum model turns per run before the run is aborted.
    pub max_turns: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            vault_path: PathBuf::from("."),
            model_name: "jasque".to_string(),
            upstream_base_url: "https://api.openai.com/v1".to_string(),
            upstream_api_key: None,
            upstream_model: "gpt-4o-mini".to_string(),
            max_turns: 25,
        }
    }
}

impl ServerConfig {
    /// Build a config from `JASQUE_*` environment variables, falling
    /// back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_parsed("JASQUE_PORT").unwrap_or(defaults.port),
            vault_path: std::env::var("JASQUE_VAULT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.vault_path),
            model_name: std::env::var("JASQUE_MODEL").unwrap_or(defaults.model_name),
            upstream_base_url: std::env::var("JASQUE_UPSTREAM_URL")
                .unwrap_or(defaults.upstream_base_url),
            upstream_api_key: std::env::var("JASQUE_UPSTREAM_API_KEY").ok(),
            upstream_model: std::env::var("JASQUE_UPSTREAM_MODEL")
                .unwrap_or(defaults.upstream_model),
            max_turns: env_parsed("JASQUE_MAX_TURNS").unwrap_or(defaults.max_turns),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
