// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// Redis connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis connection URL.  Overridden at runtime by `GROVE_REDIS_URL`.
    pub url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1/".into(),
        }
    }
}

impl StoreConfig {
    /// Effective connection URL: `GROVE_REDIS_URL` wins over the config file.
    pub fn effective_url(&self) -> String {
        std::env::var("GROVE_REDIS_URL").unwrap_or_else(|_| self.url.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Default model for new tasks.  Either a catalog short name (resolved
    /// through the `bedrock:converse:models` document) or a full model id /
    /// inference-profile ARN passed through verbatim.
    pub default_model: String,
    /// AWS region override (also honoured via AWS_DEFAULT_REGION / AWS_REGION).
    pub aws_region: Option<String>,
    /// Maximum tokens to request in a single completion
    pub max_tokens: u32,
    /// Sampling temperature (0.0–1.0)
    pub temperature: f32,
    /// Whole-request timeout for one Converse call, in seconds.  The Bedrock
    /// side holds the connection for the full generation, so this must cover
    /// the longest expected response.
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default_model: "sonnet45".into(),
            aws_region: None,
            max_tokens: 4096,
            temperature: 0.2,
            request_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Iteration budget for a task process when the launcher does not set one.
    pub max_iterations: u32,
    /// Wall-clock cap for one bash tool invocation, in seconds.
    pub bash_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_iterations: 250,
            bash_timeout_secs: 60,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_store_url_is_local_redis() {
        assert_eq!(StoreConfig::default().url, "redis://127.0.0.1/");
    }

    #[test]
    fn default_runtime_budget_is_250_iterations() {
        let r = RuntimeConfig::default();
        assert_eq!(r.max_iterations, 250);
        assert_eq!(r.bash_timeout_secs, 60);
    }

    #[test]
    fn config_deserializes_from_partial_yaml() {
        let cfg: Config = serde_yaml::from_str("model:\n  default_model: haiku45\n").unwrap();
        assert_eq!(cfg.model.default_model, "haiku45");
        // Untouched sections fall back to defaults.
        assert_eq!(cfg.runtime.max_iterations, 250);
        assert_eq!(cfg.store.url, "redis://127.0.0.1/");
    }

    #[test]
    fn config_round_trips_through_yaml() {
        let cfg = Config::default();
        let text = serde_yaml::to_string(&cfg).unwrap();
        let back: Config = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back.model.max_tokens, cfg.model.max_tokens);
        assert_eq!(back.store.url, cfg.store.url);
    }
}
