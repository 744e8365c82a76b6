//! CLI configuration.

use anyhow::Result;
use kbchat_core::WatchdogConfig;
use kbchat_types::LlmConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the kbchat server
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Number of prior exchanges sent as context with each question
    #[serde(default = "default_context_length")]
    pub context_length: usize,
    /// Idle seconds before a stall warning; 0 disables the warning
    #[serde(default = "default_warning_timeout")]
    pub warning_timeout_secs: u64,
    /// Idle seconds before a stalled stream is abandoned
    #[serde(default = "default_abort_timeout")]
    pub abort_timeout_secs: u64,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_server_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_api_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_context_length() -> usize {
    10
}

fn default_warning_timeout() -> u64 {
    5 * 60
}

fn default_abort_timeout() -> u64 {
    20 * 60
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kbchat")
        .join("conversations.db")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            api_key: String::new(),
            api_base_url: default_api_base_url(),
            model: default_model(),
            context_length: default_context_length(),
            warning_timeout_secs: default_warning_timeout(),
            abort_timeout_secs: default_abort_timeout(),
            db_path: default_db_path(),
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load config from the default location or fall back to defaults.
    pub fn load() -> Result<Self> {
        let config_path = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kbchat")
            .join("config.toml");
        if config_path.exists() {
            return Self::load_from(&config_path);
        }

        Ok(Config::default())
    }

    /// LLM settings forwarded with each request.
    pub fn llm(&self) -> LlmConfig {
        LlmConfig {
            api_key: self.api_key.clone(),
            api_base_url: self.api_base_url.clone(),
            model: self.model.clone(),
        }
    }

    /// Stall thresholds for the stream watchdog.
    pub fn watchdog(&self) -> WatchdogConfig {
        WatchdogConfig {
            warning: (self.warning_timeout_secs > 0)
                .then(|| Duration::from_secs(self.warning_timeout_secs)),
            abort: Duration::from_secs(self.abort_timeout_secs),
            poll_interval: Duration::from_secs(1),
        }
    }
}
