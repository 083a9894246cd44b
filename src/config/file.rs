//! TOML configuration file
//!
//! Every section is optional; missing keys fall back to defaults.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 3000
//! data_dir = "./data"
//!
//! [llm]
//! base_url = "https://api.groq.com/openai/v1"
//! model = "llama-3.3-70b-versatile"
//!
//! [session]
//! history_window = 40
//! simulate_delay_ms = 1000
//! api_key_env = "GROQ_API_KEY"
//!
//! [project]
//! allowed_roots = ["/home/me/code"]
//! max_files = 50
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::Config;

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}

/// HTTP listener and storage location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// Directory holding the saved-results database
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            data_dir: PathBuf::from("./data"),
        }
    }
}

/// Chat session behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Prior messages sent with each completion; 0 sends the whole log
    pub history_window: usize,

    /// Pause before a simulated snippet run reports its output
    pub simulate_delay_ms: u64,

    /// Environment variable consulted when no API key has been set
    pub api_key_env: String,

    /// Directory of TOML prompt templates overriding the builtin ones
    pub prompts_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_window: 40,
            simulate_delay_ms: 1000,
            api_key_env: "OPENAI_API_KEY".to_string(),
            prompts_dir: None,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}
