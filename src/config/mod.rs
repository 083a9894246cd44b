//! Application configuration
//!
//! Defaults, then an optional TOML file (`LEARNOMATIC_CONFIG`), then individual
//! environment variables on top.

pub mod file;
pub mod prompts;

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::completion::OpenAICompatConfig;
use crate::core::ProjectLimits;

pub use file::{ConfigError, ServerConfig, SessionConfig};
pub use prompts::PromptManager;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: OpenAICompatConfig,
    pub session: SessionConfig,
    pub project: ProjectLimits,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match env::var("LEARNOMATIC_CONFIG") {
            Ok(path) => {
                tracing::info!("Loading configuration from {}", path);
                Self::from_file(Path::new(&path))?
            }
            Err(_) => Self::default(),
        };

        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from environment-style lookups.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = parse_var("PORT", &port)?;
        }
        if let Some(dir) = lookup("LEARNOMATIC_DATA_DIR") {
            self.server.data_dir = PathBuf::from(dir);
        }
        if let Some(base_url) = lookup("LEARNOMATIC_API_BASE") {
            self.llm.base_url = base_url;
        }
        if let Some(model) = lookup("LEARNOMATIC_MODEL") {
            self.llm.model = model;
        }
        if let Some(var) = lookup("LEARNOMATIC_API_KEY_ENV") {
            self.session.api_key_env = var;
        }
        if let Some(window) = lookup("LEARNOMATIC_HISTORY_WINDOW") {
            self.session.history_window = parse_var("LEARNOMATIC_HISTORY_WINDOW", &window)?;
        }
        if let Some(dir) = lookup("LEARNOMATIC_PROMPTS_DIR") {
            self.session.prompts_dir = Some(PathBuf::from(dir));
        }
        if let Some(roots) = lookup("LEARNOMATIC_PROJECT_ROOTS") {
            self.project.allowed_roots = env::split_paths(&roots)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.base_url.trim().is_empty() {
            return Err(ConfigError::Validation("llm.base_url must not be empty".into()));
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::Validation("llm.model must not be empty".into()));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Validation(format!(
                "llm.temperature must be between 0 and 2, got {}",
                self.llm.temperature
            )));
        }
        if self.llm.max_tokens == 0 {
            return Err(ConfigError::Validation("llm.max_tokens must be positive".into()));
        }
        if self.project.max_files == 0 {
            return Err(ConfigError::Validation("project.max_files must be positive".into()));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Validation(format!("{} has an invalid value: {}", name, value)))
}
