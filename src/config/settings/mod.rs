#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

pub const ENDPOINT_ENV: &str = "AZURE_OPENAI_ENDPOINT";
pub const API_VERSION_ENV: &str = "OPENAI_API_VERSION";
pub const DEFAULT_API_KEY_ENV: &str = "AZURE_OPENAI_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Which URL scheme and auth header the chat/embedding service expects
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApiFlavor {
    #[default]
    Azure,
    OpenAi,
}

impl fmt::Display for ApiFlavor {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Azure => f.write_str("azure"),
            Self::OpenAi => f.write_str("openai"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub flavor: ApiFlavor,
    pub endpoint: String,
    pub api_version: String,
    pub embedding_model: String,
    pub chat_model: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub timeout_seconds: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            flavor: ApiFlavor::Azure,
            endpoint: "https://your-resource.openai.azure.com".to_string(),
            api_version: "2024-06-01".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            chat_model: "RPA-Test-Nano".to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatasetConfig {
    pub path: PathBuf,
    pub sheet: Option<String>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("process info ai.xlsx"),
            sheet: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub max_neighbors: usize,
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_neighbors: 5,
            top_k: 5,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid API version: {0} (cannot be empty for azure endpoints)")]
    InvalidApiVersion(String),
    #[error("Invalid API key variable: {0} (cannot be empty)")]
    InvalidApiKeyEnv(String),
    #[error("Invalid timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid dataset path (cannot be empty)")]
    InvalidDatasetPath,
    #[error("Invalid max neighbors: {0} (must be between 1 and 100)")]
    InvalidMaxNeighbors(usize),
    #[error("Invalid top_k: {0} (must be between 1 and max_neighbors = {1})")]
    InvalidTopK(usize, usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default configuration directory, `~/.table-rag`
    #[inline]
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".table-rag"))
            .or_else(|| dirs::data_dir().map(|data| data.join("table-rag")))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load `config.toml` from `config_dir`, falling back to defaults when the file is absent.
    ///
    /// Environment overrides are applied after parsing and before validation.
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;

            toml::from_str::<Config>(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };
        config.base_dir = config_dir.as_ref().to_path_buf();
        config.apply_overrides(|name| std::env::var(name).ok());

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Apply `AZURE_OPENAI_ENDPOINT` and `OPENAI_API_VERSION` style overrides.
    ///
    /// Blank values are ignored.
    #[inline]
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(endpoint) = non_blank(ENDPOINT_ENV) {
            debug!("Using endpoint from {}", ENDPOINT_ENV);
            self.service.endpoint = endpoint;
        }
        if let Some(version) = non_blank(API_VERSION_ENV) {
            debug!("Using API version from {}", API_VERSION_ENV);
            self.service.api_version = version;
        }
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.service.validate()?;
        self.dataset.validate()?;
        self.retrieval.validate()?;
        Ok(())
    }

    #[inline]
    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        self.service.endpoint_url()
    }

    /// API key read from the configured environment variable; never persisted
    #[inline]
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.service.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint_url()?;

        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }

        if self.chat_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.chat_model.clone()));
        }

        if self.flavor == ApiFlavor::Azure && self.api_version.trim().is_empty() {
            return Err(ConfigError::InvalidApiVersion(self.api_version.clone()));
        }

        if self.api_key_env.trim().is_empty() {
            return Err(ConfigError::InvalidApiKeyEnv(self.api_key_env.clone()));
        }

        if !(1..=600).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        Ok(())
    }

    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(self.endpoint.trim())
            .map_err(|_| ConfigError::InvalidUrl(self.endpoint.clone()))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidProtocol(url.scheme().to_string()));
        }

        if url.host_str().is_none_or(str::is_empty) {
            return Err(ConfigError::InvalidUrl(self.endpoint.clone()));
        }

        Ok(url)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn set_endpoint(&mut self, endpoint: String) -> Result<(), ConfigError> {
        let temp_config = ServiceConfig {
            endpoint: endpoint.clone(),
            ..self.clone()
        };
        temp_config.endpoint_url()?;
        self.endpoint = endpoint;
        Ok(())
    }

    pub fn set_embedding_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.embedding_model = model;
        Ok(())
    }

    pub fn set_chat_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.chat_model = model;
        Ok(())
    }

    pub fn set_timeout_seconds(&mut self, timeout_seconds: u64) -> Result<(), ConfigError> {
        if !(1..=600).contains(&timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(timeout_seconds));
        }
        self.timeout_seconds = timeout_seconds;
        Ok(())
    }
}

impl DatasetConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidDatasetPath);
        }
        Ok(())
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.max_neighbors) {
            return Err(ConfigError::InvalidMaxNeighbors(self.max_neighbors));
        }

        if self.top_k == 0 || self.top_k > self.max_neighbors {
            return Err(ConfigError::InvalidTopK(self.top_k, self.max_neighbors));
        }

        Ok(())
    }

    pub fn set_max_neighbors(&mut self, max_neighbors: usize) -> Result<(), ConfigError> {
        if !(1..=100).contains(&max_neighbors) {
            return Err(ConfigError::InvalidMaxNeighbors(max_neighbors));
        }
        self.max_neighbors = max_neighbors;
        self.top_k = self.top_k.min(max_neighbors);
        Ok(())
    }

    pub fn set_top_k(&mut self, top_k: usize) -> Result<(), ConfigError> {
        if top_k == 0 || top_k > self.max_neighbors {
            return Err(ConfigError::InvalidTopK(top_k, self.max_neighbors));
        }
        self.top_k = top_k;
        Ok(())
    }
}
