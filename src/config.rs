//! Configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Kind of inference backend an endpoint speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Claude,
    #[default]
    Ollama,
    #[serde(rename = "openai")]
    OpenAi,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Claude => write!(f, "claude"),
            Self::Ollama => write!(f, "ollama"),
            Self::OpenAi => write!(f, "openai"),
        }
    }
}

/// A single inference endpoint (local Ollama, remote Ollama, Claude API, ...)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendEndpoint {
    /// Unique name for this backend
    pub name: String,

    /// Backend wire dialect
    #[serde(rename = "type")]
    pub kind: BackendKind,

    /// Base URL of the endpoint
    pub url: String,

    /// Models advertised by configuration (discovery may add more)
    pub models: Vec<String>,

    /// API key for hosted backends
    #[serde(rename = "api-key")]
    pub api_key: Option<String>,

    /// Concurrency budget for this endpoint
    #[serde(rename = "max-concurrent")]
    pub max_concurrent: usize,

    /// Higher priority backends win ties during selection
    pub priority: i64,

    /// Whether this backend participates in scheduling
    pub enabled: bool,
}

impl Default for BackendEndpoint {
    fn default() -> Self {
        Self {
            name: "local".to_string(),
            kind: BackendKind::Ollama,
            url: "http://localhost:11434".to_string(),
            models: Vec::new(),
            api_key: None,
            max_concurrent: 1,
            priority: 0,
            enabled: true,
        }
    }
}

/// Model selection preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Preferred models in priority order
    pub preferred: Vec<String>,

    /// Fallback model when nothing preferred is available
    pub fallback: String,

    /// Let the router pick the best model per task
    #[serde(rename = "auto-select")]
    pub auto_select: bool,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            preferred: vec!["qwen2.5:14b".to_string(), "devstral:24b".to_string()],
            fallback: "qwen2.5:7b".to_string(),
            auto_select: true,
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    /// Maximum concurrent agent instances
    #[serde(rename = "max-instances")]
    pub max_instances: usize,

    /// Default task timeout in seconds
    #[serde(rename = "default-timeout-secs")]
    pub default_timeout_secs: u64,

    /// Root workspace directory for tasks without an explicit one
    #[serde(rename = "workspace-root")]
    pub workspace_root: PathBuf,

    /// Default execution backend kind
    pub backend: BackendKind,

    /// Legacy single-endpoint Ollama URL
    #[serde(rename = "ollama-url")]
    pub ollama_url: String,

    /// Legacy single-endpoint Ollama model
    #[serde(rename = "ollama-model")]
    pub ollama_model: String,

    /// Model selection preferences
    pub models: ModelsConfig,

    /// Backend endpoints; when empty, one is synthesized from the legacy fields
    pub backends: Vec<BackendEndpoint>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            max_instances: 10,
            default_timeout_secs: 300,
            workspace_root: PathBuf::from("."),
            backend: BackendKind::Ollama,
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "devstral:24b".to_string(),
            models: ModelsConfig::default(),
            backends: Vec::new(),
        }
    }
}

impl SwarmConfig {
    /// Backend endpoints with the legacy single-backend fallback applied
    pub fn effective_backends(&self) -> Vec<BackendEndpoint> {
        if !self.backends.is_empty() {
            return self.backends.clone();
        }

        match self.backend {
            BackendKind::Ollama => vec![BackendEndpoint {
                name: "local".to_string(),
                kind: BackendKind::Ollama,
                url: self.ollama_url.clone(),
                models: vec![self.ollama_model.clone()],
                max_concurrent: 1,
                ..Default::default()
            }],
            BackendKind::Claude => vec![BackendEndpoint {
                name: "claude".to_string(),
                kind: BackendKind::Claude,
                url: String::new(),
                models: vec!["claude".to_string()],
                max_concurrent: 2,
                ..Default::default()
            }],
            BackendKind::OpenAi => vec![BackendEndpoint {
                name: "openai".to_string(),
                kind: BackendKind::OpenAi,
                url: "https://api.openai.com".to_string(),
                models: Vec::new(),
                max_concurrent: 2,
                ..Default::default()
            }],
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Orchestrator settings
    pub swarm: SwarmConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from("swarmd.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("swarmd").join("swarmd.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}
