//! Runtime state for a single backend endpoint

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{BackendEndpoint, BackendKind};

/// Health of a backend endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendHealth {
    Healthy,
    Degraded,
    Unhealthy,
    #[default]
    Unknown,
}

impl std::fmt::Display for BackendHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Runtime state wrapped around a configured endpoint
#[derive(Debug, Clone)]
pub struct BackendState {
    pub config: BackendEndpoint,
    pub health: BackendHealth,
    pub active_requests: usize,
    pub total_completed: u64,
    pub total_errors: u64,
    pub avg_latency_ms: f64,
    pub last_check: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub discovered_models: Vec<String>,
    /// Reusable connection pool for probes and chat calls
    pub(crate) client: reqwest::Client,
}

impl BackendState {
    pub fn new(config: BackendEndpoint) -> Self {
        Self {
            config,
            health: BackendHealth::Unknown,
            active_requests: 0,
            total_completed: 0,
            total_errors: 0,
            avg_latency_ms: 0.0,
            last_check: None,
            last_error: None,
            discovered_models: Vec::new(),
            client: reqwest::Client::new(),
        }
    }

    /// Concurrency slots still open on this endpoint
    pub fn available_slots(&self) -> usize {
        self.config.max_concurrent.saturating_sub(self.active_requests)
    }

    /// Whether this backend can take new work right now
    pub fn is_available(&self) -> bool {
        self.config.enabled
            && matches!(self.health, BackendHealth::Healthy | BackendHealth::Unknown)
            && self.available_slots() > 0
    }

    /// Fraction of the concurrency budget in use
    pub fn load_ratio(&self) -> f64 {
        if self.config.max_concurrent == 0 {
            return 1.0;
        }
        self.active_requests as f64 / self.config.max_concurrent as f64
    }

    /// Whether this backend serves the model, by exact name or
    /// colon-stripped base over configured and discovered models
    pub fn serves_model(&self, model: &str) -> bool {
        let base = model.split(':').next().unwrap_or(model);
        self.config
            .models
            .iter()
            .chain(self.discovered_models.iter())
            .any(|m| m == model || m.contains(base))
    }

    /// Snapshot for external observers
    pub fn status(&self) -> BackendStatus {
        BackendStatus {
            name: self.config.name.clone(),
            kind: self.config.kind,
            url: self.config.url.clone(),
            health: self.health,
            enabled: self.config.enabled,
            configured_models: self.config.models.clone(),
            discovered_models: self.discovered_models.clone(),
            max_concurrent: self.config.max_concurrent,
            active_requests: self.active_requests,
            available_slots: self.available_slots(),
            total_completed: self.total_completed,
            total_errors: self.total_errors,
            avg_latency_ms: (self.avg_latency_ms * 10.0).round() / 10.0,
            priority: self.config.priority,
            last_check: self.last_check,
            last_error: self.last_error.clone(),
            is_available: self.is_available(),
            load_ratio: self.load_ratio(),
        }
    }
}

/// Serializable backend snapshot for status queries and routing
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: BackendKind,
    pub url: String,
    pub health: BackendHealth,
    pub enabled: bool,
    pub configured_models: Vec<String>,
    pub discovered_models: Vec<String>,
    pub max_concurrent: usize,
    pub active_requests: usize,
    pub available_slots: usize,
    pub total_completed: u64,
    pub total_errors: u64,
    pub avg_latency_ms: f64,
    pub priority: i64,
    pub last_check: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub is_available: bool,
    pub load_ratio: f64,
}
