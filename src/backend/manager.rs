//! BackendManager - health monitoring and slot accounting for endpoints

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::{BackendEndpoint, BackendKind};

use super::state::{BackendHealth, BackendState, BackendStatus};

/// Interval between health sweeps
const HEALTH_INTERVAL: Duration = Duration::from_secs(30);

/// Hard timeout for a catalog probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Target for a catalog probe, snapshotted outside the state lock
#[derive(Clone)]
pub struct ProbeTarget {
    pub name: String,
    pub url: String,
    pub client: reqwest::Client,
}

/// Outcome of one catalog probe
enum ProbeOutcome {
    Healthy { models: Vec<String> },
    Unhealthy { error: String },
}

/// Manages backend endpoints: health checks, load tracking, and
/// acquire/release slot accounting
///
/// All counters mutate under a single lock so the availability check
/// and the increment in `acquire` are atomic.
pub struct BackendManager {
    inner: Arc<Mutex<HashMap<String, BackendState>>>,
    health_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl BackendManager {
    /// Create a manager for the enabled endpoints
    pub fn new(backends: Vec<BackendEndpoint>) -> Self {
        let mut map = HashMap::new();
        for config in backends.into_iter().filter(|b| b.enabled) {
            map.insert(config.name.clone(), BackendState::new(config));
        }
        Self {
            inner: Arc::new(Mutex::new(map)),
            health_task: Mutex::new(None),
        }
    }

    /// Run an initial health sweep and start the periodic health loop
    pub async fn start(&self) {
        self.check_all_health().await;

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(HEALTH_INTERVAL).await;
                sweep(&inner).await;
            }
        });
        *self.health_task.lock().expect("health task lock") = Some(handle);

        let names: Vec<String> = self.inner.lock().expect("backend lock").keys().cloned().collect();
        info!(backends = ?names, "backend manager started");
    }

    /// Stop the health loop
    pub async fn stop(&self) {
        if let Some(handle) = self.health_task.lock().expect("health task lock").take() {
            handle.abort();
        }
        info!("backend manager stopped");
    }

    /// Atomically check availability and claim a slot. Returns false
    /// when the backend is unknown, unhealthy, or saturated.
    pub fn acquire(&self, backend_name: &str) -> bool {
        let mut inner = self.inner.lock().expect("backend lock");
        let Some(state) = inner.get_mut(backend_name) else {
            return false;
        };
        if !state.is_available() {
            return false;
        }
        state.active_requests += 1;
        true
    }

    /// Release a slot and record the request outcome
    pub fn release(&self, backend_name: &str, success: bool, latency_ms: f64, error: Option<String>) {
        let mut inner = self.inner.lock().expect("backend lock");
        let Some(state) = inner.get_mut(backend_name) else {
            return;
        };
        state.active_requests = state.active_requests.saturating_sub(1);
        if success {
            state.total_completed += 1;
        } else {
            state.total_errors += 1;
            state.last_error = error;
        }
        if latency_ms > 0.0 {
            let alpha = 0.3;
            state.avg_latency_ms = alpha * latency_ms + (1.0 - alpha) * state.avg_latency_ms;
        }
    }

    /// Snapshot of one backend
    pub fn snapshot(&self, name: &str) -> Option<BackendStatus> {
        let inner = self.inner.lock().expect("backend lock");
        inner.get(name).map(|s| s.status())
    }

    /// Snapshots of every backend
    pub fn get_status(&self) -> Vec<BackendStatus> {
        let inner = self.inner.lock().expect("backend lock");
        let mut statuses: Vec<BackendStatus> = inner.values().map(|s| s.status()).collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// Base URL of a backend
    pub fn backend_url(&self, name: &str) -> Option<String> {
        let inner = self.inner.lock().expect("backend lock");
        inner.get(name).map(|s| s.config.url.clone())
    }

    /// Available backends that can serve a model, best first by
    /// priority (descending) then load (ascending)
    pub fn get_best_backend_for_model(&self, model: &str) -> Option<String> {
        let inner = self.inner.lock().expect("backend lock");
        let mut candidates: Vec<&BackendState> = inner
            .values()
            .filter(|s| s.is_available() && s.serves_model(model))
            .collect();
        candidates.sort_by(|a, b| {
            b.config
                .priority
                .cmp(&a.config.priority)
                .then_with(|| a.load_ratio().partial_cmp(&b.load_ratio()).unwrap_or(std::cmp::Ordering::Equal))
        });
        candidates.first().map(|s| s.config.name.clone())
    }

    /// Probe targets for every enabled Ollama endpoint, for model
    /// discovery outside this module
    pub fn probe_targets(&self) -> Vec<ProbeTarget> {
        let inner = self.inner.lock().expect("backend lock");
        inner
            .values()
            .filter(|s| s.config.kind == BackendKind::Ollama && s.config.enabled)
            .map(|s| ProbeTarget {
                name: s.config.name.clone(),
                url: s.config.url.clone(),
                client: s.client.clone(),
            })
            .collect()
    }

    /// Check the health of every backend concurrently
    pub async fn check_all_health(&self) {
        sweep(&self.inner).await;
    }
}

/// One health sweep over every backend in the map
async fn sweep(inner: &Mutex<HashMap<String, BackendState>>) {
    // Snapshot targets so probes run without holding the lock
    let targets: Vec<(String, BackendKind, String, bool, reqwest::Client)> = {
        let inner = inner.lock().expect("backend lock");
        inner
            .values()
            .map(|s| {
                (
                    s.config.name.clone(),
                    s.config.kind,
                    s.config.url.clone(),
                    s.config.api_key.is_some(),
                    s.client.clone(),
                )
            })
            .collect()
    };

    let probes = targets.into_iter().map(|(name, kind, url, has_key, client)| async move {
        let outcome = match kind {
            BackendKind::Ollama => probe_catalog(&client, &url).await,
            // Hosted APIs: healthy when credentials are configured
            BackendKind::Claude | BackendKind::OpenAi => {
                if has_key {
                    ProbeOutcome::Healthy { models: Vec::new() }
                } else {
                    ProbeOutcome::Unhealthy {
                        error: "no api key configured".to_string(),
                    }
                }
            }
        };
        (name, kind, outcome)
    });

    let results = join_all(probes).await;

    let mut inner = inner.lock().expect("backend lock");
    for (name, kind, outcome) in results {
        let Some(state) = inner.get_mut(&name) else {
            continue;
        };
        state.last_check = Some(Utc::now());
        match outcome {
            ProbeOutcome::Healthy { models } => {
                state.health = BackendHealth::Healthy;
                if kind == BackendKind::Ollama {
                    state.discovered_models = models;
                }
            }
            ProbeOutcome::Unhealthy { error } => {
                // Hosted backends without credentials stay unknown
                state.health = if kind == BackendKind::Ollama {
                    BackendHealth::Unhealthy
                } else {
                    BackendHealth::Unknown
                };
                warn!(backend = %name, %error, "backend health check failed");
                state.last_error = Some(error);
            }
        }
    }
}

/// Probe an Ollama catalog endpoint and collect its model names
async fn probe_catalog(client: &reqwest::Client, url: &str) -> ProbeOutcome {
    let request = client.get(format!("{}/api/tags", url)).timeout(PROBE_TIMEOUT);

    let response = match request.send().await {
        Ok(r) => r,
        Err(e) => {
            return ProbeOutcome::Unhealthy { error: e.to_string() };
        }
    };

    if !response.status().is_success() {
        return ProbeOutcome::Unhealthy {
            error: format!("HTTP {}", response.status().as_u16()),
        };
    }

    let body: Value = match response.json().await {
        Ok(b) => b,
        Err(e) => {
            return ProbeOutcome::Unhealthy { error: e.to_string() };
        }
    };

    let models = body["models"]
        .as_array()
        .map(|models| {
            models
                .iter()
                .filter_map(|m| m["name"].as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    ProbeOutcome::Healthy { models }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(name: &str, max_concurrent: usize, priority: i64) -> BackendEndpoint {
        BackendEndpoint {
            name: name.to_string(),
            models: vec!["qwen2.5:7b".to_string()],
            max_concurrent,
            priority,
            ..Default::default()
        }
    }

    #[test]
    fn test_disabled_backends_excluded() {
        let mut disabled = endpoint("off", 1, 0);
        disabled.enabled = false;

        let manager = BackendManager::new(vec![endpoint("on", 1, 0), disabled]);
        assert!(manager.snapshot("on").is_some());
        assert!(manager.snapshot("off").is_none());
    }

    #[test]
    fn test_acquire_respects_budget() {
        let manager = BackendManager::new(vec![endpoint("local", 2, 0)]);

        assert!(manager.acquire("local"));
        assert!(manager.acquire("local"));
        assert!(!manager.acquire("local"));

        let status = manager.snapshot("local").unwrap();
        assert_eq!(status.active_requests, 2);
        assert_eq!(status.available_slots, 0);
    }

    #[test]
    fn test_acquire_unknown_backend() {
        let manager = BackendManager::new(vec![]);
        assert!(!manager.acquire("ghost"));
    }

    #[test]
    fn test_release_updates_counters_and_latency() {
        let manager = BackendManager::new(vec![endpoint("local", 2, 0)]);

        assert!(manager.acquire("local"));
        manager.release("local", true, 1000.0, None);

        let status = manager.snapshot("local").unwrap();
        assert_eq!(status.active_requests, 0);
        assert_eq!(status.total_completed, 1);
        assert_eq!(status.avg_latency_ms, 300.0); // 0.3 * 1000 + 0.7 * 0

        assert!(manager.acquire("local"));
        manager.release("local", false, 2000.0, Some("boom".to_string()));

        let status = manager.snapshot("local").unwrap();
        assert_eq!(status.total_errors, 1);
        assert_eq!(status.last_error, Some("boom".to_string()));
        assert_eq!(status.avg_latency_ms, 810.0); // 0.3 * 2000 + 0.7 * 300
    }

    #[test]
    fn test_release_floors_at_zero() {
        let manager = BackendManager::new(vec![endpoint("local", 1, 0)]);
        manager.release("local", true, 0.0, None);
        assert_eq!(manager.snapshot("local").unwrap().active_requests, 0);
    }

    #[test]
    fn test_best_backend_prefers_priority_then_load() {
        let manager = BackendManager::new(vec![endpoint("a", 4, 0), endpoint("b", 4, 2)]);

        assert_eq!(manager.get_best_backend_for_model("qwen2.5:7b"), Some("b".to_string()));

        // Saturate b; a should win
        assert!(manager.acquire("b"));
        assert!(manager.acquire("b"));
        assert!(manager.acquire("b"));
        assert!(manager.acquire("b"));
        assert_eq!(manager.get_best_backend_for_model("qwen2.5:7b"), Some("a".to_string()));
    }

    #[test]
    fn test_best_backend_matches_base_name() {
        let manager = BackendManager::new(vec![endpoint("local", 1, 0)]);
        // Configured tag is qwen2.5:7b; base name qwen2.5 matches
        assert_eq!(manager.get_best_backend_for_model("qwen2.5:14b"), Some("local".to_string()));
        assert_eq!(manager.get_best_backend_for_model("devstral:24b"), None);
    }

    #[tokio::test]
    async fn test_health_probe_success_and_discovery() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_body(r#"{"models": [{"name": "qwen2.5:7b", "size": 4000000000}]}"#)
            .create_async()
            .await;

        let mut backend = endpoint("local", 1, 0);
        backend.url = server.url();
        let manager = BackendManager::new(vec![backend]);

        manager.check_all_health().await;

        let status = manager.snapshot("local").unwrap();
        assert_eq!(status.health, BackendHealth::Healthy);
        assert_eq!(status.discovered_models, vec!["qwen2.5:7b".to_string()]);
        assert!(status.last_check.is_some());
    }

    #[tokio::test]
    async fn test_health_probe_5xx_marks_unhealthy() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/tags")
            .with_status(500)
            .create_async()
            .await;

        let mut backend = endpoint("local", 1, 0);
        backend.url = server.url();
        let manager = BackendManager::new(vec![backend]);

        manager.check_all_health().await;

        let status = manager.snapshot("local").unwrap();
        assert_eq!(status.health, BackendHealth::Unhealthy);
        assert_eq!(status.last_error, Some("HTTP 500".to_string()));
        assert!(!status.is_available);
        assert!(!manager.acquire("local"));
    }

    #[tokio::test]
    async fn test_health_recovers_after_outage() {
        let mut server = mockito::Server::new_async().await;
        let bad = server.mock("GET", "/api/tags").with_status(503).create_async().await;

        let mut backend = endpoint("local", 1, 0);
        backend.url = server.url();
        let manager = BackendManager::new(vec![backend]);

        manager.check_all_health().await;
        assert_eq!(manager.snapshot("local").unwrap().health, BackendHealth::Unhealthy);

        bad.remove_async().await;
        let _good = server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_body(r#"{"models": []}"#)
            .create_async()
            .await;

        manager.check_all_health().await;
        assert_eq!(manager.snapshot("local").unwrap().health, BackendHealth::Healthy);
    }
}
