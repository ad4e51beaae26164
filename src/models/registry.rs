//! LiveModelRegistry - merges backend discovery with the static catalog

use std::collections::HashMap;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::backend::{BackendManager, ProbeTarget};

use super::profiles::{ModelProfile, TOOL_CAPABLE_FAMILIES, ToolCallingQuality, catalog_size, profile_for};

/// Minimum time between discovery sweeps
const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Hard timeout for one catalog query
const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// A discovered model merged with its static profile
#[derive(Debug, Clone)]
pub struct InstalledModel {
    pub name: String,
    pub size_bytes: u64,
    /// Backends that have this model installed
    pub backends: Vec<String>,
    pub profile: Option<&'static ModelProfile>,
}

/// Registry statistics snapshot
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub total_installed: usize,
    pub with_profiles: usize,
    pub tool_capable: usize,
    pub total_size_gb: f64,
    pub static_profiles: usize,
    pub backends_queried: usize,
}

struct RegistryInner {
    installed: HashMap<String, InstalledModel>,
    last_refresh: Option<Instant>,
}

/// Runtime model registry fed by periodic discovery across every
/// enabled Ollama backend
pub struct LiveModelRegistry {
    backends: Arc<BackendManager>,
    inner: Mutex<RegistryInner>,
}

impl LiveModelRegistry {
    pub fn new(backends: Arc<BackendManager>) -> Self {
        Self {
            backends,
            inner: Mutex::new(RegistryInner {
                installed: HashMap::new(),
                last_refresh: None,
            }),
        }
    }

    /// Query every enabled backend for installed models, throttled to
    /// once per refresh interval unless forced
    pub async fn refresh(&self, force: bool) {
        {
            let inner = self.inner.lock().await;
            let fresh = inner
                .last_refresh
                .is_some_and(|last| last.elapsed() < REFRESH_INTERVAL);
            if fresh && !force {
                return;
            }
        }

        let targets = self.backends.probe_targets();
        let queries = targets.into_iter().map(|t| async move {
            let discovered = query_models(&t).await;
            (t.name, discovered)
        });
        let results = join_all(queries).await;

        let mut inner = self.inner.lock().await;
        inner.installed.clear();
        for (backend_name, discovered) in results {
            for (name, size) in discovered {
                match inner.installed.get_mut(&name) {
                    Some(existing) => {
                        if !existing.backends.contains(&backend_name) {
                            existing.backends.push(backend_name.clone());
                        }
                    }
                    None => {
                        let profile = profile_for(&name);
                        inner.installed.insert(
                            name.clone(),
                            InstalledModel {
                                name,
                                size_bytes: size,
                                backends: vec![backend_name.clone()],
                                profile,
                            },
                        );
                    }
                }
            }
        }
        inner.last_refresh = Some(Instant::now());
        info!(count = inner.installed.len(), "model registry refreshed");
    }

    /// All installed models with their profiles
    pub async fn get_installed_models(&self) -> Vec<InstalledModel> {
        self.refresh(false).await;
        let inner = self.inner.lock().await;
        let mut models: Vec<InstalledModel> = inner.installed.values().cloned().collect();
        models.sort_by(|a, b| a.name.cmp(&b.name));
        models
    }

    /// Installed models that support tool calling, by profile or by
    /// known-family name heuristics
    pub async fn get_tool_capable_models(&self) -> Vec<InstalledModel> {
        self.get_installed_models()
            .await
            .into_iter()
            .filter(|m| {
                if m.profile.is_some_and(|p| p.supports_tool_calling()) {
                    return true;
                }
                let name_lower = m.name.to_lowercase();
                TOOL_CAPABLE_FAMILIES.iter().any(|family| name_lower.contains(family))
            })
            .collect()
    }

    /// Rank installed models by suitability for the given task tags,
    /// best first. Models without a profile or below the minimum tool
    /// calling quality are filtered out.
    pub async fn get_best_model_for(
        &self,
        task_tags: &[String],
        min_quality: ToolCallingQuality,
        prefer_speed: bool,
    ) -> Vec<InstalledModel> {
        let installed = self.get_installed_models().await;

        let mut scored: Vec<(f64, InstalledModel)> = installed
            .into_iter()
            .filter_map(|model| {
                let profile = model.profile?;

                let tc_score = profile.tool_calling.selection_score();
                if tc_score < min_quality.selection_score() {
                    return None;
                }
                let mut score = tc_score;

                let matching = task_tags
                    .iter()
                    .filter(|tag| profile.task_tags.contains(&tag.as_str()))
                    .count();
                score += matching as f64 * 10.0;

                score += profile.quality_rating as f64 * 3.0;
                score += profile.speed_rating as f64 * if prefer_speed { 4.0 } else { 1.0 };

                if profile.context_window >= 32_768 {
                    score += 5.0;
                }
                if profile.context_window >= 128_000 {
                    score += 5.0;
                }

                Some((score, model))
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().map(|(_, model)| model).collect()
    }

    /// Which backends have a model installed, with a base-name fallback
    pub async fn get_backends_for_model(&self, model_name: &str) -> Vec<String> {
        self.refresh(false).await;
        let inner = self.inner.lock().await;

        if let Some(model) = inner.installed.get(model_name) {
            return model.backends.clone();
        }

        let base = model_name.split(':').next().unwrap_or(model_name);
        inner
            .installed
            .iter()
            .find(|(name, _)| name.contains(base))
            .map(|(_, model)| model.backends.clone())
            .unwrap_or_default()
    }

    /// Check if a model is installed anywhere, allowing base-name matches
    pub async fn is_model_installed(&self, model_name: &str) -> bool {
        self.refresh(false).await;
        let inner = self.inner.lock().await;

        if inner.installed.contains_key(model_name) {
            return true;
        }
        let base = model_name.split(':').next().unwrap_or(model_name);
        inner.installed.keys().any(|name| name.contains(base))
    }

    /// Registry statistics
    pub async fn get_stats(&self) -> RegistryStats {
        let tool_capable = self.get_tool_capable_models().await.len();
        let inner = self.inner.lock().await;

        let total_size: u64 = inner.installed.values().map(|m| m.size_bytes).sum();
        let with_profiles = inner.installed.values().filter(|m| m.profile.is_some()).count();
        let mut backends: Vec<&str> = inner
            .installed
            .values()
            .flat_map(|m| m.backends.iter().map(|b| b.as_str()))
            .collect();
        backends.sort_unstable();
        backends.dedup();

        RegistryStats {
            total_installed: inner.installed.len(),
            with_profiles,
            tool_capable,
            total_size_gb: (total_size as f64 / (1u64 << 30) as f64 * 100.0).round() / 100.0,
            static_profiles: catalog_size(),
            backends_queried: backends.len(),
        }
    }
}

/// Query one backend's catalog endpoint for (name, size) pairs
async fn query_models(target: &ProbeTarget) -> Vec<(String, u64)> {
    let request = target
        .client
        .get(format!("{}/api/tags", target.url))
        .timeout(QUERY_TIMEOUT);

    let response = match request.send().await {
        Ok(r) if r.status().is_success() => r,
        Ok(r) => {
            warn!(backend = %target.name, status = r.status().as_u16(), "model discovery failed");
            return Vec::new();
        }
        Err(e) => {
            warn!(backend = %target.name, error = %e, "model discovery error");
            return Vec::new();
        }
    };

    let body: Value = match response.json().await {
        Ok(b) => b,
        Err(e) => {
            warn!(backend = %target.name, error = %e, "model discovery returned bad JSON");
            return Vec::new();
        }
    };

    body["models"]
        .as_array()
        .map(|models| {
            models
                .iter()
                .filter_map(|m| {
                    let name = m["name"].as_str()?.to_string();
                    let size = m["size"].as_u64().unwrap_or(0);
                    Some((name, size))
                })
                .collect()
        })
        .unwrap_or_default()
}
