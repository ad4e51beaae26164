//! InstanceManager - bounded pool of agent instances

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::backend::BackendManager;
use crate::config::{BackendKind, SwarmConfig};
use crate::events::EventBus;

use super::instance::{AgentInstance, InstanceInfo, InstanceStatus};

/// Pool statistics snapshot
#[derive(Debug, Clone, Serialize)]
pub struct InstanceStats {
    pub total_instances: usize,
    pub max_instances: usize,
    pub available_slots: usize,
    pub by_status: HashMap<String, usize>,
    pub total_completed_tasks: u64,
    pub total_errors: u64,
}

/// Owns every agent instance, enforcing the pool cap
pub struct InstanceManager {
    max_instances: usize,
    default_working_dir: PathBuf,
    default_kind: BackendKind,
    default_url: String,
    default_model: String,
    backends: Arc<BackendManager>,
    events: Option<Arc<EventBus>>,
    instances: Mutex<HashMap<String, Arc<AgentInstance>>>,
}

impl InstanceManager {
    pub fn new(config: &SwarmConfig, backends: Arc<BackendManager>, events: Option<Arc<EventBus>>) -> Self {
        Self {
            max_instances: config.max_instances,
            default_working_dir: config.workspace_root.clone(),
            default_kind: config.backend,
            default_url: config.ollama_url.clone(),
            default_model: config.ollama_model.clone(),
            backends,
            events,
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Spawn an instance bound to the given or default (backend, model);
    /// refuses when the pool is at capacity or readiness fails
    pub async fn spawn(
        &self,
        working_dir: Option<PathBuf>,
        backend_name: Option<&str>,
        model: Option<&str>,
    ) -> Option<Arc<AgentInstance>> {
        let mut instances = self.instances.lock().await;
        if instances.len() >= self.max_instances {
            warn!(max = self.max_instances, "max instances reached");
            return None;
        }

        let url = backend_name
            .and_then(|name| self.backends.backend_url(name))
            .unwrap_or_else(|| self.default_url.clone());

        let instance = Arc::new(AgentInstance::new(
            backend_name.unwrap_or("local"),
            self.default_kind,
            url,
            model.unwrap_or(&self.default_model),
            working_dir.unwrap_or_else(|| self.default_working_dir.clone()),
            self.events.clone(),
        ));

        if !instance.start().await {
            return None;
        }

        instances.insert(instance.id.clone(), instance.clone());
        info!(instance_id = %instance.id, model = %instance.model,
              backend = %instance.backend_name, total = instances.len(), "instance spawned");
        Some(instance)
    }

    /// Spawn up to `count` instances concurrently
    pub async fn spawn_multiple(&self, count: usize) -> Vec<Arc<AgentInstance>> {
        let available = {
            let instances = self.instances.lock().await;
            self.max_instances.saturating_sub(instances.len())
        };
        let spawn_count = count.min(available);

        let spawns = (0..spawn_count).map(|_| self.spawn(None, None, None));
        join_all(spawns).await.into_iter().flatten().collect()
    }

    /// Get an instance by id
    pub async fn get(&self, instance_id: &str) -> Option<Arc<AgentInstance>> {
        let instances = self.instances.lock().await;
        instances.get(instance_id).cloned()
    }

    /// First idle instance in the pool
    pub async fn get_idle(&self) -> Option<Arc<AgentInstance>> {
        let instances = self.instances.lock().await;
        instances
            .values()
            .find(|i| i.status() == InstanceStatus::Idle)
            .cloned()
    }

    /// Idle instance already bound to (model, backend), or a fresh spawn
    pub async fn get_or_spawn_for_model(
        &self,
        model: &str,
        working_dir: Option<PathBuf>,
        backend_name: Option<&str>,
    ) -> Option<Arc<AgentInstance>> {
        {
            let instances = self.instances.lock().await;
            let existing = instances.values().find(|i| {
                i.status() == InstanceStatus::Idle
                    && i.model == model
                    && backend_name.is_none_or(|b| i.backend_name == b)
            });
            if let Some(instance) = existing {
                return Some(instance.clone());
            }
        }

        self.spawn(working_dir, backend_name, Some(model)).await
    }

    /// Terminate one instance
    pub async fn terminate(&self, instance_id: &str) -> bool {
        let mut instances = self.instances.lock().await;
        match instances.remove(instance_id) {
            Some(instance) => {
                instance.stop();
                info!(instance_id, remaining = instances.len(), "instance terminated");
                true
            }
            None => false,
        }
    }

    /// Terminate every instance; returns how many were stopped
    pub async fn terminate_all(&self) -> usize {
        let mut instances = self.instances.lock().await;
        let count = instances.len();
        for instance in instances.values() {
            instance.stop();
        }
        instances.clear();
        info!(count, "all instances terminated");
        count
    }

    /// Scale the pool to a target size, terminating idle instances
    /// first when shrinking; returns the resulting pool size
    pub async fn scale_to(&self, target: usize) -> usize {
        let current = self.instances.lock().await.len();

        if target > current {
            let to_spawn = (target - current).min(self.max_instances.saturating_sub(current));
            self.spawn_multiple(to_spawn).await;
            return self.instances.lock().await.len();
        }

        if target < current {
            let mut instances = self.instances.lock().await;
            let idle_ids: Vec<String> = instances
                .values()
                .filter(|i| i.status() == InstanceStatus::Idle)
                .map(|i| i.id.clone())
                .collect();
            for id in idle_ids.into_iter().take(current - target) {
                if let Some(instance) = instances.remove(&id) {
                    instance.stop();
                }
            }
            return instances.len();
        }

        current
    }

    /// Snapshots of every instance
    pub async fn list_instances(&self) -> Vec<InstanceInfo> {
        let instances = self.instances.lock().await;
        let mut infos: Vec<InstanceInfo> = instances.values().map(|i| i.info()).collect();
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        infos
    }

    /// Pool statistics
    pub async fn get_stats(&self) -> InstanceStats {
        let instances = self.instances.lock().await;

        let mut by_status: HashMap<String, usize> = HashMap::new();
        let mut total_completed = 0;
        let mut total_errors = 0;
        for instance in instances.values() {
            *by_status.entry(instance.status().to_string()).or_insert(0) += 1;
            let (completed, errors) = instance.counters();
            total_completed += completed;
            total_errors += errors;
        }

        InstanceStats {
            total_instances: instances.len(),
            max_instances: self.max_instances,
            available_slots: self.max_instances.saturating_sub(instances.len()),
            by_status,
            total_completed_tasks: total_completed,
            total_errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendEndpoint;
    use tempfile::tempdir;

    async fn manager_with_backend(max_instances: usize) -> (InstanceManager, mockito::ServerGuard, tempfile::TempDir) {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_body(r#"{"models": [{"name": "qwen2.5:7b"}, {"name": "devstral:24b"}]}"#)
            .expect_at_least(0)
            .create_async()
            .await;

        let temp = tempdir().unwrap();
        let config = SwarmConfig {
            max_instances,
            workspace_root: temp.path().to_path_buf(),
            ollama_url: server.url(),
            ollama_model: "qwen2.5:7b".to_string(),
            ..Default::default()
        };
        let backends = Arc::new(BackendManager::new(vec![BackendEndpoint {
            name: "local".to_string(),
            url: server.url(),
            ..Default::default()
        }]));

        (InstanceManager::new(&config, backends, None), server, temp)
    }

    #[tokio::test]
    async fn test_spawn_and_cap() {
        let (manager, _server, _temp) = manager_with_backend(2).await;

        assert!(manager.spawn(None, None, None).await.is_some());
        assert!(manager.spawn(None, None, None).await.is_some());
        assert!(manager.spawn(None, None, None).await.is_none());

        let stats = manager.get_stats().await;
        assert_eq!(stats.total_instances, 2);
        assert_eq!(stats.available_slots, 0);
    }

    #[tokio::test]
    async fn test_get_idle() {
        let (manager, _server, _temp) = manager_with_backend(2).await;
        let spawned = manager.spawn(None, None, None).await.unwrap();

        let idle = manager.get_idle().await.unwrap();
        assert_eq!(idle.id, spawned.id);
    }

    #[tokio::test]
    async fn test_get_or_spawn_reuses_matching_idle() {
        let (manager, _server, _temp) = manager_with_backend(3).await;

        let first = manager.get_or_spawn_for_model("qwen2.5:7b", None, None).await.unwrap();
        let second = manager.get_or_spawn_for_model("qwen2.5:7b", None, None).await.unwrap();
        assert_eq!(first.id, second.id);

        // Different model spawns a new instance
        let third = manager.get_or_spawn_for_model("devstral:24b", None, None).await.unwrap();
        assert_ne!(first.id, third.id);
        assert_eq!(manager.get_stats().await.total_instances, 2);
    }

    #[tokio::test]
    async fn test_get_or_spawn_respects_backend_name() {
        let (manager, _server, _temp) = manager_with_backend(3).await;

        let first = manager.get_or_spawn_for_model("qwen2.5:7b", None, Some("local")).await.unwrap();
        assert_eq!(first.backend_name, "local");

        // Same model on a different backend name must not reuse
        let reused = manager.get_or_spawn_for_model("qwen2.5:7b", None, Some("local")).await.unwrap();
        assert_eq!(first.id, reused.id);
    }

    #[tokio::test]
    async fn test_terminate() {
        let (manager, _server, _temp) = manager_with_backend(2).await;
        let instance = manager.spawn(None, None, None).await.unwrap();

        assert!(manager.terminate(&instance.id).await);
        assert!(!manager.terminate(&instance.id).await);
        assert_eq!(manager.get_stats().await.total_instances, 0);
    }

    #[tokio::test]
    async fn test_scale_to() {
        let (manager, _server, _temp) = manager_with_backend(5).await;

        assert_eq!(manager.scale_to(3).await, 3);
        assert_eq!(manager.scale_to(1).await, 1);
        assert_eq!(manager.scale_to(1).await, 1);
    }

    #[tokio::test]
    async fn test_spawn_multiple_respects_cap() {
        let (manager, _server, _temp) = manager_with_backend(2).await;
        let spawned = manager.spawn_multiple(5).await;
        assert_eq!(spawned.len(), 2);
    }
}
