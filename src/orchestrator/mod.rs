//! Orchestrator - ties the queue, router, backends, and workers together

mod worker;
mod workflow;

pub use workflow::{WorkflowDoc, WorkflowReport, WorkflowTask};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use eyre::Context;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::analyzer::TaskAnalyzer;
use crate::backend::{BackendManager, BackendStatus};
use crate::config::Config;
use crate::events::{EventBus, SwarmEvent};
use crate::instances::{InstanceInfo, InstanceManager, InstanceStats};
use crate::models::LiveModelRegistry;
use crate::queue::{QueueStats, Task, TaskCallback, TaskInfo, TaskPriority, TaskQueue, TaskStatus};
use crate::router::SwarmRouter;

use worker::WorkerContext;

/// Interval between published status snapshots
const STATUS_INTERVAL: std::time::Duration = std::time::Duration::from_secs(10);

/// Everything needed to submit one task
#[derive(Default)]
pub struct TaskRequest {
    pub prompt: String,
    pub name: Option<String>,
    pub working_dir: Option<PathBuf>,
    pub priority: TaskPriority,
    pub timeout_secs: Option<u64>,
    pub instance_id: Option<String>,
    pub depends_on: Vec<String>,
    pub metadata: Map<String, Value>,
    pub callback: Option<TaskCallback>,
}

/// Orchestrator status snapshot
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub workers: usize,
    pub instances: InstanceStats,
    pub tasks: QueueStats,
    pub backends: Vec<BackendStatus>,
}

/// Coordinates the task queue, analyzer, router, backend manager, and
/// worker pool of one orchestrator process
pub struct Orchestrator {
    config: Config,
    backends: Arc<BackendManager>,
    registry: Arc<LiveModelRegistry>,
    instances: Arc<InstanceManager>,
    queue: Arc<TaskQueue>,
    analyzer: TaskAnalyzer,
    router: Arc<SwarmRouter>,
    events: Arc<EventBus>,
    running: Arc<AtomicBool>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
    status_task: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(config: Config) -> Self {
        let events = Arc::new(EventBus::with_default_capacity());
        let backends = Arc::new(BackendManager::new(config.swarm.effective_backends()));
        let registry = Arc::new(LiveModelRegistry::new(backends.clone()));
        let instances = Arc::new(InstanceManager::new(&config.swarm, backends.clone(), Some(events.clone())));
        let router = Arc::new(SwarmRouter::new(registry.clone(), backends.clone()));

        Self {
            config,
            backends,
            registry,
            instances,
            queue: Arc::new(TaskQueue::new()),
            analyzer: TaskAnalyzer::new(),
            router,
            events,
            running: Arc::new(AtomicBool::new(false)),
            workers: Arc::new(Mutex::new(Vec::new())),
            status_task: Mutex::new(None),
        }
    }

    /// Subscribe to the orchestrator's event stream
    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    /// Boot backends, spawn initial instances, and launch workers
    pub async fn start(&self, initial_instances: usize) -> eyre::Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("orchestrator already running");
            return Ok(());
        }

        info!(initial_instances, "starting orchestrator");
        self.backends.start().await;

        let spawned = self.instances.spawn_multiple(initial_instances).await;
        if spawned.len() < initial_instances {
            warn!(requested = initial_instances, spawned = spawned.len(), "not all instances started");
        }

        let worker_count = initial_instances.min(self.config.swarm.max_instances).max(1);
        self.ensure_workers(worker_count).await;

        let running = self.running.clone();
        let workers = self.workers.clone();
        let instances = self.instances.clone();
        let queue = self.queue.clone();
        let backends = self.backends.clone();
        let events = self.events.clone();
        let status_handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(STATUS_INTERVAL).await;
                let snapshot = StatusSnapshot {
                    running: running.load(Ordering::SeqCst),
                    workers: workers.lock().await.len(),
                    instances: instances.get_stats().await,
                    tasks: queue.stats(),
                    backends: backends.get_status(),
                };
                if let Ok(value) = serde_json::to_value(&snapshot) {
                    events.emit(SwarmEvent::Status { snapshot: value });
                }
            }
        });
        *self.status_task.lock().await = Some(status_handle);

        info!(workers = worker_count, backends = self.backends.get_status().len(), "orchestrator started");
        Ok(())
    }

    /// Stop workers, terminate instances, and shut down backends
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("stopping orchestrator");

        if let Some(handle) = self.status_task.lock().await.take() {
            handle.abort();
        }

        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            handle.abort();
        }
        drop(workers);

        self.instances.terminate_all().await;
        self.backends.stop().await;
        info!("orchestrator stopped");
    }

    /// Grow the worker pool to at least `count`; never shrinks.
    /// Returns the resulting worker count.
    pub async fn ensure_workers(&self, count: usize) -> usize {
        let mut workers = self.workers.lock().await;
        let current = workers.len();
        if count <= current {
            return current;
        }

        for i in current..count {
            let ctx = WorkerContext {
                running: self.running.clone(),
                queue: self.queue.clone(),
                analyzer: self.analyzer,
                router: self.router.clone(),
                instances: self.instances.clone(),
                backends: self.backends.clone(),
                events: self.events.clone(),
                auto_select: self.config.swarm.models.auto_select,
                default_kind: self.config.swarm.backend,
                preferred_models: self.config.swarm.models.preferred.clone(),
                fallback_model: self.config.swarm.models.fallback.clone(),
            };
            workers.push(tokio::spawn(worker::run(format!("worker-{}", i), ctx)));
        }

        info!(previous = current, current = workers.len(), "workers scaled");
        workers.len()
    }

    /// Submit a task to the queue; returns its id
    pub async fn submit_task(&self, request: TaskRequest) -> String {
        let mut task = Task::new(request.prompt);
        if let Some(name) = request.name {
            task.name = name;
        }
        task.working_dir = request.working_dir;
        task.priority = request.priority;
        task.timeout_secs = request.timeout_secs.unwrap_or(self.config.swarm.default_timeout_secs);
        task.instance_id = request.instance_id;
        task.depends_on = request.depends_on;
        task.metadata = request.metadata;
        task.callback = request.callback;

        let task_id = self.queue.add(task);
        info!(task_id = %task_id, "task submitted");
        task_id
    }

    /// Submit several prompts with shared settings
    pub async fn submit_batch(
        &self,
        prompts: Vec<String>,
        working_dir: Option<PathBuf>,
        priority: TaskPriority,
    ) -> Vec<String> {
        let mut task_ids = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            let id = self
                .submit_task(TaskRequest {
                    prompt,
                    working_dir: working_dir.clone(),
                    priority,
                    ..Default::default()
                })
                .await;
            task_ids.push(id);
        }
        info!(count = task_ids.len(), "batch submitted");
        task_ids
    }

    /// Parse a workflow document and submit its tasks, mapping workflow
    /// names to ids for dependency edges
    pub async fn execute_workflow(&self, yaml_doc: &str) -> eyre::Result<WorkflowReport> {
        let doc: WorkflowDoc = serde_yaml::from_str(yaml_doc).context("Failed to parse workflow document")?;
        info!(workflow = %doc.name, tasks = doc.tasks.len(), "executing workflow");

        self.instances.scale_to(doc.instances).await;

        let mut task_mapping: HashMap<String, String> = HashMap::new();
        for task_def in &doc.tasks {
            let depends_on: Vec<String> = task_def
                .depends_on
                .iter()
                .filter_map(|name| task_mapping.get(name).cloned())
                .collect();

            let mut metadata = Map::new();
            metadata.insert("workflow".to_string(), Value::String(doc.name.clone()));

            let task_id = self
                .submit_task(TaskRequest {
                    prompt: task_def.effective_prompt().to_string(),
                    name: Some(task_def.name.clone()),
                    working_dir: task_def.directory.as_ref().map(PathBuf::from),
                    instance_id: task_def.instance.clone(),
                    depends_on,
                    metadata,
                    ..Default::default()
                })
                .await;

            task_mapping.insert(task_def.name.clone(), task_id);
        }

        info!(workflow = %doc.name, tasks = task_mapping.len(), "workflow submitted");
        Ok(WorkflowReport {
            workflow_name: doc.name,
            task_ids: doc.tasks.iter().filter_map(|t| task_mapping.get(&t.name).cloned()).collect(),
            task_mapping,
        })
    }

    /// Scale the instance pool; returns the resulting size
    pub async fn scale_instances(&self, target: usize) -> usize {
        let result = self.instances.scale_to(target).await;
        info!(target, result, "scaled instances");
        result
    }

    /// Cancel a task that has not started
    pub fn cancel_task(&self, task_id: &str) -> bool {
        self.queue.cancel(task_id)
    }

    /// Full record of one task
    pub fn get_task_status(&self, task_id: &str) -> Option<TaskInfo> {
        self.queue.get(task_id).map(|t| t.info(true))
    }

    /// Task records, optionally filtered by status
    pub fn list_tasks(&self, status: Option<TaskStatus>, limit: usize) -> Vec<TaskInfo> {
        self.queue.list(status, limit)
    }

    /// Snapshots of every instance
    pub async fn list_instances(&self) -> Vec<InstanceInfo> {
        self.instances.list_instances().await
    }

    /// Live model registry handle
    pub fn model_registry(&self) -> Arc<LiveModelRegistry> {
        self.registry.clone()
    }

    /// Overall status snapshot
    pub async fn get_status(&self) -> StatusSnapshot {
        StatusSnapshot {
            running: self.running.load(Ordering::SeqCst),
            workers: self.workers.lock().await.len(),
            instances: self.instances.get_stats().await,
            tasks: self.queue.stats(),
            backends: self.backends.get_status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_submit_task_applies_defaults() {
        let orchestrator = Orchestrator::new(Config::default());

        let id = orchestrator
            .submit_task(TaskRequest {
                prompt: "Review the error handling".to_string(),
                ..Default::default()
            })
            .await;

        let info = orchestrator.get_task_status(&id).unwrap();
        assert_eq!(info.status, TaskStatus::Queued);
        assert_eq!(info.priority, TaskPriority::Normal);
        assert_eq!(info.name, "Review the error handling");
    }

    #[tokio::test]
    async fn test_submit_batch() {
        let orchestrator = Orchestrator::new(Config::default());

        let ids = orchestrator
            .submit_batch(
                vec!["first".to_string(), "second".to_string()],
                None,
                TaskPriority::High,
            )
            .await;

        assert_eq!(ids.len(), 2);
        for id in &ids {
            assert_eq!(orchestrator.get_task_status(id).unwrap().priority, TaskPriority::High);
        }
    }

    #[tokio::test]
    async fn test_execute_workflow_maps_dependencies() {
        let orchestrator = Orchestrator::new(Config::default());

        let yaml = r#"
name: pipeline
instances: 0
tasks:
  - name: first
    prompt: "step one"
  - name: second
    prompt: "step two"
    depends_on: [first]
"#;
        let report = orchestrator.execute_workflow(yaml).await.unwrap();

        assert_eq!(report.workflow_name, "pipeline");
        assert_eq!(report.task_ids.len(), 2);

        let second_id = &report.task_mapping["second"];
        let second = orchestrator.get_task_status(second_id).unwrap();
        assert_eq!(second.depends_on, vec![report.task_mapping["first"].clone()]);
        // Dependent stays pending until its dependency completes
        assert_eq!(second.status, TaskStatus::Pending);
        assert_eq!(second.metadata["workflow"], Value::String("pipeline".to_string()));
    }

    #[tokio::test]
    async fn test_execute_workflow_rejects_bad_yaml() {
        let orchestrator = Orchestrator::new(Config::default());
        assert!(orchestrator.execute_workflow("tasks: [not valid").await.is_err());
    }

    #[tokio::test]
    async fn test_cancel_task() {
        let orchestrator = Orchestrator::new(Config::default());
        let id = orchestrator
            .submit_task(TaskRequest {
                prompt: "cancel me".to_string(),
                ..Default::default()
            })
            .await;

        assert!(orchestrator.cancel_task(&id));
        assert!(!orchestrator.cancel_task(&id));
        assert_eq!(orchestrator.get_task_status(&id).unwrap().status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_status_snapshot_shape() {
        let orchestrator = Orchestrator::new(Config::default());
        let status = orchestrator.get_status().await;

        assert!(!status.running);
        assert_eq!(status.workers, 0);
        assert_eq!(status.tasks.total_tasks, 0);
        assert_eq!(status.backends.len(), 1); // synthesized local backend
    }
}
