//! Worker loop - dequeue, analyze, route, execute, record

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tracing::{info, warn};

use crate::analyzer::{TaskAnalysis, TaskAnalyzer};
use crate::backend::BackendManager;
use crate::config::BackendKind;
use crate::events::{EventBus, SwarmEvent};
use crate::instances::{AgentCommand, AgentInstance, ExecStatus, InstanceManager};
use crate::queue::{Task, TaskQueue, TaskResult};
use crate::router::{RoutingDecision, SwarmRouter};

/// Sleep when the queue is empty
const IDLE_BACKOFF: Duration = Duration::from_millis(500);

/// Sleep after a requeue (no instance, saturated backend)
const REQUEUE_BACKOFF: Duration = Duration::from_secs(1);

/// Shared handles a worker needs, cloned per worker task
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub running: Arc<AtomicBool>,
    pub queue: Arc<TaskQueue>,
    pub analyzer: TaskAnalyzer,
    pub router: Arc<SwarmRouter>,
    pub instances: Arc<InstanceManager>,
    pub backends: Arc<BackendManager>,
    pub events: Arc<EventBus>,
    pub auto_select: bool,
    pub default_kind: BackendKind,
    pub preferred_models: Vec<String>,
    pub fallback_model: String,
}

/// Run one worker until the orchestrator stops
pub(crate) async fn run(worker_id: String, ctx: WorkerContext) {
    info!(worker_id, "worker started");

    while ctx.running.load(Ordering::SeqCst) {
        let Some(task) = ctx.queue.next() else {
            tokio::time::sleep(IDLE_BACKOFF).await;
            continue;
        };

        info!(worker_id, task_id = %task.id, "worker processing task");
        process_task(&worker_id, &ctx, task).await;
    }

    info!(worker_id, "worker stopped");
}

async fn process_task(worker_id: &str, ctx: &WorkerContext, task: Task) {
    // Analysis and routing apply to unpinned tasks on routable backends
    let use_routing = ctx.auto_select && ctx.default_kind == BackendKind::Ollama && task.instance_id.is_none();

    let mut analysis: Option<TaskAnalysis> = None;
    let mut decision: Option<RoutingDecision> = None;

    if use_routing {
        let analyzed = ctx.analyzer.analyze(&task.prompt, None);

        // Per-task preferred model goes to the front of the list
        let mut preferred = ctx.preferred_models.clone();
        if let Some(meta_preferred) = task.metadata.get("preferred_model").and_then(|v| v.as_str())
            && !preferred.iter().any(|p| p == meta_preferred)
        {
            preferred.insert(0, meta_preferred.to_string());
        }
        let prefer_speed = task
            .metadata
            .get("prefer_speed")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let routed = ctx
            .router
            .route(&analyzed, prefer_speed, &preferred, Some(&ctx.fallback_model))
            .await;
        info!(task_id = %task.id, model = %routed.model, backend = ?routed.backend_name,
              score = routed.score, reason = %routed.reason, "task routed");

        analysis = Some(analyzed);
        decision = Some(routed);
    }

    // Resolve an instance: pinned id, routed (model, backend), or any idle
    let mut instance: Option<Arc<AgentInstance>> = None;
    if let Some(pinned) = &task.instance_id {
        instance = ctx.instances.get(pinned).await;
    } else if let Some(routed) = &decision {
        instance = ctx
            .instances
            .get_or_spawn_for_model(&routed.model, task.working_dir.clone(), routed.backend_name.as_deref())
            .await;
    }
    if instance.is_none() {
        instance = ctx.instances.get_idle().await;
    }
    let Some(instance) = instance else {
        ctx.queue.requeue(&task.id);
        tokio::time::sleep(REQUEUE_BACKOFF).await;
        return;
    };

    // Claim a backend slot before executing
    let backend_name = instance.backend_name.clone();
    if !ctx.backends.acquire(&backend_name) {
        warn!(worker_id, task_id = %task.id, backend = %backend_name, "backend saturated, requeueing");
        ctx.queue.requeue(&task.id);
        tokio::time::sleep(REQUEUE_BACKOFF).await;
        return;
    }

    let mut metadata = task.metadata.clone();
    metadata.insert("task_id".to_string(), json!(task.id));
    if let Some(analysis) = &analysis {
        metadata.insert("task_type".to_string(), json!(analysis.task_type.as_str()));
        metadata.insert("complexity".to_string(), json!(analysis.complexity.as_str()));
    }
    if let Some(routed) = &decision {
        metadata.insert("routed_model".to_string(), json!(routed.model));
        metadata.insert("routing_score".to_string(), json!(routed.score));
        metadata.insert("routed_backend".to_string(), json!(routed.backend_name));
    }

    let command = AgentCommand {
        prompt: task.prompt.clone(),
        working_dir: task.working_dir.clone(),
        timeout_secs: task.timeout_secs,
        metadata,
    };

    let t0 = Instant::now();
    let report = instance.execute(command).await;
    let duration_ms = t0.elapsed().as_secs_f64() * 1000.0;

    let succeeded = report.status == ExecStatus::Completed;
    let final_status: Value;

    if succeeded {
        let result = TaskResult {
            output: report.output,
            backend_name: report.backend_name,
            model: report.model.clone(),
            usage: report.usage,
            tool_calls: report.tool_calls,
            iterations: report.iterations,
        };
        ctx.queue.complete(&task.id, result);
        ctx.backends.release(&backend_name, true, duration_ms, None);
        final_status = json!("completed");
    } else {
        let error = report.error.unwrap_or_else(|| "Unknown backend error".to_string());
        warn!(task_id = %task.id, %error, "task execution failed");
        ctx.queue.fail(&task.id, error.clone());
        ctx.backends.release(&backend_name, false, duration_ms, Some(error));
        final_status = json!("failed");
    }

    // Completion event fires after the result is committed
    ctx.events.emit(SwarmEvent::TaskDone {
        task_id: task.id.clone(),
        status: final_status.as_str().unwrap_or_default().to_string(),
    });

    if let (Some(routed), Some(analysis)) = (&decision, &analysis) {
        ctx.router.record_outcome(
            &routed.model,
            analysis.task_type.as_str(),
            succeeded,
            duration_ms,
            Some(&backend_name),
        );
    }
}
