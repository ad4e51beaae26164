//! TaskQueue - priority and dependency aware task scheduling

use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info};

use super::task::{Task, TaskInfo, TaskOutcome, TaskPriority, TaskResult, TaskStatus};

/// Heap entry for a ready task: highest priority first, FIFO within a
/// priority via the insertion sequence number
#[derive(Debug, Clone, PartialEq, Eq)]
struct ReadyEntry {
    priority: TaskPriority,
    seq: u64,
    id: String,
}

impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

struct QueueInner {
    tasks: HashMap<String, Task>,
    ready: BinaryHeap<ReadyEntry>,
    completed: HashSet<String>,
    next_seq: u64,
}

/// Queue statistics snapshot
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub total_tasks: usize,
    pub queued: usize,
    pub completed: usize,
    pub by_status: HashMap<String, usize>,
}

/// Manages task queueing, dependency unblocking, and status tracking
///
/// A task whose dependency failed or was cancelled stays pending
/// forever; failures do not cascade to dependents.
pub struct TaskQueue {
    inner: Mutex<QueueInner>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                tasks: HashMap::new(),
                ready: BinaryHeap::new(),
                completed: HashSet::new(),
                next_seq: 0,
            }),
        }
    }

    /// Add a task; it becomes queued immediately when its dependencies
    /// are all completed, pending otherwise. Returns the task id.
    pub fn add(&self, mut task: Task) -> String {
        let mut inner = self.inner.lock().expect("queue lock");

        let deps_met = task.depends_on.iter().all(|dep| inner.completed.contains(dep));
        if deps_met {
            task.status = TaskStatus::Queued;
            let entry = ReadyEntry {
                priority: task.priority,
                seq: inner.next_seq,
                id: task.id.clone(),
            };
            inner.next_seq += 1;
            inner.ready.push(entry);
            info!(task_id = %task.id, name = %task.name, "task queued");
        } else {
            task.status = TaskStatus::Pending;
            info!(task_id = %task.id, depends_on = ?task.depends_on, "task pending on dependencies");
        }

        let id = task.id.clone();
        inner.tasks.insert(id.clone(), task);
        id
    }

    /// Non-blocking fetch of the next ready task; marks it running.
    ///
    /// A task is handed out at most once per queued offer: stale heap
    /// entries for tasks that were cancelled or re-queued are skipped.
    pub fn next(&self) -> Option<Task> {
        let mut inner = self.inner.lock().expect("queue lock");

        while let Some(entry) = inner.ready.pop() {
            let Some(task) = inner.tasks.get_mut(&entry.id) else {
                continue;
            };
            if task.status != TaskStatus::Queued {
                continue;
            }
            task.status = TaskStatus::Running;
            task.started_at = Some(Utc::now());
            info!(task_id = %task.id, name = %task.name, "task started");
            return Some(task.clone());
        }
        None
    }

    /// Put a running task back into the ready queue (no worker could
    /// take it: no idle instance, backend saturated)
    pub fn requeue(&self, task_id: &str) {
        let mut inner = self.inner.lock().expect("queue lock");

        let Some(task) = inner.tasks.get_mut(task_id) else {
            return;
        };
        if task.status.is_terminal() {
            return;
        }
        task.status = TaskStatus::Queued;
        task.started_at = None;
        let entry = ReadyEntry {
            priority: task.priority,
            seq: inner.next_seq,
            id: task_id.to_string(),
        };
        inner.next_seq += 1;
        inner.ready.push(entry);
        debug!(task_id, "task requeued");
    }

    /// Mark a task completed, store its result, and promote any pending
    /// tasks whose dependencies are now all satisfied
    pub fn complete(&self, task_id: &str, result: TaskResult) {
        let mut inner = self.inner.lock().expect("queue lock");

        let Some(task) = inner.tasks.get_mut(task_id) else {
            return;
        };
        task.status = TaskStatus::Completed;
        task.completed_at = Some(Utc::now());
        task.result = Some(result);
        info!(task_id, name = %task.name, "task completed");

        if let Some(callback) = task.callback.clone() {
            let result_ref = task.result.as_ref().expect("result just stored");
            if let Err(e) = callback(&TaskOutcome::Completed(result_ref)) {
                error!(task_id, error = %e, "task callback failed");
            }
        }

        inner.completed.insert(task_id.to_string());
        self.promote_unblocked(&mut inner);
    }

    /// Mark a task failed. Dependents stay pending forever.
    pub fn fail(&self, task_id: &str, error: impl Into<String>) {
        let mut inner = self.inner.lock().expect("queue lock");

        let Some(task) = inner.tasks.get_mut(task_id) else {
            return;
        };
        let error = error.into();
        task.status = TaskStatus::Failed;
        task.completed_at = Some(Utc::now());
        task.error = Some(error.clone());
        error!(task_id, name = %task.name, %error, "task failed");

        if let Some(callback) = task.callback.clone()
            && let Err(e) = callback(&TaskOutcome::Failed(&error))
        {
            error!(task_id, error = %e, "task callback failed");
        }
    }

    /// Cancel a task that has not started yet. Returns false for
    /// running, terminal, or unknown tasks.
    pub fn cancel(&self, task_id: &str) -> bool {
        let mut inner = self.inner.lock().expect("queue lock");

        let Some(task) = inner.tasks.get_mut(task_id) else {
            return false;
        };
        if matches!(task.status, TaskStatus::Pending | TaskStatus::Queued) {
            task.status = TaskStatus::Cancelled;
            info!(task_id, name = %task.name, "task cancelled");
            return true;
        }
        false
    }

    /// Get a task by id
    pub fn get(&self, task_id: &str) -> Option<Task> {
        let inner = self.inner.lock().expect("queue lock");
        inner.tasks.get(task_id).cloned()
    }

    /// List task records, optionally filtered by status, sorted by
    /// priority then creation time, newest first
    pub fn list(&self, status: Option<TaskStatus>, limit: usize) -> Vec<TaskInfo> {
        let inner = self.inner.lock().expect("queue lock");

        let mut tasks: Vec<&Task> = inner
            .tasks
            .values()
            .filter(|t| status.is_none_or(|s| t.status == s))
            .collect();
        tasks.sort_by(|a, b| (b.priority, b.created_at).cmp(&(a.priority, a.created_at)));
        tasks.into_iter().take(limit).map(|t| t.info(false)).collect()
    }

    /// Queue statistics
    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock().expect("queue lock");

        let mut by_status: HashMap<String, usize> = HashMap::new();
        let mut queued = 0;
        for task in inner.tasks.values() {
            *by_status.entry(task.status.to_string()).or_insert(0) += 1;
            if task.status == TaskStatus::Queued {
                queued += 1;
            }
        }

        QueueStats {
            total_tasks: inner.tasks.len(),
            queued,
            completed: inner.completed.len(),
            by_status,
        }
    }

    /// Remove completed tasks from memory; returns how many were dropped
    pub fn clear_completed(&self) -> usize {
        let mut inner = self.inner.lock().expect("queue lock");
        let before = inner.tasks.len();
        inner.tasks.retain(|_, t| t.status != TaskStatus::Completed);
        before - inner.tasks.len()
    }

    fn promote_unblocked(&self, inner: &mut QueueInner) {
        let promotable: Vec<(String, TaskPriority)> = inner
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .filter(|t| t.depends_on.iter().all(|dep| inner.completed.contains(dep)))
            .map(|t| (t.id.clone(), t.priority))
            .collect();

        for (id, priority) in promotable {
            if let Some(task) = inner.tasks.get_mut(&id) {
                task.status = TaskStatus::Queued;
            }
            let entry = ReadyEntry {
                priority,
                seq: inner.next_seq,
                id: id.clone(),
            };
            inner.next_seq += 1;
            inner.ready.push(entry);
            info!(task_id = %id, "task queued after dependency completed");
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::task::UsageStats;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn result_for(model: &str) -> TaskResult {
        TaskResult {
            output: "ok".to_string(),
            backend_name: "local".to_string(),
            model: model.to_string(),
            usage: UsageStats::default(),
            tool_calls: vec![],
            iterations: 1,
        }
    }

    #[test]
    fn test_add_and_next() {
        let queue = TaskQueue::new();
        let id = queue.add(Task::new("do something"));

        let task = queue.next().expect("task ready");
        assert_eq!(task.id, id);
        assert_eq!(task.status, TaskStatus::Running);
        assert!(task.started_at.is_some());

        // Never handed out twice
        assert!(queue.next().is_none());
    }

    #[test]
    fn test_priority_ordering_with_fifo_ties() {
        let queue = TaskQueue::new();

        let mut low = Task::new("low");
        low.priority = TaskPriority::Low;
        let mut first_normal = Task::new("first normal");
        first_normal.priority = TaskPriority::Normal;
        let mut second_normal = Task::new("second normal");
        second_normal.priority = TaskPriority::Normal;
        let mut critical = Task::new("critical");
        critical.priority = TaskPriority::Critical;

        queue.add(low);
        let first_id = queue.add(first_normal);
        let second_id = queue.add(second_normal);
        queue.add(critical);

        assert_eq!(queue.next().unwrap().name, "critical");
        assert_eq!(queue.next().unwrap().id, first_id);
        assert_eq!(queue.next().unwrap().id, second_id);
        assert_eq!(queue.next().unwrap().name, "low");
    }

    #[test]
    fn test_dependencies_gate_queueing() {
        let queue = TaskQueue::new();

        let a = Task::new("a");
        let a_id = a.id.clone();
        let b = Task::new("b");
        let b_id = b.id.clone();
        let mut c = Task::new("c");
        c.depends_on = vec![a_id.clone(), b_id.clone()];
        let c_id = c.id.clone();

        queue.add(a);
        queue.add(b);
        queue.add(c);

        assert_eq!(queue.get(&c_id).unwrap().status, TaskStatus::Pending);

        // Drain a and b, complete them
        let first = queue.next().unwrap();
        let second = queue.next().unwrap();
        assert!(queue.next().is_none(), "c must not be ready yet");

        queue.complete(&first.id, result_for("m"));
        assert_eq!(queue.get(&c_id).unwrap().status, TaskStatus::Pending);

        queue.complete(&second.id, result_for("m"));
        assert_eq!(queue.get(&c_id).unwrap().status, TaskStatus::Queued);
        assert_eq!(queue.next().unwrap().id, c_id);
    }

    #[test]
    fn test_failed_dependency_blocks_dependent_forever() {
        let queue = TaskQueue::new();

        let a = Task::new("a");
        let a_id = a.id.clone();
        let mut b = Task::new("b");
        b.depends_on = vec![a_id.clone()];
        let b_id = b.id.clone();

        queue.add(a);
        queue.add(b);

        let a_task = queue.next().unwrap();
        queue.fail(&a_task.id, "exploded");

        assert_eq!(queue.get(&b_id).unwrap().status, TaskStatus::Pending);
        assert!(queue.next().is_none());
    }

    #[test]
    fn test_cancelled_dependency_blocks_dependent_forever() {
        let queue = TaskQueue::new();

        let mut a = Task::new("a");
        a.depends_on = vec!["missing".to_string()];
        let a_id = a.id.clone();
        let mut b = Task::new("b");
        b.depends_on = vec![a_id.clone()];
        let b_id = b.id.clone();

        queue.add(a);
        queue.add(b);
        assert!(queue.cancel(&a_id));

        assert_eq!(queue.get(&b_id).unwrap().status, TaskStatus::Pending);
        assert!(queue.next().is_none());
    }

    #[test]
    fn test_cancel_idempotence() {
        let queue = TaskQueue::new();
        let id = queue.add(Task::new("cancel me"));

        assert!(queue.cancel(&id));
        assert!(!queue.cancel(&id));
        assert_eq!(queue.get(&id).unwrap().status, TaskStatus::Cancelled);
    }

    #[test]
    fn test_cancel_running_task_refused() {
        let queue = TaskQueue::new();
        let id = queue.add(Task::new("busy"));
        queue.next().unwrap();

        assert!(!queue.cancel(&id));
        assert_eq!(queue.get(&id).unwrap().status, TaskStatus::Running);
    }

    #[test]
    fn test_cancelled_task_skipped_by_next() {
        let queue = TaskQueue::new();
        let id = queue.add(Task::new("cancel me"));
        let other = queue.add(Task::new("keep me"));

        assert!(queue.cancel(&id));
        assert_eq!(queue.next().unwrap().id, other);
        assert!(queue.next().is_none());
    }

    #[test]
    fn test_requeue() {
        let queue = TaskQueue::new();
        let id = queue.add(Task::new("bounce"));

        let task = queue.next().unwrap();
        queue.requeue(&task.id);

        assert_eq!(queue.get(&id).unwrap().status, TaskStatus::Queued);
        assert_eq!(queue.next().unwrap().id, id);
    }

    #[test]
    fn test_completion_callback_fires_after_commit() {
        let queue = TaskQueue::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let mut task = Task::new("with callback");
        task.callback = Some(Arc::new(move |outcome| {
            assert!(matches!(outcome, TaskOutcome::Completed(_)));
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        let id = queue.add(task);

        queue.next().unwrap();
        queue.complete(&id, result_for("m"));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(queue.get(&id).unwrap().status, TaskStatus::Completed);
    }

    #[test]
    fn test_callback_error_is_swallowed() {
        let queue = TaskQueue::new();

        let mut task = Task::new("with failing callback");
        task.callback = Some(Arc::new(|_| Err(eyre::eyre!("callback blew up"))));
        let id = queue.add(task);

        queue.next().unwrap();
        queue.complete(&id, result_for("m"));

        assert_eq!(queue.get(&id).unwrap().status, TaskStatus::Completed);
    }

    #[test]
    fn test_unknown_ids_are_noops() {
        let queue = TaskQueue::new();
        queue.complete("ghost", result_for("m"));
        queue.fail("ghost", "nope");
        queue.requeue("ghost");
        assert!(!queue.cancel("ghost"));
        assert!(queue.get("ghost").is_none());
    }

    #[test]
    fn test_stats_and_list() {
        let queue = TaskQueue::new();
        let a = queue.add(Task::new("a"));
        queue.add(Task::new("b"));

        let running = queue.next().unwrap();
        assert_eq!(running.id, a);
        queue.complete(&a, result_for("m"));

        let stats = queue.stats();
        assert_eq!(stats.total_tasks, 2);
        assert_eq!(stats.queued, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.by_status.get("completed"), Some(&1));

        let completed = queue.list(Some(TaskStatus::Completed), 10);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, a);
    }

    #[test]
    fn test_clear_completed() {
        let queue = TaskQueue::new();
        let a = queue.add(Task::new("a"));
        queue.add(Task::new("b"));

        queue.next().unwrap();
        queue.complete(&a, result_for("m"));

        assert_eq!(queue.clear_completed(), 1);
        assert!(queue.get(&a).is_none());
        assert_eq!(queue.stats().total_tasks, 1);
    }

    #[test]
    fn test_started_at_before_completed_at() {
        let queue = TaskQueue::new();
        let id = queue.add(Task::new("timed"));
        queue.next().unwrap();
        queue.complete(&id, result_for("m"));

        let task = queue.get(&id).unwrap();
        assert!(task.started_at.unwrap() <= task.completed_at.unwrap());
    }
}
