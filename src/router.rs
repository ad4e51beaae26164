//! SwarmRouter - scores (model, backend) pairs for analyzed tasks
//!
//! Combines capability matching, quality and speed ratings, context
//! window fit, backend load, and recorded outcome history. Falls back
//! deterministically instead of refusing to route.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::analyzer::{Complexity, TaskAnalysis};
use crate::backend::BackendManager;
use crate::models::{InstalledModel, LiveModelRegistry, ModelProfile, ToolCallingQuality};

// Scoring weights; normalized to sum to 1.0 across the four axes
const CAPABILITY_WEIGHT: f64 = 0.40;
const QUALITY_WEIGHT: f64 = 0.25;
const SPEED_WEIGHT: f64 = 0.20;
const CONTEXT_WEIGHT: f64 = 0.15;

/// Outcomes kept per (model, task type)
const OUTCOME_WINDOW: usize = 100;

/// Last-resort model when nothing is installed
const HARDCODED_FALLBACK: &str = "qwen2.5:7b";

/// Result of a routing decision
#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    pub model: String,
    pub score: f64,
    pub reason: String,
    pub backend_name: Option<String>,
    pub alternatives: Vec<RoutingAlternative>,
}

/// A runner-up candidate from a routing decision
#[derive(Debug, Clone, Serialize)]
pub struct RoutingAlternative {
    pub model: String,
    pub score: f64,
    pub backend: Option<String>,
}

/// Recorded outcome of a routed task, for feedback
#[derive(Debug, Clone)]
pub struct RoutingOutcome {
    pub model: String,
    pub task_type: String,
    pub success: bool,
    pub duration_ms: f64,
    pub backend_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Aggregated outcome statistics for one (model, task type) pair
#[derive(Debug, Clone, Serialize)]
pub struct PairStats {
    pub total: usize,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
}

/// Routes tasks to the best available (model, backend) pair
pub struct SwarmRouter {
    registry: Arc<LiveModelRegistry>,
    backends: Arc<BackendManager>,
    outcomes: Mutex<HashMap<(String, String), VecDeque<RoutingOutcome>>>,
}

impl SwarmRouter {
    pub fn new(registry: Arc<LiveModelRegistry>, backends: Arc<BackendManager>) -> Self {
        Self {
            registry,
            backends,
            outcomes: Mutex::new(HashMap::new()),
        }
    }

    /// Select the best (model, backend) pair for an analyzed task
    pub async fn route(
        &self,
        analysis: &TaskAnalysis,
        prefer_speed: bool,
        preferred_models: &[String],
        fallback_model: Option<&str>,
    ) -> RoutingDecision {
        let min_quality = if analysis.complexity == Complexity::Simple {
            ToolCallingQuality::Basic
        } else {
            ToolCallingQuality::Good
        };

        let candidates = self
            .registry
            .get_best_model_for(&analysis.tags, min_quality, prefer_speed)
            .await;

        if candidates.is_empty() {
            return self.fallback_decision(analysis, fallback_model).await;
        }

        let mut scored: Vec<(f64, InstalledModel, Option<String>)> = Vec::new();
        for model in candidates {
            let Some(profile) = model.profile else {
                continue;
            };

            let mut score = score_model(profile, analysis, prefer_speed);

            if preferred_models.iter().any(|p| p == &model.name) {
                score += 20.0;
            }

            score += self.performance_adjustment(&model.name, analysis.task_type.as_str());

            let (best_backend, backend_bonus) = self.score_backends(&model.backends);
            score += backend_bonus;

            scored.push((score, model, best_backend));
        }

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let Some((best_score, best_model, best_backend)) = scored.first().cloned() else {
            return self.fallback_decision(analysis, fallback_model).await;
        };

        let alternatives = scored
            .iter()
            .skip(1)
            .take(3)
            .map(|(score, model, backend)| RoutingAlternative {
                model: model.name.clone(),
                score: round2(*score),
                backend: backend.clone(),
            })
            .collect();

        let reason = explain_choice(&best_model, analysis, best_backend.as_deref());

        RoutingDecision {
            model: best_model.name.clone(),
            score: round2(best_score),
            reason,
            backend_name: best_backend,
            alternatives,
        }
    }

    /// Record a routed task's outcome for feedback learning
    pub fn record_outcome(
        &self,
        model: &str,
        task_type: &str,
        success: bool,
        duration_ms: f64,
        backend_name: Option<&str>,
    ) {
        let mut outcomes = self.outcomes.lock().expect("outcomes lock");
        let window = outcomes
            .entry((model.to_string(), task_type.to_string()))
            .or_default();
        if window.len() >= OUTCOME_WINDOW {
            window.pop_front();
        }
        window.push_back(RoutingOutcome {
            model: model.to_string(),
            task_type: task_type.to_string(),
            success,
            duration_ms,
            backend_name: backend_name.map(|s| s.to_string()),
            timestamp: Utc::now(),
        });
        info!(model, task_type, success, backend = ?backend_name, "routing outcome recorded");
    }

    /// Per-(model, task type) outcome statistics
    pub fn get_stats(&self) -> HashMap<String, HashMap<String, PairStats>> {
        let outcomes = self.outcomes.lock().expect("outcomes lock");

        let mut stats: HashMap<String, HashMap<String, PairStats>> = HashMap::new();
        for ((model, task_type), window) in outcomes.iter() {
            if window.is_empty() {
                continue;
            }
            let successes = window.iter().filter(|o| o.success).count();
            let total_duration: f64 = window.iter().map(|o| o.duration_ms).sum();
            stats.entry(model.clone()).or_default().insert(
                task_type.clone(),
                PairStats {
                    total: window.len(),
                    success_rate: round3(successes as f64 / window.len() as f64),
                    avg_duration_ms: round1(total_duration / window.len() as f64),
                },
            );
        }
        stats
    }

    /// Success-history adjustment: needs at least 3 recorded outcomes,
    /// looks at the last 10, and shifts the score by up to +/-10
    fn performance_adjustment(&self, model: &str, task_type: &str) -> f64 {
        let outcomes = self.outcomes.lock().expect("outcomes lock");
        let Some(window) = outcomes.get(&(model.to_string(), task_type.to_string())) else {
            return 0.0;
        };
        if window.len() < 3 {
            return 0.0;
        }

        let recent: Vec<&RoutingOutcome> = window.iter().rev().take(10).collect();
        let success_rate = recent.iter().filter(|o| o.success).count() as f64 / recent.len() as f64;
        (success_rate - 0.5) * 20.0
    }

    /// Pick the best available backend among those hosting a model and
    /// compute its bonus, floored at zero
    fn score_backends(&self, backend_names: &[String]) -> (Option<String>, f64) {
        if backend_names.is_empty() {
            return (None, 0.0);
        }

        let mut best_name = None;
        let mut best_bonus = f64::MIN;

        for name in backend_names {
            let Some(status) = self.backends.snapshot(name) else {
                continue;
            };
            if !status.is_available {
                continue;
            }

            let mut bonus = status.priority as f64 * 5.0;
            bonus -= status.load_ratio * 15.0;
            if status.avg_latency_ms > 0.0 {
                if status.avg_latency_ms < 5000.0 {
                    bonus += 5.0;
                } else if status.avg_latency_ms >= 15000.0 {
                    bonus -= 5.0;
                }
            }
            let total = status.total_completed + status.total_errors;
            if total > 5 {
                let error_rate = status.total_errors as f64 / total as f64;
                bonus -= error_rate * 20.0;
            }

            if bonus > best_bonus {
                best_bonus = bonus;
                best_name = Some(name.clone());
            }
        }

        match best_name {
            Some(name) => (Some(name), best_bonus.max(0.0)),
            // Every listed backend is unavailable: report no backend
            None => (None, 0.0),
        }
    }

    /// Deterministic fallback chain: explicit fallback model, then any
    /// installed model, then a hard-coded default
    async fn fallback_decision(&self, _analysis: &TaskAnalysis, fallback_model: Option<&str>) -> RoutingDecision {
        if let Some(fallback) = fallback_model {
            let backend_name = self.backends.get_best_backend_for_model(fallback);
            return RoutingDecision {
                model: fallback.to_string(),
                score: 0.0,
                reason: "fallback (no matching models found)".to_string(),
                backend_name,
                alternatives: Vec::new(),
            };
        }

        let installed = self.registry.get_installed_models().await;
        if let Some(first) = installed.first() {
            let (backend_name, _) = self.score_backends(&first.backends);
            return RoutingDecision {
                model: first.name.clone(),
                score: 0.0,
                reason: "default (no matching models)".to_string(),
                backend_name,
                alternatives: Vec::new(),
            };
        }

        RoutingDecision {
            model: HARDCODED_FALLBACK.to_string(),
            score: 0.0,
            reason: "hardcoded fallback (no models found)".to_string(),
            backend_name: None,
            alternatives: Vec::new(),
        }
    }
}

/// Score a model profile against a task analysis
fn score_model(profile: &ModelProfile, analysis: &TaskAnalysis, prefer_speed: bool) -> f64 {
    let mut score = 0.0;

    // Capability match: fraction of the task's tags the model covers
    if !profile.task_tags.is_empty() && !analysis.tags.is_empty() {
        let matching = analysis
            .tags
            .iter()
            .filter(|tag| profile.task_tags.contains(&tag.as_str()))
            .count();
        let total = analysis.tags.len().max(1);
        score += (matching as f64 / total as f64) * 100.0 * CAPABILITY_WEIGHT;
    }

    score += profile.quality_rating as f64 * 10.0 * QUALITY_WEIGHT;

    let speed_mult = SPEED_WEIGHT * if prefer_speed { 2.0 } else { 1.0 };
    score += profile.speed_rating as f64 * 10.0 * speed_mult;

    // Context window fit matters only for complex tasks
    if analysis.complexity == Complexity::Complex {
        if profile.context_window >= 32_768 {
            score += 100.0 * CONTEXT_WEIGHT;
        } else if profile.context_window >= 16_384 {
            score += 50.0 * CONTEXT_WEIGHT;
        }
    } else {
        score += 50.0 * CONTEXT_WEIGHT;
    }

    score += profile.tool_calling.routing_bonus();

    // Complexity-quality alignment
    if analysis.complexity == Complexity::Complex && profile.quality_rating >= 8 {
        score += 10.0;
    }
    if analysis.complexity == Complexity::Simple && profile.speed_rating >= 8 {
        score += 10.0;
    }

    score
}

/// Human-readable explanation of the routing decision
fn explain_choice(model: &InstalledModel, analysis: &TaskAnalysis, backend_name: Option<&str>) -> String {
    let Some(profile) = model.profile else {
        return format!("selected {} (no profile)", model.name);
    };

    let mut parts = vec![format!("{} tool calling", profile.tool_calling)];

    let matching: Vec<&str> = analysis
        .tags
        .iter()
        .filter(|tag| profile.task_tags.contains(&tag.as_str()))
        .map(|tag| tag.as_str())
        .collect();
    if !matching.is_empty() {
        parts.push(format!("matches tags: {}", matching.join(", ")));
    }

    parts.push(format!("quality={}/10", profile.quality_rating));
    parts.push(format!("speed={}/10", profile.speed_rating));
    if let Some(backend) = backend_name {
        parts.push(format!("backend={}", backend));
    }
    parts.join("; ")
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
