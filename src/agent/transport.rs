//! Chat transport - the injected send primitive for agent loops
//!
//! The agent loop is backend-agnostic: it hands a message list and
//! optional tool schemas to a `ChatTransport` and gets back the raw
//! response value in whatever dialect the backend speaks.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::SwarmError;
use crate::events::{EventBus, SwarmEvent};
use crate::queue::UsageStats;

/// Backend send primitive: ordered chat messages plus optional tool
/// schemas in, dialect-shaped response out
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, messages: &[Value], tools: Option<&Value>) -> Result<Value, SwarmError>;
}

/// Chat transport for Ollama's /api/chat endpoint
///
/// Reuses one HTTP connection pool across iterations, accumulates usage
/// counters, and publishes assistant text as token events.
pub struct OllamaChatTransport {
    client: reqwest::Client,
    url: String,
    model: String,
    timeout: Duration,
    native_tools: bool,
    usage: Mutex<UsageStats>,
    stream_buffer: Arc<Mutex<String>>,
    events: Option<Arc<EventBus>>,
    task_id: String,
    instance_id: String,
}

impl OllamaChatTransport {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
        native_tools: bool,
        stream_buffer: Arc<Mutex<String>>,
        events: Option<Arc<EventBus>>,
        task_id: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            model: model.into(),
            timeout,
            native_tools,
            usage: Mutex::new(UsageStats::default()),
            stream_buffer,
            events,
            task_id: task_id.into(),
            instance_id: instance_id.into(),
        }
    }

    /// Usage counters accumulated across every send so far
    pub fn usage(&self) -> UsageStats {
        self.usage.lock().expect("usage lock").clone()
    }
}

#[async_trait]
impl ChatTransport for OllamaChatTransport {
    async fn send(&self, messages: &[Value], tools: Option<&Value>) -> Result<Value, SwarmError> {
        let mut payload = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": 0.1,
                "num_predict": 4096,
                "num_ctx": 16384,
            },
        });
        if let Some(tools) = tools
            && self.native_tools
        {
            payload["tools"] = tools.clone();
        }

        let response = self
            .client
            .post(format!("{}/api/chat", self.url))
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SwarmError::Timeout(self.timeout.as_secs())
                } else {
                    SwarmError::Network(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(SwarmError::Backend {
                status,
                message: text.chars().take(200).collect(),
            });
        }

        let data: Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                SwarmError::Timeout(self.timeout.as_secs())
            } else {
                SwarmError::Network(e)
            }
        })?;

        {
            let mut usage = self.usage.lock().expect("usage lock");
            usage.input_tokens += data["prompt_eval_count"].as_u64().unwrap_or(0);
            usage.output_tokens += data["eval_count"].as_u64().unwrap_or(0);
            // total_duration is reported in nanoseconds
            usage.total_duration_ms += data["total_duration"].as_u64().unwrap_or(0) as f64 / 1_000_000.0;
        }

        if let Some(content) = data["message"]["content"].as_str()
            && !content.is_empty()
        {
            *self.stream_buffer.lock().expect("stream buffer lock") = content.to_string();
            if let Some(events) = &self.events {
                events.emit(SwarmEvent::Token {
                    task_id: self.task_id.clone(),
                    instance_id: self.instance_id.clone(),
                    text: content.to_string(),
                });
            }
        }

        Ok(data)
    }
}
