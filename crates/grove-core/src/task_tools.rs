// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Tools that operate on the task tree itself.  They live here rather than
//! in grove-tools because they need the launcher, the probe, and the
//! gateway.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use grove_config::Config;
use grove_model::{BedrockClient, Message};
use grove_store::StateStore;
use grove_tools::Tool;

use crate::gateway::{Gateway, GatewayOutcome, ThrottleTracker};
use crate::{conversation, launcher, probe};

fn require_str<'a>(input: &'a Value, field: &str) -> anyhow::Result<&'a str> {
    input
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("missing required argument '{field}'"))
}

// ─── spawn_task ───────────────────────────────────────────────────────────────

/// Spawn a child task (or resume one), wiring it into the caller's subtree.
///
/// By default the child's first queued message is a transcription of the
/// caller's conversation so far, making spawn a branch point; the actual
/// mandate follows as a second message.
pub struct SpawnTaskTool {
    store: StateStore,
    config: Arc<Config>,
    client: Arc<BedrockClient>,
}

impl SpawnTaskTool {
    pub fn new(store: StateStore, config: Arc<Config>, client: Arc<BedrockClient>) -> Self {
        Self {
            store,
            config,
            client,
        }
    }

    fn context(&self) -> crate::TaskContext {
        // Children launched from a tool never execute tools in-process, so
        // an empty registry is correct here; the spawned process builds its
        // own full registry from its task record.
        crate::TaskContext {
            store: self.store.clone(),
            config: self.config.clone(),
            client: self.client.clone(),
            tools: Arc::new(grove_tools::ToolRegistry::new()),
        }
    }
}

#[async_trait]
impl Tool for SpawnTaskTool {
    fn name(&self) -> &str {
        "spawn_task"
    }

    fn description(&self) -> &str {
        "Spawn a child task with initial message, or resume existing task with new message. \
         By default, the child inherits the full conversation history from the parent \
         (creating a branch point). Returns task_id and pid for monitoring."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "base_name": {"type": "string", "description": "Base name for new task (1-3 words describing the task, e.g., 'analyze data', 'fetch results'). Required when creating new task."},
                "initial_message": {"type": "string", "description": "Initial user message for the child task"},
                "task_id": {"type": "string", "description": "Optional: existing task_id to resume conversation. If provided, base_name is ignored."},
                "model": {"type": "string", "description": "Model short name (default: from config)"},
                "zero_context": {"type": "boolean", "description": "If true, spawn child WITHOUT parent's conversation history (default: false). Requires a very detailed initial_message since the child will have no context."}
            },
            "required": ["initial_message"]
        })
    }

    async fn invoke(&self, input: &Value, task_id: &str) -> anyhow::Result<Value> {
        let initial_message = require_str(input, "initial_message")?;
        let child_task_id = input.get("task_id").and_then(Value::as_str);
        let base_name = input.get("base_name").and_then(Value::as_str);
        let model = input
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(&self.config.model.default_model);
        let zero_context = input
            .get("zero_context")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if child_task_id.is_none() && base_name.is_none() {
            return Ok(json!({
                "success": false,
                "error": "base_name is required when creating a new child task (1-3 words describing the task)",
            }));
        }

        let mut messages = Vec::new();
        if !zero_context {
            let transcript = conversation::transcribe_task(&self.store, task_id, false).await;
            messages.push(format!(
                "[SYSTEM] The following is a transcription of your parent task's conversation \
                 history. Use it to understand the context of the task:\n\n{transcript}\n\n\
                 [SYSTEM] Given the context above, you are now ready to begin your task:"
            ));
        }
        messages.push(initial_message.to_string());

        let resuming = child_task_id.is_some();
        let outcome = launcher::launch(
            &self.context(),
            launcher::LaunchRequest {
                task_id: child_task_id.map(str::to_string),
                initial_messages: messages,
                parent_task_id: Some(task_id.to_string()),
                base_name: base_name.map(str::to_string),
                ..launcher::LaunchRequest::with_model(model)
            },
        )
        .await;

        let outcome = match outcome {
            Ok(o) => o,
            Err(e @ launcher::LaunchError::MissingBaseName)
            | Err(e @ launcher::LaunchError::UnknownModel(_)) => {
                return Ok(json!({"success": false, "error": e.to_string()}));
            }
            Err(e) => return Err(e.into()),
        };

        self.store.add_child(task_id, &outcome.task_id).await?;

        let action = if resuming { "Resumed" } else { "Spawned" };
        Ok(json!({
            "success": true,
            "task_id": outcome.task_id,
            "pid": outcome.pid,
            "message": format!("{action} child task {} (PID {:?})", outcome.task_id, outcome.pid),
        }))
    }
}

// ─── query_task ───────────────────────────────────────────────────────────────

/// Passively inspect another task: probe its status, transcribe its
/// conversation, and have a one-shot tool-free model call answer a question
/// about it.
pub struct QueryTaskTool {
    store: StateStore,
    config: Arc<Config>,
    client: Arc<BedrockClient>,
}

impl QueryTaskTool {
    pub fn new(store: StateStore, config: Arc<Config>, client: Arc<BedrockClient>) -> Self {
        Self {
            store,
            config,
            client,
        }
    }
}

#[async_trait]
impl Tool for QueryTaskTool {
    fn name(&self) -> &str {
        "query_task"
    }

    fn description(&self) -> &str {
        "Ask a question about a task's conversation history and current status"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_id": {"type": "string", "description": "The task ID to query"},
                "question": {"type": "string", "description": "The question to ask about the task"},
                "model": {"type": "string", "description": "Model short name to use (default: from config)"}
            },
            "required": ["task_id", "question"]
        })
    }

    async fn invoke(&self, input: &Value, task_id: &str) -> anyhow::Result<Value> {
        let target_task_id = require_str(input, "task_id")?;
        let question = require_str(input, "question")?;
        let model = input
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(&self.config.model.default_model);

        if self.store.task_record(target_task_id).await?.is_none() {
            return Ok(json!({"error": format!("Task {target_task_id} not found")}));
        }

        let activity = probe::check(&self.store, target_task_id).await;
        let status = if activity.alive { "running" } else { "stopped" };
        let transcript = conversation::transcribe_task(&self.store, target_task_id, true).await;

        let prompt = format!(
            "You are analyzing a task's conversation history and status.\n\n\
             Task ID: {target_task_id}\n\
             Current Status: {status}\n\
             PID: {:?}\n\
             CPU Usage: {:.1}%\n\n\
             Conversation Transcript:\n{transcript}\n\n\
             Question: {question}\n\n\
             Please answer the question based on the conversation transcript and task status above.",
            activity.pid,
            activity.cpu_percent.unwrap_or(0.0),
        );

        let catalog = self.store.model_catalog().await?;
        let model_name = catalog
            .resolve(model)
            .ok_or_else(|| anyhow::anyhow!("unknown model short name '{model}'"))?
            .to_string();

        debug!(target = target_task_id, model = %model_name, "query_task model call");
        let gateway = Gateway::new(self.store.clone(), self.client.clone());
        // Fresh pacing state: this one-shot call is throttled like a first
        // request, independent of the engine's tracker.
        let mut throttle = ThrottleTracker::default();
        let outcome = gateway
            .invoke(
                &mut throttle,
                &model_name,
                &[Message::user(prompt)],
                "You are a helpful assistant analyzing task conversations.",
                None,
                task_id,
            )
            .await?;

        let answer = match outcome {
            GatewayOutcome::Response(response) => response
                .output
                .message
                .first_text()
                .unwrap_or_default()
                .to_string(),
            GatewayOutcome::Interrupted => {
                anyhow::bail!("query interrupted: calling task is no longer alive")
            }
        };

        Ok(json!({
            "task_id": target_task_id,
            "status": status,
            "question": question,
            "answer": answer,
            "model_used": model,
        }))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_str_names_the_missing_field() {
        let err = require_str(&json!({}), "question").unwrap_err();
        assert!(err.to_string().contains("question"));
        assert_eq!(require_str(&json!({"q": "x"}), "q").unwrap(), "x");
    }
}
