// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Persistent record types: what actually lives under each key.

use serde::{Deserialize, Serialize};

use grove_model::{ContentBlock, Role, TokenUsage};

// ─── Task record (`task_data:{id}`) ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Stopped,
}

/// Configuration and liveness of one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub parent_task_id: Option<String>,
    /// Concrete Bedrock identifier (already resolved through the catalog).
    pub model_name: String,
    pub static_system_prompt: String,
    pub enable_recursion: bool,
    pub created_at: f64,
    pub process_started_at: f64,
    pub status: TaskStatus,
    #[serde(default)]
    pub pid: Option<u32>,
    /// Usage reported by the most recent completion; `{}` on a fresh task.
    #[serde(default)]
    pub last_usage: TokenUsage,
    #[serde(default)]
    pub children: Vec<String>,
    pub max_iterations: u32,
    /// Exact launch command, recorded so a stopped task can be restarted.
    pub command: String,
}

impl TaskRecord {
    pub fn is_root(&self) -> bool {
        self.parent_task_id.is_none()
    }
}

// ─── Conversation log (`task:{id}`) ───────────────────────────────────────────

/// One turn: a contiguous run of alternating messages ending in a terminal
/// assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub turn_number: u64,
    pub started_at: f64,
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_summary: Option<String>,
}

impl Turn {
    pub fn new(turn_number: u64, started_at: f64) -> Self {
        Self {
            turn_number,
            started_at,
            messages: Vec::new(),
            turn_summary: None,
        }
    }
}

/// A message as persisted in the log: Converse wire content plus the
/// per-turn numbering and a timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub message_number: u64,
    pub timestamp: f64,
}

// ─── Message queue (`task_queue:{id}`) ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    User,
    ToolResult,
    Completion,
}

/// Queue payload: plain text for `user`/`completion` envelopes, a full
/// `toolResult` content block for `tool_result` envelopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvelopeContent {
    Text(String),
    Block(ContentBlock),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    pub content: EnvelopeContent,
    pub sender_id: Option<String>,
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,
}

impl Envelope {
    pub fn user(text: impl Into<String>, sender_id: Option<String>, timestamp: f64) -> Self {
        Self {
            kind: EnvelopeKind::User,
            content: EnvelopeContent::Text(text.into()),
            sender_id,
            timestamp,
            tool_use_id: None,
        }
    }

    pub fn completion(text: impl Into<String>, sender_id: Option<String>, timestamp: f64) -> Self {
        Self {
            kind: EnvelopeKind::Completion,
            content: EnvelopeContent::Text(text.into()),
            sender_id,
            timestamp,
            tool_use_id: None,
        }
    }

    pub fn tool_result(
        block: ContentBlock,
        sender_id: Option<String>,
        tool_use_id: impl Into<String>,
        timestamp: f64,
    ) -> Self {
        Self {
            kind: EnvelopeKind::ToolResult,
            content: EnvelopeContent::Block(block),
            sender_id,
            timestamp,
            tool_use_id: Some(tool_use_id.into()),
        }
    }
}

// ─── Ephemeral records ────────────────────────────────────────────────────────

/// Set around one in-flight LLM call (`task_api_call:{id}`, TTL-bound).
/// An entry older than the TTL is abandoned by definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCallMarker {
    pub started_at: f64,
    pub turn: u64,
    pub message_count: u64,
}

/// `throttle_state:{model}`: when `mandatory_backoff` is set every caller
/// sleeps 20–30 s, deletes the key, and re-checks its own liveness.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThrottleState {
    #[serde(default)]
    pub mandatory_backoff: bool,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
