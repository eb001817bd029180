// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;

/// Trait that every tool must implement.
///
/// A tool receives the raw `input` object from the model's `toolUse` block
/// plus the id of the task invoking it, and returns any JSON-serializable
/// value.  The engine serializes the return value (or the error) into the
/// `toolResult` text block; tools never touch the conversation themselves.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the input object.
    fn input_schema(&self) -> Value;
    /// Execute.  Errors are encoded into the tool result by the caller;
    /// a failing tool never crashes the turn.
    async fn invoke(&self, input: &Value, task_id: &str) -> anyhow::Result<Value>;
}

/// Pull a required string argument out of the input object.
pub(crate) fn require_str<'a>(input: &'a Value, field: &str) -> anyhow::Result<&'a str> {
    input
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("missing required argument '{field}'"))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn require_str_returns_present_field() {
        let v = json!({"command": "ls"});
        assert_eq!(require_str(&v, "command").unwrap(), "ls");
    }

    #[test]
    fn require_str_rejects_missing_and_non_string() {
        let v = json!({"n": 3});
        assert!(require_str(&v, "command").is_err());
        assert!(require_str(&v, "n").is_err());
    }
}
