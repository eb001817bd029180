// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{require_str, Tool};

/// Scratchpad tool: the model writes out reasoning, only the conclusions
/// come back into context.
pub struct ThinkTool;

#[async_trait]
impl Tool for ThinkTool {
    fn name(&self) -> &str {
        "think"
    }

    fn description(&self) -> &str {
        "Internal reasoning - thoughts discarded, conclusions kept"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "thoughts": {"type": "string", "description": "Internal reasoning (discarded)"},
                "conclusions": {"type": "string", "description": "Final conclusions (returned)"}
            },
            "required": ["thoughts", "conclusions"]
        })
    }

    async fn invoke(&self, input: &Value, _task_id: &str) -> anyhow::Result<Value> {
        require_str(input, "thoughts")?;
        let conclusions = require_str(input, "conclusions")?;
        Ok(json!({"conclusions": conclusions}))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
