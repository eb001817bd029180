// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;

use crate::tool::{require_str, Tool};

pub struct BashTool {
    /// Wall-clock cap for one invocation.
    pub timeout_secs: u64,
}

impl Default for BashTool {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a bash command and return stdout, stderr, and exit code"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "The bash command to execute"}
            },
            "required": ["command"]
        })
    }

    async fn invoke(&self, input: &Value, _task_id: &str) -> anyhow::Result<Value> {
        let command = require_str(input, "command")?;
        debug!(cmd = %command, "bash tool");

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(self.timeout_secs),
            Command::new("bash").arg("-c").arg(command).output(),
        )
        .await;

        match result {
            Ok(Ok(output)) => Ok(json!({
                "stdout": String::from_utf8_lossy(&output.stdout),
                "stderr": String::from_utf8_lossy(&output.stderr),
                "returncode": output.status.code().unwrap_or(-1),
            })),
            Ok(Err(e)) => anyhow::bail!("spawn error: {e}"),
            Err(_) => anyhow::bail!("command timed out after {}s", self.timeout_secs),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
