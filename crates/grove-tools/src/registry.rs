// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use grove_model::{ToolConfig, ToolEntry, ToolInputSchema, ToolSpec};

use crate::Tool;

/// Central registry holding all tools available to one task.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// The Converse `toolConfig` for every registered tool, sorted by name
    /// so the request body is stable across processes.
    pub fn tool_config(&self) -> ToolConfig {
        let mut tools: Vec<ToolEntry> = self
            .tools
            .values()
            .map(|t| ToolEntry {
                tool_spec: ToolSpec {
                    name: t.name().to_string(),
                    description: t.description().to_string(),
                    input_schema: ToolInputSchema {
                        json: t.input_schema(),
                    },
                },
            })
            .collect();
        tools.sort_by(|a, b| a.tool_spec.name.cmp(&b.tool_spec.name));
        ToolConfig { tools }
    }

    /// Dispatch by name.  Unknown names fail like a failing tool would.
    pub async fn invoke(
        &self,
        name: &str,
        input: &Value,
        task_id: &str,
    ) -> anyhow::Result<Value> {
        match self.tools.get(name) {
            Some(tool) => tool.invoke(input, task_id).await,
            None => anyhow::bail!("unknown tool: {name}"),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;

    /// Minimal no-op tool for registry tests.
    struct EchoTool {
        name: &'static str,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn invoke(&self, input: &Value, task_id: &str) -> anyhow::Result<Value> {
            Ok(json!({"echo": input, "task_id": task_id}))
        }
    }

    #[test]
    fn register_and_get() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        assert!(reg.get("echo").is_some());
        assert!(reg.get("nope").is_none());
    }

    #[test]
    fn names_are_sorted() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "zeta" });
        reg.register(EchoTool { name: "alpha" });
        assert_eq!(reg.names(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn tool_config_is_sorted_and_complete() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "b_tool" });
        reg.register(EchoTool { name: "a_tool" });
        let tc = reg.tool_config();
        let names: Vec<&str> = tc.tools.iter().map(|t| t.tool_spec.name.as_str()).collect();
        assert_eq!(names, vec!["a_tool", "b_tool"]);
        assert_eq!(tc.tools[0].tool_spec.input_schema.json["type"], "object");
    }

    #[tokio::test]
    async fn invoke_passes_input_and_task_id() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        let out = reg.invoke("echo", &json!({"x": 1}), "task_9").await.unwrap();
        assert_eq!(out["echo"]["x"], 1);
        assert_eq!(out["task_id"], "task_9");
    }

    #[tokio::test]
    async fn invoke_unknown_tool_is_an_error() {
        let reg = ToolRegistry::new();
        let err = reg.invoke("missing", &json!({}), "t").await.unwrap_err();
        assert!(err.to_string().contains("unknown tool"));
    }

    #[test]
    fn registering_same_name_twice_overwrites() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "t" });
        reg.register(EchoTool { name: "t" });
        assert_eq!(reg.names().len(), 1);
    }
}
