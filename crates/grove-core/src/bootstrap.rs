// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Wires the full tool registry for one task process.

use std::sync::Arc;

use grove_config::Config;
use grove_model::BedrockClient;
use grove_store::StateStore;
use grove_tools::{
    BashTool, ChemblSearchTool, GoogleSearchTool, PubMedSearchTool, ThinkTool, ToolRegistry,
};

use crate::task_tools::{QueryTaskTool, SpawnTaskTool};

/// Build the registry a task runs with.  `spawn_task` is only offered to
/// tasks created with recursion enabled.
pub fn build_registry(
    store: &StateStore,
    config: &Arc<Config>,
    client: &Arc<BedrockClient>,
    enable_recursion: bool,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(BashTool {
        timeout_secs: config.runtime.bash_timeout_secs,
    });
    registry.register(ThinkTool);
    registry.register(GoogleSearchTool::default());
    registry.register(PubMedSearchTool::default());
    registry.register(ChemblSearchTool::default());
    registry.register(QueryTaskTool::new(
        store.clone(),
        config.clone(),
        client.clone(),
    ));
    if enable_recursion {
        registry.register(SpawnTaskTool::new(
            store.clone(),
            config.clone(),
            client.clone(),
        ));
    }
    registry
}
