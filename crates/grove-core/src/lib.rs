// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The task execution engine.
//!
//! One task = one OS process running [`runner::run_task`].  The process
//! drains its Redis queue into the conversation log, repairs the log into
//! API-legal shape, calls the model through the throttle-aware gateway,
//! dispatches tools, and loops until the queue is empty or the iteration
//! budget runs out.  Parents and children are ordinary tasks wired together
//! through each other's queues.

pub mod bootstrap;
pub mod conversation;
pub mod engine;
pub mod gateway;
pub mod janitor;
pub mod launcher;
pub mod probe;
pub mod prompts;
pub mod queue;
pub mod runner;
pub mod task_tools;

use std::sync::Arc;

use grove_config::Config;
use grove_model::BedrockClient;
use grove_store::StateStore;
use grove_tools::ToolRegistry;

pub use gateway::{Gateway, GatewayOutcome, ThrottleTracker};
pub use launcher::{LaunchError, LaunchOutcome, LaunchRequest};
pub use probe::TaskActivity;

/// Everything one task process needs, built once at startup.
#[derive(Clone)]
pub struct TaskContext {
    pub store: StateStore,
    pub config: Arc<Config>,
    pub client: Arc<BedrockClient>,
    pub tools: Arc<ToolRegistry>,
}

impl TaskContext {
    pub fn gateway(&self) -> Gateway {
        Gateway::new(self.store.clone(), self.client.clone())
    }
}

/// Wall-clock seconds since the epoch, as stored in every record timestamp.
pub fn now_epoch() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
