// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Throttle-aware mediator between the turn engine and the Bedrock driver.
//!
//! Rate limiting is advisory and distributed: each task process paces
//! itself from its own `last_usage` numbers, watches the shared
//! `throttle_state:{model}` flag, and publishes success/exception events so
//! concurrent processes (or a future coordinator) can see the pressure.
//! There are no process-wide globals; all pacing state lives in a
//! [`ThrottleTracker`] owned by the run loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{info, warn};

use grove_model::{BedrockClient, ConverseResponse, Message, ToolConfig};
use grove_store::{keys, StateStore};

use crate::{now_epoch, probe};

/// Token-per-minute budget the proactive delay models.
const TOKENS_PER_MINUTE: f64 = 200_000.0;
/// Safety margin added to the last request's token count.
const TOKEN_MARGIN: f64 = 500.0;
/// Floor for the proactive delay, seconds.
const MIN_DELAY_SECS: f64 = 0.3;

/// Per-task pacing state, carried across iterations on the run loop's stack.
#[derive(Debug, Clone)]
pub struct ThrottleTracker {
    last_req_time: Option<Instant>,
    multiplier: f64,
}

impl Default for ThrottleTracker {
    fn default() -> Self {
        Self {
            last_req_time: None,
            multiplier: 1.0,
        }
    }
}

impl ThrottleTracker {
    /// Successful call: stamp the time and relax the multiplier
    /// (×0.9, floor 1.0).
    pub fn on_success(&mut self) {
        self.last_req_time = Some(Instant::now());
        self.multiplier = (self.multiplier * 0.9).max(1.0);
    }

    /// Throttled call: tighten the multiplier (×1.5, ceiling 3.0).
    pub fn on_throttle(&mut self) {
        self.multiplier = (self.multiplier * 1.5).min(3.0);
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Time still to wait so that `required` has elapsed since the last
    /// request.  Zero when no request has been made yet.
    fn remaining_wait(&self, required: Duration) -> Duration {
        match self.last_req_time {
            Some(last) => required.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }
}

/// Outcome of one gateway invocation.
pub enum GatewayOutcome {
    Response(ConverseResponse),
    /// The owning task died while we were pacing; nothing was sent (or the
    /// result is moot).  The engine must abort the iteration cleanly.
    Interrupted,
}

pub struct Gateway {
    store: StateStore,
    client: Arc<BedrockClient>,
}

impl Gateway {
    pub fn new(store: StateStore, client: Arc<BedrockClient>) -> Self {
        Self { store, client }
    }

    /// One logical model call: pace, dispatch, and — for throttling and
    /// read timeouts — back off and retry until the call lands or the task
    /// dies.  Non-recoverable errors propagate.
    pub async fn invoke(
        &self,
        throttle: &mut ThrottleTracker,
        model: &str,
        messages: &[Message],
        system_prompt: &str,
        tool_config: Option<&ToolConfig>,
        task_id: &str,
    ) -> anyhow::Result<GatewayOutcome> {
        loop {
            let Some(required) = self.proactive_delay(model, task_id).await? else {
                return Ok(GatewayOutcome::Interrupted);
            };

            let wait = throttle.remaining_wait(required);
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
                // The pacing sleep is a real suspension point; the task may
                // have been killed under us.
                if !probe::check(&self.store, task_id).await.alive {
                    return Ok(GatewayOutcome::Interrupted);
                }
            }

            match self
                .client
                .converse(model, messages, system_prompt, tool_config)
                .await
            {
                Ok(response) => {
                    throttle.on_success();
                    self.store
                        .publish(
                            &keys::throttle_success_channel(model),
                            &serde_json::json!({"task_id": task_id, "timestamp": now_epoch()}),
                        )
                        .await?;
                    return Ok(GatewayOutcome::Response(response));
                }
                Err(err) => {
                    let Some(extra) = err.extra_backoff() else {
                        return Err(err.into());
                    };
                    self.store
                        .publish(
                            &keys::throttle_exception_channel(model),
                            &serde_json::json!({
                                "task_id": task_id,
                                "error_code": err.error_code(),
                                "timestamp": now_epoch(),
                            }),
                        )
                        .await?;
                    throttle.on_throttle();
                    let backoff = required.mul_f64(throttle.multiplier()) + extra;
                    warn!(
                        model,
                        code = err.error_code(),
                        backoff_secs = backoff.as_secs_f64(),
                        multiplier = throttle.multiplier(),
                        "throttled; backing off before retry"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// Compute the pacing delay for the next request.
    ///
    /// Honors a mandatory-backoff flag on `throttle_state:{model}` (sleep
    /// 20–30 s, clear the key), and probes task liveness before sleeping
    /// and after waking.  `None` means the task is no longer alive.
    async fn proactive_delay(
        &self,
        model: &str,
        task_id: &str,
    ) -> anyhow::Result<Option<Duration>> {
        if !probe::check(&self.store, task_id).await.alive {
            return Ok(None);
        }

        if let Some(state) = self.store.throttle_state(model).await? {
            if state.mandatory_backoff {
                let secs = rand::thread_rng().gen_range(20.0..30.0);
                info!(model, backoff_secs = secs, "mandatory backoff");
                tokio::time::sleep(Duration::from_secs_f64(secs)).await;
                self.store.clear_throttle_state(model).await?;

                if !probe::check(&self.store, task_id).await.alive {
                    return Ok(None);
                }
            }
        }

        let usage = match self.store.task_record(task_id).await? {
            Some(record) => record.last_usage,
            None => Default::default(),
        };
        let next_tokens = usage.input_tokens as f64 + usage.output_tokens as f64 + TOKEN_MARGIN;
        let required = (next_tokens * 60.0 / TOKENS_PER_MINUTE).max(MIN_DELAY_SECS);
        Ok(Some(Duration::from_secs_f64(required)))
    }
}

/// The proactive-delay formula, factored out for the pacing tests.
pub fn required_delay_secs(input_tokens: u64, output_tokens: u64) -> f64 {
    let next_tokens = input_tokens as f64 + output_tokens as f64 + TOKEN_MARGIN;
    (next_tokens * 60.0 / TOKENS_PER_MINUTE).max(MIN_DELAY_SECS)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
