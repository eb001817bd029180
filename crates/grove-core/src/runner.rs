// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The outer run loop of a task process.

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use grove_store::{keys, Envelope, TaskStatus};

use crate::gateway::ThrottleTracker;
use crate::{conversation, engine, janitor, now_epoch, probe, queue, TaskContext};

/// Run the task until its queue empties, its iteration budget runs out, or
/// a kill request arrives.  This is what `grove run <task_id>` executes.
pub async fn run_task(ctx: &TaskContext, task_id: &str, max_iterations: u32) -> Result<()> {
    let store = &ctx.store;
    let my_pid = std::process::id();

    let record = store
        .task_record(task_id)
        .await?
        .with_context(|| format!("no task record for {task_id}"))?;
    let is_root = record.is_root();
    let model = record.model_name.clone();

    // Only the root reconciles the whole tree.
    if is_root {
        janitor::sweep(store).await;
    }

    // Claim the task.  If some other live process already owns this id,
    // leave it alone and exit.
    let activity = probe::check(store, task_id).await;
    if activity.alive && activity.pid != Some(my_pid) {
        warn!(task_id, owner = ?activity.pid, "task already owned by a live process; exiting");
        return Ok(());
    }
    store.set_task_pid(task_id, Some(my_pid)).await?;
    store.set_process_started(task_id, now_epoch()).await?;

    // Informational: watch the shared throttle flag for this model, and the
    // kill channel for our own id.
    let _throttle_sub = store.subscribe(&keys::throttle_state(&model)).await.ok();
    let mut kill_sub = store.subscribe(keys::KILL_REQUESTS_CHANNEL).await.ok();

    let mut throttle = ThrottleTracker::default();
    let mut did_work = false;

    for iteration in 0..max_iterations {
        if is_root {
            janitor::sweep(store).await;
        }

        if let Some(hint) = system_hint(iteration, max_iterations) {
            // Computed but not injected; surfaced here for observability.
            debug!(task_id, iteration, hint = %hint, "iteration budget hint");
        }

        if let Some(sub) = &mut kill_sub {
            let mut killed = false;
            while let Some(payload) = sub.try_next_payload().await {
                if payload.contains(task_id) {
                    killed = true;
                }
            }
            if killed {
                info!(task_id, "kill request received; stopping");
                break;
            }
        }

        let queue_len = store.queue_len(task_id).await?;
        debug!(task_id, iteration, queue_len, "iteration check");
        if queue_len == 0 {
            break;
        }

        let turn_ending = engine::execute_iteration(ctx, &mut throttle, task_id).await?;
        did_work = true;

        if turn_ending {
            // More queued messages start a new turn on the next iteration;
            // otherwise we are done.
            if store.queue_len(task_id).await? > 0 {
                continue;
            }
            break;
        }
    }

    info!(task_id, did_work, "run loop finished");

    if did_work {
        notify_parent(ctx, task_id).await?;

        // Release the task only if we are still the recorded owner.
        let record = store.task_record(task_id).await?;
        if record.as_ref().and_then(|r| r.pid) == Some(my_pid) {
            store.set_task_pid(task_id, None).await?;
            store.set_task_status(task_id, TaskStatus::Stopped).await?;

            let (turn_number, message_number) = match store.conversation(task_id).await? {
                Some(turns) if !turns.is_empty() => {
                    let last = turns.len() - 1;
                    (last as u64, turns[last].messages.len() as u64)
                }
                _ => (0, 0),
            };
            store
                .publish(
                    &keys::task_messages_channel(task_id),
                    &serde_json::json!({
                        "task_id": task_id,
                        "turn_number": turn_number,
                        "message_number": message_number,
                        "message_type": "completion",
                        "timestamp": now_epoch(),
                    }),
                )
                .await?;
        }
    }

    store.clear_api_call_marker(task_id).await?;
    Ok(())
}

/// Send the parent (if any) a single `completion` envelope summarizing this
/// task's run, waking the parent if it has stopped.
async fn notify_parent(ctx: &TaskContext, task_id: &str) -> Result<()> {
    let store = &ctx.store;
    let Some(record) = store.task_record(task_id).await? else {
        return Ok(());
    };
    let Some(parent_id) = record.parent_task_id else {
        return Ok(());
    };

    let history = store.conversation(task_id).await?.unwrap_or_default();
    let message = conversation::build_completion_message(task_id, &history, true);
    info!(task_id, parent = %parent_id, "notifying parent of completion");
    queue::enqueue(
        ctx,
        &parent_id,
        Envelope::completion(message, Some(task_id.to_string()), now_epoch()),
        true,
    )
    .await
}

/// The iteration-budget hint for this iteration, if any.
///
/// Four cases, keyed to how much budget remains.  Currently computed and
/// logged but not injected into the prompt.
pub fn system_hint(iteration: u32, max_iterations: u32) -> Option<String> {
    if max_iterations == 1 {
        Some(
            "[SYSTEM] This is a single-iteration task. You may either respond via text to \
             your parent task or perform one or more simultaneous tool uses, but you will \
             not be able to respond or do further work after tool use."
                .into(),
        )
    } else if max_iterations == 2 && iteration == 0 {
        Some(
            "[SYSTEM] This is a two-iteration task. You should use this initial iteration \
             to perform your assigned task in one or more simultaneous tool calls, then \
             use your second action to report your results."
                .into(),
        )
    } else if max_iterations > 2 && max_iterations - iteration == 2 {
        Some(format!(
            "[SYSTEM] Warning: Iteration {} of {max_iterations}. Finish up your work and \
             perform any final safety and/or hygiene operations and prepare to use your \
             final iteration to report your results if successful, or to thoroughly \
             document failures, any partial successes, and recommended next steps for the \
             parent task.",
            iteration + 1
        ))
    } else if iteration == max_iterations - 1 {
        Some(
            "[SYSTEM] Final iteration. Use this final operation to give the parent task \
             your detailed final report rather than using tools."
                .into(),
        )
    } else {
        None
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_iteration_budget_gets_the_single_hint() {
        let hint = system_hint(0, 1).unwrap();
        assert!(hint.contains("single-iteration task"));
    }

    #[test]
    fn two_iteration_budget_hints_only_the_first() {
        assert!(system_hint(0, 2).unwrap().contains("two-iteration task"));
        // Iteration 1 of 2 is the final iteration.
        assert!(system_hint(1, 2).unwrap().contains("Final iteration"));
    }

    #[test]
    fn wind_down_warning_fires_two_before_the_end() {
        let hint = system_hint(8, 10).unwrap();
        assert!(hint.contains("Warning: Iteration 9 of 10"));
    }

    #[test]
    fn final_iteration_hint_fires_last() {
        assert!(system_hint(9, 10).unwrap().contains("Final iteration"));
    }

    #[test]
    fn mid_run_iterations_have_no_hint() {
        assert_eq!(system_hint(0, 10), None);
        assert_eq!(system_hint(3, 10), None);
        assert_eq!(system_hint(7, 10), None);
    }

    #[test]
    fn hint_boundaries_for_three_iterations() {
        // max=3: iteration 0 has no hint, 1 is the wind-down, 2 is final.
        assert_eq!(system_hint(0, 3), None);
        assert!(system_hint(1, 3).unwrap().contains("Warning: Iteration 2 of 3"));
        assert!(system_hint(2, 3).unwrap().contains("Final iteration"));
    }
}
