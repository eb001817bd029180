// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! OS-level liveness check for task processes.
//!
//! The store's `status`/`pid` fields are only ever claims; this probe is
//! what makes them true.  Anyone may call it for any task, and it patches
//! the record to match reality as a side effect.

use sysinfo::{ProcessRefreshKind, ProcessStatus, RefreshKind, System};
use tracing::warn;

use grove_store::{StateStore, TaskStatus};

/// Token the runtime's command line must carry (next to the task id) for a
/// pid to count as a live instance of that task.
pub const RUNTIME_ENTRY_TOKEN: &str = "grove";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskActivity {
    pub alive: bool,
    pub pid: Option<u32>,
    pub cpu_percent: Option<f32>,
}

impl TaskActivity {
    fn dead() -> Self {
        Self {
            alive: false,
            pid: None,
            cpu_percent: None,
        }
    }
}

/// Check whether `task_id` has a live runtime process, correcting the
/// stored `status`/`pid` either way.  Every failure mode counts as
/// not-alive; this function never errors.
pub async fn check(store: &StateStore, task_id: &str) -> TaskActivity {
    let record = match store.task_record(task_id).await {
        Ok(r) => r,
        Err(e) => {
            warn!(task_id, error = %e, "probe could not read task record");
            return TaskActivity::dead();
        }
    };
    let Some(record) = record else {
        return TaskActivity::dead();
    };

    if let Some(pid) = record.pid {
        if let Some(cpu) = inspect_process(pid, task_id) {
            if let Err(e) = store.set_task_status(task_id, TaskStatus::Running).await {
                warn!(task_id, error = %e, "probe could not mark task running");
            }
            return TaskActivity {
                alive: true,
                pid: Some(pid),
                cpu_percent: Some(cpu),
            };
        }
    }

    // The recorded pid is gone, unusable, or belongs to someone else now.
    mark_stopped(store, task_id).await;
    TaskActivity::dead()
}

async fn mark_stopped(store: &StateStore, task_id: &str) {
    if let Err(e) = store.set_task_pid(task_id, None).await {
        warn!(task_id, error = %e, "probe could not clear pid");
        return;
    }
    if let Err(e) = store.set_task_status(task_id, TaskStatus::Stopped).await {
        warn!(task_id, error = %e, "probe could not mark task stopped");
    }
    let _ = store
        .publish(
            &grove_store::keys::task_messages_channel(task_id),
            &serde_json::json!({"type": "process_ended"}),
        )
        .await;
}

/// `Some(cpu%)` when `pid` is a live runtime process for `task_id`:
/// it exists, is in a non-terminal state, and its command line names both
/// the runtime entry point and the task id.
fn inspect_process(pid: u32, task_id: &str) -> Option<f32> {
    let sys = System::new_with_specifics(
        RefreshKind::nothing().with_processes(ProcessRefreshKind::everything()),
    );
    let process = sys.process(sysinfo::Pid::from_u32(pid))?;

    if !is_live_status(process.status()) {
        return None;
    }

    let cmdline = process
        .cmd()
        .iter()
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ");
    if cmdline.contains(RUNTIME_ENTRY_TOKEN) && cmdline.contains(task_id) {
        Some(process.cpu_usage())
    } else {
        None
    }
}

fn is_live_status(status: ProcessStatus) -> bool {
    matches!(
        status,
        ProcessStatus::Run
            | ProcessStatus::Sleep
            | ProcessStatus::Idle
            | ProcessStatus::Waking
            | ProcessStatus::UninterruptibleDiskSleep
    )
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
