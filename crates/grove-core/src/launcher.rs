// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Task creation, reactivation, and process spawning.

use std::process::{Command, Stdio};

use tracing::{info, warn};

use grove_store::{Envelope, StoreError, TaskRecord, TaskStatus, Turn};

use crate::{now_epoch, probe, prompts, TaskContext};

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("base_name is required when creating a new child task (1-3 words)")]
    MissingBaseName,

    #[error("unknown model short name '{0}'")]
    UnknownModel(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to spawn task process: {0}")]
    Spawn(#[source] std::io::Error),
}

pub struct LaunchRequest {
    /// Existing task to resume; `None` creates a new one.
    pub task_id: Option<String>,
    /// Catalog short name or fully-qualified model identifier.
    pub model: String,
    pub enable_recursion: bool,
    /// User texts queued before the process starts.
    pub initial_messages: Vec<String>,
    pub parent_task_id: Option<String>,
    /// 1-3 words naming a new child task; required when `parent_task_id`
    /// is set and `task_id` is not.
    pub base_name: Option<String>,
    pub max_iterations: u32,
    pub start_process: bool,
}

impl LaunchRequest {
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            task_id: None,
            model: model.into(),
            enable_recursion: true,
            initial_messages: Vec::new(),
            parent_task_id: None,
            base_name: None,
            max_iterations: 250,
            start_process: true,
        }
    }
}

pub struct LaunchOutcome {
    pub pid: Option<u32>,
    pub task_id: String,
}

/// Create or reactivate a task.
///
/// A task that is already alive is returned untouched (no double-launch).
/// A fresh task gets its record and empty conversation written first, then
/// its initial messages queued, and only then — when `start_process` is set
/// and the queue is non-empty — a detached runtime process.
pub async fn launch(ctx: &TaskContext, req: LaunchRequest) -> Result<LaunchOutcome, LaunchError> {
    let store = &ctx.store;

    if let Some(existing_id) = &req.task_id {
        let activity = probe::check(store, existing_id).await;
        if activity.alive {
            warn!(task_id = %existing_id, "false launch: task is already running");
            return Ok(LaunchOutcome {
                pid: activity.pid,
                task_id: existing_id.clone(),
            });
        }
    }

    let task_id = match req.task_id.clone() {
        Some(id) => id,
        None => generate_task_id(req.parent_task_id.as_deref(), req.base_name.as_deref())?,
    };

    let command = runtime_command(&task_id);

    // A task with an existing conversation is being reactivated; its record
    // and log must not be overwritten (and its stored model stands).
    if store.conversation(&task_id).await?.is_some() {
        info!(%task_id, "reactivating existing task");
    } else {
        let catalog = store.model_catalog().await?;
        let model_name = catalog
            .resolve(&req.model)
            .ok_or_else(|| LaunchError::UnknownModel(req.model.clone()))?
            .to_string();
        info!(%task_id, model = %model_name, "creating new task");
        let record = TaskRecord {
            task_id: task_id.clone(),
            parent_task_id: req.parent_task_id.clone(),
            model_name,
            static_system_prompt: prompts::build_static_system_prompt(
                req.parent_task_id.as_deref(),
            ),
            enable_recursion: req.enable_recursion,
            created_at: now_epoch(),
            process_started_at: now_epoch(),
            status: TaskStatus::Stopped,
            pid: None,
            last_usage: Default::default(),
            children: Vec::new(),
            max_iterations: req.max_iterations,
            command: command.clone(),
        };
        store.put_task_record(&record).await?;
        store
            .put_conversation(&task_id, &[Turn::new(0, now_epoch())])
            .await?;
    }

    for text in &req.initial_messages {
        store
            .append_envelope(&task_id, &Envelope::user(text.clone(), None, now_epoch()))
            .await?;
    }

    let mut pid = None;
    if req.start_process && store.queue_len(&task_id).await? > 0 {
        let spawned = spawn_runtime(&task_id)?;
        store.set_task_pid(&task_id, Some(spawned)).await?;
        info!(%task_id, pid = spawned, "launched task process");
        pid = Some(spawned);
    }

    Ok(LaunchOutcome { pid, task_id })
}

/// The exact command line a task runtime runs with; recorded in the task
/// record and matched by the process probe.
pub fn runtime_command(task_id: &str) -> String {
    let exe = std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "grove".into());
    format!("{exe} run {task_id}")
}

fn spawn_runtime(task_id: &str) -> Result<u32, LaunchError> {
    let exe = std::env::current_exe().map_err(LaunchError::Spawn)?;
    let mut cmd = Command::new(exe);
    cmd.arg("run")
        .arg(task_id)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    // Detach into a new session so the child survives the launcher's
    // terminal and never receives its signals.
    #[cfg(unix)]
    unsafe {
        use std::os::unix::process::CommandExt;
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    let child = cmd.spawn().map_err(LaunchError::Spawn)?;
    Ok(child.id())
}

/// Root tasks are `conversation_<6 hex>`; children are `<slug>_<6 hex>`
/// where the slug is the lower-cased base name with whitespace runs joined
/// by underscores.
pub fn generate_task_id(
    parent_task_id: Option<&str>,
    base_name: Option<&str>,
) -> Result<String, LaunchError> {
    let suffix = &uuid::Uuid::new_v4().simple().to_string()[..6];
    match parent_task_id {
        None => Ok(format!("conversation_{suffix}")),
        Some(_) => {
            let base = base_name.ok_or(LaunchError::MissingBaseName)?;
            Ok(format!("{}_{suffix}", slug(base)))
        }
    }
}

pub fn slug(base_name: &str) -> String {
    base_name
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
