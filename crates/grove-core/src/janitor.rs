// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Root-task housekeeping: reconcile recorded liveness with OS reality.

use tracing::{debug, warn};

use grove_store::{keys, StateStore};

use crate::probe;

/// Probe every known task; the probe itself corrects `status`/`pid` for
/// anything that died without cleaning up.  Only root tasks run this —
/// on process start and at the top of each iteration.
pub async fn sweep(store: &StateStore) -> usize {
    let pattern = format!("{}*", keys::CONVERSATION_PREFIX);
    let task_keys = match store.keys_matching(&pattern).await {
        Ok(keys) => keys,
        Err(e) => {
            warn!(error = %e, "janitor sweep could not list tasks");
            return 0;
        }
    };

    let mut swept = 0;
    for key in &task_keys {
        if let Some(task_id) = keys::task_id_from_conversation_key(key) {
            probe::check(store, task_id).await;
            swept += 1;
        }
    }
    debug!(swept, "janitor sweep complete");
    swept
}
