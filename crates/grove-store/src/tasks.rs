// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Typed accessors for the task-shaped documents.  Thin sugar over the
//! generic operations; every method is one store round-trip unless noted.

use grove_model::{ModelCatalog, TokenUsage};

use crate::keys;
use crate::records::{ApiCallMarker, Envelope, TaskRecord, TaskStatus, ThrottleState, Turn};
use crate::store::{StateStore, StoreError};

/// TTL of the in-flight call marker.  Anything older is abandoned.
pub const API_CALL_TTL_SECS: u64 = 300;

impl StateStore {
    // ── Task records ──────────────────────────────────────────────────────────

    pub async fn task_record(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        self.get_json(&keys::task_data(task_id)).await
    }

    pub async fn put_task_record(&self, record: &TaskRecord) -> Result<(), StoreError> {
        self.set_json(&keys::task_data(&record.task_id), record).await
    }

    pub async fn set_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<(), StoreError> {
        self.patch_field(&keys::task_data(task_id), "$.status", &status)
            .await
    }

    pub async fn set_task_pid(&self, task_id: &str, pid: Option<u32>) -> Result<(), StoreError> {
        self.patch_field(&keys::task_data(task_id), "$.pid", &pid).await
    }

    pub async fn set_process_started(&self, task_id: &str, at: f64) -> Result<(), StoreError> {
        self.patch_field(&keys::task_data(task_id), "$.process_started_at", &at)
            .await
    }

    pub async fn set_last_usage(
        &self,
        task_id: &str,
        usage: &TokenUsage,
    ) -> Result<(), StoreError> {
        self.patch_field(&keys::task_data(task_id), "$.last_usage", usage)
            .await
    }

    /// Append `child_id` to the parent's `children` unless already present.
    /// Returns whether an append happened.  (Read-then-append, same window
    /// the rest of the system accepts for this list.)
    pub async fn add_child(&self, parent_id: &str, child_id: &str) -> Result<bool, StoreError> {
        let Some(record) = self.task_record(parent_id).await? else {
            return Ok(false);
        };
        if record.children.iter().any(|c| c == child_id) {
            return Ok(false);
        }
        self.append_to_array(&keys::task_data(parent_id), "$.children", &child_id)
            .await?;
        Ok(true)
    }

    // ── Conversation logs ─────────────────────────────────────────────────────

    pub async fn conversation(&self, task_id: &str) -> Result<Option<Vec<Turn>>, StoreError> {
        self.get_json(&keys::conversation(task_id)).await
    }

    pub async fn put_conversation(&self, task_id: &str, turns: &[Turn]) -> Result<(), StoreError> {
        self.set_json(&keys::conversation(task_id), &turns).await
    }

    pub async fn append_turn(&self, task_id: &str, turn: &Turn) -> Result<(), StoreError> {
        self.append_to_array(&keys::conversation(task_id), "$", turn)
            .await
    }

    pub async fn append_message(
        &self,
        task_id: &str,
        turn_index: usize,
        message: &crate::records::StoredMessage,
    ) -> Result<(), StoreError> {
        self.append_to_array(
            &keys::conversation(task_id),
            &format!("$[{turn_index}].messages"),
            message,
        )
        .await
    }

    pub async fn set_turn_summary(
        &self,
        task_id: &str,
        turn_index: usize,
        summary: &str,
    ) -> Result<(), StoreError> {
        self.patch_field(
            &keys::conversation(task_id),
            &format!("$[{turn_index}].turn_summary"),
            &summary,
        )
        .await
    }

    // ── Message queues ────────────────────────────────────────────────────────

    pub async fn queue(&self, task_id: &str) -> Result<Option<Vec<Envelope>>, StoreError> {
        self.get_json(&keys::queue(task_id)).await
    }

    pub async fn queue_len(&self, task_id: &str) -> Result<usize, StoreError> {
        Ok(self.queue(task_id).await?.map(|q| q.len()).unwrap_or(0))
    }

    /// Append one envelope, creating the queue document on first use.
    pub async fn append_envelope(
        &self,
        task_id: &str,
        envelope: &Envelope,
    ) -> Result<(), StoreError> {
        let key = keys::queue(task_id);
        if !self.exists(&key).await? {
            self.set_json(&key, &Vec::<Envelope>::new()).await?;
        }
        self.append_to_array(&key, "$", envelope).await
    }

    pub async fn delete_queue(&self, task_id: &str) -> Result<(), StoreError> {
        self.delete(&keys::queue(task_id)).await
    }

    // ── Ephemeral records ─────────────────────────────────────────────────────

    pub async fn set_api_call_marker(
        &self,
        task_id: &str,
        marker: &ApiCallMarker,
    ) -> Result<(), StoreError> {
        let text = serde_json::to_string(marker).map_err(|source| StoreError::Malformed {
            key: keys::api_call(task_id),
            source,
        })?;
        self.set_string_ex(&keys::api_call(task_id), &text, API_CALL_TTL_SECS)
            .await
    }

    pub async fn clear_api_call_marker(&self, task_id: &str) -> Result<(), StoreError> {
        self.delete(&keys::api_call(task_id)).await
    }

    pub async fn throttle_state(&self, model: &str) -> Result<Option<ThrottleState>, StoreError> {
        let Some(raw) = self.get_string(&keys::throttle_state(model)).await? else {
            return Ok(None);
        };
        Ok(serde_json::from_str(&raw).ok())
    }

    pub async fn clear_throttle_state(&self, model: &str) -> Result<(), StoreError> {
        self.delete(&keys::throttle_state(model)).await
    }

    // ── Model catalog ─────────────────────────────────────────────────────────

    pub async fn model_catalog(&self) -> Result<ModelCatalog, StoreError> {
        Ok(self.get_json(keys::MODEL_CATALOG).await?.unwrap_or_default())
    }
}
