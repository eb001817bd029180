// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Well-known key and channel names.  Every Redis key the system touches is
//! built here; nothing else formats key strings.

/// Prefix of conversation-log keys; also the pattern root for the janitor sweep.
pub const CONVERSATION_PREFIX: &str = "task:";

/// Catalog document mapping model short names to Bedrock identifiers.
pub const MODEL_CATALOG: &str = "bedrock:converse:models";

/// Shared channel carrying ids of tasks that must terminate.
pub const KILL_REQUESTS_CHANNEL: &str = "kill_requests";

pub fn task_data(task_id: &str) -> String {
    format!("task_data:{task_id}")
}

pub fn conversation(task_id: &str) -> String {
    format!("{CONVERSATION_PREFIX}{task_id}")
}

pub fn queue(task_id: &str) -> String {
    format!("task_queue:{task_id}")
}

pub fn api_call(task_id: &str) -> String {
    format!("task_api_call:{task_id}")
}

pub fn throttle_state(model: &str) -> String {
    format!("throttle_state:{model}")
}

pub fn task_messages_channel(task_id: &str) -> String {
    format!("task_messages:{task_id}")
}

pub fn task_complete_channel(task_id: &str) -> String {
    format!("task_complete:{task_id}")
}

pub fn task_state_channel(task_id: &str) -> String {
    format!("task_state:{task_id}")
}

pub fn throttle_success_channel(model: &str) -> String {
    format!("throttle_success:{model}")
}

pub fn throttle_exception_channel(model: &str) -> String {
    format!("throttle_exception:{model}")
}

/// Inverse of [`conversation`]: extract the task id from a swept key.
pub fn task_id_from_conversation_key(key: &str) -> Option<&str> {
    key.strip_prefix(CONVERSATION_PREFIX)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_shapes() {
        assert_eq!(task_data("t1"), "task_data:t1");
        assert_eq!(conversation("t1"), "task:t1");
        assert_eq!(queue("t1"), "task_queue:t1");
        assert_eq!(api_call("t1"), "task_api_call:t1");
        assert_eq!(throttle_state("us.m-v1:0"), "throttle_state:us.m-v1:0");
    }

    #[test]
    fn conversation_key_round_trips() {
        let id = "analyze_data_a1b2c3";
        assert_eq!(task_id_from_conversation_key(&conversation(id)), Some(id));
    }

    #[test]
    fn sibling_prefixes_do_not_match_the_sweep_pattern() {
        // The janitor sweeps `task:*`; the other task keys must not collide.
        assert!(task_id_from_conversation_key(&task_data("x")).is_none());
        assert!(task_id_from_conversation_key(&queue("x")).is_none());
        assert!(task_id_from_conversation_key(&api_call("x")).is_none());
    }
}
