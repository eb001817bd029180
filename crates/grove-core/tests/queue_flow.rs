// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Queue → conversation flow against a live Redis with RedisJSON.
//!
//! All tests are `#[ignore]`d so CI without infrastructure skips them:
//!
//! ```sh
//! GROVE_REDIS_URL=redis://127.0.0.1/ cargo test -p grove-core -- --include-ignored
//! ```

use std::sync::Arc;

use grove_core::{now_epoch, queue, TaskContext};
use grove_model::{BedrockClient, ContentBlock, Role, TokenUsage, ToolResultBlock};
use grove_store::{Envelope, StateStore, TaskRecord, TaskStatus, Turn};

async fn test_context() -> TaskContext {
    let url = std::env::var("GROVE_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".into());
    let config = Arc::new(grove_config::Config::default());
    TaskContext {
        store: StateStore::connect(&url).await.expect("redis"),
        client: Arc::new(BedrockClient::from_config(&config.model)),
        config,
        tools: Arc::new(grove_tools::ToolRegistry::new()),
    }
}

async fn seed_task(ctx: &TaskContext, task_id: &str) {
    let record = TaskRecord {
        task_id: task_id.into(),
        parent_task_id: None,
        model_name: "us.test.model-v1:0".into(),
        static_system_prompt: "test".into(),
        enable_recursion: false,
        created_at: now_epoch(),
        process_started_at: now_epoch(),
        status: TaskStatus::Stopped,
        pid: None,
        last_usage: TokenUsage::default(),
        children: vec![],
        max_iterations: 250,
        command: format!("grove run {task_id}"),
    };
    ctx.store.put_task_record(&record).await.unwrap();
    ctx.store
        .put_conversation(task_id, &[Turn::new(0, now_epoch())])
        .await
        .unwrap();
    ctx.store.delete_queue(task_id).await.unwrap();
}

async fn cleanup(ctx: &TaskContext, task_id: &str) {
    let store = &ctx.store;
    store.delete(&grove_store::keys::task_data(task_id)).await.unwrap();
    store.delete(&grove_store::keys::conversation(task_id)).await.unwrap();
    store.delete_queue(task_id).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn drain_groups_tool_results_before_text_messages() {
    let ctx = test_context().await;
    let task_id = "itest_drain_000001";
    seed_task(&ctx, task_id).await;

    // Queue: one text, two tool results, another text.  Tool results must
    // land first, grouped in ONE user message; each text gets its own.
    queue::enqueue(&ctx, task_id, Envelope::user("first", None, now_epoch()), false)
        .await
        .unwrap();
    for id in ["tu_a", "tu_b"] {
        queue::enqueue(
            &ctx,
            task_id,
            Envelope::tool_result(
                ContentBlock::ToolResult(ToolResultBlock::text(id, "{}")),
                Some(task_id.to_string()),
                id,
                now_epoch(),
            ),
            false,
        )
        .await
        .unwrap();
    }
    queue::enqueue(&ctx, task_id, Envelope::user("second", None, now_epoch()), false)
        .await
        .unwrap();

    queue::drain_into_conversation(&ctx, task_id).await.unwrap();

    let turns = ctx.store.conversation(task_id).await.unwrap().unwrap();
    let messages = &turns[0].messages;
    assert_eq!(messages.len(), 3);
    assert!(messages.iter().all(|m| m.role == Role::User));

    // Grouped tool results first, in FIFO order.
    assert_eq!(messages[0].content.len(), 2);
    assert_eq!(
        messages[0].content[0].as_tool_result().unwrap().tool_use_id,
        "tu_a"
    );
    assert_eq!(
        messages[0].content[1].as_tool_result().unwrap().tool_use_id,
        "tu_b"
    );
    assert_eq!(messages[1].content[0].as_text(), Some("first"));
    assert_eq!(messages[2].content[0].as_text(), Some("second"));

    // The queue is consumed.
    assert_eq!(ctx.store.queue_len(task_id).await.unwrap(), 0);

    cleanup(&ctx, task_id).await;
}

#[tokio::test]
#[ignore]
async fn drain_opens_a_new_turn_after_a_summarized_one() {
    let ctx = test_context().await;
    let task_id = "itest_newturn_000001";
    seed_task(&ctx, task_id).await;

    ctx.store.set_turn_summary(task_id, 0, "all done").await.unwrap();
    queue::enqueue(&ctx, task_id, Envelope::user("next topic", None, now_epoch()), false)
        .await
        .unwrap();
    queue::drain_into_conversation(&ctx, task_id).await.unwrap();

    let turns = ctx.store.conversation(task_id).await.unwrap().unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1].turn_number, 1);
    assert!(turns[0].messages.is_empty());
    assert_eq!(turns[1].messages[0].content[0].as_text(), Some("next topic"));

    cleanup(&ctx, task_id).await;
}

#[tokio::test]
#[ignore]
async fn probe_marks_a_stale_pid_stopped() {
    let ctx = test_context().await;
    let task_id = "itest_probe_000001";
    seed_task(&ctx, task_id).await;

    // Claim a pid that cannot be a grove runtime for this task.
    ctx.store.set_task_pid(task_id, Some(1)).await.unwrap();
    ctx.store
        .set_task_status(task_id, TaskStatus::Running)
        .await
        .unwrap();

    let activity = grove_core::probe::check(&ctx.store, task_id).await;
    assert!(!activity.alive);

    let record = ctx.store.task_record(task_id).await.unwrap().unwrap();
    assert_eq!(record.status, TaskStatus::Stopped);
    assert_eq!(record.pid, None);

    cleanup(&ctx, task_id).await;
}
