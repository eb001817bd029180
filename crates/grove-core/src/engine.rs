// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The per-iteration loop: drain → repair → prompt → model → record →
//! dispatch tools → decide turn-ending → summarize.

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use grove_model::{ContentBlock, Message, StopReason, ToolResultBlock, ToolUseBlock};
use grove_store::{keys, ApiCallMarker, Envelope, StoredMessage, Turn};

use crate::gateway::{GatewayOutcome, ThrottleTracker};
use crate::{conversation, now_epoch, prompts, queue, TaskContext};

/// Execute one iteration for `task_id`.  Returns whether the turn ended.
pub async fn execute_iteration(
    ctx: &TaskContext,
    throttle: &mut ThrottleTracker,
    task_id: &str,
) -> Result<bool> {
    let store = &ctx.store;
    let task_data = store
        .task_record(task_id)
        .await?
        .with_context(|| format!("no task record for {task_id}"))?;

    queue::drain_into_conversation(ctx, task_id).await?;

    let mut raw = store.conversation(task_id).await?.unwrap_or_default();
    if raw.is_empty() {
        raw.push(Turn::new(0, now_epoch()));
    }
    let repaired = conversation::repair(&raw);
    store.put_conversation(task_id, &repaired).await?;

    let current_turn_index = repaired.len() - 1;
    let message_number = repaired[current_turn_index].messages.len() as u64;
    debug!(task_id, turn = current_turn_index, message_number, "iteration start");

    // Flatten all turns into the single role/content sequence the API sees.
    let messages: Vec<Message> = repaired
        .iter()
        .flat_map(|turn| turn.messages.iter())
        .map(|m| Message {
            role: m.role,
            content: m.content.clone(),
        })
        .collect();

    // The drain above already consumed the queue; this covers anything that
    // slipped in between and would otherwise be double-ingested next time.
    store.delete_queue(task_id).await?;

    let dynamic = prompts::build_dynamic_system_prompt(store, &task_data, current_turn_index).await;
    let full_system_prompt = format!("{}{}", task_data.static_system_prompt, dynamic);

    let tool_config = ctx.tools.tool_config();
    let tool_config = (!tool_config.tools.is_empty()).then_some(tool_config);

    store
        .set_api_call_marker(
            task_id,
            &ApiCallMarker {
                started_at: now_epoch(),
                turn: current_turn_index as u64,
                message_count: message_number,
            },
        )
        .await?;

    let outcome = ctx
        .gateway()
        .invoke(
            throttle,
            &task_data.model_name,
            &messages,
            &full_system_prompt,
            tool_config.as_ref(),
            task_id,
        )
        .await;

    store.clear_api_call_marker(task_id).await?;

    let response = match outcome? {
        GatewayOutcome::Response(response) => response,
        GatewayOutcome::Interrupted => {
            info!(task_id, "interrupted mid-call; ending turn without writes");
            return Ok(true);
        }
    };

    store.set_last_usage(task_id, &response.usage).await?;
    debug!(
        task_id,
        stop_reason = ?response.stop_reason,
        input_tokens = response.usage.input_tokens,
        output_tokens = response.usage.output_tokens,
        "model responded"
    );

    let assistant_message = StoredMessage {
        role: grove_model::Role::Assistant,
        content: response.output.message.content.clone(),
        message_number,
        timestamp: now_epoch(),
    };
    store
        .append_message(task_id, current_turn_index, &assistant_message)
        .await?;

    if response.stop_reason == StopReason::ToolUse {
        execute_tools(ctx, task_id, &response.output.message.content).await?;
    }

    store
        .publish(
            &keys::task_messages_channel(task_id),
            &serde_json::json!({
                "task_id": task_id,
                "turn_number": current_turn_index,
                "message_number": message_number,
                "message_type": "assistant",
                "timestamp": now_epoch(),
                "stop_reason": response.stop_reason,
            }),
        )
        .await?;

    let turn_ending = response.stop_reason.ends_turn();
    if turn_ending {
        info!(task_id, turn = current_turn_index, "turn ending; summarizing");
        summarize_and_store_turn(ctx, throttle, task_id, current_turn_index).await?;
    }

    Ok(turn_ending)
}

/// Run every `toolUse` block in order, synchronously, and queue each result
/// back onto this task's own queue.  The next iteration's drain places them
/// into the conversation; a failing tool becomes an error result, never a
/// crashed iteration.
async fn execute_tools(ctx: &TaskContext, task_id: &str, content: &[ContentBlock]) -> Result<()> {
    for block in content {
        let Some(tool_use) = block.as_tool_use() else {
            continue;
        };
        let result_block = run_one_tool(ctx, task_id, tool_use).await;
        let tool_use_id = tool_use.tool_use_id.clone();
        queue::enqueue(
            ctx,
            task_id,
            Envelope::tool_result(
                ContentBlock::ToolResult(result_block),
                Some(task_id.to_string()),
                tool_use_id,
                now_epoch(),
            ),
            true,
        )
        .await?;
    }
    Ok(())
}

async fn run_one_tool(ctx: &TaskContext, task_id: &str, tool_use: &ToolUseBlock) -> ToolResultBlock {
    info!(task_id, tool = %tool_use.name, id = %tool_use.tool_use_id, "executing tool");
    match ctx
        .tools
        .invoke(&tool_use.name, &tool_use.input, task_id)
        .await
    {
        Ok(value) => {
            let text = serde_json::to_string(&value)
                .unwrap_or_else(|e| format!("{{\"error\": \"unserializable tool result: {e}\"}}"));
            ToolResultBlock::text(&tool_use.tool_use_id, text)
        }
        Err(e) => {
            warn!(task_id, tool = %tool_use.name, error = %e, "tool failed");
            let payload = serde_json::json!({
                "error": format!("Tool execution failed: {e:#}"),
            });
            ToolResultBlock::error(&tool_use.tool_use_id, payload.to_string())
        }
    }
}

/// Generate and store a summary of the completed turn.  An interruption
/// here is logged and swallowed; the turn is over either way.
async fn summarize_and_store_turn(
    ctx: &TaskContext,
    throttle: &mut ThrottleTracker,
    task_id: &str,
    turn_index: usize,
) -> Result<()> {
    let store = &ctx.store;
    let Some(turns) = store.conversation(task_id).await? else {
        return Ok(());
    };
    let Some(turn) = turns.get(turn_index) else {
        return Ok(());
    };

    let turn_json = serde_json::to_string_pretty(&turn.messages)?;
    let request = vec![Message::user(format!(
        "Summarize the work accomplished in this turn. Turn messages:\n\n{turn_json}"
    ))];

    let task_data = store
        .task_record(task_id)
        .await?
        .with_context(|| format!("no task record for {task_id}"))?;

    let outcome = ctx
        .gateway()
        .invoke(
            throttle,
            &task_data.model_name,
            &request,
            prompts::SUMMARY_SYSTEM_PROMPT,
            None,
            task_id,
        )
        .await?;

    let response = match outcome {
        GatewayOutcome::Response(response) => response,
        GatewayOutcome::Interrupted => {
            warn!(task_id, turn = turn_index, "turn summarization interrupted; skipping");
            return Ok(());
        }
    };

    if let Some(summary) = response.output.message.first_text() {
        store.set_turn_summary(task_id, turn_index, summary).await?;
    }
    Ok(())
}
