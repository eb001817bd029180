// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The per-task message queue: the only way anything — parents, children,
//! tools, operators — talks to a task.

use anyhow::Result;
use tracing::{debug, info};

use grove_model::{ContentBlock, Role};
use grove_store::{Envelope, EnvelopeContent, EnvelopeKind, StoredMessage, Turn};

use crate::{launcher, now_epoch, probe, TaskContext};

/// Append `envelope` to the task's queue.  With `auto_launch`, a stopped
/// target is started so the message gets processed; this is what makes a
/// queued message to a dead task self-healing.
pub async fn enqueue(
    ctx: &TaskContext,
    task_id: &str,
    envelope: Envelope,
    auto_launch: bool,
) -> Result<()> {
    ctx.store.append_envelope(task_id, &envelope).await?;

    let activity = probe::check(&ctx.store, task_id).await;
    debug!(task_id, alive = activity.alive, kind = ?envelope.kind, "message queued");

    if !activity.alive && auto_launch {
        info!(task_id, "auto-launching stopped task for queued message");
        launcher::launch(
            ctx,
            launcher::LaunchRequest {
                task_id: Some(task_id.to_string()),
                ..launcher::LaunchRequest::with_model(ctx.config.model.default_model.clone())
            },
        )
        .await?;
    }
    Ok(())
}

/// Move every queued envelope into the conversation log.
///
/// Tool results are grouped into ONE user message appended first, so the
/// model sees a single user turn answering the prior assistant tool-use
/// burst; each text envelope then becomes its own user message.  When the
/// previous turn already ended (it carries a summary), a fresh turn record
/// is appended before anything else.
pub async fn drain_into_conversation(ctx: &TaskContext, task_id: &str) -> Result<()> {
    let store = &ctx.store;

    let envelopes = store.queue(task_id).await?.unwrap_or_default();
    if envelopes.is_empty() {
        return Ok(());
    }
    store.delete_queue(task_id).await?;

    let mut tool_results: Vec<ContentBlock> = Vec::new();
    let mut texts: Vec<String> = Vec::new();
    for envelope in envelopes {
        match (envelope.kind, envelope.content) {
            (EnvelopeKind::ToolResult, EnvelopeContent::Block(block)) => tool_results.push(block),
            (_, EnvelopeContent::Text(text)) => texts.push(text),
            (kind, EnvelopeContent::Block(block)) => {
                // A block in a non-tool envelope is unexpected; deliver its
                // text rendering rather than losing it.
                debug!(task_id, ?kind, "block content in non-tool envelope");
                texts.push(serde_json::to_string(&block).unwrap_or_default());
            }
        }
    }

    // Make sure there is a turn to append to, opening a new one when the
    // last one is already summarized (ended).
    let mut turns = match store.conversation(task_id).await? {
        Some(turns) if !turns.is_empty() => turns,
        _ => {
            let fresh = vec![Turn::new(0, now_epoch())];
            store.put_conversation(task_id, &fresh).await?;
            fresh
        }
    };
    if turns
        .last()
        .map(|t| t.turn_summary.is_some())
        .unwrap_or(false)
    {
        let next = Turn::new(turns.last().map(|t| t.turn_number + 1).unwrap_or(0), now_epoch());
        store.append_turn(task_id, &next).await?;
        turns.push(next);
    }

    let turn_index = turns.len() - 1;
    let mut message_number = turns[turn_index].messages.len() as u64;

    if !tool_results.is_empty() {
        store
            .append_message(
                task_id,
                turn_index,
                &StoredMessage {
                    role: Role::User,
                    content: tool_results,
                    message_number,
                    timestamp: now_epoch(),
                },
            )
            .await?;
        message_number += 1;
    }

    for text in texts {
        store
            .append_message(
                task_id,
                turn_index,
                &StoredMessage {
                    role: Role::User,
                    content: vec![ContentBlock::text(text)],
                    message_number,
                    timestamp: now_epoch(),
                },
            )
            .await?;
        message_number += 1;
    }

    store
        .publish(
            &grove_store::keys::task_messages_channel(task_id),
            &serde_json::json!({"type": "new_message"}),
        )
        .await?;

    Ok(())
}
