// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Conversation repair and read-side helpers.
//!
//! Writers append to the log freely — including processes that die between
//! an assistant message and its tool results.  Instead of policing every
//! writer, [`repair`] restores the structural rules the Converse API
//! enforces, at read time, for each turn independently:
//!
//! - no two consecutive messages share a role;
//! - every assistant `toolUse` id is answered by exactly one `toolResult`
//!   with that id in the immediately following user message, in id order;
//! - no orphan `toolResult` blocks;
//! - `message_number` is dense `0..n-1`.
//!
//! Repair is pure and idempotent: `repair(repair(x)) == repair(x)`.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use grove_model::{ContentBlock, Role, ToolResultBlock};
use grove_store::{StoredMessage, Turn};

/// Substituted for a tool result that never arrived.
pub const MISSING_TOOL_RESULT_TEXT: &str =
    "Tool use was stopped by an error or a user interruption.";

/// Inserted between consecutive assistant messages that have no pending
/// tool-use ids to answer (a `max_tokens` continuation).
pub const CONTINUATION_TEXT: &str = "Continue from where you left off.";

pub fn repair(history: &[Turn]) -> Vec<Turn> {
    history.iter().map(repair_turn).collect()
}

fn repair_turn(turn: &Turn) -> Turn {
    // Index every toolResult in the turn by id.  `None` marks a result as
    // consumed so it cannot be delivered twice.
    let mut available: HashMap<String, Option<ToolResultBlock>> = HashMap::new();
    for msg in &turn.messages {
        if msg.role == Role::User {
            for block in &msg.content {
                if let ContentBlock::ToolResult(tr) = block {
                    available.insert(tr.tool_use_id.clone(), Some(tr.clone()));
                }
            }
        }
    }

    let mut out: Vec<StoredMessage> = Vec::new();
    // Ids the assistant has actually requested so far in this turn; a
    // toolResult answering anything else is an orphan and must not survive.
    let mut requested: HashSet<String> = HashSet::new();
    // Starting from `assistant` accepts a leading user message.
    let mut last_role = Role::Assistant;

    for msg in &turn.messages {
        match msg.role {
            Role::Assistant => {
                if last_role == Role::Assistant {
                    if let Some(prev) = out.last() {
                        let answers = answers_for(prev, &mut available, msg.timestamp);
                        out.push(answers);
                    }
                }
                requested.extend(
                    msg.content
                        .iter()
                        .filter_map(|b| b.as_tool_use().map(|tu| tu.tool_use_id.clone())),
                );
                out.push(msg.clone());
                last_role = Role::Assistant;
            }
            Role::User => {
                // Keep toolResult blocks only if they answer a requested id
                // that has not been consumed; everything else is kept
                // unconditionally.
                let mut kept: Vec<ContentBlock> = Vec::new();
                for block in &msg.content {
                    match block {
                        ContentBlock::ToolResult(tr) => {
                            if requested.contains(&tr.tool_use_id) {
                                if let Some(slot) = available.get_mut(&tr.tool_use_id) {
                                    if slot.take().is_some() {
                                        kept.push(block.clone());
                                    }
                                }
                            }
                            // Orphan results are dropped.
                        }
                        other => kept.push(other.clone()),
                    }
                }
                if !kept.is_empty() {
                    out.push(StoredMessage {
                        content: kept,
                        ..msg.clone()
                    });
                    last_role = Role::User;
                }
            }
        }
    }

    for (n, msg) in out.iter_mut().enumerate() {
        msg.message_number = n as u64;
    }

    Turn {
        turn_number: turn.turn_number,
        started_at: turn.started_at,
        messages: out,
        turn_summary: turn.turn_summary.clone(),
    }
}

/// Build the user message that answers `prev`'s tool uses: one result per
/// emitted id, in emission order, with a sentinel for anything missing.
/// With no ids to answer, a continuation stub keeps the roles alternating.
fn answers_for(
    prev: &StoredMessage,
    available: &mut HashMap<String, Option<ToolResultBlock>>,
    timestamp: f64,
) -> StoredMessage {
    let needed: Vec<String> = prev
        .content
        .iter()
        .filter_map(|b| b.as_tool_use().map(|tu| tu.tool_use_id.clone()))
        .collect();

    let content: Vec<ContentBlock> = if needed.is_empty() {
        vec![ContentBlock::text(CONTINUATION_TEXT)]
    } else {
        needed
            .into_iter()
            .map(|id| {
                match available.get_mut(&id).and_then(Option::take) {
                    Some(tr) => ContentBlock::ToolResult(tr),
                    None => {
                        warn!(tool_use_id = %id, "synthesizing missing tool result");
                        ContentBlock::ToolResult(ToolResultBlock::text(id, MISSING_TOOL_RESULT_TEXT))
                    }
                }
            })
            .collect()
    };

    StoredMessage {
        role: Role::User,
        content,
        message_number: 0,
        timestamp,
    }
}

// ─── Transcription ────────────────────────────────────────────────────────────

/// Render a conversation as readable text, one paragraph per message.
///
/// With `include_tool_details` the full tool inputs and results appear;
/// without it, tool uses collapse to `[Used {name} tool]` and results are
/// omitted.  Used for parent context in child prompts and for `query_task`.
pub fn transcribe(history: &[Turn], include_tool_details: bool) -> String {
    let mut lines: Vec<String> = Vec::new();

    for turn in history {
        for message in &turn.messages {
            match message.role {
                Role::User => {
                    for block in &message.content {
                        match block {
                            ContentBlock::Text(text) => lines.push(format!("User: {text}")),
                            ContentBlock::ToolResult(tr) if include_tool_details => {
                                let text = tr
                                    .content
                                    .last()
                                    .map(|c| c.text.as_str())
                                    .unwrap_or_default();
                                lines.push(format!("Tool Result ({}): {text}", tr.tool_use_id));
                            }
                            _ => {}
                        }
                    }
                }
                Role::Assistant => {
                    let text_parts: Vec<&str> = message
                        .content
                        .iter()
                        .filter_map(ContentBlock::as_text)
                        .collect();
                    if !text_parts.is_empty() {
                        lines.push(format!("Assistant: {}", text_parts.join(" ")));
                    }
                    for block in &message.content {
                        if let ContentBlock::ToolUse(tu) = block {
                            if include_tool_details {
                                let args = serde_json::to_string_pretty(&tu.input)
                                    .unwrap_or_else(|_| "{}".into());
                                lines.push(format!("Tool Use: {}\n  Input: {args}", tu.name));
                            } else {
                                lines.push(format!("Assistant: [Used {} tool]", tu.name));
                            }
                        }
                    }
                }
            }
        }
    }

    lines.join("\n\n")
}

/// Store-reading wrapper around [`transcribe`].
pub async fn transcribe_task(
    store: &grove_store::StateStore,
    task_id: &str,
    include_tool_details: bool,
) -> String {
    match store.conversation(task_id).await {
        Ok(Some(history)) => transcribe(&history, include_tool_details),
        _ => format!("No conversation found for task {task_id}"),
    }
}

// ─── Completion summary ───────────────────────────────────────────────────────

/// The human-readable notification a finished child sends its parent.
pub fn build_completion_message(child_task_id: &str, history: &[Turn], success: bool) -> String {
    let total_turns = history.len();

    // An assistant message immediately followed by a user message carrying
    // tool results counts as one tool iteration.
    let mut total_tool_iterations = 0usize;
    for turn in history {
        for (i, message) in turn.messages.iter().enumerate() {
            if message.role == Role::Assistant {
                if let Some(next) = turn.messages.get(i + 1) {
                    let has_results = next.role == Role::User
                        && next.content.iter().any(|b| b.as_tool_result().is_some());
                    if has_results {
                        total_tool_iterations += 1;
                    }
                }
            }
        }
    }

    let final_text = history
        .iter()
        .rev()
        .flat_map(|turn| turn.messages.iter().rev())
        .find(|m| m.role == Role::Assistant)
        .and_then(|m| m.content.iter().find_map(ContentBlock::as_text))
        .unwrap_or_default();

    let status = if success {
        "completed successfully"
    } else {
        "failed"
    };

    format!(
        "[SYSTEM] Child task {child_task_id} has {status}. \
         Ran {total_turns} turns with {total_tool_iterations} tool iterations. \
         You can continue the conversation by calling spawn_task with task_id='{child_task_id}' \
         and a new message.\n\nFinal response from child:\n{final_text}"
    )
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use grove_model::ToolUseBlock;
    use serde_json::json;

    fn assistant(blocks: Vec<ContentBlock>) -> StoredMessage {
        StoredMessage {
            role: Role::Assistant,
            content: blocks,
            message_number: 0,
            timestamp: 1.0,
        }
    }

    fn user(blocks: Vec<ContentBlock>) -> StoredMessage {
        StoredMessage {
            role: Role::User,
            content: blocks,
            message_number: 0,
            timestamp: 1.0,
        }
    }

    fn tool_use(id: &str) -> ContentBlock {
        ContentBlock::ToolUse(ToolUseBlock {
            tool_use_id: id.into(),
            name: "bash".into(),
            input: json!({}),
        })
    }

    fn tool_result(id: &str, text: &str) -> ContentBlock {
        ContentBlock::ToolResult(ToolResultBlock::text(id, text))
    }

    fn turn(messages: Vec<StoredMessage>) -> Turn {
        Turn {
            turn_number: 0,
            started_at: 0.0,
            messages,
            turn_summary: None,
        }
    }

    fn roles(t: &Turn) -> Vec<Role> {
        t.messages.iter().map(|m| m.role).collect()
    }

    fn assert_alternating(t: &Turn) {
        for pair in t.messages.windows(2) {
            assert_ne!(pair[0].role, pair[1].role, "consecutive messages share a role");
        }
    }

    fn assert_dense_numbering(t: &Turn) {
        for (i, m) in t.messages.iter().enumerate() {
            assert_eq!(m.message_number, i as u64);
        }
    }

    // ── Repair ────────────────────────────────────────────────────────────────

    #[test]
    fn well_formed_turn_is_untouched() {
        let input = vec![turn(vec![
            user(vec![ContentBlock::text("hi")]),
            assistant(vec![ContentBlock::text("hello")]),
        ])];
        let out = repair(&input);
        assert_eq!(roles(&out[0]), vec![Role::User, Role::Assistant]);
        assert_eq!(out[0].messages[1].content, vec![ContentBlock::text("hello")]);
        assert_dense_numbering(&out[0]);
    }

    #[test]
    fn missing_tool_result_is_synthesized_between_assistants() {
        // [assistant(toolUse A), assistant(text "oops")] repairs to
        // [assistant, user(toolResult A with sentinel), assistant].
        let input = vec![turn(vec![
            assistant(vec![tool_use("A")]),
            assistant(vec![ContentBlock::text("oops")]),
        ])];
        let out = repair(&input);
        let t = &out[0];
        assert_eq!(roles(t), vec![Role::Assistant, Role::User, Role::Assistant]);
        let synth = t.messages[1].content[0].as_tool_result().unwrap();
        assert_eq!(synth.tool_use_id, "A");
        assert_eq!(synth.content[0].text, MISSING_TOOL_RESULT_TEXT);
        assert_eq!(
            t.messages.iter().map(|m| m.message_number).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn late_tool_results_are_pulled_into_position() {
        // The real results arrived, but only after a second assistant
        // message was already appended.  Repair moves them in between and
        // drops the now-empty trailing user message.
        let input = vec![turn(vec![
            user(vec![ContentBlock::text("go")]),
            assistant(vec![tool_use("A"), tool_use("B")]),
            assistant(vec![ContentBlock::text("done")]),
            user(vec![tool_result("A", "ra"), tool_result("B", "rb")]),
        ])];
        let out = repair(&input);
        let t = &out[0];
        assert_eq!(
            roles(t),
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        let answers = &t.messages[2];
        assert_eq!(answers.content.len(), 2);
        assert_eq!(answers.content[0].as_tool_result().unwrap().tool_use_id, "A");
        assert_eq!(answers.content[1].as_tool_result().unwrap().tool_use_id, "B");
        assert_eq!(answers.content[0].as_tool_result().unwrap().content[0].text, "ra");
        assert_alternating(t);
    }

    #[test]
    fn results_are_ordered_by_tool_use_emission_not_arrival() {
        let input = vec![turn(vec![
            assistant(vec![tool_use("first"), tool_use("second")]),
            assistant(vec![ContentBlock::text("next")]),
            user(vec![tool_result("second", "s"), tool_result("first", "f")]),
        ])];
        let out = repair(&input);
        let answers = &out[0].messages[1];
        assert_eq!(
            answers.content[0].as_tool_result().unwrap().tool_use_id,
            "first"
        );
        assert_eq!(
            answers.content[1].as_tool_result().unwrap().tool_use_id,
            "second"
        );
    }

    #[test]
    fn orphan_tool_result_is_dropped() {
        let input = vec![turn(vec![
            user(vec![ContentBlock::text("hi")]),
            assistant(vec![ContentBlock::text("reply")]),
            user(vec![
                tool_result("ghost", "never requested"),
                ContentBlock::text("and a question"),
            ]),
        ])];
        let out = repair(&input);
        let last = out[0].messages.last().unwrap();
        assert_eq!(last.content, vec![ContentBlock::text("and a question")]);
    }

    #[test]
    fn consumed_result_is_not_delivered_twice() {
        // The same result appears both after the gap (pulled forward) and in
        // its original user message; the original occurrence must vanish,
        // taking the now-empty message with it.
        let input = vec![turn(vec![
            assistant(vec![tool_use("A")]),
            assistant(vec![ContentBlock::text("mid")]),
            user(vec![tool_result("A", "ra")]),
            assistant(vec![ContentBlock::text("end")]),
        ])];
        let out = repair(&input);
        let t = &out[0];
        assert_alternating(t);
        let delivered: Vec<&StoredMessage> = t
            .messages
            .iter()
            .filter(|m| m.content.iter().any(|b| b.as_tool_result().is_some()))
            .collect();
        assert_eq!(delivered.len(), 1, "result A delivered exactly once");
    }

    #[test]
    fn consecutive_assistants_without_tool_use_get_continuation_stub() {
        // A max_tokens cutoff: two assistant texts back to back.
        let input = vec![turn(vec![
            user(vec![ContentBlock::text("write an essay")]),
            assistant(vec![ContentBlock::text("part one")]),
            assistant(vec![ContentBlock::text("part two")]),
        ])];
        let out = repair(&input);
        let t = &out[0];
        assert_eq!(
            roles(t),
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        assert_eq!(t.messages[2].content, vec![ContentBlock::text(CONTINUATION_TEXT)]);
    }

    #[test]
    fn leading_assistant_message_is_accepted() {
        // A fresh turn opens with the assistant's reply; repair must not
        // invent anything before it.
        let input = vec![turn(vec![assistant(vec![ContentBlock::text("continuing")])])];
        let out = repair(&input);
        assert_eq!(roles(&out[0]), vec![Role::Assistant]);
    }

    #[test]
    fn empty_turn_stays_empty() {
        let out = repair(&[turn(vec![])]);
        assert!(out[0].messages.is_empty());
    }

    #[test]
    fn turn_metadata_survives_repair() {
        let mut t = turn(vec![user(vec![ContentBlock::text("x")])]);
        t.turn_number = 7;
        t.started_at = 123.5;
        t.turn_summary = Some("did things".into());
        let out = repair(&[t]);
        assert_eq!(out[0].turn_number, 7);
        assert_eq!(out[0].started_at, 123.5);
        assert_eq!(out[0].turn_summary.as_deref(), Some("did things"));
    }

    #[test]
    fn repair_is_a_fixed_point() {
        let messy = vec![
            turn(vec![
                user(vec![ContentBlock::text("go")]),
                assistant(vec![tool_use("A"), tool_use("B")]),
                assistant(vec![ContentBlock::text("hm")]),
                user(vec![tool_result("B", "rb"), tool_result("ghost", "g")]),
                assistant(vec![ContentBlock::text("first")]),
                assistant(vec![ContentBlock::text("second")]),
            ]),
            turn(vec![assistant(vec![ContentBlock::text("solo")])]),
        ];
        let once = repair(&messy);
        let twice = repair(&once);
        let json_once = serde_json::to_value(&once).unwrap();
        let json_twice = serde_json::to_value(&twice).unwrap();
        assert_eq!(json_once, json_twice);
        for t in &once {
            assert_alternating(t);
            assert_dense_numbering(t);
        }
    }

    // ── Transcription ─────────────────────────────────────────────────────────

    fn sample_history() -> Vec<Turn> {
        vec![turn(vec![
            user(vec![ContentBlock::text("look this up")]),
            assistant(vec![ContentBlock::text("on it"), tool_use("A")]),
            user(vec![tool_result("A", "found 3 papers")]),
            assistant(vec![ContentBlock::text("here they are")]),
        ])]
    }

    #[test]
    fn transcription_without_details_collapses_tools() {
        let text = transcribe(&sample_history(), false);
        assert!(text.contains("User: look this up"));
        assert!(text.contains("Assistant: [Used bash tool]"));
        assert!(!text.contains("found 3 papers"));
    }

    #[test]
    fn transcription_with_details_includes_results_and_inputs() {
        let text = transcribe(&sample_history(), true);
        assert!(text.contains("Tool Use: bash"));
        assert!(text.contains("Tool Result (A): found 3 papers"));
    }

    // ── Completion summary ────────────────────────────────────────────────────

    #[test]
    fn completion_message_reports_turns_tools_and_final_text() {
        let history = vec![turn(vec![
            user(vec![ContentBlock::text("hi")]),
            assistant(vec![tool_use("A")]),
            user(vec![tool_result("A", "r")]),
            assistant(vec![ContentBlock::text("done")]),
        ])];
        let msg = build_completion_message("sub_work_abc123", &history, true);
        assert!(msg.contains("sub_work_abc123"));
        assert!(msg.contains("completed successfully"));
        assert!(msg.contains("Ran 1 turns with 1 tool iterations"));
        assert!(msg.contains("Final response from child:\ndone"));
        assert!(msg.contains("spawn_task with task_id='sub_work_abc123'"));
    }

    #[test]
    fn completion_message_reports_failure() {
        let msg = build_completion_message("c", &[], false);
        assert!(msg.contains("has failed"));
        assert!(msg.contains("Ran 0 turns with 0 tool iterations"));
    }
}
