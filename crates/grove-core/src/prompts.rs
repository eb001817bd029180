// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! System prompt assembly.
//!
//! The static portion is fixed at task creation and carries the root/child
//! contract; the dynamic portion is rebuilt every iteration with the date,
//! turn number, token counts, and — for children — a transcription of the
//! parent's conversation.

use chrono::Local;

use grove_store::{StateStore, TaskRecord};

use crate::conversation;

/// System prompt for the one-shot summarization call at the end of a turn.
pub const SUMMARY_SYSTEM_PROMPT: &str = "You are a concise summarizer. Summarize the key work \
     accomplished and decisions made in the provided turn. Be brief and factual.";

const BASE: &str = "You are Grove, a master orchestration agent.

CORE PRINCIPLES:
- Tool-driven: use tools to accomplish tasks
- Minimal: keep responses concise
- Observable: all state lives in the shared store

AVAILABLE TOOLS:
- bash: execute bash commands (returns stdout, stderr, returncode)
- spawn_task: spawn or resume child tasks for complex operations (returns task_id, pid)
- query_task: passively query another task's status and conversation content
- think: internal reasoning scratchpad
- google_search, pubmed_search, chembl_search: external research databases

";

const ROOT_SECTION: &str = "TASK HIERARCHY: You are the ROOT task.

ROOT TASK RESPONSIBILITIES:
You are the project orchestrator. Your conversation context (tokens) is your most precious
resource - every token spent on your own tool use or responses is a token NOT available for
understanding project state and making strategic decisions.

1. DELEGATE EVERYTHING: when given real work, break it into logical sub-tasks and spawn
   child tasks to handle them. Use spawn_task, not bash.
2. NEVER EDIT FILES YOURSELF: always delegate file editing to child tasks with specific,
   focused mandates.
3. MAXIMIZE DELEGATION VALUE: each child task operates in its own context window. By
   delegating, you multiply your effective capacity.
4. USE BASH FOR: quick inspections that inform your delegation decisions.
5. USE SPAWN_TASK FOR: any actual work. If it will take more than 3 tool calls, delegate it.
6. COORDINATE AND INTEGRATE: spawn tasks, monitor their completion (they report back to
   you), and integrate their results. You are the conductor, not the performer.

EXCEPTION: when the user is testing or debugging the task system itself and asks you not to
delegate, use all available tools other than spawn_task directly.

";

fn child_section(parent_task_id: &str) -> String {
    format!(
        "TASK HIERARCHY: You are a CHILD task. Parent task ID: {parent_task_id}
You can query your parent's conversation using the query_task tool.

CHILD TASK RESPONSIBILITIES:
You have been delegated a specific task by your parent. Your mandate is focused and bounded.

1. FOCUS ON YOUR MANDATE: complete it thoroughly within scope; do not expand beyond what
   was requested.
2. SPAWN SUB-TASKS CONSERVATIVELY: only when your mandate clearly breaks into independent
   pieces that each require substantial work.
3. USE TOOLS DIRECTLY: unlike root, you are here to execute, not just orchestrate.
4. REPORT THOROUGHLY: your final response is the summary your parent receives.

"
    )
}

/// Static portion, fixed at creation.  Root and child tasks get different
/// operating contracts.
pub fn build_static_system_prompt(parent_task_id: Option<&str>) -> String {
    match parent_task_id {
        None => format!("{BASE}{ROOT_SECTION}"),
        Some(parent) => format!("{BASE}{}", child_section(parent)),
    }
}

/// Dynamic portion, rebuilt per iteration.
pub async fn build_dynamic_system_prompt(
    store: &StateStore,
    task_data: &TaskRecord,
    turn_number: usize,
) -> String {
    let input = task_data.last_usage.input_tokens;
    let output = task_data.last_usage.output_tokens;
    let now = Local::now();

    let mut dynamic = format!(
        "\n=== CURRENT CONTEXT ===\n\
         Date: {}\n\
         Time: {}\n\
         Turn: {turn_number}\n\
         Tokens used: {} (input: {input}, output: {output})\n",
        now.format("%Y-%m-%d"),
        now.format("%H:%M:%S"),
        input + output,
    );

    if let Some(parent_id) = &task_data.parent_task_id {
        let transcript = conversation::transcribe_task(store, parent_id, true).await;
        dynamic.push_str(&format!(
            "\n\n=== PARENT TASK CONTEXT ===\n\
             You are a child process spawned to focus on a particular task. Below is a \
             transcription of the conversation your parent process ({parent_id}) had that \
             led to you being spawned. Use it to inform the full intent and context of the \
             task you've been given.\n\n{transcript}\n\n=== END PARENT CONTEXT ===\n"
        ));
    }

    dynamic
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_prompt_carries_the_delegation_contract() {
        let p = build_static_system_prompt(None);
        assert!(p.contains("ROOT task"));
        assert!(p.contains("DELEGATE EVERYTHING"));
        assert!(!p.contains("CHILD task"));
    }

    #[test]
    fn child_prompt_names_the_parent() {
        let p = build_static_system_prompt(Some("conversation_ab12cd"));
        assert!(p.contains("CHILD task"));
        assert!(p.contains("Parent task ID: conversation_ab12cd"));
        assert!(p.contains("query_task"));
        assert!(!p.contains("ROOT task"));
    }

    #[test]
    fn both_prompts_share_the_base_contract() {
        let root = build_static_system_prompt(None);
        let child = build_static_system_prompt(Some("x"));
        for p in [&root, &child] {
            assert!(p.starts_with("You are Grove"));
            assert!(p.contains("spawn_task"));
        }
    }
}
