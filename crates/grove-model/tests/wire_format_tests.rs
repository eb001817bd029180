// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Wire-format tests: the exact JSON grove sends to and accepts from the
//! Converse endpoint, with no network involved.

use serde_json::json;

use grove_model::{
    build_request_body, ContentBlock, ConverseResponse, Message, Role, StopReason, ToolConfig,
    ToolEntry, ToolInputSchema, ToolResultBlock, ToolSpec, ToolUseBlock,
};

fn think_tool_config() -> ToolConfig {
    ToolConfig {
        tools: vec![ToolEntry {
            tool_spec: ToolSpec {
                name: "think".into(),
                description: "Internal reasoning - thoughts discarded, conclusions kept".into(),
                input_schema: ToolInputSchema {
                    json: json!({
                        "type": "object",
                        "properties": {
                            "thoughts": {"type": "string"},
                            "conclusions": {"type": "string"}
                        },
                        "required": ["thoughts", "conclusions"]
                    }),
                },
            },
        }],
    }
}

#[test]
fn full_request_body_matches_converse_contract() {
    let messages = vec![
        Message::user("find the paper"),
        Message {
            role: Role::Assistant,
            content: vec![
                ContentBlock::text("searching"),
                ContentBlock::ToolUse(ToolUseBlock {
                    tool_use_id: "tu_1".into(),
                    name: "think".into(),
                    input: json!({"thoughts": "…", "conclusions": "proceed"}),
                }),
            ],
        },
        Message {
            role: Role::User,
            content: vec![ContentBlock::ToolResult(ToolResultBlock::text(
                "tu_1",
                "{\"conclusions\":\"proceed\"}",
            ))],
        },
    ];

    let body = build_request_body(&messages, "You are grove.", Some(&think_tool_config()), 4096, 0.2);

    assert_eq!(
        body,
        json!({
            "messages": [
                {"role": "user", "content": [{"text": "find the paper"}]},
                {"role": "assistant", "content": [
                    {"text": "searching"},
                    {"toolUse": {"toolUseId": "tu_1", "name": "think",
                                 "input": {"thoughts": "…", "conclusions": "proceed"}}}
                ]},
                {"role": "user", "content": [
                    {"toolResult": {"toolUseId": "tu_1",
                                    "content": [{"text": "{\"conclusions\":\"proceed\"}"}]}}
                ]}
            ],
            "system": [{"text": "You are grove."}],
            "inferenceConfig": {"maxTokens": 4096, "temperature": 0.2},
            "toolConfig": {"tools": [{"toolSpec": {
                "name": "think",
                "description": "Internal reasoning - thoughts discarded, conclusions kept",
                "inputSchema": {"json": {
                    "type": "object",
                    "properties": {
                        "thoughts": {"type": "string"},
                        "conclusions": {"type": "string"}
                    },
                    "required": ["thoughts", "conclusions"]
                }}
            }}]}
        })
    );
}

#[test]
fn tool_use_response_parses_into_typed_blocks() {
    let raw = json!({
        "output": {"message": {"role": "assistant", "content": [
            {"text": "let me check"},
            {"toolUse": {"toolUseId": "tu_9", "name": "bash", "input": {"command": "ls"}}}
        ]}},
        "stopReason": "tool_use",
        "usage": {"inputTokens": 120, "outputTokens": 34, "totalTokens": 154}
    });
    let resp: ConverseResponse = serde_json::from_value(raw).unwrap();
    assert_eq!(resp.stop_reason, StopReason::ToolUse);
    assert!(!resp.stop_reason.ends_turn());
    let tu = resp.output.message.content[1].as_tool_use().unwrap();
    assert_eq!(tu.name, "bash");
    assert_eq!(tu.input["command"], "ls");
}

#[test]
fn stored_message_json_is_wire_compatible() {
    // Conversation logs persist ContentBlock values verbatim; what we store
    // must deserialize as what we send.
    let stored = json!([
        {"text": "done"},
        {"toolResult": {"toolUseId": "a", "content": [{"text": "r"}], "status": "error"}}
    ]);
    let blocks: Vec<ContentBlock> = serde_json::from_value(stored.clone()).unwrap();
    assert_eq!(serde_json::to_value(&blocks).unwrap(), stored);
}
