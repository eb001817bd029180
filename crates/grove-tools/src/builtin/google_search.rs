// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{require_str, Tool};

const ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

/// Web search via the Google Custom Search JSON API.
/// Needs `GOOGLE_API_KEY` and `GOOGLE_SEARCH_ENGINE_ID` in the environment.
pub struct GoogleSearchTool {
    client: reqwest::Client,
}

impl Default for GoogleSearchTool {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Tool for GoogleSearchTool {
    fn name(&self) -> &str {
        "google_search"
    }

    fn description(&self) -> &str {
        "Search the web using Google Custom Search API"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query"},
                "limit": {"type": "integer", "description": "Maximum number of results (default: 10)"}
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, input: &Value, _task_id: &str) -> anyhow::Result<Value> {
        let query = require_str(input, "query")?;
        // The API caps one page at 10 results.
        let limit = input.get("limit").and_then(Value::as_u64).unwrap_or(10).min(10);

        let api_key = std::env::var("GOOGLE_API_KEY").context("GOOGLE_API_KEY not set")?;
        let engine_id =
            std::env::var("GOOGLE_SEARCH_ENGINE_ID").context("GOOGLE_SEARCH_ENGINE_ID not set")?;

        debug!(query, limit, "google_search tool");
        let data: Value = self
            .client
            .get(ENDPOINT)
            .query(&[
                ("key", api_key.as_str()),
                ("cx", engine_id.as_str()),
                ("q", query),
                ("num", &limit.to_string()),
            ])
            .send()
            .await
            .context("google search request failed")?
            .error_for_status()
            .context("google search returned an error status")?
            .json()
            .await
            .context("google search response was not JSON")?;

        let results: Vec<Value> = data["items"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|item| {
                        json!({
                            "title": item["title"].as_str().unwrap_or(""),
                            "link": item["link"].as_str().unwrap_or(""),
                            "snippet": item["snippet"].as_str().unwrap_or(""),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        let total = data["searchInformation"]["totalResults"]
            .as_str()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);

        Ok(json!({"results": results, "total": total, "query": query}))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
