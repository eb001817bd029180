// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! PubMed search via the NCBI E-utilities REST API (esearch + esummary).

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{require_str, Tool};

const ESEARCH: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi";
const ESUMMARY: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esummary.fcgi";

pub struct PubMedSearchTool {
    client: reqwest::Client,
}

impl Default for PubMedSearchTool {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Tool for PubMedSearchTool {
    fn name(&self) -> &str {
        "pubmed_search"
    }

    fn description(&self) -> &str {
        "Search PubMed and PubMed Central databases for scientific articles"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query string"},
                "limit": {"type": "integer", "description": "Max results (default: 10)"}
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, input: &Value, _task_id: &str) -> anyhow::Result<Value> {
        let query = require_str(input, "query")?;
        let limit = input.get("limit").and_then(Value::as_u64).unwrap_or(10);

        debug!(query, limit, "pubmed_search tool");
        let search: Value = self
            .client
            .get(ESEARCH)
            .query(&[
                ("db", "pubmed"),
                ("term", query),
                ("retmax", &limit.to_string()),
                ("retmode", "json"),
            ])
            .send()
            .await
            .context("pubmed esearch request failed")?
            .error_for_status()?
            .json()
            .await
            .context("pubmed esearch response was not JSON")?;

        let total = search["esearchresult"]["count"]
            .as_str()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);
        let ids: Vec<String> = search["esearchresult"]["idlist"]
            .as_array()
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        if ids.is_empty() {
            return Ok(json!({"results": [], "total": total, "query": query}));
        }

        let summary: Value = self
            .client
            .get(ESUMMARY)
            .query(&[("db", "pubmed"), ("id", &ids.join(",")), ("retmode", "json")])
            .send()
            .await
            .context("pubmed esummary request failed")?
            .error_for_status()?
            .json()
            .await
            .context("pubmed esummary response was not JSON")?;

        let results: Vec<Value> = ids
            .iter()
            .map(|id| {
                let doc = &summary["result"][id];
                json!({
                    "id": format!("PMID:{id}"),
                    "title": doc["title"].as_str().unwrap_or("No title"),
                    "abstract": doc["elocationid"].as_str().unwrap_or(""),
                    "source": "PubMed",
                })
            })
            .collect();

        Ok(json!({"results": results, "total": total, "query": query}))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_requires_query() {
        let schema = PubMedSearchTool::default().input_schema();
        assert_eq!(schema["required"], json!(["query"]));
    }

    #[tokio::test]
    async fn missing_query_is_an_error() {
        let err = PubMedSearchTool::default().invoke(&json!({}), "t").await.unwrap_err();
        assert!(err.to_string().contains("query"));
    }
}
