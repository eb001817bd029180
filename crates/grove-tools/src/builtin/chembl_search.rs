// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! ChEMBL lookup via the public EBI web services.

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{require_str, Tool};

const BASE: &str = "https://www.ebi.ac.uk/chembl/api/data";

pub struct ChemblSearchTool {
    client: reqwest::Client,
}

impl Default for ChemblSearchTool {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

/// Map the entity type argument to a ChEMBL resource path.
fn resource_for(entity_type: &str) -> anyhow::Result<&'static str> {
    match entity_type {
        "compound" => Ok("molecule"),
        "target" => Ok("target"),
        "drug" => Ok("drug"),
        other => anyhow::bail!("unknown entity_type '{other}' (expected compound, target, or drug)"),
    }
}

#[async_trait]
impl Tool for ChemblSearchTool {
    fn name(&self) -> &str {
        "chembl_search"
    }

    fn description(&self) -> &str {
        "Search ChEMBL database for compounds, targets, or other entities"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query (compound name, ChEMBL ID, etc.)"},
                "entity_type": {"type": "string", "description": "Entity type: compound, target, drug (default: compound)"},
                "limit": {"type": "integer", "description": "Maximum results (default: 10)"}
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, input: &Value, _task_id: &str) -> anyhow::Result<Value> {
        let query = require_str(input, "query")?;
        let entity_type = input
            .get("entity_type")
            .and_then(Value::as_str)
            .unwrap_or("compound");
        let limit = input.get("limit").and_then(Value::as_u64).unwrap_or(10);
        let resource = resource_for(entity_type)?;

        debug!(query, entity_type, limit, "chembl_search tool");
        let data: Value = self
            .client
            .get(format!("{BASE}/{resource}/search"))
            .query(&[
                ("q", query),
                ("format", "json"),
                ("limit", &limit.to_string()),
            ])
            .send()
            .await
            .context("chembl search request failed")?
            .error_for_status()
            .context("chembl search returned an error status")?
            .json()
            .await
            .context("chembl search response was not JSON")?;

        let total = data["page_meta"]["total_count"].as_u64().unwrap_or(0);
        // The result list key matches the resource: `molecules`, `targets`, …
        let list_key = format!("{resource}s");
        let results = data[&list_key].as_array().cloned().unwrap_or_default();

        Ok(json!({
            "results": results,
            "total": total,
            "query": query,
            "entity_type": entity_type,
        }))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_types_map_to_resources() {
        assert_eq!(resource_for("compound").unwrap(), "molecule");
        assert_eq!(resource_for("target").unwrap(), "target");
        assert_eq!(resource_for("drug").unwrap(), "drug");
        assert!(resource_for("protein").is_err());
    }

    #[tokio::test]
    async fn missing_query_is_an_error() {
        let err = ChemblSearchTool::default().invoke(&json!({}), "t").await.unwrap_err();
        assert!(err.to_string().contains("query"));
    }

    #[tokio::test]
    async fn bad_entity_type_is_an_error() {
        let err = ChemblSearchTool::default()
            .invoke(&json!({"query": "aspirin", "entity_type": "planet"}), "t")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("entity_type"));
    }
}
