// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Model catalog: short names → Bedrock model/profile identifiers.
//!
//! The catalog itself lives in the store (one JSON document maintained by
//! the operator); this module only knows its shape and the resolution rule.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Already a concrete Bedrock identifier — passed through without a catalog
/// lookup.  Covers full ARNs and cross-region inference profile ids.
pub fn is_fully_qualified(model: &str) -> bool {
    model.starts_with("arn:") || model.starts_with("us.") || model.starts_with("eu.")
}

/// One catalog row.  Operators may keep extra bookkeeping fields next to the
/// ARN; they are preserved but never interpreted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub arn: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelCatalog(pub HashMap<String, CatalogEntry>);

impl ModelCatalog {
    /// Resolve `model` to a concrete identifier: fully-qualified names pass
    /// through, short names are looked up.  `None` for unknown short names.
    pub fn resolve<'a>(&'a self, model: &'a str) -> Option<&'a str> {
        if is_fully_qualified(model) {
            return Some(model);
        }
        self.0.get(model).map(|e| e.arn.as_str())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ModelCatalog {
        serde_json::from_value(serde_json::json!({
            "sonnet45": {"arn": "us.anthropic.claude-sonnet-4-5-20250929-v1:0", "family": "claude"},
            "haiku45": {"arn": "us.anthropic.claude-haiku-4-5-20251001-v1:0"}
        }))
        .unwrap()
    }

    #[test]
    fn arn_and_profile_prefixes_are_fully_qualified() {
        assert!(is_fully_qualified("arn:aws:bedrock:us-east-1::foundation-model/x"));
        assert!(is_fully_qualified("us.anthropic.claude-sonnet-4-5-20250929-v1:0"));
        assert!(is_fully_qualified("eu.amazon.nova-pro-v1:0"));
        assert!(!is_fully_qualified("sonnet45"));
    }

    #[test]
    fn short_name_resolves_through_catalog() {
        let c = catalog();
        assert_eq!(
            c.resolve("haiku45"),
            Some("us.anthropic.claude-haiku-4-5-20251001-v1:0")
        );
    }

    #[test]
    fn fully_qualified_passes_through_without_lookup() {
        let c = ModelCatalog::default();
        assert_eq!(c.resolve("us.some.model-v1:0"), Some("us.some.model-v1:0"));
    }

    #[test]
    fn unknown_short_name_is_none() {
        assert_eq!(catalog().resolve("opus99"), None);
    }

    #[test]
    fn extra_catalog_fields_survive_round_trip() {
        let c = catalog();
        let text = serde_json::to_string(&c).unwrap();
        let back: ModelCatalog = serde_json::from_str(&text).unwrap();
        assert_eq!(back.0["sonnet45"].extra["family"], "claude");
    }
}
