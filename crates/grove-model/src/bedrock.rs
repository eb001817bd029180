// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Bedrock Converse driver — native `POST /model/{modelId}/converse` with
//! SigV4 authentication.
//!
//! # Credentials
//! Read from env vars on every call (they rotate under STS):
//! - `AWS_ACCESS_KEY_ID`
//! - `AWS_SECRET_ACCESS_KEY`
//! - `AWS_SESSION_TOKEN` (optional, for temporary credentials)
//! - `AWS_DEFAULT_REGION` or `AWS_REGION` (fallback: `us-east-1`)

use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, error};

use grove_config::ModelConfig;

use crate::error::ModelError;
use crate::sigv4::{authorization_header, urlencoded, Credentials, SigningRequest};
use crate::types::{ConverseResponse, Message, ToolConfig};

pub struct BedrockClient {
    region: String,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
}

impl BedrockClient {
    pub fn new(region: Option<String>, max_tokens: u32, temperature: f32, timeout_secs: u64) -> Self {
        let region = region
            .or_else(|| std::env::var("AWS_DEFAULT_REGION").ok())
            .or_else(|| std::env::var("AWS_REGION").ok())
            .unwrap_or_else(|| "us-east-1".into());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            region,
            max_tokens,
            temperature,
            client,
        }
    }

    pub fn from_config(cfg: &ModelConfig) -> Self {
        Self::new(
            cfg.aws_region.clone(),
            cfg.max_tokens,
            cfg.temperature,
            cfg.request_timeout_secs,
        )
    }

    /// One non-streaming Converse call.
    ///
    /// On an API error outside the throttling family the request body is
    /// dumped to a diagnostic file in the temp dir before returning, so the
    /// offending payload survives the process.
    pub async fn converse(
        &self,
        model_id: &str,
        messages: &[Message],
        system_prompt: &str,
        tool_config: Option<&ToolConfig>,
    ) -> Result<ConverseResponse, ModelError> {
        let creds = load_credentials().map_err(|e| ModelError::Api {
            code: "CredentialsError".into(),
            status: 0,
            message: e.to_string(),
        })?;

        let body = build_request_body(
            messages,
            system_prompt,
            tool_config,
            self.max_tokens,
            self.temperature,
        );
        let body_bytes = serde_json::to_vec(&body).map_err(ModelError::Decode)?;

        let host = format!("bedrock-runtime.{}.amazonaws.com", self.region);
        let path = format!("/model/{}/converse", urlencoded(model_id));
        let url = format!("https://{host}{path}");
        let amz_date = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();

        let authorization = authorization_header(
            &creds,
            &SigningRequest {
                host: &host,
                path: &path,
                region: &self.region,
                service: "bedrock",
                amz_date: &amz_date,
                body: &body_bytes,
            },
        );

        debug!(model = %model_id, region = %self.region, messages = messages.len(), "sending converse request");

        let mut req = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .header("host", &host)
            .header("x-amz-date", &amz_date)
            .header("Authorization", &authorization)
            .body(body_bytes.clone());
        if let Some(tok) = &creds.session_token {
            req = req.header("x-amz-security-token", tok);
        }

        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return Err(ModelError::Timeout),
            Err(e) => return Err(ModelError::Http(e)),
        };

        let status = resp.status();
        if !status.is_success() {
            let code = error_code_from_headers(&resp);
            let text = resp.text().await.unwrap_or_default();
            let code = code
                .or_else(|| error_code_from_body(&text))
                .unwrap_or_else(|| default_code_for_status(status.as_u16()));
            let err = ModelError::Api {
                code,
                status: status.as_u16(),
                message: truncate(&text, 2000),
            };
            if err.extra_backoff().is_none() {
                dump_payload(&body_bytes);
            }
            return Err(err);
        }

        let text = match resp.text().await {
            Ok(t) => t,
            Err(e) if e.is_timeout() => return Err(ModelError::Timeout),
            Err(e) => return Err(ModelError::Http(e)),
        };
        serde_json::from_str(&text).map_err(ModelError::Decode)
    }
}

/// Assemble the Converse request body.  Public so tests (and the wire-format
/// suite) can assert the exact JSON without a network call.
pub fn build_request_body(
    messages: &[Message],
    system_prompt: &str,
    tool_config: Option<&ToolConfig>,
    max_tokens: u32,
    temperature: f32,
) -> Value {
    let mut body = json!({
        "messages": messages,
        "system": [{"text": system_prompt}],
        "inferenceConfig": {
            "maxTokens": max_tokens,
            "temperature": temperature,
        }
    });
    if let Some(tc) = tool_config {
        if !tc.tools.is_empty() {
            body["toolConfig"] = json!(tc);
        }
    }
    body
}

fn load_credentials() -> anyhow::Result<Credentials> {
    let access_key = std::env::var("AWS_ACCESS_KEY_ID").context("AWS_ACCESS_KEY_ID not set")?;
    let secret_key =
        std::env::var("AWS_SECRET_ACCESS_KEY").context("AWS_SECRET_ACCESS_KEY not set")?;
    Ok(Credentials {
        access_key,
        secret_key,
        session_token: std::env::var("AWS_SESSION_TOKEN").ok(),
    })
}

/// `x-amzn-errortype` carries `Code` or `Code:http://…`; keep the code.
fn error_code_from_headers(resp: &reqwest::Response) -> Option<String> {
    resp.headers()
        .get("x-amzn-errortype")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(':').next().unwrap_or(s).to_string())
}

fn error_code_from_body(body: &str) -> Option<String> {
    let v: Value = serde_json::from_str(body).ok()?;
    v.get("__type")
        .and_then(Value::as_str)
        .map(|s| s.rsplit('#').next().unwrap_or(s).to_string())
}

fn default_code_for_status(status: u16) -> String {
    match status {
        429 => "ThrottlingException".into(),
        503 => "ServiceUnavailable".into(),
        other => format!("Http{other}"),
    }
}

fn dump_payload(body: &[u8]) {
    let suffix = &uuid::Uuid::new_v4().simple().to_string()[..6];
    let path = std::env::temp_dir().join(format!("grove_converse_error_{suffix}.json"));
    match std::fs::write(&path, body) {
        Ok(()) => error!(path = %path.display(), "converse request failed; payload dumped"),
        Err(e) => error!(error = %e, "converse request failed and payload dump failed too"),
    }
}

fn truncate(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        s.to_string()
    } else {
        format!("{}...[truncated {} bytes]", &s[..limit], s.len() - limit)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ToolEntry, ToolInputSchema, ToolSpec};

    #[test]
    fn request_body_has_messages_system_and_inference_config() {
        let body = build_request_body(&[Message::user("hi")], "be brief", None, 4096, 0.2);
        assert_eq!(body["system"][0]["text"], "be brief");
        assert_eq!(body["inferenceConfig"]["maxTokens"], 4096);
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(body.get("toolConfig").is_none());
    }

    #[test]
    fn request_body_includes_tool_config_when_present() {
        let tc = ToolConfig {
            tools: vec![ToolEntry {
                tool_spec: ToolSpec {
                    name: "bash".into(),
                    description: "run a command".into(),
                    input_schema: ToolInputSchema {
                        json: serde_json::json!({"type": "object"}),
                    },
                },
            }],
        };
        let body = build_request_body(&[Message::user("x")], "s", Some(&tc), 1024, 0.0);
        assert_eq!(body["toolConfig"]["tools"][0]["toolSpec"]["name"], "bash");
        assert_eq!(
            body["toolConfig"]["tools"][0]["toolSpec"]["inputSchema"]["json"]["type"],
            "object"
        );
    }

    #[test]
    fn empty_tool_config_is_omitted() {
        let tc = ToolConfig { tools: vec![] };
        let body = build_request_body(&[Message::user("x")], "s", Some(&tc), 1024, 0.0);
        assert!(body.get("toolConfig").is_none());
    }

    #[test]
    fn error_code_from_body_strips_namespace() {
        assert_eq!(
            error_code_from_body(r#"{"__type":"com.amazon#ThrottlingException"}"#).as_deref(),
            Some("ThrottlingException")
        );
        assert_eq!(
            error_code_from_body(r#"{"__type":"ValidationException"}"#).as_deref(),
            Some("ValidationException")
        );
        assert_eq!(error_code_from_body("not json"), None);
    }

    #[test]
    fn default_codes_map_throttle_statuses() {
        assert_eq!(default_code_for_status(429), "ThrottlingException");
        assert_eq!(default_code_for_status(503), "ServiceUnavailable");
        assert_eq!(default_code_for_status(500), "Http500");
    }

    #[test]
    fn region_falls_back_to_us_east_1() {
        // Construct with an explicit region to stay independent of env vars.
        let c = BedrockClient::new(Some("eu-north-1".into()), 2048, 0.5, 60);
        assert_eq!(c.region, "eu-north-1");
        assert_eq!(c.max_tokens, 2048);
    }
}
