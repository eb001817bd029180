// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! AWS Signature Version 4 request signing.
//!
//! Implemented locally with `sha2` and `hex` (already workspace dependencies)
//! to avoid pulling in the AWS SDK.  Only what a `POST` with a JSON body to
//! bedrock-runtime needs is supported.

use sha2::{Digest, Sha256};

/// Credentials read from the environment by the caller.
pub(crate) struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub session_token: Option<String>,
}

/// Everything SigV4 needs to know about one request.
pub(crate) struct SigningRequest<'a> {
    pub host: &'a str,
    pub path: &'a str,
    pub region: &'a str,
    pub service: &'a str,
    /// `YYYYMMDDTHHMMSSZ`
    pub amz_date: &'a str,
    pub body: &'a [u8],
}

/// Compute the `Authorization` header value for `req`.
///
/// The signed header set is fixed to `content-type`, `host`, `x-amz-date`
/// and, when a session token is present, `x-amz-security-token` — the caller
/// must send exactly those headers with the values used here.
pub(crate) fn authorization_header(creds: &Credentials, req: &SigningRequest<'_>) -> String {
    let date = &req.amz_date[..8];

    let mut headers: Vec<(&str, &str)> = vec![
        ("content-type", "application/json"),
        ("host", req.host),
        ("x-amz-date", req.amz_date),
    ];
    if let Some(tok) = &creds.session_token {
        headers.push(("x-amz-security-token", tok.as_str()));
    }
    headers.sort_by_key(|&(k, _)| k);

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(k, _)| *k)
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "POST\n{}\n\n{}\n{}\n{}",
        req.path,
        canonical_headers,
        signed_headers,
        hex_sha256(req.body),
    );

    let credential_scope = format!("{}/{}/{}/aws4_request", date, req.region, req.service);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        req.amz_date,
        credential_scope,
        hex_sha256(canonical_request.as_bytes()),
    );

    let signing_key = derive_signing_key(creds.secret_key.as_bytes(), date, req.region, req.service);
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    format!(
        "AWS4-HMAC-SHA256 Credential={}/{},SignedHeaders={},Signature={}",
        creds.access_key, credential_scope, signed_headers, signature
    )
}

fn sha256(data: &[u8]) -> Vec<u8> {
    let mut h = Sha256::new();
    h.update(data);
    h.finalize().to_vec()
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// HMAC-SHA256 computed without the `hmac` crate using the raw SHA256 primitive.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    const BLOCK: usize = 64;
    let norm_key = if key.len() > BLOCK {
        sha256(key)
    } else {
        key.to_vec()
    };
    let mut padded = [0u8; BLOCK];
    padded[..norm_key.len()].copy_from_slice(&norm_key);
    let ipad: Vec<u8> = padded.iter().map(|&b| b ^ 0x36).collect();
    let opad: Vec<u8> = padded.iter().map(|&b| b ^ 0x5c).collect();
    let inner = {
        let mut h = Sha256::new();
        h.update(&ipad);
        h.update(data);
        h.finalize().to_vec()
    };
    let mut h = Sha256::new();
    h.update(&opad);
    h.update(&inner);
    h.finalize().to_vec()
}

fn derive_signing_key(secret: &[u8], date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_secret = [b"AWS4", secret].concat();
    let k_date = hmac_sha256(&k_secret, date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// Percent-encode everything outside the unreserved set, keeping `/`
/// (model ids contain `.` and `:`; `:` must be encoded in the path).
pub(crate) fn urlencoded(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 2);
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(b as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
