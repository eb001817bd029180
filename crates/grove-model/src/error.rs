// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

/// Error codes the gateway treats as throttling (back off and retry).
const THROTTLE_CODES: &[&str] = &[
    "ThrottlingException",
    "TooManyRequestsException",
    "ServiceUnavailable",
];

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The connection was established but the response did not arrive in
    /// time.  Backed off harder than plain throttling.
    #[error("read timeout waiting for model response")]
    Timeout,

    /// The service answered with an error payload.
    #[error("bedrock error {code} (http {status}): {message}")]
    Api {
        code: String,
        status: u16,
        message: String,
    },

    /// Transport-level failure before any response arrived.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("malformed converse response: {0}")]
    Decode(#[source] serde_json::Error),
}

impl ModelError {
    /// The error code published on `throttle_exception:{model}`.
    pub fn error_code(&self) -> &str {
        match self {
            Self::Timeout => "ReadTimeoutError",
            Self::Api { code, .. } => code,
            Self::Http(_) => "HttpError",
            Self::Decode(_) => "DecodeError",
        }
    }

    /// `Some(extra backoff)` when this error is recoverable by waiting:
    /// 60 s for a read timeout, 30 s for the throttling family.  `None`
    /// means the error must propagate.
    pub fn extra_backoff(&self) -> Option<Duration> {
        match self {
            Self::Timeout => Some(Duration::from_secs(60)),
            Self::Api { code, .. } if THROTTLE_CODES.contains(&code.as_str()) => {
                Some(Duration::from_secs(30))
            }
            _ => None,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn api(code: &str) -> ModelError {
        ModelError::Api {
            code: code.into(),
            status: 400,
            message: String::new(),
        }
    }

    #[test]
    fn read_timeout_backs_off_sixty_seconds() {
        assert_eq!(
            ModelError::Timeout.extra_backoff(),
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn throttling_family_backs_off_thirty_seconds() {
        for code in ["ThrottlingException", "TooManyRequestsException", "ServiceUnavailable"] {
            assert_eq!(api(code).extra_backoff(), Some(Duration::from_secs(30)), "{code}");
        }
    }

    #[test]
    fn other_api_errors_are_not_recoverable() {
        assert_eq!(api("ValidationException").extra_backoff(), None);
        assert_eq!(api("AccessDeniedException").extra_backoff(), None);
    }

    #[test]
    fn error_code_names_the_timeout() {
        assert_eq!(ModelError::Timeout.error_code(), "ReadTimeoutError");
        assert_eq!(api("ThrottlingException").error_code(), "ThrottlingException");
    }
}
