//! Error types for market-data providers.

use std::time::Duration;

/// Failure of a single provider query.
///
/// Every variant is recoverable: the oracle logs it and moves on to the
/// next provider in the chain.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Network failure or body decode failure inside reqwest.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response other than "not found".
    #[error("unexpected status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (truncated).
        body: String,
    },

    /// Body parsed but a required field could not be interpreted.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The provider did not answer within its time budget.
    #[error("provider timed out after {0:?}")]
    Timeout(Duration),

    /// The provider panicked mid-query.
    #[error("provider panicked: {0}")]
    Panicked(String),
}

impl ProviderError {
    /// Build a status error, keeping at most 256 bytes of body for logs.
    pub fn status(status: reqwest::StatusCode, body: String) -> Self {
        let mut body = body;
        if body.len() > 256 {
            let mut cut = 256;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Self::Status {
            status: status.as_u16(),
            body,
        }
    }
}
