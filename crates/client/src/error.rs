use std::path::PathBuf;

use fleet_core::WaitError;
use thiserror::Error;

/// Failures talking to the orchestrator.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
        body: String,
    },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read CA certificate {}: {source}", path.display())]
    CaCert {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<ClientError> for WaitError {
    fn from(err: ClientError) -> Self {
        WaitError::transport(err)
    }
}
