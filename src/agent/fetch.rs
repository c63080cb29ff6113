//! Network fetch abstraction.
//!
//! The host supplies the network: the agent only ever talks to it through
//! this trait, so tests substitute a scripted implementation and the binary
//! wires in the reqwest-backed upstream client.

use async_trait::async_trait;
use thiserror::Error;

use super::keys::InterceptedRequest;
use super::store::ResponseSnapshot;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to reach upstream for `{url}`: {reason}")]
    Connect { url: String, reason: String },
    #[error("upstream request for `{url}` failed: {reason}")]
    Request { url: String, reason: String },
    #[error("failed to read upstream body for `{url}`: {reason}")]
    Body { url: String, reason: String },
}

/// Issues one network request and buffers the full response.
///
/// A returned snapshot is a valid response whatever its status; only
/// connectivity-level failures surface as errors.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<ResponseSnapshot, FetchError>;
}
