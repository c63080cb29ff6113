//! Activator: immediate takeover of open sessions.
//!
//! Purely a control signal to the host; no data-model side effects.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

const SOURCE: &str = "agent::activate";

/// Host capability for accelerating version handoff.
///
/// `skip_waiting` is signalled at install time so the new version does not
/// sit behind the default waiting period; `claim_clients` is signalled at
/// activation to take over sessions that are already open.
#[async_trait]
pub trait SessionControl: Send + Sync {
    async fn skip_waiting(&self);
    async fn claim_clients(&self);
}

/// Claims all open client sessions when a version activates.
pub struct Activator {
    sessions: Arc<dyn SessionControl>,
}

impl Activator {
    pub fn new(sessions: Arc<dyn SessionControl>) -> Self {
        Self { sessions }
    }

    /// Take control of already-open sessions instead of waiting for their
    /// next navigation. Completion is awaited by the host before serving.
    pub async fn handle_activate(&self) {
        info!(target_module = SOURCE, "claiming open client sessions");
        self.sessions.claim_clients().await;
    }
}
