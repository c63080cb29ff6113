//! Host session control.
//!
//! The gateway process is its own "client session" host: skip-waiting and
//! claim are acknowledged as state flips plus logs, and the bootstrap path
//! orders them before the listener binds.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::info;

use crate::agent::SessionControl;

const SOURCE: &str = "infra::lifecycle";

/// Tracks whether the running version has taken control.
pub struct HostSessions {
    waiting: AtomicBool,
    controlling: AtomicBool,
}

impl HostSessions {
    pub fn new() -> Self {
        Self {
            waiting: AtomicBool::new(true),
            controlling: AtomicBool::new(false),
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting.load(Ordering::SeqCst)
    }

    pub fn is_controlling(&self) -> bool {
        self.controlling.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionControl for HostSessions {
    async fn skip_waiting(&self) {
        self.waiting.store(false, Ordering::SeqCst);
        info!(target_module = SOURCE, "waiting period skipped");
    }

    async fn claim_clients(&self) {
        self.controlling.store(true, Ordering::SeqCst);
        info!(target_module = SOURCE, "open sessions claimed");
    }
}
