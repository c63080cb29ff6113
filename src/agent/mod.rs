//! Scorta cache agent.
//!
//! The interception core, expressed as three lifecycle hooks over injected
//! host capabilities:
//!
//! - **install**: bulk-precache the resource list into a named cache
//! - **activate**: claim already-open client sessions immediately
//! - **fetch**: per-request routing between cache and network, with a
//!   detached stale-while-revalidate refresh on cache hits
//!
//! The host owns scheduling: it awaits install and activate before serving
//! and invokes fetch once per intercepted request. Storage ([`CacheStore`])
//! and the network ([`Fetch`]) are injected so tests can substitute fakes.

mod activate;
mod config;
mod fetch;
mod install;
mod keys;
mod policy;
mod router;
mod store;

pub use activate::{Activator, SessionControl};
pub use config::{AgentConfig, DEFAULT_CACHE_VERSION, default_resources};
pub use fetch::{Fetch, FetchError};
pub use install::{InstallError, Installer};
pub use keys::{CacheKey, InterceptedRequest};
pub use policy::{BypassReason, RouteDecision, RoutePolicy};
pub use router::RequestRouter;
pub use store::{CacheHandle, CacheStore, MemoryStore, ResponseSnapshot, StoreError};

use std::sync::Arc;

/// The three lifecycle hooks wired over one set of injected capabilities.
pub struct CacheAgent {
    installer: Installer,
    activator: Activator,
    router: RequestRouter,
}

impl CacheAgent {
    pub fn new(
        config: AgentConfig,
        store: Arc<dyn CacheStore>,
        fetch: Arc<dyn Fetch>,
        sessions: Arc<dyn SessionControl>,
    ) -> Self {
        let router = RequestRouter::new(&config, store.clone(), fetch.clone());
        let installer = Installer::new(config, store, fetch, sessions.clone());
        let activator = Activator::new(sessions);

        Self {
            installer,
            activator,
            router,
        }
    }

    /// The install hook; must complete before this version serves traffic.
    pub async fn handle_install(&self) -> Result<(), InstallError> {
        self.installer.handle_install().await
    }

    /// The activate hook; must complete before this version serves traffic.
    pub async fn handle_activate(&self) {
        self.activator.handle_activate().await;
    }

    /// The fetch hook; invoked once per intercepted request.
    pub async fn handle_fetch(
        &self,
        request: InterceptedRequest,
    ) -> Result<ResponseSnapshot, FetchError> {
        self.router.handle_fetch(request).await
    }
}
