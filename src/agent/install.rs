//! Installer: bulk precache of the resource list.
//!
//! Runs exactly once per version, before the version starts intercepting
//! traffic. All listed resources are fetched first and written in one bulk
//! put, so the named cache never holds a partial install.

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tracing::info;

use super::activate::SessionControl;
use super::config::AgentConfig;
use super::fetch::{Fetch, FetchError};
use super::keys::InterceptedRequest;
use super::store::{CacheHandle as _, CacheStore, StoreError};

const SOURCE: &str = "agent::install";

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("invalid precache resource `{path}`: {reason}")]
    Resource { path: String, reason: String },
    #[error("failed to fetch `{path}` during install: {source}")]
    Fetch {
        path: String,
        #[source]
        source: FetchError,
    },
    #[error("unexpected status {status} for `{path}` during install")]
    UnexpectedStatus { path: String, status: u16 },
    #[error("failed to populate cache `{name}`: {source}")]
    Store {
        name: String,
        #[source]
        source: StoreError,
    },
}

/// Populates the named cache with every listed resource.
pub struct Installer {
    config: AgentConfig,
    store: Arc<dyn CacheStore>,
    fetch: Arc<dyn Fetch>,
    sessions: Arc<dyn SessionControl>,
}

impl Installer {
    pub fn new(
        config: AgentConfig,
        store: Arc<dyn CacheStore>,
        fetch: Arc<dyn Fetch>,
        sessions: Arc<dyn SessionControl>,
    ) -> Self {
        Self {
            config,
            store,
            fetch,
            sessions,
        }
    }

    /// Fetch-and-store every resource list entry, then skip the waiting
    /// period so this version takes over as fast as the host allows.
    ///
    /// Any fetch failure or non-success status fails the whole install and
    /// leaves the store untouched; the host gates activation on the result.
    pub async fn handle_install(&self) -> Result<(), InstallError> {
        info!(
            target_module = SOURCE,
            cache = %self.config.cache_version,
            resources = self.config.resources.len(),
            "precaching resource list"
        );

        let mut entries = Vec::with_capacity(self.config.resources.len());
        for path in &self.config.resources {
            let url = self
                .config
                .resource_url(path)
                .map_err(|err| InstallError::Resource {
                    path: path.clone(),
                    reason: err.to_string(),
                })?;

            let request = InterceptedRequest::get(url);
            let snapshot =
                self.fetch
                    .fetch(&request)
                    .await
                    .map_err(|source| InstallError::Fetch {
                        path: path.clone(),
                        source,
                    })?;

            if !snapshot.is_success() {
                return Err(InstallError::UnexpectedStatus {
                    path: path.clone(),
                    status: snapshot.status.as_u16(),
                });
            }

            entries.push((request.key(), snapshot));
        }

        let handle = self
            .store
            .open(&self.config.cache_version)
            .await
            .map_err(|source| InstallError::Store {
                name: self.config.cache_version.clone(),
                source,
            })?;

        let count = entries.len();
        handle
            .put_all(entries)
            .await
            .map_err(|source| InstallError::Store {
                name: self.config.cache_version.clone(),
                source,
            })?;

        counter!("scorta_precache_entries_total").increment(count as u64);
        info!(
            target_module = SOURCE,
            cache = %self.config.cache_version,
            entries = count,
            "install complete, skipping waiting period"
        );

        self.sessions.skip_waiting().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use axum::http::{HeaderMap, StatusCode};
    use bytes::Bytes;
    use url::Url;

    use super::*;
    use crate::agent::store::{MemoryStore, ResponseSnapshot};

    struct StaticFetch {
        by_path: Mutex<Vec<(String, Result<ResponseSnapshot, FetchError>)>>,
    }

    impl StaticFetch {
        fn new(by_path: Vec<(&str, Result<ResponseSnapshot, FetchError>)>) -> Self {
            Self {
                by_path: Mutex::new(
                    by_path
                        .into_iter()
                        .map(|(path, result)| (path.to_string(), result))
                        .collect(),
                ),
            }
        }
    }

    #[async_trait]
    impl Fetch for StaticFetch {
        async fn fetch(
            &self,
            request: &InterceptedRequest,
        ) -> Result<ResponseSnapshot, FetchError> {
            let path = request.url.path().to_string();
            let mut by_path = self.by_path.lock().expect("responses lock");
            let position = by_path.iter().position(|(p, _)| *p == path);
            match position {
                Some(index) => by_path.remove(index).1,
                None => Err(FetchError::Connect {
                    url: request.url.to_string(),
                    reason: "no scripted response".to_string(),
                }),
            }
        }
    }

    #[derive(Default)]
    struct RecordingSessions {
        skipped: AtomicBool,
        claimed: AtomicBool,
    }

    #[async_trait]
    impl SessionControl for RecordingSessions {
        async fn skip_waiting(&self) {
            self.skipped.store(true, Ordering::SeqCst);
        }

        async fn claim_clients(&self) {
            self.claimed.store(true, Ordering::SeqCst);
        }
    }

    fn ok(body: &str) -> ResponseSnapshot {
        ResponseSnapshot::new(
            StatusCode::OK,
            &HeaderMap::new(),
            Bytes::copy_from_slice(body.as_bytes()),
        )
    }

    fn config() -> AgentConfig {
        AgentConfig::new(
            Url::parse("http://localhost:3000").expect("valid origin"),
            "v1",
            vec!["/".to_string(), "/favicon.ico".to_string()],
        )
    }

    fn installer(
        store: &MemoryStore,
        fetch: StaticFetch,
        sessions: Arc<RecordingSessions>,
    ) -> Installer {
        Installer::new(config(), Arc::new(store.clone()), Arc::new(fetch), sessions)
    }

    #[tokio::test]
    async fn install_populates_every_listed_resource() {
        let store = MemoryStore::new();
        let sessions = Arc::new(RecordingSessions::default());
        let fetch = StaticFetch::new(vec![
            ("/", Ok(ok("home"))),
            ("/favicon.ico", Ok(ok("icon"))),
        ]);

        installer(&store, fetch, sessions.clone())
            .handle_install()
            .await
            .expect("install succeeds");

        assert_eq!(store.len().await, 2);
        for request in [
            InterceptedRequest::get(Url::parse("http://localhost:3000/").expect("url")),
            InterceptedRequest::get(Url::parse("http://localhost:3000/favicon.ico").expect("url")),
        ] {
            let cached = store
                .lookup(&request.key())
                .await
                .expect("lookup")
                .expect("precached entry");
            assert!(cached.is_success());
        }
        assert!(sessions.skipped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failed_fetch_leaves_store_empty() {
        let store = MemoryStore::new();
        let sessions = Arc::new(RecordingSessions::default());
        let fetch = StaticFetch::new(vec![
            ("/", Ok(ok("home"))),
            (
                "/favicon.ico",
                Err(FetchError::Connect {
                    url: "http://localhost:3000/favicon.ico".to_string(),
                    reason: "connection refused".to_string(),
                }),
            ),
        ]);

        let result = installer(&store, fetch, sessions.clone())
            .handle_install()
            .await;

        assert!(matches!(result, Err(InstallError::Fetch { .. })));
        assert!(store.is_empty().await);
        assert!(!sessions.skipped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn non_success_status_fails_install() {
        let store = MemoryStore::new();
        let sessions = Arc::new(RecordingSessions::default());
        let fetch = StaticFetch::new(vec![
            ("/", Ok(ok("home"))),
            (
                "/favicon.ico",
                Ok(ResponseSnapshot::new(
                    StatusCode::NOT_FOUND,
                    &HeaderMap::new(),
                    Bytes::new(),
                )),
            ),
        ]);

        let result = installer(&store, fetch, sessions).handle_install().await;

        match result {
            Err(InstallError::UnexpectedStatus { path, status }) => {
                assert_eq!(path, "/favicon.ico");
                assert_eq!(status, 404);
            }
            other => panic!("expected UnexpectedStatus, got {other:?}"),
        }
        assert!(store.is_empty().await);
    }
}
