//! Request router.
//!
//! One invocation per intercepted request. Listed same-origin GETs are
//! served cache-first with a detached background refresh; everything else
//! goes straight to the network.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use super::config::AgentConfig;
use super::fetch::{Fetch, FetchError};
use super::keys::InterceptedRequest;
use super::policy::{RouteDecision, RoutePolicy};
use super::store::{CacheHandle as _, CacheStore, ResponseSnapshot};

const SOURCE: &str = "agent::router";

/// Routes intercepted requests between the named cache and the network.
#[derive(Clone)]
pub struct RequestRouter {
    policy: Arc<RoutePolicy>,
    cache_name: Arc<str>,
    store: Arc<dyn CacheStore>,
    fetch: Arc<dyn Fetch>,
}

impl RequestRouter {
    pub fn new(config: &AgentConfig, store: Arc<dyn CacheStore>, fetch: Arc<dyn Fetch>) -> Self {
        Self {
            policy: Arc::new(RoutePolicy::new(&config.origin, config.resources.clone())),
            cache_name: config.cache_version.as_str().into(),
            store,
            fetch,
        }
    }

    /// Handle one fetch event.
    ///
    /// Cache hits return immediately and refresh in the background; misses
    /// wait on the refresh; bypassed requests never touch the cache. Network
    /// failures propagate only on the bypass and miss paths.
    pub async fn handle_fetch(
        &self,
        request: InterceptedRequest,
    ) -> Result<ResponseSnapshot, FetchError> {
        let decision = self.policy.decide(&request);

        if let RouteDecision::Bypass(reason) = decision {
            counter!("scorta_route_bypass_total").increment(1);
            debug!(
                target_module = SOURCE,
                path = %request.url.path(),
                reason = reason.as_str(),
                "bypassing cache"
            );
            return self.fetch.fetch(&request).await;
        }

        let key = request.key();
        let cached = match self.store.lookup(&key).await {
            Ok(cached) => cached,
            Err(err) => {
                warn!(
                    target_module = SOURCE,
                    url = %key.url,
                    error = %err,
                    "cache lookup failed, treating as miss"
                );
                None
            }
        };

        match cached {
            Some(snapshot) => {
                counter!("scorta_cache_hit_total").increment(1);
                debug!(
                    target_module = SOURCE,
                    path = %request.url.path(),
                    outcome = "hit",
                    "serving cached response"
                );
                self.spawn_refresh(request);
                Ok(snapshot)
            }
            None => {
                counter!("scorta_cache_miss_total").increment(1);
                debug!(
                    target_module = SOURCE,
                    path = %request.url.path(),
                    outcome = "miss",
                    "no cached response, refreshing inline"
                );
                self.refresh(&request).await
            }
        }
    }

    /// Fetch from the network, persisting a clone on success.
    ///
    /// Only responses with a status in [200, 300) are written back; anything
    /// else is returned to the caller with the cache left untouched, so a
    /// failed refresh never evicts a stale entry.
    pub async fn refresh(
        &self,
        request: &InterceptedRequest,
    ) -> Result<ResponseSnapshot, FetchError> {
        let snapshot = match self.fetch.fetch(request).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                counter!("scorta_refresh_failure_total").increment(1);
                return Err(err);
            }
        };

        if !snapshot.is_success() {
            counter!("scorta_refresh_skipped_total").increment(1);
            debug!(
                target_module = SOURCE,
                url = %request.url,
                status = snapshot.status.as_u16(),
                "refresh response not cacheable, keeping prior entry"
            );
            return Ok(snapshot);
        }

        match self.store.open(&self.cache_name).await {
            Ok(handle) => {
                if let Err(err) = handle.put(request.key(), snapshot.clone()).await {
                    warn!(
                        target_module = SOURCE,
                        url = %request.url,
                        error = %err,
                        "failed to store refreshed response, cache stays stale"
                    );
                } else {
                    debug!(
                        target_module = SOURCE,
                        url = %request.url,
                        cache = %self.cache_name,
                        "cache entry updated"
                    );
                }
            }
            Err(err) => {
                warn!(
                    target_module = SOURCE,
                    cache = %self.cache_name,
                    error = %err,
                    "failed to open cache for refresh, cache stays stale"
                );
            }
        }

        counter!("scorta_refresh_success_total").increment(1);
        Ok(snapshot)
    }

    /// Detached stale-while-revalidate refresh for the cache-hit path.
    ///
    /// No caller awaits the task: errors are logged and discarded, and the
    /// already-delivered response is unaffected. No cancellation, no timeout.
    fn spawn_refresh(&self, request: InterceptedRequest) {
        let router = self.clone();
        tokio::spawn(async move {
            if let Err(err) = router.refresh(&request).await {
                warn!(
                    target_module = SOURCE,
                    url = %request.url,
                    error = %err,
                    "background refresh failed, serving stale until next attempt"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::http::{HeaderMap, Method, StatusCode};
    use bytes::Bytes;
    use url::Url;

    use super::*;
    use crate::agent::store::MemoryStore;

    /// Scripted network: maps URL to a queue of outcomes, records calls.
    #[derive(Default)]
    struct ScriptedFetch {
        responses: Mutex<HashMap<String, Vec<Result<ResponseSnapshot, FetchError>>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedFetch {
        fn respond(&self, url: &str, result: Result<ResponseSnapshot, FetchError>) {
            self.responses
                .lock()
                .expect("responses lock")
                .entry(url.to_string())
                .or_default()
                .push(result);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl Fetch for ScriptedFetch {
        async fn fetch(
            &self,
            request: &InterceptedRequest,
        ) -> Result<ResponseSnapshot, FetchError> {
            let url = request.url.to_string();
            self.calls.lock().expect("calls lock").push(url.clone());

            let mut responses = self.responses.lock().expect("responses lock");
            let queue = responses.get_mut(&url);
            match queue.and_then(|queue| (!queue.is_empty()).then(|| queue.remove(0))) {
                Some(result) => result,
                None => Err(FetchError::Connect {
                    url,
                    reason: "no scripted response".to_string(),
                }),
            }
        }
    }

    fn snapshot(status: StatusCode, body: &str) -> ResponseSnapshot {
        ResponseSnapshot::new(
            status,
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

    fn get(raw: &str) -> InterceptedRequest {
        InterceptedRequest::get(Url::parse(raw).expect("valid test url"))
    }

    fn router(store: &MemoryStore, fetch: Arc<ScriptedFetch>) -> RequestRouter {
        RequestRouter::new(&config(), Arc::new(store.clone()), fetch)
    }

    #[tokio::test]
    async fn miss_refreshes_inline_and_populates_cache() {
        let store = MemoryStore::new();
        let fetch = Arc::new(ScriptedFetch::default());
        fetch.respond("http://localhost:3000/", Ok(snapshot(StatusCode::OK, "home")));

        let router = router(&store, fetch.clone());
        let request = get("http://localhost:3000/");
        let response = router
            .handle_fetch(request.clone())
            .await
            .expect("miss response");

        assert_eq!(response.body, Bytes::from("home"));
        let cached = store
            .lookup(&request.key())
            .await
            .expect("lookup")
            .expect("entry after miss");
        assert_eq!(cached.body, Bytes::from("home"));
    }

    #[tokio::test]
    async fn miss_with_network_failure_propagates() {
        let store = MemoryStore::new();
        let fetch = Arc::new(ScriptedFetch::default());

        let router = router(&store, fetch);
        let result = router.handle_fetch(get("http://localhost:3000/")).await;

        assert!(matches!(result, Err(FetchError::Connect { .. })));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn hit_serves_cached_without_waiting_on_network() {
        let store = MemoryStore::new();
        let fetch = Arc::new(ScriptedFetch::default());
        let request = get("http://localhost:3000/");

        let handle = store.open("v1").await.expect("open cache");
        handle
            .put(request.key(), snapshot(StatusCode::OK, "stale"))
            .await
            .expect("seed cache");

        // No scripted response: the background refresh will fail, which must
        // not affect the response already served from cache.
        let router = router(&store, fetch);
        let response = router
            .handle_fetch(request.clone())
            .await
            .expect("hit response");

        assert_eq!(response.body, Bytes::from("stale"));
    }

    #[tokio::test]
    async fn non_success_refresh_keeps_prior_entry() {
        let store = MemoryStore::new();
        let fetch = Arc::new(ScriptedFetch::default());
        let request = get("http://localhost:3000/");
        fetch.respond(
            "http://localhost:3000/",
            Ok(snapshot(StatusCode::NOT_FOUND, "gone")),
        );

        let handle = store.open("v1").await.expect("open cache");
        handle
            .put(request.key(), snapshot(StatusCode::OK, "good"))
            .await
            .expect("seed cache");

        let router = router(&store, fetch);
        let response = router.refresh(&request).await.expect("refresh response");

        // The 404 is deliverable but never written back.
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        let cached = store
            .lookup(&request.key())
            .await
            .expect("lookup")
            .expect("entry survives failed refresh");
        assert_eq!(cached.body, Bytes::from("good"));
    }

    #[tokio::test]
    async fn redirect_status_is_not_cached() {
        let store = MemoryStore::new();
        let fetch = Arc::new(ScriptedFetch::default());
        let request = get("http://localhost:3000/");
        fetch.respond(
            "http://localhost:3000/",
            Ok(snapshot(StatusCode::MOVED_PERMANENTLY, "")),
        );

        let router = router(&store, fetch);
        let response = router.refresh(&request).await.expect("refresh response");

        assert_eq!(response.status, StatusCode::MOVED_PERMANENTLY);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn bypass_never_touches_the_cache() {
        let store = MemoryStore::new();
        let fetch = Arc::new(ScriptedFetch::default());
        fetch.respond(
            "http://localhost:3000/other.png",
            Ok(snapshot(StatusCode::OK, "png")),
        );

        let router = router(&store, fetch.clone());
        let response = router
            .handle_fetch(get("http://localhost:3000/other.png"))
            .await
            .expect("bypass response");

        assert_eq!(response.body, Bytes::from("png"));
        assert!(store.is_empty().await);
        assert_eq!(fetch.calls(), vec!["http://localhost:3000/other.png"]);
    }

    #[tokio::test]
    async fn bypass_forwards_non_get_even_for_listed_paths() {
        let store = MemoryStore::new();
        let fetch = Arc::new(ScriptedFetch::default());
        fetch.respond("http://localhost:3000/", Ok(snapshot(StatusCode::OK, "ok")));

        let url = Url::parse("http://localhost:3000/").expect("valid test url");
        let request =
            InterceptedRequest::new(Method::POST, url, HeaderMap::new(), Bytes::from("payload"));

        let router = router(&store, fetch);
        let response = router.handle_fetch(request).await.expect("bypass response");

        assert_eq!(response.status, StatusCode::OK);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn background_refresh_eventually_updates_cache() {
        let store = MemoryStore::new();
        let fetch = Arc::new(ScriptedFetch::default());
        let request = get("http://localhost:3000/");
        fetch.respond(
            "http://localhost:3000/",
            Ok(snapshot(StatusCode::OK, "fresh")),
        );

        let handle = store.open("v1").await.expect("open cache");
        handle
            .put(request.key(), snapshot(StatusCode::OK, "stale"))
            .await
            .expect("seed cache");

        let router = router(&store, fetch);
        let response = router
            .handle_fetch(request.clone())
            .await
            .expect("hit response");
        assert_eq!(response.body, Bytes::from("stale"));

        // The detached refresh is unordered relative to the served response;
        // poll until it lands.
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
        loop {
            let cached = store
                .lookup(&request.key())
                .await
                .expect("lookup")
                .expect("entry present");
            if cached.body == Bytes::from("fresh") {
                break;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("background refresh never updated the cache");
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }
}
