//! Request identity.
//!
//! A cache entry is keyed by method plus the full request URL. Identity is
//! exact: query strings and trailing slashes are never normalized, so
//! `/posts?page=1` and `/posts?page=2` are distinct entries.

use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use url::Url;

/// Identifies a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub method: Method,
    pub url: String,
}

/// One outgoing request as observed by the request router.
///
/// Transient: built by the host adapter per fetch event and discarded once a
/// response has been produced. Headers and body are forwarded upstream but do
/// not participate in cache identity.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InterceptedRequest {
    pub fn new(method: Method, url: Url, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            url,
            headers,
            body,
        }
    }

    /// A bare GET with no headers and no body.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url, HeaderMap::new(), Bytes::new())
    }

    /// The cache key identifying this request.
    pub fn key(&self) -> CacheKey {
        CacheKey {
            method: self.method.clone(),
            url: self.url.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(raw: &str) -> Url {
        Url::parse(raw).expect("valid test url")
    }

    #[test]
    fn key_carries_method_and_full_url() {
        let request = InterceptedRequest::get(url("http://localhost:3000/assets/app.css"));
        let key = request.key();

        assert_eq!(key.method, Method::GET);
        assert_eq!(key.url, "http://localhost:3000/assets/app.css");
    }

    #[test]
    fn distinct_queries_are_distinct_keys() {
        let first = InterceptedRequest::get(url("http://localhost:3000/posts?page=1")).key();
        let second = InterceptedRequest::get(url("http://localhost:3000/posts?page=2")).key();

        assert_ne!(first, second);
    }

    #[test]
    fn trailing_slash_is_not_normalized() {
        let bare = InterceptedRequest::get(url("http://localhost:3000/docs")).key();
        let slashed = InterceptedRequest::get(url("http://localhost:3000/docs/")).key();

        assert_ne!(bare, slashed);
    }

    #[test]
    fn same_url_different_method_differs() {
        let base = url("http://localhost:3000/");
        let get = InterceptedRequest::get(base.clone()).key();
        let head = InterceptedRequest::new(Method::HEAD, base, HeaderMap::new(), Bytes::new()).key();

        assert_ne!(get, head);
    }
}
