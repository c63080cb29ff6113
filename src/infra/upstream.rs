//! Reqwest-backed network fetch.
//!
//! The gateway's "network" is the configured upstream origin: every outgoing
//! request keeps its path and query but is re-addressed to the upstream, so
//! the agent stays transparent to clients addressing the public origin.

use async_trait::async_trait;
use axum::http::header;
use url::Url;

use crate::agent::{Fetch, FetchError, InterceptedRequest, ResponseSnapshot};
use crate::config::UpstreamSettings;

use super::error::InfraError;

/// Upstream HTTP client implementing the agent's [`Fetch`] capability.
pub struct HttpFetch {
    client: reqwest::Client,
    upstream: Url,
}

impl HttpFetch {
    pub fn new(settings: &UpstreamSettings) -> Result<Self, InfraError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = settings.request_timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().map_err(|err| {
            InfraError::configuration(format!("failed to build upstream client: {err}"))
        })?;

        Ok(Self {
            client,
            upstream: settings.origin.clone(),
        })
    }

    /// Re-address a request URL to the upstream origin, preserving path and
    /// query untouched.
    fn rewrite(&self, url: &Url) -> Result<Url, FetchError> {
        let mut target = self
            .upstream
            .join(url.path())
            .map_err(|err| FetchError::Request {
                url: url.to_string(),
                reason: format!("failed to rewrite to upstream: {err}"),
            })?;
        target.set_query(url.query());
        Ok(target)
    }
}

#[async_trait]
impl Fetch for HttpFetch {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<ResponseSnapshot, FetchError> {
        let target = self.rewrite(&request.url)?;

        let mut outgoing = self
            .client
            .request(request.method.clone(), target.as_str());
        for (name, value) in request.headers.iter() {
            // Host is rewritten by the client for the upstream authority.
            if name != header::HOST {
                outgoing = outgoing.header(name.clone(), value.clone());
            }
        }
        if !request.body.is_empty() {
            outgoing = outgoing.body(request.body.clone());
        }

        let response = outgoing.send().await.map_err(|err| {
            if err.is_connect() || err.is_timeout() {
                FetchError::Connect {
                    url: target.to_string(),
                    reason: err.to_string(),
                }
            } else {
                FetchError::Request {
                    url: target.to_string(),
                    reason: err.to_string(),
                }
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|err| FetchError::Body {
            url: target.to_string(),
            reason: err.to_string(),
        })?;

        Ok(ResponseSnapshot::new(status, &headers, body))
    }
}
