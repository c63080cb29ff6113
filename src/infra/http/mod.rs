//! HTTP host adapter.
//!
//! Binds the cache agent to an axum listener: every inbound request becomes
//! one fetch event, and the agent's snapshot (or fetch failure) is converted
//! back into an HTTP response. The router has no routes of its own; the
//! fallback handler is the interception point for all paths.

mod middleware;

pub use middleware::{RequestContext, log_responses, set_request_context};

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{StatusCode, header, request},
    response::{IntoResponse, Response},
};
use tracing::debug;
use url::Url;

use crate::agent::{CacheAgent, InterceptedRequest, ResponseSnapshot};
use crate::error::ErrorReport;

const SOURCE: &str = "infra::http";

/// Largest request body the gateway will buffer for upstream forwarding.
const REQUEST_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Shared state for the gateway router.
#[derive(Clone)]
pub struct GatewayState {
    pub agent: Arc<CacheAgent>,
    pub public_origin: Url,
}

/// Build the gateway router: a single fallback interceptor behind the
/// request-context and response-logging layers.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .fallback(intercept)
        .layer(axum::middleware::from_fn(log_responses))
        .layer(axum::middleware::from_fn(set_request_context))
        .with_state(state)
}

async fn intercept(
    State(state): State<GatewayState>,
    request: axum::http::Request<Body>,
) -> Response {
    let intercepted = match into_intercepted(&state.public_origin, request).await {
        Ok(intercepted) => intercepted,
        Err(response) => return response,
    };

    match state.agent.handle_fetch(intercepted).await {
        Ok(snapshot) => snapshot_response(snapshot),
        Err(err) => {
            let mut response = (StatusCode::BAD_GATEWAY, "Upstream unreachable").into_response();
            ErrorReport::from_error("infra::http::intercept", StatusCode::BAD_GATEWAY, &err)
                .attach(&mut response);
            response
        }
    }
}

/// Buffer one inbound request into the agent's transient request value.
async fn into_intercepted(
    public_origin: &Url,
    request: axum::http::Request<Body>,
) -> Result<InterceptedRequest, Response> {
    let (parts, body) = request.into_parts();

    let url = match request_url(public_origin, &parts) {
        Ok(url) => url,
        Err(reason) => {
            debug!(target_module = SOURCE, reason = %reason, "rejecting unparseable request target");
            let mut response = (StatusCode::BAD_REQUEST, "Invalid request target").into_response();
            ErrorReport::from_message(
                "infra::http::request_url",
                StatusCode::BAD_REQUEST,
                reason,
            )
            .attach(&mut response);
            return Err(response);
        }
    };

    let bytes = match axum::body::to_bytes(body, REQUEST_BODY_LIMIT).await {
        Ok(bytes) => bytes,
        Err(err) => {
            let mut response =
                (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
            ErrorReport::from_message(
                "infra::http::into_intercepted",
                StatusCode::PAYLOAD_TOO_LARGE,
                err.to_string(),
            )
            .attach(&mut response);
            return Err(response);
        }
    };

    Ok(InterceptedRequest::new(
        parts.method,
        url,
        parts.headers,
        bytes,
    ))
}

/// Reconstruct the absolute request URL.
///
/// Absolute-form targets keep their own authority; origin-form targets take
/// the authority from the Host header and the scheme from the configured
/// public origin. Requests without either fall back to the public origin.
fn request_url(public_origin: &Url, parts: &request::Parts) -> Result<Url, String> {
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    if let Some(authority) = parts.uri.authority() {
        let scheme = parts
            .uri
            .scheme_str()
            .unwrap_or_else(|| public_origin.scheme());
        let candidate = format!("{scheme}://{authority}{path_and_query}");
        return Url::parse(&candidate).map_err(|err| format!("invalid target `{candidate}`: {err}"));
    }

    if let Some(host) = parts
        .headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
    {
        let candidate = format!("{}://{host}{path_and_query}", public_origin.scheme());
        return Url::parse(&candidate).map_err(|err| format!("invalid target `{candidate}`: {err}"));
    }

    public_origin
        .join(path_and_query)
        .map_err(|err| format!("invalid target `{path_and_query}`: {err}"))
}

/// Rebuild an HTTP response from a stored snapshot.
fn snapshot_response(snapshot: ResponseSnapshot) -> Response {
    let mut builder = Response::builder().status(snapshot.status);

    for (name, value) in snapshot.headers {
        builder = builder.header(name, value);
    }

    builder
        .body(Body::from(snapshot.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
