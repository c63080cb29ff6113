//! Route matching policy.
//!
//! Decides, per intercepted request, whether the cache participates at all.
//! Anything cross-origin, unlisted, or non-GET is forwarded untouched.

use axum::http::Method;
use url::{Origin, Url};

use super::keys::InterceptedRequest;

/// Outcome of matching one request against the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// Same-origin GET for a listed path: cache-first with refresh.
    Intercept,
    /// Forward to the network unmodified; no cache read or write.
    Bypass(BypassReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassReason {
    CrossOrigin,
    UnlistedPath,
    MethodNotGet,
}

impl BypassReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BypassReason::CrossOrigin => "cross_origin",
            BypassReason::UnlistedPath => "unlisted_path",
            BypassReason::MethodNotGet => "method_not_get",
        }
    }
}

/// Matches requests against the agent origin and the fixed resource list.
///
/// Paths match on exact equality with the request's path component; the
/// query string is excluded from matching but still part of cache identity.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    origin: Origin,
    resources: Vec<String>,
}

impl RoutePolicy {
    pub fn new(origin: &Url, resources: Vec<String>) -> Self {
        Self {
            origin: origin.origin(),
            resources,
        }
    }

    pub fn decide(&self, request: &InterceptedRequest) -> RouteDecision {
        if request.url.origin() != self.origin {
            return RouteDecision::Bypass(BypassReason::CrossOrigin);
        }

        if !self.is_listed(request.url.path()) {
            return RouteDecision::Bypass(BypassReason::UnlistedPath);
        }

        if request.method != Method::GET {
            return RouteDecision::Bypass(BypassReason::MethodNotGet);
        }

        RouteDecision::Intercept
    }

    fn is_listed(&self, path: &str) -> bool {
        self.resources.iter().any(|resource| resource == path)
    }
}
