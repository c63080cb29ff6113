//! Agent configuration.
//!
//! Fixed for the lifetime of a version: the named-cache tag, the resource
//! list eligible for interception, and the origin the agent fronts.

use url::Url;

pub const DEFAULT_CACHE_VERSION: &str = "v1";

/// Paths precached when none are configured.
pub fn default_resources() -> Vec<String> {
    vec!["/".to_string(), "/favicon.ico".to_string()]
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Version tag naming the cache this version owns.
    pub cache_version: String,
    /// Exact same-origin paths eligible for interception.
    pub resources: Vec<String>,
    /// The agent's own origin; requests elsewhere are bypassed.
    pub origin: Url,
}

impl AgentConfig {
    pub fn new(origin: Url, cache_version: impl Into<String>, resources: Vec<String>) -> Self {
        Self {
            cache_version: cache_version.into(),
            resources,
            origin,
        }
    }

    /// Absolute URL for one listed resource path.
    pub fn resource_url(&self, path: &str) -> Result<Url, url::ParseError> {
        self.origin.join(path)
    }
}
