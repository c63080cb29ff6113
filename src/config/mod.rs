//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::agent::{AgentConfig, DEFAULT_CACHE_VERSION, default_resources};


const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "scorta";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PUBLIC_PORT: u16 = 3000;
const DEFAULT_UPSTREAM_ORIGIN: &str = "http://127.0.0.1:8080";
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

/// Command-line arguments for the Scorta binary.
#[derive(Debug, Parser)]
#[command(name = "scorta", version, about = "Scorta edge cache gateway")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "SCORTA_CONFIG_FILE",
        value_name = "PATH"
    )]
    pub config_file: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the gateway.
    Serve(ServeArgs),
    /// Fetch the resource list once against the upstream and exit.
    #[command(name = "precache")]
    Precache(PrecacheArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct PrecacheArgs {
    #[command(flatten)]
    pub overrides: CommonOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CommonOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the upstream origin requests are forwarded to.
    #[arg(long = "upstream-origin", value_name = "URL")]
    pub upstream_origin: Option<String>,

    /// Override the upstream request timeout; 0 disables it.
    #[arg(long = "upstream-request-timeout-seconds", value_name = "SECONDS")]
    pub upstream_request_timeout_seconds: Option<u64>,

    /// Override the cache version tag.
    #[arg(long = "precache-version", value_name = "TAG")]
    pub precache_version: Option<String>,

    /// Replace the precached resource list; repeat once per path.
    #[arg(long = "precache-resource", value_name = "PATH")]
    pub precache_resources: Vec<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub common: CommonOverrides,

    /// Override the public listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the public listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the origin clients use to address this gateway.
    #[arg(long = "server-public-origin", value_name = "URL")]
    pub public_origin: Option<String>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub upstream: UpstreamSettings,
    pub precache: PrecacheSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub public_addr: SocketAddr,
    pub public_origin: Url,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub origin: Url,
    pub request_timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct PrecacheSettings {
    pub version: String,
    pub resources: Vec<String>,
}

impl From<&Settings> for AgentConfig {
    fn from(settings: &Settings) -> Self {
        AgentConfig::new(
            settings.server.public_origin.clone(),
            settings.precache.version.clone(),
            settings.precache.resources.clone(),
        )
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("SCORTA").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Precache(args)) => raw.apply_common_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    upstream: RawUpstreamSettings,
    precache: RawPrecacheSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(origin) = overrides.public_origin.as_ref() {
            self.server.public_origin = Some(origin.clone());
        }

        self.apply_common_overrides(&overrides.common);
    }

    fn apply_common_overrides(&mut self, overrides: &CommonOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(origin) = overrides.upstream_origin.as_ref() {
            self.upstream.origin = Some(origin.clone());
        }
        if let Some(seconds) = overrides.upstream_request_timeout_seconds {
            self.upstream.request_timeout_seconds = Some(seconds);
        }
        if let Some(version) = overrides.precache_version.as_ref() {
            self.precache.version = Some(version.clone());
        }
        if !overrides.precache_resources.is_empty() {
            self.precache.resources = Some(overrides.precache_resources.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            upstream,
            precache,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let upstream = build_upstream_settings(upstream)?;
        let precache = build_precache_settings(precache)?;

        Ok(Self {
            server,
            logging,
            upstream,
            precache,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PUBLIC_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let public_addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.public_addr", reason))?;

    let public_origin = match server.public_origin {
        Some(raw) => parse_origin(&raw).map_err(|reason| {
            LoadError::invalid("server.public_origin", reason)
        })?,
        None => parse_origin(&format!("http://{host}:{port}")).map_err(|reason| {
            LoadError::invalid("server.public_origin", reason)
        })?,
    };

    Ok(ServerSettings {
        public_addr,
        public_origin,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_upstream_settings(upstream: RawUpstreamSettings) -> Result<UpstreamSettings, LoadError> {
    let origin = upstream
        .origin
        .unwrap_or_else(|| DEFAULT_UPSTREAM_ORIGIN.to_string());
    let origin =
        parse_origin(&origin).map_err(|reason| LoadError::invalid("upstream.origin", reason))?;

    let timeout_seconds = upstream
        .request_timeout_seconds
        .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS);
    let request_timeout = (timeout_seconds > 0).then(|| Duration::from_secs(timeout_seconds));

    Ok(UpstreamSettings {
        origin,
        request_timeout,
    })
}

fn build_precache_settings(precache: RawPrecacheSettings) -> Result<PrecacheSettings, LoadError> {
    let version = precache
        .version
        .unwrap_or_else(|| DEFAULT_CACHE_VERSION.to_string());
    if version.trim().is_empty() {
        return Err(LoadError::invalid(
            "precache.version",
            "version tag must not be empty",
        ));
    }

    let resources = precache.resources.unwrap_or_else(default_resources);
    if resources.is_empty() {
        return Err(LoadError::invalid(
            "precache.resources",
            "at least one resource path is required",
        ));
    }
    for resource in &resources {
        if !resource.starts_with('/') {
            return Err(LoadError::invalid(
                "precache.resources",
                format!("resource `{resource}` must be an absolute path"),
            ));
        }
    }

    Ok(PrecacheSettings { version, resources })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    public_origin: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUpstreamSettings {
    origin: Option<String>,
    request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPrecacheSettings {
    version: Option<String>,
    resources: Option<Vec<String>>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

/// Parse and validate an origin URL: http(s), a host, and nothing else.
fn parse_origin(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|err| format!("invalid origin `{raw}`: {err}"))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(format!(
            "origin `{raw}` must use the http or https scheme"
        ));
    }
    if url.host_str().is_none() {
        return Err(format!("origin `{raw}` must include a host"));
    }
    if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
        return Err(format!(
            "origin `{raw}` must not carry a path, query, or fragment"
        ));
    }

    Ok(url)
}
