use std::{process, sync::Arc};

use scorta::{
    agent::{CacheAgent, MemoryStore},
    config,
    error::AppError,
    infra::{
        error::InfraError,
        http::{self, GatewayState},
        lifecycle::HostSessions,
        telemetry,
        upstream::HttpFetch,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(config::ServeArgs::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Precache(_) => run_precache(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let (agent, sessions) = build_agent(&settings)?;

    // Activation gate: a failed install means this version never serves.
    agent.handle_install().await?;
    agent.handle_activate().await;
    info!(
        target = "scorta::serve",
        controlling = sessions.is_controlling(),
        "agent version active"
    );

    let state = GatewayState {
        agent: Arc::new(agent),
        public_origin: settings.server.public_origin.clone(),
    };
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "scorta::serve",
        addr = %settings.server.public_addr,
        upstream = %settings.upstream.origin,
        "gateway listening"
    );

    axum::serve(listener, router.into_make_service())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

/// Dry-run the installer against the upstream and exit.
///
/// Useful as a deploy check: a non-zero exit means the configured resource
/// list cannot be fully precached right now.
async fn run_precache(settings: config::Settings) -> Result<(), AppError> {
    let (agent, _) = build_agent(&settings)?;

    info!(
        target = "scorta::precache",
        upstream = %settings.upstream.origin,
        resources = settings.precache.resources.len(),
        "validating resource list against upstream"
    );

    agent.handle_install().await?;
    info!(target = "scorta::precache", "all resources precached cleanly");
    Ok(())
}

fn build_agent(settings: &config::Settings) -> Result<(CacheAgent, Arc<HostSessions>), AppError> {
    let store = Arc::new(MemoryStore::new());
    let fetch = Arc::new(HttpFetch::new(&settings.upstream).map_err(AppError::from)?);
    let sessions = Arc::new(HostSessions::new());

    let agent = CacheAgent::new(settings.into(), store, fetch, sessions.clone());
    Ok((agent, sessions))
}
