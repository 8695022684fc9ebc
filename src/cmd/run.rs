//! `edge-relay run`: start the edge server.
//!
//! Loads configuration (defaults, optional file, CLI / env overrides),
//! builds the relay and aggregator once, then serves until SIGINT or
//! SIGTERM. In-flight requests get `--shutdown-grace` seconds to finish.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use crate::cli::RunArgs;
use crate::config::model::Config;
use crate::config::{self, validation};
use crate::error::EdgeError;
use crate::identity::ServerIdentity;
use crate::logging;
use crate::page::Assets;
use crate::server::{self, AppState};

pub async fn execute(args: RunArgs) -> Result<(), EdgeError> {
    logging::init(&args.log_level, logging::resolve_format(args.pretty, args.json));

    let (mut config, origin) = config::load(args.config.as_deref()).await?;
    apply_overrides(&mut config, &args);
    if let Err(errors) = validation::validate(&config) {
        return Err(EdgeError::ConfigValidation { errors });
    }

    let assets = match args.assets.as_deref() {
        Some(dir) => {
            let assets = Assets::load(dir).await?;
            tracing::info!(dir = %assets.dir().display(), "assets loaded");
            Some(assets)
        }
        None => None,
    };

    let identity = ServerIdentity::discover();
    let server_name = identity.display_name();

    let state = Arc::new(AppState::from_config(
        &config,
        server::build_http_client(),
        identity,
        assets,
    )?);
    let router = server::build_router(Arc::clone(&state), args.max_body);

    let ip: IpAddr = args.host.parse()?;
    let addr = SocketAddr::new(ip, args.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        addr = %addr,
        config = %origin,
        backend = config.relay.backend_url().unwrap_or("(not configured)"),
        prefix = %state.relay.prefix(),
        aggregate_endpoint = %config.aggregator.endpoint,
        max_concurrency = config.aggregator.max_concurrency,
        server = %server_name,
        "edge-relay started"
    );

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    let graceful_shutdown = async move {
        server::shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    };

    let serve = async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(graceful_shutdown)
        .await
    };

    let grace = Duration::from_secs(args.shutdown_grace);
    let grace_expired = async move {
        if shutdown_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = serve => result?,
        () = grace_expired => {
            tracing::warn!(
                grace_secs = args.shutdown_grace,
                "shutdown grace period elapsed, abandoning in-flight requests"
            );
        }
    }

    tracing::info!("edge-relay stopped");
    Ok(())
}

/// Apply CLI / env values on top of the loaded config. Blank values are
/// treated as unset.
fn apply_overrides(config: &mut Config, args: &RunArgs) {
    if let Some(url) = non_blank(args.backend_url.as_deref()) {
        config.relay.backend_url = Some(url.to_string());
    }
    if let Some(endpoint) = non_blank(args.aggregate_endpoint.as_deref()) {
        config.aggregator.endpoint = endpoint.to_string();
    }
    if let Some(limit) = args.max_concurrency {
        config.aggregator.max_concurrency = limit;
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
