//! Axum server setup, shared application state, and graceful shutdown.
//!
//! Contains [`AppState`] (the `Arc`-shared state holding the relay, the
//! aggregator, optional assets and the server identity), [`build_router`]
//! for the request dispatcher and its middleware layers,
//! [`build_http_client`] for the connection-pooled hyper client, and
//! [`shutdown_signal`] for SIGTERM / Ctrl+C handling.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request};
use axum::routing::get;
use axum::Router;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use tracing::Level;

use crate::config::model::Config;
use crate::error::EdgeError;
use crate::health::healthz_handler;
use crate::identity::{ServerIdentity, X_SERVER};
use crate::page::{index_handler, Assets};
use crate::proxy::aggregate::{aggregate_handler, Aggregator};
use crate::proxy::executor::Executor;
use crate::proxy::relay::{relay_handler, Relay};

pub type HttpsConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;
pub type HttpClient = Client<HttpsConnector, Body>;

pub struct AppState {
    pub relay: Relay,
    pub aggregator: Aggregator,
    pub assets: Option<Assets>,
    pub identity: ServerIdentity,
}

impl AppState {
    /// Build every component from the startup configuration. The relay and
    /// the aggregator share one pooled client.
    pub fn from_config(
        config: &Config,
        client: HttpClient,
        identity: ServerIdentity,
        assets: Option<Assets>,
    ) -> Result<Self, EdgeError> {
        let executor = Executor::new(client);
        Ok(Self {
            relay: Relay::new(&config.relay, executor.clone())?,
            aggregator: Aggregator::new(&config.aggregator, executor)?,
            assets,
            identity,
        })
    }
}

#[must_use]
pub fn build_http_client() -> HttpClient {
    // Several rustls crypto providers may be compiled in; pick `ring`
    // explicitly so rustls does not have to guess.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();
    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(30))
        .build(https)
}

/// Request dispatcher: health, aggregation, landing page and static files
/// get explicit routes; everything else falls through to the relay, which
/// answers 404 outside its prefix.
pub fn build_router(state: Arc<AppState>, max_body: usize) -> Router {
    let mut router = Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/aggregate", get(aggregate_handler))
        .route("/", get(index_handler));

    if let Some(assets) = &state.assets {
        router = router.nest_service("/static", ServeDir::new(assets.static_dir()));
    }

    let access_log = TraceLayer::new_for_http()
        .make_span_with(|request: &Request| {
            let peer = request
                .extensions()
                .get::<ConnectInfo<std::net::SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.to_string())
                .unwrap_or_default();
            tracing::info_span!(
                "request",
                method = %request.method(),
                path = %request.uri().path(),
                peer = %peer,
            )
        })
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(LatencyUnit::Millis),
        );

    router
        .fallback(relay_handler)
        .layer(
            ServiceBuilder::new()
                .layer(access_log)
                .layer(SetResponseHeaderLayer::overriding(
                    X_SERVER.clone(),
                    state.identity.header_value(),
                ))
                .layer(RequestBodyLimitLayer::new(max_body)),
        )
        .with_state(state)
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}
