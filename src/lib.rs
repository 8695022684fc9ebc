//! edge-relay is a small edge HTTP service.
//!
//! It relays every request under a configured prefix (default `/api/`) to
//! one backend, fans `GET /aggregate?count=n` out to a backend endpoint
//! with bounded concurrency and summarizes the answers by responding
//! host, and serves a liveness probe at `/healthz`. An optional assets
//! directory adds a rendered landing page at `/` and static files under
//! `/static`.
//!
//! # Architecture
//!
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, validate, health).
//! - [`config`] -- Configuration model, file loading and validation.
//! - [`error`] -- Unified error types using `thiserror`.
//! - [`health`] -- `GET /healthz` liveness handler.
//! - [`identity`] -- Hostname and address discovery for the `X-Server` header.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`page`] -- Landing page template rendering.
//! - [`proxy`] -- The relay, the aggregator and the shared outbound executor.
//! - [`server`] -- Axum router, shared application state, HTTP client, and
//!   graceful shutdown.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML config file support _(enabled by default)_ |
//! | `json` | JSON config file support |
//! | `toml` | TOML config file support |

// Binary crate: public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod health;
pub mod identity;
pub mod logging;
pub mod page;
pub mod proxy;
pub mod server;
