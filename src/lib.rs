//! Storefront gateway - the edge API gateway in front of the storefront services.
//!
//! Every client request enters here and is either answered by the gateway
//! (health, metrics, errors) or forwarded to one backend service. The crate is
//! laid out as a **hexagonal architecture**: the request pipeline lives in
//! `core`, outbound I/O is behind the traits in `ports`, and `adapters` wire
//! both to Axum and Hyper.
//!
//! # Pipeline
//! 1. Route dispatch: method + path pattern lookup, with literal segments
//!    beating parameters and shape checks on parameters and required query keys
//! 2. Authentication: `Authorization: Bearer <token>`, HMAC-only, expiry checked
//!    independently of the token library
//! 3. Role authorization for role-restricted routes
//! 4. Forwarding: upstream path rewrite, forwarding headers, verified
//!    `X-User-ID`, bounded timeout, upstream status passed through
//!
//! Failures at any stage become a JSON `{"error": ...}` response with a status
//! from 400, 401, 403, 404, 500 or 502.
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use storefront_gateway::{
//!     GatewayService, HttpClientAdapter,
//!     adapters::{AppState, ClientIpResolver, HttpHandler, build_router},
//!     config::GatewayConfig,
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let config = GatewayConfig::builder()
//!     .jwt_secret("s3cret")
//!     .build()
//!     .map_err(|e| eyre::eyre!(e))?;
//! let client = Arc::new(HttpClientAdapter::new()?);
//! let gateway = Arc::new(GatewayService::new(&config, client)?);
//! let client_ip = ClientIpResolver::new(false);
//! let state = AppState {
//!     handler: Arc::new(HttpHandler::new(gateway, client_ip)),
//!     metrics: None,
//! };
//! let app = build_router(state, &config.cors, client_ip)?;
//! # let _ = app;
//! # Ok(()) }
//! ```
//!
//! # Error Handling
//! Domain errors are `thiserror` enums ([`core::GatewayError`],
//! [`core::AuthError`], [`core::RouteTableError`]). Setup code returns
//! `eyre::Result<T>` with context attached through `WrapErr`.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{HttpClientAdapter, HttpHandler},
    core::{GatewayError, GatewayService},
    ports::http_client::HttpClient,
    utils::GracefulShutdown,
};
