//! Router assembly: operational endpoints, the proxy fallback and the
//! middleware stack around them.
use std::sync::Arc;

use axum::{
    Router,
    extract::{Request, State},
    http::{StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::catch_panic::CatchPanicLayer;

use crate::{
    adapters::{
        health::health_handler,
        http_handler::{ClientIpResolver, HttpHandler},
        middleware::{
            access_log_middleware, cors_layer, handle_panic, metrics_middleware,
            request_id_middleware,
        },
    },
    config::CorsConfig,
    core::error::{GatewayError, json_error},
};

/// State shared by every route.
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<HttpHandler>,
    /// `None` when no Prometheus recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// Assemble the gateway router.
///
/// Layers run outermost first: panic recovery, request id, access log,
/// metrics, CORS, then the handlers.
pub fn build_router(
    state: AppState,
    cors: &CorsConfig,
    client_ip: ClientIpResolver,
) -> eyre::Result<Router> {
    let router = Router::new()
        .route("/health", get(health_handler).fallback(route_not_found))
        .route("/metrics", get(metrics_handler).fallback(route_not_found))
        .fallback(proxy_handler)
        .with_state(state)
        .layer(cors_layer(cors)?)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn_with_state(
            client_ip,
            access_log_middleware,
        ))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(CatchPanicLayer::custom(handle_panic));

    Ok(router)
}

async fn proxy_handler(State(state): State<AppState>, req: Request) -> Response {
    state.handler.handle_request(req).await
}

/// Operational paths answer other methods like any unrouted request.
async fn route_not_found() -> GatewayError {
    GatewayError::RouteNotFound
}

/// `GET /metrics` in the Prometheus text format.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => json_error(StatusCode::SERVICE_UNAVAILABLE, "metrics are disabled"),
    }
}
