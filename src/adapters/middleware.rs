//! Cross-cutting Axum middleware for the gateway.
//!
//! These functions are attached to the `Router` in [`crate::adapters::app`]
//! and run around every request, including the operational endpoints. Apart
//! from the CORS layer they are stateless.
use std::{any::Any, time::Duration};

use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::Response,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::Instrument;

use crate::{
    adapters::http_handler::{ClientIpResolver, RequestId, RouteLabel},
    config::CorsConfig,
    core::{error::json_error, forwarder::X_REQUEST_ID},
    metrics,
};

/// Longest inbound request id that is reused rather than replaced.
const MAX_REQUEST_ID_LEN: usize = 128;

/// Reuse a sane inbound `X-Request-ID` or generate a UUID, expose it to the
/// rest of the stack and echo it on the response.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    req.extensions_mut().insert(RequestId(request_id.clone()));

    let span = tracing::info_span!("request", request_id = %request_id);
    let mut response = next.run(req).instrument(span).await;

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(X_REQUEST_ID, header_value);
    }

    response
}

/// One structured access log line per request, levelled by status.
pub async fn access_log_middleware(
    State(client_ip): State<ClientIpResolver>,
    req: Request,
    next: Next,
) -> Response {
    let timer = std::time::Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let client_ip = client_ip
        .resolve(&req)
        .map(|ip| ip.to_string())
        .unwrap_or_default();
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();

    let response = next.run(req).await;

    let status_code = response.status().as_u16();
    let latency_ms = timer.elapsed().as_millis() as u64;

    macro_rules! access_log {
        ($level:ident) => {
            tracing::$level!(
                status_code,
                latency_ms,
                client_ip = %client_ip,
                method = %method,
                path = %path,
                user_agent = %user_agent,
                request_id = %request_id,
                "request completed"
            )
        };
    }

    if response.status().is_server_error() {
        access_log!(error);
    } else if response.status().is_client_error() {
        access_log!(warn);
    } else {
        access_log!(info);
    }

    response
}

/// Count and time every request except scrapes of `/metrics` itself.
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let mut timer = metrics::RequestTimer::new(&method);

    let response = next.run(req).await;

    let route = response
        .extensions()
        .get::<RouteLabel>()
        .map_or(metrics::UNMATCHED_ROUTE, |label| label.0.as_str());
    timer.set_route(route);
    metrics::increment_request_total(route, &method, response.status().as_u16());

    response
}

/// Build the CORS layer from configuration.
///
/// A wildcard origin is answered with a literal `*` and never with
/// credentials; credentialed CORS needs an explicit origin list.
pub fn cors_layer(config: &CorsConfig) -> eyre::Result<CorsLayer> {
    let wildcard = config.allowed_origins.iter().any(|o| o == "*");
    let (allow_origin, allow_credentials) = if wildcard {
        if config.allow_credentials {
            tracing::warn!("CORS credentials ignored for wildcard origin; list origins explicitly");
        }
        (AllowOrigin::any(), false)
    } else {
        let origins = config
            .allowed_origins
            .iter()
            .map(|o| HeaderValue::from_str(o).map_err(|_| eyre::eyre!("Invalid CORS origin '{o}'")))
            .collect::<eyre::Result<Vec<_>>>()?;
        (AllowOrigin::list(origins), config.allow_credentials)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_LENGTH,
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            HeaderName::from_static("x-requested-with"),
        ])
        .expose_headers([X_REQUEST_ID])
        .allow_credentials(allow_credentials)
        .max_age(Duration::from_secs(config.max_age_secs)))
}

/// Render a caught panic as a plain internal error. The payload is logged,
/// never returned.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic payload".to_string()
    };

    metrics::increment_panics();
    tracing::error!(panic = %detail, "Request handler panicked");

    json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}
