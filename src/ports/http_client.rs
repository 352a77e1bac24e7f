use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response};
use thiserror::Error;

/// Custom error type for outbound calls to backend services
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpClientError {
    /// Connecting to the service or exchanging the request failed
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// No response head arrived within the configured bound
    #[error("Timeout error after {0} seconds")]
    Timeout(u64),

    /// The outbound request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl HttpClientError {
    /// Short, stable label used for metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            HttpClientError::ConnectionError(_) => "connect_error",
            HttpClientError::Timeout(_) => "timeout",
            HttpClientError::InvalidRequest(_) => "invalid_request",
        }
    }
}

/// Result type alias for HTTP client operations
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// HttpClient defines the port (interface) for sending a rewritten request to
/// a backend service.
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Send an HTTP request to a backend service.
    ///
    /// The request URI is absolute and already points at the target. Any
    /// upstream status, including 4xx/5xx, is a successful exchange.
    async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>>;
}
