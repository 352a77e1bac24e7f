//! The single error type every pipeline stage returns.
use axum::{
    Json,
    response::{IntoResponse, Response},
};
use hyper::StatusCode;
use serde_json::json;
use thiserror::Error;

use crate::core::token::AuthError;

/// Client-visible outcome of a failed request.
///
/// Upstream and internal causes are carried for logging only; the rendered
/// body always uses a fixed message for them.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Unauthorized(#[from] AuthError),

    #[error("insufficient permissions")]
    Forbidden,

    #[error("route not found")]
    RouteNotFound,

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden => StatusCode::FORBIDDEN,
            GatewayError::RouteNotFound => StatusCode::NOT_FOUND,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message placed in the JSON body.
    pub fn public_message(&self) -> String {
        match self {
            GatewayError::Upstream(_) => "Service unavailable".to_string(),
            GatewayError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Render `{"error": message}` with the given status.
pub fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        json_error(self.status(), self.public_message())
    }
}
