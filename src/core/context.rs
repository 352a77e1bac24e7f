//! Per-request state threaded through the pipeline.
use std::net::IpAddr;

use once_cell::sync::OnceCell;

use crate::core::token::TokenClaims;

/// Owned by one request task. The identity can be set once and never replaced.
#[derive(Debug)]
pub struct RequestContext {
    pub request_id: String,
    pub client_ip: Option<IpAddr>,
    identity: OnceCell<TokenClaims>,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>, client_ip: Option<IpAddr>) -> Self {
        Self {
            request_id: request_id.into(),
            client_ip,
            identity: OnceCell::new(),
        }
    }

    /// Record the authenticated identity. Returns the rejected claims if an
    /// identity is already present.
    pub fn set_identity(&self, claims: TokenClaims) -> Result<(), TokenClaims> {
        self.identity.set(claims)
    }

    pub fn identity(&self) -> Option<&TokenClaims> {
        self.identity.get()
    }
}
