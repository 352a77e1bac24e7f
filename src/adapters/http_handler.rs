use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use axum::{
    extract::{ConnectInfo, Request},
    response::{IntoResponse, Response},
};
use hyper::HeaderMap;

use crate::{
    core::{
        GatewayService, RequestContext,
        forwarder::{X_FORWARDED_FOR, X_REAL_IP},
    },
    metrics::UNMATCHED_ROUTE,
};

/// Request id assigned by the request id middleware, stored in request
/// extensions.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Matched route pattern, stored in response extensions for the metrics
/// middleware.
#[derive(Debug, Clone)]
pub struct RouteLabel(pub String);

/// Works out the client IP of a request.
///
/// The peer address is used unless forwarded headers are trusted, which is
/// only safe behind a proxy that overwrites them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientIpResolver {
    pub trust_forwarded_headers: bool,
}

impl ClientIpResolver {
    pub fn new(trust_forwarded_headers: bool) -> Self {
        Self {
            trust_forwarded_headers,
        }
    }

    pub fn resolve<B>(&self, req: &hyper::Request<B>) -> Option<IpAddr> {
        if self.trust_forwarded_headers {
            if let Some(ip) = Self::from_forwarded_headers(req.headers()) {
                return Some(ip);
            }
        }
        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    }

    fn from_forwarded_headers(headers: &HeaderMap) -> Option<IpAddr> {
        headers
            .get(X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|first| first.trim().parse().ok())
            .or_else(|| {
                headers
                    .get(X_REAL_IP)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse().ok())
            })
    }
}

/// HTTP handler for proxied traffic: everything that is not an operational
/// endpoint goes through here.
pub struct HttpHandler {
    gateway_service: Arc<GatewayService>,
    client_ip: ClientIpResolver,
}

impl HttpHandler {
    pub fn new(gateway_service: Arc<GatewayService>, client_ip: ClientIpResolver) -> Self {
        Self {
            gateway_service,
            client_ip,
        }
    }

    pub fn gateway_service(&self) -> &Arc<GatewayService> {
        &self.gateway_service
    }

    /// Run the pipeline for one request and render the outcome.
    pub async fn handle_request(&self, req: Request) -> Response {
        let request_id = req
            .extensions()
            .get::<RequestId>()
            .map(|id| id.0.clone())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let ctx = RequestContext::new(request_id, self.client_ip.resolve(&req));

        let route = match self.gateway_service.dispatch(&req) {
            Ok(route) => route,
            Err(e) => {
                tracing::debug!(
                    request_id = %ctx.request_id,
                    method = %req.method(),
                    path = %req.uri().path(),
                    error = %e,
                    "Dispatch rejected request"
                );
                return Self::labelled(e.into_response(), UNMATCHED_ROUTE);
            }
        };

        let response = match self.gateway_service.process(req, &route, &ctx).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        };
        Self::labelled(response, &route.rule.pattern)
    }

    fn labelled(mut response: Response, route: &str) -> Response {
        response
            .extensions_mut()
            .insert(RouteLabel(route.to_string()));
        response
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn request(headers: &[(&str, &str)], peer: Option<SocketAddr>) -> hyper::Request<()> {
        let mut builder = hyper::Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let mut req = builder.body(()).unwrap();
        if let Some(peer) = peer {
            req.extensions_mut().insert(ConnectInfo(peer));
        }
        req
    }

    #[test]
    fn test_peer_address_is_used_by_default() {
        let peer = SocketAddr::from((Ipv4Addr::new(10, 1, 2, 3), 5555));
        let req = request(&[("x-forwarded-for", "1.2.3.4")], Some(peer));
        assert_eq!(
            ClientIpResolver::new(false).resolve(&req),
            Some(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3)))
        );
    }

    #[test]
    fn test_forwarded_headers_when_trusted() {
        let peer = SocketAddr::from((Ipv4Addr::new(10, 1, 2, 3), 5555));
        let resolver = ClientIpResolver::new(true);

        let req = request(&[("x-forwarded-for", "1.2.3.4, 10.0.0.1")], Some(peer));
        assert_eq!(resolver.resolve(&req), Some(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4))));

        let req = request(&[("x-real-ip", "5.6.7.8")], Some(peer));
        assert_eq!(resolver.resolve(&req), Some(IpAddr::V4(Ipv4Addr::new(5, 6, 7, 8))));

        let req = request(&[("x-forwarded-for", "garbage")], Some(peer));
        assert_eq!(resolver.resolve(&req), Some(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3))));
    }

    #[test]
    fn test_no_peer_and_no_headers() {
        assert_eq!(ClientIpResolver::new(true).resolve(&request(&[], None)), None);
    }
}
