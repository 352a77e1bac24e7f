//! Reverse-proxy forwarding to a resolved service target.
//!
//! One forwarder serves every service: the target address, upstream path and
//! identity all come in per call. Request and response bodies are streamed,
//! never buffered.
use std::{sync::Arc, time::Duration};

use axum::body::Body as AxumBody;
use hyper::{
    HeaderMap, Request, Response, Uri,
    header::{self, HeaderName, HeaderValue},
};

use crate::{
    core::{
        context::RequestContext, error::GatewayError, route_table::RouteMatch,
        targets::ServiceTarget, token::AuthError,
    },
    metrics,
    ports::http_client::{HttpClient, HttpClientError},
};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
pub const X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");
pub const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Connection-scoped headers that must not cross the proxy.
const HOP_BY_HOP: [&str; 6] = [
    "connection",
    "keep-alive",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers, including any named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }

    for name in HOP_BY_HOP {
        headers.remove(name);
    }

    let proxy_headers: Vec<HeaderName> = headers
        .keys()
        .filter(|name| name.as_str().starts_with("proxy-"))
        .cloned()
        .collect();
    for name in proxy_headers {
        headers.remove(name);
    }
}

/// Forwards matched requests through an [`HttpClient`] under a time bound.
#[derive(Clone)]
pub struct ProxyForwarder {
    client: Arc<dyn HttpClient>,
    timeout: Duration,
}

impl ProxyForwarder {
    pub fn new(client: Arc<dyn HttpClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Rewrite `req` for `target` and relay the upstream response.
    ///
    /// Any upstream status is passed through. Only a failed exchange (connect
    /// error, timeout, broken transport) becomes [`GatewayError::Upstream`].
    pub async fn forward(
        &self,
        req: Request<AxumBody>,
        route: &RouteMatch,
        target: &ServiceTarget,
        ctx: &RequestContext,
    ) -> Result<Response<AxumBody>, GatewayError> {
        let service = route.rule.service.as_str();
        let outbound = Self::rewrite(req, route, target, ctx)?;

        tracing::debug!(
            service,
            method = %outbound.method(),
            uri = %outbound.uri(),
            "Forwarding request"
        );

        let timer = metrics::UpstreamRequestTimer::new(service);
        let result = tokio::time::timeout(self.timeout, self.client.send_request(outbound)).await;
        drop(timer);

        let error = match result {
            Ok(Ok(mut response)) => {
                metrics::increment_upstream_request_total(service, "ok");
                strip_hop_by_hop(response.headers_mut());
                return Ok(response);
            }
            Ok(Err(e)) => e,
            Err(_) => HttpClientError::Timeout(self.timeout.as_secs()),
        };

        metrics::increment_upstream_request_total(service, error.outcome());
        tracing::error!(
            service,
            target = %target.authority(),
            request_id = %ctx.request_id,
            error = %error,
            "Upstream request failed"
        );
        Err(GatewayError::Upstream(error.to_string()))
    }

    fn rewrite(
        req: Request<AxumBody>,
        route: &RouteMatch,
        target: &ServiceTarget,
        ctx: &RequestContext,
    ) -> Result<Request<AxumBody>, GatewayError> {
        let (mut parts, body) = req.into_parts();

        let path_and_query = match parts.uri.query() {
            Some(query) => format!("{}?{query}", route.upstream_path),
            None => route.upstream_path.clone(),
        };
        let uri: Uri = target
            .uri_for(&path_and_query)
            .parse()
            .map_err(|e| GatewayError::Internal(format!("invalid upstream uri: {e}")))?;

        let original_host = parts
            .headers
            .get(header::HOST)
            .cloned()
            .or_else(|| {
                parts
                    .uri
                    .authority()
                    .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
            });

        let headers = &mut parts.headers;
        strip_hop_by_hop(headers);
        // Only the gateway may assert who the caller is.
        headers.remove(X_USER_ID);

        let authority = HeaderValue::from_str(&target.authority())
            .map_err(|e| GatewayError::Internal(format!("invalid target authority: {e}")))?;
        headers.insert(header::HOST, authority);

        if let Some(host) = original_host {
            headers.insert(X_FORWARDED_HOST, host);
        }

        if let Some(ip) = ctx.client_ip {
            let ip = ip.to_string();
            let forwarded_for = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
                Some(existing) if !existing.trim().is_empty() => format!("{existing}, {ip}"),
                _ => ip.clone(),
            };
            if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
                headers.insert(X_FORWARDED_FOR, value);
            }
            if let Ok(value) = HeaderValue::from_str(&ip) {
                headers.insert(X_REAL_IP, value);
            }
        }

        if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
            headers.insert(X_REQUEST_ID, value);
        }

        if let Some(identity) = ctx.identity() {
            let value = HeaderValue::from_str(&identity.subject).map_err(|_| {
                AuthError::InvalidToken("subject is not a valid header value".to_string())
            })?;
            headers.insert(X_USER_ID, value);
        }

        parts.uri = uri;
        parts.version = hyper::Version::HTTP_11;
        Ok(Request::from_parts(parts, body))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::{IpAddr, Ipv4Addr},
        sync::Mutex,
    };

    use async_trait::async_trait;
    use chrono::Utc;
    use http_body_util::BodyExt;
    use hyper::{Method, StatusCode};

    use super::*;
    use crate::{
        config::RouteConfig,
        core::{route_table::RouteTable, token::TokenClaims},
        ports::http_client::HttpClientResult,
    };

    #[derive(Default)]
    struct RecordingClient {
        seen: Mutex<Vec<(Method, Uri, HeaderMap)>>,
    }

    #[async_trait]
    impl HttpClient for RecordingClient {
        async fn send_request(
            &self,
            req: Request<AxumBody>,
        ) -> HttpClientResult<Response<AxumBody>> {
            let (parts, body) = req.into_parts();
            let bytes = body.collect().await.unwrap().to_bytes();
            self.seen
                .lock()
                .unwrap()
                .push((parts.method, parts.uri, parts.headers));
            Ok(Response::builder()
                .status(StatusCode::CREATED)
                .header("connection", "close")
                .header("x-upstream", "yes")
                .body(AxumBody::from(bytes))
                .unwrap())
        }
    }

    struct FailingClient;

    #[async_trait]
    impl HttpClient for FailingClient {
        async fn send_request(&self, _: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>> {
            Err(HttpClientError::ConnectionError("connection refused".to_string()))
        }
    }

    struct StallingClient;

    #[async_trait]
    impl HttpClient for StallingClient {
        async fn send_request(&self, _: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Response::new(AxumBody::empty()))
        }
    }

    fn target() -> ServiceTarget {
        ServiceTarget {
            host: "order".to_string(),
            port: 8082,
            scheme: "http".to_string(),
        }
    }

    fn dispatch(method: Method, path: &str) -> RouteMatch {
        RouteTable::new(&RouteConfig::storefront_defaults())
            .unwrap()
            .dispatch(&method, path, None)
            .unwrap()
    }

    fn ctx() -> RequestContext {
        RequestContext::new("req-123", Some(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7))))
    }

    #[tokio::test]
    async fn test_rewrites_uri_and_headers() {
        let client = Arc::new(RecordingClient::default());
        let forwarder = ProxyForwarder::new(client.clone(), Duration::from_secs(5));
        let ctx = ctx();
        ctx.set_identity(TokenClaims {
            subject: "user-42".to_string(),
            username: None,
            email: None,
            role: Some("user".to_string()),
            expires_at: Utc::now(),
        })
        .unwrap();

        let req = Request::builder()
            .method(Method::PUT)
            .uri("/orders/o-1/cancel?reason=late")
            .header("host", "shop.example.com")
            .header("x-user-id", "spoofed")
            .header("x-forwarded-for", "198.51.100.1")
            .header("connection", "keep-alive, x-secret-hop")
            .header("x-secret-hop", "1")
            .header("proxy-authorization", "Basic abc")
            .header("content-type", "application/json")
            .body(AxumBody::from("{\"why\":\"late\"}"))
            .unwrap();
        let route = dispatch(Method::PUT, "/orders/o-1/cancel");

        let response = forwarder.forward(req, &route, &target(), &ctx).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().get("connection").is_none());
        assert_eq!(response.headers()["x-upstream"], "yes");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"{\"why\":\"late\"}");

        let seen = client.seen.lock().unwrap();
        let (method, uri, headers) = &seen[0];
        assert_eq!(*method, Method::PUT);
        assert_eq!(uri.to_string(), "http://order:8082/o-1/cancel?reason=late");
        assert_eq!(headers["host"], "order:8082");
        assert_eq!(headers["x-forwarded-host"], "shop.example.com");
        assert_eq!(headers["x-real-ip"], "203.0.113.7");
        assert_eq!(headers["x-forwarded-for"], "198.51.100.1, 203.0.113.7");
        assert_eq!(headers["x-request-id"], "req-123");
        assert_eq!(headers["x-user-id"], "user-42");
        assert_eq!(headers.get_all("x-user-id").iter().count(), 1);
        assert_eq!(headers["content-type"], "application/json");
        assert!(headers.get("connection").is_none());
        assert!(headers.get("x-secret-hop").is_none());
        assert!(headers.get("proxy-authorization").is_none());
    }

    #[tokio::test]
    async fn test_client_user_id_is_stripped_without_identity() {
        let client = Arc::new(RecordingClient::default());
        let forwarder = ProxyForwarder::new(client.clone(), Duration::from_secs(5));
        let req = Request::builder()
            .uri("/catalog/products/9")
            .header("x-user-id", "admin")
            .body(AxumBody::empty())
            .unwrap();
        let route = dispatch(Method::GET, "/catalog/products/9");

        forwarder.forward(req, &route, &target(), &ctx()).await.unwrap();
        let seen = client.seen.lock().unwrap();
        assert!(seen[0].2.get("x-user-id").is_none());
        assert_eq!(seen[0].1.path(), "/products/9");
    }

    #[tokio::test]
    async fn test_connection_failure_is_upstream_error() {
        let forwarder = ProxyForwarder::new(Arc::new(FailingClient), Duration::from_secs(5));
        let req = Request::builder().uri("/orders").body(AxumBody::empty()).unwrap();
        let route = dispatch(Method::GET, "/orders");

        let err = forwarder
            .forward(req, &route, &target(), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Upstream(_)));
        assert_eq!(err.public_message(), "Service unavailable");
    }

    #[tokio::test]
    async fn test_stalled_upstream_times_out() {
        let forwarder = ProxyForwarder::new(Arc::new(StallingClient), Duration::from_millis(50));
        let req = Request::builder().uri("/orders").body(AxumBody::empty()).unwrap();
        let route = dispatch(Method::GET, "/orders");

        let err = forwarder
            .forward(req, &route, &target(), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Upstream(_)));
    }
}
