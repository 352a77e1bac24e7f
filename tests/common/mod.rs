#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{Router, body::Body, extract::ConnectInfo};
use chrono::Utc;
use http_body_util::BodyExt;
use hyper::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use storefront_gateway::{
    adapters::{AppState, ClientIpResolver, HttpHandler, build_router},
    config::GatewayConfig,
    core::GatewayService,
    ports::http_client::{HttpClient, HttpClientError, HttpClientResult},
};

pub const SECRET: &str = "integration-secret";
pub const CLIENT_ADDR: ([u8; 4], u16) = ([192, 0, 2, 10], 40_000);

/// What the fake upstream saw.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// Answer 200 with a small JSON body.
    Respond,
    /// Answer with the given status.
    Status(u16),
    /// Fail like a refused connection.
    Refuse,
    /// Never answer; the pending call is observable through
    /// [`FakeUpstream::stalled_call_dropped`].
    Stall,
    /// Panic inside the call.
    Panic,
}

/// Upstream stand-in that records every request it receives.
pub struct FakeUpstream {
    pub seen: Mutex<Vec<SeenRequest>>,
    behavior: Mutex<Behavior>,
    stall_dropped: AtomicBool,
}

/// Flags the owning upstream when a stalled call is dropped.
struct DropFlag<'a>(&'a AtomicBool);

impl Drop for DropFlag<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl FakeUpstream {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
            behavior: Mutex::new(behavior),
            stall_dropped: AtomicBool::new(false),
        })
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    /// Whether a stalled call was cancelled by its caller.
    pub fn stalled_call_dropped(&self) -> bool {
        self.stall_dropped.load(Ordering::SeqCst)
    }

    pub fn last(&self) -> SeenRequest {
        self.requests().pop().expect("upstream received no request")
    }
}

#[async_trait]
impl HttpClient for FakeUpstream {
    async fn send_request(&self, req: Request<Body>) -> HttpClientResult<Response<Body>> {
        let behavior = *self.behavior.lock().unwrap();
        let (parts, body) = req.into_parts();
        let body = body.collect().await.unwrap().to_bytes().to_vec();
        self.seen.lock().unwrap().push(SeenRequest {
            method: parts.method,
            uri: parts.uri.clone(),
            headers: parts.headers,
            body,
        });

        match behavior {
            Behavior::Respond => Ok(Response::builder()
                .status(StatusCode::OK)
                .header("content-type", "application/json")
                .header("x-served-by", parts.uri.authority().unwrap().as_str())
                .body(Body::from(r#"{"ok":true}"#))
                .unwrap()),
            Behavior::Status(code) => Ok(Response::builder()
                .status(code)
                .body(Body::from("upstream says no"))
                .unwrap()),
            Behavior::Refuse => Err(HttpClientError::ConnectionError(
                "connection refused".to_string(),
            )),
            Behavior::Stall => {
                let _flag = DropFlag(&self.stall_dropped);
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!()
            }
            Behavior::Panic => panic!("upstream client blew up"),
        }
    }
}

pub fn config() -> GatewayConfig {
    GatewayConfig::builder().jwt_secret(SECRET).build().unwrap()
}

pub fn app_with(config: &GatewayConfig, client: Arc<dyn HttpClient>) -> Router {
    app_with_metrics(config, client, None)
}

pub fn app_with_metrics(
    config: &GatewayConfig,
    client: Arc<dyn HttpClient>,
    metrics: Option<PrometheusHandle>,
) -> Router {
    let gateway = Arc::new(GatewayService::new(config, client).unwrap());
    let client_ip = ClientIpResolver::new(config.proxy.trust_forwarded_headers);
    let state = AppState {
        handler: Arc::new(HttpHandler::new(gateway, client_ip)),
        metrics,
    };
    build_router(state, &config.cors, client_ip).unwrap()
}

pub fn app(upstream: &Arc<FakeUpstream>) -> Router {
    app_with(&config(), upstream.clone())
}

/// Mint a token with the given claims over the test secret.
pub fn token_with(alg: Algorithm, secret: &str, claims: serde_json::Value) -> String {
    encode(
        &Header::new(alg),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

pub fn token(subject: &str, role: &str) -> String {
    token_with(
        Algorithm::HS256,
        SECRET,
        json!({
            "user_id": subject,
            "username": subject,
            "email": format!("{subject}@example.com"),
            "role": role,
            "exp": Utc::now().timestamp() + 3600,
        }),
    )
}

pub fn request(method: Method, uri: &str) -> hyper::http::request::Builder {
    Request::builder().method(method).uri(uri)
}

/// Attach the peer address the way the server does for real connections.
pub fn with_peer(mut req: Request<Body>) -> Request<Body> {
    req.extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(CLIENT_ADDR)));
    req
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
