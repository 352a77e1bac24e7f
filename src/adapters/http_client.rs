use async_trait::async_trait;
use axum::body::Body as AxumBody;
use eyre::Result;
use hyper::{Request, Response, Version, header};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use rustls_native_certs::load_native_certs;
use tracing::Instrument;

use crate::ports::http_client::{HttpClient, HttpClientError, HttpClientResult};

/// HTTP client adapter using Hyper with Rustls (HTTP/1.1, plain or TLS).
///
/// Responsibilities:
/// * Owns the pooled connections to every backend service
/// * Streams request and response bodies without buffering
/// * Reports transport failures as [`HttpClientError`]
///
/// The gateway bounds each call with its own timeout, and dropping the
/// returned future cancels the exchange. No retries happen here.
pub struct HttpClientAdapter {
    client: Client<HttpsConnector<HttpConnector>, AxumBody>,
}

impl HttpClientAdapter {
    /// Create a new HTTP client adapter.
    pub fn new() -> Result<Self> {
        // Install default crypto provider for rustls if not already set
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false); // Allow HTTPS URLs
        http_connector.set_nodelay(true);

        let mut root_cert_store = rustls::RootCertStore::empty();
        let native_certs = load_native_certs();

        if !native_certs.certs.is_empty() {
            for cert in native_certs.certs {
                if root_cert_store.add(cert).is_err() {
                    tracing::warn!("Failed to add native certificate to rustls RootCertStore");
                }
            }
            tracing::debug!("Loaded {} native root certificates.", root_cert_store.len());
        }

        if !native_certs.errors.is_empty() {
            tracing::warn!(
                "Some native certificates failed to load: {:?}",
                native_certs.errors
            );
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();

        // Backend services are addressed by scheme: plain http inside the
        // cluster, https when a target is configured that way.
        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new()).build::<_, AxumBody>(https_connector);

        tracing::info!("Created upstream HTTP client");
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>> {
        if req.uri().host().is_none() {
            tracing::error!("Outgoing URI has no host: {}", req.uri());
            return Err(HttpClientError::InvalidRequest(
                "Outgoing URI has no host".to_string(),
            ));
        }

        let (mut parts, body) = req.into_parts();
        parts.version = Version::HTTP_11;

        let span = tracing::debug_span!(
            "upstream_request",
            http.method = %parts.method,
            http.uri = %parts.uri,
            http.status_code = tracing::field::Empty,
        );

        let method = parts.method.clone();
        let uri = parts.uri.clone();

        let result = self
            .client
            .request(Request::from_parts(parts, body))
            .instrument(span.clone())
            .await;

        match result {
            Ok(response) => {
                span.record("http.status_code", response.status().as_u16());

                let (mut parts, hyper_body) = response.into_parts();
                // The body is re-framed by the server on the way out.
                parts.headers.remove(header::TRANSFER_ENCODING);

                Ok(Response::from_parts(parts, AxumBody::new(hyper_body)))
            }
            Err(e) => {
                span.record("http.status_code", 599u16);
                Err(HttpClientError::ConnectionError(format!(
                    "Request to {method} {uri} failed: {e}"
                )))
            }
        }
    }
}
