pub mod app;
pub mod health;
pub mod http_client;
pub mod http_handler;
pub mod middleware;

/// Re-export commonly used types from adapters
pub use app::{AppState, build_router};
pub use health::HealthReport;
pub use http_client::HttpClientAdapter;
pub use http_handler::{ClientIpResolver, HttpHandler, RequestId, RouteLabel};
