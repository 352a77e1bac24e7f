//! Configuration data structures for the gateway.
//!
//! These types map directly to YAML / TOML / JSON configuration files and are
//! layered by [`crate::config::loader`] on top of [`GatewayConfig::default`], so
//! a minimal file only needs to carry the signing secret.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

fn default_scheme() -> String {
    "http".to_string()
}

/// Address of one logical backend service.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_scheme")]
    pub scheme: String,
}

impl ServiceConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            scheme: default_scheme(),
        }
    }
}

/// Bearer token verification settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret tokens are signed with. Required.
    pub jwt_secret: String,
    /// Accepted signing algorithms; HMAC family only.
    pub allowed_algorithms: Vec<String>,
    /// Clock skew tolerated by the library-level `exp` check, in seconds.
    pub leeway_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            allowed_algorithms: vec!["HS256".to_string()],
            leeway_secs: 0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    /// Only honoured for an explicit origin list; `*` is never credentialed.
    pub allow_credentials: bool,
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allow_credentials: false,
            max_age_secs: 86_400,
        }
    }
}

/// Outbound forwarding settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ProxyConfig {
    /// Upper bound for receiving the upstream response head.
    pub timeout_secs: u64,
    /// Take the client IP from `X-Forwarded-For` / `X-Real-IP` instead of the peer address.
    pub trust_forwarded_headers: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            trust_forwarded_headers: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Who may call a route.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Public,
    Authenticated,
    /// Authenticated and holding one of the route's `roles`.
    Role,
}

/// One entry of the route table as it appears in configuration.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RouteConfig {
    pub method: String,
    /// Gateway-facing pattern, e.g. `/catalog/products/:id`.
    pub path: String,
    /// Logical service name, key into `services`.
    pub service: String,
    /// Path on the service; may reference the pattern's parameters.
    pub upstream_path: String,
    pub access: AccessLevel,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub required_query: Vec<String>,
}

impl RouteConfig {
    pub fn new(
        method: &str,
        path: &str,
        service: &str,
        upstream_path: &str,
        access: AccessLevel,
    ) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            service: service.to_string(),
            upstream_path: upstream_path.to_string(),
            access,
            roles: Vec::new(),
            required_query: Vec::new(),
        }
    }

    /// Restrict the route to the given roles.
    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.access = AccessLevel::Role;
        self.roles = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn with_required_query(mut self, keys: &[&str]) -> Self {
        self.required_query = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    /// The storefront route table served when the configuration declares none.
    pub fn storefront_defaults() -> Vec<RouteConfig> {
        use AccessLevel::{Authenticated, Public};

        let public = |m, p, s, u| RouteConfig::new(m, p, s, u, Public);
        let private = |m, p, s, u| RouteConfig::new(m, p, s, u, Authenticated);
        let admin = |m, p, s, u| RouteConfig::new(m, p, s, u, Authenticated).with_roles(&["admin"]);

        vec![
            // Catalog (read only)
            public("GET", "/catalog/products", "catalog", "/products"),
            public("GET", "/catalog/products/search", "catalog", "/products/search")
                .with_required_query(&["q"]),
            public("GET", "/catalog/products/:id", "catalog", "/products/:id"),
            public("GET", "/catalog/categories", "catalog", "/categories"),
            public("GET", "/catalog/categories/:id", "catalog", "/categories/:id"),
            // Authentication
            public("POST", "/auth/login", "user", "/auth/login"),
            public("POST", "/auth/register", "user", "/auth/register"),
            public("POST", "/auth/refresh", "user", "/auth/refresh"),
            public("POST", "/auth/forgot-password", "user", "/auth/forgot-password"),
            public("POST", "/auth/reset-password", "user", "/auth/reset-password"),
            // Cart
            private("GET", "/cart", "cart", "/"),
            private("POST", "/cart/items", "cart", "/items"),
            private("PUT", "/cart/items/:id", "cart", "/items/:id"),
            private("DELETE", "/cart/items/:id", "cart", "/items/:id"),
            private("POST", "/cart/checkout", "cart", "/checkout"),
            // Orders
            private("GET", "/orders", "order", "/"),
            private("POST", "/orders", "order", "/"),
            private("GET", "/orders/:id", "order", "/:id"),
            private("PUT", "/orders/:id/cancel", "order", "/:id/cancel"),
            // User profile
            private("GET", "/users/profile", "user", "/profile"),
            private("PUT", "/users/profile", "user", "/profile"),
            private("GET", "/users/addresses", "user", "/addresses"),
            private("POST", "/users/addresses", "user", "/addresses"),
            private("PUT", "/users/addresses/:id", "user", "/addresses/:id"),
            private("DELETE", "/users/addresses/:id", "user", "/addresses/:id"),
            // Payments
            private("GET", "/payments/methods", "payment", "/methods"),
            private("POST", "/payments/process", "payment", "/process"),
            private("GET", "/payments/:id/status", "payment", "/:id/status"),
            // Dashboard
            private("GET", "/dashboard/stats", "order", "/dashboard/stats"),
            private("GET", "/dashboard/recent-orders", "order", "/dashboard/recent-orders"),
            // Admin: catalog
            admin("POST", "/admin/catalog/products", "catalog", "/admin/products"),
            admin("PUT", "/admin/catalog/products/:id", "catalog", "/admin/products/:id"),
            admin("DELETE", "/admin/catalog/products/:id", "catalog", "/admin/products/:id"),
            admin("POST", "/admin/catalog/categories", "catalog", "/admin/categories"),
            admin("PUT", "/admin/catalog/categories/:id", "catalog", "/admin/categories/:id"),
            admin("DELETE", "/admin/catalog/categories/:id", "catalog", "/admin/categories/:id"),
            // Admin: orders
            admin("GET", "/admin/orders", "order", "/admin"),
            admin("PUT", "/admin/orders/:id/status", "order", "/admin/:id/status"),
            // Admin: users
            admin("GET", "/admin/users", "user", "/admin"),
            admin("GET", "/admin/users/:id", "user", "/admin/:id"),
            admin("PUT", "/admin/users/:id", "user", "/admin/:id"),
            admin("DELETE", "/admin/users/:id", "user", "/admin/:id"),
            // Admin: inventory
            admin("GET", "/admin/inventory", "inventory", "/admin"),
            admin("PUT", "/admin/inventory/products/:id", "inventory", "/admin/products/:id"),
        ]
    }
}

/// Root configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GatewayConfig {
    pub listen_addr: String,
    pub shutdown_timeout_secs: u64,
    pub services: HashMap<String, ServiceConfig>,
    pub auth: AuthConfig,
    pub cors: CorsConfig,
    pub proxy: ProxyConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
    pub routes: Vec<RouteConfig>,
}

impl GatewayConfig {
    /// Create a new configuration builder starting from the defaults.
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }

    /// Default backend addresses: each service is reachable under its own name.
    pub fn default_services() -> HashMap<String, ServiceConfig> {
        [
            ("catalog", 8081),
            ("order", 8082),
            ("cart", 8083),
            ("user", 8084),
            ("payment", 8085),
            ("inventory", 8086),
            ("notification", 8087),
        ]
        .into_iter()
        .map(|(name, port)| (name.to_string(), ServiceConfig::new(name, port)))
        .collect()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            shutdown_timeout_secs: 10,
            services: Self::default_services(),
            auth: AuthConfig::default(),
            cors: CorsConfig::default(),
            proxy: ProxyConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
            routes: RouteConfig::storefront_defaults(),
        }
    }
}

/// Builder for [`GatewayConfig`], mostly used by embedders and tests.
#[derive(Default)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    pub fn jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.auth.jwt_secret = secret.into();
        self
    }

    /// Add or replace a service target.
    pub fn service(mut self, name: impl Into<String>, service: ServiceConfig) -> Self {
        self.config.services.insert(name.into(), service);
        self
    }

    /// Replace the route table.
    pub fn routes(mut self, routes: Vec<RouteConfig>) -> Self {
        self.config.routes = routes;
        self
    }

    pub fn proxy_timeout_secs(mut self, secs: u64) -> Self {
        self.config.proxy.timeout_secs = secs;
        self
    }

    pub fn trust_forwarded_headers(mut self, trust: bool) -> Self {
        self.config.proxy.trust_forwarded_headers = trust;
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> Result<GatewayConfig, String> {
        if self.config.auth.jwt_secret.is_empty() {
            return Err("auth.jwt_secret is required".to_string());
        }
        if self.config.routes.is_empty() {
            return Err("At least one route must be configured".to_string());
        }
        Ok(self.config)
    }
}
