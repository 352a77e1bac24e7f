use std::{collections::HashSet, net::SocketAddr};

use crate::config::models::{AccessLevel, GatewayConfig, RouteConfig, ServiceConfig};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Route conflict detected: {message}")]
    RouteConflict { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

const HMAC_ALGORITHMS: [&str; 3] = ["HS256", "HS384", "HS512"];
const SUPPORTED_METHODS: [&str; 7] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

/// Gateway configuration validator
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    /// Validate the entire gateway configuration, collecting every problem.
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        errors.extend(Self::validate_auth(config));

        for (name, service) in &config.services {
            errors.extend(Self::validate_service(name, service));
        }

        if config.proxy.timeout_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: "proxy.timeout_secs".to_string(),
                message: "Timeout must be greater than zero".to_string(),
            });
        }

        if config.routes.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "routes".to_string(),
            });
        } else {
            for route in &config.routes {
                errors.extend(Self::validate_single_route(config, route));
            }
            errors.extend(Self::check_route_conflicts(&config.routes));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_auth(config: &GatewayConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if config.auth.jwt_secret.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "auth.jwt_secret".to_string(),
            });
        }

        if config.auth.allowed_algorithms.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "auth.allowed_algorithms".to_string(),
            });
        }
        for alg in &config.auth.allowed_algorithms {
            if !HMAC_ALGORITHMS.contains(&alg.as_str()) {
                errors.push(ValidationError::InvalidField {
                    field: "auth.allowed_algorithms".to_string(),
                    message: format!(
                        "'{alg}' is not allowed; tokens are verified with a shared secret, use one of {HMAC_ALGORITHMS:?}"
                    ),
                });
            }
        }

        errors
    }

    fn validate_service(name: &str, service: &ServiceConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if service.host.trim().is_empty() || service.host.contains(['/', ' ']) {
            errors.push(ValidationError::InvalidField {
                field: format!("services.{name}.host"),
                message: format!("'{}' is not a valid host name", service.host),
            });
        }
        if service.port == 0 {
            errors.push(ValidationError::InvalidField {
                field: format!("services.{name}.port"),
                message: "Port must be greater than zero".to_string(),
            });
        }
        if service.scheme != "http" && service.scheme != "https" {
            errors.push(ValidationError::InvalidField {
                field: format!("services.{name}.scheme"),
                message: format!("Scheme must be 'http' or 'https', got '{}'", service.scheme),
            });
        }

        errors
    }

    /// Validate a single route configuration
    fn validate_single_route(config: &GatewayConfig, route: &RouteConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let label = format!("route '{} {}'", route.method, route.path);

        if !SUPPORTED_METHODS.contains(&route.method.to_ascii_uppercase().as_str()) {
            errors.push(ValidationError::InvalidField {
                field: format!("{label} method"),
                message: format!("Unsupported method '{}'", route.method),
            });
        }

        if !route.path.starts_with('/') {
            errors.push(ValidationError::InvalidField {
                field: format!("{label} path"),
                message: "Route paths must start with '/'".to_string(),
            });
        }

        if !route.upstream_path.starts_with('/') {
            errors.push(ValidationError::InvalidField {
                field: format!("{label} upstream_path"),
                message: "Upstream paths must start with '/'".to_string(),
            });
        }

        let params: HashSet<&str> = route
            .path
            .split('/')
            .filter_map(|segment| segment.strip_prefix(':'))
            .collect();
        for referenced in route
            .upstream_path
            .split('/')
            .filter_map(|segment| segment.strip_prefix(':'))
        {
            if !params.contains(referenced) {
                errors.push(ValidationError::InvalidField {
                    field: format!("{label} upstream_path"),
                    message: format!("References unknown path parameter ':{referenced}'"),
                });
            }
        }

        if !config.services.contains_key(&route.service) {
            errors.push(ValidationError::InvalidField {
                field: format!("{label} service"),
                message: format!("Unknown service '{}'", route.service),
            });
        }

        match route.access {
            AccessLevel::Role if route.roles.is_empty() => {
                errors.push(ValidationError::MissingField {
                    field: format!("{label} roles"),
                });
            }
            AccessLevel::Public | AccessLevel::Authenticated if !route.roles.is_empty() => {
                errors.push(ValidationError::InvalidField {
                    field: format!("{label} roles"),
                    message: "Roles are only meaningful with access = \"role\"".to_string(),
                });
            }
            _ => {}
        }

        errors
    }

    /// Two rules may not share the same method and pattern. Parameter names
    /// do not distinguish patterns: `/a/:id` and `/a/:slug` collide.
    fn check_route_conflicts(routes: &[RouteConfig]) -> Vec<ValidationError> {
        let mut seen = HashSet::new();
        let mut errors = Vec::new();

        for route in routes {
            let shape: Vec<&str> = route
                .path
                .split('/')
                .map(|segment| if segment.starts_with(':') { ":" } else { segment })
                .collect();
            let key = (route.method.to_ascii_uppercase(), shape.join("/"));
            if !seen.insert(key) {
                errors.push(ValidationError::RouteConflict {
                    message: format!("'{} {}' is declared more than once", route.method, route.path),
                });
            }
        }

        errors
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        errors
            .iter()
            .map(|e| format!("  • {e}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
