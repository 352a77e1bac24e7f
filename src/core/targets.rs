//! Logical service name to network address.
use std::collections::HashMap;

use crate::config::ServiceConfig;

/// Where a logical service can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTarget {
    pub host: String,
    pub port: u16,
    pub scheme: String,
}

impl ServiceTarget {
    /// `host:port`, the value written to the outbound `Host` header.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Absolute URI for `path_and_query` on this target.
    pub fn uri_for(&self, path_and_query: &str) -> String {
        format!("{}://{}{}", self.scheme, self.authority(), path_and_query)
    }
}

impl From<&ServiceConfig> for ServiceTarget {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            scheme: config.scheme.clone(),
        }
    }
}

/// Immutable lookup table built once at startup.
#[derive(Debug, Clone, Default)]
pub struct TargetResolver {
    targets: HashMap<String, ServiceTarget>,
}

impl TargetResolver {
    pub fn new(services: &HashMap<String, ServiceConfig>) -> Self {
        let targets = services
            .iter()
            .map(|(name, config)| (name.clone(), ServiceTarget::from(config)))
            .collect();
        Self { targets }
    }

    pub fn resolve(&self, service: &str) -> Option<&ServiceTarget> {
        self.targets.get(service)
    }

    pub fn contains(&self, service: &str) -> bool {
        self.targets.contains_key(service)
    }

    /// Service names in a stable order.
    pub fn service_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.targets.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;

    #[test]
    fn test_resolves_default_services() {
        let resolver = TargetResolver::new(&GatewayConfig::default_services());
        let catalog = resolver.resolve("catalog").unwrap();
        assert_eq!(catalog.authority(), "catalog:8081");
        assert_eq!(
            catalog.uri_for("/products?page=2"),
            "http://catalog:8081/products?page=2"
        );
        assert!(resolver.resolve("warehouse").is_none());
        assert_eq!(resolver.service_names().first(), Some(&"cart"));
    }
}
