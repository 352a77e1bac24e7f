//! Route table and request dispatch.
//!
//! Patterns are written with `:name` parameters and compiled into one radix
//! tree per method, so a literal segment always wins over a parameter at the
//! same position and lookup cost does not grow with the number of rules.
use std::{collections::HashMap, str::FromStr, sync::Arc};

use hyper::Method;
use thiserror::Error;

use crate::{
    config::{AccessLevel, RouteConfig},
    core::error::GatewayError,
};

/// Stand-in for an empty segment, used to tell an empty parameter apart from
/// a path nothing matches.
const EMPTY_SEGMENT: &str = "%00";

/// Problems found while building the table. All of them are fatal at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RouteTableError {
    #[error("invalid method '{0}'")]
    InvalidMethod(String),

    #[error("malformed pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("upstream path '{template}' references unknown parameter ':{param}'")]
    UnknownParameter { template: String, param: String },

    #[error("duplicate route {method} {pattern}")]
    Duplicate { method: Method, pattern: String },
}

/// Who may call a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
    Roles(Vec<String>),
}

impl Access {
    pub fn requires_token(&self) -> bool {
        !matches!(self, Access::Public)
    }
}

/// A compiled route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    pub method: Method,
    /// Pattern as configured, also used as the metrics label.
    pub pattern: String,
    pub service: String,
    pub upstream_template: String,
    pub access: Access,
    pub required_query: Vec<String>,
}

impl RouteRule {
    fn from_config(config: &RouteConfig) -> Result<Self, RouteTableError> {
        let method = Method::from_str(&config.method.to_ascii_uppercase())
            .map_err(|_| RouteTableError::InvalidMethod(config.method.clone()))?;
        let access = match config.access {
            AccessLevel::Public => Access::Public,
            AccessLevel::Authenticated => Access::Authenticated,
            AccessLevel::Role => Access::Roles(config.roles.clone()),
        };
        Ok(Self {
            method,
            pattern: config.path.clone(),
            service: config.service.clone(),
            upstream_template: config.upstream_path.clone(),
            access,
            required_query: config.required_query.clone(),
        })
    }
}

/// Result of a successful dispatch.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub rule: Arc<RouteRule>,
    /// Parameter values as they appeared in the request path.
    pub params: Vec<(String, String)>,
    /// Upstream path with parameters substituted, without query.
    pub upstream_path: String,
}

impl RouteMatch {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Immutable dispatcher shared by every request.
#[derive(Default)]
pub struct RouteTable {
    routers: HashMap<Method, matchit::Router<Arc<RouteRule>>>,
    rules: Vec<Arc<RouteRule>>,
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("rules", &self.rules.len())
            .finish()
    }
}

impl RouteTable {
    pub fn new(routes: &[RouteConfig]) -> Result<Self, RouteTableError> {
        let mut table = Self::default();
        for route in routes {
            table.insert(RouteRule::from_config(route)?)?;
        }
        Ok(table)
    }

    fn insert(&mut self, rule: RouteRule) -> Result<(), RouteTableError> {
        let (tree_path, params) = compile_pattern(&rule.pattern)?;

        for segment in rule.upstream_template.split('/') {
            if let Some(name) = segment.strip_prefix(':') {
                if !params.iter().any(|p| p == name) {
                    return Err(RouteTableError::UnknownParameter {
                        template: rule.upstream_template.clone(),
                        param: name.to_string(),
                    });
                }
            }
        }
        if !rule.upstream_template.starts_with('/') {
            return Err(RouteTableError::InvalidPattern {
                pattern: rule.upstream_template.clone(),
                reason: "upstream path must start with '/'".to_string(),
            });
        }

        let rule = Arc::new(rule);
        let router = self.routers.entry(rule.method.clone()).or_default();
        router.insert(tree_path, Arc::clone(&rule)).map_err(|e| match e {
            matchit::InsertError::Conflict { .. } => RouteTableError::Duplicate {
                method: rule.method.clone(),
                pattern: rule.pattern.clone(),
            },
            other => RouteTableError::InvalidPattern {
                pattern: rule.pattern.clone(),
                reason: other.to_string(),
            },
        })?;
        self.rules.push(rule);
        Ok(())
    }

    pub fn rules(&self) -> &[Arc<RouteRule>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Find the rule for a request and validate the client-controlled parts
    /// the rule depends on.
    pub fn dispatch(
        &self,
        method: &Method,
        path: &str,
        query: Option<&str>,
    ) -> Result<RouteMatch, GatewayError> {
        let router = self.routers.get(method).ok_or(GatewayError::RouteNotFound)?;

        let (rule, params) = match router.at(path) {
            Ok(matched) => (
                Arc::clone(matched.value),
                matched
                    .params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<Vec<_>>(),
            ),
            Err(_) => return Err(Self::classify_miss(router, path)),
        };

        for (name, value) in &params {
            if value.is_empty() {
                return Err(GatewayError::BadRequest(format!(
                    "path parameter '{name}' must not be empty"
                )));
            }
            if is_dot_segment(value) {
                return Err(GatewayError::BadRequest(format!(
                    "invalid value for path parameter '{name}'"
                )));
            }
        }

        for key in &rule.required_query {
            let present = query.is_some_and(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .any(|(k, v)| k == key.as_str() && !v.trim().is_empty())
            });
            if !present {
                return Err(GatewayError::BadRequest(format!(
                    "query parameter '{key}' is required"
                )));
            }
        }

        let upstream_path = render_template(&rule.upstream_template, &params);
        Ok(RouteMatch {
            rule,
            params,
            upstream_path,
        })
    }

    /// A path with an empty segment that would match once the segment is
    /// filled in carries an empty parameter: that is the client's fault.
    fn classify_miss(router: &matchit::Router<Arc<RouteRule>>, path: &str) -> GatewayError {
        if path.len() > 1 && path.split('/').skip(1).any(str::is_empty) {
            let filled = path
                .split('/')
                .enumerate()
                .map(|(i, s)| if i > 0 && s.is_empty() { EMPTY_SEGMENT } else { s })
                .collect::<Vec<_>>()
                .join("/");
            if let Ok(matched) = router.at(&filled) {
                if let Some((name, _)) = matched.params.iter().find(|(_, v)| *v == EMPTY_SEGMENT) {
                    return GatewayError::BadRequest(format!(
                        "path parameter '{name}' must not be empty"
                    ));
                }
            }
        }
        GatewayError::RouteNotFound
    }
}

/// Translate `/a/:id` into the tree syntax `/a/{id}` and collect parameter names.
fn compile_pattern(pattern: &str) -> Result<(String, Vec<String>), RouteTableError> {
    let invalid = |reason: &str| RouteTableError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    if !pattern.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }
    if pattern.contains(['{', '}', '*', '?', '#']) {
        return Err(invalid("reserved character"));
    }

    let mut params = Vec::new();
    let mut segments = Vec::new();
    for segment in pattern.split('/').skip(1) {
        if let Some(name) = segment.strip_prefix(':') {
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(invalid("parameter names must be non-empty identifiers"));
            }
            if params.iter().any(|p| p == name) {
                return Err(invalid("parameter declared twice"));
            }
            params.push(name.to_string());
            segments.push(format!("{{{name}}}"));
        } else if segment.contains(':') {
            return Err(invalid("parameters must span a whole segment"));
        } else {
            segments.push(segment.to_string());
        }
    }

    Ok((format!("/{}", segments.join("/")), params))
}

fn render_template(template: &str, params: &[(String, String)]) -> String {
    template
        .split('/')
        .map(|segment| {
            segment
                .strip_prefix(':')
                .and_then(|name| params.iter().find(|(k, _)| k == name))
                .map_or(segment, |(_, v)| v.as_str())
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// `.` or `..`, raw or percent-encoded.
fn is_dot_segment(value: &str) -> bool {
    let decoded = value.to_ascii_lowercase().replace("%2e", ".");
    decoded == "." || decoded == ".." || value == EMPTY_SEGMENT
}
