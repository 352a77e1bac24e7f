//! Core gateway orchestration service.
//!
//! The `GatewayService` owns everything a request needs that is fixed at
//! startup: the route table, the token validator, the service targets and the
//! forwarder. It provides the three pipeline stages in order:
//! * Route dispatch (method + path + query shape checks)
//! * Admission (bearer token authentication, then role authorization)
//! * Forwarding to the resolved service target
//!
//! Each stage returns `Result<_, GatewayError>` and the first error ends the
//! request. The service itself does no HTTP serving; see
//! [`crate::adapters::http_handler`] for that.
use std::{sync::Arc, time::Duration};

use axum::body::Body as AxumBody;
use eyre::WrapErr;
use hyper::{HeaderMap, Request, Response};

use crate::{
    config::GatewayConfig,
    core::{
        authorization::authorize,
        context::RequestContext,
        error::GatewayError,
        forwarder::ProxyForwarder,
        route_table::{RouteMatch, RouteTable},
        targets::TargetResolver,
        token::TokenValidator,
    },
    metrics,
    ports::http_client::HttpClient,
};

/// Immutable request pipeline, shared behind `Arc` by every request task.
pub struct GatewayService {
    routes: RouteTable,
    validator: TokenValidator,
    resolver: TargetResolver,
    forwarder: ProxyForwarder,
}

impl GatewayService {
    /// Build the pipeline from a configuration.
    ///
    /// Fails when the route table is malformed, when a route names a service
    /// with no target, or when the token settings are unusable.
    pub fn new(config: &GatewayConfig, client: Arc<dyn HttpClient>) -> eyre::Result<Self> {
        let routes = RouteTable::new(&config.routes).wrap_err("Invalid route table")?;
        let validator =
            TokenValidator::new(&config.auth).wrap_err("Invalid token validation settings")?;
        let resolver = TargetResolver::new(&config.services);

        for rule in routes.rules() {
            if !resolver.contains(&rule.service) {
                eyre::bail!(
                    "Route {} {} targets unknown service '{}'",
                    rule.method,
                    rule.pattern,
                    rule.service
                );
            }
        }

        let forwarder =
            ProxyForwarder::new(client, Duration::from_secs(config.proxy.timeout_secs));

        tracing::info!(
            routes = routes.len(),
            services = resolver.service_names().len(),
            "Gateway pipeline built"
        );

        Ok(Self {
            routes,
            validator,
            resolver,
            forwarder,
        })
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn resolver(&self) -> &TargetResolver {
        &self.resolver
    }

    /// Stage 1: match the request against the route table.
    pub fn dispatch<B>(&self, req: &Request<B>) -> Result<RouteMatch, GatewayError> {
        self.routes
            .dispatch(req.method(), req.uri().path(), req.uri().query())
    }

    /// Stage 2: authenticate and authorize according to the matched route.
    ///
    /// Public routes skip both checks. Claims are written into `ctx` and are
    /// never reused across requests.
    pub fn admit(
        &self,
        route: &RouteMatch,
        headers: &HeaderMap,
        ctx: &RequestContext,
    ) -> Result<(), GatewayError> {
        let access = &route.rule.access;
        if !access.requires_token() {
            return Ok(());
        }

        let claims = self.validator.authenticate(headers).inspect_err(|e| {
            metrics::increment_auth_failure(e.reason());
            tracing::warn!(
                request_id = %ctx.request_id,
                route = %route.rule.pattern,
                reason = e.reason(),
                "Authentication failed"
            );
        })?;

        if ctx.set_identity(claims).is_err() {
            return Err(GatewayError::Internal(
                "identity was already set for this request".to_string(),
            ));
        }

        authorize(access, ctx.identity()).inspect_err(|_| {
            metrics::increment_authz_denial();
            tracing::warn!(
                request_id = %ctx.request_id,
                route = %route.rule.pattern,
                subject = ctx.identity().map(|c| c.subject.as_str()).unwrap_or_default(),
                "Role check denied request"
            );
        })
    }

    /// Stage 3: resolve the target service and forward.
    pub async fn forward(
        &self,
        req: Request<AxumBody>,
        route: &RouteMatch,
        ctx: &RequestContext,
    ) -> Result<Response<AxumBody>, GatewayError> {
        let target = self.resolver.resolve(&route.rule.service).ok_or_else(|| {
            GatewayError::Internal(format!("no target for service '{}'", route.rule.service))
        })?;
        self.forwarder.forward(req, route, target, ctx).await
    }

    /// Stages 2 and 3 for an already matched request.
    pub async fn process(
        &self,
        req: Request<AxumBody>,
        route: &RouteMatch,
        ctx: &RequestContext,
    ) -> Result<Response<AxumBody>, GatewayError> {
        self.admit(route, req.headers(), ctx)?;
        self.forward(req, route, ctx).await
    }
}
