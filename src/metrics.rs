//! Metrics helpers for the gateway.
//!
//! This module wraps the `metrics` crate macros behind a few functions and
//! RAII timers, and installs the Prometheus recorder whose rendered output is
//! served at `GET /metrics`. When no recorder is installed (tests, or
//! `metrics.enabled = false`) every call here is a cheap no-op.
//!
//! Provided metrics (labels vary by family):
//! * `gateway_requests_total` (counter: method, route, status)
//! * `gateway_request_duration_seconds` (histogram: method, route)
//! * `gateway_upstream_requests_total` (counter: service, outcome)
//! * `gateway_upstream_request_duration_seconds` (histogram: service)
//! * `gateway_auth_failures_total` (counter: reason)
//! * `gateway_authz_denials_total` (counter)
//! * `gateway_panics_total` (counter)
//!
//! The `route` label is the matched pattern, never the raw path, so its
//! cardinality is bounded by the route table.
use std::time::{Duration, Instant};

use metrics::{Unit, counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

pub const GATEWAY_REQUESTS_TOTAL: &str = "gateway_requests_total";
pub const GATEWAY_REQUEST_DURATION_SECONDS: &str = "gateway_request_duration_seconds";
pub const GATEWAY_UPSTREAM_REQUESTS_TOTAL: &str = "gateway_upstream_requests_total";
pub const GATEWAY_UPSTREAM_REQUEST_DURATION_SECONDS: &str =
    "gateway_upstream_request_duration_seconds";
pub const GATEWAY_AUTH_FAILURES_TOTAL: &str = "gateway_auth_failures_total";
pub const GATEWAY_AUTHZ_DENIALS_TOTAL: &str = "gateway_authz_denials_total";
pub const GATEWAY_PANICS_TOTAL: &str = "gateway_panics_total";

/// Route label for requests that matched no rule.
pub const UNMATCHED_ROUTE: &str = "unmatched";

const LATENCY_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

fn describe_metrics() {
    describe_counter!(
        GATEWAY_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of HTTP requests processed by the gateway."
    );
    describe_histogram!(
        GATEWAY_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of HTTP requests processed by the gateway."
    );
    describe_counter!(
        GATEWAY_UPSTREAM_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of requests forwarded to backend services, by outcome."
    );
    describe_histogram!(
        GATEWAY_UPSTREAM_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Time until a backend service returned its response head."
    );
    describe_counter!(
        GATEWAY_AUTH_FAILURES_TOTAL,
        Unit::Count,
        "Requests rejected by bearer token authentication."
    );
    describe_counter!(
        GATEWAY_AUTHZ_DENIALS_TOTAL,
        Unit::Count,
        "Authenticated requests rejected by the role check."
    );
    describe_counter!(
        GATEWAY_PANICS_TOTAL,
        Unit::Count,
        "Panics caught by the recovery boundary."
    );
}

/// Install the global Prometheus recorder and return the handle used to
/// render `/metrics`. Can only succeed once per process.
pub fn init_metrics() -> eyre::Result<PrometheusHandle> {
    tracing::info!("Initializing gateway metrics system");

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &LATENCY_BUCKETS,
        )?
        .install_recorder()?;
    describe_metrics();

    tracing::info!("Gateway metrics system initialized successfully");
    Ok(handle)
}

/// Increment the total request counter for an inbound gateway request.
pub fn increment_request_total(route: &str, method: &str, status: u16) {
    counter!(
        GATEWAY_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a completed inbound request's duration.
pub fn record_request_duration(route: &str, method: &str, duration: Duration) {
    histogram!(
        GATEWAY_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Count one forwarded request. `outcome` is `ok` or an error label.
pub fn increment_upstream_request_total(service: &str, outcome: &str) {
    counter!(
        GATEWAY_UPSTREAM_REQUESTS_TOTAL,
        "service" => service.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_upstream_request_duration(service: &str, duration: Duration) {
    histogram!(
        GATEWAY_UPSTREAM_REQUEST_DURATION_SECONDS,
        "service" => service.to_string()
    )
    .record(duration.as_secs_f64());
}

pub fn increment_auth_failure(reason: &'static str) {
    counter!(GATEWAY_AUTH_FAILURES_TOTAL, "reason" => reason).increment(1);
}

pub fn increment_authz_denial() {
    counter!(GATEWAY_AUTHZ_DENIALS_TOTAL).increment(1);
}

pub fn increment_panics() {
    counter!(GATEWAY_PANICS_TOTAL).increment(1);
}

/// RAII helper measuring inbound request duration.
///
/// The route label is usually only known once the response is built, so it
/// can be filled in after the timer starts.
pub struct RequestTimer {
    start: Instant,
    route: String,
    method: String,
}

impl RequestTimer {
    pub fn new(method: &str) -> Self {
        Self {
            start: Instant::now(),
            route: UNMATCHED_ROUTE.to_string(),
            method: method.to_string(),
        }
    }

    pub fn set_route(&mut self, route: &str) {
        self.route = route.to_string();
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        record_request_duration(&self.route, &self.method, self.start.elapsed());
    }
}

/// RAII helper measuring time to the upstream response head. Recorded on
/// drop, so a dropped (cancelled) call is measured too.
pub struct UpstreamRequestTimer {
    start: Instant,
    service: String,
}

impl UpstreamRequestTimer {
    pub fn new(service: &str) -> Self {
        Self {
            start: Instant::now(),
            service: service.to_string(),
        }
    }
}

impl Drop for UpstreamRequestTimer {
    fn drop(&mut self) {
        record_upstream_request_duration(&self.service, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use metrics_exporter_prometheus::PrometheusBuilder;

    use super::*;

    /// Run `f` against a private recorder and return the rendered output.
    fn rendered(f: impl FnOnce()) -> String {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &LATENCY_BUCKETS,
            )
            .unwrap()
            .build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, f);
        handle.render()
    }

    /// Value of the single `family` sample carrying all of `labels`,
    /// regardless of label order.
    fn sample(text: &str, family: &str, labels: &[&str]) -> Option<f64> {
        let mut found = text.lines().filter(|line| {
            line.strip_prefix(family)
                .is_some_and(|rest| rest.starts_with('{') || rest.starts_with(' '))
                && labels.iter().all(|label| line.contains(label))
        });
        let line = found.next()?;
        assert!(found.next().is_none(), "ambiguous sample for {family}");
        line.rsplit(' ').next()?.parse().ok()
    }

    #[test]
    fn test_request_timer_records_late_route_label() {
        let text = rendered(|| {
            let mut timer = RequestTimer::new("GET");
            assert_eq!(timer.route, UNMATCHED_ROUTE);
            timer.set_route("/orders/:id");
            drop(timer);
        });

        assert_eq!(
            sample(
                &text,
                "gateway_request_duration_seconds_count",
                &[r#"method="GET""#, r#"route="/orders/:id""#]
            ),
            Some(1.0),
            "{text}"
        );
        assert!(!text.contains(UNMATCHED_ROUTE));
    }

    #[test]
    fn test_upstream_counters_and_timer() {
        let text = rendered(|| {
            drop(UpstreamRequestTimer::new("catalog"));
            increment_upstream_request_total("catalog", "ok");
            increment_upstream_request_total("catalog", "ok");
            increment_upstream_request_total("catalog", "timeout");
        });

        let upstream = GATEWAY_UPSTREAM_REQUESTS_TOTAL;
        assert_eq!(
            sample(&text, "gateway_upstream_request_duration_seconds_count", &[r#"service="catalog""#]),
            Some(1.0)
        );
        assert_eq!(
            sample(&text, upstream, &[r#"service="catalog""#, r#"outcome="ok""#]),
            Some(2.0)
        );
        assert_eq!(
            sample(&text, upstream, &[r#"service="catalog""#, r#"outcome="timeout""#]),
            Some(1.0)
        );
    }

    #[test]
    fn test_security_counters() {
        let text = rendered(|| {
            increment_auth_failure("expired");
            increment_authz_denial();
            increment_panics();
        });

        assert_eq!(
            sample(&text, GATEWAY_AUTH_FAILURES_TOTAL, &[r#"reason="expired""#]),
            Some(1.0)
        );
        assert_eq!(sample(&text, GATEWAY_AUTHZ_DENIALS_TOTAL, &[]), Some(1.0));
        assert_eq!(sample(&text, GATEWAY_PANICS_TOTAL, &[]), Some(1.0));
    }
}
