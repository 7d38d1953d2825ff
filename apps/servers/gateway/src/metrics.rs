//! Request-decision counters exported in Prometheus text format, the way
//! `task_queue`'s `WorkerPool` registers its own counters against a shared
//! `Registry` rather than a global default.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use gateway_analytics::Broadcaster;
use gateway_limiter::RateLimitFilter;
use prometheus::{Counter, Encoder, Gauge, Registry, TextEncoder};
use std::sync::Arc;

pub struct GatewayMetrics {
	registry: Registry,
	pub allowed_total: Counter,
	pub blocked_total: Counter,
	pub queued_total: Counter,
	pub antibot_rejected_total: Counter,
	queue_depth: Gauge,
	ws_subscribers: Gauge,
}

impl GatewayMetrics {
	/// # Panics
	/// Panics if a metric name collides on registration, which would only
	/// happen if this constructor were called twice against one registry.
	#[must_use]
	pub fn new() -> Self {
		let registry = Registry::new();
		let allowed_total = Counter::new("gateway_requests_allowed_total", "Requests allowed through the gateway").expect("valid metric descriptor");
		let blocked_total = Counter::new("gateway_requests_blocked_total", "Requests blocked by a rate limit rule").expect("valid metric descriptor");
		let queued_total = Counter::new("gateway_requests_queued_total", "Requests delayed through the leaky-bucket queue").expect("valid metric descriptor");
		let antibot_rejected_total = Counter::new("gateway_antibot_rejected_total", "Write requests rejected by anti-bot validation").expect("valid metric descriptor");
		let queue_depth = Gauge::new("gateway_queue_depth", "Current in-flight leaky-bucket queue depth across all rules").expect("valid metric descriptor");
		let ws_subscribers = Gauge::new("gateway_ws_subscribers", "Live admin WebSocket subscriber count").expect("valid metric descriptor");

		registry.register(Box::new(allowed_total.clone())).expect("unique metric name");
		registry.register(Box::new(blocked_total.clone())).expect("unique metric name");
		registry.register(Box::new(queued_total.clone())).expect("unique metric name");
		registry.register(Box::new(antibot_rejected_total.clone())).expect("unique metric name");
		registry.register(Box::new(queue_depth.clone())).expect("unique metric name");
		registry.register(Box::new(ws_subscribers.clone())).expect("unique metric name");

		Self {
			registry,
			allowed_total,
			blocked_total,
			queued_total,
			antibot_rejected_total,
			queue_depth,
			ws_subscribers,
		}
	}

	/// Refreshes the two sampled gauges from their live sources. Called on
	/// every scrape rather than kept in lockstep with the request path,
	/// since both sources are cheap `DashMap` reads.
	pub fn sample(&self, filter: &RateLimitFilter, broadcaster: &Broadcaster) {
		self.queue_depth.set(filter.queue_accountant().total_depth() as f64);
		self.ws_subscribers.set(broadcaster.subscriber_gauge().get() as f64);
	}
}

impl Default for GatewayMetrics {
	fn default() -> Self {
		Self::new()
	}
}

#[derive(Clone)]
pub struct MetricsState {
	pub metrics: Arc<GatewayMetrics>,
	pub filter: Arc<RateLimitFilter>,
	pub broadcaster: Arc<Broadcaster>,
}

pub async fn metrics_handler(State(state): State<MetricsState>) -> impl IntoResponse {
	state.metrics.sample(&state.filter, &state.broadcaster);
	let families = state.metrics.registry.gather();
	let mut buffer = Vec::new();
	if TextEncoder::new().encode(&families, &mut buffer).is_err() {
		return (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics".to_owned()).into_response();
	}
	let body = String::from_utf8(buffer).unwrap_or_default();
	(StatusCode::OK, [("Content-Type", "text/plain; version=0.0.4")], body).into_response()
}
