//! The three-stage ingress chain for proxied traffic: rate limit, then
//! (for write methods) anti-bot validation, then forward to the matched
//! rule's upstream. Mirrors the teacher's single `rate_limit_middleware`
//! shape but as a fallback handler rather than a `tower::Layer`, since the
//! target host is itself data the rule match produces.

use crate::metrics::GatewayMetrics;
use crate::proxy::Proxy;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use gateway_analytics::{DecisionLogWriter, PendingCounters};
use gateway_antibot::{AntibotValidator, WriteRequest};
use gateway_limiter::{FilterOutcome, RateLimitFilter, RequestParts, RuleCache};
use gateway_state::GatewayStore;
use gateway_types::decision::{Decision, DecisionLogEntry};
use gateway_types::rule::Rule;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

#[derive(Clone)]
pub struct DataPlaneState {
	pub store: GatewayStore,
	pub rule_cache: Arc<RuleCache>,
	pub filter: Arc<RateLimitFilter>,
	pub antibot: Arc<AntibotValidator>,
	pub proxy: Proxy,
	pub counters: Arc<PendingCounters>,
	pub decision_log: Arc<DecisionLogWriter>,
	pub metrics: Arc<GatewayMetrics>,
}

fn now_secs() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
	let mut out = HashMap::new();
	let Some(raw) = headers.get(axum::http::header::COOKIE).and_then(|v| v.to_str().ok()) else {
		return out;
	};
	for pair in raw.split(';') {
		if let Some((name, value)) = pair.trim().split_once('=') {
			out.insert(name.to_owned(), value.to_owned());
		}
	}
	out
}

fn is_write_method(method: &Method) -> bool {
	matches!(method, &Method::POST | &Method::PUT | &Method::PATCH)
}

/// Catch-all handler for every request that isn't one of the gateway's own
/// public endpoints (token issuance, health). Looks up the matching rules,
/// enforces them, validates write requests, and forwards what survives.
pub async fn handle(State(state): State<DataPlaneState>, ConnectInfo(addr): ConnectInfo<SocketAddr>, request: Request) -> Response {
	let method = request.method().clone();
	let uri = request.uri().clone();
	let headers = request.headers().clone();
	let host = headers.get(axum::http::header::HOST).and_then(|v| v.to_str().ok()).unwrap_or("").to_owned();
	let client_ip = addr.ip().to_string();

	if uri.path().starts_with(gateway_admin::ADMIN_BASE_PATH) {
		return StatusCode::NOT_FOUND.into_response();
	}

	let body = match crate::body_capture::capture(request.into_body()).await {
		Ok(bytes) => bytes,
		Err(status) => return status.into_response(),
	};

	let snapshot = state.rule_cache.snapshot().await;
	let matched = RuleCache::evaluate(&snapshot[..], uri.path(), method.as_str(), &host);
	if matched.is_empty() {
		// No rule governs this path: rate limiting is a no-op, but with
		// nothing to proxy to either, there is nothing further to do.
		return StatusCode::NOT_FOUND.into_response();
	}

	let cookies = parse_cookies(&headers);
	let content_type = headers.get(axum::http::header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
	let req_parts = RequestParts {
		headers: &headers,
		cookies: &cookies,
		body: &body,
		body_content_type: content_type,
		client_ip: &client_ip,
	};

	let now = now_secs();
	let matched_ids: Vec<String> = matched.iter().map(|r| r.id.clone()).collect();

	let outcome = match state.filter.evaluate(&matched, &req_parts, now).await {
		Ok(outcome) => outcome,
		Err(e) => {
			warn!(error = %e, "rate limit evaluation failed");
			return StatusCode::BAD_GATEWAY.into_response();
		}
	};

	let (decision, delay_ms, queue_full) = match outcome {
		FilterOutcome::Blocked { queue_full } => (Decision::Blocked, 0, queue_full),
		FilterOutcome::Allowed { delay_ms } if delay_ms > 0 => (Decision::Queued, delay_ms, false),
		FilterOutcome::Allowed { .. } => (Decision::Allowed, 0, false),
	};

	if decision == Decision::Blocked {
		state.counters.record_blocked();
		state.metrics.blocked_total.inc();
		log_decision(&state, &method, &uri, &host, &client_ip, &req_parts, &matched, decision, StatusCode::TOO_MANY_REQUESTS.as_u16(), 0, &matched_ids).await;
		let mut response = StatusCode::TOO_MANY_REQUESTS.into_response();
		if queue_full {
			if let Ok(value) = "true".parse() {
				response.headers_mut().insert("X-RateLimit-Queued", value);
			}
		}
		return response;
	}

	if delay_ms > 0 {
		state.metrics.queued_total.inc();
		tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
	}

	if is_write_method(&method) {
		let config = state.store.load_config().await.unwrap_or_default();
		if config.antibot_enabled() {
			let write_req = WriteRequest { headers: &headers, cookies: &cookies };
			if let Err(rejection) = state.antibot.validate(&write_req, &config, now) {
				state.counters.record_blocked();
				state.metrics.antibot_rejected_total.inc();
				log_decision(&state, &method, &uri, &host, &client_ip, &req_parts, &matched, Decision::RejectedByAntibot, rejection.status().as_u16(), delay_ms, &matched_ids).await;
				return rejection.into_response();
			}
		}
	}

	let target = target_uri(&matched);
	let mut response = state.proxy.forward(target, &method, &uri, &headers, body).await;
	if delay_ms > 0 {
		if let Ok(value) = "true".parse() {
			response.headers_mut().insert("X-RateLimit-Queued", value);
		}
		if let Ok(value) = delay_ms.to_string().parse() {
			response.headers_mut().insert("X-RateLimit-Delay-Ms", value);
		}
	}

	state.counters.record_allowed();
	state.metrics.allowed_total.inc();
	log_decision(&state, &method, &uri, &host, &client_ip, &req_parts, &matched, decision, response.status().as_u16(), delay_ms, &matched_ids).await;
	response
}

fn target_uri<'a>(matched: &[&'a Rule]) -> &'a str {
	matched.first().map_or("", |r| r.target_uri.as_str())
}

async fn log_decision(
	state: &DataPlaneState,
	method: &Method,
	uri: &Uri,
	host: &str,
	client_ip: &str,
	req_parts: &RequestParts<'_>,
	matched: &[&Rule],
	decision: Decision,
	status_code: u16,
	delay_ms: u64,
	matched_ids: &[String],
) {
	// The governing rule is the same one `target_uri` proxies to: the
	// highest-priority specific match, or the sole global match.
	let identifier = matched.first().map_or_else(|| req_parts.client_ip.to_owned(), |rule| gateway_limiter::resolve_identifier(&rule.identifier_source, req_parts));
	let config = state.store.load_config().await.unwrap_or_default();
	let entry = DecisionLogEntry {
		timestamp_secs: now_secs(),
		method: method.as_str().to_owned(),
		path: uri.path().to_owned(),
		host: host.to_owned(),
		client_addr: client_ip.to_owned(),
		identifier,
		decision,
		status_code,
		delay_ms,
		matched_rule_ids: matched_ids.to_vec(),
	};
	state.decision_log.record(&entry, config.traffic_logs_max_entries()).await;
}
