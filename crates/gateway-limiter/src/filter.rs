//! Orchestrates the rule cache, identifier resolver, counter accountant and
//! queue accountant into the single decision the ingress filter chain acts
//! on for one request.

use crate::counter::{CounterAccountant, CounterOutcome};
use crate::identifier::{self, RequestParts};
use crate::queue::{QueueAccountant, QueueOutcome};
use crate::rule_cache::RuleCache;
use gateway_state::{GatewayStore, StoreError};
use gateway_types::rule::Rule;

/// Final verdict for a request, after aggregating every matched rule.
/// The most restrictive rule governs: any block wins outright; otherwise
/// the largest queued delay applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOutcome {
	Allowed { delay_ms: u64 },
	/// `queue_full` distinguishes a full queue from outright quota exhaustion
	/// with queueing disabled, for the `X-RateLimit-Queued` response header.
	Blocked { queue_full: bool },
}

pub struct RateLimitFilter {
	store: GatewayStore,
	queue: QueueAccountant,
}

impl RateLimitFilter {
	#[must_use]
	pub fn new(store: GatewayStore) -> Self {
		Self { store, queue: QueueAccountant::new() }
	}

	#[must_use]
	pub fn queue_accountant(&self) -> &QueueAccountant {
		&self.queue
	}

	/// Evaluates every rule from `matched` (already ordered specific-then-
	/// global by the rule cache) against `req` and folds them into one
	/// outcome.
	///
	/// # Errors
	/// Propagates a shared-state failure from the counter accountant.
	pub async fn evaluate(&self, matched: &[&Rule], req: &RequestParts<'_>, now_secs: u64) -> Result<FilterOutcome, StoreError> {
		let counters = CounterAccountant::new(&self.store);
		let mut max_delay_ms = 0u64;

		for rule in matched {
			let identifier = identifier::resolve(&rule.identifier_source, req);

			match counters.check_and_increment(rule, &identifier, now_secs).await? {
				CounterOutcome::Allowed => {}
				CounterOutcome::Blocked => {
					if !rule.queue.enabled {
						return Ok(FilterOutcome::Blocked { queue_full: false });
					}
					match self.queue.admit(&rule.id, &identifier, &rule.queue) {
						QueueOutcome::Admitted { delay_ms, .. } => max_delay_ms = max_delay_ms.max(delay_ms),
						QueueOutcome::Full => return Ok(FilterOutcome::Blocked { queue_full: true }),
					}
				}
			}
		}

		Ok(FilterOutcome::Allowed { delay_ms: max_delay_ms })
	}

	#[must_use]
	pub fn rule_cache_for(store: GatewayStore) -> RuleCache {
		RuleCache::new(store)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::http::HeaderMap;
	use gateway_state::StoreConfig;
	use gateway_types::rule::{IdentifierSource, QueueConfig};
	use std::collections::HashMap;

	fn rule(id: &str, allowed: u32, window: u64, queue: QueueConfig) -> Rule {
		Rule {
			id: id.into(),
			path_pattern: "/api/**".into(),
			methods: vec![],
			hosts: vec![],
			priority: 1,
			active: true,
			target_uri: "http://upstream.local".into(),
			allowed_requests: allowed,
			window_seconds: window,
			queue,
			identifier_source: IdentifierSource::Ip,
			body_limit: gateway_types::rule::BodyLimitConfig::default(),
		}
	}

	fn req<'a>(headers: &'a HeaderMap, cookies: &'a HashMap<String, String>) -> RequestParts<'a> {
		RequestParts {
			headers,
			cookies,
			body: b"",
			body_content_type: None,
			client_ip: "198.51.100.7",
		}
	}

	#[tokio::test]
	async fn token_bucket_blocks_once_quota_is_spent() {
		let store = GatewayStore::new(StoreConfig::default()).expect("redis client builds");
		let filter = RateLimitFilter::new(store);
		let headers = HeaderMap::new();
		let cookies = HashMap::new();
		let parts = req(&headers, &cookies);
		let r = rule("filter-test-tb", 2, 60, QueueConfig { enabled: false, ..Default::default() });
		let matched = [&r];

		let first = filter.evaluate(&matched, &parts, 10_000).await.unwrap();
		let second = filter.evaluate(&matched, &parts, 10_000).await.unwrap();
		let third = filter.evaluate(&matched, &parts, 10_000).await.unwrap();

		assert_eq!(first, FilterOutcome::Allowed { delay_ms: 0 });
		assert_eq!(second, FilterOutcome::Allowed { delay_ms: 0 });
		assert_eq!(third, FilterOutcome::Blocked { queue_full: false });
	}

	#[tokio::test]
	async fn leaky_bucket_queues_overflow_with_increasing_delay() {
		let store = GatewayStore::new(StoreConfig::default()).expect("redis client builds");
		let filter = RateLimitFilter::new(store);
		let headers = HeaderMap::new();
		let cookies = HashMap::new();
		let parts = req(&headers, &cookies);
		let queue = QueueConfig { enabled: true, max_queue_size: 1, delay_per_request_ms: 1000 };
		let r = rule("filter-test-lb", 1, 60, queue);
		let matched = [&r];

		let first = filter.evaluate(&matched, &parts, 20_000).await.unwrap();
		let second = filter.evaluate(&matched, &parts, 20_000).await.unwrap();
		let third = filter.evaluate(&matched, &parts, 20_000).await.unwrap();

		assert_eq!(first, FilterOutcome::Allowed { delay_ms: 0 });
		assert_eq!(second, FilterOutcome::Allowed { delay_ms: 1000 });
		assert_eq!(third, FilterOutcome::Blocked { queue_full: true });
	}

	#[test]
	fn filter_outcome_distinguishes_queue_full_from_plain_block() {
		let blocked_no_queue = FilterOutcome::Blocked { queue_full: false };
		let blocked_queue_full = FilterOutcome::Blocked { queue_full: true };
		assert_ne!(blocked_no_queue, blocked_queue_full);
	}
}
