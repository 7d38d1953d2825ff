//! Ordered snapshot of active rules. The snapshot is
//! replaced wholesale on refresh; request handlers hold a cloned `Arc` for
//! the duration of a request rather than locking per-field.

use crate::error::LimiterError;
use gateway_state::GatewayStore;
use gateway_types::rule::Rule;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

pub struct RuleCache {
	store: GatewayStore,
	snapshot: RwLock<Arc<Vec<Rule>>>,
}

impl RuleCache {
	#[must_use]
	pub fn new(store: GatewayStore) -> Self {
		Self {
			store,
			snapshot: RwLock::new(Arc::new(Vec::new())),
		}
	}

	/// Reloads the snapshot from the store, keeping only active rules and
	/// sorting by priority (lower = earlier) for stable evaluation order.
	///
	/// # Errors
	/// Propagates a store failure; callers on a background refresh loop
	/// should log and keep the previous snapshot rather than panic.
	pub async fn refresh(&self) -> Result<usize, LimiterError> {
		let mut rules = self.store.load_rules().await?;
		rules.retain(|r| r.active);
		rules.sort_by_key(|r| r.priority);
		let count = rules.len();
		*self.snapshot.write().await = Arc::new(rules);
		info!(rule_count = count, "rule cache refreshed");
		Ok(count)
	}

	#[must_use]
	pub async fn snapshot(&self) -> Arc<Vec<Rule>> {
		self.snapshot.read().await.clone()
	}

	/// Non-async rule count for callers (e.g. the broadcast loop) that only
	/// need a point-in-time size and can't await a lock. Falls back to 0 if
	/// a refresh is mid-swap.
	#[must_use]
	pub fn len(&self) -> usize {
		self.snapshot.try_read().map(|g| g.len()).unwrap_or(0)
	}

	/// Selects the rules that govern a request, in evaluation order:
	/// specific (non-global) matches first by priority, then global (`/**`)
	/// matches by priority.
	#[must_use]
	pub fn evaluate<'a>(rules: &'a [Rule], path: &str, method: &str, host: &str) -> Vec<&'a Rule> {
		let matching: Vec<&Rule> = rules.iter().filter(|r| r.pattern().matches(path) && r.matches_method(method) && r.matches_host(host)).collect();

		let (mut specific, global): (Vec<&Rule>, Vec<&Rule>) = matching.into_iter().partition(|r| !r.is_global());
		specific.extend(global);
		specific
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use gateway_types::rule::{IdentifierSource, QueueConfig};

	fn rule(id: &str, pattern: &str, priority: i32) -> Rule {
		Rule {
			id: id.into(),
			path_pattern: pattern.into(),
			methods: vec![],
			hosts: vec![],
			priority,
			active: true,
			target_uri: "http://upstream.local".into(),
			allowed_requests: 10,
			window_seconds: 60,
			queue: QueueConfig::default(),
			identifier_source: IdentifierSource::Ip,
			body_limit: gateway_types::rule::BodyLimitConfig::default(),
		}
	}

	#[test]
	fn specific_rules_precede_global_rules() {
		let rules = vec![rule("global", "/**", 1), rule("specific", "/api/**", 100)];
		let evaluated = RuleCache::evaluate(&rules, "/api/hello", "GET", "example.com");
		let ids: Vec<&str> = evaluated.iter().map(|r| r.id.as_str()).collect();
		assert_eq!(ids, vec!["specific", "global"]);
	}

	#[test]
	fn non_matching_rules_are_excluded() {
		let rules = vec![rule("other", "/admin/**", 1)];
		let evaluated = RuleCache::evaluate(&rules, "/api/hello", "GET", "example.com");
		assert!(evaluated.is_empty());
	}
}
