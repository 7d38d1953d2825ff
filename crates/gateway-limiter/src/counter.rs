//! Token-bucket-by-window accounting: one counter per (rule, identifier),
//! reset when its window has elapsed, rejecting once the quota is spent.

use gateway_state::GatewayStore;
use gateway_types::counter::Counter;
use gateway_types::rule::Rule;
use tracing::warn;

/// Outcome of checking a single rule's quota for one identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterOutcome {
	Allowed,
	Blocked,
}

pub struct CounterAccountant<'a> {
	store: &'a GatewayStore,
}

impl<'a> CounterAccountant<'a> {
	#[must_use]
	pub fn new(store: &'a GatewayStore) -> Self {
		Self { store }
	}

	/// Reads, resets-if-expired, checks, and increments the counter for
	/// `rule`/`identifier` at `now_secs`. The read-modify-write is not
	/// atomic: two concurrent requests can both read the same count and
	/// both increment, so the enforced quota can overshoot by the number
	/// of requests racing inside one round trip. This is an accepted,
	/// documented property, not a bug.
	///
	/// # Errors
	/// Propagates a store failure; callers should treat it as transient
	/// and typically fail open or closed per their own policy.
	pub async fn check_and_increment(&self, rule: &Rule, identifier: &str, now_secs: u64) -> Result<CounterOutcome, gateway_state::StoreError> {
		let existing = self.store.get_counter(&rule.id, identifier).await?;

		let outcome = match existing {
			None => {
				let fresh = Counter::fresh(now_secs);
				self.store.set_counter(&rule.id, identifier, fresh, rule.window_seconds).await?;
				CounterOutcome::Allowed
			}
			Some(counter) if counter.window_expired(now_secs, rule.window_seconds) => {
				let fresh = Counter::fresh(now_secs);
				self.store.set_counter(&rule.id, identifier, fresh, rule.window_seconds).await?;
				CounterOutcome::Allowed
			}
			Some(mut counter) if counter.count < rule.allowed_requests => {
				counter.count += 1;
				self.store.set_counter(&rule.id, identifier, counter, rule.window_seconds).await?;
				CounterOutcome::Allowed
			}
			Some(counter) => {
				warn!(rule_id = %rule.id, %identifier, count = counter.count, limit = rule.allowed_requests, "rate limit exceeded");
				CounterOutcome::Blocked
			}
		};

		Ok(outcome)
	}
}

#[cfg(test)]
mod tests {
	use gateway_types::counter::Counter;

	#[test]
	fn fresh_counter_starts_at_one() {
		let counter = Counter::fresh(1_000);
		assert_eq!(counter.count, 1);
		assert_eq!(counter.window_start_secs, 1_000);
	}

	#[test]
	fn window_expires_after_configured_seconds() {
		let counter = Counter::fresh(1_000);
		assert!(!counter.window_expired(1_030, 60));
		assert!(counter.window_expired(1_061, 60));
	}
}
