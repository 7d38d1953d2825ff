//! Local, per-node queue-depth accountant implementing the leaky-bucket
//! discipline: admissions beyond a rule's instantaneous quota are delayed
//! by `position * delayPerRequestMs` instead of rejected outright, up to
//! `maxQueueSize` in flight.

use dashmap::DashMap;
use gateway_types::rule::QueueConfig;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Outcome of requesting a queue slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOutcome {
	/// Admitted at `position`, to be delayed `delay_ms` before forwarding.
	Admitted { position: u32, delay_ms: u64 },
	/// `depth >= maxQueueSize` at the moment of admission.
	Full,
}

fn composite_key(rule_id: &str, identifier: &str) -> String {
	format!("{rule_id}:{identifier}")
}

/// Per-(rule, identifier) depth gauges, mirroring a per-client atomic-count
/// map guarded only by each entry's own CAS loop; no cross-entry lock.
#[derive(Default)]
pub struct QueueAccountant {
	depths: DashMap<String, Arc<AtomicU32>>,
}

impl QueueAccountant {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Attempts to admit one more request into the queue for `rule_id`/
	/// `identifier`. Abandoned (client-disconnected) admissions are never
	/// rolled back by design: the slot was already accounted for.
	#[must_use]
	pub fn admit(&self, rule_id: &str, identifier: &str, queue: &QueueConfig) -> QueueOutcome {
		let key = composite_key(rule_id, identifier);
		let gauge = self.depths.entry(key).or_insert_with(|| Arc::new(AtomicU32::new(0))).clone();

		loop {
			let current = gauge.load(Ordering::SeqCst);
			if current >= queue.max_queue_size {
				debug!(rule_id, identifier, depth = current, "queue full");
				return QueueOutcome::Full;
			}
			let next = current + 1;
			if gauge.compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
				let delay_ms = u64::from(next) * queue.delay_per_request_ms;
				self.schedule_release(&gauge, delay_ms);
				return QueueOutcome::Admitted { position: next, delay_ms };
			}
		}
	}

	fn schedule_release(&self, gauge: &Arc<AtomicU32>, delay_ms: u64) {
		let gauge = gauge.clone();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(delay_ms)).await;
			gauge.fetch_sub(1, Ordering::SeqCst);
		});
	}

	/// Removes gauges at zero depth that have had no recent activity,
	/// keeping the map from growing unbounded across distinct identifiers.
	/// Run periodically off the request path.
	pub fn sweep(&self) -> usize {
		let before = self.depths.len();
		self.depths.retain(|_, gauge| gauge.load(Ordering::SeqCst) != 0);
		before - self.depths.len()
	}

	/// Sum of every live gauge, for the `/metrics` queue-depth export.
	#[must_use]
	pub fn total_depth(&self) -> u64 {
		self.depths.iter().map(|entry| u64::from(entry.value().load(Ordering::SeqCst))).sum()
	}

	#[cfg(test)]
	fn depth(&self, rule_id: &str, identifier: &str) -> u32 {
		self.depths.get(&composite_key(rule_id, identifier)).map_or(0, |g| g.load(Ordering::SeqCst))
	}
}

/// Computes delay in a form suitable for `tokio::time::sleep`.
#[must_use]
pub fn delay_duration(delay_ms: u64) -> Duration {
	Duration::from_millis(delay_ms)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn queue_config(max: u32, delay_ms: u64) -> QueueConfig {
		QueueConfig {
			enabled: true,
			max_queue_size: max,
			delay_per_request_ms: delay_ms,
		}
	}

	#[tokio::test]
	async fn admissions_are_positioned_and_delayed_in_order() {
		let accountant = QueueAccountant::new();
		let cfg = queue_config(2, 1000);

		let first = accountant.admit("r1", "id1", &cfg);
		assert_eq!(first, QueueOutcome::Admitted { position: 1, delay_ms: 1000 });

		let second = accountant.admit("r1", "id1", &cfg);
		assert_eq!(second, QueueOutcome::Admitted { position: 2, delay_ms: 2000 });

		let third = accountant.admit("r1", "id1", &cfg);
		assert_eq!(third, QueueOutcome::Full);
	}

	#[tokio::test]
	async fn distinct_identifiers_have_independent_gauges() {
		let accountant = QueueAccountant::new();
		let cfg = queue_config(1, 500);

		assert_eq!(accountant.admit("r1", "a", &cfg), QueueOutcome::Admitted { position: 1, delay_ms: 500 });
		assert_eq!(accountant.admit("r1", "b", &cfg), QueueOutcome::Admitted { position: 1, delay_ms: 500 });
	}

	#[tokio::test]
	async fn depth_decrements_after_configured_delay_elapses() {
		let accountant = QueueAccountant::new();
		let cfg = queue_config(5, 10);
		accountant.admit("r1", "a", &cfg);
		assert_eq!(accountant.depth("r1", "a"), 1);
		tokio::time::sleep(Duration::from_millis(30)).await;
		assert_eq!(accountant.depth("r1", "a"), 0);
	}

	#[tokio::test]
	async fn sweep_removes_only_zero_depth_entries() {
		let accountant = QueueAccountant::new();
		let cfg = queue_config(5, 10);
		accountant.admit("r1", "a", &cfg);
		tokio::time::sleep(Duration::from_millis(30)).await;
		accountant.admit("r1", "b", &cfg);

		let removed = accountant.sweep();
		assert_eq!(removed, 1);
		assert_eq!(accountant.depth("r1", "b"), 1);
	}
}
