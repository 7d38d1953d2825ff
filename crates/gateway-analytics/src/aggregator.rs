//! Folds hot-path allowed/blocked counts into per-minute buckets on a fixed
//! tick, the way `task_queue`'s supervisor ticks its heartbeat loop.

use gateway_state::GatewayStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// In-process counters the data plane bumps on every terminal decision.
/// The aggregator is the sole reader that resets them to zero.
#[derive(Default)]
pub struct PendingCounters {
	allowed: AtomicU64,
	blocked: AtomicU64,
}

impl PendingCounters {
	pub fn record_allowed(&self) {
		self.allowed.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_blocked(&self) {
		self.blocked.fetch_add(1, Ordering::Relaxed);
	}

	fn take(&self) -> (u64, u64) {
		(self.allowed.swap(0, Ordering::Relaxed), self.blocked.swap(0, Ordering::Relaxed))
	}
}

pub struct Aggregator {
	store: GatewayStore,
	counters: std::sync::Arc<PendingCounters>,
	tick: Duration,
}

impl Aggregator {
	#[must_use]
	pub fn new(store: GatewayStore, counters: std::sync::Arc<PendingCounters>, tick: Duration) -> Self {
		Self { store, counters, tick }
	}

	/// Runs until `cancel` fires, flushing pending counts into the current
	/// minute bucket and pruning stale buckets on every tick.
	pub async fn run(&self, retention: Duration, cancel: CancellationToken) {
		let mut interval = tokio::time::interval(self.tick);
		loop {
			tokio::select! {
				() = cancel.cancelled() => return,
				_ = interval.tick() => self.flush_once(retention).await,
			}
		}
	}

	async fn flush_once(&self, retention: Duration) {
		let (allowed, blocked) = self.counters.take();
		let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
		let minute = i64::try_from(now.as_secs() / 60).unwrap_or(i64::MAX);

		if allowed != 0 || blocked != 0 {
			let allowed = i64::try_from(allowed).unwrap_or(i64::MAX);
			let blocked = i64::try_from(blocked).unwrap_or(i64::MAX);
			if let Err(e) = self.store.bump_minute_bucket(minute, allowed, blocked, retention).await {
				warn!(error = %e, "failed to flush minute bucket");
			}
		}

		let retention_minutes = i64::try_from(retention.as_secs() / 60).unwrap_or(i64::MAX);
		let cutoff = minute - retention_minutes;
		if let Err(e) = self.store.prune_minute_buckets(cutoff).await {
			warn!(error = %e, "failed to prune stale minute buckets");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn taking_pending_counts_resets_them_to_zero() {
		let counters = PendingCounters::default();
		counters.record_allowed();
		counters.record_allowed();
		counters.record_blocked();

		let (allowed, blocked) = counters.take();
		assert_eq!(allowed, 2);
		assert_eq!(blocked, 1);
		assert_eq!(counters.take(), (0, 0));
	}
}
