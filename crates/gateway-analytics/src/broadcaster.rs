//! Push channel for admin WebSocket subscribers: one `mpsc::Sender` per
//! live connection, registered in a `DashMap` the way
//! `ws-connection::core::store::ConnectionStore` registers actor handles.

use crate::summary::{BroadcastMessage, Summary};
use dashmap::DashMap;
use gateway_state::GatewayStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub type ConnectionId = u64;

/// Counts live subscribers for the `/metrics` gauge.
#[derive(Default)]
pub struct SubscriberGauge(AtomicU64);

impl SubscriberGauge {
	#[must_use]
	pub fn get(&self) -> u64 {
		self.0.load(Ordering::Relaxed)
	}
}

pub struct Broadcaster {
	store: GatewayStore,
	sinks: DashMap<ConnectionId, mpsc::Sender<BroadcastMessage>>,
	next_id: AtomicU64,
	gauge: SubscriberGauge,
}

impl Broadcaster {
	#[must_use]
	pub fn new(store: GatewayStore) -> Self {
		Self {
			store,
			sinks: DashMap::new(),
			next_id: AtomicU64::new(1),
			gauge: SubscriberGauge::default(),
		}
	}

	#[must_use]
	pub fn subscriber_gauge(&self) -> &SubscriberGauge {
		&self.gauge
	}

	/// Registers a new subscriber and immediately emits a snapshot message
	/// on its channel, distinguishing the initial fill from later updates.
	pub async fn subscribe(&self, active_rule_count: usize, capacity: usize) -> (ConnectionId, mpsc::Receiver<BroadcastMessage>) {
		let (tx, rx) = mpsc::channel(capacity);
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);

		let summary = self.current_summary(active_rule_count).await;
		let _ = tx.send(BroadcastMessage::Snapshot { summary }).await;

		self.sinks.insert(id, tx);
		self.gauge.0.fetch_add(1, Ordering::Relaxed);
		(id, rx)
	}

	pub fn unsubscribe(&self, id: ConnectionId) {
		if self.sinks.remove(&id).is_some() {
			self.gauge.0.fetch_sub(1, Ordering::Relaxed);
		}
	}

	async fn current_summary(&self, active_rule_count: usize) -> Summary {
		let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs();
		let now_minute = i64::try_from(now / 60).unwrap_or(i64::MAX);
		let day_ago_minute = now_minute - 24 * 60;

		let buckets = match self.store.minute_buckets_in_range(day_ago_minute, now_minute).await {
			Ok(buckets) => buckets,
			Err(e) => {
				warn!(error = %e, "failed to read minute buckets for summary");
				Vec::new()
			}
		};

		let (allowed, blocked) = buckets.iter().fold((0u64, 0u64), |(a, b), (_, allowed, blocked)| (a + allowed, b + blocked));
		Summary { allowed, blocked, active_rule_count }
	}

	/// Publishes the current summary to every live sink, dropping sinks
	/// whose receiver has gone away.
	async fn publish_once(&self, active_rule_count: usize) {
		let summary = self.current_summary(active_rule_count).await;
		let message = BroadcastMessage::Summary { summary };

		let dead: Vec<ConnectionId> = self
			.sinks
			.iter()
			.filter_map(|entry| match entry.value().try_send(message.clone()) {
				Ok(()) => None,
				Err(_) => Some(*entry.key()),
			})
			.collect();

		for id in dead {
			self.unsubscribe(id);
		}
	}

	/// Runs until `cancel` fires, publishing on a fixed tick.
	pub async fn run(&self, tick: Duration, active_rule_count: impl Fn() -> usize, cancel: CancellationToken) {
		let mut interval = tokio::time::interval(tick);
		loop {
			tokio::select! {
				() = cancel.cancelled() => return,
				_ = interval.tick() => self.publish_once(active_rule_count()).await,
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use gateway_state::StoreConfig;

	#[tokio::test]
	async fn subscribing_registers_a_sink_and_emits_a_snapshot() {
		let store = GatewayStore::new(StoreConfig::default()).expect("redis client builds");
		let broadcaster = Broadcaster::new(store);

		let (id, mut rx) = broadcaster.subscribe(3, 4).await;
		assert_eq!(broadcaster.subscriber_gauge().get(), 1);

		let message = rx.recv().await.expect("snapshot is sent immediately");
		assert!(matches!(message, BroadcastMessage::Snapshot { .. }));

		broadcaster.unsubscribe(id);
		assert_eq!(broadcaster.subscriber_gauge().get(), 0);
	}
}
