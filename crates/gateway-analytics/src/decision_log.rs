//! Best-effort decision log writer: never blocks or fails the request over
//! an analytics write, only logs at `warn`.

use gateway_state::GatewayStore;
use gateway_types::decision::DecisionLogEntry;
use tracing::warn;

pub struct DecisionLogWriter {
	store: GatewayStore,
}

impl DecisionLogWriter {
	#[must_use]
	pub fn new(store: GatewayStore) -> Self {
		Self { store }
	}

	pub async fn record(&self, entry: &DecisionLogEntry, max_entries: u64) {
		if let Err(e) = self.store.push_decision_log(entry, max_entries).await {
			warn!(error = %e, "failed to append decision log entry");
		}
	}
}
