use serde::{Deserialize, Serialize};

/// A rate-limit counter for one (rule, identifier) pair, as stored under
/// `request_counter:<rule>:<id>` in the shared state store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Counter {
	pub count: u32,
	pub window_start_secs: u64,
}

impl Counter {
	#[must_use]
	pub fn fresh(now_secs: u64) -> Self {
		Self { count: 1, window_start_secs: now_secs }
	}

	#[must_use]
	pub fn window_expired(&self, now_secs: u64, window_seconds: u64) -> bool {
		now_secs > self.window_start_secs.saturating_add(window_seconds)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn window_expires_after_configured_seconds() {
		let c = Counter { count: 3, window_start_secs: 100 };
		assert!(!c.window_expired(110, 60));
		assert!(c.window_expired(161, 60));
	}
}
