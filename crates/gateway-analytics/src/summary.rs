//! Payload types pushed to admin WebSocket subscribers and returned by the
//! analytics read endpoints.

use serde::{Deserialize, Serialize};

/// 24-hour totals plus the currently active rule count, the payload
/// published on every broadcaster tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Summary {
	pub allowed: u64,
	pub blocked: u64,
	pub active_rule_count: usize,
}

/// One minute bucket, as returned by the timeseries read endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeseriesPoint {
	pub minute: i64,
	pub allowed: u64,
	pub blocked: u64,
}

/// A broadcaster message: the first message after a subscriber connects is
/// tagged `snapshot`, distinguishing the initial fill from the steady
/// stream of `summary` messages that follow at the publish cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastMessage {
	Snapshot {
		#[serde(rename = "payload")]
		summary: Summary,
	},
	Summary {
		#[serde(rename = "payload")]
		summary: Summary,
	},
}
