use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
	Allowed,
	Queued,
	Blocked,
	RejectedByAntibot,
}

/// One entry of the bounded traffic log (`traffic_logs` list in the store).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionLogEntry {
	pub timestamp_secs: u64,
	pub method: String,
	pub path: String,
	pub host: String,
	pub client_addr: String,
	pub identifier: String,
	pub decision: Decision,
	pub status_code: u16,
	pub delay_ms: u64,
	pub matched_rule_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_through_json() {
		let entry = DecisionLogEntry {
			timestamp_secs: 1,
			method: "GET".into(),
			path: "/api/hello".into(),
			host: "example.com".into(),
			client_addr: "127.0.0.1".into(),
			identifier: "127.0.0.1".into(),
			decision: Decision::Allowed,
			status_code: 200,
			delay_ms: 0,
			matched_rule_ids: vec!["r1".into()],
		};
		let json = serde_json::to_string(&entry).unwrap();
		let back: DecisionLogEntry = serde_json::from_str(&json).unwrap();
		assert_eq!(back.path, entry.path);
		assert_eq!(back.decision, Decision::Allowed);
	}
}
