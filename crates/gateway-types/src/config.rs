use std::collections::HashMap;

/// Recognized runtime-mutable configuration keys. Unknown
/// keys are still accepted and stored verbatim, so operators can stage a
/// key before this binary is upgraded to read it.
pub mod keys {
	pub const ANTIBOT_ENABLED: &str = "antibot-enabled";
	pub const ANTIBOT_MIN_SUBMIT_TIME: &str = "antibot-min-submit-time";
	pub const ANTIBOT_HONEYPOT_FIELD: &str = "antibot-honeypot-field";
	pub const ANTIBOT_CHALLENGE_TYPE: &str = "antibot-challenge-type";
	pub const ANTIBOT_METAREFRESH_DELAY: &str = "antibot-metarefresh-delay";
	pub const ANTIBOT_PREACT_DIFFICULTY: &str = "antibot-preact-difficulty";
	pub const ANALYTICS_RETENTION_DAYS: &str = "analytics-retention-days";
	pub const TRAFFIC_LOGS_RETENTION_HOURS: &str = "traffic-logs-retention-hours";
	pub const TRAFFIC_LOGS_MAX_ENTRIES: &str = "traffic-logs-max-entries";
}

/// Flat string-to-string settings persisted under the `system_config` key.
/// Accessors apply the documented defaults and clamps; callers never need
/// to know whether a key was actually present in the store.
#[derive(Debug, Clone, Default)]
pub struct SystemConfig {
	values: HashMap<String, String>,
}

impl SystemConfig {
	#[must_use]
	pub fn from_map(values: HashMap<String, String>) -> Self {
		Self { values }
	}

	#[must_use]
	pub fn raw(&self) -> &HashMap<String, String> {
		&self.values
	}

	pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
		self.values.insert(key.into(), value.into());
	}

	fn get_bool(&self, key: &str, default: bool) -> bool {
		self.values.get(key).map_or(default, |v| v == "true")
	}

	fn get_u64(&self, key: &str, default: u64, min: u64, max: u64) -> u64 {
		self.values.get(key).and_then(|v| v.parse::<u64>().ok()).unwrap_or(default).clamp(min, max)
	}

	#[must_use]
	pub fn antibot_enabled(&self) -> bool {
		self.get_bool(keys::ANTIBOT_ENABLED, true)
	}

	#[must_use]
	pub fn antibot_min_submit_time_ms(&self) -> u64 {
		self.get_u64(keys::ANTIBOT_MIN_SUBMIT_TIME, 2000, 0, u64::MAX)
	}

	#[must_use]
	pub fn antibot_honeypot_field(&self) -> String {
		self.values.get(keys::ANTIBOT_HONEYPOT_FIELD).cloned().unwrap_or_else(|| "_hp_email".to_owned())
	}

	#[must_use]
	pub fn antibot_challenge_type(&self) -> String {
		self.values.get(keys::ANTIBOT_CHALLENGE_TYPE).cloned().unwrap_or_else(|| "metarefresh".to_owned())
	}

	#[must_use]
	pub fn antibot_metarefresh_delay_secs(&self) -> u64 {
		self.get_u64(keys::ANTIBOT_METAREFRESH_DELAY, 3, 0, u64::MAX)
	}

	#[must_use]
	pub fn antibot_preact_difficulty_secs(&self) -> u64 {
		self.get_u64(keys::ANTIBOT_PREACT_DIFFICULTY, 1, 0, u64::MAX)
	}

	#[must_use]
	pub fn analytics_retention_days(&self) -> u64 {
		self.get_u64(keys::ANALYTICS_RETENTION_DAYS, 7, 1, 90)
	}

	#[must_use]
	pub fn traffic_logs_retention_hours(&self) -> u64 {
		self.get_u64(keys::TRAFFIC_LOGS_RETENTION_HOURS, 24, 1, 168)
	}

	#[must_use]
	pub fn traffic_logs_max_entries(&self) -> u64 {
		self.get_u64(keys::TRAFFIC_LOGS_MAX_ENTRIES, 10_000, 1_000, 100_000)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_apply_when_unset() {
		let cfg = SystemConfig::default();
		assert!(cfg.antibot_enabled());
		assert_eq!(cfg.antibot_min_submit_time_ms(), 2000);
		assert_eq!(cfg.analytics_retention_days(), 7);
	}

	#[test]
	fn clamps_out_of_range_values() {
		let mut cfg = SystemConfig::default();
		cfg.set(keys::ANALYTICS_RETENTION_DAYS, "9999");
		assert_eq!(cfg.analytics_retention_days(), 90);
		cfg.set(keys::TRAFFIC_LOGS_MAX_ENTRIES, "1");
		assert_eq!(cfg.traffic_logs_max_entries(), 1_000);
	}

	#[test]
	fn overridden_values_take_effect() {
		let mut cfg = SystemConfig::default();
		cfg.set(keys::ANTIBOT_ENABLED, "false");
		assert!(!cfg.antibot_enabled());
	}
}
