use clap::Parser;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Parser, Clone, Debug, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
pub struct StoreConfig {
	#[arg(long, env = "GATEWAY_STATE_URL", default_value = "redis://127.0.0.1:6379", help = "Connection string for the shared state store")]
	pub redis_url: String,

	#[arg(long, env = "STORE_MAX_RETRIES", default_value = "3", help = "Maximum number of retry attempts for a transient store failure")]
	pub max_retries: u32,

	#[arg(
        long,
        env = "STORE_RETRY_DELAY_MS",
        default_value = "50",
        value_parser = parse_duration_ms,
        help = "Base delay between retry attempts, doubled per attempt"
    )]
	pub retry_delay: Duration,

	#[arg(long, env = "COUNTER_TTL_SLACK_SECS", default_value = "5", help = "TTL slack added on top of a rule's window_seconds when storing a counter")]
	pub counter_ttl_slack_secs: u64,
}

impl StoreConfig {
	pub fn new() -> Self {
		Self::parse()
	}
}

impl Default for StoreConfig {
	fn default() -> Self {
		Self {
			redis_url: "redis://127.0.0.1:6379".to_owned(),
			max_retries: 3,
			retry_delay: Duration::from_millis(50),
			counter_ttl_slack_secs: 5,
		}
	}
}

fn parse_duration_ms(s: &str) -> Result<Duration, std::num::ParseIntError> {
	s.parse::<u64>().map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_spec() {
		let config = StoreConfig::default();
		assert_eq!(config.max_retries, 3);
		assert_eq!(config.counter_ttl_slack_secs, 5);
	}

	#[test]
	fn parses_from_args() {
		let args = vec!["program", "--redis-url", "redis://cache:6380", "--max-retries", "5"];
		let config = StoreConfig::try_parse_from(args).unwrap();
		assert_eq!(config.redis_url, "redis://cache:6380");
		assert_eq!(config.max_retries, 5);
	}
}
