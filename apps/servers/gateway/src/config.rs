use clap::Parser;
use std::time::Duration;

fn parse_duration_secs(s: &str) -> Result<Duration, std::num::ParseIntError> {
	Ok(Duration::from_secs(s.parse()?))
}

/// Process-level settings, layered on top of the runtime-mutable
/// `SystemConfig` that lives in the shared store.
#[derive(Parser, Debug, Clone)]
#[command(name = "gateway", version, about = "API gateway data plane and admin surface")]
pub struct GatewayConfig {
	#[arg(long, env = "GATEWAY_PUBLIC_ADDR", default_value = "0.0.0.0:8080")]
	pub public_addr: String,

	#[arg(long, env = "GATEWAY_ADMIN_ADDR", default_value = "127.0.0.1:8081")]
	pub admin_addr: String,

	#[arg(long, env = "GATEWAY_REDIS_URL", default_value = "redis://127.0.0.1/")]
	pub redis_url: String,

	#[arg(long, env = "GATEWAY_RULE_REFRESH_SECS", default_value = "30", value_parser = parse_duration_secs)]
	pub rule_refresh_interval: Duration,

	#[arg(long, env = "GATEWAY_AGGREGATOR_TICK_SECS", default_value = "5", value_parser = parse_duration_secs)]
	pub aggregator_tick: Duration,

	#[arg(long, env = "GATEWAY_BROADCAST_TICK_SECS", default_value = "2", value_parser = parse_duration_secs)]
	pub broadcast_tick: Duration,

	#[arg(long, env = "GATEWAY_QUEUE_SWEEP_INTERVAL_SECS", default_value = "10", value_parser = parse_duration_secs)]
	pub queue_sweep_interval: Duration,

	#[arg(long, env = "GATEWAY_LOG_JSON")]
	pub log_json: bool,

	#[arg(long = "rust-log", env = "RUST_LOG", default_value = "info")]
	pub rust_log: String,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_documented_values() {
		let config = GatewayConfig::parse_from(["gateway"]);
		assert_eq!(config.public_addr, "0.0.0.0:8080");
		assert_eq!(config.admin_addr, "127.0.0.1:8081");
		assert_eq!(config.rule_refresh_interval, Duration::from_secs(30));
		assert_eq!(config.aggregator_tick, Duration::from_secs(5));
		assert_eq!(config.broadcast_tick, Duration::from_secs(2));
		assert_eq!(config.queue_sweep_interval, Duration::from_secs(10));
		assert!(!config.log_json);
	}
}
