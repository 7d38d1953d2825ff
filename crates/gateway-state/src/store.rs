//! Client for the shared in-memory key/value store. The store
//! itself is an external collaborator; this module only knows the key
//! layout and the handful of single-key atomic operations the gateway needs.

use crate::config::StoreConfig;
use crate::error::StoreError;
use gateway_types::config::SystemConfig;
use gateway_types::counter::Counter;
use gateway_types::decision::DecisionLogEntry;
use gateway_types::rule::Rule;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

const RULES_KEY: &str = "rate_limit_rules";
const CONFIG_KEY: &str = "system_config";
const TRAFFIC_LOGS_KEY: &str = "traffic_logs";
const STATS_INDEX_KEY: &str = "request_stats:index";

fn counter_key(rule_id: &str, identifier: &str) -> String {
	format!("request_counter:{rule_id}:{identifier}")
}

fn stats_key(minute: i64) -> String {
	format!("request_stats:{minute}")
}

/// Thin async wrapper over a redis connection. Cloning is cheap; `Client`
/// itself is the connection factory and `get_multiplexed_async_connection`
/// hands back a connection shared behind a lock internally.
#[derive(Clone)]
pub struct GatewayStore {
	client: redis::Client,
	config: StoreConfig,
}

impl GatewayStore {
	/// # Errors
	/// Returns `StoreError::Redis` if the connection string cannot be parsed.
	pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
		let client = redis::Client::open(config.redis_url.as_str())?;
		Ok(Self { client, config })
	}

	async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
		Ok(self.client.get_multiplexed_async_connection().await?)
	}

	/// Retries a transient store operation with exponential backoff, matching
	/// the caller's configured `max_retries` and `retry_delay`.
	async fn with_retry<F, Fut, T>(&self, mut op: F) -> Result<T, StoreError>
	where
		F: FnMut() -> Fut,
		Fut: std::future::Future<Output = Result<T, StoreError>>,
	{
		let mut delay = self.config.retry_delay;
		let mut last_err = None;
		for attempt in 0..=self.config.max_retries {
			match op().await {
				Ok(v) => return Ok(v),
				Err(e) => {
					last_err = Some(e);
					if attempt < self.config.max_retries {
						warn!(attempt, "store operation failed, retrying");
						tokio::time::sleep(delay).await;
						delay *= 2;
					}
				}
			}
		}
		Err(last_err.expect("at least one attempt was made"))
	}

	// ---- rules ----------------------------------------------------------

	/// Loads every rule in the store. A rule that fails to deserialize is
	/// skipped and logged rather than aborting the whole reload
	/// (see `StoreError::MalformedRule`).
	pub async fn load_rules(&self) -> Result<Vec<Rule>, StoreError> {
		let raw: HashMap<String, String> = self.with_retry(|| async { Ok(self.conn().await?.hgetall(RULES_KEY).await?) }).await?;
		let mut rules = Vec::with_capacity(raw.len());
		for (id, value) in raw {
			match serde_json::from_str::<Rule>(&value) {
				Ok(rule) => rules.push(rule),
				Err(e) => warn!(rule_id = %id, error = %e, "skipping malformed rule"),
			}
		}
		Ok(rules)
	}

	pub async fn put_rule(&self, rule: &Rule) -> Result<(), StoreError> {
		let serialized = serde_json::to_string(rule)?;
		let id = rule.id.clone();
		self
			.with_retry(|| {
				let serialized = serialized.clone();
				let id = id.clone();
				async move {
					let _: () = self.conn().await?.hset(RULES_KEY, id, serialized).await?;
					Ok(())
				}
			})
			.await
	}

	pub async fn delete_rule(&self, id: &str) -> Result<(), StoreError> {
		self
			.with_retry(|| async {
				let _: () = self.conn().await?.hdel(RULES_KEY, id).await?;
				Ok(())
			})
			.await
	}

	// ---- config -----------------------------------------------------------

	pub async fn load_config(&self) -> Result<SystemConfig, StoreError> {
		let raw: HashMap<String, String> = self.with_retry(|| async { Ok(self.conn().await?.hgetall(CONFIG_KEY).await?) }).await?;
		Ok(SystemConfig::from_map(raw))
	}

	pub async fn set_config_value(&self, key: &str, value: &str) -> Result<(), StoreError> {
		self
			.with_retry(|| async {
				let _: () = self.conn().await?.hset(CONFIG_KEY, key, value).await?;
				Ok(())
			})
			.await
	}

	// ---- counters -----------------------------------------------------------

	/// Reads the counter for (rule, identifier). A missing key is not an
	/// error; it means the identifier has made no admission in the current
	/// window.
	pub async fn get_counter(&self, rule_id: &str, identifier: &str) -> Result<Option<Counter>, StoreError> {
		let key = counter_key(rule_id, identifier);
		let raw: Option<String> = self.with_retry(|| async { Ok(self.conn().await?.get(&key).await?) }).await?;
		Ok(raw.map(|s| serde_json::from_str(&s)).transpose()?)
	}

	/// Writes the counter with a TTL of `window_seconds + slack`. This is a
	/// plain overwrite, not a CAS: the read-modify-write
	/// across this call and `get_counter` is intentionally non-atomic, so
	/// overshoot under concurrent writers is an accepted property, not a bug.
	pub async fn set_counter(&self, rule_id: &str, identifier: &str, counter: Counter, window_seconds: u64) -> Result<(), StoreError> {
		let key = counter_key(rule_id, identifier);
		let serialized = serde_json::to_string(&counter)?;
		let ttl = window_seconds + self.config.counter_ttl_slack_secs;
		self
			.with_retry(|| {
				let serialized = serialized.clone();
				let key = key.clone();
				async move {
					let _: () = self.conn().await?.set_ex(&key, serialized, ttl).await?;
					Ok(())
				}
			})
			.await
	}

	// ---- decision log -----------------------------------------------------------

	/// Appends one decision-log entry, left-pushed, trimmed to `max_entries`.
	/// Best-effort: callers on the hot path should swallow the error and log
	/// rather than fail the request over an analytics write.
	pub async fn push_decision_log(&self, entry: &DecisionLogEntry, max_entries: u64) -> Result<(), StoreError> {
		let serialized = serde_json::to_string(entry)?;
		self
			.with_retry(|| {
				let serialized = serialized.clone();
				async move {
					let mut conn = self.conn().await?;
					let _: () = conn.lpush(TRAFFIC_LOGS_KEY, serialized).await?;
					let cap = i64::try_from(max_entries.saturating_sub(1)).unwrap_or(i64::MAX);
					let _: () = conn.ltrim(TRAFFIC_LOGS_KEY, 0, cap).await?;
					Ok(())
				}
			})
			.await
	}

	/// Returns the `limit` most recent decision-log entries, newest first.
	pub async fn recent_decisions(&self, limit: u64) -> Result<Vec<DecisionLogEntry>, StoreError> {
		let end = i64::try_from(limit.saturating_sub(1)).unwrap_or(i64::MAX);
		let raw: Vec<String> = self.with_retry(|| async { Ok(self.conn().await?.lrange(TRAFFIC_LOGS_KEY, 0, end).await?) }).await?;
		let mut out = Vec::with_capacity(raw.len());
		for s in raw {
			match serde_json::from_str(&s) {
				Ok(entry) => out.push(entry),
				Err(e) => warn!(error = %e, "skipping malformed decision log entry"),
			}
		}
		Ok(out)
	}

	// ---- minute buckets -----------------------------------------------------------

	/// Adds `allowed`/`blocked` deltas into the bucket for `minute`, indexes
	/// it by score, and refreshes its TTL to the retention window.
	pub async fn bump_minute_bucket(&self, minute: i64, allowed: i64, blocked: i64, retention: Duration) -> Result<(), StoreError> {
		let key = stats_key(minute);
		let ttl = i64::try_from(retention.as_secs()).unwrap_or(i64::MAX);
		self
			.with_retry(|| {
				let key = key.clone();
				async move {
					let mut conn = self.conn().await?;
					if allowed != 0 {
						let _: () = conn.hincr(&key, "allowed", allowed).await?;
					}
					if blocked != 0 {
						let _: () = conn.hincr(&key, "blocked", blocked).await?;
					}
					let _: () = conn.zadd(STATS_INDEX_KEY, &key, minute).await?;
					let _: () = conn.expire(&key, ttl).await?;
					Ok(())
				}
			})
			.await
	}

	/// Returns `(minute, allowed, blocked)` triples for buckets in
	/// `[from_minute, to_minute]`, ordered by minute.
	pub async fn minute_buckets_in_range(&self, from_minute: i64, to_minute: i64) -> Result<Vec<(i64, u64, u64)>, StoreError> {
		let keys: Vec<String> = self
			.with_retry(|| async { Ok(self.conn().await?.zrangebyscore(STATS_INDEX_KEY, from_minute, to_minute).await?) })
			.await?;

		let mut out = Vec::with_capacity(keys.len());
		for key in keys {
			let Some(minute) = key.rsplit(':').next().and_then(|s| s.parse::<i64>().ok()) else {
				continue;
			};
			let fields: HashMap<String, u64> = self.with_retry(|| async { Ok(self.conn().await?.hgetall(&key).await?) }).await?;
			out.push((minute, fields.get("allowed").copied().unwrap_or(0), fields.get("blocked").copied().unwrap_or(0)));
		}
		out.sort_by_key(|(minute, _, _)| *minute);
		Ok(out)
	}

	/// Deletes every bucket (and its index entry) strictly older than
	/// `cutoff_minute`, bounding the index to `retention-days * 1440 + 1`.
	pub async fn prune_minute_buckets(&self, cutoff_minute: i64) -> Result<u64, StoreError> {
		let stale: Vec<String> = self.with_retry(|| async { Ok(self.conn().await?.zrangebyscore(STATS_INDEX_KEY, i64::MIN, cutoff_minute - 1).await?) }).await?;
		if stale.is_empty() {
			return Ok(0);
		}
		self
			.with_retry(|| {
				let stale = stale.clone();
				async move {
					let mut conn = self.conn().await?;
					let _: () = conn.del(&stale).await?;
					let _: () = conn.zrembyscore(STATS_INDEX_KEY, i64::MIN, cutoff_minute - 1).await?;
					Ok(())
				}
			})
			.await?;
		Ok(stale.len() as u64)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn counter_key_layout_matches_spec() {
		assert_eq!(counter_key("r1", "1.2.3.4"), "request_counter:r1:1.2.3.4");
	}

	#[test]
	fn stats_key_layout_matches_spec() {
		assert_eq!(stats_key(28800), "request_stats:28800");
	}
}
