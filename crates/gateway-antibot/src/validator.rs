//! Ordered write-request validation: honeypot, submit timing, one-time
//! token, and idempotency. The first failing check terminates with its
//! own rejection reason; nothing downstream of it runs.

use crate::error::AntibotRejection;
use crate::token::TokenStore;
use axum::http::HeaderMap;
use gateway_types::config::SystemConfig;
use moka::sync::Cache;
use std::time::Duration;

const IDEMPOTENCY_TTL: Duration = Duration::from_secs(60 * 60);
const IDEMPOTENCY_CAPACITY: u64 = 100_000;

const TOKEN_HEADER: &str = "x-form-token";
const CHALLENGE_COOKIE: &str = "X-Form-Token-Challenge";
const LOAD_TIME_HEADER: &str = "x-form-load-time";
const IDEMPOTENCY_HEADER: &str = "x-idempotency-key";

/// The subset of a write request the validator needs, already extracted
/// by the ingress filter chain so this crate never parses raw Axum types
/// beyond headers.
pub struct WriteRequest<'a> {
	pub headers: &'a HeaderMap,
	pub cookies: &'a std::collections::HashMap<String, String>,
}

pub struct AntibotValidator {
	tokens: TokenStore,
	idempotency_keys: Cache<String, ()>,
}

impl AntibotValidator {
	#[must_use]
	pub fn new() -> Self {
		Self {
			tokens: TokenStore::new(),
			idempotency_keys: Cache::builder().max_capacity(IDEMPOTENCY_CAPACITY).time_to_live(IDEMPOTENCY_TTL).build(),
		}
	}

	#[must_use]
	pub fn issue_token(&self, now_secs: u64, config: &SystemConfig) -> crate::token::IssuedToken {
		self.tokens.issue(now_secs, &config.antibot_honeypot_field())
	}

	/// Runs every check in order against `req`, consuming the token and
	/// recording the idempotency key only if every check passes.
	///
	/// # Errors
	/// Returns the rejection for the first failing check.
	pub fn validate(&self, req: &WriteRequest<'_>, config: &SystemConfig, now_secs: u64) -> Result<(), AntibotRejection> {
		let honeypot_field = config.antibot_honeypot_field();
		if let Some(value) = header_str(req.headers, &honeypot_field) {
			if !value.is_empty() {
				return Err(AntibotRejection::Honeypot);
			}
		}

		let load_time = header_str(req.headers, LOAD_TIME_HEADER).and_then(|v| v.parse::<u64>().ok()).unwrap_or(now_secs);
		if now_secs.saturating_sub(load_time) < config.antibot_min_submit_time_ms() / 1000 {
			return Err(AntibotRejection::TooFast);
		}

		let token = header_str(req.headers, TOKEN_HEADER)
			.map(str::to_owned)
			.or_else(|| req.cookies.get(CHALLENGE_COOKIE).cloned())
			.ok_or(AntibotRejection::InvalidToken)?;

		if self.tokens.is_used(&token) {
			return Err(AntibotRejection::ReusedToken);
		}
		if !self.tokens.is_valid(&token) {
			return Err(AntibotRejection::InvalidToken);
		}

		if let Some(key) = header_str(req.headers, IDEMPOTENCY_HEADER) {
			if self.idempotency_keys.contains_key(key) {
				return Err(AntibotRejection::Duplicate);
			}
			self.idempotency_keys.insert(key.to_owned(), ());
		}

		self.tokens.consume(&token);
		Ok(())
	}
}

impl Default for AntibotValidator {
	fn default() -> Self {
		Self::new()
	}
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
	headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn request<'a>(headers: &'a HeaderMap, cookies: &'a HashMap<String, String>) -> WriteRequest<'a> {
		WriteRequest { headers, cookies }
	}

	#[test]
	fn filled_honeypot_is_rejected_before_other_checks() {
		let validator = AntibotValidator::new();
		let config = SystemConfig::default();
		let mut headers = HeaderMap::new();
		headers.insert(config.antibot_honeypot_field().as_str(), "bot@spam.com".parse().unwrap());
		let cookies = HashMap::new();
		let req = request(&headers, &cookies);

		assert_eq!(validator.validate(&req, &config, 100), Err(AntibotRejection::Honeypot));
	}

	#[test]
	fn fresh_token_with_elapsed_time_passes_and_is_single_use() {
		let validator = AntibotValidator::new();
		let config = SystemConfig::default();
		let issued = validator.issue_token(0, &config);

		let mut headers = HeaderMap::new();
		headers.insert(TOKEN_HEADER, issued.token.parse().unwrap());
		headers.insert(LOAD_TIME_HEADER, "0".parse().unwrap());
		let cookies = HashMap::new();
		let req = request(&headers, &cookies);

		let now_secs = config.antibot_min_submit_time_ms() / 1000 + 1;
		assert_eq!(validator.validate(&req, &config, now_secs), Ok(()));
		assert_eq!(validator.validate(&req, &config, now_secs), Err(AntibotRejection::ReusedToken));
	}

	#[test]
	fn submission_before_min_time_is_too_fast() {
		let validator = AntibotValidator::new();
		let config = SystemConfig::default();
		let issued = validator.issue_token(1_000, &config);

		let mut headers = HeaderMap::new();
		headers.insert(TOKEN_HEADER, issued.token.parse().unwrap());
		headers.insert(LOAD_TIME_HEADER, "1000".parse().unwrap());
		let cookies = HashMap::new();
		let req = request(&headers, &cookies);

		assert_eq!(validator.validate(&req, &config, 1_000), Err(AntibotRejection::TooFast));
	}

	#[test]
	fn missing_token_falls_back_to_challenge_cookie() {
		let validator = AntibotValidator::new();
		let config = SystemConfig::default();
		let issued = validator.issue_token(0, &config);

		let mut headers = HeaderMap::new();
		headers.insert(LOAD_TIME_HEADER, "0".parse().unwrap());
		let mut cookies = HashMap::new();
		cookies.insert("X-Form-Token-Challenge".to_owned(), issued.token.clone());
		let req = request(&headers, &cookies);

		let now_secs = config.antibot_min_submit_time_ms() / 1000 + 1;
		assert_eq!(validator.validate(&req, &config, now_secs), Ok(()));
	}

	#[test]
	fn repeated_idempotency_key_is_a_duplicate() {
		let validator = AntibotValidator::new();
		let config = SystemConfig::default();
		let now_secs = config.antibot_min_submit_time_ms() / 1000 + 1;

		let first_token = validator.issue_token(0, &config);
		let mut first_headers = HeaderMap::new();
		first_headers.insert(TOKEN_HEADER, first_token.token.parse().unwrap());
		first_headers.insert(LOAD_TIME_HEADER, "0".parse().unwrap());
		first_headers.insert(IDEMPOTENCY_HEADER, "req-1".parse().unwrap());
		let cookies = HashMap::new();
		assert_eq!(validator.validate(&request(&first_headers, &cookies), &config, now_secs), Ok(()));

		let second_token = validator.issue_token(0, &config);
		let mut second_headers = HeaderMap::new();
		second_headers.insert(TOKEN_HEADER, second_token.token.parse().unwrap());
		second_headers.insert(LOAD_TIME_HEADER, "0".parse().unwrap());
		second_headers.insert(IDEMPOTENCY_HEADER, "req-1".parse().unwrap());
		assert_eq!(validator.validate(&request(&second_headers, &cookies), &config, now_secs), Err(AntibotRejection::Duplicate));
	}
}
