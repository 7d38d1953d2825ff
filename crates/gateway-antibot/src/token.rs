//! One-time form tokens: issued fresh per page load, consumed exactly once
//! on submission. Two bounded, TTL'd caches track the token's lifecycle
//! (`moka::sync::Cache`, the same bounded-capacity tool the teacher uses for
//! its file cache).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use moka::sync::Cache;
use rand::RngCore;
use std::time::Duration;

const VALID_TOKEN_TTL: Duration = Duration::from_secs(10 * 60);
const USED_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);
const TOKEN_BYTES: usize = 24;
const CACHE_CAPACITY: u64 = 100_000;

/// Result of issuing a token to a client, ready to render into a form or
/// challenge page.
#[derive(Debug, Clone)]
pub struct IssuedToken {
	pub token: String,
	pub load_time_secs: u64,
	pub honeypot_field: String,
	pub ttl_seconds: u64,
}

fn generate_token() -> String {
	let mut buf = [0u8; TOKEN_BYTES];
	rand::rng().fill_bytes(&mut buf);
	URL_SAFE_NO_PAD.encode(buf)
}

pub struct TokenStore {
	valid_tokens: Cache<String, u64>,
	used_tokens: Cache<String, ()>,
}

impl TokenStore {
	#[must_use]
	pub fn new() -> Self {
		Self {
			valid_tokens: Cache::builder().max_capacity(CACHE_CAPACITY).time_to_live(VALID_TOKEN_TTL).build(),
			used_tokens: Cache::builder().max_capacity(CACHE_CAPACITY).time_to_live(USED_TOKEN_TTL).build(),
		}
	}

	/// Mints a fresh token and records it as valid from `now_secs`.
	#[must_use]
	pub fn issue(&self, now_secs: u64, honeypot_field: &str) -> IssuedToken {
		let token = generate_token();
		self.valid_tokens.insert(token.clone(), now_secs);
		IssuedToken {
			token,
			load_time_secs: now_secs,
			honeypot_field: honeypot_field.to_owned(),
			ttl_seconds: VALID_TOKEN_TTL.as_secs(),
		}
	}

	/// `true` if `token` is a live, unexpired issuance not yet consumed.
	#[must_use]
	pub fn is_valid(&self, token: &str) -> bool {
		self.valid_tokens.contains_key(token)
	}

	/// `true` if `token` was already consumed by a prior submission.
	#[must_use]
	pub fn is_used(&self, token: &str) -> bool {
		self.used_tokens.contains_key(token)
	}

	/// Invalidates `token` and records it as spent, so a replay is rejected
	/// by `is_used` even after the valid-token entry would have expired.
	pub fn consume(&self, token: &str) {
		self.valid_tokens.invalidate(token);
		self.used_tokens.insert(token.to_owned(), ());
	}
}

impl Default for TokenStore {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn issued_token_is_valid_and_unused() {
		let store = TokenStore::new();
		let issued = store.issue(1_000, "_hp_email");
		assert!(store.is_valid(&issued.token));
		assert!(!store.is_used(&issued.token));
	}

	#[test]
	fn consuming_moves_token_from_valid_to_used() {
		let store = TokenStore::new();
		let issued = store.issue(1_000, "_hp_email");
		store.consume(&issued.token);
		assert!(!store.is_valid(&issued.token));
		assert!(store.is_used(&issued.token));
	}

	#[test]
	fn unknown_token_is_neither_valid_nor_used() {
		let store = TokenStore::new();
		assert!(!store.is_valid("nope"));
		assert!(!store.is_used("nope"));
	}

	#[test]
	fn issued_tokens_are_unique() {
		let store = TokenStore::new();
		let a = store.issue(1_000, "_hp_email");
		let b = store.issue(1_000, "_hp_email");
		assert_ne!(a.token, b.token);
	}
}
