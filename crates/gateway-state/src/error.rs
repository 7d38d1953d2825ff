use std::num::TryFromIntError;
use thiserror::Error;

/// Failure modes of a shared-state round trip. Hot-path
/// callers treat every variant here as `StoreTransient` and recover locally
/// (swallow, log, allow); only the admin surface propagates these as 5xx.
#[derive(Error, Debug)]
pub enum StoreError {
	#[error("state store error: {0}")]
	Redis(#[from] redis::RedisError),

	#[error("serialization error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("conversion error: {0}")]
	Conversion(#[from] TryFromIntError),

	#[error("rule {0} failed to deserialize and was skipped")]
	MalformedRule(String),
}
