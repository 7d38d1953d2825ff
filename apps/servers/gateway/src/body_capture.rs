//! Buffers a request body once, up front, so both the identifier resolver
//! and the anti-bot validator can inspect it without re-reading the
//! connection.

use axum::body::{Body, Bytes};
use axum::http::StatusCode;

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Reads the whole body into memory, rejecting anything over the 1 MiB
/// cap with 413 rather than buffering an unbounded amount.
///
/// # Errors
/// Returns `413 Payload Too Large` both when the body exceeds the cap and
/// when the body stream itself errors (`axum::body::to_bytes` does not
/// distinguish the two at this API surface).
pub async fn capture(body: Body) -> Result<Bytes, StatusCode> {
	axum::body::to_bytes(body, MAX_BODY_BYTES).await.map_err(|_| StatusCode::PAYLOAD_TOO_LARGE)
}
