use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::glob::AntPattern;

/// Which request attribute supplies the body of a rate limit key, and
/// whether it replaces or combines with the caller's IP address.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierMode {
	ReplaceIp,
	CombineWithIp,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BodyContentType {
	Json,
	FormUrlEncoded,
	Xml,
	Multipart,
}

/// The resolved source a rule wants requests grouped by. At most one
/// variant other than `Ip` should be set on a rule; `IdentifierResolution`
/// still falls through in priority order when the configured source is
/// absent on a given request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdentifierSource {
	Header { name: String, mode: IdentifierMode },
	Cookie { name: String, mode: IdentifierMode },
	Body { field_path: String, content_type: BodyContentType, mode: IdentifierMode },
	Jwt { claims: Vec<String>, separator: String, mode: IdentifierMode },
	Ip,
}

impl Default for IdentifierSource {
	fn default() -> Self {
		Self::Ip
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
	pub enabled: bool,
	pub max_queue_size: u32,
	pub delay_per_request_ms: u64,
}

impl Default for QueueConfig {
	fn default() -> Self {
		Self {
			enabled: false,
			max_queue_size: 0,
			delay_per_request_ms: 0,
		}
	}
}

/// Declares a body field whose size the data plane should cap, independent
/// of the rule's rate-limit quota. Administered through the rule CRUD
/// surface; enforcement lives in the body-capture stage of the filter
/// chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyLimitConfig {
	pub enabled: bool,
	pub field_path: String,
	pub limit_type: BodyContentType,
}

impl Default for BodyLimitConfig {
	fn default() -> Self {
		Self {
			enabled: false,
			field_path: String::new(),
			limit_type: BodyContentType::Json,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
	pub id: String,
	pub path_pattern: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub methods: Vec<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub hosts: Vec<String>,
	pub priority: i32,
	pub active: bool,
	pub target_uri: String,
	pub allowed_requests: u32,
	pub window_seconds: u64,
	#[serde(default)]
	pub queue: QueueConfig,
	#[serde(default)]
	pub identifier_source: IdentifierSource,
	#[serde(default)]
	pub body_limit: BodyLimitConfig,
}

#[derive(Debug, Error)]
pub enum RuleValidationError {
	#[error("rule path pattern must not be empty")]
	EmptyPattern,
	#[error("rule window_seconds must be greater than zero")]
	ZeroWindow,
	#[error("rule queue.max_queue_size must be greater than zero when queueing is enabled")]
	ZeroQueueSize,
}

impl Rule {
	/// Returns a compiled matcher for this rule's path pattern.
	#[must_use]
	pub fn pattern(&self) -> AntPattern {
		AntPattern::compile(&self.path_pattern)
	}

	#[must_use]
	pub fn is_global(&self) -> bool {
		self.pattern().is_global()
	}

	pub fn matches_method(&self, method: &str) -> bool {
		self.methods.is_empty() || self.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
	}

	pub fn matches_host(&self, host: &str) -> bool {
		self.hosts.is_empty() || self.hosts.iter().any(|h| AntPattern::compile(h).matches(host))
	}

	/// Validates shape invariants enforced at admin-write time.
	///
	/// # Errors
	/// Returns the first violated invariant.
	pub fn validate(&self) -> Result<(), RuleValidationError> {
		if self.path_pattern.is_empty() {
			return Err(RuleValidationError::EmptyPattern);
		}
		if self.window_seconds == 0 {
			return Err(RuleValidationError::ZeroWindow);
		}
		if self.queue.enabled && self.queue.max_queue_size == 0 {
			return Err(RuleValidationError::ZeroQueueSize);
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn base_rule() -> Rule {
		Rule {
			id: "r1".into(),
			path_pattern: "/api/**".into(),
			methods: vec![],
			hosts: vec![],
			priority: 10,
			active: true,
			target_uri: "http://upstream.local".into(),
			allowed_requests: 5,
			window_seconds: 60,
			queue: QueueConfig::default(),
			identifier_source: IdentifierSource::Ip,
			body_limit: BodyLimitConfig::default(),
		}
	}

	#[test]
	fn validates_ok_rule() {
		assert!(base_rule().validate().is_ok());
	}

	#[test]
	fn rejects_zero_window() {
		let mut r = base_rule();
		r.window_seconds = 0;
		assert!(matches!(r.validate(), Err(RuleValidationError::ZeroWindow)));
	}

	#[test]
	fn rejects_queue_without_size() {
		let mut r = base_rule();
		r.queue.enabled = true;
		assert!(matches!(r.validate(), Err(RuleValidationError::ZeroQueueSize)));
	}

	#[test]
	fn global_pattern_detection() {
		let mut r = base_rule();
		r.path_pattern = "/**".into();
		assert!(r.is_global());
	}

	#[test]
	fn method_matching_is_case_insensitive() {
		let mut r = base_rule();
		r.methods = vec!["post".into()];
		assert!(r.matches_method("POST"));
		assert!(!r.matches_method("GET"));
	}
}
