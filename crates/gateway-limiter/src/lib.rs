pub mod counter;
pub mod error;
pub mod filter;
pub mod identifier;
pub mod queue;
pub mod rule_cache;

pub use error::LimiterError;
pub use filter::{FilterOutcome, RateLimitFilter};
pub use identifier::{resolve as resolve_identifier, RequestParts};
pub use queue::{QueueAccountant, QueueOutcome};
pub use rule_cache::RuleCache;
