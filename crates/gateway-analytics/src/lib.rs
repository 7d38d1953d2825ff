pub mod aggregator;
pub mod broadcaster;
pub mod decision_log;
pub mod summary;

pub use aggregator::{Aggregator, PendingCounters};
pub use broadcaster::{Broadcaster, ConnectionId, SubscriberGauge};
pub use decision_log::DecisionLogWriter;
pub use summary::{BroadcastMessage, Summary, TimeseriesPoint};
