use gateway_analytics::Broadcaster;
use gateway_limiter::RuleCache;
use gateway_state::GatewayStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AdminState {
	pub store: GatewayStore,
	pub rule_cache: Arc<RuleCache>,
	pub broadcaster: Arc<Broadcaster>,
}
