mod body_capture;
mod config;
mod data_plane;
mod metrics;
mod proxy;
mod tokens;

use crate::config::GatewayConfig;
use crate::data_plane::DataPlaneState;
use crate::metrics::{GatewayMetrics, MetricsState};
use crate::proxy::Proxy;
use crate::tokens::TokenState;
use anyhow::Result;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use gateway_admin::AdminState;
use gateway_analytics::{Aggregator, Broadcaster, DecisionLogWriter, PendingCounters};
use gateway_antibot::AntibotValidator;
use gateway_limiter::{RateLimitFilter, RuleCache};
use gateway_state::{GatewayStore, StoreConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{filter::EnvFilter, fmt::format::JsonFields, util::SubscriberInitExt, Layer};

#[tokio::main]
async fn main() -> Result<()> {
	dotenv::dotenv().ok();
	let config = GatewayConfig::parse();
	init_tracing(&config);

	let store_config = StoreConfig { redis_url: config.redis_url.clone(), ..StoreConfig::default() };
	let store = GatewayStore::new(store_config)?;

	let rule_cache = Arc::new(RuleCache::new(store.clone()));
	if let Err(e) = rule_cache.refresh().await {
		tracing::warn!(error = %e, "initial rule cache load failed, starting with an empty rule set");
	}

	let filter = Arc::new(RateLimitFilter::new(store.clone()));
	let antibot = Arc::new(AntibotValidator::new());
	let counters = Arc::new(PendingCounters::default());
	let decision_log = Arc::new(DecisionLogWriter::new(store.clone()));
	let broadcaster = Arc::new(Broadcaster::new(store.clone()));
	let metrics = Arc::new(GatewayMetrics::new());
	let aggregator = Arc::new(Aggregator::new(store.clone(), counters.clone(), config.aggregator_tick));

	let shutdown_token = CancellationToken::new();

	spawn_rule_refresh_loop(rule_cache.clone(), config.rule_refresh_interval, shutdown_token.clone());
	spawn_queue_sweep_loop(filter.clone(), config.queue_sweep_interval, shutdown_token.clone());

	let retention = Duration::from_secs(store_config_retention_days(&store).await * 24 * 60 * 60);
	tokio::spawn({
		let aggregator = aggregator.clone();
		let token = shutdown_token.clone();
		async move { aggregator.run(retention, token).await }
	});

	tokio::spawn({
		let broadcaster = broadcaster.clone();
		let rule_cache = rule_cache.clone();
		let tick = config.broadcast_tick;
		let token = shutdown_token.clone();
		async move {
			broadcaster.run(tick, move || rule_cache.len(), token).await;
		}
	});

	let data_plane_state = DataPlaneState {
		store: store.clone(),
		rule_cache: rule_cache.clone(),
		filter: filter.clone(),
		antibot: antibot.clone(),
		proxy: Proxy::new(),
		counters: counters.clone(),
		decision_log: decision_log.clone(),
		metrics: metrics.clone(),
	};
	let token_state = TokenState { store: store.clone(), antibot: antibot.clone() };

	let data_plane_router = Router::new().fallback(data_plane::handle).with_state(data_plane_state);

	let public_app = Router::new()
		.route("/healthz", get(tokens::healthz))
		.route("/api/tokens/form", get(tokens::issue_form_token))
		.route("/api/tokens/challenge", get(tokens::issue_challenge))
		.with_state(token_state)
		.fallback_service(data_plane_router)
		.layer(TraceLayer::new_for_http());

	let metrics_state = MetricsState { metrics: metrics.clone(), filter: filter.clone(), broadcaster: broadcaster.clone() };
	let metrics_router = Router::new().route("/metrics", get(metrics::metrics_handler)).with_state(metrics_state);
	let admin_app = gateway_admin::router(AdminState { store: store.clone(), rule_cache: rule_cache.clone(), broadcaster: broadcaster.clone() }).merge(metrics_router);

	let public_addr: SocketAddr = config.public_addr.parse()?;
	let admin_addr: SocketAddr = config.admin_addr.parse()?;
	let public_listener = TcpListener::bind(public_addr).await?;
	let admin_listener = TcpListener::bind(admin_addr).await?;
	tracing::info!(%public_addr, %admin_addr, "gateway listening");

	let signal_token = shutdown_token.clone();
	tokio::spawn(async move {
		tokio::signal::ctrl_c().await.ok();
		tracing::info!("received shutdown signal");
		signal_token.cancel();
	});

	let public_token = shutdown_token.clone();
	let public_server = axum::serve(public_listener, public_app.into_make_service_with_connect_info::<SocketAddr>()).with_graceful_shutdown(async move {
		public_token.cancelled().await;
	});

	let admin_token = shutdown_token.clone();
	let admin_server = axum::serve(admin_listener, admin_app.into_make_service()).with_graceful_shutdown(async move {
		admin_token.cancelled().await;
	});

	let (public_result, admin_result) = tokio::join!(public_server, admin_server);
	public_result?;
	admin_result?;
	tracing::info!("gateway stopped");
	Ok(())
}

async fn store_config_retention_days(store: &GatewayStore) -> u64 {
	store.load_config().await.map(|c| c.analytics_retention_days()).unwrap_or(7)
}

fn spawn_rule_refresh_loop(rule_cache: Arc<RuleCache>, interval: Duration, cancel: CancellationToken) {
	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(interval);
		loop {
			tokio::select! {
				() = cancel.cancelled() => return,
				_ = ticker.tick() => {
					if let Err(e) = rule_cache.refresh().await {
						tracing::warn!(error = %e, "rule cache refresh failed");
					}
				}
			}
		}
	});
}

fn spawn_queue_sweep_loop(filter: Arc<RateLimitFilter>, interval: Duration, cancel: CancellationToken) {
	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(interval);
		loop {
			tokio::select! {
				() = cancel.cancelled() => return,
				_ = ticker.tick() => {
					let removed = filter.queue_accountant().sweep();
					if removed > 0 {
						tracing::debug!(removed, "swept empty queue gauges");
					}
				}
			}
		}
	});
}

fn init_tracing(config: &GatewayConfig) {
	use tracing_subscriber::layer::SubscriberExt;

	let filter = EnvFilter::try_new(&config.rust_log).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::registry()
		.with(if config.log_json {
			Box::new(
				tracing_subscriber::fmt::layer()
					.fmt_fields(JsonFields::default())
					.event_format(tracing_subscriber::fmt::format().json().flatten_event(true).with_span_list(false))
					.with_filter(filter),
			) as Box<dyn Layer<_> + Send + Sync>
		} else {
			Box::new(tracing_subscriber::fmt::layer().event_format(tracing_subscriber::fmt::format().pretty()).with_filter(filter))
		})
		.init();
}
