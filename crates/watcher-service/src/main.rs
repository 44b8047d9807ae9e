use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use watcher_config::{Config, ConfigLoader};
use watcher_core::{OrderStateCallback, OrderWatcher, OrderWatcherBuilder, OrderWatcherConfig};
use watcher_events::implementations::evm::alloy::AlloyChainClient;
use watcher_state::implementations::evm::alloy::{AlloyStateFetcher, StateContracts};
use watcher_types::{truncate_hash, OrderState};

mod api;

#[derive(Parser)]
#[command(name = "order-watcher")]
#[command(about = "Order Watcher Service", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", default_value = "config/local.toml")]
	config: PathBuf,

	#[arg(long, env = "WATCHER_LOG_LEVEL", default_value = "info")]
	log_level: String,
}

#[derive(Subcommand)]
enum Commands {
	/// Start watching orders
	Start,
	/// Validate the configuration file
	Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	setup_tracing(&cli.log_level)?;

	match cli.command {
		Some(Commands::Start) | None => start_service(cli).await,
		Some(Commands::Validate) => validate_config(cli).await,
	}
}

async fn load_config(cli: &Cli) -> Result<Config> {
	info!("Loading configuration from: {:?}", cli.config);
	ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")
}

async fn start_service(cli: Cli) -> Result<()> {
	info!("Starting Order Watcher Service");

	let config = load_config(&cli).await?;
	info!("Watcher name: {}", config.watcher.name);
	info!("Chain id: {}", config.network.chain_id);

	let watcher = build_watcher(&config)?;
	watcher
		.subscribe(log_state_changes())
		.await
		.context("Failed to subscribe to order state changes")?;

	let http_handle = if config.api.enabled {
		let server = api::ApiServer::new(config.api.clone(), watcher.clone());
		Some(tokio::spawn(async move {
			if let Err(e) = server.run().await {
				error!("API server stopped: {}", e);
			}
		}))
	} else {
		info!("API disabled");
		None
	};

	info!("Order Watcher Service started successfully");

	shutdown_signal().await;

	info!("Shutdown signal received, stopping services...");

	if let Err(e) = watcher.unsubscribe().await {
		warn!("Watcher was already unsubscribed: {}", e);
	}
	if let Some(handle) = http_handle {
		handle.abort();
	}

	info!("Order Watcher Service stopped");
	Ok(())
}

async fn validate_config(cli: Cli) -> Result<()> {
	let config = load_config(&cli).await?;

	info!("Configuration is valid");
	info!("Watcher name: {}", config.watcher.name);
	info!("  RPC: {}", config.network.rpc_url);
	info!("  Exchange: {}", config.network.exchange);
	info!("  Fee token: {}", config.network.fee_token);
	if let Some(weth) = config.network.weth {
		info!("  WETH: {}", weth);
	}
	info!(
		"  Event polling every {} ms, cleanup every {} ms",
		config.intervals.event_polling_interval_ms, config.intervals.cleanup_job_interval_ms
	);

	Ok(())
}

fn build_watcher(config: &Config) -> Result<OrderWatcher> {
	let chain_client = AlloyChainClient::new(&config.network.rpc_url)
		.context("Failed to create chain client")?;
	let state_fetcher = AlloyStateFetcher::new(
		&config.network.rpc_url,
		StateContracts {
			exchange: config.network.exchange,
			erc20_proxy: config.network.erc20_proxy,
			erc721_proxy: config.network.erc721_proxy,
		},
	)
	.context("Failed to create state fetcher")?;

	let mut builder = OrderWatcherBuilder::new(OrderWatcherConfig::from(config))
		.with_chain_client(Arc::new(chain_client))
		.with_state_fetcher(Arc::new(state_fetcher));
	if let Some(weth) = config.network.weth {
		builder = builder.with_erc20_token(weth);
	}

	builder.build().context("Failed to build order watcher")
}

fn log_state_changes() -> OrderStateCallback {
	Arc::new(|change| match change {
		Ok(change) => match &change.state {
			OrderState::Valid(state) => info!(
				order = %truncate_hash(&change.order_hash),
				fillable_taker = %state.remaining_fillable_taker_asset_amount,
				"Order is fillable"
			),
			OrderState::Invalid(reason) => info!(
				order = %truncate_hash(&change.order_hash),
				%reason,
				"Order is not fillable"
			),
		},
		Err(e) => warn!("Order watcher error: {}", e),
	})
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.init();

	Ok(())
}

async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			error!("Failed to listen for Ctrl+C: {}", e);
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
			}
			Err(e) => {
				error!("Failed to install SIGTERM handler: {}", e);
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
