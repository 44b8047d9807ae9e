//! HTTP API for submitting and removing watched orders.

use axum::{
	extract::{Path, State},
	http::StatusCode,
	response::Json,
	routing::{delete, get, post},
	Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, instrument, warn};
use watcher_config::ApiConfig;
use watcher_core::{OrderWatcher, WatcherError};
use watcher_types::{truncate_hash, OrderHash, SignedOrder};

/// API server over a running order watcher
pub struct ApiServer {
	config: ApiConfig,
	watcher: OrderWatcher,
}

impl ApiServer {
	pub fn new(config: ApiConfig, watcher: OrderWatcher) -> Self {
		Self { config, watcher }
	}

	pub fn router(&self) -> Router {
		Router::new()
			.route("/health", get(health_check))
			.route("/stats", get(get_stats))
			.route("/orders", post(add_order))
			.route("/orders/{order_hash}", delete(remove_order))
			.with_state(AppState {
				watcher: self.watcher.clone(),
			})
			.layer(TraceLayer::new_for_http())
			.layer(CorsLayer::permissive())
	}

	#[instrument(skip(self))]
	pub async fn run(self) -> anyhow::Result<()> {
		let app = self.router();
		let bind_address = format!("{}:{}", self.config.host, self.config.port);
		let listener = tokio::net::TcpListener::bind(&bind_address).await?;

		info!("API server listening on {}", bind_address);

		axum::serve(listener, app).await?;

		Ok(())
	}
}

#[derive(Clone)]
struct AppState {
	watcher: OrderWatcher,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AddOrderResponse {
	order_hash: OrderHash,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
	order_count: usize,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
	error: String,
	message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(error: WatcherError) -> ApiError {
	let (status, code) = match &error {
		WatcherError::InvalidSignature(_) => (StatusCode::BAD_REQUEST, "INVALID_SIGNATURE"),
		WatcherError::InvalidAssetData(_) => (StatusCode::BAD_REQUEST, "INVALID_ASSET_DATA"),
		WatcherError::ConflictingHint(_) => (StatusCode::BAD_REQUEST, "CONFLICTING_HINT"),
		_ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
	};
	(
		status,
		Json(ErrorResponse {
			error: code.to_string(),
			message: error.to_string(),
		}),
	)
}

async fn health_check() -> StatusCode {
	StatusCode::OK
}

async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
	let stats = state.watcher.get_stats();
	Json(StatsResponse {
		order_count: stats.order_count,
	})
}

async fn add_order(
	State(state): State<AppState>,
	Json(order): Json<SignedOrder>,
) -> Result<Json<AddOrderResponse>, ApiError> {
	match state.watcher.add_order(order).await {
		Ok(order_hash) => Ok(Json(AddOrderResponse { order_hash })),
		Err(e) => {
			warn!("Rejected order: {}", e);
			Err(error_response(e))
		}
	}
}

async fn remove_order(
	State(state): State<AppState>,
	Path(order_hash): Path<OrderHash>,
) -> StatusCode {
	info!(order = %truncate_hash(&order_hash), "Removing order on request");
	state.watcher.remove_order(order_hash).await;
	StatusCode::NO_CONTENT
}
