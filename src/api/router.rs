//! Router configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::{Router, http::Method, routing::get};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::app::AppState;

use super::handlers::{
    ApiDoc, address_stats_handler, fee_stats_handler, health_check_handler, liveness_handler,
    miner_stats_handler, readiness_handler, storage_stats_handler, summary_handler,
    tx_stats_handler,
};

/// Request timeout applied to every route
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/stats/storage", get(storage_stats_handler))
        .route("/stats/txs", get(tx_stats_handler))
        .route("/stats/fees", get(fee_stats_handler))
        .route("/stats/addresses", get(address_stats_handler))
        .route("/stats/miners", get(miner_stats_handler))
        .route("/summary", get(summary_handler))
        .route("/health", get(health_check_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
                .layer(cors),
        )
        .with_state(state)
}
