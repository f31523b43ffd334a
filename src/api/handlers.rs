//! HTTP request handlers with OpenAPI documentation.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;
use utoipa::OpenApi;

use crate::app::AppState;
use crate::domain::{
    AddressStatItem, AppError, ChainError, DatabaseError, ErrorDetail, ErrorResponse, FeeStatItem,
    HealthResponse, HealthStatus, IntervalType, MinerStatItem, SortOrder, StatPage, StatQuery,
    StorageStatItem, Summary, SyncCursor, TxStatItem,
};

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storage Scan Indexer API",
        version = "0.1.0",
        description = "Read-only access to indexed storage network statistics and sync progress",
        contact(
            name = "API Support",
            email = "support@example.com"
        ),
        license(
            name = "MIT"
        )
    ),
    paths(
        storage_stats_handler,
        tx_stats_handler,
        fee_stats_handler,
        address_stats_handler,
        miner_stats_handler,
        summary_handler,
        health_check_handler,
        liveness_handler,
        readiness_handler,
    ),
    components(
        schemas(
            IntervalType,
            SortOrder,
            StatQuery,
            StatPage<StorageStatItem>,
            StatPage<TxStatItem>,
            StatPage<FeeStatItem>,
            StatPage<AddressStatItem>,
            StatPage<MinerStatItem>,
            StorageStatItem,
            TxStatItem,
            FeeStatItem,
            AddressStatItem,
            MinerStatItem,
            Summary,
            SyncCursor,
            HealthResponse,
            HealthStatus,
            ErrorResponse,
            ErrorDetail,
        )
    ),
    tags(
        (name = "stats", description = "Time-bucketed statistic rollups"),
        (name = "sync", description = "Ingestion progress"),
        (name = "health", description = "Health check endpoints")
    )
)]
pub struct ApiDoc;

/// Storage growth per bucket
#[utoipa::path(
    get,
    path = "/stats/storage",
    tag = "stats",
    params(
        ("interval" = Option<String>, Query, description = "Bucket width: hour or day (default: day)"),
        ("min_timestamp" = Option<i64>, Query, description = "Earliest bucket start, unix seconds"),
        ("max_timestamp" = Option<i64>, Query, description = "Latest bucket start, unix seconds"),
        ("sort" = Option<String>, Query, description = "asc or desc (default: desc)"),
        ("skip" = Option<i64>, Query, description = "Rows to skip (default: 0)"),
        ("limit" = Option<i64>, Query, description = "Rows to return (1-2000, default: 10)")
    ),
    responses(
        (status = 200, description = "Page of storage rollups", body = StatPage<StorageStatItem>),
        (status = 400, description = "Invalid query parameters", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn storage_stats_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatQuery>,
) -> Result<Json<StatPage<StorageStatItem>>, AppError> {
    Ok(Json(state.service.storage_stats(&query).await?))
}

/// Transaction counts per bucket
#[utoipa::path(
    get,
    path = "/stats/txs",
    tag = "stats",
    params(
        ("interval" = Option<String>, Query, description = "Bucket width: hour or day (default: day)"),
        ("min_timestamp" = Option<i64>, Query, description = "Earliest bucket start, unix seconds"),
        ("max_timestamp" = Option<i64>, Query, description = "Latest bucket start, unix seconds"),
        ("sort" = Option<String>, Query, description = "asc or desc (default: desc)"),
        ("skip" = Option<i64>, Query, description = "Rows to skip (default: 0)"),
        ("limit" = Option<i64>, Query, description = "Rows to return (1-2000, default: 10)")
    ),
    responses(
        (status = 200, description = "Page of transaction rollups", body = StatPage<TxStatItem>),
        (status = 400, description = "Invalid query parameters", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn tx_stats_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatQuery>,
) -> Result<Json<StatPage<TxStatItem>>, AppError> {
    Ok(Json(state.service.tx_stats(&query).await?))
}

/// Storage fees per bucket
#[utoipa::path(
    get,
    path = "/stats/fees",
    tag = "stats",
    params(
        ("interval" = Option<String>, Query, description = "Bucket width: hour or day (default: day)"),
        ("min_timestamp" = Option<i64>, Query, description = "Earliest bucket start, unix seconds"),
        ("max_timestamp" = Option<i64>, Query, description = "Latest bucket start, unix seconds"),
        ("sort" = Option<String>, Query, description = "asc or desc (default: desc)"),
        ("skip" = Option<i64>, Query, description = "Rows to skip (default: 0)"),
        ("limit" = Option<i64>, Query, description = "Rows to return (1-2000, default: 10)")
    ),
    responses(
        (status = 200, description = "Page of fee rollups", body = StatPage<FeeStatItem>),
        (status = 400, description = "Invalid query parameters", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn fee_stats_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatQuery>,
) -> Result<Json<StatPage<FeeStatItem>>, AppError> {
    Ok(Json(state.service.fee_stats(&query).await?))
}

/// Submitting addresses per bucket
#[utoipa::path(
    get,
    path = "/stats/addresses",
    tag = "stats",
    params(
        ("interval" = Option<String>, Query, description = "Bucket width: hour or day (default: day)"),
        ("min_timestamp" = Option<i64>, Query, description = "Earliest bucket start, unix seconds"),
        ("max_timestamp" = Option<i64>, Query, description = "Latest bucket start, unix seconds"),
        ("sort" = Option<String>, Query, description = "asc or desc (default: desc)"),
        ("skip" = Option<i64>, Query, description = "Rows to skip (default: 0)"),
        ("limit" = Option<i64>, Query, description = "Rows to return (1-2000, default: 10)")
    ),
    responses(
        (status = 200, description = "Page of address rollups", body = StatPage<AddressStatItem>),
        (status = 400, description = "Invalid query parameters", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn address_stats_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatQuery>,
) -> Result<Json<StatPage<AddressStatItem>>, AppError> {
    Ok(Json(state.service.address_stats(&query).await?))
}

/// Rewarded miners per bucket
#[utoipa::path(
    get,
    path = "/stats/miners",
    tag = "stats",
    params(
        ("interval" = Option<String>, Query, description = "Bucket width: hour or day (default: day)"),
        ("min_timestamp" = Option<i64>, Query, description = "Earliest bucket start, unix seconds"),
        ("max_timestamp" = Option<i64>, Query, description = "Latest bucket start, unix seconds"),
        ("sort" = Option<String>, Query, description = "asc or desc (default: desc)"),
        ("skip" = Option<i64>, Query, description = "Rows to skip (default: 0)"),
        ("limit" = Option<i64>, Query, description = "Rows to return (1-2000, default: 10)")
    ),
    responses(
        (status = 200, description = "Page of miner rollups", body = StatPage<MinerStatItem>),
        (status = 400, description = "Invalid query parameters", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn miner_stats_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatQuery>,
) -> Result<Json<StatPage<MinerStatItem>>, AppError> {
    Ok(Json(state.service.miner_stats(&query).await?))
}

/// Last persisted sync cursor and the latest daily storage fee total
#[utoipa::path(
    get,
    path = "/summary",
    tag = "sync",
    responses(
        (status = 200, description = "Sync summary", body = Summary),
        (status = 404, description = "Nothing ingested yet", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn summary_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Summary>, AppError> {
    Ok(Json(state.service.summary().await?))
}

/// Detailed health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Health status", body = HealthResponse)
    )
)]
pub async fn health_check_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let health = state.service.health_check().await;
    Json(health)
}

/// Kubernetes liveness endpoint
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "health",
    responses(
        (status = 200, description = "Application is alive")
    )
)]
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Kubernetes readiness endpoint
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "health",
    responses(
        (status = 200, description = "Application is ready to serve traffic"),
        (status = 503, description = "Application is not ready")
    )
)]
pub async fn readiness_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    let health = state.service.health_check().await;
    match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_type, message) = match &self {
            AppError::Database(db_err) => match db_err {
                DatabaseError::Connection(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "database_error",
                    self.to_string(),
                ),
                DatabaseError::NotFound(_) => {
                    (StatusCode::NOT_FOUND, "not_found", self.to_string())
                }
                DatabaseError::Duplicate(_) => {
                    (StatusCode::CONFLICT, "duplicate", self.to_string())
                }
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    self.to_string(),
                ),
            },
            AppError::Chain(chain_err) => match chain_err {
                ChainError::Timeout(_) => {
                    (StatusCode::GATEWAY_TIMEOUT, "timeout", self.to_string())
                }
                _ => (StatusCode::BAD_GATEWAY, "chain_error", self.to_string()),
            },
            AppError::Decode(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "decode_error",
                self.to_string(),
            ),
            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "configuration_error",
                self.to_string(),
            ),
            AppError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                self.to_string(),
            ),
            AppError::Consistency(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "consistency_error",
                self.to_string(),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                self.to_string(),
            ),
        };

        if status.is_server_error() {
            error!(error_type = %error_type, message = %message, "Server error");
        }

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                r#type: error_type.to_string(),
                message,
            },
        });

        (status, body).into_response()
    }
}
