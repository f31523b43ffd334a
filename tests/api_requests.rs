//! HTTP-level tests for the read API.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

use storage_scan_indexer::api::create_router;
use storage_scan_indexer::app::AppState;
use storage_scan_indexer::domain::{
    AddressStat, Amount, IntervalType, MinerStat, SubmitStat, SyncCursor, WindowStats,
};
use storage_scan_indexer::test_utils::{MockChainNode, MockIndexerStore};

fn hour(h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, h, 0, 0).unwrap()
}

fn hourly(h: u32) -> WindowStats {
    let n = u64::from(h) + 1;
    WindowStats {
        submit: SubmitStat {
            stat_type: IntervalType::Hour,
            stat_time: hour(h),
            file_count: n,
            file_total: n * (n + 1) / 2,
            data_size: n * 1024,
            data_total: n * 4096,
            base_fee: Amount::from(n * 10),
            base_fee_total: Amount::from(n * 100),
            tx_count: n,
            tx_total: n * 3,
            sender_count: 1,
        },
        address: AddressStat {
            stat_type: IntervalType::Hour,
            stat_time: hour(h),
            addr_new: 1,
            addr_active: 2,
            addr_total: n,
        },
        miner: MinerStat {
            stat_type: IntervalType::Hour,
            stat_time: hour(h),
            miner_new: 0,
            miner_active: 1,
            miner_total: 1,
            reward_amount: Amount::from(u64::MAX) + Amount::from(n),
        },
    }
}

fn create_test_state(store: &Arc<MockIndexerStore>) -> Arc<AppState> {
    let node = MockChainNode::new();
    node.push_block(vec![]);
    Arc::new(AppState::new(store.clone() as _, Arc::new(node) as _))
}

async fn get_json(store: &Arc<MockIndexerStore>, uri: &str) -> (StatusCode, serde_json::Value) {
    let router = create_router(create_test_state(store));
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

fn seeded_store() -> Arc<MockIndexerStore> {
    let store = Arc::new(MockIndexerStore::new());
    for h in 0..6 {
        store.seed_stats(hourly(h));
    }
    store
}

#[tokio::test]
async fn test_storage_stats_default_sort_is_descending() {
    let store = seeded_store();
    let (status, body) = get_json(&store, "/stats/storage?interval=hour&limit=2").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 6);
    let list = body["list"].as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["file_count"], 6);
    assert_eq!(list[1]["file_count"], 5);
    assert_eq!(list[0]["data_total"], 6 * 4096);
}

#[tokio::test]
async fn test_tx_stats_ascending_with_skip() {
    let store = seeded_store();
    let (status, body) = get_json(&store, "/stats/txs?interval=hour&sort=asc&skip=1&limit=3").await;

    assert_eq!(status, StatusCode::OK);
    let list = body["list"].as_array().unwrap();
    assert_eq!(list.len(), 3);
    assert_eq!(list[0]["tx_count"], 2);
    assert_eq!(list[2]["tx_total"], 12);
}

#[tokio::test]
async fn test_fee_stats_are_decimal_strings() {
    let store = seeded_store();
    let min = hour(2).timestamp();
    let max = hour(3).timestamp();
    let (status, body) = get_json(
        &store,
        &format!(
            "/stats/fees?interval=hour&min_timestamp={}&max_timestamp={}&sort=asc",
            min, max
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["list"][0]["storage_fee"], "30");
    assert_eq!(body["list"][1]["storage_fee_total"], "400");
}

#[tokio::test]
async fn test_address_and_miner_stats() {
    let store = seeded_store();

    let (status, body) = get_json(&store, "/stats/addresses?interval=hour&limit=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["list"][0]["address_total"], 6);
    assert_eq!(body["list"][0]["address_active"], 2);

    let (status, body) = get_json(&store, "/stats/miners?interval=hour&limit=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["list"][0]["reward_amount"], "18446744073709551621");
}

#[tokio::test]
async fn test_other_interval_is_empty() {
    let store = seeded_store();
    let (status, body) = get_json(&store, "/stats/storage").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);
    assert!(body["list"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_limit_is_rejected() {
    let store = seeded_store();
    let (status, body) = get_json(&store, "/stats/storage?limit=5000").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "validation_error");
}

#[tokio::test]
async fn test_out_of_range_timestamp_is_rejected() {
    let store = seeded_store();
    let (status, body) = get_json(&store, "/stats/storage?max_timestamp=9223372036854775807").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "validation_error");
}

#[tokio::test]
async fn test_inverted_time_bounds_are_rejected() {
    let store = seeded_store();
    let (status, body) = get_json(
        &store,
        "/stats/miners?min_timestamp=1717300000&max_timestamp=1717200000",
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "validation_error");
}

#[tokio::test]
async fn test_summary_not_found_before_first_commit() {
    let store = Arc::new(MockIndexerStore::new());
    let (status, body) = get_json(&store, "/summary").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "not_found");
}

#[tokio::test]
async fn test_summary_reports_cursor() {
    let store = Arc::new(MockIndexerStore::new());
    store.set_cursor(SyncCursor {
        block_number: Some(1234),
        block_hash: Some("0xabc".to_string()),
        block_time: Some(hour(5)),
    });

    let (status, body) = get_json(&store, "/summary").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sync"]["block_number"], 1234);
    assert_eq!(body["sync"]["block_hash"], "0xabc");
    assert!(body["storage_fee_total"].is_null());
}

#[tokio::test]
async fn test_health_endpoints() {
    let store = Arc::new(MockIndexerStore::new());

    let (status, body) = get_json(&store, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "healthy");

    let (status, _) = get_json(&store, "/health/live").await;
    assert_eq!(status, StatusCode::OK);

    store.set_healthy(false);
    let (status, _) = get_json(&store, "/health/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_database_failure_maps_to_service_unavailable() {
    let store = Arc::new(MockIndexerStore::failing("connection refused"));
    let (status, body) = get_json(&store, "/stats/txs").await;

    assert!(status.is_server_error());
    assert!(body["error"]["type"].as_str().unwrap().ends_with("error"));
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let store = Arc::new(MockIndexerStore::new());
    let (status, body) = get_json(&store, "/api-docs/openapi.json").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/stats/storage"].is_object());
    assert!(body["paths"]["/summary"].is_object());
}
