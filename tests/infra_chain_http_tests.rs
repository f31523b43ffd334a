//! HTTP-based integration tests for the chain node and storage node clients.
//!
//! Uses `wiremock` to stand in for the JSON-RPC endpoints.

use std::time::Duration;

use serde_json::{Value, json};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, method},
};

use storage_scan_indexer::domain::events::to_hex;
use storage_scan_indexer::domain::{
    AppError, ChainError, ChainNode, EventKind, FinalityOracle, LogFilter,
};
use storage_scan_indexer::infra::{EvmRpcClient, RpcClientConfig, StorageNodeClient};

fn fast_config(max_retries: u32) -> RpcClientConfig {
    RpcClientConfig {
        timeout: Duration::from_secs(5),
        max_retries,
        retry_delay: Duration::from_millis(10),
    }
}

fn rpc_result(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": result
    }))
}

fn rpc_block(number: u64) -> Value {
    let zero_hash = format!("0x{}", "00".repeat(32));
    json!({
        "number": format!("0x{:x}", number),
        "hash": format!("0x{:064X}", number),
        "parentHash": format!("0x{:064x}", number - 1),
        "timestamp": "0x665a6c00",
        "sha3Uncles": zero_hash,
        "stateRoot": zero_hash,
        "transactionsRoot": zero_hash,
        "receiptsRoot": zero_hash,
        "mixHash": zero_hash,
        "miner": "0x0000000000000000000000000000000000000000",
        "logsBloom": format!("0x{}", "00".repeat(256)),
        "gasUsed": "0x0",
        "gasLimit": "0x1c9c380",
        "difficulty": "0x0",
        "totalDifficulty": "0x0",
        "extraData": "0x",
        "nonce": "0x0000000000000000",
        "size": "0x220",
        "uncles": [],
        "transactions": []
    })
}

fn rpc_log(block: u64, log_index: u64, removed: bool) -> Value {
    json!({
        "address": "0x00000000000000000000000000000000000000F1",
        "topics": [to_hex(&EventKind::DataUpload.topic())],
        "data": format!("0x{}", "00".repeat(96)),
        "blockNumber": format!("0x{:x}", block),
        "blockHash": format!("0x{:064x}", block),
        "transactionHash": format!("0x{:064x}", block * 10 + log_index),
        "transactionIndex": "0x0",
        "logIndex": format!("0x{:x}", log_index),
        "removed": removed
    })
}

mod evm_client_tests {
    use super::*;

    #[tokio::test]
    async fn test_head_block_parses_latest() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "eth_getBlockByNumber",
                "params": ["latest", false]
            })))
            .respond_with(rpc_result(rpc_block(0x1b4)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = EvmRpcClient::new(&mock_server.uri(), fast_config(0)).unwrap();
        let head = client.head_block().await.unwrap();

        assert_eq!(head.number, 436);
        assert_eq!(head.hash, format!("0x{:064x}", 436));
        assert_eq!(head.parent_hash, format!("0x{:064x}", 435));
        assert_eq!(head.timestamp.timestamp(), 0x665a_6c00);
    }

    #[tokio::test]
    async fn test_block_header_requests_hex_quantity() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "eth_getBlockByNumber",
                "params": ["0x10", false]
            })))
            .respond_with(rpc_result(rpc_block(16)))
            .mount(&mock_server)
            .await;

        let client = EvmRpcClient::new(&mock_server.uri(), fast_config(0)).unwrap();
        let header = client.block_header(16).await.unwrap().unwrap();

        assert_eq!(header.number, 16);
    }

    #[tokio::test]
    async fn test_block_header_beyond_head_is_none() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(rpc_result(Value::Null))
            .mount(&mock_server)
            .await;

        let client = EvmRpcClient::new(&mock_server.uri(), fast_config(0)).unwrap();
        assert!(client.block_header(999).await.unwrap().is_none());

        // A missing latest block is never valid
        let err = client.head_block().await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Chain(ChainError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_logs_skips_removed_and_sorts() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "eth_getLogs",
                "params": [{
                    "fromBlock": "0xa",
                    "toBlock": "0xc",
                    "address": ["0x00000000000000000000000000000000000000f1"]
                }]
            })))
            .respond_with(rpc_result(json!([
                rpc_log(12, 0, false),
                rpc_log(10, 3, false),
                rpc_log(10, 1, false),
                rpc_log(11, 0, true),
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = EvmRpcClient::new(&mock_server.uri(), fast_config(0)).unwrap();
        let filter = LogFilter {
            from_block: 10,
            to_block: 12,
            addresses: vec!["0x00000000000000000000000000000000000000f1".to_string()],
            topics: EventKind::ALL.iter().map(|k| k.topic()).collect(),
        };
        let logs = client.fetch_logs(&filter).await.unwrap();

        let order: Vec<(u64, u64)> = logs.iter().map(|l| (l.block_number, l.log_index)).collect();
        assert_eq!(order, vec![(10, 1), (10, 3), (12, 0)]);
        assert_eq!(logs[0].address, "0x00000000000000000000000000000000000000f1");
        assert_eq!(logs[0].topics[0], EventKind::DataUpload.topic());
        assert_eq!(logs[0].data.len(), 96);
    }

    #[tokio::test]
    async fn test_rpc_error_is_reported() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32005, "message": "query returned more than 10000 results"}
            })))
            .mount(&mock_server)
            .await;

        let client = EvmRpcClient::new(&mock_server.uri(), fast_config(0)).unwrap();
        let err = client.head_block().await.unwrap_err();

        match err {
            AppError::Chain(ChainError::Rpc { code, message }) => {
                assert_eq!(code, -32005);
                assert!(message.contains("10000"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_failure_is_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .respond_with(rpc_result(rpc_block(5)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = EvmRpcClient::new(&mock_server.uri(), fast_config(2)).unwrap();
        let head = client.head_block().await.unwrap();

        assert_eq!(head.number, 5);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&mock_server)
            .await;

        let client = EvmRpcClient::new(&mock_server.uri(), fast_config(1)).unwrap();
        let err = client.head_block().await.unwrap_err();

        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_non_json_body_is_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .expect(3)
            .mount(&mock_server)
            .await;

        let client = EvmRpcClient::new(&mock_server.uri(), fast_config(2)).unwrap();
        let err = client.head_block().await.unwrap_err();

        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_mistyped_result_is_invalid_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(rpc_result(json!("0x5")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = EvmRpcClient::new(&mock_server.uri(), fast_config(2)).unwrap();
        let err = client.head_block().await.unwrap_err();

        assert!(matches!(
            err,
            AppError::Chain(ChainError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_log_query_is_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "eth_getLogs"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32005, "message": "query returned more than 10000 results"}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = EvmRpcClient::new(&mock_server.uri(), fast_config(3)).unwrap();
        let filter = LogFilter {
            from_block: 1,
            to_block: 50_000,
            addresses: vec![],
            topics: vec![],
        };
        let err = client.fetch_logs(&filter).await.unwrap_err();

        assert!(matches!(
            err,
            AppError::Chain(ChainError::RangeTooLarge(_))
        ));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_rate_limited_log_query_is_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32005, "message": "rate limit exceeded"}
            })))
            .up_to_n_times(1)
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .respond_with(rpc_result(json!([rpc_log(3, 0, false)])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = EvmRpcClient::new(&mock_server.uri(), fast_config(1)).unwrap();
        let filter = LogFilter {
            from_block: 1,
            to_block: 5,
            addresses: vec![],
            topics: vec![],
        };
        let logs = client.fetch_logs(&filter).await.unwrap();

        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].block_number, 3);
    }
}

mod storage_node_tests {
    use super::*;

    #[tokio::test]
    async fn test_file_info_finalized() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "zgs_getFileInfoByTxSeq",
                "params": [42]
            })))
            .respond_with(rpc_result(json!({
                "tx": {"seq": 42},
                "finalized": true,
                "isCached": false,
                "uploadedSegNum": 8
            })))
            .mount(&mock_server)
            .await;

        let client = StorageNodeClient::new(&mock_server.uri(), fast_config(0)).unwrap();
        let info = client.file_info(42).await.unwrap().unwrap();

        assert!(info.finalized);
        assert_eq!(info.uploaded_seg_num, 8);
    }

    #[tokio::test]
    async fn test_unknown_file_is_none() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(rpc_result(Value::Null))
            .mount(&mock_server)
            .await;

        let client = StorageNodeClient::new(&mock_server.uri(), fast_config(0)).unwrap();
        assert!(client.file_info(7).await.unwrap().is_none());
    }
}
