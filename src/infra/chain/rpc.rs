//! Retry policy shared by the node clients, and the minimal JSON-RPC 2.0
//! transport used for the storage node.

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::domain::{AppError, ChainError};

/// Configuration for RPC clients
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: serde_json::Value,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Run `attempt`, retrying transient failures up to `config.max_retries` times
pub async fn with_retries<T, F, Fut>(
    config: &RpcClientConfig,
    method: &str,
    mut attempt: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut retries = 0;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && retries < config.max_retries => {
                retries += 1;
                warn!(attempt = retries, error = %e, method = %method, "RPC call failed");
                tokio::time::sleep(config.retry_delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

fn transport_error(err: reqwest::Error) -> AppError {
    if err.is_timeout() {
        AppError::Chain(ChainError::Timeout(err.to_string()))
    } else {
        AppError::Chain(ChainError::Connection(err.to_string()))
    }
}

/// JSON-RPC client over HTTP POST
#[derive(Debug, Clone)]
pub struct JsonRpcClient {
    url: String,
    http_client: reqwest::Client,
    config: RpcClientConfig,
}

impl JsonRpcClient {
    pub fn new(url: &str, config: RpcClientConfig) -> Result<Self, AppError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Chain(ChainError::Connection(e.to_string())))?;
        Ok(Self {
            url: url.to_string(),
            http_client,
            config,
        })
    }

    async fn send(&self, method: &str, params: &serde_json::Value) -> Result<serde_json::Value, AppError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };
        let response = self
            .http_client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Chain(ChainError::Connection(format!(
                "{} returned HTTP {}",
                method, status
            ))));
        }

        let body: JsonRpcResponse = response.json().await.map_err(|e| {
            AppError::Chain(ChainError::InvalidResponse(format!(
                "Failed to parse {} response: {}",
                method, e
            )))
        })?;

        if let Some(error) = body.error {
            return Err(AppError::Chain(ChainError::Rpc {
                code: error.code,
                message: error.message,
            }));
        }
        Ok(body.result)
    }

    /// Call `method`, retrying transient failures. A JSON `null` result maps to `None`.
    #[instrument(skip(self, params), fields(url = %self.url))]
    pub async fn call<R: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<R>, AppError> {
        let params = &params;
        let result = with_retries(&self.config, method, move || self.send(method, params)).await?;

        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result).map(Some).map_err(|e| {
            AppError::Chain(ChainError::InvalidResponse(format!(
                "Unexpected {} result: {}",
                method, e
            )))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(max_retries: u32) -> RpcClientConfig {
        RpcClientConfig {
            max_retries,
            retry_delay: Duration::from_millis(1),
            ..Default::default()
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = RpcClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_retries, 2);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let calls = &AtomicU32::new(0);
        let value = with_retries(&quick(2), "test", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(AppError::Chain(ChainError::Connection("down".into())))
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failures_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let err = with_retries(&quick(5), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(AppError::Chain(ChainError::RangeTooLarge("too many".into())))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Chain(ChainError::RangeTooLarge(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
