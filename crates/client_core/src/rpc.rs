use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use shared::{
    domain::{ObjectId, TransactionDigest},
    protocol::{
        ObjectData, ObjectDataOptions, ObjectResponse, SettlementEffects,
        TransactionBlockResponse,
    },
};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::LedgerClient;

const GET_OBJECT_METHOD: &str = "iota_getObject";
const GET_TRANSACTION_BLOCK_METHOD: &str = "iota_getTransactionBlock";
const DEFAULT_SETTLEMENT_POLL_ATTEMPTS: u32 = 30;
const DEFAULT_SETTLEMENT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("invalid rpc url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("rpc transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("rpc response for {method} carried neither result nor error")]
    MissingResult { method: &'static str },
    #[error("failed to decode {method} result: {source}")]
    Decode {
        method: &'static str,
        source: serde_json::Error,
    },
    #[error("transaction {digest} not settled after {attempts} polls")]
    SettlementTimeout {
        digest: TransactionDigest,
        attempts: u32,
    },
}

impl RpcError {
    /// Nodes answer lookups of not-yet-indexed transactions with an
    /// invalid-params error whose message names the missing item. The code
    /// alone also covers malformed requests, so only the message decides.
    pub fn is_not_found(&self) -> bool {
        match self {
            RpcError::Rpc { message, .. } => {
                let message = message.to_ascii_lowercase();
                message.contains("not found") || message.contains("could not find")
            }
            _ => false,
        }
    }
}

/// How long to poll for settlement before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_SETTLEMENT_POLL_ATTEMPTS,
            interval: DEFAULT_SETTLEMENT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// JSON-RPC 2.0 client for a ledger full node.
pub struct RpcLedgerClient {
    http: Client,
    endpoint: Url,
    retry: RetryPolicy,
    next_id: AtomicU64,
}

impl RpcLedgerClient {
    pub fn new(endpoint: &str, retry: RetryPolicy, timeout: Duration) -> Result<Self, RpcError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: Url::parse(endpoint)?,
            retry,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let response: RpcResponse = self
            .http
            .post(self.endpoint.clone())
            .json(&RpcRequest {
                jsonrpc: "2.0",
                id,
                method,
                params,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(RpcError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        let result = response.result.ok_or(RpcError::MissingResult { method })?;
        serde_json::from_value(result).map_err(|source| RpcError::Decode { method, source })
    }

    pub async fn get_object(
        &self,
        object_id: &ObjectId,
        options: ObjectDataOptions,
    ) -> Result<ObjectResponse, RpcError> {
        self.call(GET_OBJECT_METHOD, json!([object_id, options])).await
    }

    pub async fn get_transaction_block(
        &self,
        digest: &TransactionDigest,
    ) -> Result<TransactionBlockResponse, RpcError> {
        self.call(
            GET_TRANSACTION_BLOCK_METHOD,
            json!([digest, { "showEffects": true }]),
        )
        .await
    }

    pub async fn wait_for_transaction(
        &self,
        digest: &TransactionDigest,
    ) -> Result<TransactionBlockResponse, RpcError> {
        for attempt in 1..=self.retry.attempts {
            match self.get_transaction_block(digest).await {
                Ok(response) => {
                    info!(%digest, attempt, "rpc: transaction settled");
                    return Ok(response);
                }
                Err(err) if err.is_not_found() => {
                    debug!(%digest, attempt, "rpc: transaction not yet settled");
                    if attempt < self.retry.attempts {
                        tokio::time::sleep(self.retry.interval).await;
                    }
                }
                Err(err) => return Err(err),
            }
        }
        Err(RpcError::SettlementTimeout {
            digest: digest.clone(),
            attempts: self.retry.attempts,
        })
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn fetch_object(
        &self,
        object_id: &ObjectId,
        options: ObjectDataOptions,
    ) -> anyhow::Result<Option<ObjectData>> {
        let response = self.get_object(object_id, options).await?;
        if let Some(error) = &response.error {
            debug!(%object_id, %error, "rpc: object lookup returned an error descriptor");
        }
        Ok(response.data)
    }

    async fn await_settlement(
        &self,
        digest: &TransactionDigest,
    ) -> anyhow::Result<SettlementEffects> {
        Ok(self.wait_for_transaction(digest).await?.into())
    }
}

#[cfg(test)]
#[path = "tests/rpc_tests.rs"]
mod tests;
