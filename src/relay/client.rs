//! reqwest-backed relay service client

use super::{RelayApi, RelayRequest, RelayStatus, TokenPairInfo};
use crate::config::RelayConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::types::BridgeTransaction;

use async_trait::async_trait;
use ethers::types::{Address, H256};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// JSON-over-HTTPS client for the relay service
#[derive(Debug, Clone)]
pub struct RelayClient {
    client: Client,
    base_url: String,
}

impl RelayClient {
    /// Create a new relay client
    pub fn new(config: &RelayConfig) -> BridgeResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| BridgeError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> BridgeResult<Option<T>> {
        let response = self.client.get(self.url(path)).query(query).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Relay {} returned 404 for {:?}", path, query);
            return Ok(None);
        }

        Ok(Some(Self::json(path, response).await?))
    }

    async fn json<T: DeserializeOwned>(path: &str, response: Response) -> BridgeResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BridgeError::RelayUnreachable(format!(
                "{} returned {}: {}",
                path, status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| BridgeError::RelayUnreachable(format!("{} decode: {}", path, e)))
    }
}

fn hex_address(address: Address) -> String {
    format!("{:?}", address)
}

#[async_trait]
impl RelayApi for RelayClient {
    async fn supported_tokens(&self) -> BridgeResult<Vec<TokenPairInfo>> {
        Ok(self.get("supported-tokens", &[]).await?.unwrap_or_default())
    }

    async fn token_mapping(&self, address: Address) -> BridgeResult<Option<TokenPairInfo>> {
        self.get("token-mapping", &[("address", hex_address(address))])
            .await
    }

    async fn request_relay(&self, request: &RelayRequest) -> BridgeResult<()> {
        let response = self
            .client
            .post(self.url("relay"))
            .json(request)
            .send()
            .await?;

        // 409 means the service already relayed this id
        let status = response.status();
        if status.is_success() || status == StatusCode::CONFLICT {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(BridgeError::RelayUnreachable(format!(
            "relay returned {}: {}",
            status, body
        )))
    }

    async fn transaction_status(&self, id: H256) -> BridgeResult<Option<RelayStatus>> {
        self.get("transaction-status", &[("id", format!("{:?}", id))])
            .await
    }

    async fn transactions(&self, address: Address) -> BridgeResult<Vec<BridgeTransaction>> {
        Ok(self
            .get("transactions", &[("address", hex_address(address))])
            .await?
            .unwrap_or_default())
    }

    async fn exitable_transactions(
        &self,
        address: Address,
    ) -> BridgeResult<Vec<BridgeTransaction>> {
        Ok(self
            .get("exitable-transactions", &[("address", hex_address(address))])
            .await?
            .unwrap_or_default())
    }

    async fn health(&self) -> BridgeResult<bool> {
        let response = self.client.get(self.url("health")).send().await?;
        Ok(response.status().is_success())
    }
}
