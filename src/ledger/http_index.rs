//! HTTP client for the secondary index.
//!
//! `GET {base}/transactions/{hash}` answers 200 with the indexed transaction
//! once the indexer has processed its block, and 404 before that.

use alloy::primitives::TxHash;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::config::IndexConfig;
use crate::ledger::{IndexError, SecondaryIndex};

#[derive(Debug, Deserialize)]
struct IndexedTransaction {
    #[serde(rename = "blockNumber", alias = "block_number")]
    block_number: u64,
}

/// Indexer HTTP client.
#[derive(Clone)]
pub struct HttpIndex {
    client: Client,
    base_url: url::Url,
}

impl HttpIndex {
    pub fn new(config: &IndexConfig) -> Result<Self, IndexError> {
        let base_url = url::Url::parse(&config.base_url)
            .map_err(|e| IndexError::BadResponse(format!("invalid base URL: {}", e)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    fn transaction_url(&self, hash: TxHash) -> Result<url::Url, IndexError> {
        self.base_url
            .join(&format!("transactions/{}", hash))
            .map_err(|e| IndexError::BadResponse(e.to_string()))
    }
}

#[async_trait]
impl SecondaryIndex for HttpIndex {
    async fn is_indexed(&self, hash: TxHash) -> Result<bool, IndexError> {
        let url = self.transaction_url(hash)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => {
                let tx: IndexedTransaction = response
                    .json()
                    .await
                    .map_err(|e| IndexError::BadResponse(e.to_string()))?;
                tracing::debug!(tx_hash = %hash, block_number = tx.block_number, "Index caught up");
                Ok(true)
            }
            status if status.is_server_error() => {
                Err(IndexError::Unavailable(format!("index returned {}", status)))
            }
            status => Err(IndexError::BadResponse(format!("index returned {}", status))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_url() {
        let index = HttpIndex::new(&IndexConfig {
            base_url: "http://indexer.local/api/".into(),
            timeout_secs: 1,
        })
        .unwrap();
        let url = index.transaction_url(TxHash::repeat_byte(0xab)).unwrap();
        assert!(url.as_str().starts_with("http://indexer.local/api/transactions/0xabab"));
    }

    #[tokio::test]
    async fn test_unreachable_index_is_unavailable() {
        let index = HttpIndex::new(&IndexConfig {
            base_url: "http://127.0.0.1:1/".into(),
            timeout_secs: 1,
        })
        .unwrap();
        let err = index.is_indexed(TxHash::ZERO).await.unwrap_err();
        assert!(matches!(err, IndexError::Unavailable(_)));
    }
}
