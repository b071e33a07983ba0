//! Ledger gateway over JSON-RPC.
//!
//! # Responsibilities
//! - Broadcast an operation's call data from the configured signer
//! - Translate receipts into [`ReceiptOutcome`]
//! - Separate node rejections from transient transport failures
//! - Report a send that timed out as ambiguous: the node may hold it

use alloy::primitives::TxHash;
use async_trait::async_trait;

use crate::blockchain::client::BlockchainClient;
use crate::blockchain::types::BlockchainError;
use crate::ledger::{LedgerError, LedgerGateway, ReceiptOutcome};
use crate::operation::Operation;

impl From<BlockchainError> for LedgerError {
    fn from(err: BlockchainError) -> Self {
        match err {
            BlockchainError::Node(msg) => LedgerError::Rejected(msg),
            BlockchainError::Wallet(msg) | BlockchainError::NotAvailable(msg) => {
                LedgerError::Rejected(msg)
            }
            err @ BlockchainError::ChainMismatch { .. } => LedgerError::Rejected(err.to_string()),
            err @ (BlockchainError::Rpc(_)
            | BlockchainError::Timeout(_)
            | BlockchainError::Decode(_)) => LedgerError::Unavailable(err.to_string()),
        }
    }
}

/// Classify a failed `eth_sendTransaction`. A timeout leaves the request
/// possibly delivered.
fn send_error(err: BlockchainError) -> LedgerError {
    match err {
        err @ BlockchainError::Timeout(_) => LedgerError::Ambiguous(err.to_string()),
        other => other.into(),
    }
}

/// [`LedgerGateway`] backed by a [`BlockchainClient`] with a signer.
#[derive(Debug, Clone)]
pub struct RpcLedger {
    client: BlockchainClient,
}

impl RpcLedger {
    pub fn new(client: BlockchainClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &BlockchainClient {
        &self.client
    }
}

#[async_trait]
impl LedgerGateway for RpcLedger {
    async fn submit(&self, operation: &Operation) -> Result<TxHash, LedgerError> {
        let hash = self
            .client
            .send_transaction(operation.sender, operation.target(), operation.calldata())
            .await
            .map_err(send_error)?;

        tracing::info!(
            tx_hash = %hash,
            kind = operation.kind_name(),
            target = %operation.target(),
            "Transaction broadcast"
        );
        Ok(hash)
    }

    async fn receipt(&self, hash: TxHash) -> Result<Option<ReceiptOutcome>, LedgerError> {
        let Some(receipt) = self.client.get_transaction_receipt(hash).await? else {
            return Ok(None);
        };

        if receipt.status() {
            Ok(Some(ReceiptOutcome::Success {
                block_number: receipt.block_number.unwrap_or_default(),
            }))
        } else {
            Ok(Some(ReceiptOutcome::Reverted {
                reason: format!(
                    "transaction reverted in block {}",
                    receipt.block_number.unwrap_or_default()
                ),
            }))
        }
    }
}
