//! Address derivation strategies.
//!
//! - [`Create2Derivation`]: local EIP-1014 computation from a known
//!   init-code hash. No I/O.
//! - [`FactoryCallDerivation`]: asks the factory contract through a view call,
//!   for factories whose bytecode is not known ahead of time.

use alloy::primitives::{Address, B256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;

use crate::blockchain::{BlockchainClient, BlockchainError};
use crate::operation::abi::IAssetFactory;
use crate::prediction::PredictionError;

/// Turns (factory, sender, salt) into the address the factory will deploy to.
#[async_trait]
pub trait AddressDerivation: Send + Sync {
    async fn derive(
        &self,
        factory: Address,
        sender: Address,
        salt: B256,
    ) -> Result<Address, PredictionError>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy)]
pub struct Create2Derivation {
    init_code_hash: B256,
}

impl Create2Derivation {
    pub fn new(init_code_hash: B256) -> Self {
        Self { init_code_hash }
    }
}

#[async_trait]
impl AddressDerivation for Create2Derivation {
    async fn derive(
        &self,
        factory: Address,
        _sender: Address,
        salt: B256,
    ) -> Result<Address, PredictionError> {
        Ok(factory.create2(salt, self.init_code_hash))
    }

    fn name(&self) -> &'static str {
        "create2"
    }
}

#[derive(Debug, Clone)]
pub struct FactoryCallDerivation {
    client: BlockchainClient,
}

impl FactoryCallDerivation {
    pub fn new(client: BlockchainClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AddressDerivation for FactoryCallDerivation {
    async fn derive(
        &self,
        factory: Address,
        sender: Address,
        salt: B256,
    ) -> Result<Address, PredictionError> {
        let input = IAssetFactory::predictAddressCall {
            creator: sender,
            salt,
        }
        .abi_encode();

        let raw = self
            .client
            .call(factory, input.into())
            .await
            .map_err(|e| match e {
                // A revert means the factory refuses these inputs.
                BlockchainError::Node(msg) => PredictionError::MalformedInput(msg),
                other => PredictionError::Unavailable(other.to_string()),
            })?;

        if raw.len() < 32 {
            return Err(PredictionError::Unavailable(format!(
                "factory returned {} bytes, expected an address word",
                raw.len()
            )));
        }
        Ok(Address::from_word(B256::from_slice(&raw[..32])))
    }

    fn name(&self) -> &'static str {
        "factory_call"
    }
}
