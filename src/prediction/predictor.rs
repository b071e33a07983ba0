//! Address predictor.

use alloy::primitives::{Address, B256};
use std::sync::Arc;
use std::time::Duration;

use crate::blockchain::BlockchainClient;
use crate::config::PredictionConfig;
use crate::operation::{CanonicalParams, CreationParams};
use crate::prediction::derivation::{AddressDerivation, Create2Derivation, FactoryCallDerivation};
use crate::prediction::{PredictedAddress, PredictionError};
use crate::resilience::with_deadline;

/// Computes where a factory will deploy a resource before it is created.
#[derive(Clone)]
pub struct AddressPredictor {
    derivation: Arc<dyn AddressDerivation>,
    timeout: Duration,
}

impl AddressPredictor {
    pub fn new(derivation: Arc<dyn AddressDerivation>, timeout: Duration) -> Self {
        Self {
            derivation,
            timeout,
        }
    }

    /// Local CREATE2 derivation.
    pub fn create2(init_code_hash: B256) -> Self {
        Self::new(
            Arc::new(Create2Derivation::new(init_code_hash)),
            Duration::from_secs(10),
        )
    }

    /// CREATE2 when an init-code hash is configured, otherwise a factory view
    /// call through `client`.
    pub fn from_config(
        config: &PredictionConfig,
        client: Option<BlockchainClient>,
    ) -> Result<Self, PredictionError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let derivation: Arc<dyn AddressDerivation> = match (&config.init_code_hash, client) {
            (Some(hash), _) => {
                let hash: B256 = hash.parse().map_err(|e| {
                    PredictionError::MalformedInput(format!("init_code_hash: {}", e))
                })?;
                Arc::new(Create2Derivation::new(hash))
            }
            (None, Some(client)) => Arc::new(FactoryCallDerivation::new(client)),
            (None, None) => {
                return Err(PredictionError::Unavailable(
                    "no init_code_hash configured and no RPC client available".to_string(),
                ))
            }
        };
        Ok(Self::new(derivation, timeout))
    }

    /// Canonicalize `params` and predict the address.
    pub async fn predict(
        &self,
        factory: Address,
        sender: Address,
        params: &CreationParams,
    ) -> Result<PredictedAddress, PredictionError> {
        let canonical = params.canonicalize()?;
        self.predict_canonical(factory, sender, canonical).await
    }

    pub async fn predict_canonical(
        &self,
        factory: Address,
        sender: Address,
        params: CanonicalParams,
    ) -> Result<PredictedAddress, PredictionError> {
        if factory.is_zero() {
            return Err(PredictionError::MalformedInput(
                "factory address is zero".to_string(),
            ));
        }
        if sender.is_zero() {
            return Err(PredictionError::MalformedInput(
                "sender address is zero".to_string(),
            ));
        }

        let salt = params.salt_for(sender);
        let address = with_deadline(self.timeout, self.derivation.derive(factory, sender, salt))
            .await
            .map_err(|e| PredictionError::Unavailable(e.to_string()))??;

        tracing::debug!(
            factory = %factory,
            sender = %sender,
            predicted = %address,
            strategy = self.derivation.name(),
            "Address predicted"
        );

        Ok(PredictedAddress {
            address,
            factory,
            sender,
            params,
            salt,
        })
    }
}

impl std::fmt::Debug for AddressPredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressPredictor")
            .field("strategy", &self.derivation.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}
