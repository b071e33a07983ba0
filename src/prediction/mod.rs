//! Address prediction subsystem.
//!
//! # Data Flow
//! ```text
//! (factory, sender, CreationParams)
//!     → canonicalize params
//!     → salt = keccak256(sender ‖ canonical params)
//!     → derivation.rs (CREATE2 locally, or factory view call)
//!     → PredictedAddress
//! ```
//!
//! # Design Decisions
//! - Identical canonical inputs always yield the identical address
//! - The predicted address keys the off-chain record, so it must survive retries
//! - Network derivation is bounded by a deadline and reported as unavailable

pub mod derivation;
pub mod predictor;

use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::operation::{CanonicalParams, ParamError};
use crate::resilience::Retryable;

pub use derivation::{AddressDerivation, Create2Derivation, FactoryCallDerivation};
pub use predictor::AddressPredictor;

/// A predicted address with the inputs it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictedAddress {
    pub address: Address,
    pub factory: Address,
    pub sender: Address,
    pub params: CanonicalParams,
    pub salt: B256,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PredictionError {
    #[error("malformed prediction input: {0}")]
    MalformedInput(String),

    #[error("address prediction unavailable: {0}")]
    Unavailable(String),
}

impl From<ParamError> for PredictionError {
    fn from(err: ParamError) -> Self {
        PredictionError::MalformedInput(err.to_string())
    }
}

impl Retryable for PredictionError {
    fn is_retryable(&self) -> bool {
        matches!(self, PredictionError::Unavailable(_))
    }
}
