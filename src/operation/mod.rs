//! Ledger-backed write operations.
//!
//! An [`Operation`] is a user intent bound to a sender. Its
//! [`OperationFingerprint`] is what a challenge response is issued against,
//! so two operations share a fingerprint only if they would produce the same
//! ledger call.

pub mod abi;
pub mod params;

use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use alloy::sol_types::SolCall;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use params::{CanonicalParams, CanonicalValue, CreationParams, ParamError, ParamValue};

use abi::{IAssetControl, IAssetFactory};

const FINGERPRINT_DOMAIN: &[u8] = b"issuance-core/operation/v1";

/// Hash identifying exactly one logical operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationFingerprint(pub B256);

impl fmt::Display for OperationFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the operation does on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationKind {
    /// Deploy a new asset through a factory.
    Create {
        factory: Address,
        params: CanonicalParams,
    },
    /// Freeze part of an account's balance.
    Freeze {
        asset: Address,
        account: Address,
        amount: U256,
    },
    /// Grant an access-control role on an asset.
    GrantRole {
        asset: Address,
        role: B256,
        account: Address,
    },
}

/// An operation bound to the wallet that will send it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub sender: Address,
    pub kind: OperationKind,
}

impl Operation {
    pub fn create(factory: Address, sender: Address, params: CanonicalParams) -> Self {
        Self {
            sender,
            kind: OperationKind::Create { factory, params },
        }
    }

    pub fn freeze(asset: Address, sender: Address, account: Address, amount: U256) -> Self {
        Self {
            sender,
            kind: OperationKind::Freeze {
                asset,
                account,
                amount,
            },
        }
    }

    pub fn grant_role(asset: Address, sender: Address, role: B256, account: Address) -> Self {
        Self {
            sender,
            kind: OperationKind::GrantRole {
                asset,
                role,
                account,
            },
        }
    }

    /// Short name used for config overrides, logs and metrics.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            OperationKind::Create { .. } => "create",
            OperationKind::Freeze { .. } => "freeze",
            OperationKind::GrantRole { .. } => "grant_role",
        }
    }

    /// Contract the transaction is sent to.
    pub fn target(&self) -> Address {
        match &self.kind {
            OperationKind::Create { factory, .. } => *factory,
            OperationKind::Freeze { asset, .. } | OperationKind::GrantRole { asset, .. } => *asset,
        }
    }

    /// Fingerprint over every input that shapes the ledger call.
    ///
    /// For creations this is (factory, sender, canonical params), never the
    /// predicted address, so it survives re-prediction.
    pub fn fingerprint(&self) -> OperationFingerprint {
        let mut data = Vec::with_capacity(128);
        data.extend_from_slice(FINGERPRINT_DOMAIN);
        data.extend_from_slice(self.kind_name().as_bytes());
        data.extend_from_slice(self.sender.as_slice());
        match &self.kind {
            OperationKind::Create { factory, params } => {
                data.extend_from_slice(factory.as_slice());
                data.extend_from_slice(&params.encode());
            }
            OperationKind::Freeze {
                asset,
                account,
                amount,
            } => {
                data.extend_from_slice(asset.as_slice());
                data.extend_from_slice(account.as_slice());
                data.extend_from_slice(&amount.to_be_bytes::<32>());
            }
            OperationKind::GrantRole {
                asset,
                role,
                account,
            } => {
                data.extend_from_slice(asset.as_slice());
                data.extend_from_slice(role.as_slice());
                data.extend_from_slice(account.as_slice());
            }
        }
        OperationFingerprint(keccak256(&data))
    }

    /// ABI-encoded call data for the target contract.
    pub fn calldata(&self) -> Bytes {
        let encoded = match &self.kind {
            OperationKind::Create { params, .. } => IAssetFactory::createCall {
                salt: params.salt_for(self.sender),
                params: Bytes::from(params.encode()),
            }
            .abi_encode(),
            OperationKind::Freeze {
                account, amount, ..
            } => IAssetControl::freezeCall {
                account: *account,
                amount: *amount,
            }
            .abi_encode(),
            OperationKind::GrantRole { role, account, .. } => IAssetControl::grantRoleCall {
                role: *role,
                account: *account,
            }
            .abi_encode(),
        };
        Bytes::from(encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(supply: &str) -> CanonicalParams {
        CreationParams::new()
            .text("name", "Bond")
            .number("supply", supply)
            .canonicalize()
            .unwrap()
    }

    #[test]
    fn test_fingerprint_stable_under_formatting() {
        let factory = Address::repeat_byte(0xfa);
        let sender = Address::repeat_byte(0x01);
        let a = Operation::create(factory, sender, params("1000"));
        let b = Operation::create(factory, sender, params("1_000"));
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_distinguishes_inputs() {
        let factory = Address::repeat_byte(0xfa);
        let sender = Address::repeat_byte(0x01);
        let base = Operation::create(factory, sender, params("1000"));
        let other_amount = Operation::create(factory, sender, params("1001"));
        let other_sender = Operation::create(factory, Address::repeat_byte(0x02), params("1000"));
        assert_ne!(base.fingerprint(), other_amount.fingerprint());
        assert_ne!(base.fingerprint(), other_sender.fingerprint());
    }

    #[test]
    fn test_freeze_and_grant_differ() {
        let asset = Address::repeat_byte(0xaa);
        let sender = Address::repeat_byte(0x01);
        let freeze = Operation::freeze(asset, sender, Address::ZERO, U256::ZERO);
        let grant = Operation::grant_role(asset, sender, B256::ZERO, Address::ZERO);
        assert_ne!(freeze.fingerprint(), grant.fingerprint());
        assert_eq!(freeze.target(), asset);
        assert_eq!(grant.kind_name(), "grant_role");
    }

    #[test]
    fn test_calldata_selector() {
        let asset = Address::repeat_byte(0xaa);
        let op = Operation::freeze(asset, Address::ZERO, Address::repeat_byte(2), U256::from(5));
        let data = op.calldata();
        assert_eq!(&data[..4], IAssetControl::freezeCall::SELECTOR.as_slice());
        assert_eq!(data.len(), 4 + 64);
    }
}
