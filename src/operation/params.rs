//! Creation parameters and their canonical form.
//!
//! Parameters arrive from forms as loosely formatted strings. Two parameter
//! sets that mean the same thing must produce the same bytes, because those
//! bytes feed both the predicted address and the operation fingerprint.
//!
//! Canonical rules:
//! - keys are trimmed and lowercased; duplicates after folding are rejected
//! - text is trimmed and inner whitespace runs collapse to one space
//! - numbers accept decimal (`_` separators allowed) or `0x` hex, stored as U256
//! - addresses are parsed and compared as 20 raw bytes (case-insensitive)

use alloy::primitives::{keccak256, Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    #[error("empty parameter key")]
    EmptyKey,

    #[error("parameter '{0}' appears more than once")]
    DuplicateKey(String),

    #[error("parameter '{key}' is not a valid integer: '{value}'")]
    InvalidNumber { key: String, value: String },

    #[error("parameter '{key}' is not a valid address: '{value}'")]
    InvalidAddress { key: String, value: String },
}

/// A raw, user-formatted parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
    Text(String),
    Number(String),
    Address(String),
    Bool(bool),
}

/// Parameters as supplied by the caller, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationParams {
    entries: Vec<(String, ParamValue)>,
}

impl CreationParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: ParamValue) -> Self {
        self.entries.push((key.into(), value));
        self
    }

    pub fn text(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(key, ParamValue::Text(value.into()))
    }

    pub fn number(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(key, ParamValue::Number(value.into()))
    }

    pub fn address(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(key, ParamValue::Address(value.into()))
    }

    pub fn flag(self, key: impl Into<String>, value: bool) -> Self {
        self.with(key, ParamValue::Bool(value))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Normalize into the canonical, order-independent form.
    pub fn canonicalize(&self) -> Result<CanonicalParams, ParamError> {
        let mut entries = BTreeMap::new();
        for (raw_key, raw_value) in &self.entries {
            let key = raw_key.trim().to_lowercase();
            if key.is_empty() {
                return Err(ParamError::EmptyKey);
            }
            let value = canonical_value(&key, raw_value)?;
            if entries.insert(key.clone(), value).is_some() {
                return Err(ParamError::DuplicateKey(key));
            }
        }
        Ok(CanonicalParams { entries })
    }
}

fn canonical_value(key: &str, value: &ParamValue) -> Result<CanonicalValue, ParamError> {
    match value {
        ParamValue::Text(s) => Ok(CanonicalValue::Text(
            s.split_whitespace().collect::<Vec<_>>().join(" "),
        )),
        ParamValue::Number(s) => parse_number(s)
            .map(CanonicalValue::Number)
            .ok_or_else(|| ParamError::InvalidNumber {
                key: key.to_string(),
                value: s.clone(),
            }),
        ParamValue::Address(s) => s
            .trim()
            .to_lowercase()
            .parse::<Address>()
            .map(CanonicalValue::Address)
            .map_err(|_| ParamError::InvalidAddress {
                key: key.to_string(),
                value: s.clone(),
            }),
        ParamValue::Bool(b) => Ok(CanonicalValue::Bool(*b)),
    }
}

fn parse_number(raw: &str) -> Option<U256> {
    let trimmed = raw.trim();
    let (digits, radix) = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => (hex.to_string(), 16),
        None => (trimmed.replace('_', ""), 10),
    };
    if digits.is_empty() {
        return None;
    }
    U256::from_str_radix(&digits, radix).ok()
}

/// A normalized parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CanonicalValue {
    Text(String),
    Number(U256),
    Address(Address),
    Bool(bool),
}

impl CanonicalValue {
    fn tag(&self) -> u8 {
        match self {
            CanonicalValue::Text(_) => 0x01,
            CanonicalValue::Number(_) => 0x02,
            CanonicalValue::Address(_) => 0x03,
            CanonicalValue::Bool(_) => 0x04,
        }
    }
}

impl fmt::Display for CanonicalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanonicalValue::Text(s) => write!(f, "{:?}", s),
            CanonicalValue::Number(n) => write!(f, "{}", n),
            CanonicalValue::Address(a) => write!(f, "{:#x}", a),
            CanonicalValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Canonical parameter set, sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalParams {
    entries: BTreeMap<String, CanonicalValue>,
}

impl CanonicalParams {
    pub fn get(&self, key: &str) -> Option<&CanonicalValue> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deterministic, length-prefixed binary encoding.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());
        for (key, value) in &self.entries {
            out.extend_from_slice(&(key.len() as u32).to_be_bytes());
            out.extend_from_slice(key.as_bytes());
            out.push(value.tag());
            match value {
                CanonicalValue::Text(s) => {
                    out.extend_from_slice(&(s.len() as u32).to_be_bytes());
                    out.extend_from_slice(s.as_bytes());
                }
                CanonicalValue::Number(n) => out.extend_from_slice(&n.to_be_bytes::<32>()),
                CanonicalValue::Address(a) => out.extend_from_slice(a.as_slice()),
                CanonicalValue::Bool(b) => out.push(u8::from(*b)),
            }
        }
        out
    }

    /// CREATE2 salt for a creation by `sender` with these parameters.
    pub fn salt_for(&self, sender: Address) -> B256 {
        let mut data = Vec::with_capacity(20 + 64);
        data.extend_from_slice(sender.as_slice());
        data.extend_from_slice(&self.encode());
        keccak256(&data)
    }
}

impl fmt::Display for CanonicalParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ";")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    #[test]
    fn test_formatting_differences_fold() {
        let a = CreationParams::new()
            .text("Name", "  Green   Bond 2030 ")
            .number("supply", "1_000_000")
            .address("issuer", ISSUER)
            .canonicalize()
            .unwrap();
        let b = CreationParams::new()
            .address(" ISSUER ", ISSUER.to_lowercase())
            .number("SUPPLY", "0xF4240")
            .text("name", "Green Bond 2030")
            .canonicalize()
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.encode(), b.encode());
    }

    #[test]
    fn test_text_case_is_significant() {
        let a = CreationParams::new().text("symbol", "GB30").canonicalize().unwrap();
        let b = CreationParams::new().text("symbol", "gb30").canonicalize().unwrap();
        assert_ne!(a.encode(), b.encode());
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let err = CreationParams::new()
            .text("name", "a")
            .text("NAME", "b")
            .canonicalize()
            .unwrap_err();
        assert_eq!(err, ParamError::DuplicateKey("name".into()));
    }

    #[test]
    fn test_invalid_values() {
        let err = CreationParams::new().number("supply", "1.5").canonicalize().unwrap_err();
        assert!(matches!(err, ParamError::InvalidNumber { .. }));

        let err = CreationParams::new().address("issuer", "0x12").canonicalize().unwrap_err();
        assert!(matches!(err, ParamError::InvalidAddress { .. }));

        let err = CreationParams::new().flag("  ", true).canonicalize().unwrap_err();
        assert_eq!(err, ParamError::EmptyKey);
    }

    #[test]
    fn test_salt_depends_on_sender() {
        let params = CreationParams::new().text("name", "x").canonicalize().unwrap();
        assert_ne!(params.salt_for(Address::ZERO), params.salt_for(Address::repeat_byte(1)));
        assert_eq!(params.salt_for(Address::ZERO), params.salt_for(Address::ZERO));
    }

    #[test]
    fn test_display() {
        let params = CreationParams::new()
            .number("supply", "0010")
            .flag("transferable", true)
            .canonicalize()
            .unwrap();
        assert_eq!(params.to_string(), "supply=10;transferable=true");
    }
}
