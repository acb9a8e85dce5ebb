//! Transaction payload values.
//!
//! The ledger attaches no meaning to a transaction: it is an opaque value
//! that gets aggregated into a block's merkle root. Arbitrary serializable
//! data is reduced to canonical JSON text so that two equal values always
//! produce the same leaf bytes.

use crate::hash::{Hash, HashFunction};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur while building a transaction.
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("payload is not representable as JSON: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A single transaction payload, stored as canonical text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transaction(String);

impl Transaction {
    /// Create a transaction from raw text.
    pub fn new(data: impl Into<String>) -> Self {
        Self(data.into())
    }

    /// Encode any serializable value as a transaction.
    ///
    /// The value is routed through `serde_json::Value`, whose maps are
    /// ordered by key, so insertion order of a `HashMap` never leaks into
    /// the encoding.
    pub fn encode<T: Serialize>(value: &T) -> Result<Self, TransactionError> {
        let value = serde_json::to_value(value)?;
        Ok(Self(serde_json::to_string(&value)?))
    }

    /// Decode the payload back into a typed value.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, TransactionError> {
        Ok(serde_json::from_str(&self.0)?)
    }

    /// The payload text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The leaf bytes used for merkle aggregation.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Digest of this transaction.
    pub fn digest<H: HashFunction>(&self, hasher: &H) -> Hash {
        hasher.digest(self.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for Transaction {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl From<&str> for Transaction {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Transaction {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Sha256;
    use std::collections::HashMap;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Transfer {
        from: String,
        to: String,
        amount: u64,
    }

    #[test]
    fn test_raw_text() {
        let tx = Transaction::new("tx1");
        assert_eq!(tx.as_str(), "tx1");
        assert_eq!(tx.as_bytes(), b"tx1");
        assert_eq!(tx.digest(&Sha256), crate::hash::hash(b"tx1"));
    }

    #[test]
    fn test_encode_sorts_keys() {
        let mut a = HashMap::new();
        let mut b = HashMap::new();
        for (k, v) in [("zeta", 1), ("alpha", 2), ("mid", 3)] {
            a.insert(k, v);
        }
        for (k, v) in [("mid", 3), ("zeta", 1), ("alpha", 2)] {
            b.insert(k, v);
        }

        let ta = Transaction::encode(&a).unwrap();
        let tb = Transaction::encode(&b).unwrap();
        assert_eq!(ta, tb);
        assert_eq!(ta.as_str(), r#"{"alpha":2,"mid":3,"zeta":1}"#);
    }

    #[test]
    fn test_encode_decode_struct() {
        let transfer = Transfer {
            from: "alice".into(),
            to: "bob".into(),
            amount: 5,
        };
        let tx = Transaction::encode(&transfer).unwrap();
        assert_eq!(tx.decode::<Transfer>().unwrap(), transfer);
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let tx = Transaction::from("hello");
        assert_eq!(serde_json::to_string(&tx).unwrap(), "\"hello\"");
    }
}
