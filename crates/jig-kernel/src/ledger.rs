//! The ledger collaborator and the transaction payload.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use thiserror::Error;

/// One published output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Output {
    /// A class or function.
    Deploy {
        /// Normalized source text.
        src: String,
        /// Xray JSON of the code's enumerable static properties.
        props: Json,
        /// Owner lock, when one was assigned.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        owner: Option<String>,
        /// Backing amount, when one was assigned.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        satoshis: Option<u64>,
    },
    /// A jig created or changed by an action.
    Jig {
        /// Location of the jig's class.
        class: String,
        /// Xray JSON of the jig's enumerable state.
        state: Json,
        /// Owner lock, when one was assigned.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        owner: Option<String>,
        /// Backing amount, when one was assigned.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        satoshis: Option<u64>,
    },
}

/// The document a batch publishes.
///
/// Locations inside `props` that start with `_` refer to outputs of the same
/// transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Network the transaction belongs to.
    pub network: String,
    /// Outputs in batch order.
    pub outputs: Vec<Output>,
}

impl Transaction {
    /// Canonical JSON: keys sorted, no whitespace.
    ///
    /// # Errors
    ///
    /// Only if serialization itself fails.
    pub fn canonical_json(&self) -> Result<String, serde_json::Error> {
        let value = serde_json::to_value(self)?;
        serde_json::to_string(&value)
    }
}

/// An unspent output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    /// `<txid>_o<index>`.
    pub location: String,
    /// Lock script or address.
    pub script: String,
    /// Backing amount.
    pub satoshis: u64,
}

/// Errors reported by a ledger. Messages are shown to callers unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The ledger refused the transaction.
    #[error("{0}")]
    Rejected(String),

    /// No transaction with this id.
    #[error("Transaction not found: {0}")]
    NotFound(String),

    /// The ledger could not be reached.
    #[error("{0}")]
    Unavailable(String),
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Where transactions are published and fetched from.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Publish `tx` and return its txid.
    async fn broadcast(&self, tx: &Transaction) -> LedgerResult<String>;

    /// The transaction with id `txid`.
    async fn fetch(&self, txid: &str) -> LedgerResult<Transaction>;

    /// Unspent outputs locked to `script`.
    async fn utxos(&self, script: &str) -> LedgerResult<Vec<Utxo>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transaction_json_shape() {
        let tx = Transaction {
            network: "mock".to_owned(),
            outputs: vec![Output::Deploy {
                src: "class A {}".to_owned(),
                props: json!({}),
                owner: None,
                satoshis: None,
            }],
        };
        assert_eq!(
            tx.canonical_json().unwrap(),
            r#"{"network":"mock","outputs":[{"kind":"deploy","props":{},"src":"class A {}"}]}"#
        );
        let back: Transaction = serde_json::from_str(&tx.canonical_json().unwrap()).unwrap();
        assert_eq!(back, tx);
    }

    #[test]
    fn test_jig_output_shape() {
        let output = Output::Jig {
            class: "_d0".to_owned(),
            state: json!({ "n": 1 }),
            owner: Some("alice".to_owned()),
            satoshis: None,
        };
        assert_eq!(
            serde_json::to_string(&serde_json::to_value(&output).unwrap()).unwrap(),
            r#"{"class":"_d0","kind":"jig","owner":"alice","state":{"n":1}}"#
        );
    }
}
