//! In-memory ledger.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use jig_kernel::{Ledger, LedgerError, LedgerResult, Output, Transaction, Utxo};
use tracing::debug;

/// Txid of `tx`: blake3 of its canonical JSON, hex encoded.
///
/// # Errors
///
/// Only if the transaction cannot be serialized.
pub fn txid_of(tx: &Transaction) -> LedgerResult<String> {
    let json = tx
        .canonical_json()
        .map_err(|e| LedgerError::Rejected(e.to_string()))?;
    Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
}

#[derive(Debug, Default)]
struct State {
    txs: HashMap<String, Transaction>,
    order: Vec<String>,
    failures: VecDeque<LedgerError>,
}

/// Ledger that keeps transactions in memory.
///
/// Queued failures are returned by the next broadcasts, one each.
#[derive(Debug, Clone, Default)]
pub struct MockLedger {
    state: Arc<Mutex<State>>,
}

impl MockLedger {
    /// An empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next broadcast fail with `message`.
    #[must_use]
    pub fn failing_with(self, message: impl Into<String>) -> Self {
        self.fail_next(message);
        self
    }

    /// Queue a broadcast failure.
    pub fn fail_next(&self, message: impl Into<String>) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.push_back(LedgerError::Rejected(message.into()));
        }
    }

    /// Number of accepted transactions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().map_or(0, |s| s.order.len())
    }

    /// Whether nothing has been accepted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Accepted txids in broadcast order.
    #[must_use]
    pub fn txids(&self) -> Vec<String> {
        self.state.lock().map(|s| s.order.clone()).unwrap_or_default()
    }

    /// An accepted transaction.
    #[must_use]
    pub fn transaction(&self, txid: &str) -> Option<Transaction> {
        self.state.lock().ok()?.txs.get(txid).cloned()
    }

    fn locked(&self) -> LedgerResult<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| LedgerError::Unavailable("mock ledger poisoned".to_owned()))
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn broadcast(&self, tx: &Transaction) -> LedgerResult<String> {
        let mut state = self.locked()?;
        if let Some(err) = state.failures.pop_front() {
            debug!(error = %err, "mock broadcast refused");
            return Err(err);
        }
        let txid = txid_of(tx)?;
        if state.txs.insert(txid.clone(), tx.clone()).is_none() {
            state.order.push(txid.clone());
        }
        debug!(%txid, outputs = tx.outputs.len(), "mock broadcast accepted");
        Ok(txid)
    }

    async fn fetch(&self, txid: &str) -> LedgerResult<Transaction> {
        self.locked()?
            .txs
            .get(txid)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(txid.to_owned()))
    }

    async fn utxos(&self, script: &str) -> LedgerResult<Vec<Utxo>> {
        let state = self.locked()?;
        let mut out = Vec::new();
        for txid in &state.order {
            let Some(tx) = state.txs.get(txid) else {
                continue;
            };
            for (index, output) in tx.outputs.iter().enumerate() {
                let (Output::Deploy { owner, satoshis, .. } | Output::Jig { owner, satoshis, .. }) = output;
                if owner.as_deref() == Some(script) {
                    out.push(Utxo {
                        location: format!("{txid}_o{index}"),
                        script: script.to_owned(),
                        satoshis: satoshis.unwrap_or(0),
                    });
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tx(src: &str, owner: Option<&str>) -> Transaction {
        Transaction {
            network: "mock".to_owned(),
            outputs: vec![Output::Deploy {
                src: src.to_owned(),
                props: json!({}),
                owner: owner.map(str::to_owned),
                satoshis: Some(5),
            }],
        }
    }

    #[tokio::test]
    async fn test_broadcast_then_fetch() {
        let ledger = MockLedger::new();
        let first = tx("class A {}", None);
        let txid = ledger.broadcast(&first).await.unwrap();
        assert_eq!(txid, txid_of(&first).unwrap());
        assert_eq!(txid.len(), 64);
        assert_eq!(ledger.fetch(&txid).await.unwrap(), first);
        assert!(matches!(
            ledger.fetch("missing").await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_queued_failures_are_returned_once() {
        let ledger = MockLedger::new().failing_with("Broadcast failed");
        let err = ledger.broadcast(&tx("class A {}", None)).await.unwrap_err();
        assert_eq!(err.to_string(), "Broadcast failed");
        assert!(ledger.is_empty());
        ledger.broadcast(&tx("class A {}", None)).await.unwrap();
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_utxos_by_owner() {
        let ledger = MockLedger::new();
        let txid = ledger.broadcast(&tx("class A {}", Some("alice"))).await.unwrap();
        ledger.broadcast(&tx("class B {}", Some("bob"))).await.unwrap();
        let utxos = ledger.utxos("alice").await.unwrap();
        assert_eq!(
            utxos,
            vec![Utxo {
                location: format!("{txid}_o0"),
                script: "alice".to_owned(),
                satoshis: 5,
            }]
        );
    }
}
