//! Batches: actions sharing one pending transaction.
//!
//! Members receive sequential temporary locations in enqueue order. The
//! batch then settles as a whole: [`Batch::confirm`] moves every member to
//! its confirmed location, [`Batch::fail`] moves every member to the error
//! state, and [`Batch::rollback`] restores what members had before they
//! joined. There is no partial outcome.

use jig_realm::{ObjectId, Realm};
use tracing::{info, warn};

use crate::binding::{Binding, BindingSet};
use crate::error::{BindingError, BindingResult};
use crate::location::{Location, TempKind};
use crate::store::Bindings;

#[derive(Debug, Clone)]
struct Member {
    proxy: ObjectId,
    temp: Location,
    previous: BindingSet,
}

/// A bracket of actions published together.
#[derive(Debug)]
pub struct Batch {
    network: String,
    members: Vec<Member>,
    open: bool,
}

impl Batch {
    /// Open a batch on `network`.
    #[must_use]
    pub fn begin(network: impl Into<String>) -> Self {
        let network = network.into();
        info!(%network, "batch begun");
        Self {
            network,
            members: Vec::new(),
            open: true,
        }
    }

    /// Network the batch publishes to.
    #[must_use]
    pub fn network(&self) -> &str {
        &self.network
    }

    /// Stop accepting members.
    pub fn end(&mut self) {
        self.open = false;
        info!(network = %self.network, members = self.members.len(), "batch ended");
    }

    /// Whether members can still be added.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Whether the batch has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in enqueue order.
    #[must_use]
    pub fn members(&self) -> Vec<ObjectId> {
        self.members.iter().map(|m| m.proxy).collect()
    }

    /// Temporary location of a member.
    #[must_use]
    pub fn temp_of(&self, proxy: ObjectId) -> Option<&Location> {
        self.members.iter().find(|m| m.proxy == proxy).map(|m| &m.temp)
    }

    /// Add `proxy` as the next output and give it a temporary location.
    /// Adding a member twice returns its existing location.
    ///
    /// # Errors
    ///
    /// [`BindingError::BatchClosed`] after [`Batch::end`], and
    /// [`BindingError::Errored`] for objects in the error state.
    pub fn enqueue(
        &mut self,
        bindings: &Bindings,
        realm: &mut Realm,
        proxy: ObjectId,
        kind: TempKind,
    ) -> BindingResult<Location> {
        if let Some(temp) = self.temp_of(proxy) {
            return Ok(temp.clone());
        }
        if !self.open {
            return Err(BindingError::BatchClosed);
        }
        let index = u32::try_from(self.members.len())
            .map_err(|_| BindingError::InvalidLocation("too many outputs".to_owned()))?;
        let temp = Location::Temporary { kind, index };

        let mut store = bindings.store_mut();
        let previous = store.get(&self.network, proxy).cloned().unwrap_or_default();
        if let Some(reason) = previous.error_reason() {
            return Err(BindingError::Errored(reason.to_owned()));
        }
        let mut next = previous.clone();
        next.location = Binding::Unbound(temp.clone());
        if next.origin.is_unset() {
            next.origin = Binding::Unbound(temp.clone());
        }
        let nonce = next.nonce.value().copied().unwrap_or(0);
        next.nonce = Binding::Unbound(nonce.saturating_add(1));
        store.put(&self.network, proxy, next);
        store.project(realm, proxy)?;

        info!(%proxy, location = %temp, "enqueued");
        self.members.push(Member {
            proxy,
            temp: temp.clone(),
            previous,
        });
        Ok(temp)
    }

    /// Settle every member at `<txid>_o<index>`.
    ///
    /// # Errors
    ///
    /// Only realm failures while re-projecting; the sets are updated first.
    pub fn confirm(
        self,
        bindings: &Bindings,
        realm: &mut Realm,
        txid: &str,
    ) -> BindingResult<Vec<(ObjectId, Location)>> {
        let mut store = bindings.store_mut();
        let mut settled = Vec::with_capacity(self.members.len());
        let updates: Vec<(ObjectId, BindingSet, Location)> = self
            .members
            .iter()
            .map(|m| {
                let index = m.temp.index().unwrap_or(0);
                let location = Location::output(txid, index);
                let mut set = store.get(&self.network, m.proxy).cloned().unwrap_or_default();
                set.location = Binding::Bound(location.clone());
                if set.origin.is_unbound() {
                    set.origin = Binding::Bound(location.clone());
                }
                set.nonce = set.nonce.bind();
                set.owner = set.owner.bind();
                set.satoshis = set.satoshis.bind();
                (m.proxy, set, location)
            })
            .collect();
        for (proxy, set, location) in updates {
            store.put(&self.network, proxy, set);
            settled.push((proxy, location));
        }
        for (proxy, _) in &settled {
            store.project(realm, *proxy)?;
        }
        info!(%txid, members = settled.len(), "batch confirmed");
        Ok(settled)
    }

    /// Move every member to the error state with `reason`.
    ///
    /// # Errors
    ///
    /// Only realm failures while re-projecting.
    pub fn fail(self, bindings: &Bindings, realm: &mut Realm, reason: &str) -> BindingResult<()> {
        let mut store = bindings.store_mut();
        for m in &self.members {
            let set = store.entry(&self.network, m.proxy);
            set.discarded = Some(m.temp.clone());
            set.location = Binding::Bound(Location::Error(reason.to_owned()));
        }
        for m in &self.members {
            store.project(realm, m.proxy)?;
        }
        warn!(network = %self.network, members = self.members.len(), %reason, "batch failed");
        Ok(())
    }

    /// Discard the temporary bindings of a batch that was never published.
    ///
    /// # Errors
    ///
    /// Only realm failures while re-projecting.
    pub fn rollback(self, bindings: &Bindings, realm: &mut Realm) -> BindingResult<()> {
        let mut store = bindings.store_mut();
        for m in self.members.iter().rev() {
            store.put(&self.network, m.proxy, m.previous.clone());
        }
        for m in &self.members {
            store.project(realm, m.proxy)?;
        }
        info!(network = %self.network, members = self.members.len(), "batch rolled back");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{BindingName, LifecycleState};
    use jig_realm::{RealmError, Value};

    fn objects(realm: &mut Realm, n: usize) -> Vec<ObjectId> {
        (0..n).map(|_| realm.new_object()).collect()
    }

    #[test]
    fn test_enqueue_order_and_confirm() {
        let mut realm = Realm::default();
        let bindings = Bindings::new("mock");
        let ids = objects(&mut realm, 2);
        let mut batch = Batch::begin("mock");
        assert_eq!(
            batch.enqueue(&bindings, &mut realm, ids[0], TempKind::Deploy).unwrap().to_string(),
            "_d0"
        );
        assert_eq!(
            batch.enqueue(&bindings, &mut realm, ids[1], TempKind::Output).unwrap().to_string(),
            "_o1"
        );
        assert_eq!(bindings.store().state(ids[0]), LifecycleState::Pending);
        batch.end();
        let late = realm.new_object();
        assert!(matches!(
            batch.enqueue(&bindings, &mut realm, late, TempKind::Output),
            Err(BindingError::BatchClosed)
        ));

        let settled = batch.confirm(&bindings, &mut realm, "ab12").unwrap();
        assert_eq!(settled[1].1.to_string(), "ab12_o1");
        let store = bindings.store();
        let set = store.active(ids[0]).unwrap();
        assert_eq!(set.read(BindingName::Location).unwrap(), Value::string("ab12_o0"));
        assert_eq!(set.read(BindingName::Origin).unwrap(), Value::string("ab12_o0"));
        assert_eq!(set.read(BindingName::Nonce).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn test_failure_is_atomic_and_keeps_discarded_indices() {
        let mut realm = Realm::default();
        let bindings = Bindings::new("mock");
        let ids = objects(&mut realm, 2);
        let mut batch = Batch::begin("mock");
        for id in &ids {
            batch.enqueue(&bindings, &mut realm, *id, TempKind::Deploy).unwrap();
        }
        batch.fail(&bindings, &mut realm, "insufficient funds").unwrap();

        for (i, id) in ids.iter().enumerate() {
            let store = bindings.store();
            let set = store.active(*id).unwrap();
            assert_eq!(set.state(), LifecycleState::Errored);
            assert_eq!(set.read(BindingName::Location).unwrap(), Value::Undefined);
            assert_eq!(set.read(BindingName::Origin).unwrap(), Value::Undefined);
            assert_eq!(realm.raw_get(*id, "location").unwrap(), Value::String(format!("_d{i}")));
        }

        let mut again = Batch::begin("mock");
        assert_eq!(
            again.enqueue(&bindings, &mut realm, ids[0], TempKind::Output),
            Err(BindingError::Errored("insufficient funds".to_owned()))
        );
    }

    #[test]
    fn test_rollback_restores_previous_sets() {
        let mut realm = Realm::default();
        let bindings = Bindings::new("mock");
        let id = realm.new_object();
        let mut first = Batch::begin("mock");
        first.enqueue(&bindings, &mut realm, id, TempKind::Deploy).unwrap();
        first.confirm(&bindings, &mut realm, "aa").unwrap();

        let mut second = Batch::begin("mock");
        second.enqueue(&bindings, &mut realm, id, TempKind::Output).unwrap();
        assert!(matches!(
            bindings.store().active(id).unwrap().read(BindingName::Location),
            Err(RealmError::Undetermined(_))
        ));
        second.rollback(&bindings, &mut realm).unwrap();
        let store = bindings.store();
        let set = store.active(id).unwrap();
        assert_eq!(set.read(BindingName::Location).unwrap(), Value::string("aa_o0"));
        assert_eq!(set.read(BindingName::Nonce).unwrap(), Value::Number(1.0));
    }
}
