//! Per-network binding sets.
//!
//! Every object keeps an independent [`BindingSet`] per network. One network
//! is active at a time, and the bare binding accessors read its sets.
//! The active values are also mirrored onto each target as hidden
//! properties, which is what privileged code sees when it bypasses the
//! membrane.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use jig_membrane::ErrorSource;
use jig_realm::heap::Property;
use jig_realm::{ObjectId, Realm, RealmResult};
use tracing::{debug, info};

use crate::binding::{BindingName, BindingSet, LifecycleState};

/// Binding sets keyed by network and proxy.
#[derive(Debug)]
pub struct BindingStore {
    sets: HashMap<(String, ObjectId), BindingSet>,
    active: String,
}

impl BindingStore {
    /// A store whose active network is `network`.
    #[must_use]
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            sets: HashMap::new(),
            active: network.into(),
        }
    }

    /// The network the bare accessors read.
    #[must_use]
    pub fn active_network(&self) -> &str {
        &self.active
    }

    /// Make `network` the active one; the most recent activation wins.
    /// Returns the previously active network.
    pub fn activate(&mut self, network: impl Into<String>) -> String {
        let network = network.into();
        info!(from = %self.active, to = %network, "activated network");
        std::mem::replace(&mut self.active, network)
    }

    /// The set of `id` on `network`, if it has one.
    #[must_use]
    pub fn get(&self, network: &str, id: ObjectId) -> Option<&BindingSet> {
        self.sets.get(&(network.to_owned(), id))
    }

    /// The set of `id` on the active network, if it has one.
    #[must_use]
    pub fn active(&self, id: ObjectId) -> Option<&BindingSet> {
        self.get(&self.active, id)
    }

    /// Mutable set of `id` on `network`, created empty on first use.
    pub fn entry(&mut self, network: &str, id: ObjectId) -> &mut BindingSet {
        self.sets.entry((network.to_owned(), id)).or_default()
    }

    /// Replace the set of `id` on `network`.
    pub fn put(&mut self, network: &str, id: ObjectId, set: BindingSet) {
        self.sets.insert((network.to_owned(), id), set);
    }

    /// Lifecycle of `id` on the active network.
    #[must_use]
    pub fn state(&self, id: ObjectId) -> LifecycleState {
        self.active(id).map_or(LifecycleState::Unsaved, BindingSet::state)
    }

    /// Objects with a set on `network`, in id order.
    #[must_use]
    pub fn objects(&self, network: &str) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self
            .sets
            .keys()
            .filter(|(n, _)| n == network)
            .map(|(_, id)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Mirror the active values of `proxy` onto its target.
    ///
    /// # Errors
    ///
    /// Fails if `proxy` does not belong to `realm`.
    pub fn project(&self, realm: &mut Realm, proxy: ObjectId) -> RealmResult<()> {
        let set = self.active(proxy).cloned().unwrap_or_default();
        let target = realm.resolve_target(proxy);
        let object = realm.object_mut(target)?;
        for name in BindingName::ALL {
            object
                .props
                .insert(name.as_str(), Property::hidden(set.raw(name)));
        }
        Ok(())
    }

    /// Mirror every object known on any network.
    ///
    /// # Errors
    ///
    /// Same as [`BindingStore::project`].
    pub fn project_all(&self, realm: &mut Realm) -> RealmResult<()> {
        let mut ids: Vec<ObjectId> = self.sets.keys().map(|(_, id)| *id).collect();
        ids.sort_unstable();
        ids.dedup();
        for id in &ids {
            self.project(realm, *id)?;
        }
        debug!(objects = ids.len(), network = %self.active, "projected bindings");
        Ok(())
    }
}

/// Shared handle onto a [`BindingStore`].
#[derive(Debug, Clone)]
pub struct Bindings(Rc<RefCell<BindingStore>>);

impl Bindings {
    /// A fresh store with `network` active.
    #[must_use]
    pub fn new(network: impl Into<String>) -> Self {
        Self(Rc::new(RefCell::new(BindingStore::new(network))))
    }

    /// Borrow the store.
    #[must_use]
    pub fn store(&self) -> std::cell::Ref<'_, BindingStore> {
        self.0.borrow()
    }

    /// Borrow the store mutably.
    #[must_use]
    pub fn store_mut(&self) -> std::cell::RefMut<'_, BindingStore> {
        self.0.borrow_mut()
    }

    /// Switch networks and re-mirror every object.
    ///
    /// # Errors
    ///
    /// Same as [`BindingStore::project_all`].
    pub fn activate(&self, realm: &mut Realm, network: &str) -> RealmResult<String> {
        let previous = self.0.borrow_mut().activate(network);
        self.0.borrow().project_all(realm)?;
        Ok(previous)
    }
}

impl ErrorSource for Bindings {
    fn error_reason(&self, _realm: &Realm, owner: ObjectId) -> Option<String> {
        self.0
            .borrow()
            .active(owner)
            .and_then(BindingSet::error_reason)
            .map(str::to_owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Binding;
    use crate::location::Location;
    use jig_realm::Value;

    #[test]
    fn test_activation_switches_views_without_touching_sets() {
        let mut realm = Realm::default();
        let id = realm.new_object();
        let bindings = Bindings::new("mock");
        bindings.store_mut().entry("mock", id).location = Binding::Bound(Location::output("aa", 0));
        bindings.store_mut().entry("test", id).location = Binding::Bound(Location::output("bb", 3));

        bindings.store().project(&mut realm, id).unwrap();
        assert_eq!(realm.raw_get(id, "location").unwrap(), Value::string("aa_o0"));

        assert_eq!(bindings.activate(&mut realm, "test").unwrap(), "mock");
        assert_eq!(realm.raw_get(id, "location").unwrap(), Value::string("bb_o3"));
        assert_eq!(bindings.store().state(id), LifecycleState::Confirmed);

        bindings.activate(&mut realm, "main").unwrap();
        assert_eq!(realm.raw_get(id, "location").unwrap(), Value::Undefined);
        assert_eq!(bindings.store().state(id), LifecycleState::Unsaved);

        bindings.activate(&mut realm, "mock").unwrap();
        assert_eq!(realm.raw_get(id, "location").unwrap(), Value::string("aa_o0"));
        assert_eq!(bindings.store().objects("test"), vec![id]);
    }

    #[test]
    fn test_error_source_reports_marker() {
        let realm = Realm::default();
        let id = ObjectId::new(1);
        let bindings = Bindings::new("mock");
        assert_eq!(bindings.error_reason(&realm, id), None);
        bindings.store_mut().entry("mock", id).location =
            Binding::Bound(Location::Error("no funds".to_owned()));
        assert_eq!(bindings.error_reason(&realm, id).as_deref(), Some("no funds"));
    }
}
