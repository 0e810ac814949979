//! Identity registry.
//!
//! Two maps give constant-time lookups in both directions between a proxy and
//! the object it guards. Realm ids are never reused, so entries never go
//! stale and no weak references are needed.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use jig_realm::ObjectId;
use tracing::trace;

use crate::error::{MembraneError, MembraneResult};

/// What a proxy stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyKind {
    /// A deployable class or function.
    Code,
    /// An instance created through a code proxy.
    Jig,
    /// An object reached through a jig or code, owned by `owner`.
    Inner {
        /// The jig or code proxy the object belongs to.
        owner: ObjectId,
    },
}

impl ProxyKind {
    /// Whether this proxy is a token (jig or code) rather than inner data.
    #[must_use]
    pub fn is_token(self) -> bool {
        matches!(self, Self::Code | Self::Jig)
    }
}

/// One registered proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    /// Guarded object.
    pub target: ObjectId,
    /// Role of the proxy.
    pub kind: ProxyKind,
}

/// Bidirectional proxy/target registry.
#[derive(Debug, Default)]
pub struct Registry {
    by_proxy: HashMap<ObjectId, Entry>,
    by_target: HashMap<ObjectId, ObjectId>,
}

/// Registry shared between the layers of every membrane in one realm.
pub type SharedRegistry = Rc<RefCell<Registry>>;

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty registry ready to share.
    #[must_use]
    pub fn shared() -> SharedRegistry {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Fail if `target` already has a proxy.
    ///
    /// # Errors
    ///
    /// [`MembraneError::DuplicateProxy`] when the target is taken and
    /// [`MembraneError::AlreadyProxy`] when the target is itself a proxy.
    pub fn ensure_free(&self, target: ObjectId) -> MembraneResult<()> {
        if self.by_target.contains_key(&target) {
            return Err(MembraneError::DuplicateProxy { target });
        }
        if self.by_proxy.contains_key(&target) {
            return Err(MembraneError::AlreadyProxy(target));
        }
        Ok(())
    }

    /// Record a new proxy/target pair.
    ///
    /// # Errors
    ///
    /// Same as [`Registry::ensure_free`].
    pub fn insert(&mut self, proxy: ObjectId, target: ObjectId, kind: ProxyKind) -> MembraneResult<()> {
        self.ensure_free(target)?;
        self.by_target.insert(target, proxy);
        self.by_proxy.insert(proxy, Entry { target, kind });
        trace!(%proxy, %target, ?kind, "registered membrane");
        Ok(())
    }

    /// The object behind `proxy`.
    #[must_use]
    pub fn lookup_target(&self, proxy: ObjectId) -> Option<ObjectId> {
        self.by_proxy.get(&proxy).map(|e| e.target)
    }

    /// The proxy guarding `target`.
    #[must_use]
    pub fn lookup_proxy(&self, target: ObjectId) -> Option<ObjectId> {
        self.by_target.get(&target).copied()
    }

    /// Full entry for `proxy`.
    #[must_use]
    pub fn entry(&self, proxy: ObjectId) -> Option<Entry> {
        self.by_proxy.get(&proxy).copied()
    }

    /// Role of `proxy`.
    #[must_use]
    pub fn kind(&self, proxy: ObjectId) -> Option<ProxyKind> {
        self.entry(proxy).map(|e| e.kind)
    }

    /// The jig or code a proxy's operations are attributed to: itself for
    /// tokens, its owner for inner objects.
    #[must_use]
    pub fn owner_of(&self, proxy: ObjectId) -> Option<ObjectId> {
        match self.kind(proxy)? {
            ProxyKind::Code | ProxyKind::Jig => Some(proxy),
            ProxyKind::Inner { owner } => Some(owner),
        }
    }

    /// Whether `proxy` is a jig or code proxy.
    #[must_use]
    pub fn is_token(&self, proxy: ObjectId) -> bool {
        self.kind(proxy).is_some_and(ProxyKind::is_token)
    }

    /// Every registered proxy of the given role, in id order.
    #[must_use]
    pub fn proxies_of(&self, wanted: impl Fn(ProxyKind) -> bool) -> Vec<ObjectId> {
        let mut out: Vec<ObjectId> = self
            .by_proxy
            .iter()
            .filter(|(_, e)| wanted(e.kind))
            .map(|(p, _)| *p)
            .collect();
        out.sort_unstable();
        out
    }

    /// Number of registered proxies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_proxy.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_proxy.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookups_are_inverse() {
        let mut registry = Registry::new();
        let (proxy, target) = (ObjectId::new(10), ObjectId::new(3));
        registry.insert(proxy, target, ProxyKind::Jig).unwrap();
        assert_eq!(registry.lookup_target(proxy), Some(target));
        assert_eq!(registry.lookup_proxy(target), Some(proxy));
        assert_eq!(registry.owner_of(proxy), Some(proxy));
    }

    #[test]
    fn test_second_proxy_for_target_is_rejected() {
        let mut registry = Registry::new();
        let target = ObjectId::new(1);
        registry.insert(ObjectId::new(2), target, ProxyKind::Code).unwrap();
        assert_eq!(
            registry.insert(ObjectId::new(3), target, ProxyKind::Code),
            Err(MembraneError::DuplicateProxy { target })
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_inner_objects_report_their_owner() {
        let mut registry = Registry::new();
        let jig = ObjectId::new(5);
        registry.insert(jig, ObjectId::new(4), ProxyKind::Jig).unwrap();
        registry
            .insert(ObjectId::new(7), ObjectId::new(6), ProxyKind::Inner { owner: jig })
            .unwrap();
        assert_eq!(registry.owner_of(ObjectId::new(7)), Some(jig));
        assert!(!registry.is_token(ObjectId::new(7)));
        assert_eq!(registry.proxies_of(ProxyKind::is_token), vec![jig]);
    }
}
