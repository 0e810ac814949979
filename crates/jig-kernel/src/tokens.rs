//! Xray hooks backed by the kernel's bindings.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use jig_bindings::{Batch, Binding, BindingSet, Bindings, Location, TempKind};
use jig_membrane::{Membrane, ProxyKind};
use jig_realm::{ObjectId, Realm, Value};
use jig_xray::{Checkpoint, Deployer, TokenLoader, TokenSaver, XrayError, XrayResult};
use tracing::debug;

/// Saves a token as its location on one network. Pending tokens save as
/// their temporary location.
#[derive(Debug, Clone)]
pub(crate) struct BindingSaver {
    pub(crate) bindings: Bindings,
    pub(crate) network: String,
}

impl TokenSaver for BindingSaver {
    fn save(&self, realm: &Realm, token: ObjectId) -> XrayResult<String> {
        let store = self.bindings.store();
        let location = store
            .get(&self.network, token)
            .and_then(|set| match &set.location {
                Binding::Unbound(l) | Binding::Bound(l) => Some(l.clone()),
                Binding::Unset => None,
            });
        match location {
            Some(Location::Error(reason)) => Err(XrayError::Token(reason)),
            Some(location) => Ok(location.to_string()),
            None => Err(XrayError::Token(format!(
                "{} is not deployed",
                realm.type_name(&Value::Object(token))
            ))),
        }
    }
}

/// Locations already loaded into this kernel.
pub(crate) type Loaded = Rc<RefCell<HashMap<String, ObjectId>>>;

/// Resolves `$ref` through [`Loaded`]. Temporary locations are read relative
/// to `txid`.
#[derive(Debug, Clone)]
pub(crate) struct CacheLoader {
    pub(crate) loaded: Loaded,
    pub(crate) txid: String,
}

impl CacheLoader {
    pub(crate) fn absolute(&self, location: &str) -> XrayResult<String> {
        let parsed = Location::parse(location).map_err(|e| XrayError::Token(e.to_string()))?;
        Ok(match parsed {
            Location::Temporary { index, .. } => Location::output(&self.txid, index).to_string(),
            other => other.to_string(),
        })
    }
}

impl TokenLoader for CacheLoader {
    fn load(&self, _realm: &mut Realm, location: &str) -> XrayResult<Value> {
        let absolute = self.absolute(location)?;
        self.loaded
            .borrow()
            .get(&absolute)
            .map(|id| Value::Object(*id))
            .ok_or_else(|| XrayError::Token(format!("Nothing loaded at {absolute}")))
    }
}

/// Saves tokens by heap identity. Used for snapshots that never leave the
/// kernel, so a jig whose references are not yet published can still be
/// captured and restored.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct HeapTokens;

const HEAP_PREFIX: &str = "heap://";

impl TokenSaver for HeapTokens {
    fn save(&self, _realm: &Realm, token: ObjectId) -> XrayResult<String> {
        Ok(format!("{HEAP_PREFIX}{}", token.raw()))
    }
}

impl TokenLoader for HeapTokens {
    fn load(&self, _realm: &mut Realm, location: &str) -> XrayResult<Value> {
        location
            .strip_prefix(HEAP_PREFIX)
            .and_then(|raw| raw.parse::<u32>().ok())
            .map(|raw| Value::Object(ObjectId::new(raw)))
            .ok_or_else(|| XrayError::Token(format!("Not a heap location: {location}")))
    }
}

/// The batch under construction, shared with [`Scheduler`].
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    pub(crate) batch: Option<Batch>,
    /// Opened by a deploy or action outside [`crate::Kernel::begin`].
    pub(crate) implicit: bool,
    pub(crate) staged: Vec<Staged>,
    /// Each jig as it was before it first joined the batch.
    pub(crate) undo: Vec<Snapshot>,
}

/// A jig's state and bindings at one point in time.
#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    pub(crate) jig: ObjectId,
    pub(crate) state: Checkpoint,
    pub(crate) bindings: Option<BindingSet>,
}

/// One member's payload.
#[derive(Debug, Clone)]
pub(crate) struct Staged {
    pub(crate) proxy: ObjectId,
    pub(crate) payload: Payload,
}

/// What a member publishes.
#[derive(Debug, Clone)]
pub(crate) enum Payload {
    /// Captured at deploy time.
    Code { src: String, props: serde_json::Value },
    /// Captured after the action that last changed the jig.
    Jig { class: String, state: serde_json::Value },
}

/// Deploys classes that a checkpoint finds without a code proxy.
pub(crate) struct Scheduler {
    pub(crate) membrane: Rc<Membrane>,
    pub(crate) bindings: Bindings,
    pub(crate) outbox: Rc<RefCell<Outbox>>,
}

impl Deployer for Scheduler {
    fn deploy(&self, realm: &mut Realm, class: ObjectId) -> XrayResult<()> {
        let existing = self.membrane.registry().borrow().lookup_proxy(class);
        let proxy = match existing {
            Some(proxy) => proxy,
            None => self
                .membrane
                .wrap(realm, class, ProxyKind::Code)
                .map_err(|e| XrayError::Token(e.to_string()))?,
        };
        let mut outbox = self.outbox.borrow_mut();
        let Some(batch) = outbox.batch.as_mut() else {
            return Err(XrayError::Token("No batch is open".to_owned()));
        };
        let temp = batch
            .enqueue(&self.bindings, realm, proxy, TempKind::Deploy)
            .map_err(|e| XrayError::Token(e.to_string()))?;
        debug!(%proxy, location = %temp, "scheduled dependency");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saver_reports_pending_and_missing_tokens() {
        let realm = Realm::default();
        let bindings = Bindings::new("mock");
        let token = ObjectId::new(7);
        let saver = BindingSaver {
            bindings: bindings.clone(),
            network: "mock".to_owned(),
        };
        assert!(matches!(saver.save(&realm, token), Err(XrayError::Token(_))));

        bindings.store_mut().entry("mock", token).location = Binding::Unbound(Location::Temporary {
            kind: TempKind::Deploy,
            index: 2,
        });
        assert_eq!(saver.save(&realm, token).unwrap(), "_d2");

        bindings.store_mut().entry("mock", token).location =
            Binding::Bound(Location::Error("Broadcast failed".to_owned()));
        assert_eq!(
            saver.save(&realm, token).unwrap_err(),
            XrayError::Token("Broadcast failed".to_owned())
        );
    }

    #[test]
    fn test_heap_tokens_resolve_by_identity() {
        let mut realm = Realm::default();
        let token = ObjectId::new(41);
        let location = HeapTokens.save(&realm, token).unwrap();
        assert_eq!(location, "heap://41");
        assert_eq!(HeapTokens.load(&mut realm, &location).unwrap(), Value::Object(token));
        assert!(HeapTokens.load(&mut realm, "ab_o1").is_err());
    }

    #[test]
    fn test_loader_reads_temporary_locations_in_its_transaction() {
        let loaded: Loaded = Rc::new(RefCell::new(HashMap::new()));
        let id = ObjectId::new(3);
        loaded.borrow_mut().insert("ab_o1".to_owned(), id);
        let loader = CacheLoader {
            loaded,
            txid: "ab".to_owned(),
        };
        assert_eq!(loader.absolute("_d1").unwrap(), "ab_o1");
        assert_eq!(loader.absolute("cd_o0").unwrap(), "cd_o0");

        let mut realm = Realm::default();
        assert_eq!(loader.load(&mut realm, "_d1").unwrap(), Value::Object(id));
        assert!(loader.load(&mut realm, "_d0").is_err());
    }
}
