//! Snapshots of one object's state.

use jig_realm::{ObjectId, Property, Realm, Value};
use serde_json::Value as Json;
use tracing::debug;

use crate::error::{XrayError, XrayResult};
use crate::token::Deployer;
use crate::xray::{Xray, enumerable};

/// Serialized enumerable state of an object plus the tokens it references.
///
/// Two checkpoints are equal when both the canonical JSON and the ordered
/// token list match, which is how a call is judged to have changed state.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    json: Json,
    tokens: Vec<ObjectId>,
    proto: Option<ObjectId>,
}

impl Checkpoint {
    /// Snapshot `object`. Undeployed classes found in its state are handed
    /// to `deployer` before serializing.
    ///
    /// # Errors
    ///
    /// Rejections from scanning or serializing, deployer failures, and
    /// [`XrayError::Rejected`] when undeployed classes are found without a
    /// deployer.
    pub fn capture(
        xray: &Xray,
        realm: &mut Realm,
        object: ObjectId,
        deployer: Option<&dyn Deployer>,
    ) -> XrayResult<Self> {
        let target = realm.resolve_target(object);
        let proto = realm.object(target)?.proto;
        let state = realm.new_object();
        for (key, value) in enumerable(realm, target)? {
            realm.object_mut(state)?.props.insert(key, Property::data(value));
        }
        let state = Value::Object(state);

        let found = xray.scan(realm, &state)?;
        if !found.deployables.is_empty() {
            let Some(deployer) = deployer else {
                return Err(XrayError::Rejected {
                    purpose: crate::Purpose::Serialize,
                    culprit: format!("{} undeployed classes", found.deployables.len()),
                    path: "value".to_owned(),
                    reason: "no deployer configured".to_owned(),
                });
            };
            for class in &found.deployables {
                deployer.deploy(realm, *class)?;
            }
        }
        let tokens = xray.scan(realm, &state)?.tokens;
        let json = xray.serialize(realm, &state)?;
        debug!(%object, tokens = tokens.len(), "checkpoint captured");
        Ok(Self { json, tokens, proto })
    }

    /// The canonical JSON.
    #[must_use]
    pub fn json(&self) -> &Json {
        &self.json
    }

    /// Referenced tokens in first-seen order.
    #[must_use]
    pub fn tokens(&self) -> &[ObjectId] {
        &self.tokens
    }

    /// Same JSON and same token sequence.
    #[must_use]
    pub fn equals(&self, other: &Self) -> bool {
        self.json == other.json && self.tokens == other.tokens
    }

    /// Rebuild the state into a fresh object with the original prototype.
    ///
    /// # Errors
    ///
    /// Failures from deserializing the snapshot.
    pub fn restore_into_new(&self, xray: &Xray, realm: &mut Realm) -> XrayResult<ObjectId> {
        let state = self.restored(xray, realm)?;
        let fresh = realm.alloc(jig_realm::ObjectKind::Plain, self.proto);
        let object = realm.object_mut(fresh)?;
        for (key, value) in state {
            object.props.insert(key, Property::data(value));
        }
        Ok(fresh)
    }

    /// Replace the enumerable state of `object` with the snapshot. Hidden
    /// properties are left alone.
    ///
    /// # Errors
    ///
    /// Failures from deserializing the snapshot.
    pub fn restore_in_place(&self, xray: &Xray, realm: &mut Realm, object: ObjectId) -> XrayResult<()> {
        let state = self.restored(xray, realm)?;
        let target = realm.resolve_target(object);
        let stale: Vec<String> = enumerable(realm, target)?.into_iter().map(|(k, _)| k).collect();
        let object = realm.object_mut(target)?;
        for key in &stale {
            object.props.remove(key);
        }
        for (key, value) in state {
            object.props.insert(key, Property::data(value));
        }
        Ok(())
    }

    fn restored(&self, xray: &Xray, realm: &mut Realm) -> XrayResult<Vec<(String, Value)>> {
        match xray.deserialize(realm, &self.json)? {
            Value::Object(id) => enumerable(realm, id),
            _ => Ok(Vec::new()),
        }
    }
}
