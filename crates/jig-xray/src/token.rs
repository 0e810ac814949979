//! Hooks for values that live outside the serialized payload.

use jig_realm::{ObjectId, Realm, Value};

use crate::error::XrayResult;

/// Turns a token into the location string stored in `$ref`.
pub trait TokenSaver {
    /// Location of the jig or code behind `token`.
    ///
    /// # Errors
    ///
    /// Fails when the token has no usable location.
    fn save(&self, realm: &Realm, token: ObjectId) -> XrayResult<String>;
}

/// Resolves a `$ref` location back into a live token.
pub trait TokenLoader {
    /// The jig or code at `location`.
    ///
    /// # Errors
    ///
    /// Fails when nothing is known at `location`.
    fn load(&self, realm: &mut Realm, location: &str) -> XrayResult<Value>;
}

/// Schedules undeployed classes found while checkpointing.
pub trait Deployer {
    /// Deploy `class` so it can be saved as a token.
    ///
    /// # Errors
    ///
    /// Fails when the class cannot be deployed.
    fn deploy(&self, realm: &mut Realm, class: ObjectId) -> XrayResult<()>;
}
