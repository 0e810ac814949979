//! Binding values and per-network binding sets.

use jig_realm::{RealmError, RealmResult, Value};

use crate::location::Location;

/// Lifecycle of one tracked property.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Binding<T> {
    /// Never assigned.
    #[default]
    Unset,
    /// Assigned but waiting for its transaction to confirm.
    Unbound(T),
    /// Confirmed.
    Bound(T),
}

impl<T> Binding<T> {
    /// The assigned value, bound or not.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Unset => None,
            Self::Unbound(v) | Self::Bound(v) => Some(v),
        }
    }

    /// Whether the value is waiting for confirmation.
    #[must_use]
    pub fn is_unbound(&self) -> bool {
        matches!(self, Self::Unbound(_))
    }

    /// Whether nothing was ever assigned.
    #[must_use]
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    /// Confirm a pending value; other states are unchanged.
    #[must_use]
    pub fn bind(self) -> Self {
        match self {
            Self::Unbound(v) => Self::Bound(v),
            other => other,
        }
    }
}

/// The five tracked properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingName {
    /// Current position on the ledger.
    Location,
    /// First position on the ledger.
    Origin,
    /// Number of confirmed updates.
    Nonce,
    /// Owner lock.
    Owner,
    /// Backing amount.
    Satoshis,
}

impl BindingName {
    /// All binding names.
    pub const ALL: [Self; 5] = [
        Self::Location,
        Self::Origin,
        Self::Nonce,
        Self::Owner,
        Self::Satoshis,
    ];

    /// Property key.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Location => "location",
            Self::Origin => "origin",
            Self::Nonce => "nonce",
            Self::Owner => "owner",
            Self::Satoshis => "satoshis",
        }
    }

    /// The binding a property key names, if any.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|n| n.as_str() == key)
    }

    /// Whether code may assign this binding once.
    #[must_use]
    pub fn is_assignable(self) -> bool {
        matches!(self, Self::Owner | Self::Satoshis)
    }
}

/// Where an object stands for one network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No location yet.
    Unsaved,
    /// Holding a temporary location in a pending batch.
    Pending,
    /// Holding a confirmed location.
    Confirmed,
    /// The owning transaction failed; terminal.
    Errored,
}

/// Binding values of one object on one network.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BindingSet {
    /// Current location.
    pub location: Binding<Location>,
    /// First confirmed location.
    pub origin: Binding<Location>,
    /// Update counter.
    pub nonce: Binding<u64>,
    /// Owner lock.
    pub owner: Binding<String>,
    /// Backing amount.
    pub satoshis: Binding<u64>,
    /// Temporary location replaced by the error marker on failure.
    pub discarded: Option<Location>,
}

impl BindingSet {
    /// Lifecycle derived from the location binding.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        match &self.location {
            Binding::Unset => LifecycleState::Unsaved,
            Binding::Unbound(_) => LifecycleState::Pending,
            Binding::Bound(Location::Error(_)) => LifecycleState::Errored,
            Binding::Bound(_) => LifecycleState::Confirmed,
        }
    }

    /// Failure reason when errored.
    #[must_use]
    pub fn error_reason(&self) -> Option<&str> {
        match &self.location {
            Binding::Bound(Location::Error(reason)) => Some(reason),
            _ => None,
        }
    }

    /// What code outside the runtime sees for `name`.
    ///
    /// # Errors
    ///
    /// [`RealmError::Undetermined`] for a value still awaiting confirmation.
    pub fn read(&self, name: BindingName) -> RealmResult<Value> {
        if self.state() == LifecycleState::Errored && !name.is_assignable() {
            return Ok(Value::Undefined);
        }
        let pending = match name {
            BindingName::Location => self.location.is_unbound(),
            BindingName::Origin => self.origin.is_unbound(),
            BindingName::Nonce => self.nonce.is_unbound(),
            BindingName::Owner => self.owner.is_unbound(),
            BindingName::Satoshis => self.satoshis.is_unbound(),
        };
        if pending {
            return Err(RealmError::Undetermined(format!(
                "{} is undetermined",
                name.as_str()
            )));
        }
        Ok(self.raw(name))
    }

    /// The stored value regardless of state. Errored objects report the
    /// discarded temporary location.
    #[must_use]
    pub fn raw(&self, name: BindingName) -> Value {
        match name {
            BindingName::Location => match (&self.location, &self.discarded) {
                (Binding::Bound(Location::Error(_)), Some(temp)) => Value::String(temp.to_string()),
                (loc, _) => location_value(loc),
            },
            BindingName::Origin => location_value(&self.origin),
            BindingName::Nonce => number_value(&self.nonce),
            BindingName::Owner => self
                .owner
                .value()
                .map_or(Value::Undefined, |o| Value::String(o.clone())),
            BindingName::Satoshis => number_value(&self.satoshis),
        }
    }

    /// Accept the one external assignment of `owner` or `satoshis`.
    ///
    /// # Errors
    ///
    /// [`RealmError::Capability`] for non-assignable names or a second
    /// assignment; [`RealmError::Type`] for a malformed value.
    pub fn assign(&mut self, name: BindingName, value: &Value) -> RealmResult<()> {
        match name {
            BindingName::Owner => {
                if !self.owner.is_unset() {
                    return Err(set_again());
                }
                let Value::String(owner) = value else {
                    return Err(RealmError::type_error("owner must be a string"));
                };
                if owner.is_empty() {
                    return Err(RealmError::type_error("owner must not be empty"));
                }
                self.owner = Binding::Unbound(owner.clone());
            },
            BindingName::Satoshis => {
                if !self.satoshis.is_unset() {
                    return Err(set_again());
                }
                self.satoshis = Binding::Unbound(satoshis(value)?);
            },
            other => {
                return Err(RealmError::capability(format!("Cannot set {}", other.as_str())));
            },
        }
        Ok(())
    }
}

fn set_again() -> RealmError {
    RealmError::capability("Cannot set binding again")
}

fn satoshis(value: &Value) -> RealmResult<u64> {
    match value {
        Value::Number(n) if n.is_finite() && *n >= 0.0 && n.fract() == 0.0 && *n <= jig_realm::determinism::MAX_SAFE_INTEGER => {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let whole = *n as u64;
            Ok(whole)
        },
        _ => Err(RealmError::type_error("satoshis must be a non-negative integer")),
    }
}

fn location_value(binding: &Binding<Location>) -> Value {
    binding
        .value()
        .map_or(Value::Undefined, |l| Value::String(l.to_string()))
}

#[allow(clippy::cast_precision_loss)]
fn number_value(binding: &Binding<u64>) -> Value {
    binding.value().map_or(Value::Undefined, |n| Value::Number(*n as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::TempKind;

    #[test]
    fn test_pending_reads_are_undetermined_not_undefined() {
        let mut set = BindingSet::default();
        assert_eq!(set.read(BindingName::Location).unwrap(), Value::Undefined);
        set.location = Binding::Unbound(Location::Temporary { kind: TempKind::Deploy, index: 0 });
        assert_eq!(set.state(), LifecycleState::Pending);
        assert!(matches!(
            set.read(BindingName::Location),
            Err(RealmError::Undetermined(_))
        ));
        assert_eq!(set.raw(BindingName::Location), Value::string("_d0"));
    }

    #[test]
    fn test_owner_and_satoshis_are_write_once() {
        let mut set = BindingSet::default();
        set.assign(BindingName::Owner, &Value::string("alice")).unwrap();
        let again = set.assign(BindingName::Owner, &Value::string("bob")).unwrap_err();
        assert_eq!(again.to_string(), "Cannot set binding again");

        set.assign(BindingName::Satoshis, &Value::Number(1000.0)).unwrap();
        assert!(set.assign(BindingName::Satoshis, &Value::Number(1.0)).is_err());
        assert!(set.assign(BindingName::Nonce, &Value::Number(1.0)).is_err());
        assert!(set.assign(BindingName::Location, &Value::string("x_o1")).is_err());
    }

    #[test]
    fn test_malformed_assignments() {
        let mut set = BindingSet::default();
        assert!(matches!(
            set.assign(BindingName::Satoshis, &Value::Number(-1.0)),
            Err(RealmError::Type(_))
        ));
        assert!(matches!(
            set.assign(BindingName::Owner, &Value::Number(1.0)),
            Err(RealmError::Type(_))
        ));
        assert!(set.owner.is_unset());
    }
}
