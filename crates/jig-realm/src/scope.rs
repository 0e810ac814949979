//! Lexical scopes.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{RealmError, RealmResult};
use crate::value::Value;

/// Shared handle to a scope.
pub type ScopeRef = Rc<RefCell<Scope>>;

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    mutable: bool,
}

/// A variable environment.
#[derive(Debug, Default)]
pub struct Scope {
    vars: HashMap<String, Slot>,
    parent: Option<ScopeRef>,
    this_value: Option<Value>,
}

impl Scope {
    /// A root scope.
    #[must_use]
    pub fn root() -> ScopeRef {
        Rc::new(RefCell::new(Self::default()))
    }

    /// A child scope of `parent`.
    #[must_use]
    pub fn child(parent: &ScopeRef) -> ScopeRef {
        Rc::new(RefCell::new(Self {
            vars: HashMap::new(),
            parent: Some(Rc::clone(parent)),
            this_value: None,
        }))
    }

    /// A function activation scope binding `this`.
    #[must_use]
    pub fn activation(parent: &ScopeRef, this_value: Value) -> ScopeRef {
        Rc::new(RefCell::new(Self {
            vars: HashMap::new(),
            parent: Some(Rc::clone(parent)),
            this_value: Some(this_value),
        }))
    }

    /// Declare a binding in this scope, shadowing outer ones.
    pub fn declare(&mut self, name: impl Into<String>, value: Value, mutable: bool) {
        self.vars.insert(name.into(), Slot { value, mutable });
    }

    /// Whether `name` is declared directly in this scope.
    #[must_use]
    pub fn has_own(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Removes a binding declared directly in this scope.
    pub fn remove_own(&mut self, name: &str) -> Option<Value> {
        self.vars.remove(name).map(|slot| slot.value)
    }

    /// Names declared directly in this scope, sorted.
    #[must_use]
    pub fn own_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.vars.keys().cloned().collect();
        names.sort();
        names
    }

    /// The value declared directly in this scope.
    #[must_use]
    pub fn get_own(&self, name: &str) -> Option<Value> {
        self.vars.get(name).map(|slot| slot.value.clone())
    }
}

/// Resolve `name` through the scope chain.
pub(crate) fn lookup(scope: &ScopeRef, name: &str) -> Option<Value> {
    let mut current = Some(Rc::clone(scope));
    while let Some(s) = current {
        let borrowed = s.borrow();
        if let Some(slot) = borrowed.vars.get(name) {
            return Some(slot.value.clone());
        }
        current = borrowed.parent.clone();
    }
    None
}

/// Assign to an existing binding in the chain.
pub(crate) fn assign(scope: &ScopeRef, name: &str, value: Value) -> RealmResult<()> {
    let mut current = Some(Rc::clone(scope));
    while let Some(s) = current {
        let mut borrowed = s.borrow_mut();
        if let Some(slot) = borrowed.vars.get_mut(name) {
            if !slot.mutable {
                return Err(RealmError::Type(
                    "Assignment to constant variable.".to_owned(),
                ));
            }
            slot.value = value;
            return Ok(());
        }
        current = borrowed.parent.clone();
    }
    Err(RealmError::Reference(format!("{name} is not defined")))
}

/// The nearest bound `this`.
pub(crate) fn this_value(scope: &ScopeRef) -> Value {
    let mut current = Some(Rc::clone(scope));
    while let Some(s) = current {
        let borrowed = s.borrow();
        if let Some(this) = &borrowed.this_value {
            return this.clone();
        }
        current = borrowed.parent.clone();
    }
    Value::Undefined
}

/// Mutable handle onto the globals channel of one evaluation.
///
/// Names set here after compilation are visible to the compiled code when it
/// next runs, which is how two mutually-referencing classes get wired up.
#[derive(Debug, Clone)]
pub struct GlobalsHandle {
    scope: ScopeRef,
}

impl GlobalsHandle {
    pub(crate) fn new(scope: ScopeRef) -> Self {
        Self { scope }
    }

    /// Define or overwrite a global visible to the evaluated code.
    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.scope.borrow_mut().declare(name, value, true);
    }

    /// Read a global defined on this handle.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.scope.borrow().get_own(name)
    }

    /// Remove a global defined on this handle.
    pub fn remove(&self, name: &str) -> Option<Value> {
        self.scope.borrow_mut().remove_own(name)
    }

    /// Names currently defined on this handle, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.scope.borrow().own_names()
    }

    /// Whether two handles refer to the same channel.
    #[must_use]
    pub fn same_channel(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.scope, &other.scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_shadows_and_assign_walks_up() {
        let root = Scope::root();
        root.borrow_mut().declare("x", Value::Number(1.0), true);
        let child = Scope::child(&root);
        assign(&child, "x", Value::Number(2.0)).unwrap();
        assert_eq!(lookup(&root, "x"), Some(Value::Number(2.0)));

        child.borrow_mut().declare("x", Value::Number(3.0), true);
        assert_eq!(lookup(&child, "x"), Some(Value::Number(3.0)));
        assert_eq!(lookup(&root, "x"), Some(Value::Number(2.0)));
    }

    #[test]
    fn test_const_rejects_assignment() {
        let root = Scope::root();
        root.borrow_mut().declare("k", Value::Null, false);
        assert!(matches!(
            assign(&root, "k", Value::Bool(true)),
            Err(RealmError::Type(_))
        ));
    }

    #[test]
    fn test_globals_handle_is_live() {
        let root = Scope::root();
        let handle = GlobalsHandle::new(Rc::clone(&root));
        let inner = Scope::child(&root);
        assert_eq!(lookup(&inner, "B"), None);
        handle.set("B", Value::string("late"));
        assert_eq!(lookup(&inner, "B"), Some(Value::string("late")));
    }
}
