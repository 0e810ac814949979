//! Interceptor chains.
//!
//! A [`Membrane`] is the proxy handler installed on every jig, code, and inner
//! object. It owns an ordered list of [`Interceptor`]s. Each trap enters the
//! outermost layer, and every layer either answers it or passes it on through
//! [`Next`]. Falling off the end runs the ordinary operation on the target.

use std::fmt;
use std::rc::Rc;

use jig_realm::{ObjectId, ProxyHandler, Realm, RealmResult, Trap, TrapOutcome};

use crate::error::MembraneResult;
use crate::registry::{ProxyKind, SharedRegistry};

/// State visible to every layer while one trap is handled.
pub struct TrapContext<'a> {
    /// The realm the trap runs in.
    pub realm: &'a mut Realm,
    /// The proxy the operation was performed on.
    pub proxy: ObjectId,
    /// The object behind it.
    pub target: ObjectId,
    /// Registry shared by all membranes of the realm.
    pub registry: &'a SharedRegistry,
    /// The handler of `proxy`, used to wrap objects reached through it.
    pub handler: Rc<dyn ProxyHandler>,
}

impl TrapContext<'_> {
    /// Role of the proxy being operated on.
    #[must_use]
    pub fn kind(&self) -> Option<ProxyKind> {
        self.registry.borrow().kind(self.proxy)
    }

    /// The jig or code the operation is attributed to.
    #[must_use]
    pub fn owner(&self) -> ObjectId {
        self.registry.borrow().owner_of(self.proxy).unwrap_or(self.proxy)
    }

    /// Whether the proxy is a jig or code.
    #[must_use]
    pub fn is_token(&self) -> bool {
        self.kind().is_some_and(ProxyKind::is_token)
    }

    /// Wrap `target` in this chain, or return its existing proxy.
    ///
    /// # Errors
    ///
    /// Fails if `target` is itself a proxy.
    pub fn wrap(&mut self, target: ObjectId, kind: ProxyKind) -> MembraneResult<ObjectId> {
        if let Some(existing) = self.registry.borrow().lookup_proxy(target) {
            return Ok(existing);
        }
        wrap_with(self.realm, self.registry, Rc::clone(&self.handler), target, kind)
    }
}

impl fmt::Debug for TrapContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrapContext")
            .field("proxy", &self.proxy)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// One layer of a membrane.
pub trait Interceptor: fmt::Debug {
    /// Layer name for logs.
    fn name(&self) -> &'static str;

    /// Handle `trap`, calling `next.run` to delegate inward.
    ///
    /// # Errors
    ///
    /// Errors propagate unchanged to the code that performed the operation.
    fn intercept(&self, cx: &mut TrapContext<'_>, trap: Trap, next: Next<'_>)
    -> RealmResult<TrapOutcome>;
}

/// The layers inside the current one.
#[derive(Debug, Clone, Copy)]
pub struct Next<'a> {
    layers: &'a [Rc<dyn Interceptor>],
}

impl<'a> Next<'a> {
    pub(crate) fn new(layers: &'a [Rc<dyn Interceptor>]) -> Self {
        Self { layers }
    }

    /// Pass `trap` to the next layer, or perform it on the target when no
    /// layers remain.
    ///
    /// # Errors
    ///
    /// Whatever the inner layers or the operation produce.
    pub fn run(self, cx: &mut TrapContext<'_>, trap: Trap) -> RealmResult<TrapOutcome> {
        match self.layers.split_first() {
            Some((layer, rest)) => layer.intercept(cx, trap, Next::new(rest)),
            None => cx.realm.raw_trap(cx.target, trap),
        }
    }
}

/// A proxy handler running an interceptor chain.
pub struct Membrane {
    layers: Vec<Rc<dyn Interceptor>>,
    registry: SharedRegistry,
}

impl Membrane {
    pub(crate) fn new(layers: Vec<Rc<dyn Interceptor>>, registry: SharedRegistry) -> Self {
        Self { layers, registry }
    }

    /// Registry the chain resolves identities through.
    #[must_use]
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Layer names, outermost first.
    #[must_use]
    pub fn layer_names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|l| l.name()).collect()
    }

    /// Put `target` behind this membrane.
    ///
    /// # Errors
    ///
    /// [`MembraneError::DuplicateProxy`](crate::MembraneError::DuplicateProxy)
    /// if the target already has a membrane.
    pub fn wrap(self: &Rc<Self>, realm: &mut Realm, target: ObjectId, kind: ProxyKind) -> MembraneResult<ObjectId> {
        let handler: Rc<dyn ProxyHandler> = Rc::clone(self) as Rc<dyn ProxyHandler>;
        wrap_with(realm, &self.registry, handler, target, kind)
    }
}

impl fmt::Debug for Membrane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Membrane")
            .field("layers", &self.layer_names())
            .finish_non_exhaustive()
    }
}

impl ProxyHandler for Membrane {
    fn handle(
        &self,
        realm: &mut Realm,
        proxy: ObjectId,
        target: ObjectId,
        trap: Trap,
    ) -> RealmResult<TrapOutcome> {
        let Some((_, handler)) = realm.proxy_parts(proxy) else {
            return realm.raw_trap(target, trap);
        };
        let mut cx = TrapContext {
            realm,
            proxy,
            target,
            registry: &self.registry,
            handler,
        };
        Next::new(&self.layers).run(&mut cx, trap)
    }
}

fn wrap_with(
    realm: &mut Realm,
    registry: &SharedRegistry,
    handler: Rc<dyn ProxyHandler>,
    target: ObjectId,
    kind: ProxyKind,
) -> MembraneResult<ObjectId> {
    registry.borrow().ensure_free(target)?;
    let proxy = realm.create_proxy(target, handler);
    registry.borrow_mut().insert(proxy, target, kind)?;
    Ok(proxy)
}
