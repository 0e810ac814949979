//! The kernel: one realm, one membrane chain, one ledger.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

use jig_bindings::{
    Batch, Binding, BindingSet, Bindings, BindingsInterceptor, LifecycleState, Location, TempKind,
};
use jig_config::{Config, EvaluatorKind, XraySection};
use jig_membrane::{Interceptor, Membrane, MembraneBuilder, ProxyKind, Record, Registry};
use jig_realm::{
    DirectEvaluator, Evaluation, Evaluator, GlobalsHandle, ObjectId, ObjectKind, Property, Realm,
    RealmLimits, SandboxEvaluator, Value, determinism,
};
use jig_xray::{Checkpoint, Xray};
use tracing::{debug, info, warn};

use crate::error::{KernelError, KernelResult};
use crate::ledger::{Ledger, Output, Transaction, Utxo};
use crate::tokens::{BindingSaver, Loaded, Outbox, Payload, Scheduler, Staged};

/// Runs jig code and keeps its bindings in step with a [`Ledger`].
///
/// Deploys and jig actions go into a batch. [`Kernel::begin`] and
/// [`Kernel::end`] bracket several of them into one transaction. Outside a
/// bracket they collect in an implicit batch that stays open until the next
/// [`Kernel::sync`], which publishes whatever batch is waiting.
pub struct Kernel {
    pub(crate) realm: Realm,
    pub(crate) record: Record,
    pub(crate) bindings: Bindings,
    pub(crate) membrane: Rc<Membrane>,
    pub(crate) ledger: Arc<dyn Ledger>,
    pub(crate) direct: Option<DirectEvaluator>,
    pub(crate) scanners: XraySection,
    pub(crate) network: String,
    pub(crate) outbox: Rc<RefCell<Outbox>>,
    pub(crate) globals: HashMap<ObjectId, GlobalsHandle>,
    pub(crate) loaded: Loaded,
    pub(crate) jigs: Vec<ObjectId>,
}

impl Kernel {
    /// A kernel publishing to `ledger` with the given settings.
    #[must_use]
    pub fn new(ledger: Arc<dyn Ledger>, config: &Config) -> Self {
        let realm = Realm::new(RealmLimits {
            max_steps: config.realm.max_steps,
            max_call_depth: config.realm.max_call_depth,
        });
        let record = Record::new();
        let bindings = Bindings::new(config.network.name.clone());
        let layer: Rc<dyn Interceptor> =
            Rc::new(BindingsInterceptor::new(bindings.clone(), Some(record.clone())));
        let membrane = MembraneBuilder::standard(
            Registry::shared(),
            record.clone(),
            Rc::new(bindings.clone()),
            Some(layer),
        );
        let direct = match config.realm.evaluator {
            EvaluatorKind::Sandbox => None,
            EvaluatorKind::Direct => {
                warn!("direct evaluator selected; results are not consensus-safe");
                let mut direct = DirectEvaluator::new();
                direct.activate(&realm);
                Some(direct)
            },
        };
        info!(network = %config.network.name, evaluator = ?config.realm.evaluator, "kernel created");
        Self {
            realm,
            record,
            bindings,
            membrane,
            ledger,
            direct,
            scanners: config.xray.clone(),
            network: config.network.name.clone(),
            outbox: Rc::new(RefCell::new(Outbox::default())),
            globals: HashMap::new(),
            loaded: Rc::new(RefCell::new(HashMap::new())),
            jigs: Vec::new(),
        }
    }

    /// A kernel with default settings.
    #[must_use]
    pub fn with_ledger(ledger: Arc<dyn Ledger>) -> Self {
        Self::new(ledger, &Config::default())
    }

    /// The realm jigs live in.
    #[must_use]
    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    /// Mutable access to the realm.
    pub fn realm_mut(&mut self) -> &mut Realm {
        &mut self.realm
    }

    /// The binding store.
    #[must_use]
    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    /// The record of the most recent action.
    #[must_use]
    pub fn record(&self) -> &Record {
        &self.record
    }

    /// The active network.
    #[must_use]
    pub fn network(&self) -> &str {
        &self.network
    }

    /// Evaluate `src` and wrap the result as code. The code can refer to
    /// itself by name.
    ///
    /// # Errors
    ///
    /// Evaluation errors pass through unchanged.
    pub fn install(&mut self, src: &str) -> KernelResult<Value> {
        let evaluation = self.evaluate(src)?;
        let proxy = self.wrap_code(evaluation)?;
        Ok(Value::Object(proxy))
    }

    /// Set `code.deps` and make each dependency visible to the code by name.
    ///
    /// # Errors
    ///
    /// [`KernelError::NotCode`] when `code` is not code.
    pub fn set_deps(&mut self, code: &Value, deps: &[(&str, Value)]) -> KernelResult<()> {
        let proxy = self.code_id(code)?;
        let table = self.realm.new_object();
        for (name, value) in deps {
            self.realm
                .object_mut(table)?
                .props
                .insert(*name, Property::data(value.clone()));
            if let Some(globals) = self.globals.get(&proxy) {
                globals.set(*name, value.clone());
            }
        }
        let target = self.realm.resolve_target(proxy);
        self.realm
            .object_mut(target)?
            .props
            .insert("deps", Property::data(Value::Object(table)));
        debug!(%proxy, deps = deps.len(), "dependencies set");
        Ok(())
    }

    /// Lifecycle of `value` on the active network.
    #[must_use]
    pub fn state(&self, value: &Value) -> LifecycleState {
        value
            .as_object()
            .map_or(LifecycleState::Unsaved, |id| self.bindings.store().state(id))
    }

    /// Open a batch.
    ///
    /// # Errors
    ///
    /// [`KernelError::BatchInProgress`] if a batch is open or awaiting sync.
    pub fn begin(&mut self) -> KernelResult<()> {
        let mut outbox = self.outbox.borrow_mut();
        if outbox.batch.is_some() {
            return Err(KernelError::BatchInProgress);
        }
        outbox.batch = Some(Batch::begin(self.network.clone()));
        outbox.implicit = false;
        outbox.staged.clear();
        outbox.undo.clear();
        Ok(())
    }

    /// Close the open batch. It is published by the next [`Kernel::sync`].
    ///
    /// # Errors
    ///
    /// [`KernelError::NoBatch`] without a batch opened by [`Kernel::begin`].
    pub fn end(&mut self) -> KernelResult<()> {
        let mut outbox = self.outbox.borrow_mut();
        let implicit = outbox.implicit;
        match outbox.batch.as_mut() {
            Some(batch) if batch.is_open() && !implicit => {
                batch.end();
                Ok(())
            },
            _ => Err(KernelError::NoBatch),
        }
    }

    /// Discard the batch that has not been published yet, restoring every
    /// member's bindings and the state of every jig it changed.
    ///
    /// # Errors
    ///
    /// [`KernelError::NoBatch`] when nothing is waiting.
    pub fn rollback(&mut self) -> KernelResult<()> {
        let (batch, undo) = {
            let mut outbox = self.outbox.borrow_mut();
            outbox.staged.clear();
            let undo = std::mem::take(&mut outbox.undo);
            (outbox.batch.take(), undo)
        };
        let batch = batch.ok_or(KernelError::NoBatch)?;
        let members = batch.members().len();
        batch.rollback(&self.bindings, &mut self.realm)?;
        for snapshot in &undo {
            self.restore_snapshot(snapshot)?;
        }
        self.record.rollback();
        info!(network = %self.network, members, "batch rolled back");
        Ok(())
    }

    /// Queue `code` for deployment after every undeployed dependency in its
    /// `deps`. Returns its temporary location.
    ///
    /// A failure discards the whole batch.
    ///
    /// # Errors
    ///
    /// [`KernelError::NotCode`] for non-code, [`KernelError::BatchInProgress`]
    /// when an ended batch awaits sync, and serialization errors from the
    /// code's properties.
    pub fn deploy(&mut self, code: &Value) -> KernelResult<Location> {
        let proxy = self.code_id(code)?;
        self.join_batch()?;
        match self.deploy_in_batch(proxy) {
            Ok(location) => {
                info!(%proxy, %location, "deploy queued");
                Ok(location)
            },
            Err(err) => {
                warn!(%proxy, error = %err, "deploy failed; discarding batch");
                self.rollback()?;
                Err(err)
            },
        }
    }

    /// Make sure an open batch exists, opening an implicit one if needed.
    ///
    /// # Errors
    ///
    /// [`KernelError::BatchInProgress`] when an ended batch awaits sync.
    pub(crate) fn join_batch(&mut self) -> KernelResult<()> {
        let mut outbox = self.outbox.borrow_mut();
        match outbox.batch.as_ref() {
            None => {
                outbox.batch = Some(Batch::begin(self.network.clone()));
                outbox.implicit = true;
                outbox.staged.clear();
                outbox.undo.clear();
                Ok(())
            },
            Some(batch) if batch.is_open() => Ok(()),
            Some(_) => Err(KernelError::BatchInProgress),
        }
    }

    fn deploy_in_batch(&mut self, proxy: ObjectId) -> KernelResult<Location> {
        let mut visiting = HashSet::new();
        self.enqueue_with_deps(proxy, &mut visiting)?;
        self.stage_members()?;
        self.bindings
            .store()
            .get(&self.network, proxy)
            .and_then(|set| set.location.value().cloned())
            .ok_or_else(|| KernelError::NotCode(self.realm.type_name(&Value::Object(proxy))))
    }

    /// Depth-first over `deps`, dependencies first. A code already on the
    /// path is skipped, which is what lets two codes depend on each other.
    pub(crate) fn enqueue_with_deps(
        &mut self,
        proxy: ObjectId,
        visiting: &mut HashSet<ObjectId>,
    ) -> KernelResult<()> {
        let state = self
            .bindings
            .store()
            .get(&self.network, proxy)
            .map_or(LifecycleState::Unsaved, BindingSet::state);
        if matches!(state, LifecycleState::Pending | LifecycleState::Confirmed) {
            return Ok(());
        }
        if !visiting.insert(proxy) {
            return Ok(());
        }
        for dep in self.deps_of(proxy)? {
            let dep = self.code_id(&dep)?;
            self.enqueue_with_deps(dep, visiting)?;
        }
        let mut outbox = self.outbox.borrow_mut();
        let batch = outbox.batch.as_mut().ok_or(KernelError::NoBatch)?;
        batch.enqueue(&self.bindings, &mut self.realm, proxy, TempKind::Deploy)?;
        Ok(())
    }

    /// Code-like values in `proxy.deps`, in key order.
    fn deps_of(&mut self, proxy: ObjectId) -> KernelResult<Vec<Value>> {
        let target = self.realm.resolve_target(proxy);
        let Value::Object(table) = self.realm.raw_get(target, "deps")? else {
            return Ok(Vec::new());
        };
        let table = self.realm.resolve_target(table);
        let mut out = Vec::new();
        for key in self.realm.raw_own_keys(table)? {
            let value = self.realm.raw_get(table, &key)?;
            if self.is_code_like(&value) {
                out.push(value);
            }
        }
        Ok(out)
    }

    /// Capture the payload of every member that has none yet. Capturing can
    /// add members, so this runs until the two lists line up.
    pub(crate) fn stage_members(&mut self) -> KernelResult<()> {
        loop {
            let next = {
                let outbox = self.outbox.borrow();
                let members = outbox.batch.as_ref().map(Batch::members).unwrap_or_default();
                members.get(outbox.staged.len()).copied()
            };
            let Some(proxy) = next else {
                return Ok(());
            };
            let staged = if self.membrane.registry().borrow().kind(proxy) == Some(ProxyKind::Jig) {
                self.stage_jig(proxy)?
            } else {
                self.stage(proxy)?
            };
            self.outbox.borrow_mut().staged.push(staged);
        }
    }

    fn stage(&mut self, proxy: ObjectId) -> KernelResult<Staged> {
        let target = self.realm.resolve_target(proxy);
        let src = determinism::function_to_string(&self.realm, target)?;
        let scheduler = Scheduler {
            membrane: Rc::clone(&self.membrane),
            bindings: self.bindings.clone(),
            outbox: Rc::clone(&self.outbox),
        };
        let xray = self
            .xray()
            .restrict_owner(proxy)
            .with_saver(Rc::new(BindingSaver {
                bindings: self.bindings.clone(),
                network: self.network.clone(),
            }));
        let checkpoint = Checkpoint::capture(&xray, &mut self.realm, proxy, Some(&scheduler))?;
        debug!(%proxy, tokens = checkpoint.tokens().len(), "staged");
        Ok(Staged {
            proxy,
            payload: Payload::Code {
                src,
                props: checkpoint.json().clone(),
            },
        })
    }

    /// Publish the ended batch. Returns the txid, or `None` when there was
    /// nothing to publish.
    ///
    /// On a ledger failure every member moves to the error state and the
    /// ledger's error is returned as is.
    ///
    /// # Errors
    ///
    /// [`KernelError::BatchOpen`] before [`Kernel::end`] of a bracket, and
    /// [`KernelError::Ledger`] when the broadcast fails.
    pub async fn sync(&mut self) -> KernelResult<Option<String>> {
        let (batch, staged) = {
            let mut outbox = self.outbox.borrow_mut();
            let implicit = outbox.implicit;
            match outbox.batch.as_mut() {
                None => return Ok(None),
                Some(batch) if batch.is_open() && !implicit => return Err(KernelError::BatchOpen),
                Some(batch) if batch.is_open() => batch.end(),
                Some(_) => {},
            }
            let staged = std::mem::take(&mut outbox.staged);
            outbox.undo.clear();
            (outbox.batch.take(), staged)
        };
        let Some(batch) = batch else {
            return Ok(None);
        };
        if batch.is_empty() {
            return Ok(None);
        }

        let tx = Transaction {
            network: batch.network().to_owned(),
            outputs: staged.iter().map(|s| self.output(batch.network(), s)).collect(),
        };
        info!(network = %tx.network, outputs = tx.outputs.len(), "broadcasting");
        let ledger = Arc::clone(&self.ledger);
        match ledger.broadcast(&tx).await {
            Ok(txid) => {
                let settled = batch.confirm(&self.bindings, &mut self.realm, &txid)?;
                let mut loaded = self.loaded.borrow_mut();
                for (proxy, location) in settled {
                    loaded.insert(location.to_string(), proxy);
                }
                info!(%txid, "sync complete");
                Ok(Some(txid))
            },
            Err(err) => {
                batch.fail(&self.bindings, &mut self.realm, &err.to_string())?;
                warn!(error = %err, "sync failed");
                Err(err.into())
            },
        }
    }

    fn output(&self, network: &str, staged: &Staged) -> Output {
        let store = self.bindings.store();
        let set = store.get(network, staged.proxy);
        let owner = set.and_then(|s| s.owner.value().cloned());
        let satoshis = set.and_then(|s| s.satoshis.value().copied());
        match &staged.payload {
            Payload::Code { src, props } => Output::Deploy {
                src: src.clone(),
                props: props.clone(),
                owner,
                satoshis,
            },
            Payload::Jig { class, state } => Output::Jig {
                class: class.clone(),
                state: state.clone(),
                owner,
                satoshis,
            },
        }
    }

    /// Make `network` the one bare binding accessors read. The most recent
    /// activation wins. Returns the previously active network.
    ///
    /// # Errors
    ///
    /// [`KernelError::BatchInProgress`] while a batch is pending.
    pub fn activate(&mut self, network: &str) -> KernelResult<String> {
        if self.outbox.borrow().batch.is_some() {
            return Err(KernelError::BatchInProgress);
        }
        let previous = self.bindings.activate(&mut self.realm, network)?;
        self.network = network.to_owned();
        Ok(previous)
    }

    /// Unspent outputs locked to `script`.
    ///
    /// # Errors
    ///
    /// Ledger errors as reported.
    pub async fn utxos(&self, script: &str) -> KernelResult<Vec<Utxo>> {
        Ok(self.ledger.utxos(script).await?)
    }

    pub(crate) fn evaluate(&mut self, src: &str) -> KernelResult<Evaluation> {
        let evaluation = match &self.direct {
            Some(direct) => direct.evaluate(&mut self.realm, src, None)?,
            None => SandboxEvaluator.evaluate(&mut self.realm, src, None)?,
        };
        Ok(evaluation)
    }

    pub(crate) fn wrap_code(&mut self, evaluation: Evaluation) -> KernelResult<ObjectId> {
        let raw = evaluation
            .result
            .as_object()
            .ok_or_else(|| KernelError::NotCode(self.realm.type_name(&evaluation.result)))?;
        let proxy = self.membrane.wrap(&mut self.realm, raw, ProxyKind::Code)?;
        if let Value::String(name) = self.realm.raw_get(raw, "name")? {
            evaluation.globals.set(name, Value::Object(proxy));
        }
        self.globals.insert(proxy, evaluation.globals);
        Ok(proxy)
    }

    pub(crate) fn xray(&self) -> Xray {
        let mut xray = Xray::new().with_registry(Rc::clone(self.membrane.registry()));
        if self.scanners.allow_deployables {
            xray = xray.allow_deployables();
        }
        if self.scanners.allow_arbitrary {
            xray = xray.allow_arbitrary();
        }
        xray
    }

    fn is_code_like(&self, value: &Value) -> bool {
        let Value::Object(id) = value else {
            return false;
        };
        let raw = self.realm.resolve_target(*id);
        self.realm
            .object(raw)
            .is_ok_and(|o| matches!(o.kind, ObjectKind::Class(_) | ObjectKind::Function(_)))
    }

    /// The code proxy for `value`, wrapping a bare class or function.
    fn code_id(&mut self, value: &Value) -> KernelResult<ObjectId> {
        if !self.is_code_like(value) {
            return Err(KernelError::NotCode(self.realm.type_name(value)));
        }
        let Value::Object(id) = value else {
            return Err(KernelError::NotCode(self.realm.type_name(value)));
        };
        let raw = self.realm.resolve_target(*id);
        let existing = self.membrane.registry().borrow().lookup_proxy(raw);
        match existing {
            Some(proxy) if self.membrane.registry().borrow().kind(proxy) == Some(ProxyKind::Code) => {
                Ok(proxy)
            },
            Some(_) => Err(KernelError::NotCode(self.realm.type_name(value))),
            None => Ok(self.membrane.wrap(&mut self.realm, raw, ProxyKind::Code)?),
        }
    }

    /// Record that `proxy` lives at `location` on `network`.
    pub(crate) fn settle_loaded(
        &mut self,
        network: &str,
        proxy: ObjectId,
        location: &Location,
        owner: Option<&String>,
        satoshis: Option<u64>,
    ) -> KernelResult<()> {
        {
            let mut store = self.bindings.store_mut();
            let set = store.entry(network, proxy);
            set.location = Binding::Bound(location.clone());
            set.origin = Binding::Bound(location.clone());
            set.nonce = Binding::Bound(1);
            set.owner = owner.map_or(Binding::Unset, |o| Binding::Bound(o.clone()));
            set.satoshis = satoshis.map_or(Binding::Unset, Binding::Bound);
        }
        self.bindings.store().project(&mut self.realm, proxy)?;
        self.loaded.borrow_mut().insert(location.to_string(), proxy);
        Ok(())
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        if let Some(direct) = self.direct.as_mut() {
            direct.deactivate(&self.realm);
        }
    }
}
