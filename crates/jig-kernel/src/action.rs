//! Actions: calls and constructions that publish the jigs they change.
//!
//! Every live jig is snapshotted before an action runs. Afterwards the
//! record says which jigs were created and written; created jigs and written
//! jigs whose snapshot no longer matches join the batch as `_o<N>` outputs.
//! A thrown action puts every written jig back the way it was.

use std::collections::HashSet;
use std::rc::Rc;

use jig_bindings::TempKind;
use jig_membrane::ProxyKind;
use jig_realm::{ObjectId, Value};
use jig_xray::{Checkpoint, TokenSaver, Xray};
use tracing::{debug, info, warn};

use crate::error::{KernelError, KernelResult};
use crate::kernel::Kernel;
use crate::tokens::{BindingSaver, HeapTokens, Payload, Scheduler, Snapshot, Staged};

impl Kernel {
    /// Call `method` on `this` as one action.
    ///
    /// Arguments are cloned into the realm first, so the jig never shares
    /// plain data with the caller. Jigs the call changes are queued into the
    /// open batch, or into the implicit batch outside a bracket.
    ///
    /// # Errors
    ///
    /// Whatever the method throws, with every written jig restored.
    /// [`KernelError::BatchInProgress`] when the call changes jigs while an
    /// ended batch awaits sync.
    pub fn call(&mut self, this: &Value, method: &str, args: &[Value]) -> KernelResult<Value> {
        let args = self.clone_args(args)?;
        self.act(|kernel| {
            let f = kernel.realm.get(this, method)?;
            Ok(kernel.realm.call(&f, this.clone(), &args)?)
        })
    }

    /// `new code(...args)` as one action. The new jig is queued like any
    /// other change.
    ///
    /// # Errors
    ///
    /// Same as [`Kernel::call`].
    pub fn construct(&mut self, code: &Value, args: &[Value]) -> KernelResult<Value> {
        let args = self.clone_args(args)?;
        self.act(|kernel| Ok(kernel.realm.construct(code, &args)?))
    }

    fn clone_args(&mut self, args: &[Value]) -> KernelResult<Vec<Value>> {
        let xray = self.xray();
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            out.push(xray.clone_value(&mut self.realm, arg)?);
        }
        Ok(out)
    }

    fn act(&mut self, action: impl FnOnce(&mut Self) -> KernelResult<Value>) -> KernelResult<Value> {
        let before = self.snapshot_jigs();
        self.record.begin();
        let result = match action(self) {
            Ok(result) => result,
            Err(err) => {
                let written = self.record.writes();
                self.restore(&before, &written)?;
                self.record.rollback();
                debug!(error = %err, restored = written.len(), "action threw");
                return Err(err);
            },
        };

        let changed = self.changed_jigs(&before)?;
        if changed.is_empty() {
            return Ok(result);
        }
        if let Err(err) = self.join_batch() {
            self.restore(&before, &changed)?;
            self.record.rollback();
            return Err(err);
        }
        match self.publish(&before, &changed) {
            Ok(()) => {
                for jig in self.record.creates() {
                    if !self.jigs.contains(&jig) {
                        self.jigs.push(jig);
                    }
                }
                info!(jigs = changed.len(), "action queued");
                Ok(result)
            },
            Err(err) => {
                warn!(error = %err, "action could not be queued; discarding batch");
                self.rollback()?;
                Err(err)
            },
        }
    }

    /// Created jigs, then written jigs whose state or bindings moved.
    fn changed_jigs(&mut self, before: &[Snapshot]) -> KernelResult<Vec<ObjectId>> {
        let mut changed: Vec<ObjectId> = self
            .record
            .creates()
            .into_iter()
            .filter(|jig| self.is_jig(*jig))
            .collect();
        for jig in self.record.writes() {
            if changed.contains(&jig) || !self.is_jig(jig) {
                continue;
            }
            let Some(prior) = before.iter().find(|b| b.jig == jig) else {
                changed.push(jig);
                continue;
            };
            let now = self.snapshot(jig)?;
            if !prior.state.equals(&now.state) || prior.bindings != now.bindings {
                changed.push(jig);
            }
        }
        Ok(changed)
    }

    /// Queue `changed` into the open batch, classes first.
    fn publish(&mut self, before: &[Snapshot], changed: &[ObjectId]) -> KernelResult<()> {
        let known = {
            let mut outbox = self.outbox.borrow_mut();
            for prior in before.iter().filter(|b| changed.contains(&b.jig)) {
                if !outbox.undo.iter().any(|u| u.jig == prior.jig) {
                    outbox.undo.push(prior.clone());
                }
            }
            outbox.staged.len()
        };
        for jig in changed {
            let class = self.class_of(*jig)?;
            let mut visiting = HashSet::new();
            self.enqueue_with_deps(class, &mut visiting)?;
            let mut outbox = self.outbox.borrow_mut();
            let batch = outbox.batch.as_mut().ok_or(KernelError::NoBatch)?;
            let temp = batch.enqueue(&self.bindings, &mut self.realm, *jig, TempKind::Output)?;
            debug!(%jig, location = %temp, "jig enqueued");
        }
        // Members staged by an earlier action carry stale state.
        for jig in changed {
            let position = self.outbox.borrow().staged.iter().position(|s| s.proxy == *jig);
            if let Some(index) = position.filter(|i| *i < known) {
                let staged = self.stage_jig(*jig)?;
                if let Some(slot) = self.outbox.borrow_mut().staged.get_mut(index) {
                    *slot = staged;
                }
            }
        }
        self.stage_members()
    }

    pub(crate) fn stage_jig(&mut self, jig: ObjectId) -> KernelResult<Staged> {
        let saver = BindingSaver {
            bindings: self.bindings.clone(),
            network: self.network.clone(),
        };
        let class = self.class_of(jig)?;
        let class = saver.save(&self.realm, class)?;
        let scheduler = Scheduler {
            membrane: Rc::clone(&self.membrane),
            bindings: self.bindings.clone(),
            outbox: Rc::clone(&self.outbox),
        };
        let xray = self.xray().restrict_owner(jig).with_saver(Rc::new(saver));
        let checkpoint = Checkpoint::capture(&xray, &mut self.realm, jig, Some(&scheduler))?;
        debug!(%jig, %class, tokens = checkpoint.tokens().len(), "jig staged");
        Ok(Staged {
            proxy: jig,
            payload: Payload::Jig {
                class,
                state: checkpoint.json().clone(),
            },
        })
    }

    fn snapshot_jigs(&mut self) -> Vec<Snapshot> {
        let jigs = self.jigs.clone();
        let mut out = Vec::with_capacity(jigs.len());
        for jig in jigs {
            match self.snapshot(jig) {
                Ok(snapshot) => out.push(snapshot),
                Err(err) => debug!(%jig, error = %err, "jig not snapshotted"),
            }
        }
        out
    }

    fn snapshot(&mut self, jig: ObjectId) -> KernelResult<Snapshot> {
        let xray = Self::snapshot_xray(self.xray());
        let state = Checkpoint::capture(&xray, &mut self.realm, jig, None)?;
        let bindings = self.bindings.store().get(&self.network, jig).cloned();
        Ok(Snapshot { jig, state, bindings })
    }

    fn snapshot_xray(xray: Xray) -> Xray {
        xray.with_saver(Rc::new(HeapTokens)).with_loader(Rc::new(HeapTokens))
    }

    fn restore(&mut self, before: &[Snapshot], jigs: &[ObjectId]) -> KernelResult<()> {
        for prior in before.iter().filter(|b| jigs.contains(&b.jig)) {
            self.restore_snapshot(prior)?;
        }
        Ok(())
    }

    /// Put a jig's state and bindings back to `snapshot`.
    pub(crate) fn restore_snapshot(&mut self, snapshot: &Snapshot) -> KernelResult<()> {
        let xray = Self::snapshot_xray(self.xray());
        snapshot.state.restore_in_place(&xray, &mut self.realm, snapshot.jig)?;
        let set = snapshot.bindings.clone().unwrap_or_default();
        self.bindings.store_mut().put(&self.network, snapshot.jig, set);
        self.bindings.store().project(&mut self.realm, snapshot.jig)?;
        Ok(())
    }

    fn is_jig(&self, id: ObjectId) -> bool {
        self.membrane.registry().borrow().kind(id) == Some(ProxyKind::Jig)
    }

    /// The code proxy `jig` was constructed from.
    fn class_of(&self, jig: ObjectId) -> KernelResult<ObjectId> {
        self.realm
            .owner_class(jig)
            .and_then(|class| self.membrane.registry().borrow().lookup_proxy(class))
            .ok_or_else(|| KernelError::NotCode(self.realm.type_name(&Value::Object(jig))))
    }
}
