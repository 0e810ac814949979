//! Replaying published transactions.

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use jig_bindings::Location;
use jig_membrane::ProxyKind;
use jig_realm::{ObjectId, Property, Value};
use jig_xray::{Node, TokenLoader};
use tracing::{debug, info};

use crate::error::{KernelError, KernelResult};
use crate::kernel::Kernel;
use crate::ledger::Output;
use crate::tokens::CacheLoader;

type LocalFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

impl Kernel {
    /// The code or jig published at `location`, fetching and replaying its
    /// transaction if this kernel has not seen it.
    ///
    /// Every code of the transaction is evaluated and every jig allocated
    /// before any state is restored, so outputs of one transaction may
    /// reference each other.
    ///
    /// # Errors
    ///
    /// Ledger errors, evaluation errors of the published source, and
    /// [`KernelError::NotFound`] when the transaction has no such output.
    pub async fn load(&mut self, location: &str) -> KernelResult<Value> {
        if let Some(id) = self.loaded_at(location) {
            return Ok(Value::Object(id));
        }
        let parsed = Location::parse(location)?;
        let Some(txid) = parsed.txid().map(str::to_owned) else {
            return Err(KernelError::NotFound(location.to_owned()));
        };
        self.load_transaction(&txid).await?;
        self.loaded_at(&parsed.to_string())
            .map(Value::Object)
            .ok_or_else(|| KernelError::NotFound(location.to_owned()))
    }

    fn loaded_at(&self, location: &str) -> Option<ObjectId> {
        self.loaded.borrow().get(location).copied()
    }

    fn load_transaction<'a>(&'a mut self, txid: &'a str) -> LocalFuture<'a, KernelResult<()>> {
        Box::pin(async move {
            let tx = self.ledger.fetch(txid).await?;
            let loader = CacheLoader {
                loaded: Rc::clone(&self.loaded),
                txid: txid.to_owned(),
            };

            let mut nodes = Vec::with_capacity(tx.outputs.len());
            let mut references = Vec::new();
            for output in &tx.outputs {
                let state = match output {
                    Output::Deploy { props, .. } => props,
                    Output::Jig { class, state, .. } => {
                        references.push(class.clone());
                        state
                    },
                };
                let node = Node::from_json(state)?;
                references.extend(node.refs());
                nodes.push(node);
            }
            for reference in references {
                let absolute = loader.absolute(&reference)?;
                let foreign = Location::parse(&absolute)?.txid() != Some(txid);
                if foreign && self.loaded_at(&absolute).is_none() {
                    debug!(%txid, dependency = %absolute, "loading referenced transaction");
                    self.load(&absolute).await?;
                }
            }

            // Codes first, so jigs can find classes published beside them.
            let mut proxies: Vec<Option<ObjectId>> = vec![None; tx.outputs.len()];
            for (index, output) in tx.outputs.iter().enumerate() {
                let Output::Deploy { src, owner, satoshis, .. } = output else {
                    continue;
                };
                let evaluation = self.evaluate(src)?;
                let proxy = self.wrap_code(evaluation)?;
                let location = Location::output(txid, output_index(txid, index)?);
                self.settle_loaded(&tx.network, proxy, &location, owner.as_ref(), *satoshis)?;
                if let Some(slot) = proxies.get_mut(index) {
                    *slot = Some(proxy);
                }
            }
            for (index, output) in tx.outputs.iter().enumerate() {
                let Output::Jig { class, owner, satoshis, .. } = output else {
                    continue;
                };
                let Value::Object(code) = loader.load(&mut self.realm, class)? else {
                    return Err(invalid(txid, "jig class is not code"));
                };
                let instance = self.realm.allocate_instance(code)?;
                let jig = self.membrane.wrap(&mut self.realm, instance, ProxyKind::Jig)?;
                let location = Location::output(txid, output_index(txid, index)?);
                self.settle_loaded(&tx.network, jig, &location, owner.as_ref(), *satoshis)?;
                self.jigs.push(jig);
                if let Some(slot) = proxies.get_mut(index) {
                    *slot = Some(jig);
                }
            }

            let xray = self.xray().with_loader(Rc::new(loader));
            for (proxy, node) in proxies.iter().zip(&nodes) {
                let Some(proxy) = proxy else {
                    continue;
                };
                let Value::Object(state) = xray.deserialize_node(&mut self.realm, node)? else {
                    return Err(invalid(txid, "props must be an object"));
                };
                self.restore_props(*proxy, state)?;
            }
            info!(%txid, network = %tx.network, outputs = tx.outputs.len(), "transaction loaded");
            Ok(())
        })
    }

    /// Copy the properties of `state` onto a code or jig, and expose a
    /// code's `deps` to its globals.
    fn restore_props(&mut self, proxy: ObjectId, state: ObjectId) -> KernelResult<()> {
        let target = self.realm.resolve_target(proxy);
        for key in self.realm.raw_own_keys(state)? {
            let value = self.realm.raw_get(state, &key)?;
            self.realm
                .object_mut(target)?
                .props
                .insert(key.as_str(), Property::data(value.clone()));
            if key != "deps" {
                continue;
            }
            let Value::Object(table) = value else {
                continue;
            };
            let Some(globals) = self.globals.get(&proxy).cloned() else {
                continue;
            };
            for name in self.realm.raw_own_keys(table)? {
                let dep = self.realm.raw_get(table, &name)?;
                globals.set(name, dep);
            }
        }
        Ok(())
    }
}

fn output_index(txid: &str, index: usize) -> KernelResult<u32> {
    u32::try_from(index).map_err(|_| invalid(txid, "too many outputs"))
}

fn invalid(txid: &str, reason: &str) -> KernelError {
    KernelError::InvalidTransaction {
        txid: txid.to_owned(),
        reason: reason.to_owned(),
    }
}
