//! Membrane composition.

use std::rc::Rc;

use crate::chain::{Interceptor, Membrane};
use crate::layers::{
    AdminLayer, BaseLayer, ErroredLayer, IntrinsicLayer, ErrorSource, PrivateLayer, RecordLayer,
};
use crate::record::Record;
use crate::registry::SharedRegistry;

/// Builds a [`Membrane`] one layer at a time, outermost first.
///
/// [`MembraneBuilder::build`] always closes the chain with a [`BaseLayer`].
///
/// # Example
///
/// ```
/// use jig_membrane::{MembraneBuilder, Record, Registry};
///
/// let membrane = MembraneBuilder::new(Registry::shared())
///     .admin()
///     .private()
///     .record(Record::new())
///     .intrinsic()
///     .build();
/// assert_eq!(
///     membrane.layer_names(),
///     ["admin", "private", "record", "intrinsic", "base"]
/// );
/// ```
#[derive(Debug)]
pub struct MembraneBuilder {
    registry: SharedRegistry,
    layers: Vec<Rc<dyn Interceptor>>,
    record: Option<Record>,
}

impl MembraneBuilder {
    /// Start an empty chain over `registry`.
    #[must_use]
    pub fn new(registry: SharedRegistry) -> Self {
        Self {
            registry,
            layers: Vec::new(),
            record: None,
        }
    }

    /// The chain used for jigs and code: admin, errored, the optional
    /// bindings layer, private, record, intrinsic, base.
    #[must_use]
    pub fn standard(
        registry: SharedRegistry,
        record: Record,
        source: Rc<dyn ErrorSource>,
        bindings: Option<Rc<dyn Interceptor>>,
    ) -> Rc<Membrane> {
        let mut builder = Self::new(registry).admin().errored(source);
        if let Some(layer) = bindings {
            builder = builder.layer(layer);
        }
        builder.private().record(record).intrinsic().build()
    }

    /// Append any interceptor.
    #[must_use]
    pub fn layer(mut self, layer: Rc<dyn Interceptor>) -> Self {
        self.layers.push(layer);
        self
    }

    /// Append the admin bypass.
    #[must_use]
    pub fn admin(self) -> Self {
        self.layer(Rc::new(AdminLayer))
    }

    /// Append the terminal-error check.
    #[must_use]
    pub fn errored(self, source: Rc<dyn ErrorSource>) -> Self {
        self.layer(Rc::new(ErroredLayer::new(source)))
    }

    /// Append private-name encapsulation.
    #[must_use]
    pub fn private(self) -> Self {
        self.layer(Rc::new(PrivateLayer))
    }

    /// Append recording into `record`. Jigs constructed through the chain
    /// are reported to the same record.
    #[must_use]
    pub fn record(mut self, record: Record) -> Self {
        self.record = Some(record.clone());
        self.layer(Rc::new(RecordLayer::new(record)))
    }

    /// Append the collection passthrough.
    #[must_use]
    pub fn intrinsic(self) -> Self {
        self.layer(Rc::new(IntrinsicLayer))
    }

    /// Close the chain with the base layer.
    #[must_use]
    pub fn build(mut self) -> Rc<Membrane> {
        self.layers.push(Rc::new(BaseLayer::new(self.record.take())));
        Rc::new(Membrane::new(self.layers, self.registry))
    }
}
