//! Standard membrane layers, outermost first: admin, errored, private,
//! record, intrinsic, base. A bindings layer from `jig-bindings` slots in
//! after errored.

pub mod admin;
pub mod base;
pub mod errored;
pub mod intrinsic;
pub mod private;
pub mod record;

pub use admin::AdminLayer;
pub use base::BaseLayer;
pub use errored::{ErroredLayer, INTROSPECTION_KEYS, ErrorSource};
pub use intrinsic::IntrinsicLayer;
pub use private::{PRIVATE_PREFIX, PrivateLayer, is_private};
pub use record::{OUTSIDE_METHOD, RecordLayer};
