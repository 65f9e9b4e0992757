//! Ciphertext handles and the registry that keeps them current.

mod handle;
mod registry;

pub use handle::{CiphertextHandle, FieldId, FieldKind};
pub use registry::{CiphertextRegistry, HandleRefresh};
