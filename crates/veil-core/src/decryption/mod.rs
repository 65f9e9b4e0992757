//! Decryption of tracked fields.

mod orchestrator;
mod values;

pub use orchestrator::{DecryptRequest, DecryptionOrchestrator, DecryptionReport, FieldOutcome};
pub use values::DecryptedValue;
