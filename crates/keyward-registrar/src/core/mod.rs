//! Core validation logic for the registrar

mod changes;
mod verification;

pub use changes::normalize_changes;
pub use verification::verify_signatures;
