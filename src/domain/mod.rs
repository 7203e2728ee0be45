//! Domain layer types and invariants.

pub mod artifact;
pub mod error;
pub mod filename;
pub mod handle;
pub mod spec;
