//! Operator commands
//!
//! Thin wrappers over the engine: each command loads config, opens the
//! store, and delegates. The interactive breakdown that creates runs lives
//! outside this crate; these commands operate on runs that already exist.

pub mod cancel;
pub mod clean;
pub mod common;
pub mod list;
pub mod resume;
pub mod run;
pub mod status;
