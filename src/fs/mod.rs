//! Durable state and working-copy file locks
//!
//! `store` persists runs under the state directory with atomic replace
//! semantics; `locking` guards working-copy paths with advisory `fs2` locks
//! on sentinel files. Both are cooperative: correctness assumes all writers
//! go through these modules.

pub mod locking;
pub mod store;

pub use locking::{LockManager, LockSet};
pub use store::Store;
