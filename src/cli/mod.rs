//! Command-line surface: argument types and dispatch

mod dispatch;
mod types;

pub use dispatch::dispatch;
pub use types::{Cli, Commands};
