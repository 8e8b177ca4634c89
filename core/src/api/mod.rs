//! netwatch API
//!
//! Entry points used by the `netwatch` binary and embedding front ends.

pub mod inspector;

pub use inspector::{init_logging, Inspector};
