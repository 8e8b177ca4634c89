//! Data models for netwatch
//!
//! Shared between the capture client and the inspector.

pub mod request;
pub mod timestamp;
pub mod wire;

pub use request::*;
pub use wire::*;
