//! Workspace placeholder crate.
//!
//! This crate exposes the service façade behind the `service` feature so host
//! applications can depend on a single package instead of wiring each
//! workspace crate (`core-sync`, `core-library`, `core-runtime`) individually.

#[cfg(feature = "service")]
pub use core_service::*;
