//! Workspace entry crate.
//!
//! Host applications depend on `native-network` and get the command surface of
//! `core-service` plus the shared feature flags. With `desktop-shims` (default)
//! the desktop network enumerator from `bridge-desktop` is wired in
//! automatically.

pub use core_service::*;
