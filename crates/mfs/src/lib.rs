#![forbid(unsafe_code)]
//! MiniFS public API facade.
//!
//! Re-exports the in-process filesystem from `mfs-core` through a stable
//! external interface. Processes that want the socket protocol instead
//! depend on `mfs-client` / `mfs-server` directly.

pub use mfs_core::*;
