//! Workspace façade crate.
//!
//! Host applications can depend on `jukebox-workspace` with the default
//! `service` feature instead of wiring each workspace crate individually.
//! The crates are re-exported under their own names; the most used types are
//! also available at the root.

#[cfg(feature = "service")]
pub use bridge_traits;
#[cfg(feature = "service")]
pub use core_runtime;
#[cfg(feature = "service")]
pub use core_service;
#[cfg(feature = "service")]
pub use core_sync;

#[cfg(feature = "service")]
pub use core_runtime::config::{CoreConfig, RefreshPolicy};
#[cfg(feature = "service")]
pub use core_service::{CoreError, CoreService};
#[cfg(feature = "service")]
pub use core_sync::{NowPlayingStore, Session};
