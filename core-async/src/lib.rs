//! Async runtime facade for the jukebox core.
//!
//! Every `core-*` crate reaches the executor through this crate instead of
//! naming Tokio directly, so timers, channels and cancellation all come from
//! one place. [`time::Instant`] and [`time::sleep`] are the Tokio versions,
//! so they follow the paused clock in tests.
//!
//! # Modules
//!
//! - `task`: task spawning and join handles
//! - `time`: sleep, interval, timeout and a pausable `Instant`
//! - `sync`: channels, `Notify`, locks and `CancellationToken`
//! - `runtime`: blocking entry points for hosts without an executor
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::CancellationToken;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let token = CancellationToken::new();
//!     let child = token.child_token();
//!
//!     let handle = core_async::spawn(async move {
//!         core_async::select! {
//!             _ = child.cancelled() => "cancelled",
//!             _ = sleep(Duration::from_secs(60)) => "elapsed",
//!         }
//!     });
//!
//!     token.cancel();
//!     assert_eq!(handle.await.unwrap(), "cancelled");
//! }
//! ```

pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};

/// Waits on several branches and runs the first to complete.
pub use tokio::select;

/// Runs several futures concurrently and waits for all of them.
pub use tokio::join;

pub use futures::{future, stream, FutureExt, StreamExt};
