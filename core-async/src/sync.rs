//! Synchronization primitives.
//!
//! The now-playing core leans on three of these:
//! - `watch` holds the latest song/queue snapshot and wakes subscribers
//! - `Notify` carries the single coalesced "refresh pending" permit
//! - `CancellationToken` tears every background task down at once
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::{watch, Notify};
//! use std::sync::Arc;
//!
//! async fn example() {
//!     let (tx, mut rx) = watch::channel(0u32);
//!     tx.send_replace(1);
//!     rx.changed().await.unwrap();
//!     assert_eq!(*rx.borrow(), 1);
//!
//!     // Two notifications before anyone waits collapse into one permit.
//!     let notify = Arc::new(Notify::new());
//!     notify.notify_one();
//!     notify.notify_one();
//!     notify.notified().await;
//! }
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Mutex, MutexGuard, Notify, OnceCell, RwLock,
    RwLockReadGuard, RwLockWriteGuard, Semaphore,
};
pub use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFuture};
