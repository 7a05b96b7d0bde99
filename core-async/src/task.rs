//! Task spawning.
//!
//! Spawned tasks must be `Send + 'static`; the now-playing loop, the push
//! listener and the scrobble gate each run as one of these.

pub use tokio::task::{yield_now, AbortHandle, JoinError, JoinHandle, JoinSet};

/// Spawns a new asynchronous task on the current runtime.
///
/// # Examples
///
/// ```rust
/// use core_async::task::spawn;
///
/// # async fn example() {
/// let handle = spawn(async { 42 });
/// assert_eq!(handle.await.unwrap(), 42);
/// # }
/// ```
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}

/// Result type for task joins.
pub type Result<T> = std::result::Result<T, JoinError>;
