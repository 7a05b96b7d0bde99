//! View Lifecycle
//!
//! Notifies the core when the now-playing view becomes visible or goes away,
//! so sync work only runs while somebody is looking at it.

use crate::error::Result;

/// Visibility of the now-playing view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    /// The view is on screen; sync should be running.
    Active,
    /// The view was navigated away from or the window closed.
    Inactive,
}

/// View lifecycle observer.
///
/// # Platform Support
///
/// - **Desktop**: navigation events of the hosting window
/// - **Mobile**: screen appear/disappear callbacks
/// - **Web**: Page Visibility API
///
/// # Example
///
/// ```ignore
/// use bridge_traits::lifecycle::{ViewLifecycle, ViewState};
///
/// async fn follow(observer: &dyn ViewLifecycle) -> Result<()> {
///     let mut stream = observer.subscribe_changes().await?;
///     while let Some(state) = stream.next().await {
///         match state {
///             ViewState::Active => start_sync(),
///             ViewState::Inactive => stop_sync(),
///         }
///     }
///     Ok(())
/// }
/// ```
#[async_trait::async_trait]
pub trait ViewLifecycle: Send + Sync {
    /// Current visibility.
    async fn current_state(&self) -> Result<ViewState>;

    /// Subscribe to visibility changes.
    async fn subscribe_changes(&self) -> Result<Box<dyn ViewStateStream>>;
}

/// Stream of view visibility changes.
#[async_trait::async_trait]
pub trait ViewStateStream: Send {
    /// Returns `None` when the stream is closed.
    async fn next(&mut self) -> Option<ViewState>;
}
