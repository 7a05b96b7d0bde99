//! Scrobble Sink
//!
//! Play-history recording (Last.fm and friends) is owned by the host. The core
//! only decides *when* a song counts as played and hands it over.

use crate::{error::Result, music::Song};

/// Destination for play events.
///
/// `is_scrobbling_enabled` is consulted for every candidate song, so a user
/// revoking authorization takes effect on the next change without restarting
/// anything.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::scrobble::ScrobbleSink;
///
/// async fn maybe_record(sink: &dyn ScrobbleSink, song: &Song) -> Result<()> {
///     if sink.is_scrobbling_enabled() {
///         sink.record_scrobble(song).await?;
///     }
///     Ok(())
/// }
/// ```
#[async_trait::async_trait]
pub trait ScrobbleSink: Send + Sync {
    /// Whether the user has authorized scrobbling right now.
    fn is_scrobbling_enabled(&self) -> bool;

    /// Records that `song` started playing. Best effort; callers do not retry.
    async fn record_scrobble(&self, song: &Song) -> Result<()>;
}
