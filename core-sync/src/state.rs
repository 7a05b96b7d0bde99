//! # Now-Playing State
//!
//! Observable snapshot of what the jukebox is doing, plus the local
//! "is playing" flag the UI toggles.
//!
//! ## Overview
//!
//! `NowPlayingStore` is the single publication point for the refresh loop.
//! Each value lives in a `watch` channel so readers always see the latest
//! value and can await changes. Fetch failures go out on a separate
//! broadcast channel; they never overwrite a published song.
//!
//! ```ignore
//! let store = sync.store();
//! let mut songs = store.current_song();
//! while songs.changed().await.is_ok() {
//!     if let Some(song) = songs.borrow().clone() {
//!         println!("now playing {song}");
//!     }
//! }
//! ```

use bridge_traits::{BridgeError, Song};
use core_async::sync::{broadcast, watch};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

const FAILURE_BUFFER_SIZE: usize = 32;

/// Where the refresh loop is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    /// Not activated.
    Idle,
    /// Waiting for a push notification, fallback timer or poll tick.
    AwaitingSignal,
    /// A fetch cycle is in flight.
    Fetching,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SyncPhase::Idle => "idle",
            SyncPhase::AwaitingSignal => "awaiting_signal",
            SyncPhase::Fetching => "fetching",
        };
        f.write_str(label)
    }
}

/// Classification of a failure published on the failure channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The server rejected the session credentials.
    AuthenticationRequired,
    /// Nothing is playing, or the resource is gone.
    NotFound,
    /// Transport or server-side failure.
    Network,
    /// The push channel could not be (re)established.
    PushChannelExhausted,
}

impl From<&BridgeError> for FailureKind {
    fn from(error: &BridgeError) -> Self {
        match error {
            BridgeError::Unauthorized(_) => FailureKind::AuthenticationRequired,
            BridgeError::NotFound(_) => FailureKind::NotFound,
            _ => FailureKind::Network,
        }
    }
}

/// A failure observed by the refresh loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Fetch cycle that produced the failure (0 outside a cycle).
    pub cycle: u64,
}

impl FetchFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>, cycle: u64) -> Self {
        Self {
            kind,
            message: message.into(),
            cycle,
        }
    }

    pub fn from_bridge(error: &BridgeError, cycle: u64) -> Self {
        Self::new(FailureKind::from(error), error.to_string(), cycle)
    }

    /// Whether the host should send the user to the login screen.
    pub fn requires_login(&self) -> bool {
        self.kind == FailureKind::AuthenticationRequired
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cycle {}: {:?}: {}", self.cycle, self.kind, self.message)
    }
}

/// Point-in-time copy of the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NowPlayingState {
    pub current_song: Option<Song>,
    pub queue: Vec<Song>,
    pub is_playing: bool,
}

impl NowPlayingState {
    /// The current song followed by the queue.
    ///
    /// Empty unless both a current song and a non-empty queue are known.
    pub fn all_songs(&self) -> Vec<Song> {
        match &self.current_song {
            Some(song) if !self.queue.is_empty() => std::iter::once(song.clone())
                .chain(self.queue.iter().cloned())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// A current song together with the playing flag at the moment it was
/// published.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PublishedSong {
    pub(crate) song: Song,
    pub(crate) is_playing: bool,
}

struct StoreInner {
    current_song: watch::Sender<Option<Song>>,
    published: watch::Sender<Option<PublishedSong>>,
    queue: watch::Sender<Vec<Song>>,
    is_playing: watch::Sender<bool>,
    failures: broadcast::Sender<FetchFailure>,
}

/// Shared, observable now-playing state. Clones share the same channels.
#[derive(Clone)]
pub struct NowPlayingStore {
    inner: Arc<StoreInner>,
}

impl NowPlayingStore {
    pub fn new() -> Self {
        let (failures, _) = broadcast::channel(FAILURE_BUFFER_SIZE);
        Self {
            inner: Arc::new(StoreInner {
                current_song: watch::Sender::new(None),
                published: watch::Sender::new(None),
                queue: watch::Sender::new(Vec::new()),
                is_playing: watch::Sender::new(false),
                failures,
            }),
        }
    }

    /// Receiver for the current song. `None` until the first successful fetch.
    pub fn current_song(&self) -> watch::Receiver<Option<Song>> {
        self.inner.current_song.subscribe()
    }

    pub fn queue(&self) -> watch::Receiver<Vec<Song>> {
        self.inner.queue.subscribe()
    }

    pub fn playing(&self) -> watch::Receiver<bool> {
        self.inner.is_playing.subscribe()
    }

    /// Failures published after this call.
    pub fn failures(&self) -> broadcast::Receiver<FetchFailure> {
        self.inner.failures.subscribe()
    }

    pub fn snapshot(&self) -> NowPlayingState {
        NowPlayingState {
            current_song: self.inner.current_song.borrow().clone(),
            queue: self.inner.queue.borrow().clone(),
            is_playing: *self.inner.is_playing.borrow(),
        }
    }

    pub fn all_songs(&self) -> Vec<Song> {
        self.snapshot().all_songs()
    }

    pub fn is_playing(&self) -> bool {
        *self.inner.is_playing.borrow()
    }

    pub fn set_playing(&self, playing: bool) {
        self.inner.is_playing.send_replace(playing);
    }

    /// Flips the playing flag and returns the new value.
    pub fn toggle_playing(&self) -> bool {
        let mut now = false;
        self.inner.is_playing.send_modify(|playing| {
            *playing = !*playing;
            now = *playing;
        });
        now
    }

    pub(crate) fn publish_current_song(&self, song: Song) {
        let is_playing = self.is_playing();
        self.inner.published.send_replace(Some(PublishedSong {
            song: song.clone(),
            is_playing,
        }));
        self.inner.current_song.send_replace(Some(song));
    }

    pub(crate) fn published_songs(&self) -> watch::Receiver<Option<PublishedSong>> {
        self.inner.published.subscribe()
    }

    pub(crate) fn publish_queue(&self, queue: Vec<Song>) {
        self.inner.queue.send_replace(queue);
    }

    pub(crate) fn publish_failure(&self, failure: FetchFailure) {
        // No subscribers is fine; failures are also reported as events.
        let _ = self.inner.failures.send(failure);
    }
}

impl Default for NowPlayingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NowPlayingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NowPlayingStore")
            .field("state", &self.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(id: &str) -> Song {
        Song::new(id, id, "LCD Soundsystem", "Sound Of Silver")
    }

    #[test]
    fn test_store_starts_empty_and_paused() {
        let store = NowPlayingStore::new();
        let state = store.snapshot();

        assert!(state.current_song.is_none());
        assert!(state.queue.is_empty());
        assert!(!state.is_playing);
        assert!(store.all_songs().is_empty());
    }

    #[test]
    fn test_all_songs_requires_song_and_queue() {
        let store = NowPlayingStore::new();

        store.publish_current_song(song("a"));
        assert!(store.all_songs().is_empty());

        store.publish_queue(vec![song("b"), song("c")]);
        let ids: Vec<_> = store.all_songs().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        store.publish_queue(Vec::new());
        assert!(store.all_songs().is_empty());
    }

    #[test]
    fn test_toggle_playing() {
        let store = NowPlayingStore::new();
        let mut playing = store.playing();

        assert!(store.toggle_playing());
        assert!(store.is_playing());
        assert!(playing.has_changed().unwrap());
        playing.borrow_and_update();

        store.set_playing(false);
        assert!(!*playing.borrow_and_update());
        assert!(store.toggle_playing());
    }

    #[test]
    fn test_published_song_captures_playing_flag() {
        let store = NowPlayingStore::new();
        let published = store.published_songs();

        store.set_playing(true);
        store.publish_current_song(song("a"));
        store.set_playing(false);

        let latest = published.borrow().clone().unwrap();
        assert_eq!(latest.song.id, "a");
        assert!(latest.is_playing);
    }

    #[test]
    fn test_publish_without_receivers_still_updates() {
        let store = NowPlayingStore::new();
        store.publish_current_song(song("4B52884E1E293890"));
        assert_eq!(
            store.snapshot().current_song.map(|s| s.id),
            Some("4B52884E1E293890".to_string())
        );
    }

    #[test]
    fn test_failure_kind_mapping() {
        let auth = FetchFailure::from_bridge(&BridgeError::Unauthorized("401".into()), 3);
        assert_eq!(auth.kind, FailureKind::AuthenticationRequired);
        assert!(auth.requires_login());
        assert_eq!(auth.cycle, 3);

        let missing = FetchFailure::from_bridge(&BridgeError::NotFound("nothing".into()), 1);
        assert_eq!(missing.kind, FailureKind::NotFound);
        assert!(!missing.requires_login());

        let network = FetchFailure::from_bridge(&BridgeError::Network("reset".into()), 1);
        assert_eq!(network.kind, FailureKind::Network);
    }

    #[test]
    fn test_failures_are_broadcast() {
        let store = NowPlayingStore::new();
        let mut failures = store.failures();

        store.publish_failure(FetchFailure::new(FailureKind::Network, "boom", 2));
        let failure = failures.try_recv().unwrap();
        assert_eq!(failure.message, "boom");
    }
}
