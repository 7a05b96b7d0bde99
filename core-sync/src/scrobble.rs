//! # Scrobble Gate
//!
//! Decides when a current-song change becomes a play event for the host's
//! [`ScrobbleSink`].
//!
//! A song is scrobbled when all of the following hold at the moment the
//! change is published:
//! 1. its id differs from the previously observed song;
//! 2. the local playing flag is set;
//! 3. `ScrobbleSink::is_scrobbling_enabled` returns `true` (asked every time).
//!
//! The first song observed after activation only establishes the baseline.
//! Sink failures are logged and dropped; a play is never submitted twice.

use crate::state::{NowPlayingStore, PublishedSong};
use bridge_traits::{ScrobbleSink, Song};
use core_async::sync::{watch, CancellationToken};
use core_runtime::events::{CoreEvent, EventBus, ScrobbleEvent, ScrobbleSkipReason};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Outcome of feeding one song observation to the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrobbleDecision {
    /// First song seen; nothing to compare against.
    Baseline,
    /// Same id as the last observation.
    Unchanged,
    /// The song changed while playback was paused.
    NotPlaying,
    /// The song changed during playback; ask the sink.
    Candidate,
}

/// Change detector over the stream of current songs.
#[derive(Debug, Default, Clone)]
pub struct ScrobbleGate {
    last_seen: Option<String>,
}

impl ScrobbleGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `song` as the latest observation and classifies it.
    ///
    /// The baseline moves to every new id, including ones that are not
    /// scrobbled, so a paused change is not replayed once playback resumes.
    pub fn observe(&mut self, song: &Song, is_playing: bool) -> ScrobbleDecision {
        let previous = self.last_seen.replace(song.id.clone());

        match previous {
            None => ScrobbleDecision::Baseline,
            Some(id) if id == song.id => ScrobbleDecision::Unchanged,
            Some(_) if !is_playing => ScrobbleDecision::NotPlaying,
            Some(_) => ScrobbleDecision::Candidate,
        }
    }

    pub fn last_seen(&self) -> Option<&str> {
        self.last_seen.as_deref()
    }
}

/// Task that feeds store updates through a [`ScrobbleGate`] into the sink.
///
/// Subscribes and seeds its gate at construction, so a song already on
/// screen when the sync starts is never scrobbled.
pub(crate) struct ScrobbleDriver {
    sink: Arc<dyn ScrobbleSink>,
    songs: watch::Receiver<Option<PublishedSong>>,
    gate: ScrobbleGate,
    events: Arc<EventBus>,
    cancel: CancellationToken,
}

impl ScrobbleDriver {
    pub(crate) fn new(
        sink: Arc<dyn ScrobbleSink>,
        store: NowPlayingStore,
        events: Arc<EventBus>,
        cancel: CancellationToken,
    ) -> Self {
        let mut songs = store.published_songs();
        let mut gate = ScrobbleGate::new();

        let initial = songs.borrow_and_update().clone();
        if let Some(published) = initial {
            gate.observe(&published.song, published.is_playing);
        }

        Self {
            sink,
            songs,
            gate,
            events,
            cancel,
        }
    }

    #[instrument(skip(self))]
    pub(crate) async fn run(mut self) {
        loop {
            core_async::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                changed = self.songs.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }

            let Some(PublishedSong { song, is_playing }) = self.songs.borrow_and_update().clone()
            else {
                continue;
            };

            match self.gate.observe(&song, is_playing) {
                ScrobbleDecision::Baseline | ScrobbleDecision::Unchanged => {}
                ScrobbleDecision::NotPlaying => {
                    debug!(song_id = %song.id, "Song changed while paused, not scrobbling");
                    self.skipped(&song, ScrobbleSkipReason::NotPlaying);
                }
                ScrobbleDecision::Candidate => {
                    if !self.sink.is_scrobbling_enabled() {
                        debug!(song_id = %song.id, "Scrobbling disabled");
                        self.skipped(&song, ScrobbleSkipReason::Disabled);
                        continue;
                    }

                    let recorded = core_async::select! {
                        biased;
                        _ = self.cancel.cancelled() => return,
                        result = self.sink.record_scrobble(&song) => result,
                    };

                    match recorded {
                        Ok(()) => {
                            info!(song_id = %song.id, "Scrobbled {}", song);
                            self.emit(ScrobbleEvent::Recorded {
                                song_id: song.id.clone(),
                            });
                        }
                        Err(e) => {
                            warn!(song_id = %song.id, "Scrobble failed, dropping: {}", e);
                            self.emit(ScrobbleEvent::Failed {
                                song_id: song.id.clone(),
                                message: e.to_string(),
                            });
                        }
                    }
                }
            }
        }
    }

    fn skipped(&self, song: &Song, reason: ScrobbleSkipReason) {
        self.emit(ScrobbleEvent::Skipped {
            song_id: song.id.clone(),
            reason,
        });
    }

    fn emit(&self, event: ScrobbleEvent) {
        let _ = self.events.emit(CoreEvent::Scrobble(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::BridgeError;
    use core_async::Duration;
    use mockall::mock;
    use std::sync::atomic::{AtomicBool, Ordering};

    mock! {
        Sink {}

        #[async_trait]
        impl ScrobbleSink for Sink {
            fn is_scrobbling_enabled(&self) -> bool;
            async fn record_scrobble(&self, song: &Song) -> BridgeResult<()>;
        }
    }

    fn song(id: &str) -> Song {
        Song::new(id, id, "LCD Soundsystem", "Sound Of Silver")
    }

    async fn settle() {
        core_async::sleep(Duration::from_millis(10)).await;
    }

    fn start(sink: MockSink, store: &NowPlayingStore) -> (CancellationToken, Arc<EventBus>) {
        let cancel = CancellationToken::new();
        let events = Arc::new(EventBus::new(32));
        let driver = ScrobbleDriver::new(Arc::new(sink), store.clone(), events.clone(), cancel.clone());
        core_async::spawn(driver.run());
        (cancel, events)
    }

    #[test]
    fn test_gate_first_song_is_baseline() {
        let mut gate = ScrobbleGate::new();
        assert_eq!(gate.observe(&song("A"), true), ScrobbleDecision::Baseline);
        assert_eq!(gate.last_seen(), Some("A"));
    }

    #[test]
    fn test_gate_same_id_is_unchanged() {
        let mut gate = ScrobbleGate::new();
        gate.observe(&song("A"), true);

        let mut renamed = song("A");
        renamed.name = "Get Innocuous! (Live)".to_string();
        assert_eq!(gate.observe(&renamed, true), ScrobbleDecision::Unchanged);
    }

    #[test]
    fn test_gate_paused_change_moves_baseline() {
        let mut gate = ScrobbleGate::new();
        gate.observe(&song("A"), true);

        assert_eq!(gate.observe(&song("B"), false), ScrobbleDecision::NotPlaying);
        // Resuming on the same song does not replay it.
        assert_eq!(gate.observe(&song("B"), true), ScrobbleDecision::Unchanged);
        assert_eq!(gate.observe(&song("C"), true), ScrobbleDecision::Candidate);
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_scrobbles_changed_song_once() {
        let mut sink = MockSink::new();
        sink.expect_is_scrobbling_enabled().times(1).returning(|| true);
        sink.expect_record_scrobble()
            .withf(|song| song.id == "B")
            .times(1)
            .returning(|_| Ok(()));

        let store = NowPlayingStore::new();
        store.set_playing(true);
        let (cancel, events) = start(sink, &store);
        let mut stream = events.subscribe();

        settle().await;
        store.publish_current_song(song("A"));
        settle().await;
        store.publish_current_song(song("A"));
        settle().await;
        store.publish_current_song(song("B"));
        settle().await;

        assert_eq!(
            stream.try_recv().unwrap(),
            CoreEvent::Scrobble(ScrobbleEvent::Recorded {
                song_id: "B".to_string()
            })
        );
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_skips_when_not_playing() {
        let mut sink = MockSink::new();
        sink.expect_is_scrobbling_enabled().never();
        sink.expect_record_scrobble().never();

        let store = NowPlayingStore::new();
        store.set_playing(true);
        let (cancel, events) = start(sink, &store);
        let mut stream = events.subscribe();

        settle().await;
        store.publish_current_song(song("A"));
        settle().await;
        store.set_playing(false);
        store.publish_current_song(song("B"));
        settle().await;

        assert_eq!(
            stream.try_recv().unwrap(),
            CoreEvent::Scrobble(ScrobbleEvent::Skipped {
                song_id: "B".to_string(),
                reason: ScrobbleSkipReason::NotPlaying,
            })
        );
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_checks_enabled_fresh_each_change() {
        let enabled = Arc::new(AtomicBool::new(false));
        let flag = enabled.clone();

        let mut sink = MockSink::new();
        sink.expect_is_scrobbling_enabled()
            .times(2)
            .returning(move || flag.load(Ordering::SeqCst));
        sink.expect_record_scrobble()
            .withf(|song| song.id == "C")
            .times(1)
            .returning(|_| Ok(()));

        let store = NowPlayingStore::new();
        store.set_playing(true);
        let (cancel, _events) = start(sink, &store);

        settle().await;
        store.publish_current_song(song("A"));
        settle().await;
        store.publish_current_song(song("B"));
        settle().await;

        enabled.store(true, Ordering::SeqCst);
        store.publish_current_song(song("C"));
        settle().await;
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_does_not_retry_failed_scrobble() {
        let mut sink = MockSink::new();
        sink.expect_is_scrobbling_enabled().returning(|| true);
        sink.expect_record_scrobble()
            .times(1)
            .returning(|_| Err(BridgeError::Network("last.fm down".to_string())));

        let store = NowPlayingStore::new();
        store.set_playing(true);
        let (cancel, events) = start(sink, &store);
        let mut stream = events.subscribe();

        settle().await;
        store.publish_current_song(song("A"));
        settle().await;
        store.publish_current_song(song("B"));
        core_async::sleep(Duration::from_secs(600)).await;

        assert!(matches!(
            stream.try_recv().unwrap(),
            CoreEvent::Scrobble(ScrobbleEvent::Failed { ref song_id, .. }) if song_id == "B"
        ));
        assert!(stream.try_recv().is_err());
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_seeds_from_already_published_song() {
        let mut sink = MockSink::new();
        sink.expect_is_scrobbling_enabled().never();
        sink.expect_record_scrobble().never();

        let store = NowPlayingStore::new();
        store.publish_current_song(song("A"));

        let (cancel, _events) = start(sink, &store);
        settle().await;
        store.publish_current_song(song("A"));
        settle().await;
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_never_scrobbles_before_play_is_pressed() {
        let mut sink = MockSink::new();
        sink.expect_is_scrobbling_enabled().never();
        sink.expect_record_scrobble().never();

        let store = NowPlayingStore::new();
        let (cancel, events) = start(sink, &store);
        let mut stream = events.subscribe();

        settle().await;
        store.publish_current_song(song("A"));
        settle().await;
        store.publish_current_song(song("B"));
        settle().await;

        assert_eq!(
            stream.try_recv().unwrap(),
            CoreEvent::Scrobble(ScrobbleEvent::Skipped {
                song_id: "B".to_string(),
                reason: ScrobbleSkipReason::NotPlaying,
            })
        );
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_uses_playing_flag_from_publication() {
        let mut sink = MockSink::new();
        sink.expect_is_scrobbling_enabled().times(1).returning(|| true);
        sink.expect_record_scrobble()
            .withf(|song| song.id == "B")
            .times(1)
            .returning(|_| Ok(()));

        let store = NowPlayingStore::new();
        store.set_playing(true);
        let (cancel, _events) = start(sink, &store);

        settle().await;
        store.publish_current_song(song("A"));
        settle().await;
        // Paused after the change was published but before the driver woke.
        store.publish_current_song(song("B"));
        store.set_playing(false);
        settle().await;
        cancel.cancel();
    }
}
