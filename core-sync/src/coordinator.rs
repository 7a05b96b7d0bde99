//! # Now-Playing Sync
//!
//! Keeps the current song and queue of a jukebox in step with the server
//! while a now-playing view is on screen.
//!
//! ## Overview
//!
//! `NowPlayingSync` owns up to three background tasks per activation:
//! - the refresh loop, the only writer of [`NowPlayingStore`];
//! - the push listener (push policy only), which turns change notifications
//!   into refresh requests and resubscribes with backoff;
//! - the scrobble driver (when a sink is configured).
//!
//! All of them share one `CancellationToken`; deactivation cancels it and
//! waits for every task to finish, including the explicit push unsubscribe.
//!
//! ## Refresh Loop
//!
//! ### Push with timeout fallback
//! 1. Fetch immediately on activation
//! 2. Wait for a push notification, a manual request, or the fallback timeout
//! 3. Fetch current song and queue concurrently
//! 4. Go back to 2; the timeout window restarts from there
//!
//! ### Fixed interval
//! Fetch on every interval tick (the first fires immediately). The push
//! channel is never opened.
//!
//! Fetch cycles never overlap. Triggers that arrive while a cycle is in
//! flight collapse into a single follow-up cycle.
//!
//! ## Failures
//!
//! - Queue failure: an empty queue is published, the cycle continues.
//! - Current-song failure: the previous song stays published and a
//!   [`FetchFailure`] is broadcast; `AuthenticationRequired` tells the host
//!   to send the user to the login screen.
//! - Push channel exhaustion: reported once; the fallback timer keeps going.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{NowPlayingSync, Session, SyncConfig};
//! use std::sync::Arc;
//!
//! # async fn example(session: Session, events: Arc<core_runtime::events::EventBus>) -> core_sync::Result<()> {
//! let sync = NowPlayingSync::new(session, SyncConfig::default(), events, None)?;
//! let mut songs = sync.store().current_song();
//!
//! sync.activate().await;
//! songs.changed().await.ok();
//! println!("{:?}", *songs.borrow());
//!
//! sync.deactivate().await;
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::push::PushListener;
use crate::scrobble::ScrobbleDriver;
use crate::session::Session;
use crate::state::{FetchFailure, NowPlayingStore, SyncPhase};
use bridge_traits::{RemoteMusicService, ScrobbleSink};
use core_async::sync::{watch, CancellationToken, Mutex, Notify};
use core_async::task::JoinHandle;
use core_async::time::MissedTickBehavior;
use core_async::{Duration, FutureExt};
use core_runtime::config::{CoreConfig, RefreshPolicy, RetryPolicy};
use core_runtime::events::{CoreEvent, EventBus, NowPlayingEvent, RefreshTrigger};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Refresh settings for one [`NowPlayingSync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncConfig {
    pub refresh_policy: RefreshPolicy,
    pub push_retry: RetryPolicy,
}

impl SyncConfig {
    pub fn new(refresh_policy: RefreshPolicy) -> Self {
        Self {
            refresh_policy,
            push_retry: RetryPolicy::push_channel(),
        }
    }

    pub fn with_push_retry(mut self, push_retry: RetryPolicy) -> Self {
        self.push_retry = push_retry;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.refresh_policy.validate()?;
        self.push_retry.validate("Push channel")?;
        Ok(())
    }
}

impl From<&CoreConfig> for SyncConfig {
    fn from(config: &CoreConfig) -> Self {
        Self {
            refresh_policy: config.refresh_policy,
            push_retry: config.push_retry,
        }
    }
}

/// Handles owned by one activation.
struct ActiveSync {
    cancel: CancellationToken,
    manual: Arc<Notify>,
    tasks: Vec<JoinHandle<()>>,
}

/// Now-playing refresh engine for one session.
pub struct NowPlayingSync {
    session: Session,
    config: SyncConfig,
    events: Arc<EventBus>,
    scrobble_sink: Option<Arc<dyn ScrobbleSink>>,
    store: NowPlayingStore,
    phase: Arc<watch::Sender<SyncPhase>>,
    cycles: Arc<AtomicU64>,
    active: Mutex<Option<ActiveSync>>,
}

impl NowPlayingSync {
    /// Creates an inactive sync. Fails if `config` does not validate.
    pub fn new(
        session: Session,
        config: SyncConfig,
        events: Arc<EventBus>,
        scrobble_sink: Option<Arc<dyn ScrobbleSink>>,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            session,
            config,
            events,
            scrobble_sink,
            store: NowPlayingStore::new(),
            phase: Arc::new(watch::Sender::new(SyncPhase::Idle)),
            cycles: Arc::new(AtomicU64::new(0)),
            active: Mutex::new(None),
        })
    }

    /// Publishes into `store` instead of a private one, so observers can
    /// outlive a single session.
    pub fn with_store(mut self, store: NowPlayingStore) -> Self {
        self.store = store;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &NowPlayingStore {
        &self.store
    }

    /// Receiver for phase changes.
    pub fn phase(&self) -> watch::Receiver<SyncPhase> {
        self.phase.subscribe()
    }

    pub fn current_phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    /// Number of fetch cycles started since construction.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    pub async fn is_active(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Starts the background tasks and the first fetch.
    ///
    /// Returns `false` if the sync was already active.
    #[instrument(skip(self), fields(user = %self.session.user()))]
    pub async fn activate(&self) -> bool {
        let mut active = self.active.lock().await;
        if active.is_some() {
            debug!("Now-playing sync already active");
            return false;
        }

        let cancel = CancellationToken::new();
        let push = Arc::new(Notify::new());
        let manual = Arc::new(Notify::new());
        let service = self.session.service().clone();
        let policy = self.config.refresh_policy;
        let mut tasks = Vec::with_capacity(3);

        // Subscribe to songs before the first fetch can publish one.
        if let Some(sink) = &self.scrobble_sink {
            let driver = ScrobbleDriver::new(
                sink.clone(),
                self.store.clone(),
                self.events.clone(),
                cancel.clone(),
            );
            tasks.push(core_async::spawn(driver.run()));
        }

        if policy.uses_push() {
            let listener = PushListener::new(
                service.clone(),
                self.config.push_retry,
                push.clone(),
                self.store.clone(),
                self.events.clone(),
                cancel.clone(),
            );
            tasks.push(core_async::spawn(listener.run()));
        }

        let refresh = RefreshLoop {
            service,
            policy,
            push,
            manual: manual.clone(),
            store: self.store.clone(),
            phase: self.phase.clone(),
            cycles: self.cycles.clone(),
            events: self.events.clone(),
            cancel: cancel.clone(),
        };
        tasks.push(core_async::spawn(refresh.run()));

        *active = Some(ActiveSync {
            cancel,
            manual,
            tasks,
        });

        info!(
            policy = ?policy,
            scrobbling = self.scrobble_sink.is_some(),
            "Now-playing sync activated"
        );
        self.emit(NowPlayingEvent::Activated {
            push_enabled: policy.uses_push(),
        });

        true
    }

    /// Cancels every task and waits for them to finish.
    ///
    /// In-flight fetches are abandoned and nothing is published afterwards.
    /// Returns `false` (and does nothing) if the sync was not active.
    #[instrument(skip(self), fields(user = %self.session.user()))]
    pub async fn deactivate(&self) -> bool {
        let mut active = self.active.lock().await;
        let Some(sync) = active.take() else {
            debug!("Now-playing sync already inactive");
            return false;
        };

        sync.cancel.cancel();
        for task in sync.tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Now-playing task ended abnormally: {}", e);
                }
            }
        }

        self.phase.send_replace(SyncPhase::Idle);
        drop(active);

        info!("Now-playing sync deactivated");
        self.emit(NowPlayingEvent::Deactivated);
        true
    }

    /// Asks for an extra fetch cycle. Returns `false` when inactive.
    pub async fn request_refresh(&self) -> bool {
        match self.active.lock().await.as_ref() {
            Some(sync) => {
                sync.manual.notify_one();
                true
            }
            None => false,
        }
    }

    fn emit(&self, event: NowPlayingEvent) {
        let _ = self.events.emit(CoreEvent::NowPlaying(event));
    }
}

impl fmt::Debug for NowPlayingSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NowPlayingSync")
            .field("session", &self.session)
            .field("config", &self.config)
            .field("phase", &self.current_phase())
            .field("cycles", &self.cycles())
            .finish_non_exhaustive()
    }
}

impl Drop for NowPlayingSync {
    fn drop(&mut self) {
        if let Some(sync) = self.active.get_mut().take() {
            warn!("Now-playing sync dropped while active, cancelling tasks");
            sync.cancel.cancel();
        }
    }
}

/// The single writer of the now-playing store.
struct RefreshLoop {
    service: Arc<dyn RemoteMusicService>,
    policy: RefreshPolicy,
    push: Arc<Notify>,
    manual: Arc<Notify>,
    store: NowPlayingStore,
    phase: Arc<watch::Sender<SyncPhase>>,
    cycles: Arc<AtomicU64>,
    events: Arc<EventBus>,
    cancel: CancellationToken,
}

impl RefreshLoop {
    async fn run(self) {
        match self.policy {
            RefreshPolicy::PushWithTimeoutFallback { timeout } => self.run_push(timeout).await,
            RefreshPolicy::FixedInterval { period } => self.run_interval(period).await,
        }
    }

    async fn run_push(&self, timeout: Duration) {
        let mut trigger = RefreshTrigger::Activation;

        loop {
            if !self.fetch(trigger).await {
                return;
            }

            self.phase.send_replace(SyncPhase::AwaitingSignal);
            trigger = core_async::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = self.manual.notified() => RefreshTrigger::Manual,
                _ = self.push.notified() => RefreshTrigger::PushNotification,
                _ = core_async::sleep(timeout) => RefreshTrigger::FallbackTimeout,
            };
            self.absorb_pending();
        }
    }

    async fn run_interval(&self, period: Duration) {
        let mut ticks = core_async::time::interval(period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut next = RefreshTrigger::Activation;

        loop {
            self.phase.send_replace(SyncPhase::AwaitingSignal);
            let trigger = core_async::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = self.manual.notified() => RefreshTrigger::Manual,
                _ = ticks.tick() => {
                    let tick = next;
                    next = RefreshTrigger::PollTick;
                    tick
                }
            };
            self.absorb_pending();

            if !self.fetch(trigger).await {
                return;
            }
        }
    }

    /// Consumes triggers that are already pending so they share the cycle
    /// about to start. Triggers arriving during the fetch still queue one
    /// follow-up cycle.
    fn absorb_pending(&self) {
        let _ = self.manual.notified().now_or_never();
        let _ = self.push.notified().now_or_never();
    }

    /// Runs one fetch cycle. Returns `false` if cancelled mid-flight.
    #[instrument(skip(self), fields(cycle = tracing::field::Empty))]
    async fn fetch(&self, trigger: RefreshTrigger) -> bool {
        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::Span::current().record("cycle", cycle);

        self.phase.send_replace(SyncPhase::Fetching);
        debug!(%trigger, "Refreshing now-playing state");
        self.emit(NowPlayingEvent::RefreshStarted { cycle, trigger });

        let (song, queue) = core_async::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!("Fetch cancelled");
                return false;
            }
            fetched = async {
                core_async::join!(self.service.current_song(), self.service.queue())
            } => fetched,
        };

        let song_id = match song {
            Ok(song) => {
                let id = song.id.clone();
                self.store.publish_current_song(song);
                Some(id)
            }
            Err(e) => {
                let failure = FetchFailure::from_bridge(&e, cycle);
                error!(kind = ?failure.kind, "Failed to fetch current song: {}", e);
                self.emit(NowPlayingEvent::CurrentSongFailed {
                    cycle,
                    message: e.to_string(),
                    requires_login: failure.requires_login(),
                });
                self.store.publish_failure(failure);
                None
            }
        };

        let queue = queue.unwrap_or_else(|e| {
            warn!("Failed to fetch queue, publishing empty queue: {}", e);
            self.emit(NowPlayingEvent::QueueFetchFailed {
                cycle,
                message: e.to_string(),
            });
            Vec::new()
        });
        let queue_len = queue.len();
        self.store.publish_queue(queue);

        debug!(song_id = ?song_id, queue_len, "Now-playing state refreshed");
        self.emit(NowPlayingEvent::RefreshCompleted {
            cycle,
            song_id,
            queue_len,
        });

        true
    }

    fn emit(&self, event: NowPlayingEvent) {
        let _ = self.events.emit(CoreEvent::NowPlaying(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_runtime::config::DEFAULT_POLL_PERIOD;

    #[test]
    fn test_sync_config_defaults_to_push() {
        let config = SyncConfig::default();
        assert!(config.refresh_policy.uses_push());
        assert_eq!(config.refresh_policy.wait(), Duration::from_secs(120));
        assert_eq!(config.push_retry.max_attempts, 25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sync_config_from_core_config() {
        let core = CoreConfig::builder()
            .refresh_policy(RefreshPolicy::fixed_interval(DEFAULT_POLL_PERIOD))
            .push_retry_attempts(5)
            .build()
            .unwrap();

        let config = SyncConfig::from(&core);
        assert!(!config.refresh_policy.uses_push());
        assert_eq!(config.refresh_policy.wait(), Duration::from_secs(90));
        assert_eq!(config.push_retry.max_attempts, 5);
    }

    #[test]
    fn test_sync_config_rejects_zero_timeout() {
        let config = SyncConfig::new(RefreshPolicy::push_with_timeout_fallback(Duration::ZERO));
        assert!(matches!(
            config.validate(),
            Err(crate::SyncError::Config(_))
        ));
    }
}
