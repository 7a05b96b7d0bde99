//! Core service façade.
//!
//! This crate is what a host application talks to. It holds the signed-in
//! jukebox session, owns the shared now-playing store, starts and stops the
//! refresh engine from `core-sync` and exposes the user-initiated library
//! actions (search, queueing, stars).
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use core_service::CoreService;
//! use core_sync::Session;
//!
//! let core = CoreService::new(CoreConfig::default())?;
//! core.sign_in(Session::new(jukebox, "https://jukebox.local", "dj", token)?).await?;
//! core.activate().await?;
//!
//! let mut songs = core.store().current_song();
//! ```
//!
//! Authentication failures surface as `SessionEvent::LoginRequired` on the
//! event bus so the host can navigate to its login screen.

pub mod actions;
pub mod error;
mod lifecycle;

pub use error::{CoreError, Result};

use std::fmt;
use std::sync::Arc;

use bridge_traits::Song;
use core_async::sync::broadcast::error::RecvError;
use core_async::sync::{CancellationToken, Mutex};
use core_async::task::JoinHandle;
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, EventStream, SessionEvent};
use core_sync::{NowPlayingStore, NowPlayingSync, Session, SyncConfig};
use tracing::{debug, info, instrument, warn};

/// A background task and the token that stops it.
struct TaskHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TaskHandle {
    async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                warn!("Background task ended abnormally: {}", e);
            }
        }
    }
}

/// Everything tied to one signed-in session.
struct SignedIn {
    session: Session,
    sync: NowPlayingSync,
    login_forwarder: TaskHandle,
}

pub(crate) struct ServiceInner {
    config: CoreConfig,
    events: Arc<EventBus>,
    store: NowPlayingStore,
    signed_in: Mutex<Option<SignedIn>>,
    lifecycle: Mutex<Option<TaskHandle>>,
}

/// Primary façade exposed to host applications.
///
/// Cloning is cheap; clones share the same session and state.
#[derive(Clone)]
pub struct CoreService {
    inner: Arc<ServiceInner>,
}

impl CoreService {
    /// Creates a signed-out service.
    pub fn new(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let events = Arc::new(EventBus::new(config.event_buffer_size));
        Ok(Self {
            inner: Arc::new(ServiceInner {
                config,
                events,
                store: NowPlayingStore::new(),
                signed_in: Mutex::new(None),
                lifecycle: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    /// Subscribes to core events. Past events are not replayed.
    pub fn events(&self) -> EventStream {
        self.inner.events.stream()
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.inner.events.clone()
    }

    /// The now-playing store. Survives sign-out and re-sign-in.
    pub fn store(&self) -> NowPlayingStore {
        self.inner.store.clone()
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    /// Replaces the current session, stopping any sync bound to the old one.
    ///
    /// If the old sync was active, the new one is activated in its place.
    #[instrument(skip(self, session), fields(user = %session.user()))]
    pub async fn sign_in(&self, session: Session) -> Result<()> {
        let sync = NowPlayingSync::new(
            session.clone(),
            SyncConfig::from(&self.inner.config),
            self.inner.events.clone(),
            self.inner.config.active_scrobble_sink(),
        )?
        .with_store(self.inner.store.clone());

        let previous = {
            let mut signed_in = self.inner.signed_in.lock().await;
            signed_in.replace(SignedIn {
                session: session.clone(),
                sync,
                login_forwarder: self.spawn_login_forwarder(),
            })
        };
        let resume = match previous {
            Some(previous) => {
                debug!(user = %previous.session.user(), "Replacing previous session");
                let was_active = previous.sync.is_active().await;
                Self::tear_down(previous).await;
                was_active
            }
            None => false,
        };

        info!(base_url = %session.base_url(), "Signed in");
        self.emit(SessionEvent::SignedIn {
            user: session.user().to_string(),
            base_url: session.base_url().to_string(),
        });

        if resume {
            debug!("Resuming sync on the new session");
            self.activate().await?;
        }

        if self.inner.config.features.follow_view_lifecycle {
            self.follow_lifecycle().await?;
        }

        Ok(())
    }

    /// Stops syncing and forgets the session. No-op when signed out.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) {
        let previous = self.inner.signed_in.lock().await.take();
        if let Some(previous) = previous {
            Self::tear_down(previous).await;
            info!("Signed out");
            self.emit(SessionEvent::SignedOut);
        }
    }

    pub async fn session(&self) -> Option<Session> {
        self.inner
            .signed_in
            .lock()
            .await
            .as_ref()
            .map(|signed_in| signed_in.session.clone())
    }

    pub async fn is_signed_in(&self) -> bool {
        self.inner.signed_in.lock().await.is_some()
    }

    /// Stream URL of the signed-in jukebox.
    pub async fn listen_url(&self) -> Result<String> {
        Ok(self.require_session().await?.listen_url())
    }

    // ------------------------------------------------------------------
    // Now playing
    // ------------------------------------------------------------------

    /// Starts the refresh engine. Returns `Ok(false)` if it was running.
    ///
    /// Without a session this emits `LoginRequired` and fails with
    /// [`CoreError::NotAuthenticated`].
    pub async fn activate(&self) -> Result<bool> {
        let guard = self.inner.signed_in.lock().await;
        if let Some(signed_in) = guard.as_ref() {
            return Ok(signed_in.sync.activate().await);
        }
        drop(guard);

        Err(self.login_required("no jukebox session"))
    }

    /// Stops the refresh engine. Returns `false` if it was not running.
    pub async fn deactivate(&self) -> bool {
        match self.inner.signed_in.lock().await.as_ref() {
            Some(signed_in) => signed_in.sync.deactivate().await,
            None => false,
        }
    }

    pub async fn is_active(&self) -> bool {
        match self.inner.signed_in.lock().await.as_ref() {
            Some(signed_in) => signed_in.sync.is_active().await,
            None => false,
        }
    }

    /// Asks for an immediate refresh. Returns `false` when not active.
    pub async fn refresh(&self) -> bool {
        match self.inner.signed_in.lock().await.as_ref() {
            Some(signed_in) => signed_in.sync.request_refresh().await,
            None => false,
        }
    }

    /// Current song followed by the queue, or empty if either is unknown.
    pub fn all_songs(&self) -> Vec<Song> {
        self.inner.store.all_songs()
    }

    pub fn set_playing(&self, playing: bool) {
        self.inner.store.set_playing(playing);
    }

    pub fn toggle_playing(&self) -> bool {
        self.inner.store.toggle_playing()
    }

    // ------------------------------------------------------------------
    // Library actions
    // ------------------------------------------------------------------

    pub async fn search(&self, query: &str) -> Result<Vec<Song>> {
        let session = self.require_session().await?;
        self.watch_auth(actions::search(session.service().as_ref(), query).await)
    }

    pub async fn queue_song(&self, song: &Song) -> Result<()> {
        let session = self.require_session().await?;
        let config = &self.inner.config;
        self.watch_auth(
            actions::queue_song(
                session.service().as_ref(),
                song,
                &config.action_retry,
                config.action_timeout,
            )
            .await,
        )
    }

    /// Queues a whole album; returns the number of songs queued.
    pub async fn queue_album(&self, artist: &str, album: &str) -> Result<usize> {
        let session = self.require_session().await?;
        let config = &self.inner.config;
        self.watch_auth(
            actions::queue_album(
                session.service().as_ref(),
                artist,
                album,
                &config.action_retry,
                config.action_timeout,
            )
            .await,
        )
    }

    pub async fn all_songs_for_artist(&self, artist: &str) -> Result<Vec<Song>> {
        let session = self.require_session().await?;
        let songs = session.service().all_songs_for_artist(artist).await;
        self.watch_auth(songs.map_err(CoreError::from))
    }

    /// Stars or unstars `song` and returns the new flag.
    pub async fn toggle_starred(&self, song: &Song, currently_starred: bool) -> Result<bool> {
        let session = self.require_session().await?;
        self.watch_auth(
            actions::toggle_starred(session.service().as_ref(), song, currently_starred).await,
        )
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn require_session(&self) -> Result<Session> {
        match self.session().await {
            Some(session) => Ok(session),
            None => Err(self.login_required("no jukebox session")),
        }
    }

    fn login_required(&self, reason: &str) -> CoreError {
        warn!("Login required: {}", reason);
        self.emit(SessionEvent::LoginRequired {
            reason: reason.to_string(),
        });
        CoreError::NotAuthenticated(reason.to_string())
    }

    /// Emits `LoginRequired` when an action was rejected for credentials.
    fn watch_auth<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.requires_login() {
                warn!("Jukebox rejected the session: {}", e);
                self.emit(SessionEvent::LoginRequired {
                    reason: e.to_string(),
                });
            }
        }
        result
    }

    /// Turns authentication failures from the refresh loop into
    /// `LoginRequired` events.
    fn spawn_login_forwarder(&self) -> TaskHandle {
        let mut failures = self.inner.store.failures();
        let events = self.inner.events.clone();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = core_async::spawn(async move {
            loop {
                let received = core_async::select! {
                    biased;
                    _ = token.cancelled() => return,
                    received = failures.recv() => received,
                };

                match received {
                    Ok(failure) if failure.requires_login() => {
                        warn!("Jukebox rejected the session: {}", failure.message);
                        let _ = events.emit(CoreEvent::Session(SessionEvent::LoginRequired {
                            reason: failure.message,
                        }));
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Login forwarder fell behind on failures");
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        });

        TaskHandle { cancel, task }
    }

    async fn tear_down(signed_in: SignedIn) {
        signed_in.sync.deactivate().await;
        signed_in.login_forwarder.stop().await;
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.inner.events.emit(CoreEvent::Session(event));
    }
}

impl fmt::Debug for CoreService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreService")
            .field("config", &self.inner.config)
            .field("events", &self.inner.events)
            .finish_non_exhaustive()
    }
}
