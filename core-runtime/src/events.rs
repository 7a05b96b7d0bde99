//! # Event Bus System
//!
//! Typed, broadcast-based notifications from the jukebox core to the host.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies per domain
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! Events are diagnostics and UI hints. The authoritative now-playing state
//! lives in the sync store's watch channels; a subscriber that lags on the
//! bus loses events but never loses state.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐  emit   ┌───────────┐
//! │ NowPlayingSync   ├────────>│           │  subscribe  ┌────────────┐
//! └──────────────────┘         │ EventBus  ├────────────>│ UI / host  │
//! ┌──────────────────┐  emit   │ (broadcast│             └────────────┘
//! │ Scrobble gate    ├────────>│  channel) │  subscribe  ┌────────────┐
//! └──────────────────┘         │           ├────────────>│ Diagnostics│
//! ┌──────────────────┐  emit   │           │             └────────────┘
//! │ CoreService      ├────────>│           │
//! └──────────────────┘         └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SessionEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Session(SessionEvent::LoginRequired {
//!         reason: "No stored session".to_string(),
//!     }))
//!     .ok();
//!
//! let event = subscriber.recv().await.unwrap();
//! assert!(event.requires_login());
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events; keep reading.
//! - **`RecvError::Closed`**: every sender is gone; the core shut down.
//!
//! `emit` fails only when nobody is subscribed. Publishers ignore that with
//! `.ok()`.

use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use core_async::sync::broadcast::error::{RecvError, SendError};
pub use core_async::sync::broadcast::Receiver;

pub use crate::config::DEFAULT_EVENT_BUFFER_SIZE;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Now-playing refresh loop events
    NowPlaying(NowPlayingEvent),
    /// Scrobble gate decisions
    Scrobble(ScrobbleEvent),
    /// Session and login routing
    Session(SessionEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::NowPlaying(e) => e.description(),
            CoreEvent::Scrobble(e) => e.description(),
            CoreEvent::Session(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::NowPlaying(NowPlayingEvent::CurrentSongFailed { .. }) => {
                EventSeverity::Error
            }
            CoreEvent::NowPlaying(NowPlayingEvent::PushChannelExhausted { .. }) => {
                EventSeverity::Error
            }
            CoreEvent::Session(SessionEvent::LoginRequired { .. }) => EventSeverity::Error,
            CoreEvent::NowPlaying(NowPlayingEvent::QueueFetchFailed { .. }) => {
                EventSeverity::Warning
            }
            CoreEvent::NowPlaying(NowPlayingEvent::PushChannelRetrying { .. }) => {
                EventSeverity::Warning
            }
            CoreEvent::Scrobble(ScrobbleEvent::Failed { .. }) => EventSeverity::Warning,
            CoreEvent::NowPlaying(NowPlayingEvent::Activated { .. }) => EventSeverity::Info,
            CoreEvent::NowPlaying(NowPlayingEvent::Deactivated) => EventSeverity::Info,
            CoreEvent::Scrobble(ScrobbleEvent::Recorded { .. }) => EventSeverity::Info,
            CoreEvent::Session(_) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// Whether the host should route the user to the login screen.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            CoreEvent::Session(SessionEvent::LoginRequired { .. })
                | CoreEvent::NowPlaying(NowPlayingEvent::CurrentSongFailed {
                    requires_login: true,
                    ..
                })
        )
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Now-Playing Events
// ============================================================================

/// What woke the refresh loop up.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTrigger {
    /// The synthetic trigger issued on activation.
    Activation,
    /// A push notification from the server.
    PushNotification,
    /// The fallback timer expired without a notification.
    FallbackTimeout,
    /// A fixed-interval poll tick.
    PollTick,
    /// The host asked for a refresh (pull-to-refresh, resume).
    Manual,
}

impl fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RefreshTrigger::Activation => "activation",
            RefreshTrigger::PushNotification => "push_notification",
            RefreshTrigger::FallbackTimeout => "fallback_timeout",
            RefreshTrigger::PollTick => "poll_tick",
            RefreshTrigger::Manual => "manual",
        };
        f.write_str(label)
    }
}

/// Events emitted by the now-playing refresh loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum NowPlayingEvent {
    /// The refresh loop started.
    Activated {
        /// `true` when push notifications drive refreshes.
        push_enabled: bool,
    },
    /// A fetch cycle began.
    RefreshStarted { cycle: u64, trigger: RefreshTrigger },
    /// A fetch cycle finished and state was published.
    RefreshCompleted {
        cycle: u64,
        /// Id of the current song, absent if its fetch failed.
        song_id: Option<String>,
        queue_len: usize,
    },
    /// The current-song fetch failed; the previous value stays published.
    CurrentSongFailed {
        cycle: u64,
        message: String,
        /// The server rejected the session.
        requires_login: bool,
    },
    /// The queue fetch failed and an empty queue was published.
    QueueFetchFailed { cycle: u64, message: String },
    /// A push subscription was established.
    PushChannelConnected { attempt: u32 },
    /// The push subscription failed and will be retried.
    PushChannelRetrying {
        attempt: u32,
        max_attempts: u32,
        message: String,
    },
    /// Retries ran out; only the fallback timer drives refreshes now.
    PushChannelExhausted { attempts: u32 },
    /// The refresh loop stopped and released its resources.
    Deactivated,
}

impl NowPlayingEvent {
    fn description(&self) -> &str {
        match self {
            NowPlayingEvent::Activated { .. } => "Now-playing sync activated",
            NowPlayingEvent::RefreshStarted { .. } => "Refreshing now-playing state",
            NowPlayingEvent::RefreshCompleted { .. } => "Now-playing state refreshed",
            NowPlayingEvent::CurrentSongFailed { .. } => "Failed to fetch current song",
            NowPlayingEvent::QueueFetchFailed { .. } => "Failed to fetch queue",
            NowPlayingEvent::PushChannelConnected { .. } => "Push channel connected",
            NowPlayingEvent::PushChannelRetrying { .. } => "Push channel retrying",
            NowPlayingEvent::PushChannelExhausted { .. } => "Push channel gave up",
            NowPlayingEvent::Deactivated => "Now-playing sync deactivated",
        }
    }
}

// ============================================================================
// Scrobble Events
// ============================================================================

/// Why a song change did not produce a scrobble.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScrobbleSkipReason {
    /// Playback is paused locally.
    NotPlaying,
    /// The sink reports scrobbling is not authorized.
    Disabled,
}

/// Events emitted by the scrobble gate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ScrobbleEvent {
    /// The sink accepted the play.
    Recorded { song_id: String },
    /// The song changed but a gate condition was not met.
    Skipped {
        song_id: String,
        reason: ScrobbleSkipReason,
    },
    /// The sink returned an error; the play is dropped.
    Failed { song_id: String, message: String },
}

impl ScrobbleEvent {
    fn description(&self) -> &str {
        match self {
            ScrobbleEvent::Recorded { .. } => "Scrobble recorded",
            ScrobbleEvent::Skipped { .. } => "Scrobble skipped",
            ScrobbleEvent::Failed { .. } => "Scrobble failed",
        }
    }
}

// ============================================================================
// Session Events
// ============================================================================

/// Events about the jukebox session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SessionEvent {
    /// A session was handed to the core.
    SignedIn { user: String, base_url: String },
    /// The session was cleared.
    SignedOut,
    /// Credentials are missing or were rejected.
    LoginRequired { reason: String },
}

impl SessionEvent {
    fn description(&self) -> &str {
        match self {
            SessionEvent::SignedIn { .. } => "Signed in to jukebox",
            SessionEvent::SignedOut => "Signed out of jukebox",
            SessionEvent::LoginRequired { .. } => "Login required",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for broadcasting events to multiple subscribers.
///
/// Cloning is cheap; every clone publishes into the same channel.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, NowPlayingEvent};
///
/// # #[tokio::main]
/// # async fn main() {
/// let event_bus = EventBus::new(100);
/// let mut sub1 = event_bus.subscribe();
/// let mut sub2 = event_bus.subscribe();
///
/// event_bus.emit(CoreEvent::NowPlaying(NowPlayingEvent::Deactivated)).ok();
///
/// assert_eq!(sub1.recv().await.unwrap(), sub2.recv().await.unwrap());
/// # }
/// ```
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// Subscribers that fall behind by more than `capacity` events receive
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Subscribes and wraps the receiver in an [`EventStream`].
    pub fn stream(&self) -> EventStream {
        EventStream::new(self.subscribe())
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional filter.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus};
///
/// let event_bus = EventBus::new(100);
/// let scrobbles = event_bus
///     .stream()
///     .filter(|event| matches!(event, CoreEvent::Scrobble(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` will be returned.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
