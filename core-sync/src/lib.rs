//! # Now-Playing Sync Module
//!
//! Keeps a client's view of a jukebox server up to date.
//!
//! ## Overview
//!
//! This module owns the refresh engine behind a now-playing screen:
//! - Fetching the current song and queue from `RemoteMusicService`
//! - Refreshing on push notifications, with a timer fallback
//! - Publishing observable state for the UI
//! - Gating play events for the host's `ScrobbleSink`
//!
//! ## Components
//!
//! - **Session** (`session`): Authenticated handle on one jukebox server
//! - **State Store** (`state`): Observable current song, queue and playing flag
//! - **Push Listener** (`push`): Change-notification subscription with bounded retry
//! - **Scrobble Gate** (`scrobble`): Decides which song changes count as plays
//! - **Now-Playing Sync** (`coordinator`): Activation, refresh loop and teardown

pub mod coordinator;
pub mod error;
mod push;
pub mod scrobble;
pub mod session;
pub mod state;

pub use coordinator::{NowPlayingSync, SyncConfig};
pub use error::{Result, SyncError};
pub use scrobble::{ScrobbleDecision, ScrobbleGate};
pub use session::{Session, LISTEN_PORT};
pub use state::{FailureKind, FetchFailure, NowPlayingState, NowPlayingStore, SyncPhase};
