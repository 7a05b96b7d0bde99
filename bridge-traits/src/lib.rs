//! # Host Bridge Traits
//!
//! Contracts between the jukebox core and the things it does not own.
//!
//! ## Overview
//!
//! The core never talks HTTP or pub/sub itself and never stores credentials.
//! Each collaborator it needs is expressed here as a trait, implemented by the
//! host application (or by a fake in tests) and injected at construction time.
//!
//! ## Traits
//!
//! ### Jukebox server
//! - [`RemoteMusicService`](music::RemoteMusicService) - Current song, queue, search, queueing, stars
//! - [`ChangeStream`](music::ChangeStream) - Push channel of "state changed" signals
//!
//! ### Host integration
//! - [`ScrobbleSink`](scrobble::ScrobbleSink) - Play-history recording
//! - [`ViewLifecycle`](lifecycle::ViewLifecycle) - Now-playing view visibility
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should map transport failures to `Network`, missing resources to
//! `NotFound` and rejected credentials to `Unauthorized`; the core relies on
//! that split to decide between "try again later" and "send the user to the
//! login screen".
//!
//! ## Thread Safety
//!
//! Every trait requires `Send + Sync` (streams require `Send`) because the
//! core drives them from spawned Tokio tasks.
//!
//! ## Examples
//!
//! ### Implementing ScrobbleSink
//!
//! ```ignore
//! use bridge_traits::{scrobble::ScrobbleSink, music::Song, error::Result};
//! use async_trait::async_trait;
//!
//! pub struct LastFm {
//!     session_key: Option<String>,
//! }
//!
//! #[async_trait]
//! impl ScrobbleSink for LastFm {
//!     fn is_scrobbling_enabled(&self) -> bool {
//!         self.session_key.is_some()
//!     }
//!
//!     async fn record_scrobble(&self, song: &Song) -> Result<()> {
//!         // POST track.scrobble
//!         todo!()
//!     }
//! }
//! ```

pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod music;
pub mod scrobble;

pub use error::BridgeError;

pub use lifecycle::{ViewLifecycle, ViewState, ViewStateStream};
pub use logging::{LogEntry, LogLevel, LoggerSink, StderrLogger};
pub use music::{ChangeSignal, ChangeStream, RemoteMusicService, Song, SongQueue};
pub use scrobble::ScrobbleSink;
