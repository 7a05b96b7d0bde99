//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the jukebox core:
//! - Configuration (refresh policy, retry policies, host bridges)
//! - Event bus for host-facing notifications
//! - Logging and tracing setup
//!
//! ## Overview
//!
//! Every other core crate depends on this one for its configuration types and
//! its `EventBus`. Nothing here talks to the jukebox server.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, FeatureFlags, RefreshPolicy, RetryPolicy};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus};
