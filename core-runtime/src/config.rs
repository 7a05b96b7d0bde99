//! # Core Configuration Module
//!
//! Provides configuration management for the jukebox core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance holding the refresh/retry policies and the optional host bridges.
//! Validation is fail-fast: a config that would start a sync loop with a zero
//! timeout, or a feature flag whose bridge was never injected, is rejected at
//! `build()` rather than misbehaving later.
//!
//! The jukebox client itself (`RemoteMusicService`) is not part of the config.
//! It arrives with the signed-in session.
//!
//! ## Optional Dependencies
//!
//! - `ScrobbleSink` - Required when `enable_scrobbling` is set
//! - `ViewLifecycle` - Required when `follow_view_lifecycle` is set
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::{CoreConfig, RefreshPolicy};
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .refresh_policy(RefreshPolicy::push_with_timeout_fallback(Duration::from_secs(120)))
//!     .push_retry_attempts(25)
//!     .build()
//!     .expect("defaults are valid");
//!
//! assert!(config.refresh_policy.uses_push());
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // Scrobbling without a sink is a wiring mistake.
//! let config = CoreConfig::builder()
//!     .enable_scrobbling(true)
//!     .build()
//!     .expect("Should fail - missing ScrobbleSink");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{ScrobbleSink, ViewLifecycle};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Fallback refresh used when the push channel stays silent.
pub const DEFAULT_PUSH_FALLBACK_TIMEOUT: Duration = Duration::from_secs(120);

/// Poll period for hosts that cannot hold a push connection.
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(90);

/// Consecutive push subscription attempts before giving up on push.
pub const DEFAULT_PUSH_RETRY_ATTEMPTS: u32 = 25;

/// Attempts per song when queueing a whole album.
pub const DEFAULT_ACTION_RETRY_ATTEMPTS: u32 = 3;

/// Per-attempt timeout for queue actions.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(20);

/// Default broadcast capacity of the event bus.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

const MAX_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// How the now-playing state decides when to fetch again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// Refresh on every push notification; if none arrives within `timeout`
    /// of entering the waiting state, refresh anyway.
    PushWithTimeoutFallback {
        #[serde(rename = "timeout_secs", with = "duration_secs")]
        timeout: Duration,
    },
    /// Poll every `period`, start to start. No push channel is opened.
    FixedInterval {
        #[serde(rename = "period_secs", with = "duration_secs")]
        period: Duration,
    },
}

impl RefreshPolicy {
    pub fn push_with_timeout_fallback(timeout: Duration) -> Self {
        RefreshPolicy::PushWithTimeoutFallback { timeout }
    }

    pub fn fixed_interval(period: Duration) -> Self {
        RefreshPolicy::FixedInterval { period }
    }

    /// Whether a push subscription is needed.
    pub fn uses_push(&self) -> bool {
        matches!(self, RefreshPolicy::PushWithTimeoutFallback { .. })
    }

    /// The timeout or period, whichever applies.
    pub fn wait(&self) -> Duration {
        match self {
            RefreshPolicy::PushWithTimeoutFallback { timeout } => *timeout,
            RefreshPolicy::FixedInterval { period } => *period,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let (name, value) = match self {
            RefreshPolicy::PushWithTimeoutFallback { timeout } => ("Push fallback timeout", timeout),
            RefreshPolicy::FixedInterval { period } => ("Poll period", period),
        };

        if value.is_zero() {
            return Err(Error::Config(format!("{name} must be greater than 0")));
        }

        if *value > MAX_DURATION {
            return Err(Error::Config(format!(
                "{name} exceeds maximum of 24 hours"
            )));
        }

        Ok(())
    }
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        RefreshPolicy::PushWithTimeoutFallback {
            timeout: DEFAULT_PUSH_FALLBACK_TIMEOUT,
        }
    }
}

/// Bounded retry with exponential backoff.
///
/// Attempt `n` (zero-based) waits `initial_backoff * 2^n`, capped at
/// `max_backoff`, before the next try.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(rename = "initial_backoff_ms", with = "duration_millis")]
    pub initial_backoff: Duration,
    #[serde(rename = "max_backoff_ms", with = "duration_millis")]
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
        }
    }

    /// Retry policy for the push channel subscription.
    pub fn push_channel() -> Self {
        Self::new(
            DEFAULT_PUSH_RETRY_ATTEMPTS,
            Duration::from_secs(1),
            Duration::from_secs(30),
        )
    }

    /// Retry policy for user-initiated queue actions.
    pub fn queue_action() -> Self {
        Self::new(
            DEFAULT_ACTION_RETRY_ATTEMPTS,
            Duration::from_millis(250),
            Duration::from_secs(2),
        )
    }

    /// Delay to wait after the zero-based `attempt` failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        core_async::time::backoff_delay(self.initial_backoff, self.max_backoff, attempt)
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config(format!(
                "{name} retry policy must allow at least 1 attempt"
            )));
        }

        if self.initial_backoff > self.max_backoff {
            return Err(Error::Config(format!(
                "{name} retry policy has initial backoff ({:?}) above max backoff ({:?})",
                self.initial_backoff, self.max_backoff
            )));
        }

        if self.max_backoff > MAX_DURATION {
            return Err(Error::Config(format!(
                "{name} retry policy max backoff exceeds 24 hours"
            )));
        }

        Ok(())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::push_channel()
    }
}

/// Core configuration for the jukebox client.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// When the now-playing state is refetched
    pub refresh_policy: RefreshPolicy,

    /// Push channel subscription retry
    pub push_retry: RetryPolicy,

    /// Retry for queue song/album actions
    pub action_retry: RetryPolicy,

    /// Timeout for a single queue action attempt
    pub action_timeout: Duration,

    /// Broadcast capacity of the event bus
    pub event_buffer_size: usize,

    /// Play-history sink (optional)
    pub scrobble_sink: Option<Arc<dyn ScrobbleSink>>,

    /// Now-playing view visibility (optional)
    pub view_lifecycle: Option<Arc<dyn ViewLifecycle>>,

    /// Features flags
    pub features: FeatureFlags,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("refresh_policy", &self.refresh_policy)
            .field("push_retry", &self.push_retry)
            .field("action_retry", &self.action_retry)
            .field("action_timeout", &self.action_timeout)
            .field("event_buffer_size", &self.event_buffer_size)
            .field(
                "scrobble_sink",
                &self.scrobble_sink.as_ref().map(|_| "ScrobbleSink { ... }"),
            )
            .field(
                "view_lifecycle",
                &self.view_lifecycle.as_ref().map(|_| "ViewLifecycle { ... }"),
            )
            .field("features", &self.features)
            .finish()
    }
}

/// Feature flags control optional functionality.
///
/// Each flag needs its bridge to be injected; `build()` enforces this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureFlags {
    /// Record plays through the `ScrobbleSink`
    pub enable_scrobbling: bool,

    /// Activate/deactivate sync with the view (requires ViewLifecycle)
    pub follow_view_lifecycle: bool,
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Refresh timeout/period is non-zero and at most 24 hours
    /// - Retry policies allow at least one attempt with sane backoff
    /// - Event buffer size is within 1..=10,000
    /// - Feature flags are consistent with available bridges
    pub fn validate(&self) -> Result<()> {
        self.refresh_policy.validate()?;
        self.push_retry.validate("Push channel")?;
        self.action_retry.validate("Queue action")?;

        if self.action_timeout.is_zero() {
            return Err(Error::Config(
                "Queue action timeout must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size == 0 || self.event_buffer_size > 10_000 {
            return Err(Error::Config(format!(
                "Event buffer size must be between 1 and 10,000 (got {})",
                self.event_buffer_size
            )));
        }

        if self.features.enable_scrobbling && self.scrobble_sink.is_none() {
            return Err(scrobble_sink_missing_error());
        }

        if self.features.follow_view_lifecycle && self.view_lifecycle.is_none() {
            return Err(view_lifecycle_missing_error());
        }

        Ok(())
    }

    /// The scrobble sink, if scrobbling is switched on.
    pub fn active_scrobble_sink(&self) -> Option<Arc<dyn ScrobbleSink>> {
        if self.features.enable_scrobbling {
            self.scrobble_sink.clone()
        } else {
            None
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            refresh_policy: RefreshPolicy::default(),
            push_retry: RetryPolicy::push_channel(),
            action_retry: RetryPolicy::queue_action(),
            action_timeout: DEFAULT_ACTION_TIMEOUT,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            scrobble_sink: None,
            view_lifecycle: None,
            features: FeatureFlags::default(),
        }
    }
}

fn scrobble_sink_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "ScrobbleSink".to_string(),
        message: "Scrobbling is enabled but no ScrobbleSink was provided. \
                 Inject the host's play-history client with .scrobble_sink() \
                 or disable the feature."
            .to_string(),
    }
}

fn view_lifecycle_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "ViewLifecycle".to_string(),
        message: "Following the view lifecycle is enabled but no ViewLifecycle was provided. \
                 Inject the host's navigation observer with .view_lifecycle() \
                 or activate the core manually."
            .to_string(),
    }
}

/// Builder for constructing [`CoreConfig`] instances.
///
/// Unset values fall back to the defaults documented on each setter.
#[derive(Default)]
pub struct CoreConfigBuilder {
    refresh_policy: Option<RefreshPolicy>,
    push_retry: Option<RetryPolicy>,
    action_retry: Option<RetryPolicy>,
    action_timeout: Option<Duration>,
    event_buffer_size: Option<usize>,
    scrobble_sink: Option<Arc<dyn ScrobbleSink>>,
    view_lifecycle: Option<Arc<dyn ViewLifecycle>>,
    features: FeatureFlags,
}

impl CoreConfigBuilder {
    /// Sets the refresh policy.
    ///
    /// Default: push notifications with a 120 second fallback.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::{CoreConfig, RefreshPolicy};
    /// use std::time::Duration;
    ///
    /// let builder = CoreConfig::builder()
    ///     .refresh_policy(RefreshPolicy::fixed_interval(Duration::from_secs(90)));
    /// ```
    pub fn refresh_policy(mut self, policy: RefreshPolicy) -> Self {
        self.refresh_policy = Some(policy);
        self
    }

    /// Sets the full push channel retry policy.
    ///
    /// Default: 25 attempts, 1s initial backoff, 30s cap.
    pub fn push_retry(mut self, policy: RetryPolicy) -> Self {
        self.push_retry = Some(policy);
        self
    }

    /// Overrides only the number of push subscription attempts.
    pub fn push_retry_attempts(mut self, attempts: u32) -> Self {
        let mut policy = self.push_retry.unwrap_or_else(RetryPolicy::push_channel);
        policy.max_attempts = attempts;
        self.push_retry = Some(policy);
        self
    }

    /// Sets the retry policy for queue actions.
    ///
    /// Default: 3 attempts.
    pub fn action_retry(mut self, policy: RetryPolicy) -> Self {
        self.action_retry = Some(policy);
        self
    }

    /// Sets the per-attempt timeout for queue actions.
    ///
    /// Default: 20 seconds.
    pub fn action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = Some(timeout);
        self
    }

    /// Sets the event bus capacity.
    ///
    /// Default: 100
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Sets the scrobble sink implementation (optional).
    pub fn scrobble_sink(mut self, sink: Arc<dyn ScrobbleSink>) -> Self {
        self.scrobble_sink = Some(sink);
        self
    }

    /// Sets the view lifecycle observer (optional).
    pub fn view_lifecycle(mut self, lifecycle: Arc<dyn ViewLifecycle>) -> Self {
        self.view_lifecycle = Some(lifecycle);
        self
    }

    /// Enables or disables scrobbling.
    ///
    /// Requires a `ScrobbleSink` to be provided.
    ///
    /// Default: false
    pub fn enable_scrobbling(mut self, enabled: bool) -> Self {
        self.features.enable_scrobbling = enabled;
        self
    }

    /// Enables or disables automatic activation from the view lifecycle.
    ///
    /// Requires a `ViewLifecycle` to be provided.
    ///
    /// Default: false
    pub fn follow_view_lifecycle(mut self, enabled: bool) -> Self {
        self.features.follow_view_lifecycle = enabled;
        self
    }

    /// Sets all feature flags at once.
    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// Returns an error if a value is out of range or a feature flag is set
    /// without its bridge.
    pub fn build(self) -> Result<CoreConfig> {
        let config = CoreConfig {
            refresh_policy: self.refresh_policy.unwrap_or_default(),
            push_retry: self.push_retry.unwrap_or_else(RetryPolicy::push_channel),
            action_retry: self.action_retry.unwrap_or_else(RetryPolicy::queue_action),
            action_timeout: self.action_timeout.unwrap_or(DEFAULT_ACTION_TIMEOUT),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            scrobble_sink: self.scrobble_sink,
            view_lifecycle: self.view_lifecycle,
            features: self.features,
        };

        config.validate()?;

        Ok(config)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{Song, ViewState, ViewStateStream};

    struct MockScrobbleSink;

    #[async_trait]
    impl ScrobbleSink for MockScrobbleSink {
        fn is_scrobbling_enabled(&self) -> bool {
            true
        }

        async fn record_scrobble(&self, _song: &Song) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct MockViewLifecycle;

    #[async_trait]
    impl ViewLifecycle for MockViewLifecycle {
        async fn current_state(&self) -> BridgeResult<ViewState> {
            Ok(ViewState::Inactive)
        }

        async fn subscribe_changes(&self) -> BridgeResult<Box<dyn ViewStateStream>> {
            Err(bridge_traits::BridgeError::NotAvailable(
                "no view".to_string(),
            ))
        }
    }

    #[test]
    fn test_defaults() {
        let config = CoreConfig::builder().build().unwrap();

        assert_eq!(
            config.refresh_policy,
            RefreshPolicy::PushWithTimeoutFallback {
                timeout: Duration::from_secs(120)
            }
        );
        assert_eq!(config.push_retry.max_attempts, 25);
        assert_eq!(config.action_retry.max_attempts, 3);
        assert_eq!(config.action_timeout, Duration::from_secs(20));
        assert_eq!(config.event_buffer_size, 100);
        assert!(config.active_scrobble_sink().is_none());
    }

    #[test]
    fn test_fixed_interval_policy() {
        let config = CoreConfig::builder()
            .refresh_policy(RefreshPolicy::fixed_interval(DEFAULT_POLL_PERIOD))
            .build()
            .unwrap();

        assert!(!config.refresh_policy.uses_push());
        assert_eq!(config.refresh_policy.wait(), Duration::from_secs(90));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = CoreConfig::builder()
            .refresh_policy(RefreshPolicy::push_with_timeout_fallback(Duration::ZERO))
            .build();

        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("fallback timeout")));
    }

    #[test]
    fn test_zero_retry_attempts_rejected() {
        let result = CoreConfig::builder().push_retry_attempts(0).build();
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("at least 1 attempt")));
    }

    #[test]
    fn test_inverted_backoff_rejected() {
        let result = CoreConfig::builder()
            .action_retry(RetryPolicy::new(
                3,
                Duration::from_secs(10),
                Duration::from_secs(1),
            ))
            .build();

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_event_buffer_bounds() {
        assert!(CoreConfig::builder().event_buffer_size(0).build().is_err());
        assert!(CoreConfig::builder().event_buffer_size(10_001).build().is_err());
        assert!(CoreConfig::builder().event_buffer_size(10_000).build().is_ok());
    }

    #[test]
    fn test_scrobbling_requires_sink() {
        let result = CoreConfig::builder().enable_scrobbling(true).build();

        match result {
            Err(Error::CapabilityMissing { capability, .. }) => {
                assert_eq!(capability, "ScrobbleSink")
            }
            other => panic!("expected CapabilityMissing, got {other:?}"),
        }

        let config = CoreConfig::builder()
            .enable_scrobbling(true)
            .scrobble_sink(Arc::new(MockScrobbleSink))
            .build()
            .unwrap();
        assert!(config.active_scrobble_sink().is_some());
    }

    #[test]
    fn test_sink_without_flag_stays_inactive() {
        let config = CoreConfig::builder()
            .scrobble_sink(Arc::new(MockScrobbleSink))
            .build()
            .unwrap();

        assert!(config.scrobble_sink.is_some());
        assert!(config.active_scrobble_sink().is_none());
    }

    #[test]
    fn test_lifecycle_requires_bridge() {
        let result = CoreConfig::builder().follow_view_lifecycle(true).build();
        assert!(matches!(
            result,
            Err(Error::CapabilityMissing { ref capability, .. }) if capability == "ViewLifecycle"
        ));

        let config = CoreConfig::builder()
            .follow_view_lifecycle(true)
            .view_lifecycle(Arc::new(MockViewLifecycle))
            .build()
            .unwrap();
        assert!(config.features.follow_view_lifecycle);
    }

    #[test]
    fn test_retry_delay_is_capped() {
        let policy = RetryPolicy::push_channel();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
    }

    #[test]
    fn test_policies_serialize_for_settings() {
        let json = serde_json::to_value(RefreshPolicy::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "mode": "push_with_timeout_fallback", "timeout_secs": 120 })
        );

        let parsed: RefreshPolicy =
            serde_json::from_str(r#"{ "mode": "fixed_interval", "period_secs": 90 }"#).unwrap();
        assert_eq!(parsed, RefreshPolicy::fixed_interval(Duration::from_secs(90)));

        let retry = serde_json::to_value(RetryPolicy::push_channel()).unwrap();
        assert_eq!(retry["max_attempts"], 25);
        assert_eq!(retry["initial_backoff_ms"], 1000);
    }

    #[test]
    fn test_debug_hides_bridges() {
        let config = CoreConfig::builder()
            .scrobble_sink(Arc::new(MockScrobbleSink))
            .build()
            .unwrap();

        let rendered = format!("{config:?}");
        assert!(rendered.contains("ScrobbleSink { ... }"));
    }
}
