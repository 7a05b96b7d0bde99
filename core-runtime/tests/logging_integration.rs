//! Integration tests for the logging setup.

use bridge_traits::LogLevel;
use core_runtime::logging::{init_logging, redact_if_sensitive, LogFormat, LoggingConfig};
use core_runtime::Error;

#[test]
fn test_config_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn)
        .with_pii_redaction(false)
        .with_spans(false)
        .with_target(false)
        .with_thread_info(true)
        .with_filter("core_sync=trace");

    assert_eq!(config.format, LogFormat::Compact);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.redact_pii);
    assert!(!config.enable_spans);
    assert!(!config.display_target);
    assert!(config.display_thread_info);
    assert_eq!(config.filter.as_deref(), Some("core_sync=trace"));
}

#[test]
fn test_format_selection() {
    #[cfg(debug_assertions)]
    assert_eq!(LoggingConfig::default().format, LogFormat::Pretty);

    #[cfg(not(debug_assertions))]
    assert_eq!(LoggingConfig::default().format, LogFormat::Json);
}

#[test]
fn test_session_token_never_logged() {
    assert_eq!(redact_if_sensitive("token", "0123456789abcdef"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("session_token", "x"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("base_url", "https://play.example.com"), "https://play.example.com");
}

#[test]
fn test_init_logging_only_once() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Json)
        .with_level(LogLevel::Debug);

    init_logging(config.clone()).unwrap();
    tracing::info!(cycle = 1u64, "logging initialized");

    assert!(matches!(init_logging(config), Err(Error::Logging(_))));
}
