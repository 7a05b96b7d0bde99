//! # Jukebox Session
//!
//! An authenticated handle on one jukebox server. Passed explicitly to
//! everything that talks to the server instead of living in a global.

use crate::error::{Result, SyncError};
use bridge_traits::RemoteMusicService;
use core_runtime::logging::redact_if_sensitive;
use std::fmt;
use std::sync::Arc;

/// Port the jukebox streams its audio on, regardless of the API port.
pub const LISTEN_PORT: u16 = 8000;

/// A signed-in jukebox session.
#[derive(Clone)]
pub struct Session {
    service: Arc<dyn RemoteMusicService>,
    base_url: String,
    user: String,
    token: String,
}

impl Session {
    /// Creates a session after checking that `base_url` is an http(s) URL
    /// with a host.
    pub fn new(
        service: Arc<dyn RemoteMusicService>,
        base_url: impl Into<String>,
        user: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        split_base_url(&base_url)?;

        Ok(Self {
            service,
            base_url,
            user: user.into(),
            token: token.into(),
        })
    }

    pub fn service(&self) -> &Arc<dyn RemoteMusicService> {
        &self.service
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Plain-http stream URL on [`LISTEN_PORT`] of the session's host.
    ///
    /// ```ignore
    /// // base "https://example.com" -> "http://example.com:8000/listen"
    /// ```
    pub fn listen_url(&self) -> String {
        let host = split_base_url(&self.base_url)
            .map(|(_, host)| host)
            .unwrap_or_default();
        format!("http://{host}:{LISTEN_PORT}/listen")
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.base_url)
            .field("user", &redact_if_sensitive("user", &self.user))
            .field("token", &redact_if_sensitive("token", &self.token))
            .finish()
    }
}

/// Splits `scheme://host[:port][/path]` into scheme and bare host.
fn split_base_url(url: &str) -> Result<(&str, &str)> {
    let invalid = |reason: &str| SyncError::InvalidBaseUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| invalid("missing scheme"))?;

    if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") {
        return Err(invalid("scheme must be http or https"));
    }

    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let authority = authority.rsplit('@').next().unwrap_or_default();

    let host = if authority.starts_with('[') {
        // IPv6 literal: keep the brackets, drop any port after them.
        match authority.find(']') {
            Some(end) => &authority[..=end],
            None => return Err(invalid("unterminated IPv6 host")),
        }
    } else {
        authority.split(':').next().unwrap_or_default()
    };

    if host.is_empty() {
        return Err(invalid("missing host"));
    }

    Ok((scheme, host))
}
