//! Remote Music Service Abstractions
//!
//! The jukebox server owns the playing song and the queue. The core only ever
//! reads snapshots of them and listens for a payload-free "something changed"
//! signal on a push channel.

use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A track as reported by the jukebox server.
///
/// Two songs are equal when their ids are equal; the other fields are
/// display data and may differ between fetches of the same track.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Song {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub starred: bool,
    #[serde(default)]
    pub queued: bool,
    /// Raw timestamp string as sent by the server; may be empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_played: Option<String>,
}

impl Song {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        artist: impl Into<String>,
        album: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            artist: artist.into(),
            album: album.into(),
            ..Default::default()
        }
    }

    /// Parses `last_played` into a UTC timestamp.
    ///
    /// Blank or unparseable values yield `None`.
    pub fn last_played_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.last_played.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }

        DateTime::parse_from_rfc3339(raw)
            .or_else(|_| DateTime::parse_from_rfc2822(raw))
            .map(|ts| ts.with_timezone(&Utc))
            .ok()
    }
}

impl PartialEq for Song {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Song {}

impl Hash for Song {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Song {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} ({})", self.artist, self.name, self.id)
    }
}

/// Wire wrapper used by the server for every song list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongQueue {
    #[serde(default)]
    pub songs: Vec<Song>,
}

impl SongQueue {
    /// Decodes a `{"songs": [...]}` payload.
    pub fn from_json(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

impl From<SongQueue> for Vec<Song> {
    fn from(queue: SongQueue) -> Self {
        queue.songs
    }
}

/// Payload-free marker meaning "server state changed, fetch again".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeSignal;

/// Jukebox server client.
///
/// Implementations wrap the REST API and the pub/sub channel. Failures are
/// reported as [`BridgeError::Network`](crate::BridgeError::Network),
/// [`BridgeError::NotFound`](crate::BridgeError::NotFound) or
/// [`BridgeError::Unauthorized`](crate::BridgeError::Unauthorized) so the core
/// can tell a lost session apart from a flaky connection.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::music::RemoteMusicService;
///
/// async fn show(service: &dyn RemoteMusicService) -> Result<()> {
///     let song = service.current_song().await?;
///     let queue = service.queue().await?;
///     println!("{} then {} more", song, queue.len());
///     Ok(())
/// }
/// ```
#[async_trait::async_trait]
pub trait RemoteMusicService: Send + Sync {
    /// Song the jukebox is playing right now.
    async fn current_song(&self) -> Result<Song>;

    /// Songs queued after the current one, in server order.
    async fn queue(&self) -> Result<Vec<Song>>;

    /// Opens the push channel that fires whenever the server state changes.
    async fn subscribe_to_change_notifications(&self) -> Result<Box<dyn ChangeStream>>;

    /// Free-text search over the library.
    async fn search(&self, query: &str) -> Result<Vec<Song>>;

    /// Adds a song to the play queue.
    async fn queue_song(&self, song: &Song) -> Result<()>;

    async fn all_songs_for_artist(&self, artist: &str) -> Result<Vec<Song>>;

    async fn all_songs_on_album(&self, artist: &str, album: &str) -> Result<Vec<Song>>;

    async fn star(&self, song: &Song) -> Result<()>;

    async fn unstar(&self, song: &Song) -> Result<()>;
}

/// Live subscription to the server's change notifications.
#[async_trait::async_trait]
pub trait ChangeStream: Send {
    /// Waits for the next notification.
    ///
    /// Returns `Some(Err(_))` when the channel failed and `None` once the
    /// remote closed it. Either way the subscription is dead afterwards.
    async fn next(&mut self) -> Option<Result<ChangeSignal>>;

    /// Releases the remote subscription.
    async fn unsubscribe(self: Box<Self>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const SONG_JSON: &str = r#"{
        "album": "Sound Of Silver",
        "starred": false,
        "queued": false,
        "artist": "LCD Soundsystem",
        "name": "Get Innocuous!",
        "id": "4B52884E1E293890",
        "last_played": ""
    }"#;

    #[test]
    fn test_song_decodes_server_payload() {
        let song: Song = serde_json::from_str(SONG_JSON).unwrap();

        assert_eq!(song.id, "4B52884E1E293890");
        assert_eq!(song.name, "Get Innocuous!");
        assert_eq!(song.artist, "LCD Soundsystem");
        assert!(!song.starred);
        assert_eq!(song.last_played_at(), None);
    }

    #[test]
    fn test_song_equality_uses_id_only() {
        let a = Song::new("A1", "One", "Artist", "Album");
        let mut b = a.clone();
        b.name = "Renamed".to_string();
        b.starred = true;

        assert_eq!(a, b);
        assert_ne!(a, Song::new("B2", "One", "Artist", "Album"));

        let set: HashSet<Song> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_last_played_parses_rfc3339() {
        let mut song = Song::new("A1", "One", "Artist", "Album");
        song.last_played = Some("2012-03-04T05:06:07+01:00".to_string());

        let ts = song.last_played_at().unwrap();
        assert_eq!(ts.to_rfc3339(), "2012-03-04T04:06:07+00:00");

        song.last_played = Some("   ".to_string());
        assert_eq!(song.last_played_at(), None);

        song.last_played = Some("yesterday".to_string());
        assert_eq!(song.last_played_at(), None);
    }

    #[test]
    fn test_song_queue_from_json() {
        let payload = format!(r#"{{"songs": [{SONG_JSON}]}}"#);
        let queue = SongQueue::from_json(&payload).unwrap();
        assert_eq!(queue.songs.len(), 1);

        let songs: Vec<Song> = queue.into();
        assert_eq!(songs[0].album, "Sound Of Silver");

        assert!(SongQueue::from_json("{not json").is_err());
    }
}
