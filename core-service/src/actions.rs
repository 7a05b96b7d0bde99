//! # Library Actions
//!
//! User-initiated requests against the jukebox: search, queueing and stars.
//!
//! Queue requests are retried with backoff and each attempt is bounded by a
//! timeout. Rejected credentials are never retried.

use crate::error::{CoreError, Result};
use bridge_traits::{error::Result as BridgeResult, RemoteMusicService, Song};
use core_runtime::config::RetryPolicy;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Runs `op` until it succeeds, giving each attempt `timeout`.
pub async fn with_retry<T, F, Fut>(
    operation: &str,
    retry: &RetryPolicy,
    timeout: Duration,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BridgeResult<T>>,
{
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        let error = match core_async::time::timeout(timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if e.is_unauthorized() => return Err(e.into()),
            Ok(Err(e)) => CoreError::Service(e),
            Err(_) => CoreError::Timeout {
                operation: operation.to_string(),
                timeout,
            },
        };

        if attempt >= retry.max_attempts {
            warn!(attempt, "{} failed, giving up: {}", operation, error);
            return Err(error);
        }

        let delay = retry.delay_for(attempt - 1);
        debug!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "{} failed, retrying: {}",
            operation,
            error
        );
        core_async::sleep(delay).await;
    }
}

/// Searches the library. Blank queries are rejected without a request.
#[instrument(skip(service))]
pub async fn search(service: &dyn RemoteMusicService, query: &str) -> Result<Vec<Song>> {
    let query = query.trim();
    if query.is_empty() {
        return Err(CoreError::InvalidInput(
            "search query must not be empty".to_string(),
        ));
    }

    let songs = service.search(query).await?;
    debug!(results = songs.len(), "Search finished");
    Ok(songs)
}

#[instrument(skip(service, retry), fields(song_id = %song.id))]
pub async fn queue_song(
    service: &dyn RemoteMusicService,
    song: &Song,
    retry: &RetryPolicy,
    timeout: Duration,
) -> Result<()> {
    with_retry("Queue song", retry, timeout, move || service.queue_song(song)).await?;
    info!("Queued {}", song);
    Ok(())
}

/// Queues every song on an album in server order.
///
/// Stops at the first song that still fails after retries. Returns how many
/// songs were queued.
#[instrument(skip(service, retry))]
pub async fn queue_album(
    service: &dyn RemoteMusicService,
    artist: &str,
    album: &str,
    retry: &RetryPolicy,
    timeout: Duration,
) -> Result<usize> {
    let songs = with_retry("List album", retry, timeout, move || {
        service.all_songs_on_album(artist, album)
    })
    .await?;

    for song in &songs {
        with_retry("Queue song", retry, timeout, move || service.queue_song(song)).await?;
    }

    info!(count = songs.len(), "Queued album");
    Ok(songs.len())
}

/// Flips the starred flag of `song` on the server and returns the new value.
#[instrument(skip(service), fields(song_id = %song.id))]
pub async fn toggle_starred(
    service: &dyn RemoteMusicService,
    song: &Song,
    currently_starred: bool,
) -> Result<bool> {
    if currently_starred {
        service.unstar(song).await?;
    } else {
        service.star(song).await?;
    }
    Ok(!currently_starred)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{BridgeError, ChangeStream};
    use mockall::mock;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    mock! {
        Jukebox {}

        #[async_trait]
        impl RemoteMusicService for Jukebox {
            async fn current_song(&self) -> BridgeResult<Song>;
            async fn queue(&self) -> BridgeResult<Vec<Song>>;
            async fn subscribe_to_change_notifications(&self) -> BridgeResult<Box<dyn ChangeStream>>;
            async fn search(&self, query: &str) -> BridgeResult<Vec<Song>>;
            async fn queue_song(&self, song: &Song) -> BridgeResult<()>;
            async fn all_songs_for_artist(&self, artist: &str) -> BridgeResult<Vec<Song>>;
            async fn all_songs_on_album(&self, artist: &str, album: &str) -> BridgeResult<Vec<Song>>;
            async fn star(&self, song: &Song) -> BridgeResult<()>;
            async fn unstar(&self, song: &Song) -> BridgeResult<()>;
        }
    }

    fn song(id: &str) -> Song {
        Song::new(id, id, "LCD Soundsystem", "Sound Of Silver")
    }

    fn retry() -> RetryPolicy {
        RetryPolicy::queue_action()
    }

    const TIMEOUT: Duration = Duration::from_secs(20);

    #[tokio::test]
    async fn test_search_rejects_blank_query() {
        let mut jukebox = MockJukebox::new();
        jukebox.expect_search().never();

        let result = search(&jukebox, "   ").await;
        assert!(matches!(result, Err(CoreError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_search_trims_query() {
        let mut jukebox = MockJukebox::new();
        jukebox
            .expect_search()
            .withf(|query| query == "lcd")
            .times(1)
            .returning(|_| Ok(vec![song("A")]));

        let songs = search(&jukebox, "  lcd ").await.unwrap();
        assert_eq!(songs.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_song_retries_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let mut jukebox = MockJukebox::new();
        jukebox.expect_queue_song().times(2).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(BridgeError::Network("503".to_string()))
            } else {
                Ok(())
            }
        });

        queue_song(&jukebox, &song("A"), &retry(), TIMEOUT).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_song_gives_up_after_max_attempts() {
        let mut jukebox = MockJukebox::new();
        jukebox
            .expect_queue_song()
            .times(3)
            .returning(|_| Err(BridgeError::Network("503".to_string())));

        let result = queue_song(&jukebox, &song("A"), &retry(), TIMEOUT).await;
        assert!(matches!(result, Err(CoreError::Service(BridgeError::Network(_)))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_is_not_retried() {
        let mut jukebox = MockJukebox::new();
        jukebox
            .expect_queue_song()
            .times(1)
            .returning(|_| Err(BridgeError::Unauthorized("401".to_string())));

        let error = queue_song(&jukebox, &song("A"), &retry(), TIMEOUT)
            .await
            .unwrap_err();
        assert!(error.requires_login());
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_times_out_each_attempt() {
        let attempts = AtomicU32::new(0);
        let started = core_async::Instant::now();

        let result: Result<()> = with_retry("Slow call", &retry(), Duration::from_secs(1), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async {
                core_async::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
        })
        .await;

        assert!(matches!(result, Err(CoreError::Timeout { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // Three 1 s attempts plus 250 ms and 500 ms of backoff.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(3_750));
        assert!(elapsed < Duration::from_millis(3_800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_album_queues_every_song_in_order() {
        let mut jukebox = MockJukebox::new();
        jukebox
            .expect_all_songs_on_album()
            .withf(|artist, album| artist == "LCD Soundsystem" && album == "Sound Of Silver")
            .times(1)
            .returning(|_, _| Ok(vec![song("A"), song("B"), song("C")]));

        let mut seq = mockall::Sequence::new();
        for id in ["A", "B", "C"] {
            jukebox
                .expect_queue_song()
                .withf(move |s| s.id == id)
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(()));
        }

        let count = queue_album(&jukebox, "LCD Soundsystem", "Sound Of Silver", &retry(), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_toggle_starred() {
        let mut jukebox = MockJukebox::new();
        jukebox.expect_star().times(1).returning(|_| Ok(()));
        jukebox.expect_unstar().times(1).returning(|_| Ok(()));

        assert!(toggle_starred(&jukebox, &song("A"), false).await.unwrap());
        assert!(!toggle_starred(&jukebox, &song("A"), true).await.unwrap());
    }
}
