//! # Push Channel Listener
//!
//! Keeps a change-notification subscription open for as long as the sync is
//! active and turns every signal into a refresh request.
//!
//! A subscription that cannot be opened, errors, or closes counts as one
//! failed attempt. Attempts back off exponentially; after
//! `RetryPolicy::max_attempts` consecutive failures the listener gives up
//! and the refresh loop is left running on its fallback timer alone. A
//! successful subscription resets the count.

use crate::state::{FailureKind, FetchFailure, NowPlayingStore};
use bridge_traits::{ChangeStream, RemoteMusicService};
use core_async::sync::{CancellationToken, Notify};
use core_runtime::config::RetryPolicy;
use core_runtime::events::{CoreEvent, EventBus, NowPlayingEvent};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// How a live subscription ended.
enum StreamEnd {
    Cancelled,
    Failed(String),
}

pub(crate) struct PushListener {
    service: Arc<dyn RemoteMusicService>,
    retry: RetryPolicy,
    trigger: Arc<Notify>,
    store: NowPlayingStore,
    events: Arc<EventBus>,
    cancel: CancellationToken,
}

impl PushListener {
    pub(crate) fn new(
        service: Arc<dyn RemoteMusicService>,
        retry: RetryPolicy,
        trigger: Arc<Notify>,
        store: NowPlayingStore,
        events: Arc<EventBus>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            service,
            retry,
            trigger,
            store,
            events,
            cancel,
        }
    }

    #[instrument(skip(self), fields(max_attempts = self.retry.max_attempts))]
    pub(crate) async fn run(self) {
        let mut failures: u32 = 0;

        loop {
            let subscribed = core_async::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                result = self.service.subscribe_to_change_notifications() => result,
            };

            let reason = match subscribed {
                Ok(mut stream) => {
                    info!(attempt = failures + 1, "Push channel connected");
                    self.emit(NowPlayingEvent::PushChannelConnected {
                        attempt: failures + 1,
                    });
                    failures = 0;

                    let end = self.listen(stream.as_mut()).await;
                    if let Err(e) = stream.unsubscribe().await {
                        warn!("Failed to unsubscribe from push channel: {}", e);
                    }

                    match end {
                        StreamEnd::Cancelled => return,
                        StreamEnd::Failed(reason) => reason,
                    }
                }
                Err(e) => e.to_string(),
            };

            failures += 1;
            if failures >= self.retry.max_attempts {
                self.give_up(failures, &reason);
                return;
            }

            let delay = self.retry.delay_for(failures - 1);
            warn!(
                attempt = failures,
                max_attempts = self.retry.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Push channel failed: {}",
                reason
            );
            self.emit(NowPlayingEvent::PushChannelRetrying {
                attempt: failures,
                max_attempts: self.retry.max_attempts,
                message: reason,
            });

            core_async::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = core_async::sleep(delay) => {}
            }
        }
    }

    async fn listen(&self, stream: &mut dyn ChangeStream) -> StreamEnd {
        loop {
            let next = core_async::select! {
                biased;
                _ = self.cancel.cancelled() => return StreamEnd::Cancelled,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(_)) => {
                    debug!("Push notification received");
                    self.trigger.notify_one();
                }
                Some(Err(e)) => return StreamEnd::Failed(e.to_string()),
                None => return StreamEnd::Failed("push channel closed".to_string()),
            }
        }
    }

    fn give_up(&self, attempts: u32, reason: &str) {
        warn!(
            attempts,
            "Giving up on push channel, falling back to timer only: {}", reason
        );
        self.store.publish_failure(FetchFailure::new(
            FailureKind::PushChannelExhausted,
            format!("push channel unavailable after {attempts} attempts: {reason}"),
            0,
        ));
        self.emit(NowPlayingEvent::PushChannelExhausted { attempts });
    }

    fn emit(&self, event: NowPlayingEvent) {
        // Nobody listening is not an error for the listener.
        let _ = self.events.emit(CoreEvent::NowPlaying(event));
    }
}
