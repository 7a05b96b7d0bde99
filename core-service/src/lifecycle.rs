//! Binds the refresh engine to the host's now-playing view.

use crate::error::{CoreError, Result};
use crate::{CoreService, ServiceInner, TaskHandle};
use bridge_traits::ViewState;
use core_async::sync::CancellationToken;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

impl CoreService {
    /// Activates while the view is visible and deactivates when it is not.
    ///
    /// Requires a `ViewLifecycle` in the config. Calling it again while
    /// already following is a no-op. The follower holds only a weak
    /// reference and stops once every `CoreService` clone is dropped.
    pub async fn follow_lifecycle(&self) -> Result<()> {
        let lifecycle = self
            .inner
            .config
            .view_lifecycle
            .clone()
            .ok_or_else(|| CoreError::Config(missing_lifecycle()))?;

        let mut following = self.inner.lifecycle.lock().await;
        if following.as_ref().is_some_and(|handle| !handle.task.is_finished()) {
            debug!("Already following the view lifecycle");
            return Ok(());
        }

        let mut changes = lifecycle.subscribe_changes().await?;
        let initial = lifecycle.current_state().await?;

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let service = Arc::downgrade(&self.inner);

        let task = core_async::spawn(async move {
            if !apply(&service, initial).await {
                return;
            }

            loop {
                let next = core_async::select! {
                    biased;
                    _ = token.cancelled() => return,
                    next = changes.next() => next,
                };

                let Some(state) = next else {
                    debug!("View lifecycle stream ended");
                    apply(&service, ViewState::Inactive).await;
                    return;
                };

                if !apply(&service, state).await {
                    return;
                }
            }
        });

        info!(initial = ?initial, "Following view lifecycle");
        *following = Some(TaskHandle { cancel, task });
        Ok(())
    }

    /// Stops following the view lifecycle. The sync state is left as is.
    pub async fn stop_following_lifecycle(&self) {
        let handle = self.inner.lifecycle.lock().await.take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }
}

/// Returns `false` once the service is gone.
async fn apply(service: &Weak<ServiceInner>, state: ViewState) -> bool {
    let Some(inner) = service.upgrade() else {
        return false;
    };
    let core = CoreService { inner };

    match state {
        ViewState::Active => {
            if let Err(e) = core.activate().await {
                // LoginRequired was already emitted.
                warn!("View became active but sync could not start: {}", e);
            }
        }
        ViewState::Inactive => {
            core.deactivate().await;
        }
    }
    true
}

fn missing_lifecycle() -> core_runtime::Error {
    core_runtime::Error::CapabilityMissing {
        capability: "ViewLifecycle".to_string(),
        message: "follow_lifecycle() needs a ViewLifecycle in CoreConfig".to_string(),
    }
}
