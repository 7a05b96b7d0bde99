//! Runtime utilities for hosts that do not already drive an executor.

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Error raised when a runtime cannot be constructed.
pub type RuntimeError = std::io::Error;

/// Builds a multi-threaded runtime suitable for hosting the sync loop.
pub fn build_runtime() -> Result<Runtime, RuntimeError> {
    Builder::new_multi_thread()
        .enable_all()
        .thread_name("jukebox-core")
        .build()
}

/// Runs the provided future to completion on a fresh current-thread runtime.
pub fn block_on<F>(future: F) -> Result<F::Output, RuntimeError>
where
    F: std::future::Future,
{
    let runtime = Builder::new_current_thread().enable_all().build()?;
    Ok(runtime.block_on(future))
}

/// Returns a handle to the runtime driving the current task, if any.
pub fn current_handle() -> Option<Handle> {
    Handle::try_current().ok()
}
