//! Runtime utilities that abstract over the underlying async executor.
//!
//! Native targets wrap Tokio's runtime primitives. On WebAssembly there is no
//! way to block the single browser thread, so only the handle-free helpers are
//! exported there.

#[cfg(not(target_arch = "wasm32"))]
pub use tokio::runtime::{Builder, Handle, Runtime};

/// Runs the provided future to completion on a throwaway current-thread runtime.
///
/// Used by synchronous host entry points (CLI `main`, FFI shims). Returns an
/// error when the runtime cannot be constructed instead of panicking.
#[cfg(not(target_arch = "wasm32"))]
pub fn block_on<F>(future: F) -> std::io::Result<F::Output>
where
    F: std::future::Future,
{
    let runtime = Builder::new_current_thread().enable_all().build()?;
    Ok(runtime.block_on(future))
}

/// Returns `true` when called from inside a runtime context that can accept
/// spawned tasks.
#[cfg(not(target_arch = "wasm32"))]
pub fn has_runtime() -> bool {
    Handle::try_current().is_ok()
}

/// The browser event loop is always available on WebAssembly.
#[cfg(target_arch = "wasm32")]
pub fn has_runtime() -> bool {
    true
}
