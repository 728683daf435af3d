//! Running synchronous tool functions off the async runtime.

use crate::Error;

/// Execute a synchronous closure on Tokio's blocking threadpool.
///
/// Tool functions are plain `Fn(&str) -> String` and may sleep, do file I/O
/// or block on a lock; running them here keeps the producer task's worker
/// thread free for stream I/O.
///
/// ```ignore
/// let output = run_blocking(move || tool.call(&arguments)).await?;
/// ```
pub async fn run_blocking<F, T>(f: F) -> Result<T, Error>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Unknown(format!("Blocking task failed: {}", e)))
}
