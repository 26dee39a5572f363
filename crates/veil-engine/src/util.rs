//! Shared deadline plumbing.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;

/// Runs the operation under an optional cooperative deadline. On
/// expiry the underlying future is dropped (for store batches that
/// means the transaction never commits) and the caller gets a
/// deadline error naming the operation.
pub(crate) async fn with_deadline<T, F>(
    deadline: Option<Duration>,
    operation: &'static str,
    future: F,
) -> Result<T>
where
    F: Future<Output = std::result::Result<T, veil_store::StoreError>>,
{
    match deadline {
        None => Ok(future.await?),
        Some(limit) => match tokio::time::timeout(limit, future).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(Error::DeadlineExceeded { operation }),
        },
    }
}
