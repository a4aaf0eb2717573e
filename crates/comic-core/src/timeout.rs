use std::{future::Future, time::Duration};

use tracing::warn;

use crate::error::ComicError;

/// Race `operation` against `deadline`.
///
/// The operation runs on its own task. If the deadline wins, the task is detached rather than
/// aborted: it keeps running to completion and its result is discarded. A reported
/// [`ComicError::Timeout`] therefore says nothing about whether the remote effect happened,
/// and callers must not assume it did not.
///
/// This is the one place a call outlives its caller. Dropping the future instead would
/// cancel the request mid-flight, which is exactly the effect a timeout must not have; the
/// price is one short-lived task per wrapped call, which may linger past the deadline until
/// the remote side answers or its own transport timeout fires.
pub async fn with_timeout<T, F>(operation: F, deadline: Duration, label: &str) -> Result<T, ComicError>
where
    F: Future<Output = Result<T, ComicError>> + Send + 'static,
    T: Send + 'static,
{
    let task = tokio::spawn(operation);
    match tokio::time::timeout(deadline, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(ComicError::Internal(format!(
            "{label} task did not complete: {join_err}"
        ))),
        Err(_) => {
            let err = ComicError::timeout(label, deadline);
            warn!(
                label,
                deadline_ms = deadline.as_millis() as u64,
                "call abandoned after deadline; remote effect may still complete"
            );
            Err(err)
        }
    }
}
