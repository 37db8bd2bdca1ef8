use tokio::sync::oneshot;

use crate::errors::MiddlewareError;

/// Create a connected result handle pair. The caller keeps the
/// [`ResultFuture`]; the sink travels with the invocation and receives
/// exactly one terminal outcome.
pub fn result_pair<T>() -> (ResultSink<T>, ResultFuture<T>) {
    let (tx, rx) = oneshot::channel();
    (ResultSink { tx }, ResultFuture { rx })
}

/// Write-half of a result handle. Consumed on first use, which is what
/// enforces the dispatch-at-most-once invariant for queued invocations.
#[derive(Debug)]
pub struct ResultSink<T> {
    tx: oneshot::Sender<Result<T, MiddlewareError>>,
}

impl<T> ResultSink<T> {
    pub fn resolve(self, value: T) {
        // A caller that dropped its future is not an error.
        let _ = self.tx.send(Ok(value));
    }

    pub fn fail(self, error: MiddlewareError) {
        let _ = self.tx.send(Err(error));
    }
}

/// Read-half of a result handle, held by the original call site.
#[derive(Debug)]
pub struct ResultFuture<T> {
    rx: oneshot::Receiver<Result<T, MiddlewareError>>,
}

impl<T> ResultFuture<T> {
    /// Wait for the terminal outcome. A sink dropped without writing maps to
    /// the catch-all error so callers never hang on an abandoned invocation.
    pub async fn outcome(self) -> Result<T, MiddlewareError> {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(MiddlewareError::Internal(
                "result handle dropped before completion".into(),
            )),
        }
    }

    /// Non-blocking probe: `None` while no outcome has been written.
    pub fn try_outcome(&mut self) -> Option<Result<T, MiddlewareError>> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_reaches_future() {
        let (sink, future) = result_pair::<u32>();
        sink.resolve(7);
        assert_eq!(future.outcome().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn failure_reaches_future() {
        let (sink, future) = result_pair::<u32>();
        sink.fail(MiddlewareError::SendBufferFull);
        assert_eq!(
            future.outcome().await.unwrap_err(),
            MiddlewareError::SendBufferFull
        );
    }

    #[tokio::test]
    async fn dropped_sink_becomes_internal_error() {
        let (sink, future) = result_pair::<u32>();
        drop(sink);
        assert!(matches!(
            future.outcome().await.unwrap_err(),
            MiddlewareError::Internal(_)
        ));
    }

    #[tokio::test]
    async fn try_outcome_is_none_until_written() {
        let (sink, mut future) = result_pair::<u32>();
        assert!(future.try_outcome().is_none());
        sink.resolve(1);
        assert_eq!(future.try_outcome().unwrap().unwrap(), 1);
    }

    #[test]
    fn resolve_after_future_dropped_is_silent() {
        let (sink, future) = result_pair::<u32>();
        drop(future);
        sink.resolve(3);
    }
}
