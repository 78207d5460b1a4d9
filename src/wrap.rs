use crate::{Context, Result};
use futures::{Stream, future::BoxFuture};
use std::{
    future::Future,
    pin::Pin,
    task::{Context as TaskContext, Poll},
    vec,
};

/// Lazily pulled synchronous sequence owning the context it was produced
/// from. Field order matters: the inner iterator is torn down before the
/// context it may still depend on, on every exit path.
pub struct AutoReleaseIter<I, C> {
    inner: I,
    resource: C,
}

impl<I, C> AutoReleaseIter<I, C> {
    pub fn new(inner: I, resource: C) -> Self {
        Self { inner, resource }
    }

    /// The owned context, alive exactly as long as this sequence.
    pub fn resource(&self) -> &C {
        &self.resource
    }
}

impl<I: Iterator, C> Iterator for AutoReleaseIter<I, C> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Lazily pulled asynchronous sequence owning the context it was produced
/// from. Dropping it releases the context immediately; [`close`] is the
/// suspending form that awaits the context's asynchronous disposal.
///
/// [`close`]: AutoReleaseStream::close
pub struct AutoReleaseStream<S, C> {
    inner: S,
    resource: C,
}

impl<S, C: Context> AutoReleaseStream<S, C> {
    pub fn new(inner: S, resource: C) -> Self {
        Self { inner, resource }
    }

    pub fn resource(&self) -> &C {
        &self.resource
    }

    /// Tears down the inner stream, then releases the context, awaiting its
    /// asynchronous close. In that order: the inner stream may still need
    /// the context while shutting down.
    pub async fn close(self) -> Result<()> {
        let Self { inner, resource } = self;
        drop(inner);
        resource.close().await
    }
}

impl<S: Stream + Unpin, C: Context> Stream for AutoReleaseStream<S, C> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Buffers an entire resource-bound sequence into memory.
///
/// The materializing future is created at construction but only driven from
/// the first `poll_next`, so construction itself never blocks; afterwards the
/// elements are served from the in-memory list. Used for the non-lazy
/// synchronous execution path, whose rows cannot outlive the call that
/// produced them: buffering detaches the data from the context immediately.
pub struct BufferedStream<T, C> {
    pending: Option<BoxFuture<'static, Result<Vec<T>>>>,
    buffered: vec::IntoIter<T>,
    resource: C,
}

impl<T, C: Context> BufferedStream<T, C> {
    pub fn new(pending: BoxFuture<'static, Result<Vec<T>>>, resource: C) -> Self {
        Self {
            pending: Some(pending),
            buffered: Vec::new().into_iter(),
            resource,
        }
    }

    /// Buffer a blocking iterator produced by a synchronous execution path.
    /// The drain runs on first poll, not here.
    pub fn from_blocking<I>(iter: I, resource: C) -> Self
    where
        T: Send + 'static,
        I: Iterator<Item = Result<T>> + Send + 'static,
    {
        Self::new(Box::pin(async move { iter.collect() }), resource)
    }

    pub fn resource(&self) -> &C {
        &self.resource
    }

    /// Suspending disposal: releases the context through its asynchronous
    /// close after abandoning any pending materialization.
    pub async fn close(self) -> Result<()> {
        let Self {
            pending,
            buffered,
            resource,
        } = self;
        drop(pending);
        drop(buffered);
        resource.close().await
    }
}

impl<T: Unpin, C: Context> Stream for BufferedStream<T, C> {
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        if let Some(pending) = self.pending.as_mut() {
            match pending.as_mut().poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Ok(rows)) => {
                    self.pending = None;
                    self.buffered = rows.into_iter();
                }
                Poll::Ready(Err(error)) => {
                    self.pending = None;
                    return Poll::Ready(Some(Err(error)));
                }
            }
        }
        Poll::Ready(self.buffered.next().map(Ok))
    }
}

/// Couples a deferred single-value computation to the context it depends on:
/// once the value is produced the context is released, before the value is
/// handed onward. Failures of the original computation propagate unchanged;
/// a close failure is surfaced only when the computation itself succeeded.
pub async fn release_after<T, C: Context>(
    pending: impl Future<Output = Result<T>> + Send,
    resource: C,
) -> Result<T> {
    let outcome = pending.await;
    let closed = resource.close().await;
    match (outcome, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_error)) => Err(close_error),
        (Err(error), Ok(())) => Err(error),
        (Err(error), Err(close_error)) => {
            log::warn!(
                "Context close failed while handling an execution error: {:#}",
                close_error
            );
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, Provider, QueryExpr, Result, RowIter, ScalarOp, SetCatalog, Value};
    use futures::{StreamExt, executor::block_on, stream};
    use std::{
        future::Future,
        sync::{
            Arc,
            atomic::{AtomicBool, AtomicUsize, Ordering},
        },
    };

    struct NoopProvider;

    impl Provider for NoopProvider {
        fn fetch_iter(&mut self, _query: &QueryExpr) -> Result<RowIter> {
            Ok(Box::new(std::iter::empty()))
        }
        fn scalar(&mut self, _query: &QueryExpr, _op: ScalarOp) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    struct EmptyCatalog;

    impl SetCatalog for EmptyCatalog {
        fn resolve(&self, _entity: &str) -> Result<Option<crate::SetBinding>> {
            Ok(None)
        }
    }

    struct TestResource {
        closed: Arc<AtomicUsize>,
        fail_close: bool,
        provider: NoopProvider,
    }

    impl TestResource {
        fn new(closed: Arc<AtomicUsize>) -> Self {
            Self {
                closed,
                fail_close: false,
                provider: NoopProvider,
            }
        }
    }

    impl Drop for TestResource {
        fn drop(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Context for TestResource {
        type Provider = NoopProvider;

        fn disable_tracking(&mut self) {}

        fn catalog(&self) -> &dyn SetCatalog {
            &EmptyCatalog
        }

        fn provider(&mut self) -> &mut NoopProvider {
            &mut self.provider
        }

        fn close(self) -> impl Future<Output = Result<()>> + Send {
            let fail = self.fail_close;
            async move {
                drop(self);
                if fail {
                    Err(Error::msg("Close failed"))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Asserts at its own teardown that the resource has not been released
    /// yet, which pins the inner-before-resource drop order.
    struct OrderProbe {
        closed: Arc<AtomicUsize>,
        items: std::vec::IntoIter<i64>,
    }

    impl Iterator for OrderProbe {
        type Item = i64;
        fn next(&mut self) -> Option<i64> {
            self.items.next()
        }
    }

    impl Drop for OrderProbe {
        fn drop(&mut self) {
            assert_eq!(self.closed.load(Ordering::SeqCst), 0);
        }
    }

    #[test]
    fn iter_releases_the_resource_exactly_once_after_the_inner_iterator() {
        let closed = Arc::new(AtomicUsize::new(0));
        let inner = OrderProbe {
            closed: closed.clone(),
            items: vec![1, 2, 3].into_iter(),
        };
        let mut wrapped = AutoReleaseIter::new(inner, TestResource::new(closed.clone()));
        assert_eq!(wrapped.by_ref().collect::<Vec<_>>(), [1, 2, 3]);
        assert_eq!(closed.load(Ordering::SeqCst), 0);
        drop(wrapped);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stream_releases_on_plain_drop_and_on_close() {
        let closed = Arc::new(AtomicUsize::new(0));
        let wrapped = AutoReleaseStream::new(
            stream::iter([1, 2]),
            TestResource::new(closed.clone()),
        );
        drop(wrapped);
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        let closed = Arc::new(AtomicUsize::new(0));
        let mut wrapped = AutoReleaseStream::new(
            stream::iter([1, 2]),
            TestResource::new(closed.clone()),
        );
        block_on(async {
            let mut collected = Vec::new();
            while let Some(item) = wrapped.next().await {
                collected.push(item);
            }
            assert_eq!(collected, [1, 2]);
            wrapped.close().await.unwrap();
        });
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn buffered_round_trip_preserves_order_and_defers_materialization() {
        let closed = Arc::new(AtomicUsize::new(0));
        let polled = Arc::new(AtomicBool::new(false));
        let probe = polled.clone();
        let wrapped = BufferedStream::new(
            Box::pin(async move {
                probe.store(true, Ordering::SeqCst);
                Ok(vec![10, 20, 30])
            }),
            TestResource::new(closed.clone()),
        );
        assert!(!polled.load(Ordering::SeqCst));
        let collected: Vec<i64> = block_on(wrapped.map(|v| v.unwrap()).collect::<Vec<_>>());
        assert!(polled.load(Ordering::SeqCst));
        assert_eq!(collected, [10, 20, 30]);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn buffered_surfaces_the_materialization_error_once() {
        let closed = Arc::new(AtomicUsize::new(0));
        let mut wrapped = BufferedStream::<i64, _>::new(
            Box::pin(async { Err(Error::msg("Storage failure")) }),
            TestResource::new(closed.clone()),
        );
        block_on(async {
            let first = wrapped.next().await;
            assert!(matches!(first, Some(Err(..))));
            assert!(wrapped.next().await.is_none());
            wrapped.close().await.unwrap();
        });
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_after_releases_before_yielding_the_value() {
        let closed = Arc::new(AtomicUsize::new(0));
        let resource = TestResource::new(closed.clone());
        let probe = closed.clone();
        let value = block_on(release_after(
            async move {
                assert_eq!(probe.load(Ordering::SeqCst), 0);
                Ok(42)
            },
            resource,
        ))
        .unwrap();
        assert_eq!(value, 42);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_after_keeps_the_original_error_over_a_close_failure() {
        let closed = Arc::new(AtomicUsize::new(0));
        let mut resource = TestResource::new(closed.clone());
        resource.fail_close = true;
        let outcome: Result<i64> = block_on(release_after(
            async { Err(Error::msg("Execution failed")) },
            resource,
        ));
        assert_eq!(outcome.unwrap_err().to_string(), "Execution failed");
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }
}
