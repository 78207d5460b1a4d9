use crate::{QueryError, QueryExpr, Result, RowLabeled, ScalarOp, SetBinding, Value};
use futures::{future::BoxFuture, stream::BoxStream};
use std::future::Future;

/// Lazily pulled synchronous result rows.
pub type RowIter = Box<dyn Iterator<Item = Result<RowLabeled>> + Send>;
/// Lazily pulled asynchronous result rows.
pub type RowStream = BoxStream<'static, Result<RowLabeled>>;
/// Deferred scalar result.
pub type ValueFuture = BoxFuture<'static, Result<Value>>;

/// Set resolution on a live context: maps an entity-set name to the concrete
/// binding substitution puts in place of a query's source markers.
pub trait SetCatalog {
    /// `Ok(None)` when the context has no set under that name.
    fn resolve(&self, entity: &str) -> Result<Option<SetBinding>>;
}

/// The real execution engine obtained from a live context.
///
/// Results are owned (`'static`): the provider must not hand out borrows of
/// the context, because results outlive the call that started them. Keeping
/// the context alive until a result is fully consumed is the job of the
/// wrappers in [`crate::wrap`], not of the provider.
pub trait Provider: Send {
    /// Whether [`Provider::fetch_stream`] and [`Provider::scalar_async`] are
    /// usable. Checked before any substitution work when asynchronous
    /// execution is requested.
    fn supports_async(&self) -> bool {
        false
    }

    /// Execute the query, pulling rows lazily and synchronously.
    fn fetch_iter(&mut self, query: &QueryExpr) -> Result<RowIter>;

    /// Execute the query, pulling rows lazily with suspension points.
    fn fetch_stream(&mut self, query: &QueryExpr) -> Result<RowStream> {
        let _ = query;
        Err(QueryError::AsyncUnsupported.into())
    }

    /// Execute the query as a scalar of the given shape.
    fn scalar(&mut self, query: &QueryExpr, op: ScalarOp) -> Result<Value>;

    /// Deferred form of [`Provider::scalar`].
    fn scalar_async(&mut self, query: &QueryExpr, op: ScalarOp) -> Result<ValueFuture> {
        let _ = (query, op);
        Err(QueryError::AsyncUnsupported.into())
    }
}

/// A short-lived ORM context: created per query execution, exclusively owned
/// by one in-flight query and its eventual result wrapper, released exactly
/// once and never reused afterwards.
///
/// Dropping the context is the immediate release form; [`Context::close`] is
/// the suspending one.
pub trait Context: Send + Sized + Unpin + 'static {
    type Provider: Provider;

    /// Put the context in read-only mode: results are not tracked for
    /// write-back.
    fn disable_tracking(&mut self);

    fn catalog(&self) -> &dyn SetCatalog;

    fn provider(&mut self) -> &mut Self::Provider;

    /// Asynchronous disposal. The default falls back to the immediate form.
    fn close(self) -> impl Future<Output = Result<()>> + Send {
        async move {
            drop(self);
            Ok(())
        }
    }
}
