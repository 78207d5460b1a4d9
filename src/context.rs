use crate::{
    AutoReleaseIter, AutoReleaseStream, BufferedStream, Context, ContextFactory, Error, Provider,
    QueryError, QueryExpr, Result, RowIter, RowLabeled, RowStream, ScalarOp, Value,
    rebind_sources, release_after,
};
use futures::TryStreamExt;

/// Orchestrates one query attempt: acquire a fresh context from the factory,
/// rebind the query's source markers against it, execute through the
/// context's own provider and couple the result's lifetime to the context.
///
/// No state survives between calls; concurrency across queries comes from
/// each call owning its own context, so there is nothing to synchronize.
pub struct FactoryQueryContext<F: ContextFactory> {
    factory: F,
}

impl<F: ContextFactory> FactoryQueryContext<F> {
    pub fn new(factory: F) -> Self {
        Self { factory }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Shared head of every execution path: read-only mode, then
    /// substitution against the live catalog.
    fn prepare(ctx: &mut F::Context, query: &QueryExpr) -> Result<QueryExpr> {
        ctx.disable_tracking();
        let async_capable = ctx.provider().supports_async();
        rebind_sources(query, ctx.catalog(), async_capable)
    }

    /// Release the context after a failed step and hand the original error
    /// back unmodified. A close failure is only logged: it must never mask
    /// the error that got us here.
    async fn fail_closing(ctx: F::Context, error: Error) -> Error {
        if let Err(close_error) = ctx.close().await {
            log::warn!(
                "Context close failed while handling an execution error: {:#}",
                close_error
            );
        }
        error
    }

    /// Synchronous, eager execution. The context never escapes this call:
    /// the rows are fully materialized and the context is released before
    /// they are returned.
    pub fn fetch_all(&self, query: &QueryExpr) -> Result<Vec<RowLabeled>> {
        let mut ctx = self.factory.create()?;
        let replaced = Self::prepare(&mut ctx, query)?;
        let rows = ctx.provider().fetch_iter(&replaced)?;
        rows.collect()
    }

    /// Synchronous, lazily pulled execution. The returned sequence owns the
    /// context and releases it when dropped.
    pub fn fetch_iter(&self, query: &QueryExpr) -> Result<AutoReleaseIter<RowIter, F::Context>> {
        let mut ctx = self.factory.create()?;
        let replaced = Self::prepare(&mut ctx, query)?;
        let rows = ctx.provider().fetch_iter(&replaced)?;
        Ok(AutoReleaseIter::new(rows, ctx))
    }

    /// Synchronous scalar execution: the value is already materialized, so
    /// the context is released right here and the value returned unwrapped.
    pub fn scalar(&self, query: &QueryExpr, op: ScalarOp) -> Result<Value> {
        let mut ctx = self.factory.create()?;
        let replaced = Self::prepare(&mut ctx, query)?;
        ctx.provider().scalar(&replaced, op)
    }

    /// Asynchronous, lazily pulled execution. Fails before any substitution
    /// work when the provider cannot execute asynchronously.
    pub async fn fetch_stream(
        &self,
        query: &QueryExpr,
    ) -> Result<AutoReleaseStream<RowStream, F::Context>> {
        let mut ctx = self.factory.create_async().await?;
        if !ctx.provider().supports_async() {
            return Err(Self::fail_closing(ctx, QueryError::AsyncUnsupported.into()).await);
        }
        let produced = Self::prepare(&mut ctx, query);
        let produced = produced.and_then(|replaced| ctx.provider().fetch_stream(&replaced));
        match produced {
            Ok(rows) => Ok(AutoReleaseStream::new(rows, ctx)),
            Err(error) => Err(Self::fail_closing(ctx, error).await),
        }
    }

    /// Asynchronous enumeration over the provider's synchronous execution
    /// path: the resource-bound rows are detached into an in-memory buffer
    /// starting at the first poll. Usable on any provider, async-capable or
    /// not, because the execution itself stays synchronous.
    pub async fn fetch_buffered(
        &self,
        query: &QueryExpr,
    ) -> Result<BufferedStream<RowLabeled, F::Context>> {
        let mut ctx = self.factory.create_async().await?;
        let produced = Self::prepare(&mut ctx, query);
        let produced = produced.and_then(|replaced| ctx.provider().fetch_iter(&replaced));
        match produced {
            Ok(rows) => Ok(BufferedStream::from_blocking(rows, ctx)),
            Err(error) => Err(Self::fail_closing(ctx, error).await),
        }
    }

    /// Deferred single row: the context is released once the row has been
    /// produced, before the caller sees it.
    pub async fn fetch_first_async(&self, query: &QueryExpr) -> Result<Option<RowLabeled>> {
        let mut ctx = self.factory.create_async().await?;
        if !ctx.provider().supports_async() {
            return Err(Self::fail_closing(ctx, QueryError::AsyncUnsupported.into()).await);
        }
        let produced = Self::prepare(&mut ctx, query);
        let produced = produced.and_then(|replaced| ctx.provider().fetch_stream(&replaced));
        match produced {
            Ok(mut rows) => release_after(async move { rows.try_next().await }, ctx).await,
            Err(error) => Err(Self::fail_closing(ctx, error).await),
        }
    }

    /// Deferred scalar: the context is released once the value has been
    /// produced, before the caller sees it.
    pub async fn scalar_async(&self, query: &QueryExpr, op: ScalarOp) -> Result<Value> {
        let mut ctx = self.factory.create_async().await?;
        if !ctx.provider().supports_async() {
            return Err(Self::fail_closing(ctx, QueryError::AsyncUnsupported.into()).await);
        }
        let produced = Self::prepare(&mut ctx, query);
        let produced = produced.and_then(|replaced| ctx.provider().scalar_async(&replaced, op));
        match produced {
            Ok(pending) => release_after(pending, ctx).await,
            Err(error) => Err(Self::fail_closing(ctx, error).await),
        }
    }
}
