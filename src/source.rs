use crate::{
    AutoReleaseIter, AutoReleaseStream, BufferedStream, ContextFactory, Entity, Expr,
    FactoryQueryContext, JoinType, OrderKey, QueryExpr, Result, RowIter, RowLabeled, RowStream,
    ScalarOp, SortOrder, SourceExpr, stream::Stream,
};
use futures::{StreamExt, TryStreamExt};
use std::{marker::PhantomData, sync::Arc};

/// The sanctioned starting point for a query: a deferred, reusable query
/// over the entity set of `E`. Nothing executes here; every terminal call
/// later runs the accumulated expression on its own freshly created context.
pub fn query_source<E: Entity, F: ContextFactory>(factory: F) -> QuerySet<E, F> {
    QuerySet {
        context: Arc::new(FactoryQueryContext::new(factory)),
        query: QueryExpr::entity_source::<E>(),
        marker: PhantomData,
    }
}

/// A typed, deferred query. Operators are builders returning a new query;
/// terminals execute against a fresh context and decode rows into `E`.
pub struct QuerySet<E, F: ContextFactory> {
    context: Arc<FactoryQueryContext<F>>,
    query: QueryExpr,
    marker: PhantomData<fn() -> E>,
}

impl<E, F: ContextFactory> Clone for QuerySet<E, F> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            query: self.query.clone(),
            marker: PhantomData,
        }
    }
}

impl<E: Entity, F: ContextFactory> QuerySet<E, F> {
    fn with_query(&self, query: QueryExpr) -> Self {
        Self {
            context: self.context.clone(),
            query,
            marker: PhantomData,
        }
    }

    /// The accumulated expression, still rooted at a marker node.
    pub fn query(&self) -> &QueryExpr {
        &self.query
    }

    pub fn filter(&self, predicate: Expr) -> Self {
        self.with_query(self.query.clone().filter(predicate))
    }

    pub fn order_by(&self, expr: Expr) -> Self {
        self.with_query(self.query.clone().order_by(vec![OrderKey {
            expr,
            order: SortOrder::Ascending,
        }]))
    }

    pub fn order_by_desc(&self, expr: Expr) -> Self {
        self.with_query(self.query.clone().order_by(vec![OrderKey {
            expr,
            order: SortOrder::Descending,
        }]))
    }

    pub fn skip(&self, count: u64) -> Self {
        self.with_query(self.query.clone().skip(count))
    }

    pub fn take(&self, count: u64) -> Self {
        self.with_query(self.query.clone().take(count))
    }

    /// Project to named columns; the result loses its element type and is
    /// consumed as raw rows.
    pub fn select<I, S>(&self, columns: I) -> RowQuery<F>
    where
        I: IntoIterator<Item = (S, Expr)>,
        S: Into<String>,
    {
        self.rows().select(columns)
    }

    /// Join against the entity set of `R`. Columns of the right side are
    /// addressed with their qualified name (`set.column`) in `on` and in any
    /// later expression.
    pub fn join<R: Entity>(&self, join: JoinType, on: Expr) -> RowQuery<F> {
        RowQuery {
            context: self.context.clone(),
            query: self
                .query
                .clone()
                .join(SourceExpr::Marker(R::origin()), join, on),
        }
    }

    /// The same query viewed at the row level, without entity decoding.
    pub fn rows(&self) -> RowQuery<F> {
        RowQuery {
            context: self.context.clone(),
            query: self.query.clone(),
        }
    }

    pub fn to_vec(&self) -> Result<Vec<E>> {
        self.rows().to_vec()?.iter().map(E::from_row).collect()
    }

    pub async fn to_vec_async(&self) -> Result<Vec<E>> {
        let mut rows = self.context.fetch_stream(&self.query).await?;
        let mut out = Vec::new();
        while let Some(row) = rows.try_next().await? {
            out.push(E::from_row(&row)?);
        }
        rows.close().await?;
        Ok(out)
    }

    pub fn first(&self) -> Result<Option<E>> {
        self.rows().first()?.as_ref().map(E::from_row).transpose()
    }

    pub async fn first_async(&self) -> Result<Option<E>> {
        self.rows()
            .first_async()
            .await?
            .as_ref()
            .map(E::from_row)
            .transpose()
    }

    pub fn any(&self) -> Result<bool> {
        self.rows().any()
    }

    pub async fn any_async(&self) -> Result<bool> {
        self.rows().any_async().await
    }

    pub fn count(&self) -> Result<i64> {
        self.rows().count()
    }

    pub async fn count_async(&self) -> Result<i64> {
        self.rows().count_async().await
    }

    /// Lazily pulled synchronous enumeration; the context is released when
    /// the returned iterator is dropped.
    pub fn iter(&self) -> Result<impl Iterator<Item = Result<E>>> {
        let rows = self.context.fetch_iter(&self.query)?;
        Ok(rows.map(|row| row.and_then(|row| E::from_row(&row))))
    }

    /// Lazily pulled asynchronous enumeration; the context is released when
    /// the returned stream is dropped.
    pub async fn stream(&self) -> Result<impl Stream<Item = Result<E>>> {
        let rows = self.context.fetch_stream(&self.query).await?;
        Ok(rows.map(|row| row.and_then(|row| E::from_row(&row))))
    }

    /// Asynchronous enumeration backed by the synchronous execution path,
    /// buffered in memory per [`BufferedStream`].
    pub async fn stream_buffered(&self) -> Result<impl Stream<Item = Result<E>>> {
        let rows = self.context.fetch_buffered(&self.query).await?;
        Ok(rows.map(|row| row.and_then(|row| E::from_row(&row))))
    }
}

/// An untyped, deferred query yielding raw labeled rows: what a typed query
/// becomes after a projection or a join.
pub struct RowQuery<F: ContextFactory> {
    context: Arc<FactoryQueryContext<F>>,
    query: QueryExpr,
}

impl<F: ContextFactory> Clone for RowQuery<F> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            query: self.query.clone(),
        }
    }
}

impl<F: ContextFactory> RowQuery<F> {
    fn with_query(&self, query: QueryExpr) -> Self {
        Self {
            context: self.context.clone(),
            query,
        }
    }

    pub fn query(&self) -> &QueryExpr {
        &self.query
    }

    pub fn filter(&self, predicate: Expr) -> Self {
        self.with_query(self.query.clone().filter(predicate))
    }

    pub fn order_by(&self, expr: Expr) -> Self {
        self.with_query(self.query.clone().order_by(vec![OrderKey {
            expr,
            order: SortOrder::Ascending,
        }]))
    }

    pub fn order_by_desc(&self, expr: Expr) -> Self {
        self.with_query(self.query.clone().order_by(vec![OrderKey {
            expr,
            order: SortOrder::Descending,
        }]))
    }

    pub fn skip(&self, count: u64) -> Self {
        self.with_query(self.query.clone().skip(count))
    }

    pub fn take(&self, count: u64) -> Self {
        self.with_query(self.query.clone().take(count))
    }

    pub fn select<I, S>(&self, columns: I) -> Self
    where
        I: IntoIterator<Item = (S, Expr)>,
        S: Into<String>,
    {
        self.with_query(
            self.query.clone().project(
                columns
                    .into_iter()
                    .map(|(name, expr)| (name.into(), expr))
                    .collect(),
            ),
        )
    }

    pub fn to_vec(&self) -> Result<Vec<RowLabeled>> {
        self.context.fetch_all(&self.query)
    }

    pub async fn to_vec_async(&self) -> Result<Vec<RowLabeled>> {
        let mut rows = self.context.fetch_stream(&self.query).await?;
        let mut out = Vec::new();
        while let Some(row) = rows.try_next().await? {
            out.push(row);
        }
        rows.close().await?;
        Ok(out)
    }

    pub fn first(&self) -> Result<Option<RowLabeled>> {
        let rows = self.context.fetch_all(&self.query.clone().take(1))?;
        Ok(rows.into_iter().next())
    }

    pub async fn first_async(&self) -> Result<Option<RowLabeled>> {
        self.context
            .fetch_first_async(&self.query.clone().take(1))
            .await
    }

    pub fn any(&self) -> Result<bool> {
        self.context.scalar(&self.query, ScalarOp::Exists)?.as_bool()
    }

    pub async fn any_async(&self) -> Result<bool> {
        self.context
            .scalar_async(&self.query, ScalarOp::Exists)
            .await?
            .as_bool()
    }

    pub fn count(&self) -> Result<i64> {
        self.context.scalar(&self.query, ScalarOp::Count)?.as_i64()
    }

    pub async fn count_async(&self) -> Result<i64> {
        self.context
            .scalar_async(&self.query, ScalarOp::Count)
            .await?
            .as_i64()
    }

    pub fn iter(&self) -> Result<AutoReleaseIter<RowIter, F::Context>> {
        self.context.fetch_iter(&self.query)
    }

    pub async fn stream(&self) -> Result<AutoReleaseStream<RowStream, F::Context>> {
        self.context.fetch_stream(&self.query).await
    }

    pub async fn stream_buffered(&self) -> Result<BufferedStream<RowLabeled, F::Context>> {
        self.context.fetch_buffered(&self.query).await
    }
}
