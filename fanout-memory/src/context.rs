use crate::{MemoryStore, eval};
use async_stream::try_stream;
use fanout::{
    Context, Provider, QueryExpr, Result, RowIter, RowStream, ScalarOp, SetBinding, SetCatalog,
    Value, ValueFuture,
};
use std::sync::Arc;

/// One short-lived context over the shared store, created per query
/// execution and counted on creation and close so the release-exactly-once
/// invariant is observable from tests.
pub struct MemoryContext {
    provider: MemoryProvider,
}

impl MemoryContext {
    pub(crate) fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            provider: MemoryProvider {
                store,
                tracking: true,
            },
        }
    }

    /// Whether results would be tracked for write-back. The query layer
    /// turns this off before executing.
    pub fn tracking(&self) -> bool {
        self.provider.tracking
    }
}

impl Drop for MemoryContext {
    fn drop(&mut self) {
        self.provider.store.note_closed();
    }
}

impl Context for MemoryContext {
    type Provider = MemoryProvider;

    fn disable_tracking(&mut self) {
        self.provider.tracking = false;
    }

    fn catalog(&self) -> &dyn SetCatalog {
        &self.provider
    }

    fn provider(&mut self) -> &mut MemoryProvider {
        &mut self.provider
    }
}

/// Executes query expressions over the store's tables. Execution snapshots
/// the table under a read lock, so concurrent queries never block each other
/// beyond that lock and results stay stable while being consumed.
pub struct MemoryProvider {
    store: Arc<MemoryStore>,
    tracking: bool,
}

impl SetCatalog for MemoryProvider {
    fn resolve(&self, entity: &str) -> Result<Option<SetBinding>> {
        let inner = self
            .store
            .inner
            .read()
            .expect("The store lock is poisoned");
        Ok(inner.tables.get(entity).map(|table| {
            SetBinding::new(entity.to_owned(), table.labels.as_ref().to_vec())
        }))
    }
}

impl Provider for MemoryProvider {
    fn supports_async(&self) -> bool {
        true
    }

    fn fetch_iter(&mut self, query: &QueryExpr) -> Result<RowIter> {
        let rows = eval::execute(&self.store, query)?;
        Ok(Box::new(rows.into_iter().map(Ok)))
    }

    fn fetch_stream(&mut self, query: &QueryExpr) -> Result<RowStream> {
        let store = self.store.clone();
        let query = query.clone();
        Ok(Box::pin(try_stream! {
            let rows = eval::execute(&store, &query)?;
            for row in rows {
                yield row;
            }
        }))
    }

    fn scalar(&mut self, query: &QueryExpr, op: ScalarOp) -> Result<Value> {
        let rows = eval::execute(&self.store, query)?;
        Ok(match op {
            ScalarOp::Count => Value::Int64(Some(rows.len() as i64)),
            ScalarOp::Exists => Value::Boolean(Some(!rows.is_empty())),
        })
    }

    fn scalar_async(&mut self, query: &QueryExpr, op: ScalarOp) -> Result<ValueFuture> {
        let store = self.store.clone();
        let query = query.clone();
        Ok(Box::pin(async move {
            let rows = eval::execute(&store, &query)?;
            Ok(match op {
                ScalarOp::Count => Value::Int64(Some(rows.len() as i64)),
                ScalarOp::Exists => Value::Boolean(Some(!rows.is_empty())),
            })
        }))
    }
}
