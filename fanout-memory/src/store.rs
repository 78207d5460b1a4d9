use crate::MemoryContext;
use fanout::{ContextFactory, Error, Result, Row, RowNames};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, RwLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

pub(crate) struct Table {
    pub labels: RowNames,
    pub rows: Vec<Row>,
}

#[derive(Default)]
pub(crate) struct Tables {
    pub tables: HashMap<String, Table>,
    /// Tables whose scan fails, to exercise execution error paths.
    pub poisoned: HashSet<String>,
}

/// Shared backing storage for every context created by a [`MemoryFactory`].
///
/// Also instruments the context lifecycle (created / closed counters) so the
/// release-exactly-once invariant can be asserted from the outside, and
/// offers fault injection for creation and scan failures.
#[derive(Default)]
pub struct MemoryStore {
    pub(crate) inner: RwLock<Tables>,
    created: AtomicUsize,
    closed: AtomicUsize,
    fail_creation: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn create_table<I, S>(&self, name: impl Into<String>, labels: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: RowNames = labels.into_iter().map(Into::into).collect::<Vec<_>>().into();
        self.inner
            .write()
            .expect("The store lock is poisoned")
            .tables
            .insert(name.into(), Table {
                labels,
                rows: Vec::new(),
            });
    }

    pub fn insert<I>(&self, table: &str, rows: I) -> Result<()>
    where
        I: IntoIterator<Item = Row>,
    {
        let mut inner = self.inner.write().expect("The store lock is poisoned");
        let Some(table) = inner.tables.get_mut(table) else {
            return Err(Error::msg(format!("The store has no table named `{}`", table)));
        };
        let width = table.labels.len();
        for row in rows {
            if row.len() != width {
                return Err(Error::msg(format!(
                    "Expected a row of {} values, got {}",
                    width,
                    row.len()
                )));
            }
            table.rows.push(row);
        }
        Ok(())
    }

    /// Make every scan of `table` fail, simulating a storage error in the
    /// middle of an execution.
    pub fn poison(&self, table: impl Into<String>) {
        self.inner
            .write()
            .expect("The store lock is poisoned")
            .poisoned
            .insert(table.into());
    }

    /// Make every subsequent context creation fail until reset.
    pub fn fail_creation(&self, fail: bool) {
        self.fail_creation.store(fail, Ordering::SeqCst);
    }

    pub fn contexts_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn contexts_closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn note_closed(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn note_created(&self) {
        self.created.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn creation_fails(&self) -> bool {
        self.fail_creation.load(Ordering::SeqCst)
    }
}

/// Creates one independently owned [`MemoryContext`] per call.
pub struct MemoryFactory {
    store: Arc<MemoryStore>,
}

impl MemoryFactory {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }
}

impl ContextFactory for MemoryFactory {
    type Context = MemoryContext;

    fn create(&self) -> Result<MemoryContext> {
        if self.store.creation_fails() {
            return Err(Error::msg("The context factory was configured to fail"));
        }
        self.store.note_created();
        Ok(MemoryContext::new(self.store.clone()))
    }
}
