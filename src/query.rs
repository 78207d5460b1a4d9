use crate::{Entity, Expr, RowLabeled};
use std::{any::type_name, borrow::Cow, sync::Arc};

/// Marker describing the logical starting set of a query before any real
/// context exists. It carries only what is needed to rebind the query later:
/// the set name, the Rust element type and an optional alias. Substitution
/// replaces it wholesale with a [`SetBinding`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityOrigin {
    /// Name of the entity set on the context.
    pub entity: Cow<'static, str>,
    /// Rust type name of the element, for diagnostics only.
    pub element: &'static str,
    /// Alias to qualify columns with, empty when unused.
    pub alias: Cow<'static, str>,
}

impl EntityOrigin {
    pub fn of<E: Entity>() -> Self {
        Self {
            entity: E::entity_name().into(),
            element: type_name::<E>(),
            alias: "".into(),
        }
    }

    pub fn aliased(mut self, alias: impl Into<Cow<'static, str>>) -> Self {
        self.alias = alias.into();
        self
    }
}

/// Concrete entity-set metadata obtained from a live context, replacing an
/// [`EntityOrigin`] during substitution. `alias` and `element` are copied
/// over from the marker it replaces; the rest comes from the live catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct SetBinding {
    /// Name of the set on the live context.
    pub entity: Cow<'static, str>,
    /// Column labels the set produces.
    pub columns: Arc<[String]>,
    /// Whether this binding was constructed for an async-capable provider.
    pub async_capable: bool,
    pub alias: Cow<'static, str>,
    pub element: &'static str,
}

impl SetBinding {
    pub fn new(
        entity: impl Into<Cow<'static, str>>,
        columns: impl Into<Arc<[String]>>,
    ) -> Self {
        Self {
            entity: entity.into(),
            columns: columns.into(),
            async_capable: false,
            alias: "".into(),
            element: "",
        }
    }
}

/// A query's data source: either the unbound placeholder produced by the
/// entry point, or the live binding substitution put in its place.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceExpr {
    Marker(EntityOrigin),
    Bound(SetBinding),
}

impl SourceExpr {
    pub fn entity(&self) -> &str {
        match self {
            SourceExpr::Marker(origin) => &origin.entity,
            SourceExpr::Bound(binding) => &binding.entity,
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, SourceExpr::Bound(..))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderKey {
    pub expr: Expr,
    pub order: SortOrder,
}

/// Scalar terminal shapes. The shape of a result is an explicit parameter of
/// the execution path, never inferred from the result value afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarOp {
    Count,
    Exists,
}

/// A deferred query over one or more entity sets. Immutable: every operator
/// consumes its input and produces a new tree, so a query can be cloned once
/// and executed many times, each time against a freshly created context.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryExpr {
    Source(SourceExpr),
    /// Inline literal rows. Not a sanctioned query origin: the query context
    /// only accepts trees rooted at an entity set.
    Literal(Vec<RowLabeled>),
    Filter {
        source: Box<QueryExpr>,
        predicate: Expr,
    },
    Project {
        source: Box<QueryExpr>,
        columns: Vec<(String, Expr)>,
    },
    Join {
        source: Box<QueryExpr>,
        right: SourceExpr,
        join: JoinType,
        on: Expr,
    },
    OrderBy {
        source: Box<QueryExpr>,
        keys: Vec<OrderKey>,
    },
    Skip {
        source: Box<QueryExpr>,
        count: u64,
    },
    Take {
        source: Box<QueryExpr>,
        count: u64,
    },
}

impl QueryExpr {
    pub fn entity_source<E: Entity>() -> Self {
        QueryExpr::Source(SourceExpr::Marker(E::origin()))
    }

    pub fn filter(self, predicate: Expr) -> Self {
        QueryExpr::Filter {
            source: Box::new(self),
            predicate,
        }
    }

    pub fn project(self, columns: Vec<(String, Expr)>) -> Self {
        QueryExpr::Project {
            source: Box::new(self),
            columns,
        }
    }

    pub fn join(self, right: SourceExpr, join: JoinType, on: Expr) -> Self {
        QueryExpr::Join {
            source: Box::new(self),
            right,
            join,
            on,
        }
    }

    pub fn order_by(self, keys: Vec<OrderKey>) -> Self {
        QueryExpr::OrderBy {
            source: Box::new(self),
            keys,
        }
    }

    pub fn skip(self, count: u64) -> Self {
        QueryExpr::Skip {
            source: Box::new(self),
            count,
        }
    }

    pub fn take(self, count: u64) -> Self {
        QueryExpr::Take {
            source: Box::new(self),
            count,
        }
    }
}
