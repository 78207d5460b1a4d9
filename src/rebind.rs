use crate::{QueryError, QueryExpr, Result, SetBinding, SetCatalog, SourceExpr};

/// Rewrites a query so that its entity-set sources point at a live context.
///
/// Walks the tree depth first and replaces every [`SourceExpr`] leaf with a
/// [`SourceExpr::Bound`] node resolved from the given catalog, keeping the
/// alias and element recorded on the node it replaces. Sources that are
/// already bound are rebound as well, so a cloned query can never execute
/// against a previously released context. The input tree is untouched.
///
/// Fails with [`QueryError::InvalidQueryOrigin`] when the query contains no
/// source at all (it was not built through the sanctioned entry point), and
/// with [`QueryError::UnknownEntitySet`] when the context has no set under a
/// source's name.
pub fn rebind_sources(
    query: &QueryExpr,
    catalog: &dyn SetCatalog,
    async_capable: bool,
) -> Result<QueryExpr> {
    let mut rebinder = Rebinder {
        catalog,
        async_capable,
        replaced: 0,
    };
    let replaced = rebinder.visit(query)?;
    if rebinder.replaced == 0 {
        return Err(QueryError::InvalidQueryOrigin.into());
    }
    Ok(replaced)
}

struct Rebinder<'a> {
    catalog: &'a dyn SetCatalog,
    async_capable: bool,
    replaced: usize,
}

impl Rebinder<'_> {
    fn visit(&mut self, query: &QueryExpr) -> Result<QueryExpr> {
        Ok(match query {
            QueryExpr::Source(source) => QueryExpr::Source(self.rebind(source)?),
            QueryExpr::Literal(rows) => QueryExpr::Literal(rows.clone()),
            QueryExpr::Filter { source, predicate } => QueryExpr::Filter {
                source: Box::new(self.visit(source)?),
                predicate: predicate.clone(),
            },
            QueryExpr::Project { source, columns } => QueryExpr::Project {
                source: Box::new(self.visit(source)?),
                columns: columns.clone(),
            },
            QueryExpr::Join {
                source,
                right,
                join,
                on,
            } => QueryExpr::Join {
                source: Box::new(self.visit(source)?),
                right: self.rebind(right)?,
                join: *join,
                on: on.clone(),
            },
            QueryExpr::OrderBy { source, keys } => QueryExpr::OrderBy {
                source: Box::new(self.visit(source)?),
                keys: keys.clone(),
            },
            QueryExpr::Skip { source, count } => QueryExpr::Skip {
                source: Box::new(self.visit(source)?),
                count: *count,
            },
            QueryExpr::Take { source, count } => QueryExpr::Take {
                source: Box::new(self.visit(source)?),
                count: *count,
            },
        })
    }

    fn rebind(&mut self, source: &SourceExpr) -> Result<SourceExpr> {
        let (entity, element, alias) = match source {
            SourceExpr::Marker(origin) => {
                (origin.entity.clone(), origin.element, origin.alias.clone())
            }
            SourceExpr::Bound(binding) => {
                (binding.entity.clone(), binding.element, binding.alias.clone())
            }
        };
        let Some(binding) = self.catalog.resolve(&entity)? else {
            return Err(QueryError::UnknownEntitySet(entity.into_owned()).into());
        };
        if binding.entity != entity {
            return Err(
                QueryError::Internal("the catalog resolved a binding for a different entity set")
                    .into(),
            );
        }
        self.replaced += 1;
        Ok(SourceExpr::Bound(SetBinding {
            async_capable: self.async_capable,
            alias,
            element,
            ..binding
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Entity, Expr, JoinType, QueryError, RowLabeled, SetBinding};
    use std::collections::HashMap;

    struct Orders;

    impl Entity for Orders {
        fn entity_name() -> &'static str {
            "orders"
        }
        fn from_row(_row: &RowLabeled) -> crate::Result<Self> {
            Ok(Orders)
        }
    }

    struct Details;

    impl Entity for Details {
        fn entity_name() -> &'static str {
            "details"
        }
        fn from_row(_row: &RowLabeled) -> crate::Result<Self> {
            Ok(Details)
        }
    }

    struct TestCatalog(HashMap<&'static str, Vec<String>>);

    impl TestCatalog {
        fn with_orders_and_details() -> Self {
            let mut sets = HashMap::new();
            sets.insert("orders", vec!["id".to_owned(), "order_number".to_owned()]);
            sets.insert("details", vec!["id".to_owned(), "order_id".to_owned()]);
            Self(sets)
        }
    }

    impl SetCatalog for TestCatalog {
        fn resolve(&self, entity: &str) -> crate::Result<Option<SetBinding>> {
            Ok(self.0.get(entity).map(|columns| {
                SetBinding::new(entity.to_owned(), columns.clone())
            }))
        }
    }

    #[test]
    fn marker_is_replaced_with_a_live_binding() {
        let query = QueryExpr::entity_source::<Orders>().filter(Expr::col("id").gt(3));
        let catalog = TestCatalog::with_orders_and_details();
        let replaced = rebind_sources(&query, &catalog, true).unwrap();
        let QueryExpr::Filter { source, .. } = replaced else {
            panic!("Expected the filter to survive substitution");
        };
        let QueryExpr::Source(SourceExpr::Bound(binding)) = *source else {
            panic!("Expected the marker to be rebound");
        };
        assert_eq!(binding.entity, "orders");
        assert_eq!(binding.columns.as_ref(), ["id", "order_number"]);
        assert!(binding.async_capable);
        // Untouched input tree.
        let QueryExpr::Filter { source, .. } = query else {
            unreachable!();
        };
        assert!(matches!(*source, QueryExpr::Source(SourceExpr::Marker(..))));
    }

    #[test]
    fn marker_alias_and_element_are_carried_over() {
        let query = QueryExpr::Source(SourceExpr::Marker(Orders::origin().aliased("o")));
        let catalog = TestCatalog::with_orders_and_details();
        let replaced = rebind_sources(&query, &catalog, false).unwrap();
        let QueryExpr::Source(SourceExpr::Bound(binding)) = replaced else {
            panic!("Expected the marker to be rebound");
        };
        assert_eq!(binding.alias, "o");
        assert_eq!(binding.element, std::any::type_name::<Orders>());
        assert!(!binding.async_capable);
    }

    #[test]
    fn join_sides_are_both_rebound() {
        let query = QueryExpr::entity_source::<Orders>().join(
            SourceExpr::Marker(Details::origin()),
            JoinType::Inner,
            Expr::col("orders.id").eq(Expr::col("details.order_id")),
        );
        let catalog = TestCatalog::with_orders_and_details();
        let replaced = rebind_sources(&query, &catalog, true).unwrap();
        let QueryExpr::Join { source, right, .. } = replaced else {
            panic!("Expected the join to survive substitution");
        };
        assert!(matches!(*source, QueryExpr::Source(SourceExpr::Bound(..))));
        assert!(right.is_bound());
    }

    #[test]
    fn a_query_without_any_source_is_rejected() {
        let query = QueryExpr::Literal(vec![]).filter(Expr::col("id").gt(0));
        let catalog = TestCatalog::with_orders_and_details();
        let error = rebind_sources(&query, &catalog, false).unwrap_err();
        assert_eq!(
            error.downcast_ref::<QueryError>(),
            Some(&QueryError::InvalidQueryOrigin)
        );
    }

    #[test]
    fn an_unknown_set_name_is_rejected() {
        struct Missing;
        impl Entity for Missing {
            fn entity_name() -> &'static str {
                "missing"
            }
            fn from_row(_row: &RowLabeled) -> crate::Result<Self> {
                Ok(Missing)
            }
        }
        let query = QueryExpr::entity_source::<Missing>();
        let catalog = TestCatalog::with_orders_and_details();
        let error = rebind_sources(&query, &catalog, false).unwrap_err();
        assert_eq!(
            error.downcast_ref::<QueryError>(),
            Some(&QueryError::UnknownEntitySet("missing".to_owned()))
        );
    }
}
