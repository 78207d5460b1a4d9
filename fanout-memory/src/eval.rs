use crate::MemoryStore;
use fanout::{
    BinaryOpType, Error, Expr, JoinType, OrderKey, QueryExpr, Result, RowLabeled, RowNames,
    SortOrder, SourceExpr, UnaryOpType, Value,
};
use std::cmp::Ordering;

/// Executes a fully rebound query expression against the store, eagerly.
///
/// The provider hands the result out either as-is (synchronous paths) or
/// replayed through a stream (asynchronous paths); laziness beyond the
/// snapshot is pointless for an in-memory table.
pub(crate) fn execute(store: &MemoryStore, query: &QueryExpr) -> Result<Vec<RowLabeled>> {
    Ok(match query {
        QueryExpr::Source(source) => scan(store, source)?,
        QueryExpr::Literal(rows) => rows.clone(),
        QueryExpr::Filter { source, predicate } => {
            let mut out = Vec::new();
            for row in execute(store, source)? {
                if truthy(&eval(predicate, &row)?) {
                    out.push(row);
                }
            }
            out
        }
        QueryExpr::Project { source, columns } => {
            let labels: RowNames = columns
                .iter()
                .map(|(name, _)| name.clone())
                .collect::<Vec<_>>()
                .into();
            let mut out = Vec::new();
            for row in execute(store, source)? {
                let values = columns
                    .iter()
                    .map(|(_, expr)| eval(expr, &row))
                    .collect::<Result<_>>()?;
                out.push(RowLabeled::new(labels.clone(), values));
            }
            out
        }
        QueryExpr::Join {
            source,
            right,
            join,
            on,
        } => {
            let left = execute(store, source)?;
            let right_rows = scan(store, right)?;
            let SourceExpr::Bound(binding) = right else {
                unreachable!("scan already rejected the unbound source");
            };
            let qualifier = if binding.alias.is_empty() {
                binding.entity.as_ref()
            } else {
                binding.alias.as_ref()
            };
            let Some(first) = left.first() else {
                return Ok(Vec::new());
            };
            let merged_labels: RowNames = first
                .labels
                .iter()
                .cloned()
                .chain(
                    binding
                        .columns
                        .iter()
                        .map(|column| format!("{}.{}", qualifier, column)),
                )
                .collect::<Vec<_>>()
                .into();
            let mut out = Vec::new();
            for l in &left {
                let mut matched = false;
                for r in &right_rows {
                    let combined = RowLabeled::new(
                        merged_labels.clone(),
                        l.values.iter().chain(r.values.iter()).cloned().collect(),
                    );
                    if truthy(&eval(on, &combined)?) {
                        matched = true;
                        out.push(combined);
                    }
                }
                if !matched && *join == JoinType::Left {
                    out.push(RowLabeled::new(
                        merged_labels.clone(),
                        l.values
                            .iter()
                            .cloned()
                            .chain(binding.columns.iter().map(|_| Value::Null))
                            .collect(),
                    ));
                }
            }
            out
        }
        QueryExpr::OrderBy { source, keys } => {
            let rows = execute(store, source)?;
            let mut keyed = rows
                .into_iter()
                .map(|row| {
                    let values = keys
                        .iter()
                        .map(|key| eval(&key.expr, &row))
                        .collect::<Result<Vec<_>>>()?;
                    Ok((values, row))
                })
                .collect::<Result<Vec<_>>>()?;
            keyed.sort_by(|(l, _), (r, _)| compare_keys(keys, l, r));
            keyed.into_iter().map(|(_, row)| row).collect()
        }
        QueryExpr::Skip { source, count } => execute(store, source)?
            .into_iter()
            .skip(*count as usize)
            .collect(),
        QueryExpr::Take { source, count } => execute(store, source)?
            .into_iter()
            .take(*count as usize)
            .collect(),
    })
}

fn scan(store: &MemoryStore, source: &SourceExpr) -> Result<Vec<RowLabeled>> {
    let SourceExpr::Bound(binding) = source else {
        return Err(Error::msg(
            "Cannot execute a query over an unbound entity-set source",
        ));
    };
    let inner = store.inner.read().expect("The store lock is poisoned");
    if inner.poisoned.contains(binding.entity.as_ref()) {
        return Err(Error::msg(format!(
            "Simulated storage failure while scanning `{}`",
            binding.entity
        )));
    }
    let Some(table) = inner.tables.get(binding.entity.as_ref()) else {
        return Err(Error::msg(format!(
            "The store has no table named `{}`",
            binding.entity
        )));
    };
    Ok(table
        .rows
        .iter()
        .map(|row| RowLabeled::new(table.labels.clone(), row.clone()))
        .collect())
}

fn compare_keys(keys: &[OrderKey], l: &[Value], r: &[Value]) -> Ordering {
    for ((key, l), r) in keys.iter().zip(l).zip(r) {
        let ordering = match (l.is_null(), r.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => l.try_compare(r).unwrap_or(Ordering::Equal),
        };
        let ordering = match key.order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn truthy(value: &Value) -> bool {
    matches!(value, Value::Boolean(Some(true)))
}

/// Resolve a column reference, accepting a qualified reference against an
/// unqualified label and vice versa, which is how joined rows are addressed.
fn lookup<'a>(row: &'a RowLabeled, name: &str) -> Result<&'a Value> {
    if let Some(value) = row.get_column(name) {
        return Ok(value);
    }
    if let Some((_, stripped)) = name.rsplit_once('.')
        && let Some(value) = row.get_column(stripped)
    {
        return Ok(value);
    }
    for (i, label) in row.labels.iter().enumerate() {
        if label
            .rsplit_once('.')
            .map(|(_, suffix)| suffix == name)
            .unwrap_or(false)
        {
            return Ok(&row.values[i]);
        }
    }
    Err(Error::msg(format!("The row has no column named `{}`", name)))
}

pub(crate) fn eval(expr: &Expr, row: &RowLabeled) -> Result<Value> {
    Ok(match expr {
        Expr::Value(value) => value.clone(),
        Expr::Column(name) => lookup(row, name)?.clone(),
        Expr::Unary { op, expr } => {
            let value = eval(expr, row)?;
            match op {
                UnaryOpType::Not => match value {
                    Value::Boolean(v) => Value::Boolean(v.map(|v| !v)),
                    v => return Err(Error::msg(format!("Cannot apply NOT to {:?}", v))),
                },
                UnaryOpType::Negative => match value {
                    Value::Int32(v) => Value::Int32(v.map(|v| -v)),
                    Value::Int64(v) => Value::Int64(v.map(|v| -v)),
                    Value::Float64(v) => Value::Float64(v.map(|v| -v)),
                    v => return Err(Error::msg(format!("Cannot negate {:?}", v))),
                },
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            let l = eval(lhs, row)?;
            let r = eval(rhs, row)?;
            binary(*op, l, r)?
        }
    })
}

fn binary(op: BinaryOpType, l: Value, r: Value) -> Result<Value> {
    use BinaryOpType::*;
    Ok(match op {
        Equal | NotEqual | Less | Greater | LessEqual | GreaterEqual => {
            // SQL-like null semantics: comparing against null is unknown.
            if l.is_null() || r.is_null() {
                return Ok(Value::Boolean(None));
            }
            let Some(ordering) = l.try_compare(&r) else {
                return Err(Error::msg(format!("Cannot compare {:?} with {:?}", l, r)));
            };
            Value::Boolean(Some(match op {
                Equal => ordering == Ordering::Equal,
                NotEqual => ordering != Ordering::Equal,
                Less => ordering == Ordering::Less,
                Greater => ordering == Ordering::Greater,
                LessEqual => ordering != Ordering::Greater,
                GreaterEqual => ordering != Ordering::Less,
                _ => unreachable!(),
            }))
        }
        And => match (bool3(&l)?, bool3(&r)?) {
            (Some(false), _) | (_, Some(false)) => Value::Boolean(Some(false)),
            (Some(true), Some(true)) => Value::Boolean(Some(true)),
            _ => Value::Boolean(None),
        },
        Or => match (bool3(&l)?, bool3(&r)?) {
            (Some(true), _) | (_, Some(true)) => Value::Boolean(Some(true)),
            (Some(false), Some(false)) => Value::Boolean(Some(false)),
            _ => Value::Boolean(None),
        },
        Addition | Subtraction | Multiplication | Division | Remainder => arithmetic(op, l, r)?,
    })
}

fn bool3(value: &Value) -> Result<Option<bool>> {
    match value {
        Value::Boolean(v) => Ok(*v),
        v => Err(Error::msg(format!("Expected a boolean, got {:?}", v))),
    }
}

fn arithmetic(op: BinaryOpType, l: Value, r: Value) -> Result<Value> {
    use BinaryOpType::*;
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    let integral = matches!(l, Value::Int32(..) | Value::Int64(..))
        && matches!(r, Value::Int32(..) | Value::Int64(..));
    if integral {
        let l = l.as_i64()?;
        let r = r.as_i64()?;
        if r == 0 && matches!(op, Division | Remainder) {
            return Err(Error::msg("Division by zero"));
        }
        return Ok(Value::Int64(Some(match op {
            Addition => l + r,
            Subtraction => l - r,
            Multiplication => l * r,
            Division => l / r,
            Remainder => l % r,
            _ => unreachable!(),
        })));
    }
    let l = l.as_f64()?;
    let r = r.as_f64()?;
    Ok(Value::Float64(Some(match op {
        Addition => l + r,
        Subtraction => l - r,
        Multiplication => l * r,
        Division => l / r,
        Remainder => l % r,
        _ => unreachable!(),
    })))
}
