//! Aggregate functions.
//!
//! Each walks the group in `ctx.rows`, evaluating its argument per row
//! and ignoring Null results. Int promotes to Float on mixed numeric
//! groups.

use crate::ast::{EvalCtx, Expr};
use crate::error::Result;
use crate::functions::{Function, FunctionRegistry, Idempotency};
use crate::value::{compare_values, Value};

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.add(Function::native("AVG", 1, 1, Idempotency::Idempotent, avg));
    registry.add(Function::native("COUNT", 1, 1, Idempotency::Idempotent, count));
    registry.add(Function::native("MAX", 1, 1, Idempotency::Idempotent, max));
    registry.add(Function::native("MIN", 1, 1, Idempotency::Idempotent, min));
    registry.add(Function::native("SUM", 1, 1, Idempotency::Idempotent, sum));
}

/// Evaluates the argument over every row of the group, dropping Nulls.
fn fold(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Vec<Value>> {
    let mut values = Vec::new();
    for row in ctx.rows {
        let value = args[0].eval(&ctx.with_row(row))?;
        if !value.is_null() {
            values.push(value);
        }
    }
    Ok(values)
}

/// The numeric shape of a group.
enum Numeric {
    Ints(Vec<i64>),
    Floats(Vec<f64>),
    NonNumeric,
}

fn numeric(values: &[Value]) -> Numeric {
    let mut all_int = true;
    for value in values {
        match value {
            Value::Int(_) => {}
            Value::Float(_) => all_int = false,
            _ => return Numeric::NonNumeric,
        }
    }
    if all_int {
        Numeric::Ints(
            values
                .iter()
                .map(|v| match v {
                    Value::Int(n) => *n,
                    _ => 0,
                })
                .collect(),
        )
    } else {
        Numeric::Floats(
            values
                .iter()
                .map(|v| v.float().unwrap_or(Some(0.0)).unwrap_or(0.0))
                .collect(),
        )
    }
}

fn count(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    Ok(Value::Int(fold(args, ctx)?.len() as i64))
}

fn sum(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    let values = fold(args, ctx)?;
    if values.is_empty() {
        return Ok(Value::Null);
    }
    Ok(match numeric(&values) {
        Numeric::Ints(ints) => Value::Int(ints.iter().sum()),
        Numeric::Floats(floats) => Value::Float(floats.iter().sum()),
        Numeric::NonNumeric => Value::Null,
    })
}

fn avg(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    let values = fold(args, ctx)?;
    if values.is_empty() {
        return Ok(Value::Null);
    }
    Ok(match numeric(&values) {
        Numeric::Ints(ints) => Value::Int(ints.iter().sum::<i64>() / ints.len() as i64),
        Numeric::Floats(floats) => Value::Float(floats.iter().sum::<f64>() / floats.len() as f64),
        Numeric::NonNumeric => Value::Null,
    })
}

fn max(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    extremum(args, ctx, true)
}

fn min(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    extremum(args, ctx, false)
}

fn extremum(args: &[Expr], ctx: &EvalCtx<'_>, want_max: bool) -> Result<Value> {
    let values = fold(args, ctx)?;
    if values.is_empty() {
        return Ok(Value::Null);
    }
    match numeric(&values) {
        Numeric::Ints(ints) => {
            let folded = if want_max {
                ints.into_iter().max()
            } else {
                ints.into_iter().min()
            };
            Ok(folded.map_or(Value::Null, Value::Int))
        }
        Numeric::Floats(floats) => {
            let mut best = floats[0];
            for v in &floats[1..] {
                if (want_max && *v > best) || (!want_max && *v < best) {
                    best = *v;
                }
            }
            Ok(Value::Float(best))
        }
        Numeric::NonNumeric => {
            // Homogeneous non-numeric groups (strings, dates) still fold;
            // incompatible mixes yield Null.
            let mut best = values[0].clone();
            for value in &values[1..] {
                let Ok(ord) = compare_values(value, &best) else {
                    return Ok(Value::Null);
                };
                if (want_max && ord.is_gt()) || (!want_max && ord.is_lt()) {
                    best = value.clone();
                }
            }
            Ok(best)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::JoinRow;
    use crate::scope::Scope;
    use crate::source::{Column, Row};
    use crate::value::Type;
    use std::rc::Rc;

    /// Builds a one-source context whose rows carry the given cells, and
    /// an expression reading that column. The expression is pre-bound by
    /// constructing a constant-free reference through a tiny query-less
    /// path: we evaluate SUM & co. directly over Constant expressions is
    /// impossible (they need row state), so cells are exposed through raw
    /// text columns read as the given type.
    fn run(
        name: &str,
        cells: &[&str],
        ty: Type,
    ) -> Value {
        let rows: Rc<Vec<Row>> = Rc::new(
            cells
                .iter()
                .map(|c| vec![Column::Text((*c).to_string())])
                .collect(),
        );
        let data = vec![rows.clone()];
        let join_rows: Vec<JoinRow> = (0..rows.len())
            .map(|i| JoinRow {
                idx: vec![i],
                seq: i,
                keys: Vec::new(),
            })
            .collect();
        let scope = Scope::new();
        let ctx = EvalCtx {
            row: join_rows.first(),
            rows: &join_rows,
            data: &data,
            scope: &scope,
        };

        let column = crate::ast::ColumnIndex {
            source: 0,
            column: 0,
            ty,
        };
        let args = vec![bound_reference(column)];
        let registry = FunctionRegistry::new();
        let func = registry.get(name).unwrap();
        match &func.kind {
            crate::functions::FunctionKind::Native(f) => f(&args, &ctx).unwrap(),
            crate::functions::FunctionKind::User(_) => unreachable!(),
        }
    }

    /// A reference expression bound straight to a column index.
    fn bound_reference(column: crate::ast::ColumnIndex) -> Expr {
        use std::collections::HashMap;

        use crate::ast::{BindEnv, ColumnBinding, RefExpr};
        use crate::source::Reference;

        let expr = Expr::Reference(RefExpr::new(Reference::new("X")));
        let mut columns = HashMap::new();
        columns.insert("X".to_string(), ColumnBinding::Unique(column));
        let scope = Scope::new();
        let registry = FunctionRegistry::new();
        let env = BindEnv {
            columns: &columns,
            scope: &scope,
            functions: &registry,
        };
        expr.bind(&env).unwrap();
        expr
    }

    #[test]
    fn test_count_ignores_null() {
        assert_eq!(run("COUNT", &["1", "", "3"], Type::Int), Value::Int(2));
    }

    #[test]
    fn test_sum_int() {
        assert_eq!(run("SUM", &["1", "2", "", "3"], Type::Int), Value::Int(6));
    }

    #[test]
    fn test_sum_float() {
        assert_eq!(
            run("SUM", &["1.5", "2.5"], Type::Float),
            Value::Float(4.0)
        );
    }

    #[test]
    fn test_sum_empty_is_null() {
        assert_eq!(run("SUM", &["", ""], Type::Int), Value::Null);
    }

    #[test]
    fn test_avg_int_truncates() {
        assert_eq!(
            run("AVG", &["200", "100", "50"], Type::Int),
            Value::Int(116)
        );
        assert_eq!(run("AVG", &["10", "7"], Type::Int), Value::Int(8));
    }

    #[test]
    fn test_avg_float() {
        assert_eq!(run("AVG", &["1.0", "2.0"], Type::Float), Value::Float(1.5));
    }

    #[test]
    fn test_avg_non_numeric_is_null() {
        assert_eq!(run("AVG", &["a", "b"], Type::String), Value::Null);
    }

    #[test]
    fn test_min_max() {
        assert_eq!(run("MAX", &["3", "", "9", "1"], Type::Int), Value::Int(9));
        assert_eq!(run("MIN", &["3", "9", "1"], Type::Int), Value::Int(1));
        assert_eq!(
            run("MAX", &["b", "c", "a"], Type::String),
            Value::String("c".into())
        );
    }

    #[test]
    fn test_max_mixed_numeric_returns_float() {
        assert_eq!(run("MAX", &["3", "2.5"], Type::Float), Value::Float(3.0));
    }
}
