//! The query evaluator.
//!
//! A [`Query`] is itself a [`Source`], so `FROM (SELECT …) AS x` and
//! `INTO`-bound tables compose without special casing. Evaluation runs
//! once per query and caches the result: resolve the FROM sources, bind
//! every expression against the FROM columns and the enclosing scope,
//! materialize the nested-loop cross product, filter with WHERE, group in
//! a prefix tree, project with aggregate folding, sort, and slice.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{BindEnv, ColumnBinding, ColumnIndex, EvalCtx, Expr, JoinRow};
use crate::error::{Error, Result};
use crate::functions::FunctionRegistry;
use crate::scope::Scope;
use crate::source::csv::CsvSource;
use crate::source::html::HtmlSource;
use crate::source::json::JsonSource;
use crate::source::loader::{self, Format, SourceLoader};
use crate::source::{Column, ColumnSelector, Reference, Row, Source};
use crate::value::{format_real, sort_compare, Type, Value};

/// One SELECT list entry.
pub struct SelectItem {
    /// The projected expression.
    pub expr: Expr,
    /// `AS` alias, when given.
    pub alias: Option<String>,
}

impl SelectItem {
    /// The name the column renders under: the alias, a reference's column
    /// part, or the expression's textual form.
    #[must_use]
    pub fn display_name(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        if let Expr::Reference(r) = &self.expr {
            return r.reference.column.clone();
        }
        self.expr.to_string()
    }
}

/// What a FROM clause names.
pub enum FromSource {
    /// A URL or path literal.
    Url(String),
    /// An identifier bound to a String (URL), Array (URL list) or Table.
    Reference(String),
    /// A parenthesized subquery.
    Subquery(Rc<Query>),
}

/// One FROM clause.
pub struct FromClause {
    /// The source being read.
    pub source: FromSource,
    /// Adapter-specific FILTER string.
    pub filter: Option<String>,
    /// The alias the source's columns are qualified with.
    pub alias: String,
}

/// One ORDER BY item.
pub struct OrderItem {
    /// The key expression.
    pub expr: Expr,
    /// DESC flips the comparison.
    pub descending: bool,
}

/// `LIMIT [offset,] count`.
#[derive(Debug, Clone, Copy)]
pub struct Limit {
    /// Rows to skip.
    pub offset: u32,
    /// Rows to keep.
    pub count: u32,
}

struct Evaluated {
    columns: Vec<ColumnSelector>,
    rows: Rc<Vec<Row>>,
}

/// A SELECT statement, lazily evaluated and cached.
pub struct Query {
    /// SELECT list; empty means `SELECT *`, expanded at evaluation.
    pub select: RefCell<Vec<SelectItem>>,
    /// FROM clauses.
    pub from: Vec<FromClause>,
    /// WHERE clause.
    pub where_clause: Option<Expr>,
    /// GROUP BY expressions.
    pub group_by: Vec<Expr>,
    /// ORDER BY items.
    pub order_by: Vec<OrderItem>,
    /// LIMIT clause.
    pub limit: Option<Limit>,
    /// `INTO name`, binding the result table in the enclosing scope.
    pub into: Option<String>,
    /// The enclosing scope.
    pub scope: Scope,
    /// The process-wide function registry.
    pub functions: Rc<RefCell<FunctionRegistry>>,
    /// Source acquisition seam.
    pub loader: Rc<dyn SourceLoader>,
    state: RefCell<Option<Evaluated>>,
}

struct OutRow {
    cols: Row,
    keys: Vec<Value>,
    seq: usize,
}

impl Query {
    /// A query over the given clauses, not yet evaluated.
    #[must_use]
    pub fn new(
        select: Vec<SelectItem>,
        from: Vec<FromClause>,
        where_clause: Option<Expr>,
        group_by: Vec<Expr>,
        order_by: Vec<OrderItem>,
        limit: Option<Limit>,
        into: Option<String>,
        scope: Scope,
        functions: Rc<RefCell<FunctionRegistry>>,
        loader: Rc<dyn SourceLoader>,
    ) -> Self {
        Self {
            select: RefCell::new(select),
            from,
            where_clause,
            group_by,
            order_by,
            limit,
            into,
            scope,
            functions,
            loader,
            state: RefCell::new(None),
        }
    }

    fn ensure(&self) -> Result<()> {
        if self.state.borrow().is_some() {
            return Ok(());
        }
        let evaluated = self.evaluate()?;
        *self.state.borrow_mut() = Some(evaluated);
        Ok(())
    }

    /// All unique column references qualified with `alias`, in occurrence
    /// order; these become the adapter's selected columns.
    fn columns_for(&self, alias: &str) -> Vec<String> {
        let mut selected: Vec<String> = Vec::new();
        let mut visit = |reference: &Reference| {
            if reference.source.as_deref() == Some(alias)
                && !selected.contains(&reference.column)
            {
                selected.push(reference.column.clone());
            }
        };
        for item in self.select.borrow().iter() {
            item.expr.visit_references(&mut visit);
        }
        if let Some(where_clause) = &self.where_clause {
            where_clause.visit_references(&mut visit);
        }
        for group in &self.group_by {
            group.visit_references(&mut visit);
        }
        for order in &self.order_by {
            order.expr.visit_references(&mut visit);
        }
        selected
    }

    fn load(&self, urls: &[String], clause: &FromClause) -> Result<Rc<dyn Source>> {
        let (streams, format) = loader::resolve(urls, self.loader.as_ref())?;
        let filter = clause.filter.as_deref().unwrap_or("");
        let selected = self.columns_for(&clause.alias);
        Ok(match format {
            Format::Csv => Rc::new(CsvSource::new(&streams, filter, &selected)?),
            Format::Json => Rc::new(JsonSource::new(&streams, filter, &selected)?),
            Format::Html => Rc::new(HtmlSource::new(&streams, filter, &selected)?),
        })
    }

    fn resolve_source(&self, clause: &FromClause) -> Result<Rc<dyn Source>> {
        match &clause.source {
            FromSource::Subquery(query) => Ok(query.clone() as Rc<dyn Source>),
            FromSource::Url(url) => self.load(std::slice::from_ref(url), clause),
            FromSource::Reference(name) => match self.scope.get(name) {
                Some(Value::Table(table)) => Ok(table),
                Some(Value::String(url)) => self.load(&[url], clause),
                Some(Value::Array(items)) => {
                    let urls: Vec<String> = items
                        .into_iter()
                        .map(|item| match item {
                            Value::String(url) => Ok(url),
                            other => Err(Error::TypeMismatch(format!(
                                "{name}: source list items must be strings, got {other}"
                            ))),
                        })
                        .collect::<Result<_>>()?;
                    self.load(&urls, clause)
                }
                Some(other) => Err(Error::TypeMismatch(format!(
                    "{name} is not usable as a source: {other}"
                ))),
                None => Err(Error::UnboundIdentifier(name.clone())),
            },
        }
    }

    fn evaluate(&self) -> Result<Evaluated> {
        // Force every FROM source so its columns are known.
        let mut aliases = Vec::with_capacity(self.from.len());
        let mut sources: Vec<Rc<dyn Source>> = Vec::with_capacity(self.from.len());
        for clause in &self.from {
            aliases.push(clause.alias.clone());
            sources.push(self.resolve_source(clause)?);
        }

        let mut columns_map: HashMap<String, ColumnBinding> = HashMap::new();
        let mut source_columns = Vec::with_capacity(sources.len());
        for (si, (alias, source)) in aliases.iter().zip(&sources).enumerate() {
            let columns = source.columns()?;
            for (ci, selector) in columns.iter().enumerate() {
                let name = selector
                    .alias
                    .clone()
                    .unwrap_or_else(|| selector.name.column.clone());
                let index = ColumnIndex {
                    source: si,
                    column: ci,
                    ty: selector.ty,
                };
                columns_map.insert(format!("{alias}.{name}"), ColumnBinding::Unique(index));
                columns_map
                    .entry(name)
                    .and_modify(|binding| *binding = ColumnBinding::Ambiguous)
                    .or_insert(ColumnBinding::Unique(index));
            }
            source_columns.push(columns);
        }

        // SELECT * materializes from the union of FROM columns.
        if self.select.borrow().is_empty() {
            let mut items = Vec::new();
            for (alias, columns) in aliases.iter().zip(&source_columns) {
                for selector in columns {
                    let name = selector
                        .alias
                        .clone()
                        .unwrap_or_else(|| selector.name.column.clone());
                    items.push(SelectItem {
                        expr: Expr::Reference(crate::ast::RefExpr::new(Reference::qualified(
                            alias.clone(),
                            name,
                        ))),
                        alias: None,
                    });
                }
            }
            *self.select.borrow_mut() = items;
        }

        let select = self.select.borrow();

        // Bind everything; compute SELECT list idempotence.
        {
            let registry = self.functions.borrow();
            let env = BindEnv {
                columns: &columns_map,
                scope: &self.scope,
                functions: &registry,
            };
            for item in select.iter() {
                item.expr.bind(&env)?;
            }
            if let Some(where_clause) = &self.where_clause {
                where_clause.bind(&env)?;
            }
            for group in &self.group_by {
                group.bind(&env)?;
            }
            for order in &self.order_by {
                order.expr.bind(&env)?;
            }
        }
        let idempotent = select.iter().all(|item| item.expr.is_idempotent());

        // Public selectors become the result columns.
        let mut projected: Vec<(usize, ColumnSelector)> = Vec::new();
        for (i, item) in select.iter().enumerate() {
            let selector = ColumnSelector::new(Reference::new(item.display_name()));
            if selector.is_public() {
                projected.push((i, selector));
            }
        }

        let data: Vec<Rc<Vec<Row>>> = sources
            .iter()
            .map(|source| source.get())
            .collect::<Result<_>>()?;

        // Nested-loop join: cross product, WHERE, ORDER BY keys.
        let mut matches: Vec<JoinRow> = Vec::new();
        let mut odometer = vec![0usize; data.len()];
        cross_product(&data, 0, &mut odometer, &mut |indices| {
            let mut row = JoinRow {
                idx: indices.to_vec(),
                seq: matches.len(),
                keys: Vec::new(),
            };
            let ctx = EvalCtx {
                row: Some(&row),
                rows: &[],
                data: &data,
                scope: &self.scope,
            };
            if let Some(where_clause) = &self.where_clause {
                match where_clause
                    .eval(&ctx)
                    .map_err(|e| expr_context(e, where_clause))?
                {
                    Value::Bool(true) => {}
                    Value::Bool(false) | Value::Null => return Ok(()),
                    other => {
                        return Err(Error::TypeMismatch(format!(
                            "WHERE {where_clause} must be a boolean, got {other}"
                        )))
                    }
                }
            }
            let mut keys = Vec::with_capacity(self.order_by.len());
            for order in &self.order_by {
                keys.push(order.expr.eval(&ctx).map_err(|e| expr_context(e, &order.expr))?);
            }
            row.keys = keys;
            matches.push(row);
            Ok(())
        })?;
        tracing::debug!(candidates = matches.len(), "join produced match rows");

        // Group in a prefix tree; the empty GROUP BY is one implicit group.
        let mut groups = GroupNode::default();
        for row in matches {
            let key = if self.group_by.is_empty() {
                Vec::new()
            } else {
                let ctx = EvalCtx {
                    row: Some(&row),
                    rows: &[],
                    data: &data,
                    scope: &self.scope,
                };
                self.group_by
                    .iter()
                    .map(|group| group.eval(&ctx).map_err(|e| expr_context(e, group)))
                    .collect::<Result<Vec<_>>>()?
            };
            groups.insert(&key, row);
        }

        // Projection with aggregate folding.
        let realfmt = match self.scope.get("REALFMT") {
            Some(Value::String(fmt)) => fmt,
            _ => "%g".to_string(),
        };
        let one_per_group = idempotent || !self.group_by.is_empty();
        let mut out: Vec<OutRow> = Vec::new();
        groups.visit(&mut |group| {
            if one_per_group {
                out.push(self.project(&group[0], group, &data, &select, &mut projected, &realfmt)?);
            } else {
                for member in group {
                    out.push(self.project(member, group, &data, &select, &mut projected, &realfmt)?);
                }
            }
            Ok(())
        })?;

        // Stable sort on the ORDER BY keys; insertion sequence breaks ties.
        out.sort_by(|a, b| {
            for (i, order) in self.order_by.iter().enumerate() {
                let ord = sort_compare(&a.keys[i], &b.keys[i]);
                let ord = if order.descending { ord.reverse() } else { ord };
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            a.seq.cmp(&b.seq)
        });

        if let Some(limit) = self.limit {
            let start = (limit.offset as usize).min(out.len());
            let end = (start + limit.count as usize).min(out.len());
            out = out.drain(start..end).collect();
        }

        Ok(Evaluated {
            columns: projected.into_iter().map(|(_, selector)| selector).collect(),
            rows: Rc::new(out.into_iter().map(|row| row.cols).collect()),
        })
    }

    fn project(
        &self,
        member: &JoinRow,
        group: &[JoinRow],
        data: &[Rc<Vec<Row>>],
        select: &[SelectItem],
        projected: &mut [(usize, ColumnSelector)],
        realfmt: &str,
    ) -> Result<OutRow> {
        let ctx = EvalCtx {
            row: Some(member),
            rows: group,
            data,
            scope: &self.scope,
        };
        let mut cols = Row::with_capacity(projected.len());
        for (index, selector) in projected.iter_mut() {
            let item = &select[*index];
            let value = item.expr.eval(&ctx).map_err(|e| expr_context(e, &item.expr))?;
            let text = match &value {
                Value::Null => None,
                Value::Float(v) => Some(format_real(realfmt, *v)),
                other => Some(other.to_string()),
            };
            let column = match text {
                Some(text) => Column::Typed { value, text },
                None => Column::Null,
            };
            if let Some(ty) = column_type(&column) {
                selector.ty = selector.ty.max(ty);
            }
            cols.push(column);
        }
        Ok(OutRow {
            cols,
            keys: member.keys.clone(),
            seq: member.seq,
        })
    }
}

fn column_type(column: &Column) -> Option<Type> {
    match column {
        Column::Typed { value, .. } => value.ty(),
        _ => None,
    }
}

/// Attaches the expression's textual form to an evaluation error.
fn expr_context(error: Error, expr: &Expr) -> Error {
    match error {
        Error::TypeMismatch(m) => Error::TypeMismatch(format!("{expr}: {m}")),
        Error::InvalidArgument(m) => Error::InvalidArgument(format!("{expr}: {m}")),
        other => other,
    }
}

fn cross_product(
    data: &[Rc<Vec<Row>>],
    level: usize,
    odometer: &mut Vec<usize>,
    visit: &mut impl FnMut(&[usize]) -> Result<()>,
) -> Result<()> {
    if level == data.len() {
        return visit(odometer);
    }
    for i in 0..data[level].len() {
        odometer[level] = i;
        cross_product(data, level + 1, odometer, visit)?;
    }
    Ok(())
}

/// The grouping prefix tree: keys of differing length coexist, and
/// pre-order iteration visits shorter keys first.
#[derive(Default)]
struct GroupNode {
    rows: Vec<JoinRow>,
    children: Vec<(Value, GroupNode)>,
}

impl GroupNode {
    fn insert(&mut self, key: &[Value], row: JoinRow) {
        let mut node = self;
        for part in key {
            let position = node
                .children
                .iter()
                .position(|(value, _)| crate::value::values_equal(value, part).unwrap_or(false));
            let position = match position {
                Some(position) => position,
                None => {
                    node.children.push((part.clone(), GroupNode::default()));
                    node.children.len() - 1
                }
            };
            node = &mut node.children[position].1;
        }
        node.rows.push(row);
    }

    fn visit(&self, f: &mut impl FnMut(&[JoinRow]) -> Result<()>) -> Result<()> {
        if !self.rows.is_empty() {
            f(&self.rows)?;
        }
        for (_, child) in &self.children {
            child.visit(f)?;
        }
        Ok(())
    }
}

impl Source for Query {
    fn columns(&self) -> Result<Vec<ColumnSelector>> {
        self.ensure()?;
        Ok(self
            .state
            .borrow()
            .as_ref()
            .map(|e| e.columns.clone())
            .unwrap_or_default())
    }

    fn get(&self) -> Result<Rc<Vec<Row>>> {
        self.ensure()?;
        Ok(self
            .state
            .borrow()
            .as_ref()
            .map(|e| e.rows.clone())
            .unwrap_or_else(|| Rc::new(Vec::new())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::loader::NullLoader;

    fn constant(v: i64) -> Expr {
        Expr::Constant(Value::Int(v))
    }

    fn query(select: Vec<SelectItem>) -> Query {
        Query::new(
            select,
            Vec::new(),
            None,
            Vec::new(),
            Vec::new(),
            None,
            None,
            Scope::new(),
            Rc::new(RefCell::new(FunctionRegistry::new())),
            Rc::new(NullLoader),
        )
    }

    #[test]
    fn test_query_without_from_yields_one_row() {
        let q = query(vec![SelectItem {
            expr: constant(42),
            alias: Some("Answer".to_string()),
        }]);
        let rows = q.get().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0].value(Type::Int).unwrap(), Value::Int(42));
        let columns = q.columns().unwrap();
        assert_eq!(columns[0].display_name(), "Answer");
        assert_eq!(columns[0].ty, Type::Int);
    }

    #[test]
    fn test_get_is_cached() {
        let q = query(vec![SelectItem {
            expr: constant(1),
            alias: Some("N".to_string()),
        }]);
        let first = q.get().unwrap();
        let second = q.get().unwrap();
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_hidden_columns_do_not_reach_output() {
        let q = query(vec![
            SelectItem {
                expr: constant(1),
                alias: Some("Visible".to_string()),
            },
            SelectItem {
                expr: constant(2),
                alias: Some("hidden".to_string()),
            },
        ]);
        let columns = q.columns().unwrap();
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].display_name(), "Visible");
        assert_eq!(q.get().unwrap()[0].len(), 1);
    }

    #[test]
    fn test_default_display_name_is_expression_text() {
        let q = query(vec![SelectItem {
            expr: Expr::Binary {
                op: crate::ast::BinaryOp::Add,
                left: Box::new(constant(1)),
                right: Box::new(constant(2)),
            },
            alias: None,
        }]);
        let columns = q.columns().unwrap();
        assert_eq!(columns[0].display_name(), "1 + 2");
    }
}
