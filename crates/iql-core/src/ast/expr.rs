//! Expression AST, reference binding and evaluation.
//!
//! Binding resolves every [`RefExpr`] against the query's FROM columns
//! first and the enclosing scope second, caching the resolution in the
//! node so that evaluation is a plain index lookup. Idempotence — whether
//! a value is independent of row state — is derived from the bound tree
//! and drives aggregate result flattening.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use regex::Regex;

use crate::error::{Error, Result};
use crate::functions::{Function, FunctionKind, FunctionRegistry, Idempotency};
use crate::query::Query;
use crate::scope::Scope;
use crate::source::{Reference, Row, Source};
use crate::value::{compare_values, super_type, values_equal, Type, Value};

/// A resolved column: FROM source index, column index and declared type.
#[derive(Debug, Clone, Copy)]
pub struct ColumnIndex {
    /// Index of the FROM source.
    pub source: usize,
    /// Column index within that source's rows.
    pub column: usize,
    /// The column's declared type.
    pub ty: Type,
}

/// One entry of a query's name → column map.
#[derive(Debug, Clone, Copy)]
pub enum ColumnBinding {
    /// Exactly one FROM column carries the name.
    Unique(ColumnIndex),
    /// The unqualified name matches more than one FROM source.
    Ambiguous,
}

/// Everything reference binding resolves against.
pub struct BindEnv<'a> {
    /// `"alias.name"` and `"name"` keys over all FROM columns.
    pub columns: &'a HashMap<String, ColumnBinding>,
    /// The query's enclosing scope.
    pub scope: &'a Scope,
    /// The process-wide function registry.
    pub functions: &'a FunctionRegistry,
}

/// One candidate row of the nested-loop join: a row index per FROM
/// source, the insertion sequence (the ORDER BY tiebreaker), and the
/// ORDER BY keys evaluated at match time.
#[derive(Debug, Clone)]
pub struct JoinRow {
    /// Row index into each FROM source's row set.
    pub idx: Vec<usize>,
    /// Insertion sequence.
    pub seq: usize,
    /// ORDER BY key values.
    pub keys: Vec<Value>,
}

/// Evaluation state threaded through an expression walk.
#[derive(Clone, Copy)]
pub struct EvalCtx<'a> {
    /// The current row, when evaluating with row state.
    pub row: Option<&'a JoinRow>,
    /// The group being reduced; aggregates walk this.
    pub rows: &'a [JoinRow],
    /// Row storage per FROM source.
    pub data: &'a [Rc<Vec<Row>>],
    /// The scope variable references resolve in.
    pub scope: &'a Scope,
}

impl<'a> EvalCtx<'a> {
    /// A context for statement-level evaluation: no row state.
    #[must_use]
    pub fn statement(scope: &'a Scope) -> Self {
        Self {
            row: None,
            rows: &[],
            data: &[],
            scope,
        }
    }

    /// The same context focused on one row of the group.
    #[must_use]
    pub fn with_row(&self, row: &'a JoinRow) -> Self {
        Self {
            row: Some(row),
            ..*self
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Match,
    NotMatch,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    /// Returns the IQL spelling of the operator.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Match => "~",
            Self::NotMatch => "!~",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
}

/// How a reference resolved at bind time.
#[derive(Debug, Clone, Copy)]
enum RefBinding {
    Column(ColumnIndex),
    Variable,
}

/// A column or variable reference.
pub struct RefExpr {
    /// The written reference.
    pub reference: Reference,
    binding: Cell<Option<RefBinding>>,
}

impl RefExpr {
    /// A reference not yet bound.
    #[must_use]
    pub fn new(reference: Reference) -> Self {
        Self {
            reference,
            binding: Cell::new(None),
        }
    }

    fn bind(&self, env: &BindEnv<'_>) -> Result<()> {
        if let Some(source) = &self.reference.source {
            let key = format!("{source}.{}", self.reference.column);
            return match env.columns.get(&key) {
                Some(ColumnBinding::Unique(idx)) => {
                    self.binding.set(Some(RefBinding::Column(*idx)));
                    Ok(())
                }
                Some(ColumnBinding::Ambiguous) => Err(Error::AmbiguousColumn(key)),
                None => Err(Error::UnboundIdentifier(key)),
            };
        }
        match env.columns.get(&self.reference.column) {
            Some(ColumnBinding::Unique(idx)) => {
                self.binding.set(Some(RefBinding::Column(*idx)));
                Ok(())
            }
            Some(ColumnBinding::Ambiguous) => {
                Err(Error::AmbiguousColumn(self.reference.column.clone()))
            }
            None if env.scope.contains(&self.reference.column) => {
                self.binding.set(Some(RefBinding::Variable));
                Ok(())
            }
            None => Err(Error::UnboundIdentifier(self.reference.to_string())),
        }
    }

    fn eval(&self, ctx: &EvalCtx<'_>) -> Result<Value> {
        match self.binding.get() {
            Some(RefBinding::Column(idx)) => {
                let row = ctx.row.ok_or_else(|| {
                    Error::InvalidArgument(format!("{} referenced without a row", self.reference))
                })?;
                ctx.data[idx.source][row.idx[idx.source]][idx.column].value(idx.ty)
            }
            Some(RefBinding::Variable) => ctx
                .scope
                .get(&self.reference.column)
                .ok_or_else(|| Error::UnboundIdentifier(self.reference.to_string())),
            None => Err(Error::UnboundIdentifier(self.reference.to_string())),
        }
    }
}

/// A function call, resolved against the registry at bind time.
pub struct CallExpr {
    /// Upper-cased function name.
    pub name: String,
    /// Argument expressions. Arguments before the function's
    /// `first_bound` index are literal tag identifiers.
    pub args: Vec<Expr>,
    resolved: RefCell<Option<Rc<Function>>>,
}

impl CallExpr {
    /// A call not yet bound.
    #[must_use]
    pub fn new(name: &str, args: Vec<Expr>) -> Self {
        Self {
            name: name.to_uppercase(),
            args,
            resolved: RefCell::new(None),
        }
    }

    /// The function this call resolved to.
    pub fn function(&self) -> Result<Rc<Function>> {
        self.resolved
            .borrow()
            .clone()
            .ok_or_else(|| Error::UnboundIdentifier(self.name.clone()))
    }

    fn bind(&self, env: &BindEnv<'_>) -> Result<()> {
        let func = env
            .functions
            .get(&self.name)
            .ok_or_else(|| Error::UnboundIdentifier(self.name.clone()))?;
        func.check_arity(self.args.len())?;
        for (i, arg) in self.args.iter().enumerate() {
            if i < func.first_bound {
                if !matches!(arg, Expr::Reference(r) if r.reference.source.is_none()) {
                    return Err(Error::InvalidArgument(format!(
                        "{}: argument {} must be a plain identifier",
                        self.name,
                        i + 1
                    )));
                }
            } else {
                arg.bind(env)?;
            }
        }
        *self.resolved.borrow_mut() = Some(func);
        Ok(())
    }

    fn eval(&self, ctx: &EvalCtx<'_>) -> Result<Value> {
        let func = self.function()?;
        match &func.kind {
            FunctionKind::Native(native) => native(&self.args, ctx),
            FunctionKind::User(udf) => crate::functions::eval_user(udf, &self.args, ctx),
        }
    }

    fn is_idempotent(&self) -> bool {
        let Some(func) = self.resolved.borrow().clone() else {
            return false;
        };
        match func.idempotency {
            Idempotency::Idempotent => true,
            Idempotency::Volatile => false,
            Idempotency::Args => self.args[func.first_bound.min(self.args.len())..]
                .iter()
                .all(Expr::is_idempotent),
        }
    }
}

/// One WHEN/THEN branch of a CASE expression.
pub struct CaseBranch {
    /// The WHEN value or condition.
    pub when: Expr,
    /// The branch result.
    pub then: Expr,
}

/// The candidates of an IN expression.
pub enum InList {
    /// An explicit value list.
    Values(Vec<Expr>),
    /// A single-column subquery.
    Query(Rc<Query>),
}

/// An expression tree node.
pub enum Expr {
    /// A literal value.
    Constant(Value),
    /// A column or variable reference.
    Reference(RefExpr),
    /// A function call.
    Call(CallExpr),
    /// A unary operation.
    Unary {
        /// The operator.
        op: UnaryOp,
        /// The operand.
        expr: Box<Expr>,
    },
    /// A binary operation.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Short-circuit conjunction.
    And(Box<Expr>, Box<Expr>),
    /// Short-circuit disjunction.
    Or(Box<Expr>, Box<Expr>),
    /// Boolean negation.
    Not(Box<Expr>),
    /// Membership test.
    In {
        /// The value under test.
        expr: Box<Expr>,
        /// The candidates.
        list: InList,
        /// NOT IN.
        negated: bool,
    },
    /// Declared type conversion.
    Cast {
        /// The value to convert.
        expr: Box<Expr>,
        /// The target type.
        ty: Type,
    },
    /// CASE expression, with or without an input operand.
    Case {
        /// The input compared against each WHEN, when present.
        input: Option<Box<Expr>>,
        /// The WHEN/THEN branches.
        branches: Vec<CaseBranch>,
        /// The ELSE value.
        default: Option<Box<Expr>>,
    },
}

impl Expr {
    /// Resolves every reference and call in the tree.
    pub fn bind(&self, env: &BindEnv<'_>) -> Result<()> {
        match self {
            Self::Constant(_) => Ok(()),
            Self::Reference(r) => r.bind(env),
            Self::Call(c) => c.bind(env),
            Self::Unary { expr, .. } | Self::Not(expr) => expr.bind(env),
            Self::Binary { left, right, .. } | Self::And(left, right) | Self::Or(left, right) => {
                left.bind(env)?;
                right.bind(env)
            }
            Self::In { expr, list, .. } => {
                expr.bind(env)?;
                if let InList::Values(values) = list {
                    for value in values {
                        value.bind(env)?;
                    }
                }
                Ok(())
            }
            Self::Cast { expr, .. } => expr.bind(env),
            Self::Case {
                input,
                branches,
                default,
            } => {
                if let Some(input) = input {
                    input.bind(env)?;
                }
                for branch in branches {
                    branch.when.bind(env)?;
                    branch.then.bind(env)?;
                }
                if let Some(default) = default {
                    default.bind(env)?;
                }
                Ok(())
            }
        }
    }

    /// Whether the value is a pure function of variable bindings and
    /// constants, independent of the row being evaluated. Call after
    /// [`Expr::bind`].
    #[must_use]
    pub fn is_idempotent(&self) -> bool {
        match self {
            Self::Constant(_) => true,
            Self::Reference(r) => matches!(r.binding.get(), Some(RefBinding::Variable)),
            Self::Call(c) => c.is_idempotent(),
            Self::Unary { expr, .. } | Self::Not(expr) => expr.is_idempotent(),
            Self::Binary { left, right, .. } | Self::And(left, right) | Self::Or(left, right) => {
                left.is_idempotent() && right.is_idempotent()
            }
            Self::In { expr, list, .. } => {
                expr.is_idempotent()
                    && match list {
                        InList::Values(values) => values.iter().all(Expr::is_idempotent),
                        InList::Query(_) => true,
                    }
            }
            Self::Cast { expr, .. } => expr.is_idempotent(),
            Self::Case {
                input,
                branches,
                default,
            } => {
                input.as_deref().is_none_or(Expr::is_idempotent)
                    && branches
                        .iter()
                        .all(|b| b.when.is_idempotent() && b.then.is_idempotent())
                    && default.as_deref().is_none_or(Expr::is_idempotent)
            }
        }
    }

    /// Evaluates the expression.
    pub fn eval(&self, ctx: &EvalCtx<'_>) -> Result<Value> {
        match self {
            Self::Constant(value) => Ok(value.clone()),
            Self::Reference(r) => r.eval(ctx),
            Self::Call(c) => c.eval(ctx),
            Self::Unary { op: UnaryOp::Neg, expr } => match expr.eval(ctx)? {
                Value::Null => Ok(Value::Null),
                Value::Int(v) => Ok(Value::Int(-v)),
                Value::Float(v) => Ok(Value::Float(-v)),
                other => Err(Error::TypeMismatch(format!(
                    "cannot negate {}",
                    other.ty().map_or("NULL", |t| t.as_str())
                ))),
            },
            Self::Binary { op, left, right } => {
                eval_binary(*op, left.eval(ctx)?, right.eval(ctx)?)
            }
            Self::And(left, right) => {
                if truthy(&left.eval(ctx)?)? {
                    Ok(Value::Bool(truthy(&right.eval(ctx)?)?))
                } else {
                    Ok(Value::Bool(false))
                }
            }
            Self::Or(left, right) => {
                if truthy(&left.eval(ctx)?)? {
                    Ok(Value::Bool(true))
                } else {
                    Ok(Value::Bool(truthy(&right.eval(ctx)?)?))
                }
            }
            Self::Not(expr) => match expr.eval(ctx)? {
                Value::Null => Ok(Value::Null),
                Value::Bool(v) => Ok(Value::Bool(!v)),
                other => Err(Error::TypeMismatch(format!(
                    "NOT requires a boolean, got {}",
                    other.ty().map_or("NULL", |t| t.as_str())
                ))),
            },
            Self::In {
                expr,
                list,
                negated,
            } => {
                let left = expr.eval(ctx)?;
                let found = match list {
                    InList::Values(values) => {
                        let mut found = false;
                        for value in values {
                            if values_equal(&left, &value.eval(ctx)?)? {
                                found = true;
                                break;
                            }
                        }
                        found
                    }
                    InList::Query(query) => in_subquery(&left, query)?,
                };
                Ok(Value::Bool(found != *negated))
            }
            Self::Cast { expr, ty } => expr.eval(ctx)?.cast(*ty),
            Self::Case {
                input,
                branches,
                default,
            } => {
                match input {
                    Some(input) => {
                        let value = input.eval(ctx)?;
                        for branch in branches {
                            if values_equal(&value, &branch.when.eval(ctx)?)? {
                                return branch.then.eval(ctx);
                            }
                        }
                    }
                    None => {
                        for branch in branches {
                            if truthy(&branch.when.eval(ctx)?)? {
                                return branch.then.eval(ctx);
                            }
                        }
                    }
                }
                match default {
                    Some(default) => default.eval(ctx),
                    None => Ok(Value::Null),
                }
            }
        }
    }

    /// Walks every reference in the tree. Subquery internals are skipped;
    /// they bind against their own FROM columns.
    pub fn visit_references<'e>(&'e self, visit: &mut impl FnMut(&'e Reference)) {
        match self {
            Self::Constant(_) => {}
            Self::Reference(r) => visit(&r.reference),
            Self::Call(c) => {
                for arg in &c.args {
                    arg.visit_references(visit);
                }
            }
            Self::Unary { expr, .. } | Self::Not(expr) | Self::Cast { expr, .. } => {
                expr.visit_references(visit);
            }
            Self::Binary { left, right, .. } | Self::And(left, right) | Self::Or(left, right) => {
                left.visit_references(visit);
                right.visit_references(visit);
            }
            Self::In { expr, list, .. } => {
                expr.visit_references(visit);
                if let InList::Values(values) = list {
                    for value in values {
                        value.visit_references(visit);
                    }
                }
            }
            Self::Case {
                input,
                branches,
                default,
            } => {
                if let Some(input) = input {
                    input.visit_references(visit);
                }
                for branch in branches {
                    branch.when.visit_references(visit);
                    branch.then.visit_references(visit);
                }
                if let Some(default) = default {
                    default.visit_references(visit);
                }
            }
        }
    }
}

/// Bool coercion for WHERE, AND/OR and searched CASE: Null is not true.
fn truthy(value: &Value) -> Result<bool> {
    match value {
        Value::Null => Ok(false),
        Value::Bool(v) => Ok(*v),
        other => Err(Error::TypeMismatch(format!(
            "expected a boolean, got {}",
            other.ty().map_or("NULL", |t| t.as_str())
        ))),
    }
}

fn in_subquery(left: &Value, query: &Rc<Query>) -> Result<bool> {
    let rows = query.get()?;
    let columns = query.columns()?;
    if columns.len() != 1 {
        return Err(Error::InvalidArgument(format!(
            "IN subquery must produce exactly one column, got {}",
            columns.len()
        )));
    }
    let ty = columns[0].ty;
    for row in rows.iter() {
        if values_equal(left, &row[0].value(ty)?)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn eval_binary(op: BinaryOp, left: Value, right: Value) -> Result<Value> {
    use BinaryOp::{Add, Div, Eq, Ge, Gt, Le, Lt, Match, Mul, Ne, NotMatch, Sub};

    let nulls = (left.is_null(), right.is_null());
    match op {
        Eq => {
            if nulls.0 || nulls.1 {
                return Ok(Value::Bool(nulls.0 && nulls.1));
            }
            Ok(Value::Bool(values_equal(&left, &right)?))
        }
        Ne => {
            if nulls.0 || nulls.1 {
                return Ok(Value::Bool(nulls.0 != nulls.1));
            }
            Ok(Value::Bool(!values_equal(&left, &right)?))
        }
        Lt | Le | Gt | Ge => {
            if nulls.0 || nulls.1 {
                return Ok(Value::Null);
            }
            let ord = compare_values(&left, &right)?;
            Ok(Value::Bool(match op {
                Lt => ord.is_lt(),
                Le => ord.is_le(),
                Gt => ord.is_gt(),
                _ => ord.is_ge(),
            }))
        }
        Match | NotMatch => {
            if nulls.0 || nulls.1 {
                return Ok(Value::Null);
            }
            let (Value::String(subject), Value::String(pattern)) = (&left, &right) else {
                return Err(Error::TypeMismatch(format!(
                    "{} requires string operands",
                    op.as_str()
                )));
            };
            let re = Regex::new(pattern)
                .map_err(|e| Error::InvalidArgument(format!("invalid pattern '{pattern}': {e}")))?;
            Ok(Value::Bool(re.is_match(subject) == (op == Match)))
        }
        Add | Sub | Mul | Div => {
            if nulls.0 || nulls.1 {
                return Ok(Value::Null);
            }
            eval_arithmetic(op, &left, &right)
        }
    }
}

fn eval_arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    let ty = super_type(
        left.ty().unwrap_or(Type::String),
        right.ty().unwrap_or(Type::String),
    )?;
    match ty {
        Type::Int => {
            let (a, b) = (
                left.int()?.unwrap_or_default(),
                right.int()?.unwrap_or_default(),
            );
            Ok(Value::Int(match op {
                BinaryOp::Add => a.wrapping_add(b),
                BinaryOp::Sub => a.wrapping_sub(b),
                BinaryOp::Mul => a.wrapping_mul(b),
                _ => {
                    if b == 0 {
                        return Err(Error::DivisionByZero);
                    }
                    a.wrapping_div(b)
                }
            }))
        }
        Type::Float => {
            let (a, b) = (
                left.float()?.unwrap_or_default(),
                right.float()?.unwrap_or_default(),
            );
            Ok(Value::Float(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                _ => a / b,
            }))
        }
        Type::String if op == BinaryOp::Add => match (left, right) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            _ => unreachable!("super_type only yields String for two strings"),
        },
        _ => Err(Error::TypeMismatch(format!(
            "operator {} is not defined for {ty}",
            op.as_str()
        ))),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(Value::String(s)) => write!(f, "'{}'", s.replace('\'', "''")),
            Self::Constant(value) => write!(f, "{value}"),
            Self::Reference(r) => write!(f, "{}", r.reference),
            Self::Call(c) => {
                write!(f, "{}(", c.name)?;
                for (i, arg) in c.args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Self::Unary { op: UnaryOp::Neg, expr } => write!(f, "-{expr}"),
            Self::Binary { op, left, right } => {
                write!(f, "{left} {} {right}", op.as_str())
            }
            Self::And(left, right) => write!(f, "{left} AND {right}"),
            Self::Or(left, right) => write!(f, "{left} OR {right}"),
            Self::Not(expr) => write!(f, "NOT {expr}"),
            Self::In {
                expr,
                list,
                negated,
            } => {
                write!(f, "{expr} {}IN (", if *negated { "NOT " } else { "" })?;
                match list {
                    InList::Values(values) => {
                        for (i, value) in values.iter().enumerate() {
                            if i > 0 {
                                f.write_str(", ")?;
                            }
                            write!(f, "{value}")?;
                        }
                    }
                    InList::Query(_) => f.write_str("SELECT …")?,
                }
                f.write_str(")")
            }
            Self::Cast { expr, ty } => write!(f, "CAST({expr} AS {ty})"),
            Self::Case {
                input,
                branches,
                default,
            } => {
                f.write_str("CASE")?;
                if let Some(input) = input {
                    write!(f, " {input}")?;
                }
                for branch in branches {
                    write!(f, " WHEN {} THEN {}", branch.when, branch.then)?;
                }
                if let Some(default) = default {
                    write!(f, " ELSE {default}")?;
                }
                f.write_str(" END")
            }
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}
