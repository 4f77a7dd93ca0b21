//! The function registry: built-ins plus user-defined functions.
//!
//! Built-ins are registered once per registry and protected from DROP;
//! `CREATE FUNCTION` adds user functions to the same namespace.

mod aggregate;
mod datetime;
mod misc;
mod string;

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{EvalCtx, Expr, Statement};
use crate::error::{Error, Result};
use crate::scope::Scope;
use crate::value::{Type, Value};

/// A native implementation receives its unevaluated arguments plus the
/// evaluation context, so aggregates can walk the group in `ctx.rows`.
pub type NativeFn = fn(&[Expr], &EvalCtx<'_>) -> Result<Value>;

/// How a function's idempotence is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotency {
    /// Row-independent regardless of arguments; aggregates qualify.
    Idempotent,
    /// Never idempotent, e.g. `GETDATE`.
    Volatile,
    /// Idempotent when every bound argument is.
    Args,
}

/// A user-defined function body created by `CREATE FUNCTION`.
pub struct UserFunction {
    /// Parameter names and declared types.
    pub params: Vec<(String, Type)>,
    /// Declared return type.
    pub returns: Type,
    /// Body statements preceding RETURN; DECLARE and SET only.
    pub body: Vec<Statement>,
    /// The RETURN expression.
    pub ret: Expr,
    /// The declaration scope; each call evaluates in a fresh child.
    pub scope: Scope,
}

/// A function's implementation.
pub enum FunctionKind {
    /// A built-in.
    Native(NativeFn),
    /// A user-defined body.
    User(UserFunction),
}

/// A registered function.
pub struct Function {
    /// Upper-cased name.
    pub name: String,
    /// Minimum argument count.
    pub min_args: usize,
    /// Maximum argument count.
    pub max_args: usize,
    /// Index of the first argument that undergoes expression binding;
    /// arguments before it are literal tag identifiers (DATEDIFF's date
    /// part).
    pub first_bound: usize,
    /// Idempotence rule.
    pub idempotency: Idempotency,
    /// The implementation.
    pub kind: FunctionKind,
}

impl Function {
    fn native(
        name: &str,
        min_args: usize,
        max_args: usize,
        idempotency: Idempotency,
        f: NativeFn,
    ) -> Self {
        Self {
            name: name.to_string(),
            min_args,
            max_args,
            first_bound: 0,
            idempotency,
            kind: FunctionKind::Native(f),
        }
    }

    /// Whether this is a built-in, protected from DROP.
    #[must_use]
    pub const fn is_builtin(&self) -> bool {
        matches!(self.kind, FunctionKind::Native(_))
    }

    /// Validates an argument count against the arity bounds.
    pub fn check_arity(&self, got: usize) -> Result<()> {
        if got < self.min_args || got > self.max_args {
            let expected = if self.min_args == self.max_args {
                self.min_args.to_string()
            } else if self.max_args == usize::MAX {
                format!("{}..", self.min_args)
            } else {
                format!("{}..{}", self.min_args, self.max_args)
            };
            return Err(Error::ArityMismatch {
                function: self.name.clone(),
                expected,
                got,
            });
        }
        Ok(())
    }
}

/// The function namespace.
pub struct FunctionRegistry {
    map: HashMap<String, Rc<Function>>,
}

impl FunctionRegistry {
    /// A registry seeded with every built-in.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            map: HashMap::new(),
        };
        aggregate::register(&mut registry);
        datetime::register(&mut registry);
        misc::register(&mut registry);
        string::register(&mut registry);
        registry
    }

    fn add(&mut self, func: Function) {
        self.map.insert(func.name.clone(), Rc::new(func));
    }

    /// Looks up a function by name, case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Rc<Function>> {
        self.map.get(&name.to_uppercase()).cloned()
    }

    /// Registers a user-defined function. The name must be free.
    pub fn create(&mut self, func: Function) -> Result<()> {
        let key = func.name.to_uppercase();
        if self.map.contains_key(&key) {
            return Err(Error::InvalidArgument(format!(
                "function {key} already exists"
            )));
        }
        self.map.insert(key, Rc::new(func));
        Ok(())
    }

    /// Removes a user-defined function. Built-ins cannot be dropped.
    pub fn drop(&mut self, name: &str, if_exists: bool) -> Result<()> {
        let key = name.to_uppercase();
        match self.map.get(&key) {
            Some(func) if func.is_builtin() => Err(Error::InvalidArgument(format!(
                "cannot drop built-in function {key}"
            ))),
            Some(_) => {
                self.map.remove(&key);
                Ok(())
            }
            None if if_exists => Ok(()),
            None => Err(Error::UnboundIdentifier(name.to_string())),
        }
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluates a user-defined function body: declare the parameters in a
/// fresh child of the declaration scope, run the body statements, then
/// the RETURN expression.
pub(crate) fn eval_user(udf: &UserFunction, args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    let scope = udf.scope.child();
    for ((name, ty), arg) in udf.params.iter().zip(args) {
        let value = arg.eval(ctx)?;
        if let Some(got) = value.ty() {
            if !ty.assignable_from(got) {
                return Err(Error::TypeMismatch(format!(
                    "argument {name}: cannot pass {got} as {ty}"
                )));
            }
        }
        scope.declare(name, *ty, value, None)?;
    }
    let inner = EvalCtx {
        row: ctx.row,
        rows: ctx.rows,
        data: ctx.data,
        scope: &scope,
    };
    for statement in &udf.body {
        match statement {
            Statement::Declare { name, ty } => scope.declare(name, *ty, Value::Null, None)?,
            Statement::Set { name, value } => {
                let value = value.eval(&inner)?;
                scope.set(name, value)?;
            }
            _ => {
                return Err(Error::InvalidArgument(
                    "only DECLARE and SET are allowed in a function body".to_string(),
                ))
            }
        }
    }
    udf.ret.eval(&inner)
}

// ── Argument helpers shared by the built-ins ────────────────────────────

pub(crate) fn eval_arg(args: &[Expr], i: usize, ctx: &EvalCtx<'_>) -> Result<Value> {
    args[i].eval(ctx)
}

/// Renders an argument as text; `None` for Null.
pub(crate) fn string_arg(args: &[Expr], i: usize, ctx: &EvalCtx<'_>) -> Result<Option<String>> {
    Ok(match eval_arg(args, i, ctx)? {
        Value::Null => None,
        value => Some(value.to_string()),
    })
}

pub(crate) fn int_arg(args: &[Expr], i: usize, ctx: &EvalCtx<'_>) -> Result<Option<i64>> {
    eval_arg(args, i, ctx)?.int()
}

pub(crate) fn float_arg(args: &[Expr], i: usize, ctx: &EvalCtx<'_>) -> Result<Option<f64>> {
    eval_arg(args, i, ctx)?.float()
}

/// Reads a tag argument: a plain identifier consumed literally instead of
/// being bound, such as DATEDIFF's date-part token.
pub(crate) fn tag_arg<'e>(args: &'e [Expr], i: usize) -> Result<&'e str> {
    match &args[i] {
        Expr::Reference(r) if r.reference.source.is_none() => Ok(&r.reference.column),
        other => Err(Error::InvalidArgument(format!(
            "expected a plain identifier, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let registry = FunctionRegistry::new();
        for name in [
            "AVG", "SUM", "MIN", "MAX", "COUNT", "NULLIF", "FLOOR", "CHAR", "CHARINDEX",
            "CONCAT", "CONCAT_WS", "BASE64ENC", "BASE64DEC", "LEFT", "LEN", "LOWER", "UPPER",
            "LPAD", "LTRIM", "RTRIM", "TRIM", "NCHAR", "REPLICATE", "REVERSE", "RIGHT", "SPACE",
            "STUFF", "SUBSTRING", "UNICODE", "GETDATE", "YEAR", "MONTH", "DAY", "DATEDIFF",
            "HBAR",
        ] {
            assert!(registry.get(name).is_some(), "missing builtin {name}");
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = FunctionRegistry::new();
        assert!(registry.get("lower").is_some());
        assert!(registry.get("Lower").is_some());
    }

    #[test]
    fn test_builtins_are_protected() {
        let mut registry = FunctionRegistry::new();
        assert!(registry.drop("SUM", false).is_err());
        assert!(registry.drop("SUM", true).is_err());
    }

    #[test]
    fn test_drop_if_exists_suppresses_unknown() {
        let mut registry = FunctionRegistry::new();
        assert!(registry.drop("NOPE", false).is_err());
        registry.drop("NOPE", true).unwrap();
    }

    #[test]
    fn test_arity_bounds() {
        let registry = FunctionRegistry::new();
        let substring = registry.get("SUBSTRING").unwrap();
        assert!(substring.check_arity(3).is_ok());
        assert!(matches!(
            substring.check_arity(1),
            Err(Error::ArityMismatch { .. })
        ));

        let getdate = registry.get("GETDATE").unwrap();
        assert!(getdate.check_arity(0).is_ok());
        assert!(getdate.check_arity(1).is_err());
    }

    #[test]
    fn test_datediff_first_bound() {
        let registry = FunctionRegistry::new();
        assert_eq!(registry.get("DATEDIFF").unwrap().first_bound, 1);
        assert_eq!(registry.get("SUM").unwrap().first_bound, 0);
    }

    #[test]
    fn test_getdate_is_volatile_and_aggregates_idempotent() {
        let registry = FunctionRegistry::new();
        assert_eq!(
            registry.get("GETDATE").unwrap().idempotency,
            Idempotency::Volatile
        );
        assert_eq!(
            registry.get("COUNT").unwrap().idempotency,
            Idempotency::Idempotent
        );
        assert_eq!(registry.get("LOWER").unwrap().idempotency, Idempotency::Args);
    }
}
