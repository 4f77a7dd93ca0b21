//! The driver loop.
//!
//! A [`Client`] owns the global scope seeded with the system variables,
//! the function registry and the source loader, executes scripts
//! statement by statement, and renders query results through the
//! [`Tabulator`] seam unless `TERMOUT` is off.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;

use crate::ast::{BindEnv, EvalCtx, Expr, FunctionDecl, Statement};
use crate::error::{Error, Result};
use crate::functions::{Function, FunctionKind, FunctionRegistry, Idempotency, UserFunction};
use crate::parser::Parser;
use crate::scope::{Scope, VerifyFn};
use crate::source::{ColumnSelector, Row, Source};
use crate::source::loader::SourceLoader;
use crate::value::{verify_real_format, Type, Value};

/// External collaborator rendering a result table.
pub trait Tabulator {
    /// The style names assignable to `TABLEFMT`.
    fn styles(&self) -> &[&str];

    /// Renders the rows under the given style.
    fn tabulate(
        &self,
        columns: &[ColumnSelector],
        rows: &[Row],
        style: &str,
        out: &mut dyn Write,
    ) -> Result<()>;
}

/// A tabulator that renders nothing; handy when only `INTO` bindings or
/// side effects matter.
#[derive(Debug, Default)]
pub struct NullTabulator;

impl Tabulator for NullTabulator {
    fn styles(&self) -> &[&str] {
        &["uc"]
    }

    fn tabulate(
        &self,
        _columns: &[ColumnSelector],
        _rows: &[Row],
        _style: &str,
        _out: &mut dyn Write,
    ) -> Result<()> {
        Ok(())
    }
}

/// The statement loop: global scope, system variables and output gating.
pub struct Client {
    scope: Scope,
    functions: Rc<RefCell<FunctionRegistry>>,
    loader: Rc<dyn SourceLoader>,
    tabulator: Box<dyn Tabulator>,
    out: Box<dyn Write>,
}

impl Client {
    /// Creates a client whose top scope is seeded with the system
    /// variables; `args` becomes `ARGS`.
    pub fn new(
        loader: Rc<dyn SourceLoader>,
        tabulator: Box<dyn Tabulator>,
        out: Box<dyn Write>,
        args: Vec<String>,
    ) -> Self {
        let scope = Scope::new();
        seed_system_variables(&scope, tabulator.as_ref(), args);
        Self {
            scope,
            functions: Rc::new(RefCell::new(FunctionRegistry::new())),
            loader,
            tabulator,
            out,
        }
    }

    /// The global scope.
    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Executes a script. The first error terminates the script.
    pub fn execute(&mut self, source: &str, input: &str) -> Result<()> {
        let mut parser = Parser::new(
            source,
            input,
            self.scope.clone(),
            self.functions.clone(),
            self.loader.clone(),
        )?;
        while let Some(statement) = parser.parse()? {
            self.execute_statement(statement)?;
        }
        Ok(())
    }

    fn execute_statement(&mut self, statement: Statement) -> Result<()> {
        match statement {
            Statement::Declare { name, ty } => {
                tracing::debug!(name = %name, ty = %ty, "declare");
                self.scope.declare(&name, ty, Value::Null, None)
            }
            Statement::Set { name, value } => {
                self.bind_statement_expr(&value)?;
                let value = value.eval(&EvalCtx::statement(&self.scope))?;
                self.scope.set(&name, value)
            }
            Statement::Print { values } => {
                let mut rendered = Vec::with_capacity(values.len());
                for value in &values {
                    self.bind_statement_expr(value)?;
                    rendered.push(value.eval(&EvalCtx::statement(&self.scope))?.to_string());
                }
                writeln!(self.out, "{}", rendered.join(" "))?;
                Ok(())
            }
            Statement::CreateFunction(decl) => self.create_function(decl),
            Statement::DropFunction { name, if_exists } => {
                tracing::debug!(name = %name, "drop function");
                self.functions.borrow_mut().drop(&name, if_exists)
            }
            Statement::Query(query) => {
                let rows = query.get()?;
                if let Some(name) = &query.into {
                    self.scope.declare(
                        name,
                        Type::Table,
                        Value::Table(query.clone() as Rc<dyn Source>),
                        None,
                    )?;
                }
                if self.termout() {
                    let columns = query.columns()?;
                    let style = self.tablefmt();
                    self.tabulator
                        .tabulate(&columns, &rows, &style, &mut self.out)?;
                }
                Ok(())
            }
        }
    }

    fn bind_statement_expr(&self, expr: &Expr) -> Result<()> {
        let registry = self.functions.borrow();
        let env = BindEnv {
            columns: &HashMap::new(),
            scope: &self.scope,
            functions: &registry,
        };
        expr.bind(&env)
    }

    fn create_function(&mut self, decl: FunctionDecl) -> Result<()> {
        // Bind the body in a throwaway child scope that pre-declares the
        // arguments; each call later evaluates in its own fresh child.
        let bind_scope = self.scope.child();
        for (param, ty) in &decl.params {
            bind_scope.declare(param, *ty, Value::Null, None)?;
        }
        {
            let registry = self.functions.borrow();
            let env = BindEnv {
                columns: &HashMap::new(),
                scope: &bind_scope,
                functions: &registry,
            };
            for statement in &decl.body {
                match statement {
                    Statement::Declare { name, ty } => {
                        bind_scope.declare(name, *ty, Value::Null, None)?;
                    }
                    Statement::Set { value, .. } => value.bind(&env)?,
                    _ => {
                        return Err(Error::InvalidArgument(
                            "only DECLARE and SET are allowed in a function body".to_string(),
                        ))
                    }
                }
            }
            decl.ret.bind(&env)?;
        }

        let arity = decl.params.len();
        tracing::debug!(name = %decl.name, arity, "create function");
        self.functions.borrow_mut().create(Function {
            name: decl.name.to_uppercase(),
            min_args: arity,
            max_args: arity,
            first_bound: 0,
            idempotency: Idempotency::Args,
            kind: FunctionKind::User(UserFunction {
                params: decl.params,
                returns: decl.returns,
                body: decl.body,
                ret: decl.ret,
                scope: self.scope.clone(),
            }),
        })
    }

    fn termout(&self) -> bool {
        matches!(self.scope.get("TERMOUT"), Some(Value::Bool(true)))
    }

    fn tablefmt(&self) -> String {
        match self.scope.get("TABLEFMT") {
            Some(Value::String(style)) => style,
            _ => "uc".to_string(),
        }
    }
}

fn seed_system_variables(scope: &Scope, tabulator: &dyn Tabulator, args: Vec<String>) {
    let verify_realfmt: VerifyFn = Rc::new(|name, _, value| match value {
        Value::String(fmt) if verify_real_format(fmt) => Ok(()),
        Value::String(fmt) => Err(Error::InvalidArgument(format!(
            "{name}: '{fmt}' is not a float format"
        ))),
        _ => Ok(()),
    });
    let styles: Vec<String> = tabulator.styles().iter().map(|s| (*s).to_string()).collect();
    let verify_tablefmt: VerifyFn = Rc::new(move |name, _, value| match value {
        Value::String(style) if styles.iter().any(|s| s == style) => Ok(()),
        Value::String(style) => Err(Error::InvalidArgument(format!(
            "{name}: unknown table style '{style}'"
        ))),
        _ => Ok(()),
    });

    // The root scope is fresh; these declarations cannot collide.
    let _ = scope.declare(
        "REALFMT",
        Type::String,
        Value::String("%g".to_string()),
        Some(verify_realfmt),
    );
    let _ = scope.declare(
        "TABLEFMT",
        Type::String,
        Value::String("uc".to_string()),
        Some(verify_tablefmt),
    );
    let _ = scope.declare("TERMOUT", Type::Bool, Value::Bool(true), None);
    let _ = scope.declare(
        "ARGS",
        Type::Array,
        Value::Array(args.into_iter().map(Value::String).collect()),
        None,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::loader::NullLoader;

    fn client() -> Client {
        Client::new(
            Rc::new(NullLoader),
            Box::new(NullTabulator),
            Box::new(std::io::sink()),
            vec!["one".to_string(), "two".to_string()],
        )
    }

    #[test]
    fn test_system_variables_seeded() {
        let client = client();
        assert_eq!(
            client.scope().get("REALFMT"),
            Some(Value::String("%g".into()))
        );
        assert_eq!(
            client.scope().get("TABLEFMT"),
            Some(Value::String("uc".into()))
        );
        assert_eq!(client.scope().get("TERMOUT"), Some(Value::Bool(true)));
        let Some(Value::Array(args)) = client.scope().get("ARGS") else {
            panic!("ARGS missing");
        };
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_realfmt_verify() {
        let mut client = client();
        client.execute("t", "SET REALFMT = '%.3f';").unwrap();
        assert!(client.execute("t", "SET REALFMT = 'oops';").is_err());
        assert_eq!(
            client.scope().get("REALFMT"),
            Some(Value::String("%.3f".into()))
        );
    }

    #[test]
    fn test_tablefmt_verify() {
        let mut client = client();
        assert!(client.execute("t", "SET TABLEFMT = 'nope';").is_err());
        client.execute("t", "SET TABLEFMT = 'uc';").unwrap();
    }

    #[test]
    fn test_termout_type_checked() {
        let mut client = client();
        assert!(client.execute("t", "SET TERMOUT = 'on';").is_err());
        client.execute("t", "SET TERMOUT = FALSE;").unwrap();
        assert_eq!(client.scope().get("TERMOUT"), Some(Value::Bool(false)));
    }

    #[test]
    fn test_declare_set_round_trip() {
        let mut client = client();
        client
            .execute("t", "DECLARE x INTEGER; SET x = 40 + 2;")
            .unwrap();
        assert_eq!(client.scope().get("x"), Some(Value::Int(42)));
    }

    #[test]
    fn test_print_writes_rendered_values() {
        let buffer = Rc::new(RefCell::new(Vec::<u8>::new()));
        struct SharedWriter(Rc<RefCell<Vec<u8>>>);
        impl Write for SharedWriter {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.borrow_mut().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let mut client = Client::new(
            Rc::new(NullLoader),
            Box::new(NullTabulator),
            Box::new(SharedWriter(buffer.clone())),
            Vec::new(),
        );
        client.execute("t", "PRINT 'total', 1 + 2;").unwrap();
        assert_eq!(String::from_utf8(buffer.borrow().clone()).unwrap(), "total 3\n");
    }

    #[test]
    fn test_error_aborts_script() {
        let mut client = client();
        let err = client
            .execute("t", "DECLARE x INTEGER; SET x = 1 / 0; SET x = 5;")
            .unwrap_err();
        assert!(matches!(err, Error::DivisionByZero));
        // The statement after the failure never ran.
        assert_eq!(client.scope().get("x"), Some(Value::Null));
    }
}
