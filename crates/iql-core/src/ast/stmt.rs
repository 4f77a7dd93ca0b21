//! Top-level statements.

use std::fmt;
use std::rc::Rc;

use crate::ast::Expr;
use crate::query::Query;
use crate::value::Type;

/// A parsed statement: either side-effecting, or a query.
pub enum Statement {
    /// `DECLARE name TYPE`
    Declare {
        /// Binding name.
        name: String,
        /// Declared type.
        ty: Type,
    },
    /// `SET name = expr`
    Set {
        /// Binding name.
        name: String,
        /// The value expression.
        value: Expr,
    },
    /// `PRINT expr {, expr}`
    Print {
        /// The values to render.
        values: Vec<Expr>,
    },
    /// `CREATE FUNCTION …`
    CreateFunction(FunctionDecl),
    /// `DROP FUNCTION [IF EXISTS] name`
    DropFunction {
        /// Function name.
        name: String,
        /// Suppress the unknown-name error.
        if_exists: bool,
    },
    /// A SELECT query.
    Query(Rc<Query>),
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Declare { name, ty } => {
                f.debug_struct("Declare").field("name", name).field("ty", ty).finish()
            }
            Self::Set { name, value } => f
                .debug_struct("Set")
                .field("name", name)
                .field("value", value)
                .finish(),
            Self::Print { values } => f.debug_struct("Print").field("values", values).finish(),
            Self::CreateFunction(decl) => f.debug_tuple("CreateFunction").field(decl).finish(),
            Self::DropFunction { name, if_exists } => f
                .debug_struct("DropFunction")
                .field("name", name)
                .field("if_exists", if_exists)
                .finish(),
            Self::Query(_) => write!(f, "Query(..)"),
        }
    }
}

/// A `CREATE FUNCTION` declaration.
#[derive(Debug)]
pub struct FunctionDecl {
    /// Function name.
    pub name: String,
    /// Parameter names and types.
    pub params: Vec<(String, Type)>,
    /// Declared return type.
    pub returns: Type,
    /// Body statements preceding RETURN; DECLARE and SET only.
    pub body: Vec<Statement>,
    /// The RETURN expression.
    pub ret: Expr,
}
