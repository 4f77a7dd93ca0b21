//! Statement and expression AST, binding and evaluation.

mod expr;
mod stmt;

pub use expr::{
    BinaryOp, BindEnv, CallExpr, CaseBranch, ColumnBinding, ColumnIndex, EvalCtx, Expr, InList,
    JoinRow, RefExpr, UnaryOp,
};
pub use stmt::{FunctionDecl, Statement};
