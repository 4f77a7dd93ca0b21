//! # iql-core
//!
//! An interactive SQL-dialect engine that treats Internet-hosted
//! documents — CSV, JSON and HTML — as queryable tables.
//!
//! A script declares variables, binds URLs, composes SELECT statements
//! and renders tabulated results. The pipeline is conventional: lexer →
//! parser → expression AST bound over a layered name scope → source
//! adapters that materialize tabular rows → an evaluator that executes
//! the nested-loop join, filter, group, aggregate, order and limit
//! stages. A coercing value algebra (bool, int, float, date, string,
//! null, table) unifies the heterogeneous textual inputs.
//!
//! Network fetching, filesystem globbing and terminal tabulation are
//! external collaborators behind the [`SourceLoader`] and [`Tabulator`]
//! seams; `data:` URIs resolve inside the core, so the whole engine runs
//! — and is tested — without either.
//!
//! ```
//! use std::rc::Rc;
//! use iql_core::{Client, NullTabulator};
//! use iql_core::source::loader::NullLoader;
//!
//! let mut client = Client::new(
//!     Rc::new(NullLoader),
//!     Box::new(NullTabulator),
//!     Box::new(std::io::sink()),
//!     Vec::new(),
//! );
//! client
//!     .execute("demo", "SELECT Name, Count INTO result FROM 'data:text/csv,Name,Count\nxs,9' AS t;")
//!     .unwrap();
//! ```

pub mod ast;
pub mod client;
pub mod error;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod query;
pub mod scope;
pub mod source;
pub mod value;

pub use client::{Client, NullTabulator, Tabulator};
pub use error::{Error, Pos, Result};
pub use parser::Parser;
pub use query::Query;
pub use scope::Scope;
pub use source::loader::SourceLoader;
pub use source::{Column, ColumnSelector, Row, Source};
pub use value::{Type, Value};
