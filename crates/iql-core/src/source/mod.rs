//! The uniform row-of-values abstraction every input materializes into.
//!
//! CSV, JSON and HTML adapters, and queries themselves, all implement
//! [`Source`]: a column schema plus a cached row set. Cells ingested from
//! documents stay raw text and are typed lazily on read.

pub mod csv;
pub mod html;
pub mod json;
pub mod loader;

use std::fmt;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::value::{Type, Value};

/// A materializer of rows exposing a column schema. Rows are materialized
/// lazily on the first [`Source::get`] and cached; a source is an
/// immutable snapshot once evaluated.
pub trait Source {
    /// The column schema, in output order. Forces materialization for
    /// sources whose columns are only known after evaluation.
    fn columns(&self) -> Result<Vec<ColumnSelector>>;

    /// The cached row set.
    fn get(&self) -> Result<Rc<Vec<Row>>>;
}

/// An ordered sequence of columns.
pub type Row = Vec<Column>;

/// One cell of a row.
///
/// Adapters produce raw [`Column::Text`] cells (or [`Column::Multi`] for
/// HTML multi-matches) that parse on demand; query projection produces
/// [`Column::Typed`] cells carrying both the value and its rendered text.
#[derive(Debug, Clone)]
pub enum Column {
    /// An absent value.
    Null,
    /// An evaluated value with its rendered text.
    Typed {
        /// The projected value.
        value: Value,
        /// The text the tabulator prints, `REALFMT` already applied.
        text: String,
    },
    /// A raw text cell, typed on read.
    Text(String),
    /// An HTML multi-match cell. Boolean, int and float reads fail;
    /// the string rendering is `[a b c]`.
    Multi(Vec<String>),
}

impl Column {
    /// Reads the cell as a value of the given declared type.
    ///
    /// Empty raw cells read as `Null` for every type but `String`; this is
    /// the locally recovered condition, not an error.
    pub fn value(&self, ty: Type) -> Result<Value> {
        match self {
            Self::Null => Ok(Value::Null),
            Self::Typed { value, .. } => Ok(value.clone()),
            Self::Text(s) => {
                if s.is_empty() && ty != Type::String {
                    return Ok(Value::Null);
                }
                match ty {
                    Type::Bool => Value::String(s.clone()).bool().map(|b| match b {
                        Some(v) => Value::Bool(v),
                        None => Value::Null,
                    }),
                    Type::Int => s
                        .parse::<i64>()
                        .map(Value::Int)
                        .map_err(|_| Error::InvalidArgument(format!("'{s}' used as int"))),
                    Type::Float => s
                        .parse::<f64>()
                        .map(Value::Float)
                        .map_err(|_| Error::InvalidArgument(format!("'{s}' used as float"))),
                    Type::Date => crate::value::parse_date(s)
                        .map(Value::Date)
                        .ok_or_else(|| Error::InvalidArgument(format!("'{s}' used as date"))),
                    Type::String => Ok(Value::String(s.clone())),
                    Type::Array | Type::Table => Err(Error::UnsupportedCast {
                        from: Type::String,
                        to: ty,
                    }),
                }
            }
            Self::Multi(items) => {
                if ty == Type::String {
                    Ok(Value::String(bracket_join(items)))
                } else {
                    Err(Error::InvalidArgument(format!(
                        "{} used as {ty}",
                        bracket_join(items)
                    )))
                }
            }
        }
    }

    /// The text a renderer prints for this cell. Empty raw cells of
    /// non-String columns render as `NULL`.
    #[must_use]
    pub fn render(&self, ty: Type) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Typed { text, .. } => text.clone(),
            Self::Text(s) if s.is_empty() && ty != Type::String => "NULL".to_string(),
            Self::Text(s) => s.clone(),
            Self::Multi(items) => bracket_join(items),
        }
    }
}

fn bracket_join(items: &[String]) -> String {
    format!("[{}]", items.join(" "))
}

/// A column reference: optional source qualifier plus a column name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    /// FROM alias, when qualified.
    pub source: Option<String>,
    /// Column name (or adapter selector: CSS selector, JSON path, index).
    pub column: String,
}

impl Reference {
    /// An unqualified reference.
    #[must_use]
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            source: None,
            column: column.into(),
        }
    }

    /// A reference qualified with a FROM alias.
    #[must_use]
    pub fn qualified(source: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            column: column.into(),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{src}.{}", self.column),
            None => f.write_str(&self.column),
        }
    }
}

/// A source column: reference, display alias and the running cell type.
#[derive(Debug, Clone)]
pub struct ColumnSelector {
    /// What the column is called in the source document.
    pub name: Reference,
    /// Display alias, when one was given.
    pub alias: Option<String>,
    /// The maximum type seen across all cells, capped at `String`.
    pub ty: Type,
}

impl ColumnSelector {
    /// A selector with the lowest running type.
    #[must_use]
    pub fn new(name: Reference) -> Self {
        Self {
            name,
            alias: None,
            ty: Type::Bool,
        }
    }

    /// The name the column renders under: the alias when present, else the
    /// column part of the reference.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name.column)
    }

    /// Whether the column reaches the output. A column is public when its
    /// rendered name is empty or starts with anything but a lowercase
    /// letter or `,`.
    #[must_use]
    pub fn is_public(&self) -> bool {
        match self.display_name().chars().next() {
            None => true,
            Some(',') => false,
            Some(c) => !c.is_lowercase(),
        }
    }

    /// Folds one raw cell into the running column type. Empty cells leave
    /// the type unchanged.
    pub fn resolve_string(&mut self, cell: &str) {
        if let Some(ty) = infer_type(cell) {
            self.ty = self.ty.max(ty).min(Type::String);
        }
    }

    /// Raises the running type to at least `ty`.
    pub fn resolve_type(&mut self, ty: Type) {
        self.ty = self.ty.max(ty).min(Type::String);
    }
}

/// Classifies a cell by the least type that accepts it, walking the
/// Bool → Int → Float → String ladder. Empty cells classify as nothing.
#[must_use]
pub fn infer_type(cell: &str) -> Option<Type> {
    if cell.is_empty() {
        return None;
    }
    if cell.eq_ignore_ascii_case("true") || cell.eq_ignore_ascii_case("false") {
        return Some(Type::Bool);
    }
    if cell.parse::<i64>().is_ok() {
        return Some(Type::Int);
    }
    if cell.parse::<f64>().is_ok() {
        return Some(Type::Float);
    }
    Some(Type::String)
}
