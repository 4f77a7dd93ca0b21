//! The JSON format adapter.
//!
//! Documents parse into dynamic `serde_json` values; the FROM clause
//! FILTER is a path-style selector producing the match objects, and each
//! column reference is a path applied within a match.

use std::rc::Rc;

use serde_json::Value as Json;

use crate::error::{Error, Result};
use crate::source::{Column, ColumnSelector, Reference, Row, Source};

/// A parsed path selector: dot-separated segments with bracketed indices
/// and glob segments, e.g. `.quotes.*` or `data[0].items`.
#[derive(Debug, Clone)]
pub struct PathSelector {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone)]
enum Segment {
    Key(String),
    Glob,
    Index(usize),
    IndexGlob,
}

impl PathSelector {
    /// Parses a selector. The empty string selects the document root.
    pub fn parse(path: &str) -> Result<Self> {
        let mut segments = Vec::new();
        for part in path.split('.') {
            if part.is_empty() {
                continue;
            }
            let (head, brackets) = match part.split_once('[') {
                Some((head, rest)) => (head, Some(rest)),
                None => (part, None),
            };
            match head {
                "" => {}
                "*" => segments.push(Segment::Glob),
                key => segments.push(Segment::Key(key.to_string())),
            }
            if let Some(brackets) = brackets {
                for idx in brackets.split('[') {
                    let idx = idx
                        .strip_suffix(']')
                        .ok_or_else(|| Error::FilterOption(path.to_string()))?;
                    if idx == "*" {
                        segments.push(Segment::IndexGlob);
                    } else {
                        let n = idx
                            .parse()
                            .map_err(|_| Error::FilterOption(path.to_string()))?;
                        segments.push(Segment::Index(n));
                    }
                }
            }
        }
        Ok(Self { segments })
    }

    /// Applies the selector, returning every match in document order.
    #[must_use]
    pub fn select<'a>(&self, root: &'a Json) -> Vec<&'a Json> {
        let mut matches = vec![root];
        for segment in &self.segments {
            let mut next = Vec::new();
            for value in matches {
                match segment {
                    Segment::Key(key) => {
                        if let Some(v) = value.get(key) {
                            next.push(v);
                        }
                    }
                    Segment::Glob => match value {
                        Json::Object(map) => next.extend(map.values()),
                        Json::Array(items) => next.extend(items.iter()),
                        _ => {}
                    },
                    Segment::Index(n) => {
                        if let Some(v) = value.get(n) {
                            next.push(v);
                        }
                    }
                    Segment::IndexGlob => {
                        if let Json::Array(items) = value {
                            next.extend(items.iter());
                        }
                    }
                }
            }
            matches = next;
        }
        matches
    }
}

/// Renders a JSON value the way a cell reads: bare scalars unquoted,
/// null empty, and containers re-serialized.
fn render(value: &Json) -> String {
    match value {
        Json::Null => String::new(),
        Json::Bool(b) => b.to_string(),
        Json::Number(n) => n.to_string(),
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A JSON document set materialized as a [`Source`].
#[derive(Debug)]
pub struct JsonSource {
    selectors: Vec<ColumnSelector>,
    rows: Rc<Vec<Row>>,
}

impl JsonSource {
    /// Parses the byte streams, applies the filter selector, and extracts
    /// one row per match. Without explicit column selectors the first
    /// match object's keys become the columns, in sorted order.
    pub fn new(streams: &[Vec<u8>], filter: &str, selected: &[String]) -> Result<Self> {
        let path = PathSelector::parse(filter)?;

        let mut documents = Vec::new();
        for stream in streams {
            let doc: Json = serde_json::from_slice(stream)
                .map_err(|e| Error::Format(format!("invalid JSON: {e}")))?;
            documents.push(doc);
        }

        let mut names: Vec<String> = selected.to_vec();
        if names.is_empty() {
            if let Some(first) = documents.iter().flat_map(|d| path.select(d)).next() {
                if let Json::Object(map) = first {
                    names = map.keys().cloned().collect();
                    names.sort();
                }
            }
        }

        let column_paths: Vec<PathSelector> = names
            .iter()
            .map(|name| PathSelector::parse(name))
            .collect::<Result<_>>()?;
        let mut selectors: Vec<ColumnSelector> = names
            .iter()
            .map(|name| ColumnSelector::new(Reference::new(name.clone())))
            .collect();

        let mut rows = Vec::new();
        for doc in &documents {
            for matched in path.select(doc) {
                let mut row = Row::with_capacity(selectors.len());
                for (selector, column_path) in selectors.iter_mut().zip(&column_paths) {
                    let cell = column_path
                        .select(matched)
                        .first()
                        .map(|v| render(v).trim().to_string())
                        .unwrap_or_default();
                    selector.resolve_string(&cell);
                    row.push(Column::Text(cell));
                }
                rows.push(row);
            }
        }

        tracing::debug!(
            columns = selectors.len(),
            rows = rows.len(),
            "materialized JSON source"
        );
        Ok(Self {
            selectors,
            rows: Rc::new(rows),
        })
    }

    /// Diagnostic helper: the rendered text of every filter match.
    pub fn select_text(data: &[u8], filter: &str) -> Result<Vec<String>> {
        let path = PathSelector::parse(filter)?;
        let doc: Json =
            serde_json::from_slice(data).map_err(|e| Error::Format(format!("invalid JSON: {e}")))?;
        Ok(path.select(&doc).into_iter().map(|v| v.to_string()).collect())
    }
}

impl Source for JsonSource {
    fn columns(&self) -> Result<Vec<ColumnSelector>> {
        Ok(self.selectors.clone())
    }

    fn get(&self) -> Result<Rc<Vec<Row>>> {
        Ok(self.rows.clone())
    }
}
