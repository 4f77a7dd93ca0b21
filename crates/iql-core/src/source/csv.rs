//! The CSV format adapter.
//!
//! Record-level parsing is delegated to the `csv` crate; this module maps
//! header names (or 0-based indices in `noheaders` mode) to record fields
//! and types cells incrementally.

use std::rc::Rc;

use crate::error::{Error, Result};
use crate::source::{Column, ColumnSelector, Reference, Row, Source};

/// Options accepted in a CSV FROM clause FILTER string, as a
/// whitespace-separated list of `key` flags and `key=value` pairs.
#[derive(Debug, Clone, Default)]
pub struct CsvOptions {
    /// The input has no header row; selectors are 0-based indices.
    pub noheaders: bool,
    /// Keep the space following a delimiter instead of trimming it.
    pub keep_leading_space: bool,
    /// Drop the first N records after parsing.
    pub skip: usize,
    /// Field delimiter override.
    pub comma: Option<char>,
    /// Comment rune; lines starting with it are skipped.
    pub comment: Option<char>,
    /// Synthetic leading header columns patching malformed files. Also
    /// disables the same-arity check.
    pub prepend_headers: Vec<String>,
}

impl CsvOptions {
    /// Parses a FILTER string. Unknown keys are an error.
    pub fn parse(filter: &str) -> Result<Self> {
        let mut opts = Self::default();
        for token in filter.split_whitespace() {
            match token.split_once('=') {
                None => match token {
                    "noheaders" => opts.noheaders = true,
                    "keep-leading-space" => opts.keep_leading_space = true,
                    _ => return Err(Error::FilterOption(token.to_string())),
                },
                Some(("skip", v)) => {
                    opts.skip = v
                        .parse()
                        .map_err(|_| Error::FilterOption(format!("skip={v}")))?;
                }
                Some(("comma", v)) => opts.comma = Some(option_rune("comma", v)?),
                Some(("comment", v)) => opts.comment = Some(option_rune("comment", v)?),
                Some(("prepend-headers", v)) => {
                    opts.prepend_headers = v.split(',').map(str::to_string).collect();
                }
                Some((k, _)) => return Err(Error::FilterOption(k.to_string())),
            }
        }
        Ok(opts)
    }
}

fn option_rune(key: &str, value: &str) -> Result<char> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() => Ok(c),
        _ => Err(Error::FilterOption(format!("{key}={value}"))),
    }
}

/// A CSV document set materialized as a [`Source`].
#[derive(Debug)]
pub struct CsvSource {
    selectors: Vec<ColumnSelector>,
    rows: Rc<Vec<Row>>,
}

impl CsvSource {
    /// Parses the byte streams under the given filter options, selecting
    /// the named columns first and appending the remaining ones so that
    /// `SELECT *` works.
    pub fn new(streams: &[Vec<u8>], filter: &str, selected: &[String]) -> Result<Self> {
        let opts = CsvOptions::parse(filter)?;

        let mut headers: Option<Vec<String>> = None;
        let mut data: Vec<Vec<csv::StringRecord>> = Vec::new();
        for (i, stream) in streams.iter().enumerate() {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .flexible(!opts.prepend_headers.is_empty())
                .delimiter(opts.comma.map_or(b',', |c| c as u8))
                .comment(opts.comment.map(|c| c as u8))
                .from_reader(stream.as_slice());
            let mut records = Vec::new();
            for record in reader.records() {
                records.push(record.map_err(|e| Error::Format(e.to_string()))?);
            }
            let mut records = records.into_iter();
            if !opts.noheaders {
                if let Some(header) = records.next() {
                    if i == 0 {
                        let mut names = opts.prepend_headers.clone();
                        names.extend(header.iter().map(|f| f.trim().to_string()));
                        headers = Some(names);
                    }
                }
            }
            data.push(records.skip(opts.skip).collect());
        }

        let arity = data
            .first()
            .and_then(|records| records.first())
            .map_or(0, csv::StringRecord::len) as i64;

        let mut selectors = Vec::new();
        let mut indices: Vec<i64> = Vec::new();
        match &headers {
            Some(names) => {
                for name in selected {
                    let idx = names
                        .iter()
                        .position(|n| n == name)
                        .ok_or_else(|| Error::UnknownColumn(name.clone()))?;
                    selectors.push(ColumnSelector::new(Reference::new(name.clone())));
                    indices.push(idx as i64);
                }
                for (idx, name) in names.iter().enumerate() {
                    if !selected.contains(name) {
                        selectors.push(ColumnSelector::new(Reference::new(name.clone())));
                        indices.push(idx as i64);
                    }
                }
            }
            None => {
                let mut resolved = Vec::new();
                for name in selected {
                    let idx: i64 = name
                        .parse()
                        .map_err(|_| Error::UnknownColumn(name.clone()))?;
                    selectors.push(ColumnSelector::new(Reference::new(name.clone())));
                    indices.push(idx);
                    resolved.push(if idx < 0 { arity + idx } else { idx });
                }
                for idx in 0..arity {
                    if !resolved.contains(&idx) {
                        selectors.push(ColumnSelector::new(Reference::new(idx.to_string())));
                        indices.push(idx);
                    }
                }
            }
        }

        let mut rows = Vec::new();
        for records in &data {
            for record in records {
                let mut row = Row::with_capacity(indices.len());
                for (selector, &idx) in selectors.iter_mut().zip(&indices) {
                    let cell = field(record, idx, opts.keep_leading_space);
                    selector.resolve_string(cell);
                    row.push(Column::Text(cell.to_string()));
                }
                rows.push(row);
            }
        }

        tracing::debug!(
            columns = selectors.len(),
            rows = rows.len(),
            "materialized CSV source"
        );
        Ok(Self {
            selectors,
            rows: Rc::new(rows),
        })
    }
}

/// Fetches a record field. Out-of-range positive indices substitute an
/// empty string; negative indices count from the end.
fn field(record: &csv::StringRecord, idx: i64, keep_leading_space: bool) -> &str {
    let len = record.len() as i64;
    let idx = if idx < 0 { len + idx } else { idx };
    if idx < 0 || idx >= len {
        return "";
    }
    let cell = record.get(idx as usize).unwrap_or("");
    if keep_leading_space {
        cell
    } else {
        cell.trim_start()
    }
}

impl Source for CsvSource {
    fn columns(&self) -> Result<Vec<ColumnSelector>> {
        Ok(self.selectors.clone())
    }

    fn get(&self) -> Result<Rc<Vec<Row>>> {
        Ok(self.rows.clone())
    }
}
