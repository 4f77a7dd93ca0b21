//! The HTML format adapter.
//!
//! The FROM clause FILTER is a CSS selector picking the row nodes; every
//! column reference is a CSS selector applied within the row subtree.
//! Zero matches yield an empty cell, one match its trimmed text, and
//! several matches a string-array cell.

use std::rc::Rc;

use scraper::{ElementRef, Html, Selector};

use crate::error::{Error, Result};
use crate::source::{Column, ColumnSelector, Reference, Row, Source};

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::FilterOption(format!("{css}: {e}")))
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// An HTML document set materialized as a [`Source`].
#[derive(Debug)]
pub struct HtmlSource {
    selectors: Vec<ColumnSelector>,
    rows: Rc<Vec<Row>>,
}

impl HtmlSource {
    /// Parses the byte streams, selects row nodes with the filter, and
    /// applies every column selector to each row subtree.
    pub fn new(streams: &[Vec<u8>], filter: &str, selected: &[String]) -> Result<Self> {
        if filter.is_empty() {
            return Err(Error::FilterOption(
                "an HTML source requires a row selector".to_string(),
            ));
        }
        let row_selector = parse_selector(filter)?;
        let column_selectors: Vec<Selector> = selected
            .iter()
            .map(|css| parse_selector(css))
            .collect::<Result<_>>()?;
        let mut selectors: Vec<ColumnSelector> = selected
            .iter()
            .map(|css| ColumnSelector::new(Reference::new(css.clone())))
            .collect();

        let mut rows = Vec::new();
        for stream in streams {
            let document = Html::parse_document(&String::from_utf8_lossy(stream));
            for row_node in document.select(&row_selector) {
                let mut row = Row::with_capacity(selectors.len());
                for (selector, css) in selectors.iter_mut().zip(&column_selectors) {
                    let mut matches: Vec<String> =
                        row_node.select(css).map(element_text).collect();
                    let cell = match matches.len() {
                        0 => Column::Text(String::new()),
                        1 => {
                            let text = matches.pop().unwrap_or_default();
                            selector.resolve_string(&text);
                            Column::Text(text)
                        }
                        _ => {
                            selector.resolve_type(crate::value::Type::String);
                            Column::Multi(matches)
                        }
                    };
                    row.push(cell);
                }
                rows.push(row);
            }
        }

        tracing::debug!(
            columns = selectors.len(),
            rows = rows.len(),
            "materialized HTML source"
        );
        Ok(Self {
            selectors,
            rows: Rc::new(rows),
        })
    }

    /// Diagnostic helper: the trimmed text of every row the filter picks.
    pub fn select_text(data: &[u8], filter: &str) -> Result<Vec<String>> {
        let row_selector = parse_selector(filter)?;
        let document = Html::parse_document(&String::from_utf8_lossy(data));
        Ok(document.select(&row_selector).map(element_text).collect())
    }
}

impl Source for HtmlSource {
    fn columns(&self) -> Result<Vec<ColumnSelector>> {
        Ok(self.selectors.clone())
    }

    fn get(&self) -> Result<Rc<Vec<Row>>> {
        Ok(self.rows.clone())
    }
}
