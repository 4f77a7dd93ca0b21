//! The terminal tabulator, built on `tabled`.
//!
//! String-typed columns left-align, everything else right-aligns; NULL
//! cells render as `NULL`.

use std::io::Write;

use tabled::builder::Builder;
use tabled::settings::object::Columns;
use tabled::settings::{Alignment, Modify, Style};

use iql_core::{ColumnSelector, Result, Row, Tabulator, Type};

/// The style names `-t` and `TABLEFMT` accept.
pub const STYLES: [&str; 4] = ["uc", "ascii", "plain", "markdown"];

/// Renders result tables in one of the [`STYLES`].
#[derive(Debug, Default)]
pub struct TabledTabulator;

impl Tabulator for TabledTabulator {
    fn styles(&self) -> &[&str] {
        &STYLES
    }

    fn tabulate(
        &self,
        columns: &[ColumnSelector],
        rows: &[Row],
        style: &str,
        out: &mut dyn Write,
    ) -> Result<()> {
        let mut builder = Builder::default();
        builder.push_record(columns.iter().map(ColumnSelector::display_name));
        for row in rows {
            builder.push_record(
                row.iter()
                    .zip(columns)
                    .map(|(cell, selector)| cell.render(selector.ty)),
            );
        }

        let mut table = builder.build();
        match style {
            "ascii" => {
                table.with(Style::ascii());
            }
            "plain" => {
                table.with(Style::blank());
            }
            "markdown" => {
                table.with(Style::markdown());
            }
            _ => {
                table.with(Style::modern());
            }
        }
        for (i, selector) in columns.iter().enumerate() {
            let alignment = if selector.ty == Type::String {
                Alignment::left()
            } else {
                Alignment::right()
            };
            table.with(Modify::new(Columns::single(i)).with(alignment));
        }

        writeln!(out, "{table}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iql_core::source::Reference;
    use iql_core::{Column, Value};

    fn columns() -> Vec<ColumnSelector> {
        let mut name = ColumnSelector::new(Reference::new("Name"));
        name.ty = Type::String;
        let mut count = ColumnSelector::new(Reference::new("Count"));
        count.ty = Type::Int;
        vec![name, count]
    }

    fn rows() -> Vec<Row> {
        vec![
            vec![
                Column::Typed {
                    value: Value::String("xs".into()),
                    text: "xs".into(),
                },
                Column::Typed {
                    value: Value::Int(9),
                    text: "9".into(),
                },
            ],
            vec![
                Column::Typed {
                    value: Value::String("s".into()),
                    text: "s".into(),
                },
                Column::Null,
            ],
        ]
    }

    fn render(style: &str) -> String {
        let mut out = Vec::new();
        TabledTabulator
            .tabulate(&columns(), &rows(), style, &mut out)
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_cells_and_null_rendering() {
        let out = render("ascii");
        assert!(out.contains("Name"));
        assert!(out.contains("Count"));
        assert!(out.contains("xs"));
        assert!(out.contains("NULL"));
    }

    #[test]
    fn test_unicode_style_draws_box_borders() {
        let out = render("uc");
        assert!(out.contains('│'));
    }

    #[test]
    fn test_markdown_style() {
        let out = render("markdown");
        assert!(out.contains('|'));
        assert!(!out.contains('│'));
    }
}
