//! Tabular files: workbooks via `calamine`, CSV via the `csv` reader.
//!
//! Both render one line per non-empty row, cells joined by ` | `. Workbooks add
//! a `=== Sheet: <name> ===` header per sheet.

use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto};
use tracing::debug;

use crate::ExtractFailure;
use crate::text::decode_bytes;

const CELL_SEPARATOR: &str = " | ";

pub(crate) fn extract_workbook(path: &Path) -> Result<String, ExtractFailure> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| ExtractFailure::Spreadsheet(e.to_string()))?;

    let sheet_names = workbook.sheet_names().to_vec();
    let mut blocks = Vec::with_capacity(sheet_names.len());

    for name in &sheet_names {
        let range = match workbook.worksheet_range(name) {
            Ok(range) => range,
            Err(e) => {
                debug!(sheet = %name, error = %e, "sheet unreadable, skipping");
                continue;
            }
        };

        let rows = range
            .rows()
            .map(|row| row.iter().map(cell_text).collect::<Vec<_>>());
        let body = render_rows(rows);

        if body.is_empty() {
            blocks.push(format!("=== Sheet: {name} ==="));
        } else {
            blocks.push(format!("=== Sheet: {name} ===\n{body}"));
        }
    }

    Ok(blocks.join("\n\n"))
}

pub(crate) fn extract_csv(path: &Path) -> Result<String, ExtractFailure> {
    let bytes = std::fs::read(path).map_err(|e| ExtractFailure::Read(e.to_string()))?;
    let text = decode_bytes(&bytes);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        match record {
            Ok(record) => rows.push(record.iter().map(str::to_string).collect::<Vec<_>>()),
            Err(e) => {
                // Not really CSV: keep the decoded text as-is.
                debug!(error = %e, "csv parse failed, falling back to raw text");
                return Ok(text);
            }
        }
    }

    Ok(render_rows(rows.into_iter()))
}

/// One line per row with at least one non-blank cell.
fn render_rows(rows: impl Iterator<Item = Vec<String>>) -> String {
    rows.filter(|cells| cells.iter().any(|c| !c.trim().is_empty()))
        .map(|cells| {
            cells
                .iter()
                .map(|c| c.trim())
                .collect::<Vec<_>>()
                .join(CELL_SEPARATOR)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{f:.0}"),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::Error(e) => format!("#{e:?}"),
    }
}
