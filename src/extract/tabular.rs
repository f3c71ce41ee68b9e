use std::path::Path;

use anyhow::{Context, Result};
use calamine::{open_workbook, Reader, Xls};

/// Legacy binary workbooks, rendered sheet by sheet as plain tables.
pub fn extract_xls_text(path: &Path) -> Result<String> {
    let mut workbook: Xls<_> = open_workbook(path)
        .with_context(|| format!("failed to open XLS workbook: {}", path.display()))?;

    let mut text = String::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .with_context(|| format!("failed to read sheet {name}"))?;
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect();

        text.push_str(&format!("--- Sheet: {name} ---\n"));
        text.push_str(&render_table(&rows));
        text.push_str("\n\n");
    }

    Ok(text)
}

pub fn extract_csv_text(path: &Path) -> Result<String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open CSV: {}", path.display()))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.context("failed to parse CSV record")?;
        rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }

    Ok(render_table(&rows))
}

/// Right-aligned fixed-width columns; the first row is treated as the header.
pub fn render_table(rows: &[Vec<String>]) -> String {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    if columns == 0 {
        return String::new();
    }

    let mut widths = vec![0usize; columns];
    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(cell.chars().count());
        }
    }

    rows.iter()
        .map(|row| {
            widths
                .iter()
                .enumerate()
                .map(|(idx, width)| {
                    let cell = row.get(idx).map(String::as_str).unwrap_or("");
                    format!("{cell:>width$}")
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn table_pads_columns_and_short_rows() {
        let rows = vec![row(&["name", "qty"]), row(&["apple", "3"]), row(&["fig"])];
        assert_eq!(render_table(&rows), " name qty\napple   3\n  fig    ");
    }

    #[test]
    fn empty_table_renders_nothing() {
        assert_eq!(render_table(&[]), "");
    }

    #[test]
    fn csv_file_becomes_a_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.csv");
        std::fs::write(&path, "item,price\n\"tea, green\",4.5\ncoffee,3\n").unwrap();

        let text = extract_csv_text(&path).unwrap();
        assert_eq!(text, "      item price\ntea, green   4.5\n    coffee     3");
    }

    #[test]
    fn xls_sheets_render_as_tables() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("src/extract/testdata/sales.xls");

        let text = extract_xls_text(&path).unwrap();
        assert_eq!(
            text,
            "--- Sheet: Sales ---\nRegion Total\n North    42\n South   7.5\n\n--- Sheet: Notes ---\nok\n\n"
        );
    }

    #[test]
    fn non_xls_bytes_fail_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.xls");
        std::fs::write(&path, b"plain text, not a workbook").unwrap();

        assert!(extract_xls_text(&path).is_err());
    }
}
