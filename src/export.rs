use std::path::Path;

use crate::models::enums::OutputFormat;
use crate::models::structs::{QueryResponse, Row, Scalar};

/// Column order of the result: keys of the first row.
fn headers(rows: &[Row]) -> Vec<String> {
    rows.first().map(|r| r.keys().cloned().collect()).unwrap_or_default()
}

fn cell(value: Option<&Scalar>) -> String {
    match value {
        None | Some(Scalar::Null) => String::new(),
        Some(v) => v.to_string(),
    }
}

/// CSV text with a header row; empty result gives an empty string.
pub fn to_csv(response: &QueryResponse) -> Result<String, Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    write_rows(&mut writer, &response.rows)?;
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

pub fn write_csv_file(path: &Path, response: &QueryResponse) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_path(path)?;
    write_rows(&mut writer, &response.rows)?;
    log::info!("Wrote {} row(s) to {}", response.rows.len(), path.display());
    Ok(())
}

pub fn write_json_file(path: &Path, response: &QueryResponse) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::write(path, to_json(response)?)?;
    log::info!("Wrote {} row(s) to {}", response.rows.len(), path.display());
    Ok(())
}

/// Save the result to `path` in `format`; a table is saved as its text rendering.
pub fn write_file(path: &Path, response: &QueryResponse, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Csv => write_csv_file(path, response),
        OutputFormat::Json => write_json_file(path, response),
        OutputFormat::Table => {
            std::fs::write(path, to_table(response))?;
            Ok(())
        }
    }
}

fn write_rows<W: std::io::Write>(writer: &mut csv::Writer<W>, rows: &[Row]) -> Result<(), csv::Error> {
    let headers = headers(rows);
    if headers.is_empty() {
        return Ok(());
    }
    writer.write_record(&headers)?;
    for row in rows {
        writer.write_record(headers.iter().map(|h| cell(row.get(h))))?;
    }
    writer.flush()?;
    Ok(())
}

/// Pretty-printed JSON array of the result rows.
pub fn to_json(response: &QueryResponse) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&response.rows)
}

/// Plain aligned text table for terminal output.
pub fn to_table(response: &QueryResponse) -> String {
    let headers = headers(&response.rows);
    if headers.is_empty() {
        return format!("(0 rows, {} ms)\n", response.execution_time_ms);
    }
    let body: Vec<Vec<String>> = response
        .rows
        .iter()
        .map(|row| headers.iter().map(|h| row.get(h).map(Scalar::to_string).unwrap_or_default()).collect())
        .collect();
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| body.iter().map(|r| r[i].chars().count()).chain([h.chars().count()]).max().unwrap_or(0))
        .collect();

    let line = |cells: &[String]| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<width$}", c, width = *w))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };
    let mut out = String::new();
    out.push_str(&line(&headers));
    out.push('\n');
    out.push_str(&widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-"));
    out.push('\n');
    for row in &body {
        out.push_str(&line(row));
        out.push('\n');
    }
    out.push_str(&format!("({} rows, {} ms)\n", response.row_count, response.execution_time_ms));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::structs::row_from_json;
    use serde_json::json;

    fn response() -> QueryResponse {
        let rows: Vec<Row> = [json!({"name": "Ann, Lee", "age": 30}), json!({"name": "Bo", "age": null})]
            .iter()
            .map(row_from_json)
            .collect();
        QueryResponse {
            query: "SELECT name, age FROM users".into(),
            row_count: rows.len(),
            rows,
            execution_time_ms: 2,
            affected_tables: vec!["users".into()],
        }
    }

    #[test]
    fn csv_quotes_commas_and_blanks_nulls() {
        let csv = to_csv(&response()).unwrap();
        assert_eq!(csv, "name,age\n\"Ann, Lee\",30\nBo,\n");
    }

    #[test]
    fn empty_result_exports_empty() {
        let mut r = response();
        r.rows.clear();
        assert_eq!(to_csv(&r).unwrap(), "");
        assert_eq!(to_json(&r).unwrap(), "[]");
    }

    #[test]
    fn json_keeps_column_order() {
        let text = to_json(&response()).unwrap();
        assert!(text.find("\"name\"").unwrap() < text.find("\"age\"").unwrap());
        let back: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back[1]["age"], json!(null));
    }

    #[test]
    fn table_aligns_columns() {
        let text = to_table(&response());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "name     | age");
        assert_eq!(lines[2], "Ann, Lee | 30");
        assert_eq!(lines[3], "Bo       | NULL");
        assert_eq!(lines[4], "(2 rows, 2 ms)");
    }

    #[test]
    fn files_match_in_memory_renderings() {
        let dir = std::env::temp_dir().join(format!("docquery-export-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let r = response();

        let csv_path = dir.join("out.csv");
        write_file(&csv_path, &r, OutputFormat::Csv).unwrap();
        assert_eq!(std::fs::read_to_string(&csv_path).unwrap(), to_csv(&r).unwrap());

        let json_path = dir.join("out.json");
        write_file(&json_path, &r, OutputFormat::Json).unwrap();
        assert_eq!(std::fs::read_to_string(&json_path).unwrap(), to_json(&r).unwrap());
    }
}
