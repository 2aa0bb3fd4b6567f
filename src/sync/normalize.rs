// ABOUTME: Record Normalizer - coerces extracted cells into typed transport values
// ABOUTME: A failed cell degrades to null with a warning; it never aborts the batch

use crate::sync::schema::{ColumnDescriptor, ColumnKind};
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;

/// One normalized cell on the wire.
///
/// Cells travel as text (arrays as text arrays); the insert statement's
/// placeholder casts convert them back to the destination column types.
/// Integers are the exception: they bind natively after coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Int(Option<i64>),
    Text(Option<String>),
    TextArray(Vec<String>),
}

impl CellValue {
    pub fn as_param(&self) -> &(dyn ToSql + Sync) {
        match self {
            CellValue::Int(v) => v,
            CellValue::Text(v) => v,
            CellValue::TextArray(v) => v,
        }
    }

    fn null_for(kind: ColumnKind) -> CellValue {
        match kind {
            ColumnKind::Integer => CellValue::Int(None),
            // Arrays are never null on the wire; empty stands in.
            ColumnKind::Array => CellValue::TextArray(Vec::new()),
            _ => CellValue::Text(None),
        }
    }
}

/// Raw cell as read from the extracted row.
#[derive(Debug, Clone)]
pub enum RawCell {
    Text(Option<String>),
    Array(Option<Vec<String>>),
}

/// One flagged cell: which column, and what happened.
#[derive(Debug, Clone)]
pub struct CellWarning {
    pub column: String,
    pub detail: String,
}

const MAX_SAMPLES: usize = 5;

/// Aggregated data-quality report for one table's normalization pass.
///
/// Counts every coercion fallback and keeps the first few as samples, so
/// the orchestrator can log one summary instead of a line per cell.
#[derive(Debug, Default)]
pub struct QualityReport {
    pub flagged_cells: usize,
    samples: Vec<CellWarning>,
}

impl QualityReport {
    fn record(&mut self, column: &str, detail: String) {
        self.flagged_cells += 1;
        if self.samples.len() < MAX_SAMPLES {
            self.samples.push(CellWarning {
                column: column.to_string(),
                detail,
            });
        }
    }

    pub fn samples(&self) -> &[CellWarning] {
        &self.samples
    }

    pub fn log(&self, table: &str) {
        if self.flagged_cells == 0 {
            return;
        }
        tracing::warn!(
            "{}: {} cells required coercion fallback during normalization",
            table,
            self.flagged_cells
        );
        for warning in &self.samples {
            tracing::warn!("  {}: {}", warning.column, warning.detail);
        }
    }
}

/// Coerce one raw cell per the column's kind. Returns the transport value
/// and an optional warning; the warning never escalates to an error.
pub fn normalize_cell(
    desc: &ColumnDescriptor,
    raw: RawCell,
) -> (CellValue, Option<String>) {
    match (desc.kind, raw) {
        (ColumnKind::Array, RawCell::Array(value)) => {
            (CellValue::TextArray(value.unwrap_or_default()), None)
        }
        (ColumnKind::Array, RawCell::Text(None)) => (CellValue::TextArray(Vec::new()), None),
        (ColumnKind::Array, RawCell::Text(Some(_))) => (
            CellValue::TextArray(Vec::new()),
            Some("unexpected non-array value for array column".to_string()),
        ),
        (kind, RawCell::Array(_)) => (
            CellValue::null_for(kind),
            Some("unexpected array value for scalar column".to_string()),
        ),
        (kind, RawCell::Text(None)) => (CellValue::null_for(kind), None),
        (ColumnKind::Json, RawCell::Text(Some(text))) => normalize_json(text),
        (ColumnKind::Integer, RawCell::Text(Some(text))) => normalize_integer(&text),
        (_, RawCell::Text(Some(text))) => {
            (CellValue::Text(Some(text.trim().to_string())), None)
        }
    }
}

fn normalize_json(text: String) -> (CellValue, Option<String>) {
    if serde_json::from_str::<serde_json::Value>(&text).is_ok() {
        return (CellValue::Text(Some(text)), None);
    }
    match repair_json(&text) {
        Some(fixed) => (
            CellValue::Text(Some(fixed)),
            Some("repaired malformed JSON quoting".to_string()),
        ),
        None => (
            CellValue::Text(None),
            Some("JSON did not parse even after quote repair".to_string()),
        ),
    }
}

/// Quote-style repair for JSON that arrived with single-quote conventions.
///
/// First pass treats doubled single quotes as escaped string quotes; the
/// second swaps every single quote for a double quote, restoring any
/// doubled pairs back to a literal quote. Each candidate must re-validate.
fn repair_json(raw: &str) -> Option<String> {
    let mut candidate = raw.trim().to_string();
    if candidate.starts_with("'{") && candidate.ends_with("}'") {
        candidate = candidate[1..candidate.len() - 1].to_string();
    }

    let first = candidate.replace("''", "\"");
    if serde_json::from_str::<serde_json::Value>(&first).is_ok() {
        return Some(first);
    }

    let second = candidate.replace('\'', "\"").replace("\"\"", "'");
    if serde_json::from_str::<serde_json::Value>(&second).is_ok() {
        return Some(second);
    }

    None
}

fn normalize_integer(text: &str) -> (CellValue, Option<String>) {
    // Through f64 first: tolerates numeric-as-text like "42.0".
    match text.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => (CellValue::Int(Some(v as i64)), None),
        _ => (
            CellValue::Int(None),
            Some(format!("could not coerce '{}' to integer", text.trim())),
        ),
    }
}

/// Normalize one extracted row into positional transport values.
pub fn normalize_row(
    row: &Row,
    columns: &[ColumnDescriptor],
    report: &mut QualityReport,
) -> Vec<CellValue> {
    columns
        .iter()
        .enumerate()
        .map(|(idx, desc)| {
            let raw = match desc.kind {
                ColumnKind::Array => match row.try_get::<_, Option<Vec<String>>>(idx) {
                    Ok(value) => RawCell::Array(value),
                    Err(e) => {
                        report.record(&desc.name, format!("failed to decode array cell: {}", e));
                        return CellValue::TextArray(Vec::new());
                    }
                },
                _ => match row.try_get::<_, Option<String>>(idx) {
                    Ok(value) => RawCell::Text(value),
                    Err(e) => {
                        report.record(&desc.name, format!("failed to decode cell: {}", e));
                        return CellValue::null_for(desc.kind);
                    }
                },
            };

            let (value, warning) = normalize_cell(desc, raw);
            if let Some(detail) = warning {
                report.record(&desc.name, detail);
            }
            value
        })
        .collect()
}

/// Normalize every extracted row, aggregating warnings into one report.
pub fn normalize_rows(
    rows: &[Row],
    columns: &[ColumnDescriptor],
) -> (Vec<Vec<CellValue>>, QualityReport) {
    let mut report = QualityReport::default();
    let records = rows
        .iter()
        .map(|row| normalize_row(row, columns, &mut report))
        .collect();
    (records, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, sql_type: &str) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            kind: crate::sync::schema::classify(sql_type),
            nullable: true,
        }
    }

    #[test]
    fn test_array_null_and_empty_become_empty_sequence() {
        let desc = descriptor("tags", "text[]");
        let (value, warning) = normalize_cell(&desc, RawCell::Array(None));
        assert_eq!(value, CellValue::TextArray(Vec::new()));
        assert!(warning.is_none());

        let (value, _) = normalize_cell(&desc, RawCell::Array(Some(Vec::new())));
        assert_eq!(value, CellValue::TextArray(Vec::new()));
    }

    #[test]
    fn test_array_passes_through() {
        let desc = descriptor("tags", "text[]");
        let (value, warning) = normalize_cell(
            &desc,
            RawCell::Array(Some(vec!["a".to_string(), "b".to_string()])),
        );
        assert_eq!(
            value,
            CellValue::TextArray(vec!["a".to_string(), "b".to_string()])
        );
        assert!(warning.is_none());
    }

    #[test]
    fn test_array_unexpected_shape_degrades_to_empty() {
        let desc = descriptor("tags", "text[]");
        let (value, warning) =
            normalize_cell(&desc, RawCell::Text(Some("not-an-array".to_string())));
        assert_eq!(value, CellValue::TextArray(Vec::new()));
        assert!(warning.is_some());
    }

    #[test]
    fn test_valid_json_is_never_downgraded() {
        let desc = descriptor("attrs", "jsonb");
        let (value, warning) =
            normalize_cell(&desc, RawCell::Text(Some(r#"{"a": 1}"#.to_string())));
        assert_eq!(value, CellValue::Text(Some(r#"{"a": 1}"#.to_string())));
        assert!(warning.is_none());
    }

    #[test]
    fn test_single_quoted_json_is_repaired() {
        let desc = descriptor("attrs", "jsonb");
        let (value, warning) =
            normalize_cell(&desc, RawCell::Text(Some("{'a': 1}".to_string())));
        assert_eq!(value, CellValue::Text(Some(r#"{"a": 1}"#.to_string())));
        assert!(warning.is_some());
    }

    #[test]
    fn test_sql_escaped_json_is_repaired() {
        let desc = descriptor("attrs", "jsonb");
        let (value, _) = normalize_cell(
            &desc,
            RawCell::Text(Some("'{''key'': ''value''}'".to_string())),
        );
        assert_eq!(
            value,
            CellValue::Text(Some(r#"{"key": "value"}"#.to_string()))
        );
    }

    #[test]
    fn test_unparsable_json_degrades_to_null() {
        let desc = descriptor("attrs", "jsonb");
        let (value, warning) =
            normalize_cell(&desc, RawCell::Text(Some("{not json".to_string())));
        assert_eq!(value, CellValue::Text(None));
        assert!(warning.is_some());
    }

    #[test]
    fn test_json_null_stays_null_without_warning() {
        let desc = descriptor("attrs", "jsonb");
        let (value, warning) = normalize_cell(&desc, RawCell::Text(None));
        assert_eq!(value, CellValue::Text(None));
        assert!(warning.is_none());
    }

    #[test]
    fn test_integer_tolerates_float_text() {
        let desc = descriptor("count", "integer");
        let (value, warning) = normalize_cell(&desc, RawCell::Text(Some("42".to_string())));
        assert_eq!(value, CellValue::Int(Some(42)));
        assert!(warning.is_none());

        let (value, _) = normalize_cell(&desc, RawCell::Text(Some("42.7".to_string())));
        assert_eq!(value, CellValue::Int(Some(42)));
    }

    #[test]
    fn test_unconvertible_integer_degrades_to_null() {
        let desc = descriptor("count", "integer");
        let (value, warning) = normalize_cell(&desc, RawCell::Text(Some("abc".to_string())));
        assert_eq!(value, CellValue::Int(None));
        assert!(warning.is_some());

        let (value, warning) = normalize_cell(&desc, RawCell::Text(Some("NaN".to_string())));
        assert_eq!(value, CellValue::Int(None));
        assert!(warning.is_some());
    }

    #[test]
    fn test_text_is_trimmed() {
        let desc = descriptor("name", "character varying(64)");
        let (value, warning) =
            normalize_cell(&desc, RawCell::Text(Some("  alice  ".to_string())));
        assert_eq!(value, CellValue::Text(Some("alice".to_string())));
        assert!(warning.is_none());
    }

    #[test]
    fn test_null_placeholders_match_column_kind() {
        let (value, _) = normalize_cell(&descriptor("count", "bigint"), RawCell::Text(None));
        assert_eq!(value, CellValue::Int(None));

        let (value, _) = normalize_cell(&descriptor("name", "text"), RawCell::Text(None));
        assert_eq!(value, CellValue::Text(None));
    }

    #[test]
    fn test_quality_report_keeps_first_samples() {
        let mut report = QualityReport::default();
        for i in 0..10 {
            report.record("col", format!("warning {}", i));
        }
        assert_eq!(report.flagged_cells, 10);
        assert_eq!(report.samples().len(), 5);
        assert_eq!(report.samples()[0].detail, "warning 0");
    }
}
