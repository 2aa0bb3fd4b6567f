// ABOUTME: Extractor - full and delta reads from the source table
// ABOUTME: Projects every column as text (arrays as text[]) so cells share one transport shape

use crate::config::CheckType;
use crate::sync::checkpoint::CheckpointValue;
use crate::sync::schema::{ColumnDescriptor, ColumnKind};
use anyhow::{Context, Result};
use tokio_postgres::{Client, Row};

/// Comparison operator for delta extraction.
///
/// Id and timestamp checkpoints are strictly ordered, so `>` is safe. Any
/// other check type may have ties at the boundary; `>=` re-reads the
/// boundary rows instead of silently dropping them.
pub fn delta_operator(check_type: CheckType) -> &'static str {
    match check_type {
        CheckType::Id | CheckType::Timestamp => ">",
        CheckType::Other => ">=",
    }
}

/// The single column list shared by extraction and insertion, in
/// descriptor order.
fn projection(columns: &[ColumnDescriptor]) -> String {
    columns
        .iter()
        .map(|c| match c.kind {
            ColumnKind::Array => format!("\"{}\"::text[]", c.name),
            _ => format!("\"{}\"::text", c.name),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn build_full_query(table: &str, columns: &[ColumnDescriptor]) -> String {
    format!("SELECT {} FROM \"{}\"", projection(columns), table)
}

/// Cast target that brings a text-transported checkpoint back to the
/// check column's native type. Integer kinds go through int8: the
/// reconstructed type string for them carries catalog precision and is
/// not a valid cast target.
fn native_cast(desc: &ColumnDescriptor) -> String {
    match desc.kind {
        ColumnKind::Integer => "int8".to_string(),
        _ => desc.sql_type.clone(),
    }
}

pub fn build_delta_query(
    table: &str,
    columns: &[ColumnDescriptor],
    check_column: &str,
    check_type: CheckType,
) -> String {
    // The parameter cast pins the bind type; the server cannot infer it
    // from an expression like `col > $1` the way we encode values. For
    // `Other` checkpoints the bound text is cast back to the column's
    // introspected type, so the comparison runs in native order rather
    // than text collation (where '10' sorts before '9').
    let (comparand, param_cast) = match check_type {
        CheckType::Id => (format!("\"{}\"", check_column), "::int8".to_string()),
        CheckType::Timestamp => (
            format!("\"{}\"", check_column),
            "::timestamptz".to_string(),
        ),
        CheckType::Other => match columns.iter().find(|c| c.name == check_column) {
            Some(desc) => (
                format!("\"{}\"", check_column),
                format!("::text::{}", native_cast(desc)),
            ),
            // Check column absent from the projection: compare as text.
            None => (format!("\"{}\"::text", check_column), "::text".to_string()),
        },
    };
    format!(
        "SELECT {} FROM \"{}\" WHERE {} {} $1{}",
        projection(columns),
        table,
        comparand,
        delta_operator(check_type),
        param_cast
    )
}

/// Extract every row of the source table.
pub async fn extract_full(
    client: &Client,
    table: &str,
    columns: &[ColumnDescriptor],
) -> Result<Vec<Row>> {
    let query = build_full_query(table, columns);
    let rows = client
        .query(&query, &[])
        .await
        .with_context(|| format!("failed to extract from '{}'", table))?;
    tracing::info!("Extracted {} rows from {}", rows.len(), table);
    Ok(rows)
}

/// Extract rows newer than the checkpoint.
pub async fn extract_delta(
    client: &Client,
    table: &str,
    columns: &[ColumnDescriptor],
    check_column: &str,
    check_type: CheckType,
    checkpoint: &CheckpointValue,
) -> Result<Vec<Row>> {
    let query = build_delta_query(table, columns, check_column, check_type);
    let rows = match checkpoint {
        CheckpointValue::Id(v) => client.query(&query, &[v]).await,
        CheckpointValue::Timestamp(ts) => client.query(&query, &[ts]).await,
        CheckpointValue::Other(s) => client.query(&query, &[s]).await,
    }
    .with_context(|| format!("failed to extract new rows from '{}'", table))?;
    tracing::info!("Extracted {} new rows from {}", rows.len(), table);
    Ok(rows)
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
    fn test_full_query_has_no_filter() {
        let columns = vec![descriptor("id", "bigint"), descriptor("name", "text")];
        let query = build_full_query("users", &columns);
        assert_eq!(
            query,
            "SELECT \"id\"::text, \"name\"::text FROM \"users\""
        );
        assert!(!query.contains("WHERE"));
    }

    #[test]
    fn test_projection_casts_arrays_as_text_array() {
        let columns = vec![descriptor("id", "bigint"), descriptor("tags", "text[]")];
        let query = build_full_query("posts", &columns);
        assert!(query.contains("\"tags\"::text[]"));
    }

    #[test]
    fn test_delta_operator_is_strict_for_ordered_types() {
        assert_eq!(delta_operator(CheckType::Id), ">");
        assert_eq!(delta_operator(CheckType::Timestamp), ">");
        assert_eq!(delta_operator(CheckType::Other), ">=");
    }

    #[test]
    fn test_delta_query_id() {
        let columns = vec![descriptor("id", "bigint")];
        let query = build_delta_query("users", &columns, "id", CheckType::Id);
        assert!(query.ends_with("WHERE \"id\" > $1::int8"));
    }

    #[test]
    fn test_delta_query_timestamp() {
        let columns = vec![descriptor("id", "bigint")];
        let query = build_delta_query("users", &columns, "updated_at", CheckType::Timestamp);
        assert!(query.ends_with("WHERE \"updated_at\" > $1::timestamptz"));
    }

    #[test]
    fn test_delta_query_other_compares_in_native_type() {
        // A numeric check column must not be compared in text collation,
        // where '10' sorts before '9' and newer rows would be dropped.
        let columns = vec![descriptor("id", "bigint"), descriptor("version", "numeric(10,2)")];
        let query = build_delta_query("users", &columns, "version", CheckType::Other);
        assert!(query.ends_with("WHERE \"version\" >= $1::text::numeric(10,2)"));
    }

    #[test]
    fn test_delta_query_other_integer_column_casts_through_int8() {
        // The reconstructed integer type string carries catalog precision
        // ("integer(32,0)") and cannot be a cast target.
        let columns = vec![descriptor("seq", "integer(32,0)")];
        let query = build_delta_query("events", &columns, "seq", CheckType::Other);
        assert!(query.ends_with("WHERE \"seq\" >= $1::text::int8"));
    }

    #[test]
    fn test_delta_query_other_falls_back_to_text_without_descriptor() {
        let columns = vec![descriptor("id", "bigint")];
        let query = build_delta_query("users", &columns, "version", CheckType::Other);
        assert!(query.ends_with("WHERE \"version\"::text >= $1::text"));
    }
}
