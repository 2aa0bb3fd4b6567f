// ABOUTME: Schema Introspector - reads column definitions from the source catalog
// ABOUTME: Classifies each column once into a closed coercion kind

use crate::config::SyncConfig;
use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use tokio_postgres::Client;

/// Coercion rule for a column, decided once at introspection time.
///
/// Replaces per-cell string matching on the type name: the normalizer and
/// the planner both dispatch on this closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Array,
    Json,
    Integer,
    Text,
}

/// One source column: name, reconstructed SQL type, coercion kind,
/// nullability. Descriptor order is catalog ordinal order and drives both
/// the SELECT projection and the INSERT column list.
#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
    pub name: String,
    pub sql_type: String,
    pub kind: ColumnKind,
    pub nullable: bool,
}

/// Classify a reconstructed type string. First match wins: arrays before
/// anything else, since an int array still contains "int".
pub fn classify(sql_type: &str) -> ColumnKind {
    if sql_type.starts_with("ARRAY") || sql_type.ends_with("[]") {
        ColumnKind::Array
    } else if sql_type.starts_with("jsonb") {
        ColumnKind::Json
    } else if sql_type.contains("int")
        || matches!(sql_type, "bigserial" | "serial" | "smallserial")
    {
        ColumnKind::Integer
    } else {
        ColumnKind::Text
    }
}

/// Reconstruct a column's SQL type with length/precision qualifiers.
///
/// Priority: array element suffix, then character length, then numeric
/// precision/scale, then the bare catalog type name. The catalog reports
/// array udt names with a leading underscore (`_int4` for `int4[]`).
fn build_type_string(
    data_type: &str,
    udt_name: &str,
    char_len: Option<i32>,
    precision: Option<i32>,
    scale: Option<i32>,
) -> String {
    if let Some(elem) = udt_name.strip_prefix('_') {
        return format!("{}[]", elem);
    }
    if let Some(elem) = udt_name.strip_suffix("[]") {
        return format!("{}[]", elem);
    }
    if let Some(len) = char_len {
        return format!("{}({})", data_type, len);
    }
    if let (Some(p), Some(s)) = (precision, scale) {
        return format!("{}({},{})", data_type, p, s);
    }
    data_type.to_string()
}

/// Ignore-list rule: returns whether the column stays in the descriptor
/// list. A listed column drops only when nullable; dropping a NOT NULL
/// column would make every insert fail, so those are retained.
fn keep_column(name: &str, nullable: bool, ignore_columns: &BTreeSet<String>) -> bool {
    !ignore_columns.contains(name) || !nullable
}

/// Read a table's column descriptors from the source catalog in ordinal
/// order, applying the ignore-list rule.
pub async fn introspect_table(
    client: &Client,
    table: &str,
    sync: &SyncConfig,
) -> Result<Vec<ColumnDescriptor>> {
    let rows = client
        .query(
            "SELECT column_name::text, data_type::text, is_nullable::text,
                    character_maximum_length::int4, numeric_precision::int4,
                    numeric_scale::int4, udt_name::text
             FROM information_schema.columns
             WHERE table_name = $1
             ORDER BY ordinal_position",
            &[&table],
        )
        .await
        .with_context(|| format!("failed to read catalog columns for table '{}'", table))?;

    if rows.is_empty() {
        bail!("table '{}' has no columns in the source catalog", table);
    }

    let mut columns = Vec::with_capacity(rows.len());
    for row in &rows {
        let name: String = row.get(0);
        let data_type: String = row.get(1);
        let is_nullable: String = row.get(2);
        let char_len: Option<i32> = row.get(3);
        let precision: Option<i32> = row.get(4);
        let scale: Option<i32> = row.get(5);
        let udt_name: String = row.get(6);
        let nullable = is_nullable == "YES";

        if !keep_column(&name, nullable, &sync.ignore_columns) {
            tracing::info!("Ignoring nullable column: {}", name);
            continue;
        }
        if sync.ignore_columns.contains(&name) {
            tracing::warn!(
                "Ignored column '{}' is NOT NULL; keeping it so inserts stay valid",
                name
            );
        }

        let sql_type = build_type_string(&data_type, &udt_name, char_len, precision, scale);
        let kind = classify(&sql_type);
        columns.push(ColumnDescriptor {
            name,
            sql_type,
            kind,
            nullable,
        });
    }

    Ok(columns)
}
