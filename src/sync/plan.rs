// ABOUTME: Upsert Planner - resolves the destination conflict key and builds insert statements
// ABOUTME: Placeholders carry casts from text transport back to the destination types

use crate::sync::schema::{ColumnDescriptor, ColumnKind};
use anyhow::{Context, Result};
use tokio_postgres::Client;

/// Column set used to detect an existing row during upsert.
///
/// Falls back to all destination columns when no primary key exists; the
/// planner then emits a bare insert, because PostgreSQL rejects a conflict
/// target with no matching unique index.
#[derive(Debug, Clone)]
pub struct ConflictKey {
    pub columns: Vec<String>,
    pub is_primary_key: bool,
}

/// Resolve the destination's conflict key: primary-key columns, or every
/// column in catalog order when the table has no primary key.
pub async fn resolve_conflict_key(client: &Client, table: &str) -> Result<ConflictKey> {
    let rows = client
        .query(
            "SELECT a.attname::text
             FROM pg_index i
             JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
             WHERE i.indrelid = $1::text::regclass
               AND i.indisprimary
             ORDER BY array_position(i.indkey, a.attnum)",
            &[&table],
        )
        .await
        .with_context(|| format!("failed to read primary key for table '{}'", table))?;

    let primary: Vec<String> = rows.iter().map(|row| row.get(0)).collect();
    if !primary.is_empty() {
        tracing::debug!("Conflict key for {}: {}", table, primary.join(", "));
        return Ok(ConflictKey {
            columns: primary,
            is_primary_key: true,
        });
    }

    tracing::warn!(
        "No primary key found for table {}; writes fall back to plain inserts and re-extracted rows may duplicate",
        table
    );
    let rows = client
        .query(
            "SELECT column_name::text
             FROM information_schema.columns
             WHERE table_name = $1
             ORDER BY ordinal_position",
            &[&table],
        )
        .await
        .with_context(|| format!("failed to list destination columns for table '{}'", table))?;

    Ok(ConflictKey {
        columns: rows.iter().map(|row| row.get(0)).collect(),
        is_primary_key: false,
    })
}

/// Placeholder with the cast that turns the text-transport value back into
/// the destination column type.
fn placeholder(desc: &ColumnDescriptor, n: usize) -> String {
    match desc.kind {
        ColumnKind::Integer => format!("${}::int8", n),
        ColumnKind::Json => format!("${}::text::jsonb", n),
        ColumnKind::Array => format!("${}::text[]::{}", n, desc.sql_type),
        ColumnKind::Text => format!("${}::text::{}", n, desc.sql_type),
    }
}

/// Build the multi-row insert statement for one batch.
///
/// With a primary key:
/// ```sql
/// INSERT INTO "t" ("id", "name") VALUES ($1::int8, $2::text::text), ...
/// ON CONFLICT ("id") DO UPDATE SET "name" = EXCLUDED."name"
/// ```
/// Without one the statement is a bare insert; duplicate rows are the
/// documented degradation of that path.
pub fn build_insert_statement(
    table: &str,
    columns: &[ColumnDescriptor],
    key: &ConflictKey,
    num_rows: usize,
) -> String {
    let quoted_columns: Vec<String> = columns
        .iter()
        .map(|c| format!("\"{}\"", c.name))
        .collect();

    let num_cols = columns.len();
    let value_rows: Vec<String> = (0..num_rows)
        .map(|row_idx| {
            let placeholders: Vec<String> = columns
                .iter()
                .enumerate()
                .map(|(col_idx, desc)| placeholder(desc, row_idx * num_cols + col_idx + 1))
                .collect();
            format!("({})", placeholders.join(", "))
        })
        .collect();

    let base = format!(
        "INSERT INTO \"{}\" ({}) VALUES {}",
        table,
        quoted_columns.join(", "),
        value_rows.join(", ")
    );

    if !key.is_primary_key {
        return base;
    }

    let quoted_key: Vec<String> = key
        .columns
        .iter()
        .map(|c| format!("\"{}\"", c))
        .collect();

    let update_columns: Vec<String> = columns
        .iter()
        .filter(|c| !key.columns.contains(&c.name))
        .map(|c| format!("\"{}\" = EXCLUDED.\"{}\"", c.name, c.name))
        .collect();

    let action = if update_columns.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", update_columns.join(", "))
    };

    format!(
        "{} ON CONFLICT ({}) {}",
        base,
        quoted_key.join(", "),
        action
    )
}
