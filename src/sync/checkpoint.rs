// ABOUTME: Checkpoint Resolver - computes the destination's high-water mark
// ABOUTME: None means the destination has nothing to compare against, so full copy

use crate::config::CheckType;
use crate::sync::validate_identifier;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use tokio_postgres::Client;

/// Maximum already-synced value of the check column, typed per check type.
///
/// `id` checkpoints are coerced to 64-bit integers; timestamps keep their
/// native comparable type; anything else travels as text.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckpointValue {
    Id(i64),
    Timestamp(DateTime<Utc>),
    Other(String),
}

impl fmt::Display for CheckpointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointValue::Id(v) => write!(f, "{}", v),
            CheckpointValue::Timestamp(ts) => write!(f, "{}", ts),
            CheckpointValue::Other(s) => write!(f, "{}", s),
        }
    }
}

fn max_cast(check_type: CheckType) -> &'static str {
    match check_type {
        CheckType::Id => "::bigint",
        CheckType::Timestamp => "::timestamptz",
        CheckType::Other => "::text",
    }
}

pub(crate) fn checkpoint_query(table: &str, check_column: &str, check_type: CheckType) -> String {
    format!(
        "SELECT MAX(\"{}\"){} FROM \"{}\"",
        check_column,
        max_cast(check_type),
        table
    )
}

/// Resolve the destination's high-water mark for the check column.
///
/// Returns `None` when the table is empty or every value is null, which
/// signals a full copy. This is the sole full-vs-delta decision; there is
/// no separately persisted cursor.
pub async fn resolve_checkpoint(
    client: &Client,
    table: &str,
    check_column: &str,
    check_type: CheckType,
) -> Result<Option<CheckpointValue>> {
    validate_identifier(table)?;
    validate_identifier(check_column)?;

    let query = checkpoint_query(table, check_column, check_type);
    let row = client
        .query_one(&query, &[])
        .await
        .with_context(|| format!("failed to resolve checkpoint for '{}'", table))?;

    let value = match check_type {
        CheckType::Id => row.get::<_, Option<i64>>(0).map(CheckpointValue::Id),
        CheckType::Timestamp => row
            .get::<_, Option<DateTime<Utc>>>(0)
            .map(CheckpointValue::Timestamp),
        CheckType::Other => row.get::<_, Option<String>>(0).map(CheckpointValue::Other),
    };

    match &value {
        Some(v) => tracing::debug!("Latest {} in staging {}: {}", check_column, table, v),
        None => tracing::debug!("No existing {} values in staging {}", check_column, table),
    }
    Ok(value)
}
