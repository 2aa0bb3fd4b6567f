// ABOUTME: Batched Writer - executes normalized records against the destination
// ABOUTME: One transaction per table; a failed batch rolls back everything

use crate::sync::normalize::CellValue;
use crate::sync::plan::{build_insert_statement, ConflictKey};
use crate::sync::schema::ColumnDescriptor;
use anyhow::{Context, Result};
use tokio_postgres::types::ToSql;
use tokio_postgres::Client;

pub const DEFAULT_BATCH_SIZE: usize = 1000;

// PostgreSQL caps a statement at 65535 bind parameters; stay under it.
const MAX_PARAMS: usize = 65_000;

fn effective_batch_size(requested: usize, params_per_row: usize) -> usize {
    let cap = MAX_PARAMS / params_per_row.max(1);
    requested.min(cap).max(1)
}

fn decile(processed: usize, total: usize) -> usize {
    processed * 10 / total.max(1)
}

/// Write all records in fixed-size batches inside one transaction.
///
/// Progress is logged only when cumulative completion crosses a new 10%
/// threshold. Any batch failure propagates after the transaction guard
/// rolls the whole table write back; there are no partial commits.
pub async fn write_records(
    client: &mut Client,
    table: &str,
    columns: &[ColumnDescriptor],
    key: &ConflictKey,
    records: &[Vec<CellValue>],
    batch_size: usize,
) -> Result<u64> {
    if records.is_empty() {
        tracing::info!("No records to insert into {}", table);
        return Ok(0);
    }

    let batch_size = effective_batch_size(batch_size, columns.len());
    let total = records.len();
    let total_batches = (total + batch_size - 1) / batch_size;
    tracing::info!(
        "Starting insert of {} records into {} (in {} batches)",
        total,
        table,
        total_batches
    );

    // Dropping the transaction without commit rolls everything back.
    let tx = client
        .transaction()
        .await
        .with_context(|| format!("failed to open destination transaction for '{}'", table))?;

    let mut affected = 0u64;
    let mut processed = 0usize;
    let mut last_decile = 0usize;

    for batch in records.chunks(batch_size) {
        let statement = build_insert_statement(table, columns, key, batch.len());
        let params: Vec<&(dyn ToSql + Sync)> = batch
            .iter()
            .flat_map(|record| record.iter().map(CellValue::as_param))
            .collect();

        affected += tx.execute(&statement, &params).await.with_context(|| {
            format!(
                "failed to write batch of {} records (offset {}) into '{}'",
                batch.len(),
                processed,
                table
            )
        })?;

        processed += batch.len();
        let current = decile(processed, total);
        if current > last_decile {
            last_decile = current;
            tracing::info!(
                "Progress: {}% - processed {}/{} records",
                current * 10,
                processed,
                total
            );
        }
    }

    tx.commit()
        .await
        .with_context(|| format!("failed to commit sync transaction for '{}'", table))?;

    tracing::info!("Successfully inserted {} records into {}", total, table);
    Ok(affected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_batch_size_respects_parameter_limit() {
        // 100 columns -> at most 650 rows per statement.
        assert_eq!(effective_batch_size(1000, 100), 650);
        // Few columns: the requested size stands.
        assert_eq!(effective_batch_size(1000, 5), 1000);
        // Never zero, even for absurdly wide rows.
        assert_eq!(effective_batch_size(1000, 200_000), 1);
    }

    #[test]
    fn test_default_batch_stays_under_parameter_limit() {
        // With the default batch size, a 65-column table would hit the cap;
        // the clamp keeps every statement under 65535 parameters.
        for cols in [1usize, 10, 65, 200] {
            let size = effective_batch_size(DEFAULT_BATCH_SIZE, cols);
            assert!(size * cols <= 65_535, "{} cols -> {} rows", cols, size);
        }
    }

    #[test]
    fn test_progress_logs_only_on_new_deciles() {
        // 25 records in batches of 2: emission points are the batches where
        // the decile ticks over, not every batch.
        let total = 25usize;
        let mut last = 0usize;
        let mut emissions = Vec::new();
        let mut processed = 0usize;
        while processed < total {
            processed = (processed + 2).min(total);
            let current = decile(processed, total);
            if current > last {
                last = current;
                emissions.push(current * 10);
            }
        }
        assert_eq!(emissions, vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
    }

    #[test]
    fn test_decile_single_batch_reaches_completion() {
        assert_eq!(decile(10, 10), 10);
        assert_eq!(decile(0, 10), 0);
        assert_eq!(decile(5, 0), 5 * 10); // total clamped to 1, no panic
    }
}
