// ABOUTME: Sync Orchestrator - per-table pipeline and run-level sequencing
// ABOUTME: One table's failure never stops the remaining tables

use crate::config::{SecretConfig, TableConfig};
use crate::connect;
use crate::sync::{checkpoint, extract, normalize, plan, schema, validate_identifier, write};
use anyhow::Result;

/// Per-table success map for one run.
#[derive(Debug, Default)]
pub struct RunSummary {
    statuses: Vec<(String, bool)>,
}

impl RunSummary {
    pub fn record(&mut self, table: &str, ok: bool) {
        self.statuses.push((table.to_string(), ok));
    }

    pub fn all_ok(&self) -> bool {
        self.statuses.iter().all(|(_, ok)| *ok)
    }

    pub fn failed_tables(&self) -> Vec<&str> {
        self.statuses
            .iter()
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn statuses(&self) -> &[(String, bool)] {
        &self.statuses
    }
}

/// Sync one table: introspect, resolve conflict key and checkpoint,
/// extract, normalize, write.
///
/// Both clients drop at scope exit, ending their connection tasks, so the
/// connections are released before the next table regardless of outcome.
pub async fn sync_table(
    secret: &SecretConfig,
    config: &TableConfig,
    batch_size: usize,
) -> Result<()> {
    validate_identifier(&config.table_name)?;
    validate_identifier(&config.sync_config.check_column)?;

    let mut pair = connect::connect_service(secret, &config.service).await?;

    let columns =
        schema::introspect_table(&pair.source, &config.table_name, &config.sync_config).await?;
    let key = plan::resolve_conflict_key(&pair.dest, &config.table_name).await?;
    let checkpoint = checkpoint::resolve_checkpoint(
        &pair.dest,
        &config.table_name,
        &config.sync_config.check_column,
        config.sync_config.check_type,
    )
    .await?;

    let rows = match &checkpoint {
        None => {
            tracing::info!(
                "No existing data found in {}; copying all rows from production",
                config.table_name
            );
            extract::extract_full(&pair.source, &config.table_name, &columns).await?
        }
        Some(value) => {
            tracing::info!(
                "Found existing data in {}; latest {} is {}, extracting newer rows",
                config.table_name,
                config.sync_config.check_column,
                value
            );
            extract::extract_delta(
                &pair.source,
                &config.table_name,
                &columns,
                &config.sync_config.check_column,
                config.sync_config.check_type,
                value,
            )
            .await?
        }
    };

    if rows.is_empty() {
        tracing::info!("No data to sync for {}", config.table_name);
        return Ok(());
    }

    let (records, report) = normalize::normalize_rows(&rows, &columns);
    report.log(&config.table_name);

    write::write_records(
        &mut pair.dest,
        &config.table_name,
        &columns,
        &key,
        &records,
        batch_size,
    )
    .await?;

    tracing::info!("Sync completed successfully for {}", config.table_name);
    Ok(())
}

/// Sync every configured table, service by service, strictly sequentially.
///
/// A failing table is logged and flagged; its siblings still run. The
/// caller maps any failure to a non-zero exit.
pub async fn run_all(
    secret: &SecretConfig,
    tables: &[TableConfig],
    batch_size: usize,
) -> RunSummary {
    let mut summary = RunSummary::default();

    // Group tables by service, preserving configuration order.
    let mut services: Vec<&str> = Vec::new();
    for table in tables {
        if !services.contains(&table.service.as_str()) {
            services.push(table.service.as_str());
        }
    }

    for service in services {
        tracing::info!("Starting sync for {} service", service);
        for table in tables.iter().filter(|t| t.service == service) {
            tracing::info!("Starting sync for {}...", table.table_name);
            match sync_table(secret, table, batch_size).await {
                Ok(()) => summary.record(&table.table_name, true),
                Err(e) => {
                    tracing::error!("{} sync failed: {:#}", table.table_name, e);
                    tracing::error!("Continuing with next table...");
                    summary.record(&table.table_name, false);
                }
            }
        }
        tracing::info!("Completed syncs for {} service", service);
    }

    if summary.all_ok() {
        tracing::info!("All table syncs completed successfully");
    } else {
        tracing::error!("Table syncs failed: {}", summary.failed_tables().join(", "));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_summary_all_ok() {
        let mut summary = RunSummary::default();
        summary.record("users", true);
        summary.record("orders", true);
        assert!(summary.all_ok());
        assert!(summary.failed_tables().is_empty());
    }

    #[test]
    fn test_run_summary_tracks_failures() {
        let mut summary = RunSummary::default();
        summary.record("users", true);
        summary.record("orders", false);
        summary.record("items", false);
        assert!(!summary.all_ok());
        assert_eq!(summary.failed_tables(), vec!["orders", "items"]);
        assert_eq!(summary.statuses().len(), 3);
    }

    #[test]
    fn test_empty_run_counts_as_success() {
        let summary = RunSummary::default();
        assert!(summary.all_ok());
    }
}
