// ABOUTME: Incremental table-sync engine: schema introspection through batched upserts
// ABOUTME: Every pass recomputes its state from the live databases; there is no side ledger

use anyhow::{bail, Result};

pub mod checkpoint;
pub mod extract;
pub mod normalize;
pub mod plan;
pub mod run;
pub mod schema;
pub mod write;

pub use checkpoint::{resolve_checkpoint, CheckpointValue};
pub use extract::{extract_delta, extract_full};
pub use normalize::{normalize_rows, CellValue, QualityReport};
pub use plan::{build_insert_statement, resolve_conflict_key, ConflictKey};
pub use run::{run_all, sync_table, RunSummary};
pub use schema::{introspect_table, ColumnDescriptor, ColumnKind};
pub use write::{write_records, DEFAULT_BATCH_SIZE};

/// Validate a SQL identifier before it is interpolated into a statement.
///
/// Table and check-column names come from configuration and cannot be bound
/// as parameters, so they must be restricted to plain identifiers.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("identifier cannot be empty");
    }
    if name.len() > 63 {
        bail!("identifier '{}' exceeds PostgreSQL's 63-character limit", name);
    }
    if name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        bail!("identifier '{}' cannot start with a digit", name);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        bail!(
            "identifier '{}' contains characters outside [A-Za-z0-9_]",
            name
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("orders").is_ok());
        assert!(validate_identifier("order_items_2024").is_ok());
        assert!(validate_identifier("_internal").is_ok());

        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1st_table").is_err());
        assert!(validate_identifier("orders; DROP TABLE users").is_err());
        assert!(validate_identifier(&"x".repeat(64)).is_err());
    }
}
