//! Table allow-list loading from a single-column CSV file.

use crate::error::ChainError;
use bqw_core::TableName;
use std::collections::BTreeSet;
use std::path::Path;

/// Read table names from the first column of a header-less CSV file.
///
/// Blank rows are skipped and values are trimmed. A file that cannot be
/// read, holds an invalid table name, or yields no names at all is an
/// `InvalidChainSpec` error.
pub fn load_allow_list(path: &Path) -> Result<BTreeSet<TableName>, ChainError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| ChainError::invalid(format!("cannot read {}: {}", path.display(), e)))?;

    let mut tables = BTreeSet::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| {
            ChainError::invalid(format!("cannot parse {}: {}", path.display(), e))
        })?;
        let Some(first) = record.get(0).filter(|value| !value.is_empty()) else {
            continue;
        };
        let name = TableName::try_new(first).map_err(|e| {
            ChainError::invalid(format!("{} row {}: {}", path.display(), index + 1, e))
        })?;
        tables.insert(name);
    }

    if tables.is_empty() {
        return Err(ChainError::invalid(format!(
            "{} does not contain any table names",
            path.display()
        )));
    }

    log::info!("Loaded {} tables from {}", tables.len(), path.display());
    Ok(tables)
}
