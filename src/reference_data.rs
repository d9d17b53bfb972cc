//! # Reference Data
//!
//! Process-scoped owner of the file-backed reference tables: the unit
//! conversion table and the static RDI fallback table.
//!
//! Each table is read at most once per [`ReferenceData`]. Concurrent first
//! callers await the same in-flight load instead of reading the file twice,
//! and a loaded table is kept for the lifetime of the owner.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::config::TrackerConfig;
use crate::rdi::StaticRdiTable;
use crate::unit_conversions::ConversionTable;

/// Lazily loaded reference tables
#[derive(Debug, Default)]
pub struct ReferenceData {
    unit_conversions_path: PathBuf,
    rdi_table_path: PathBuf,
    conversions: OnceCell<Arc<ConversionTable>>,
    rdi_fallback: OnceCell<Arc<StaticRdiTable>>,
}

impl ReferenceData {
    pub fn new(unit_conversions_path: PathBuf, rdi_table_path: PathBuf) -> Self {
        Self {
            unit_conversions_path,
            rdi_table_path,
            conversions: OnceCell::new(),
            rdi_fallback: OnceCell::new(),
        }
    }

    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(
            config.unit_conversions_path.clone(),
            config.rdi_table_path.clone(),
        )
    }

    /// Reference data with both tables already in memory; no file is read
    pub fn with_tables(conversions: ConversionTable, rdi_fallback: StaticRdiTable) -> Self {
        Self {
            conversions: OnceCell::new_with(Some(Arc::new(conversions))),
            rdi_fallback: OnceCell::new_with(Some(Arc::new(rdi_fallback))),
            ..Self::default()
        }
    }

    /// The unit conversion table, loading it on first use
    pub async fn conversion_table(&self) -> Arc<ConversionTable> {
        self.conversions
            .get_or_init(|| async {
                Arc::new(ConversionTable::load(&self.unit_conversions_path).await)
            })
            .await
            .clone()
    }

    /// The static RDI table, loading it on first use
    pub async fn rdi_fallback(&self) -> Arc<StaticRdiTable> {
        self.rdi_fallback
            .get_or_init(|| async { Arc::new(StaticRdiTable::load(&self.rdi_table_path).await) })
            .await
            .clone()
    }
}
