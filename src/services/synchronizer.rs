use std::collections::HashSet;

use crate::config::{DEFAULT_BATCH_SIZE, DEFAULT_TABLE};
use crate::db::{StatStore, StoreRow};
use crate::error::SyncError;
use crate::models::{Frame, NaturalKey, SyncReport};
use crate::services::normalizer::WEEKLY_KEY;

/// How rows are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Insert or update on the natural key. Re-running is a no-op.
    #[default]
    Upsert,
    /// Plain insert; rows already stored are rejected by the store.
    Insert,
}

/// Writes normalized rows to a store in fixed-size batches.
#[derive(Debug, Clone)]
pub struct Synchronizer {
    pub table: String,
    pub batch_size: usize,
    pub conflict_key: Vec<String>,
    pub mode: WriteMode,
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            conflict_key: WEEKLY_KEY.iter().map(|k| k.to_string()).collect(),
            mode: WriteMode::Upsert,
        }
    }
}

impl Synchronizer {
    pub fn new(table: impl Into<String>, batch_size: usize, mode: WriteMode) -> Self {
        Self {
            table: table.into(),
            batch_size: batch_size.max(1),
            mode,
            ..Self::default()
        }
    }

    /// Applies `records` batch by batch, in order. A rejected batch is logged
    /// and skipped; it never stops the remaining batches.
    pub async fn apply(&self, store: &dyn StatStore, records: &Frame) -> SyncReport {
        let rows: Vec<StoreRow> = records.iter().map(|row| row.to_object()).collect();
        let on_conflict = self.conflict_key.join(",");
        let batch_size = self.batch_size.max(1);

        self.warn_duplicate_keys(records);

        tracing::info!(
            "{} {} records into '{}' via {} (batch size {})",
            match self.mode {
                WriteMode::Upsert => "Upserting",
                WriteMode::Insert => "Inserting",
            },
            rows.len(),
            self.table,
            store.name(),
            batch_size
        );

        let mut report = SyncReport { attempted: rows.len(), ..SyncReport::default() };

        for (i, batch) in rows.chunks(batch_size).enumerate() {
            let index = i + 1;
            report.batches += 1;

            let written = match self.mode {
                WriteMode::Upsert => store.upsert(&self.table, batch, &on_conflict).await,
                WriteMode::Insert => store.insert(&self.table, batch).await,
            };

            match written {
                Ok(affected) => {
                    report.upserted += affected.len();
                    tracing::info!("Upserted batch {}: {} records", index, affected.len());
                }
                Err(e) => {
                    let err = SyncError::BatchUpsert { batch: index, message: e.to_string() };
                    tracing::error!("Error upserting batch {} ({} records): {}", index, batch.len(), err);
                    report.failed_batches.push(index);
                }
            }
        }

        tracing::info!(
            "Database update completed! Total records upserted: {} of {} ({} failed batches)",
            report.upserted,
            report.attempted,
            report.failed_batches.len()
        );
        report
    }

    fn warn_duplicate_keys(&self, records: &Frame) {
        let mut seen = HashSet::with_capacity(records.len());
        let duplicates = records
            .iter()
            .filter_map(NaturalKey::from_row)
            .filter(|key| !seen.insert(key.clone()))
            .count();
        if duplicates > 0 {
            tracing::warn!("{} records share a natural key with an earlier record", duplicates);
        }
    }
}
