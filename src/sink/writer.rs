//! Table writer: encodes a table into partitioned Parquet files and replaces
//! the previous contents of its directory.

use futures::stream::{self, StreamExt, TryStreamExt};
use snafu::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use tracing::{debug, info};

use super::parquet::{ParquetWriter, ParquetWriterConfig};
use super::partition::{file_schema, split_by_partition};
use super::{FinishedFile, PartitionValues};
use crate::config::OutputConfig;
use crate::emit;
use crate::error::{EncodeTaskSnafu, ParquetError, ParquetSnafu, PipelineError, TableWriteSnafu};
use crate::metrics::events::{ObjectsDeleted, TableWritten};
use crate::storage::StorageProviderRef;
use crate::transform::Table;

/// Marker written last, once every data file of a table is in place.
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Outcome of writing one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub table: String,
    pub files: usize,
    pub rows: usize,
    pub bytes: usize,
    /// Distinct partitions written; zero for unpartitioned tables.
    pub partitions: usize,
    /// Objects of the previous run that were removed.
    pub deleted: usize,
}

/// Writes tables under the output root, overwriting earlier runs.
pub struct TableWriter {
    storage: StorageProviderRef,
    config: ParquetWriterConfig,
    max_concurrent_uploads: usize,
}

impl TableWriter {
    pub fn new(storage: StorageProviderRef, config: &OutputConfig) -> Self {
        Self {
            storage,
            config: ParquetWriterConfig::from_output(config),
            max_concurrent_uploads: config.max_concurrent_uploads.max(1),
        }
    }

    /// Encode `table`, delete everything under `<output>/<table>/` and upload
    /// the new files.
    ///
    /// Encoding happens before anything is deleted, so an encoding failure
    /// leaves the previous output intact. Any storage failure is returned.
    pub async fn write(&self, table: &Table) -> Result<WriteSummary, PipelineError> {
        let start = Instant::now();

        let encode_table = table.clone();
        let config = self.config.clone();
        let files = tokio::task::spawn_blocking(move || encode(&encode_table, config))
            .await
            .context(EncodeTaskSnafu)
            .and_then(|result| result)
            .context(ParquetSnafu { table: table.name })?;

        let deleted = self
            .storage
            .delete_prefix(table.name)
            .await
            .context(TableWriteSnafu { table: table.name })?;
        if deleted > 0 {
            debug!("Removed {} objects of a previous {} run", deleted, table.name);
            emit!(ObjectsDeleted {
                count: deleted as u64,
            });
        }

        let summary = WriteSummary {
            table: table.name.to_string(),
            files: files.len(),
            rows: files.iter().map(|f| f.record_count).sum(),
            bytes: files.iter().map(|f| f.size).sum(),
            partitions: files
                .iter()
                .filter(|f| !f.partition.is_empty())
                .map(|f| &f.partition)
                .collect::<BTreeSet<_>>()
                .len(),
            deleted,
        };

        stream::iter(files)
            .map(|file| self.upload(table.name, file))
            .buffer_unordered(self.max_concurrent_uploads)
            .try_collect::<()>()
            .await?;

        self.storage
            .put(format!("{}/{}", table.name, SUCCESS_MARKER), bytes::Bytes::new())
            .await
            .context(TableWriteSnafu { table: table.name })?;

        info!(
            "Wrote {}: {} rows in {} files ({} bytes, {} partitions) in {:?}",
            summary.table,
            summary.rows,
            summary.files,
            summary.bytes,
            summary.partitions,
            start.elapsed()
        );
        emit!(TableWritten {
            table: summary.table.clone(),
            rows: summary.rows as u64,
            files: summary.files as u64,
            bytes: summary.bytes as u64,
            duration: start.elapsed(),
        });

        Ok(summary)
    }

    async fn upload(&self, table: &str, file: FinishedFile) -> Result<(), PipelineError> {
        let location = file.location(table);
        debug!("Uploading {} ({} bytes)", location, file.size);
        self.storage
            .put(location, file.bytes)
            .await
            .context(TableWriteSnafu { table })
    }
}

/// Encode every row of `table`, one partition at a time.
fn encode(table: &Table, config: ParquetWriterConfig) -> Result<Vec<FinishedFile>, ParquetError> {
    let mut partitions: BTreeMap<PartitionValues, Vec<_>> = BTreeMap::new();
    for batch in &table.batches {
        for (values, rows) in split_by_partition(batch, table.partition_by)? {
            partitions.entry(values).or_default().push(rows);
        }
    }

    let mut writer = ParquetWriter::new(file_schema(&table.schema, table.partition_by), config)?;
    for (values, batches) in partitions {
        writer.set_partition(values)?;
        for batch in &batches {
            writer.write_batch(batch)?;
        }
    }
    writer.close()
}
