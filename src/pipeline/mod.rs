//! Batch pipeline.
//!
//! One run reads the catalog documents, writes `songs` and `artists`, then
//! reads the activity documents and writes `users`, `time` and `songplays`.
//! The catalog documents are read once and handed to the activity stage for
//! the fact join.
//!
//! Downloads run concurrently on tokio tasks and decoding runs on tokio's
//! blocking pool; the transforms themselves are plain functions over batches.

use chrono::FixedOffset;
use snafu::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::config::Config;
use crate::error::{ConfigSnafu, PipelineError, PipelineStorageSnafu, TransformSnafu};
use crate::schema::tables;
use crate::sink::{TableWriter, WriteSummary};
use crate::source::{DocumentLoader, Documents};
use crate::storage::{StorageProvider, StorageProviderRef};
use crate::transform::{
    JoinStats, SongplayIdGenerator, build_songplays, derive_time_table, extract_catalog,
    extract_users, filter_song_plays,
};

/// Statistics about the pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub catalog_files: usize,
    pub catalog_documents: usize,
    pub activity_files: usize,
    pub activity_documents: usize,
    pub song_plays: usize,
    pub join: JoinStats,
    /// One entry per table, in the order they were written.
    pub tables: Vec<WriteSummary>,
}

impl PipelineStats {
    pub fn rows_written(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }

    pub fn files_written(&self) -> usize {
        self.tables.iter().map(|t| t.files).sum()
    }

    pub fn bytes_written(&self) -> usize {
        self.tables.iter().map(|t| t.bytes).sum()
    }

    pub fn table(&self, name: &str) -> Option<&WriteSummary> {
        self.tables.iter().find(|t| t.table == name)
    }
}

/// Input files a run would read.
#[derive(Debug, Clone, Default)]
pub struct InputListing {
    pub catalog_files: Vec<String>,
    pub activity_files: Vec<String>,
}

pub struct Pipeline {
    config: Config,
    offset: FixedOffset,
    input_storage: StorageProviderRef,
    writer: TableWriter,
}

impl Pipeline {
    /// Create a pipeline from configuration, connecting to both storages.
    pub async fn new(config: Config) -> Result<Self, PipelineError> {
        let offset = config.time.offset().context(ConfigSnafu)?;

        let input_storage = Arc::new(
            StorageProvider::for_url_with_options(
                &config.input.path,
                config.input.storage_options.clone(),
            )
            .await
            .context(PipelineStorageSnafu)?,
        );

        let output_storage = Arc::new(
            StorageProvider::for_url_with_options(
                &config.output.path,
                config.output.storage_options.clone(),
            )
            .await
            .context(PipelineStorageSnafu)?,
        );

        let writer = TableWriter::new(output_storage, &config.output);

        Ok(Self {
            config,
            offset,
            input_storage,
            writer,
        })
    }

    fn catalog_loader(&self) -> DocumentLoader {
        DocumentLoader::catalog(self.input_storage.clone(), &self.config.input)
    }

    fn activity_loader(&self) -> DocumentLoader {
        DocumentLoader::activity(self.input_storage.clone(), &self.config.input)
    }

    /// List the input files without reading or writing anything.
    pub async fn list_inputs(&self) -> Result<InputListing, PipelineError> {
        Ok(InputListing {
            catalog_files: self.catalog_loader().list().await?,
            activity_files: self.activity_loader().list().await?,
        })
    }

    /// Run both stages and return what was written.
    pub async fn run(&self) -> Result<PipelineStats, PipelineError> {
        let start = Instant::now();
        info!(
            "Starting pipeline from {} (timezone offset {})",
            self.input_storage.canonical_url(),
            self.offset
        );

        let mut stats = PipelineStats::default();
        let catalog = self.process_song_data(&mut stats).await?;
        self.process_log_data(&catalog, &mut stats).await?;

        info!(
            "Pipeline completed in {:?}: {} rows in {} files ({} bytes)",
            start.elapsed(),
            stats.rows_written(),
            stats.files_written(),
            stats.bytes_written()
        );
        Ok(stats)
    }

    /// Read the catalog and write `songs` and `artists`.
    ///
    /// Returns the decoded catalog documents for the fact join.
    async fn process_song_data(
        &self,
        stats: &mut PipelineStats,
    ) -> Result<Documents, PipelineError> {
        let catalog = self.catalog_loader().load().await?;
        stats.catalog_files = catalog.files;
        stats.catalog_documents = catalog.num_rows();
        info!(
            "Read {} catalog documents from {} files",
            stats.catalog_documents, stats.catalog_files
        );

        let tables = extract_catalog(&catalog.batches).context(TransformSnafu {
            table: "catalog",
        })?;

        stats.tables.push(self.writer.write(&tables.songs).await?);
        stats.tables.push(self.writer.write(&tables.artists).await?);

        Ok(catalog)
    }

    /// Read the activity logs and write `users`, `time` and `songplays`.
    async fn process_log_data(
        &self,
        catalog: &Documents,
        stats: &mut PipelineStats,
    ) -> Result<(), PipelineError> {
        let activity = self.activity_loader().load().await?;
        stats.activity_files = activity.files;
        stats.activity_documents = activity.num_rows();
        info!(
            "Read {} activity documents from {} files",
            stats.activity_documents, stats.activity_files
        );

        let filtered = filter_song_plays(&activity.batches).context(TransformSnafu {
            table: "activity",
        })?;
        stats.song_plays = filtered.num_rows();
        info!(
            "{} of {} activity documents are song plays",
            stats.song_plays, stats.activity_documents
        );

        let users = extract_users(&filtered).context(TransformSnafu {
            table: tables::USERS,
        })?;
        stats.tables.push(self.writer.write(&users).await?);

        let time = derive_time_table(&filtered, self.offset).context(TransformSnafu {
            table: tables::TIME,
        })?;
        stats.tables.push(self.writer.write(&time).await?);

        let mut ids = SongplayIdGenerator::new();
        let songplays = build_songplays(&filtered, &catalog.batches, self.offset, &mut ids)
            .context(TransformSnafu {
                table: tables::SONGPLAYS,
            })?;
        stats.join = songplays.stats;
        stats.tables.push(self.writer.write(&songplays.table).await?);

        Ok(())
    }
}

/// Build a pipeline from `config` and run it once.
pub async fn run_pipeline(config: Config) -> Result<PipelineStats, PipelineError> {
    let pipeline = Pipeline::new(config).await?;
    pipeline.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;

    #[test]
    fn test_pipeline_stats_totals() {
        let stats = PipelineStats {
            tables: vec![
                WriteSummary {
                    table: "songs".to_string(),
                    files: 2,
                    rows: 10,
                    bytes: 100,
                    partitions: 2,
                    deleted: 0,
                },
                WriteSummary {
                    table: "artists".to_string(),
                    files: 1,
                    rows: 5,
                    bytes: 50,
                    partitions: 0,
                    deleted: 0,
                },
            ],
            ..Default::default()
        };
        assert_eq!(stats.rows_written(), 15);
        assert_eq!(stats.files_written(), 3);
        assert_eq!(stats.bytes_written(), 150);
        assert_eq!(stats.table("artists").map(|t| t.rows), Some(5));
        assert!(stats.table("users").is_none());
    }

    #[tokio::test]
    async fn test_invalid_timezone_fails_before_io() {
        let mut config = Config::from_yaml(
            "input:\n  path: /nonexistent/in\noutput:\n  path: /nonexistent/out\n",
            false,
        )
        .unwrap();
        config.time.timezone = "Mars/Olympus".to_string();

        let err = Pipeline::new(config).await.err().unwrap();
        assert!(matches!(
            err,
            PipelineError::Config {
                source: ConfigError::InvalidTimezone { .. }
            }
        ));
    }
}
