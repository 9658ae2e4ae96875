//! Raw document sources.
//!
//! Lists the input files of one source, downloads them concurrently and
//! decodes them into batches. Files are read in sorted path order, so the
//! resulting batches are deterministic for a given input tree.

pub mod reader;

pub use reader::{NdjsonReader, NdjsonReaderConfig};

use deltalake::arrow::array::RecordBatch;
use deltalake::arrow::datatypes::SchemaRef;
use futures::stream::{self, StreamExt, TryStreamExt};
use snafu::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::InputConfig;
use crate::emit;
use crate::error::{DecodeTaskSnafu, PipelineError, PipelineStorageSnafu, ReaderSnafu};
use crate::metrics::events::{DocumentSource, DocumentsRead, FileDownloadCompleted};
use crate::schema::{activity_document_schema, catalog_document_schema};
use crate::storage::StorageProviderRef;

/// Every document decoded from one source.
#[derive(Debug, Clone)]
pub struct Documents {
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
    pub files: usize,
}

impl Documents {
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }
}

/// A file that has been downloaded and decoded.
struct ProcessedFile {
    path: String,
    batches: Vec<RecordBatch>,
    total_records: usize,
}

/// Reads one document source under the input root.
pub struct DocumentLoader {
    storage: StorageProviderRef,
    source: DocumentSource,
    prefix: String,
    extension: String,
    reader: Arc<NdjsonReader>,
    max_concurrent_files: usize,
}

impl DocumentLoader {
    /// Loader for the song catalog under `<input>/<song_data>`.
    pub fn catalog(storage: StorageProviderRef, config: &InputConfig) -> Self {
        Self::new(
            storage,
            DocumentSource::Catalog,
            &config.song_data,
            catalog_document_schema(),
            config,
        )
    }

    /// Loader for the activity logs under `<input>/<log_data>`.
    pub fn activity(storage: StorageProviderRef, config: &InputConfig) -> Self {
        Self::new(
            storage,
            DocumentSource::Activity,
            &config.log_data,
            activity_document_schema(),
            config,
        )
    }

    fn new(
        storage: StorageProviderRef,
        source: DocumentSource,
        prefix: &str,
        schema: SchemaRef,
        config: &InputConfig,
    ) -> Self {
        let reader = NdjsonReader::new(
            schema,
            NdjsonReaderConfig::new(config.batch_size, config.compression),
        );
        Self {
            storage,
            source,
            prefix: prefix.trim_matches('/').to_string(),
            extension: config.extension.clone(),
            reader: Arc::new(reader),
            max_concurrent_files: config.max_concurrent_files.max(1),
        }
    }

    /// List the files this loader would read, sorted by path.
    pub async fn list(&self) -> Result<Vec<String>, PipelineError> {
        self.storage
            .list_files(&self.prefix, &self.extension)
            .await
            .context(PipelineStorageSnafu)
    }

    /// Download and decode every file of the source.
    ///
    /// Up to `max_concurrent_files` files are in flight at once, but batches
    /// are returned in path order.
    pub async fn load(&self) -> Result<Documents, PipelineError> {
        let files = self.list().await?;
        info!(
            "Found {} {} files under {}/{}",
            files.len(),
            self.source.as_str(),
            self.storage.canonical_url(),
            self.prefix
        );

        let processed: Vec<ProcessedFile> = stream::iter(files)
            .map(|path| self.process_file(path))
            .buffered(self.max_concurrent_files)
            .try_collect()
            .await?;

        let files = processed.len();
        let mut batches = Vec::new();
        for file in processed {
            debug!("Read {} records from {}", file.total_records, file.path);
            emit!(DocumentsRead {
                source: self.source,
                count: file.total_records as u64,
            });
            batches.extend(file.batches);
        }

        Ok(Documents {
            schema: self.reader.schema().clone(),
            batches,
            files,
        })
    }

    async fn process_file(&self, path: String) -> Result<ProcessedFile, PipelineError> {
        let start = Instant::now();
        let raw = self
            .storage
            .get(path.as_str())
            .await
            .context(PipelineStorageSnafu)?;
        emit!(FileDownloadCompleted {
            duration: start.elapsed()
        });

        let reader = Arc::clone(&self.reader);
        let task_path = path.clone();
        let result = tokio::task::spawn_blocking(move || reader.read(raw, &task_path))
            .await
            .context(DecodeTaskSnafu { path: &path })
            .context(ReaderSnafu)?;

        let result = result.context(ReaderSnafu)?;
        Ok(ProcessedFile {
            path,
            batches: result.batches,
            total_records: result.total_records,
        })
    }
}
