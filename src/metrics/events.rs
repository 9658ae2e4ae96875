//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence during a run.
//! Events implement the `InternalEvent` trait which records the corresponding
//! counter, gauge or histogram.

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Which raw document source a read belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentSource {
    Catalog,
    Activity,
}

impl DocumentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentSource::Catalog => "catalog",
            DocumentSource::Activity => "activity",
        }
    }
}

/// Event emitted when documents have been decoded from an input file.
pub struct DocumentsRead {
    pub source: DocumentSource,
    pub count: u64,
}

impl InternalEvent for DocumentsRead {
    fn emit(self) {
        trace!(
            source = self.source.as_str(),
            count = self.count,
            "Documents read"
        );
        counter!("playlake_documents_read_total", "source" => self.source.as_str())
            .increment(self.count);
    }
}

/// Event emitted when raw bytes are read from an input file.
pub struct BytesRead {
    pub bytes: u64,
}

impl InternalEvent for BytesRead {
    fn emit(self) {
        trace!(bytes = self.bytes, "Bytes read");
        counter!("playlake_bytes_read_total").increment(self.bytes);
    }
}

/// Event emitted after the song-play filter ran over the activity documents.
pub struct ActivityFiltered {
    pub kept: u64,
    pub dropped: u64,
}

impl InternalEvent for ActivityFiltered {
    fn emit(self) {
        trace!(kept = self.kept, dropped = self.dropped, "Activity filtered");
        counter!("playlake_activity_records_total", "outcome" => "song_play").increment(self.kept);
        counter!("playlake_activity_records_total", "outcome" => "other").increment(self.dropped);
    }
}

/// Event emitted once the fact join has run.
pub struct JoinCompleted {
    /// Activity records with exactly one catalog match.
    pub matched: u64,
    /// Activity records with no catalog match.
    pub unmatched: u64,
    /// Activity records with more than one catalog match.
    pub multi_matched: u64,
}

impl InternalEvent for JoinCompleted {
    fn emit(self) {
        trace!(
            matched = self.matched,
            unmatched = self.unmatched,
            multi_matched = self.multi_matched,
            "Join completed"
        );
        counter!("playlake_join_records_total", "outcome" => "matched").increment(self.matched);
        counter!("playlake_join_records_total", "outcome" => "unmatched")
            .increment(self.unmatched);
        counter!("playlake_join_records_total", "outcome" => "multi_matched")
            .increment(self.multi_matched);
    }
}

/// Event emitted when rows are dropped because a partition key is null.
pub struct RowsSkipped {
    pub table: &'static str,
    pub count: u64,
}

impl InternalEvent for RowsSkipped {
    fn emit(self) {
        trace!(table = self.table, count = self.count, "Rows skipped");
        counter!("playlake_rows_skipped_total", "table" => self.table).increment(self.count);
    }
}

/// Event emitted after a table has been written.
pub struct TableWritten {
    pub table: String,
    pub rows: u64,
    pub files: u64,
    pub bytes: u64,
    pub duration: Duration,
}

impl InternalEvent for TableWritten {
    fn emit(self) {
        trace!(
            table = %self.table,
            rows = self.rows,
            files = self.files,
            bytes = self.bytes,
            duration_ms = self.duration.as_millis(),
            "Table written"
        );
        counter!("playlake_rows_written_total", "table" => self.table.clone())
            .increment(self.rows);
        counter!("playlake_files_written_total", "table" => self.table.clone())
            .increment(self.files);
        counter!("playlake_bytes_written_total", "table" => self.table.clone())
            .increment(self.bytes);
        histogram!("playlake_table_write_duration_seconds", "table" => self.table)
            .record(self.duration.as_secs_f64());
    }
}

/// Event emitted when prior output objects are removed before a rewrite.
pub struct ObjectsDeleted {
    pub count: u64,
}

impl InternalEvent for ObjectsDeleted {
    fn emit(self) {
        trace!(count = self.count, "Objects deleted");
        counter!("playlake_objects_deleted_total").increment(self.count);
    }
}

// ============================================================================
// Histogram events for timing
// ============================================================================

/// Event emitted when a file download completes.
pub struct FileDownloadCompleted {
    pub duration: Duration,
}

impl InternalEvent for FileDownloadCompleted {
    fn emit(self) {
        trace!(
            duration_ms = self.duration.as_millis(),
            "File download completed"
        );
        histogram!("playlake_file_download_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a file has been decompressed and decoded.
pub struct FileDecodeCompleted {
    pub duration: Duration,
}

impl InternalEvent for FileDecodeCompleted {
    fn emit(self) {
        trace!(duration_ms = self.duration.as_millis(), "File decode completed");
        histogram!("playlake_file_decode_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a Parquet file has been encoded.
pub struct ParquetWriteCompleted {
    pub duration: Duration,
}

impl InternalEvent for ParquetWriteCompleted {
    fn emit(self) {
        trace!(
            duration_ms = self.duration.as_millis(),
            "Parquet write completed"
        );
        histogram!("playlake_parquet_write_duration_seconds").record(self.duration.as_secs_f64());
    }
}

// ============================================================================
// Storage operation events
// ============================================================================

/// Storage operation types.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    Get,
    Put,
    List,
    Delete,
}

impl StorageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::Get => "get",
            StorageOperation::Put => "put",
            StorageOperation::List => "list",
            StorageOperation::Delete => "delete",
        }
    }
}

/// Status of a storage request.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    pub fn from_result<T, E>(result: &Result<T, E>) -> Self {
        if result.is_ok() {
            RequestStatus::Success
        } else {
            RequestStatus::Error
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// Event emitted when a storage request completes.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
    pub duration: Duration,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            status = self.status.as_str(),
            duration_ms = self.duration.as_millis(),
            "Storage request"
        );
        counter!(
            "playlake_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
        histogram!(
            "playlake_storage_request_duration_seconds",
            "operation" => self.operation.as_str()
        )
        .record(self.duration.as_secs_f64());
    }
}
