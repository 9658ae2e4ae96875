//! Error types for playlake using snafu.
//!
//! Every stage of the run has its own error enum with context selectors;
//! `PipelineError` aggregates them at the top level.

use deltalake::arrow::error::ArrowError;
use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed: {source}"))]
    ObjectStore { source: object_store::Error },

    /// IO error during storage operations.
    #[snafu(display("IO error: {source}"))]
    Io { source: std::io::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error: {source}"))]
    S3Config { source: object_store::Error },
}

impl StorageError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Input root is empty.
    #[snafu(display("Input path cannot be empty"))]
    EmptyInputPath,

    /// Output root is empty.
    #[snafu(display("Output path cannot be empty"))]
    EmptyOutputPath,

    /// Batch size of zero would never make progress.
    #[snafu(display("Input batch_size must be greater than zero"))]
    ZeroBatchSize,

    /// Timezone setting could not be parsed as a fixed UTC offset.
    #[snafu(display("Invalid timezone '{value}': expected UTC, Z, +HH:MM or -HH:MM"))]
    InvalidTimezone { value: String },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file: {source}"))]
    ReadFile { source: std::io::Error },
}

// ============ Reader Errors ============

/// Errors that can occur while reading line-delimited JSON documents.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReaderError {
    /// Gzip decompression failed.
    #[snafu(display("Gzip decompression failed for {path}: {source}"))]
    GzipDecompression {
        source: std::io::Error,
        path: String,
    },

    /// Zstd decompression failed.
    #[snafu(display("Zstd decompression failed for {path}: {source}"))]
    ZstdDecompression {
        source: std::io::Error,
        path: String,
    },

    /// Failed to build JSON decoder.
    #[snafu(display("Failed to build JSON decoder: {source}"))]
    DecoderBuild { source: ArrowError },

    /// Failed to decode JSON.
    #[snafu(display("Failed to decode JSON for {path}: {source}"))]
    JsonDecode { path: String, source: ArrowError },

    /// Failed to flush decoded rows into a batch.
    #[snafu(display("Failed to flush batch for {path}: {source}"))]
    BatchFlush { path: String, source: ArrowError },

    /// Blocking decode task panicked or was cancelled.
    #[snafu(display("Decode task failed for {path}: {source}"))]
    DecodeTask {
        path: String,
        source: tokio::task::JoinError,
    },
}

// ============ Transform Errors ============

/// Errors raised by Arrow kernels while deriving the output tables.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TransformError {
    /// An Arrow compute kernel failed.
    #[snafu(display("Failed to {operation}: {source}"))]
    Compute {
        operation: &'static str,
        source: ArrowError,
    },

    /// A required column is absent from a batch.
    #[snafu(display("Column '{column}' not found"))]
    MissingColumn { column: String },

    /// A column has a different type than the table schema expects.
    #[snafu(display("Column '{column}' has unexpected type"))]
    ColumnType { column: String },
}

// ============ Parquet Errors ============

/// Errors that can occur during Parquet file writing.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ParquetError {
    /// Parquet write error.
    #[snafu(display("Parquet write error: {source}"))]
    Write {
        source: deltalake::parquet::errors::ParquetError,
    },

    /// Failed to create Parquet writer.
    #[snafu(display("Failed to create Parquet writer: {source}"))]
    WriterCreate {
        source: deltalake::parquet::errors::ParquetError,
    },

    /// Writer is not available (internal state error).
    #[snafu(display("Parquet writer is not available"))]
    WriterUnavailable,

    /// Failed to strip partition columns from a batch.
    #[snafu(display("Failed to project partition batch: {source}"))]
    PartitionProjection { source: ArrowError },

    /// Blocking encode task panicked or was cancelled.
    #[snafu(display("Parquet encode task failed: {source}"))]
    EncodeTask { source: tokio::task::JoinError },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder: {source}"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },

    /// Failed to bind the metrics listener.
    #[snafu(display("Failed to bind metrics server to {addr}: {source}"))]
    MetricsBind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },
}

// ============ Pipeline Error (top-level) ============

/// Top-level pipeline errors that aggregate all error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Storage error.
    #[snafu(display("Storage error"))]
    PipelineStorage { source: StorageError },

    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// Reader error.
    #[snafu(display("Reader error"))]
    Reader { source: ReaderError },

    /// Transform error.
    #[snafu(display("Transform error in {table}"))]
    Transform {
        table: &'static str,
        source: TransformError,
    },

    /// Parquet error.
    #[snafu(display("Parquet error while writing {table}"))]
    Parquet {
        table: String,
        source: ParquetError,
    },

    /// Upload or overwrite of a table failed.
    #[snafu(display("Failed to write table {table}"))]
    TableWrite {
        table: String,
        source: StorageError,
    },

    /// Address parsing error.
    #[snafu(display("Failed to parse address"))]
    AddressParse { source: std::net::AddrParseError },

    /// Metrics error.
    #[snafu(display("Metrics error"))]
    Metrics { source: MetricsError },
}
