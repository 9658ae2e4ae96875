//! Run configuration.
//!
//! Loaded once from a YAML file (with environment variable interpolation so
//! credentials can stay out of the file) and passed by reference into the
//! pipelines. Nothing here is mutated after `Config::from_file` returns.

mod vars;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{
    ConfigError, EmptyInputPathSnafu, EmptyOutputPathSnafu, EnvInterpolationSnafu,
    InvalidTimezoneSnafu, ReadFileSnafu, YamlParseSnafu, ZeroBatchSizeSnafu,
};

/// Byte size constants (binary/IEC units).
pub const KB: usize = 1024;
pub const MB: usize = 1024 * KB;

/// Main configuration structure for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub input: InputConfig,
    pub output: OutputConfig,
    /// Timezone used to decompose activity timestamps.
    #[serde(default)]
    pub time: TimeConfig,
    /// Metrics configuration (optional, disabled by default).
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Where the raw catalog and activity documents live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Root of both document sources.
    /// Examples: "s3://udacity-dend/", "/data/raw"
    pub path: String,

    /// Sub-path of the catalog documents under `path` (default: "song_data").
    #[serde(default = "default_song_data")]
    pub song_data: String,

    /// Sub-path of the activity documents under `path` (default: "log_data").
    #[serde(default = "default_log_data")]
    pub log_data: String,

    /// File name suffix of documents to read (default: ".json").
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Compression format of input files.
    #[serde(default)]
    pub compression: CompressionFormat,

    /// Storage options (credentials, region, etc.)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,

    /// Batch size for decoding records (default: 8192)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum number of files downloaded concurrently (default: 16)
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,
}

fn default_song_data() -> String {
    "song_data".to_string()
}

fn default_log_data() -> String {
    "log_data".to_string()
}

fn default_extension() -> String {
    ".json".to_string()
}

fn default_batch_size() -> usize {
    8192
}

fn default_max_concurrent_files() -> usize {
    16
}

/// Where the five output tables are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root under which `songs`, `artists`, `users`, `time` and `songplays`
    /// are written.
    pub path: String,

    /// Storage options (credentials, region, etc.)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,

    /// Parquet compression codec.
    #[serde(default)]
    pub compression: ParquetCompression,

    /// Target file size in MB (default: 128)
    #[serde(default = "default_file_size_mb")]
    pub file_size_mb: usize,

    /// Target row group size in bytes (default: 128MB)
    #[serde(default = "default_row_group_size_bytes")]
    pub row_group_size_bytes: usize,

    /// Maximum number of files uploaded in parallel (default: 8)
    #[serde(default = "default_max_concurrent_uploads")]
    pub max_concurrent_uploads: usize,
}

fn default_file_size_mb() -> usize {
    128
}

fn default_row_group_size_bytes() -> usize {
    128 * MB
}

fn default_max_concurrent_uploads() -> usize {
    8
}

/// Timezone settings for timestamp decomposition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeConfig {
    /// Fixed UTC offset: "UTC", "Z", "+HH:MM" or "-HH:MM" (default: "UTC").
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
        }
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl TimeConfig {
    /// Parse the configured timezone into a fixed offset.
    pub fn offset(&self) -> Result<FixedOffset, ConfigError> {
        parse_offset(&self.timezone).context(InvalidTimezoneSnafu {
            value: self.timezone.clone(),
        })
    }
}

/// Parse "UTC", "Z", "+HH:MM", "-HH:MM" or "+HHMM" into a fixed offset.
fn parse_offset(value: &str) -> Option<FixedOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("utc") || value == "Z" {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match value.as_bytes().first()? {
        b'+' => (1, &value[1..]),
        b'-' => (-1, &value[1..]),
        _ => return None,
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 => rest.split_at(2),
        None => (rest, "0"),
    };
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Metrics configuration for the Prometheus endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether the Prometheus endpoint is started (default: false).
    #[serde(default)]
    pub enabled: bool,
    /// Address to bind the metrics HTTP server (default: "0.0.0.0:9090").
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

/// Compression format for source files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompressionFormat {
    #[default]
    None,
    Gzip,
    Zstd,
}

/// Parquet compression codec.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    Uncompressed,
    #[default]
    Snappy,
    Gzip,
    Zstd,
    Lz4,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_options(path, true)
    }

    /// Load configuration from a YAML file with optional environment variable interpolation.
    pub fn from_file_with_options(
        path: impl AsRef<Path>,
        interpolate_env: bool,
    ) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).context(ReadFileSnafu)?;
        Self::from_yaml(&content, interpolate_env)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str, interpolate_env: bool) -> Result<Self, ConfigError> {
        let content = if interpolate_env {
            let result = vars::interpolate(content);
            if !result.is_ok() {
                let error_msg = result.errors.join("\n");
                return EnvInterpolationSnafu { message: error_msg }.fail();
            }
            result.text
        } else {
            content.to_string()
        };

        let config: Config = serde_yaml::from_str(&content).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.input.path.trim().is_empty(), EmptyInputPathSnafu);
        ensure!(!self.output.path.trim().is_empty(), EmptyOutputPathSnafu);
        ensure!(self.input.batch_size > 0, ZeroBatchSizeSnafu);
        self.time.offset()?;
        Ok(())
    }
}
