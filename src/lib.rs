//! playlake: batch ETL from a song catalog and listening logs to a
//! partitioned Parquet star schema.
//!
//! Reads line-delimited JSON catalog (`song_data`) and activity (`log_data`)
//! documents and writes five tables: `songs`, `artists`, `users`, `time` and
//! the `songplays` fact table.
//!
//! # Example
//!
//! ```ignore
//! use playlake::{Config, run_pipeline, error::PipelineError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), PipelineError> {
//!     let config = Config::from_file("playlake.yaml")
//!         .context(playlake::error::ConfigSnafu)?;
//!     let stats = run_pipeline(config).await?;
//!     println!("Wrote {} rows", stats.rows_written());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod schema;
pub mod sink;
pub mod source;
pub mod storage;
pub mod transform;

// Re-export main types
pub use config::Config;
pub use pipeline::{InputListing, Pipeline, PipelineStats, run_pipeline};
pub use storage::{StorageProvider, StorageProviderRef};
