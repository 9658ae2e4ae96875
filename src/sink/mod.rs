//! Output side: Parquet encoding, Hive-style partitioning and table upload.

pub mod parquet;
pub mod partition;
pub mod writer;

pub use partition::PartitionValues;
pub use writer::{TableWriter, WriteSummary};

use object_store::path::Path;
use std::iter;

/// An encoded Parquet file waiting to be uploaded.
#[derive(Debug, Clone)]
pub struct FinishedFile {
    /// File name within its partition directory.
    pub file_name: String,
    /// Size of the encoded file in bytes.
    pub size: usize,
    /// Number of records in the file.
    pub record_count: usize,
    /// The encoded file.
    pub bytes: bytes::Bytes,
    /// Partition the file belongs to; empty for unpartitioned tables.
    pub partition: PartitionValues,
}

impl FinishedFile {
    /// Object path of the file under the output root.
    ///
    /// Each segment is percent-encoded by `object_store`, so a partition value
    /// containing `/` cannot escape its directory.
    pub fn location(&self, table: &str) -> Path {
        iter::once(table.to_string())
            .chain(self.partition.segments())
            .chain(iter::once(self.file_name.clone()))
            .collect()
    }
}
