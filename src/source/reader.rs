//! Line-delimited JSON reader.
//!
//! Decompresses a raw input file and decodes its documents into Arrow
//! RecordBatches projected onto a fixed schema.

use bytes::Bytes;
use deltalake::arrow::array::RecordBatch;
use deltalake::arrow::datatypes::SchemaRef;
use deltalake::arrow::json::ReaderBuilder;
use snafu::prelude::*;
use std::io::Read;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::CompressionFormat;
use crate::emit;
use crate::error::{
    BatchFlushSnafu, DecoderBuildSnafu, GzipDecompressionSnafu, JsonDecodeSnafu, ReaderError,
    ZstdDecompressionSnafu,
};
use crate::metrics::events::{BytesRead, FileDecodeCompleted};

/// Configuration for the NDJSON reader.
#[derive(Debug, Clone)]
pub struct NdjsonReaderConfig {
    /// Number of documents per batch.
    pub batch_size: usize,
    /// Compression format of input files.
    pub compression: CompressionFormat,
}

impl NdjsonReaderConfig {
    pub fn new(batch_size: usize, compression: CompressionFormat) -> Self {
        Self {
            batch_size,
            compression,
        }
    }
}

/// Documents decoded from a single file.
#[derive(Debug)]
pub struct ReadResult {
    pub batches: Vec<RecordBatch>,
    pub total_records: usize,
}

/// Decodes line-delimited JSON into batches of a fixed schema.
///
/// Fields absent from the schema are ignored and schema fields absent from a
/// document decode as null. Scalars are coerced into string columns, so a
/// numeric `userId` still lands in the Utf8 column.
pub struct NdjsonReader {
    schema: SchemaRef,
    config: NdjsonReaderConfig,
}

impl NdjsonReader {
    pub fn new(schema: SchemaRef, config: NdjsonReaderConfig) -> Self {
        Self { schema, config }
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn decompress(&self, raw: &Bytes, path: &str) -> Result<Bytes, ReaderError> {
        let decompressed = match self.config.compression {
            CompressionFormat::Gzip => {
                let mut decoder = flate2::read::GzDecoder::new(&raw[..]);
                let mut buf = Vec::new();
                decoder
                    .read_to_end(&mut buf)
                    .context(GzipDecompressionSnafu { path })?;
                Bytes::from(buf)
            }
            CompressionFormat::Zstd => Bytes::from(
                zstd::decode_all(&raw[..]).context(ZstdDecompressionSnafu { path })?,
            ),
            CompressionFormat::None => raw.clone(),
        };
        Ok(decompressed)
    }

    /// Decompress `raw` and decode every document it contains.
    ///
    /// `path` is only used for error messages and logging.
    pub fn read(&self, raw: Bytes, path: &str) -> Result<ReadResult, ReaderError> {
        emit!(BytesRead {
            bytes: raw.len() as u64,
        });

        let start = Instant::now();
        let data = self.decompress(&raw, path)?;
        debug!(
            "Decompressed {} -> {} bytes for {}",
            raw.len(),
            data.len(),
            path
        );

        let mut decoder = ReaderBuilder::new(Arc::clone(&self.schema))
            .with_batch_size(self.config.batch_size)
            .with_strict_mode(false)
            .with_coerce_primitive(true)
            .build_decoder()
            .context(DecoderBuildSnafu)?;

        // decode() stops after batch_size documents, so flush after every call
        let mut offset = 0;
        let mut batches = Vec::new();
        let mut total_records = 0;

        loop {
            let consumed = decoder
                .decode(&data[offset..])
                .context(JsonDecodeSnafu { path })?;

            if let Some(batch) = decoder.flush().context(BatchFlushSnafu { path })? {
                total_records += batch.num_rows();
                batches.push(batch);
            }

            if consumed == 0 {
                let remaining = &data[offset..];
                if !remaining.iter().all(|b| b.is_ascii_whitespace()) {
                    warn!(
                        "Ignoring {} undecodable trailing bytes in {}",
                        remaining.len(),
                        path
                    );
                }
                break;
            }
            offset += consumed;
        }

        emit!(FileDecodeCompleted {
            duration: start.elapsed()
        });
        debug!(
            "Parsed {} batches ({} records) from {}",
            batches.len(),
            total_records,
            path
        );

        Ok(ReadResult {
            batches,
            total_records,
        })
    }
}
