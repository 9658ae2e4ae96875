//! Parquet file writer.
//!
//! Encodes Arrow RecordBatches into in-memory Parquet files with configurable
//! compression, flushing row groups by size and rolling files at a target
//! size.

use bytes::{BufMut, Bytes, BytesMut};
use deltalake::arrow::array::RecordBatch;
use deltalake::arrow::datatypes::SchemaRef;
use deltalake::parquet::arrow::ArrowWriter;
use deltalake::parquet::basic::{Compression, GzipLevel, ZstdLevel};
use deltalake::parquet::file::properties::WriterProperties;
use snafu::prelude::*;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::debug;
use uuid::Uuid;

use super::{FinishedFile, PartitionValues};
use crate::config::{MB, OutputConfig, ParquetCompression};
use crate::emit;
use crate::error::{ParquetError, WriteSnafu, WriterCreateSnafu, WriterUnavailableSnafu};
use crate::metrics::events::ParquetWriteCompleted;

/// Initial capacity of a file buffer.
const BUFFER_CAPACITY: usize = 8 * MB;

/// A buffer with interior mutability for the ArrowWriter.
#[derive(Clone)]
struct SharedBuffer {
    buffer: Arc<Mutex<bytes::buf::Writer<BytesMut>>>,
}

impl SharedBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(BytesMut::with_capacity(capacity).writer())),
        }
    }

    /// Take the bytes written so far, leaving the buffer empty.
    fn take(&self) -> Bytes {
        let mut guard = self
            .buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.get_mut().split().freeze()
    }

    fn len(&self) -> usize {
        self.buffer
            .lock()
            .map(|guard| guard.get_ref().len())
            .unwrap_or(0)
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut buffer = self.buffer.try_lock().map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::WouldBlock, "buffer lock contention")
        })?;
        Write::write(&mut *buffer, buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Configuration for the Parquet writer.
#[derive(Debug, Clone)]
pub struct ParquetWriterConfig {
    /// Files roll once they reach this many bytes.
    pub target_file_size: usize,
    /// Row groups are flushed when the in-progress data exceeds this many bytes.
    pub row_group_size_bytes: usize,
    pub compression: ParquetCompression,
}

impl Default for ParquetWriterConfig {
    fn default() -> Self {
        Self {
            target_file_size: 128 * MB,
            row_group_size_bytes: 128 * MB,
            compression: ParquetCompression::Snappy,
        }
    }
}

impl ParquetWriterConfig {
    pub fn from_output(config: &OutputConfig) -> Self {
        Self::default()
            .with_file_size_mb(config.file_size_mb)
            .with_row_group_size_bytes(config.row_group_size_bytes)
            .with_compression(config.compression)
    }

    pub fn with_file_size_mb(mut self, size_mb: usize) -> Self {
        self.target_file_size = size_mb * MB;
        self
    }

    pub fn with_compression(mut self, compression: ParquetCompression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_row_group_size_bytes(mut self, size_bytes: usize) -> Self {
        self.row_group_size_bytes = size_bytes;
        self
    }

    fn writer_properties(&self) -> WriterProperties {
        let compression = match self.compression {
            ParquetCompression::Uncompressed => Compression::UNCOMPRESSED,
            ParquetCompression::Snappy => Compression::SNAPPY,
            ParquetCompression::Gzip => Compression::GZIP(GzipLevel::default()),
            ParquetCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
            ParquetCompression::Lz4 => Compression::LZ4,
        };
        WriterProperties::builder()
            .set_compression(compression)
            .build()
    }
}

/// Encodes batches of one schema into a sequence of Parquet files.
///
/// Batches are written into the current partition; switching partitions or
/// crossing the target size closes the current file.
pub struct ParquetWriter {
    schema: SchemaRef,
    config: ParquetWriterConfig,
    writer: Option<ArrowWriter<SharedBuffer>>,
    buffer: SharedBuffer,
    records_written: usize,
    finished_files: Vec<FinishedFile>,
    partition: PartitionValues,
}

impl ParquetWriter {
    pub fn new(schema: SchemaRef, config: ParquetWriterConfig) -> Result<Self, ParquetError> {
        let buffer = SharedBuffer::new(BUFFER_CAPACITY);
        let writer = Self::create_writer(&schema, &config, buffer.clone())?;

        Ok(Self {
            schema,
            config,
            writer: Some(writer),
            buffer,
            records_written: 0,
            finished_files: Vec::new(),
            partition: PartitionValues::default(),
        })
    }

    fn create_writer(
        schema: &SchemaRef,
        config: &ParquetWriterConfig,
        buffer: SharedBuffer,
    ) -> Result<ArrowWriter<SharedBuffer>, ParquetError> {
        ArrowWriter::try_new(buffer, schema.clone(), Some(config.writer_properties()))
            .context(WriterCreateSnafu)
    }

    fn generate_filename() -> String {
        format!("part-{}.parquet", Uuid::now_v7())
    }

    /// Direct subsequent batches to `partition`, closing the current file if
    /// it holds rows of another partition.
    pub fn set_partition(&mut self, partition: PartitionValues) -> Result<(), ParquetError> {
        if partition != self.partition && self.records_written > 0 {
            debug!(
                "Partition changed from '{}' to '{}', rolling file",
                self.partition, partition
            );
            self.roll_file()?;
        }
        self.partition = partition;
        Ok(())
    }

    pub fn write_batch(&mut self, batch: &RecordBatch) -> Result<(), ParquetError> {
        let writer = self.writer.as_mut().context(WriterUnavailableSnafu)?;

        writer.write(batch).context(WriteSnafu)?;
        self.records_written += batch.num_rows();

        if writer.in_progress_size() > self.config.row_group_size_bytes {
            debug!(
                "Flushing row group of {} bytes after {} records",
                writer.in_progress_size(),
                self.records_written
            );
            writer.flush().context(WriteSnafu)?;
        }

        let current_size = self.current_file_size();
        if current_size >= self.config.target_file_size {
            debug!(
                "Rolling file at {} bytes ({:.2} MB) with {} records",
                current_size,
                current_size as f64 / MB as f64,
                self.records_written
            );
            self.roll_file()?;
        }

        Ok(())
    }

    fn finish_current(&mut self) -> Result<(), ParquetError> {
        let start = Instant::now();
        let writer = self.writer.take().context(WriterUnavailableSnafu)?;
        writer.close().context(WriteSnafu)?;
        let bytes = self.buffer.take();

        emit!(ParquetWriteCompleted {
            duration: start.elapsed()
        });

        self.finished_files.push(FinishedFile {
            file_name: Self::generate_filename(),
            size: bytes.len(),
            record_count: self.records_written,
            bytes,
            partition: self.partition.clone(),
        });
        self.records_written = 0;
        Ok(())
    }

    fn roll_file(&mut self) -> Result<(), ParquetError> {
        self.finish_current()?;
        self.writer = Some(Self::create_writer(
            &self.schema,
            &self.config,
            self.buffer.clone(),
        )?);
        Ok(())
    }

    /// Close the current file and return every finished file.
    pub fn close(mut self) -> Result<Vec<FinishedFile>, ParquetError> {
        if self.records_written > 0 {
            self.finish_current()?;
        }
        Ok(self.finished_files)
    }

    /// Size of the current file in bytes, including data not yet flushed.
    pub fn current_file_size(&self) -> usize {
        let in_progress_size = self
            .writer
            .as_ref()
            .map(|w| w.in_progress_size())
            .unwrap_or(0);
        self.buffer.len() + in_progress_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deltalake::arrow::array::{Int64Array, StringArray};
    use deltalake::arrow::datatypes::{DataType, Field, Schema};
    use deltalake::parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    fn test_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("value", DataType::Int64, true),
        ]))
    }

    fn test_batch(num_rows: usize) -> RecordBatch {
        let ids: Vec<String> = (0..num_rows).map(|i| format!("id_{}", i)).collect();
        let values: Vec<i64> = (0..num_rows).map(|i| i as i64).collect();

        RecordBatch::try_new(
            test_schema(),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(Int64Array::from(values)),
            ],
        )
        .unwrap()
    }

    fn read_back(file: &FinishedFile) -> Vec<RecordBatch> {
        ParquetRecordBatchReaderBuilder::try_new(file.bytes.clone())
            .unwrap()
            .build()
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_single_file_round_trip() {
        let mut writer = ParquetWriter::new(test_schema(), ParquetWriterConfig::default()).unwrap();
        writer.write_batch(&test_batch(100)).unwrap();
        assert!(writer.current_file_size() > 0);

        let files = writer.close().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].record_count, 100);
        assert_eq!(files[0].size, files[0].bytes.len());
        assert!(files[0].file_name.starts_with("part-"));
        assert!(files[0].file_name.ends_with(".parquet"));

        let rows: usize = read_back(&files[0]).iter().map(|b| b.num_rows()).sum();
        assert_eq!(rows, 100);
    }

    #[test]
    fn test_partition_change_rolls_file() {
        let mut writer = ParquetWriter::new(test_schema(), ParquetWriterConfig::default()).unwrap();
        let first = PartitionValues::new(vec![("year".into(), "2018".into())]);
        let second = PartitionValues::new(vec![("year".into(), "2019".into())]);

        writer.set_partition(first.clone()).unwrap();
        writer.write_batch(&test_batch(3)).unwrap();
        writer.set_partition(first.clone()).unwrap();
        writer.write_batch(&test_batch(2)).unwrap();
        writer.set_partition(second.clone()).unwrap();
        writer.write_batch(&test_batch(4)).unwrap();

        let files = writer.close().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!((files[0].partition.clone(), files[0].record_count), (first, 5));
        assert_eq!((files[1].partition.clone(), files[1].record_count), (second, 4));
        assert_ne!(files[0].file_name, files[1].file_name);
    }

    #[test]
    fn test_rolls_at_target_size() {
        let config = ParquetWriterConfig {
            target_file_size: 1,
            ..Default::default()
        };
        let mut writer = ParquetWriter::new(test_schema(), config).unwrap();
        writer.write_batch(&test_batch(10)).unwrap();
        writer.write_batch(&test_batch(10)).unwrap();

        let files = writer.close().unwrap();
        assert_eq!(files.len(), 2);
        for file in &files {
            assert_eq!(read_back(file).iter().map(|b| b.num_rows()).sum::<usize>(), 10);
        }
    }

    #[test]
    fn test_close_without_rows_produces_no_files() {
        let writer = ParquetWriter::new(test_schema(), ParquetWriterConfig::default()).unwrap();
        assert!(writer.close().unwrap().is_empty());
    }

    #[test]
    fn test_compression_codecs_round_trip() {
        for compression in [
            ParquetCompression::Uncompressed,
            ParquetCompression::Gzip,
            ParquetCompression::Zstd,
        ] {
            let config = ParquetWriterConfig::default().with_compression(compression);
            let mut writer = ParquetWriter::new(test_schema(), config).unwrap();
            writer.write_batch(&test_batch(5)).unwrap();
            let files = writer.close().unwrap();
            assert_eq!(read_back(&files[0])[0].num_rows(), 5);
        }
    }
}
