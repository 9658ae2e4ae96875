//! Hive-style partitioning of output batches.
//!
//! Rows are grouped by the values of the partition columns; each group is
//! written under `col=value/...` directories and the partition columns are
//! removed from the file body.

use deltalake::arrow::array::{Array, RecordBatch, UInt32Array};
use deltalake::arrow::compute::take_record_batch;
use deltalake::arrow::datatypes::{Schema, SchemaRef};
use deltalake::arrow::util::display::array_value_to_string;
use snafu::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{ParquetError, PartitionProjectionSnafu};

/// Directory value used for null or empty partition values.
pub const DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// Ordered `(column, value)` pairs identifying one partition.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionValues(Vec<(String, String)>);

impl PartitionValues {
    pub fn new(values: Vec<(String, String)>) -> Self {
        Self(values)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[(String, String)] {
        &self.0
    }

    /// Directory names, outermost first.
    pub fn segments(&self) -> impl Iterator<Item = String> + '_ {
        self.0.iter().map(|(column, value)| format!("{column}={value}"))
    }
}

impl std::fmt::Display for PartitionValues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined = self.segments().collect::<Vec<_>>().join("/");
        f.write_str(&joined)
    }
}

/// `schema` without the partition columns.
pub fn file_schema(schema: &SchemaRef, partition_by: &[&str]) -> SchemaRef {
    let fields: Vec<_> = schema
        .fields()
        .iter()
        .filter(|f| !partition_by.contains(&f.name().as_str()))
        .cloned()
        .collect();
    Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()))
}

fn partition_value(column: &dyn Array, row: usize) -> Result<String, ParquetError> {
    if column.is_null(row) {
        return Ok(DEFAULT_PARTITION.to_string());
    }
    let value = array_value_to_string(column, row).context(PartitionProjectionSnafu)?;
    if value.is_empty() {
        Ok(DEFAULT_PARTITION.to_string())
    } else {
        Ok(value)
    }
}

/// Split `batch` into one batch per distinct partition, ordered by value.
///
/// Returned batches have the partition columns removed. With no partition
/// columns the batch is returned whole under empty partition values.
pub fn split_by_partition(
    batch: &RecordBatch,
    partition_by: &[&str],
) -> Result<Vec<(PartitionValues, RecordBatch)>, ParquetError> {
    if partition_by.is_empty() {
        return Ok(vec![(PartitionValues::default(), batch.clone())]);
    }

    let schema = batch.schema();
    let mut key_columns = Vec::with_capacity(partition_by.len());
    for name in partition_by {
        let index = schema
            .index_of(name)
            .context(PartitionProjectionSnafu)?;
        key_columns.push(batch.column(index).as_ref());
    }
    let body_columns: Vec<usize> = (0..schema.fields().len())
        .filter(|i| !partition_by.contains(&schema.field(*i).name().as_str()))
        .collect();

    let mut groups: BTreeMap<Vec<String>, Vec<u32>> = BTreeMap::new();
    for row in 0..batch.num_rows() {
        let key = key_columns
            .iter()
            .map(|column| partition_value(*column, row))
            .collect::<Result<Vec<_>, _>>()?;
        groups.entry(key).or_default().push(row as u32);
    }

    let body = batch
        .project(&body_columns)
        .context(PartitionProjectionSnafu)?;

    groups
        .into_iter()
        .map(|(values, rows)| {
            let rows = take_record_batch(&body, &UInt32Array::from(rows))
                .context(PartitionProjectionSnafu)?;
            let values = partition_by
                .iter()
                .map(|name| name.to_string())
                .zip(values)
                .collect();
            Ok((PartitionValues::new(values), rows))
        })
        .collect()
}
