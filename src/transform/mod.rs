//! Pure transformations from raw document batches to the output tables.
//!
//! Every function here takes batches in and returns batches out; nothing in
//! this module touches storage.

pub mod activity;
pub mod catalog;
pub mod songplays;
pub mod time;

pub use activity::{FilteredActivity, extract_users, filter_song_plays};
pub use catalog::{CatalogTables, extract_catalog};
pub use songplays::{JoinStats, SongplayIdGenerator, SongplayTable, build_songplays};
pub use time::{TimeParts, decompose, derive_time_table};

use deltalake::arrow::array::{
    ArrayRef, ArrowPrimitiveType, AsArray, PrimitiveArray, RecordBatch, StringArray,
};
use deltalake::arrow::datatypes::SchemaRef;
use snafu::prelude::*;

use crate::error::{ColumnTypeSnafu, ComputeSnafu, MissingColumnSnafu, TransformError};

/// An output table: its batches plus the columns it is partitioned by.
#[derive(Debug, Clone)]
pub struct Table {
    pub name: &'static str,
    pub schema: SchemaRef,
    pub partition_by: &'static [&'static str],
    pub batches: Vec<RecordBatch>,
}

impl Table {
    pub fn new(
        name: &'static str,
        schema: SchemaRef,
        partition_by: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            schema,
            partition_by,
            batches: Vec::new(),
        }
    }

    /// Append a batch, skipping empty ones.
    pub fn push(&mut self, batch: RecordBatch) {
        if batch.num_rows() > 0 {
            self.batches.push(batch);
        }
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }
}

pub(crate) fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef, TransformError> {
    batch
        .column_by_name(name)
        .context(MissingColumnSnafu { column: name })
}

pub(crate) fn string_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a StringArray, TransformError> {
    column(batch, name)?
        .as_string_opt::<i32>()
        .context(ColumnTypeSnafu { column: name })
}

pub(crate) fn primitive_column<'a, T: ArrowPrimitiveType>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a PrimitiveArray<T>, TransformError> {
    column(batch, name)?
        .as_primitive_opt::<T>()
        .context(ColumnTypeSnafu { column: name })
}

/// Pick `columns` from `batch` by name, in order, and relabel them with the
/// fields of `schema`.
pub(crate) fn project(
    batch: &RecordBatch,
    columns: &[&str],
    schema: &SchemaRef,
) -> Result<RecordBatch, TransformError> {
    let arrays = columns
        .iter()
        .map(|name| column(batch, name).cloned())
        .collect::<Result<Vec<_>, _>>()?;
    RecordBatch::try_new(schema.clone(), arrays).context(ComputeSnafu {
        operation: "project columns",
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Builders for raw document batches used across the transform tests.

    use deltalake::arrow::array::{Float64Array, Int64Array, RecordBatch, StringArray};
    use std::sync::Arc;

    use crate::schema::{activity_document_schema, catalog_document_schema};

    /// A catalog document with the fields the transforms look at.
    #[derive(Clone, Default)]
    pub struct Song {
        pub song_id: Option<&'static str>,
        pub title: Option<&'static str>,
        pub artist_id: Option<&'static str>,
        pub artist_name: Option<&'static str>,
        pub duration: Option<f64>,
        pub year: Option<i64>,
    }

    pub fn song(song_id: &'static str, title: &'static str, artist_id: &'static str) -> Song {
        Song {
            song_id: Some(song_id),
            title: Some(title),
            artist_id: Some(artist_id),
            artist_name: Some("X"),
            duration: Some(10.0),
            year: Some(2000),
        }
    }

    pub fn catalog_batch(songs: &[Song]) -> RecordBatch {
        let n = songs.len();
        let strings = |f: fn(&Song) -> Option<&'static str>| {
            Arc::new(StringArray::from(songs.iter().map(f).collect::<Vec<_>>()))
        };
        RecordBatch::try_new(
            catalog_document_schema(),
            vec![
                Arc::new(Int64Array::from(vec![Some(1i64); n])),
                strings(|s| s.artist_id),
                Arc::new(Float64Array::from(vec![Some(35.1f64); n])),
                Arc::new(Float64Array::from(vec![None::<f64>; n])),
                Arc::new(StringArray::from(vec![Some("Somewhere"); n])),
                strings(|s| s.artist_name),
                strings(|s| s.song_id),
                strings(|s| s.title),
                Arc::new(Float64Array::from(
                    songs.iter().map(|s| s.duration).collect::<Vec<_>>(),
                )),
                Arc::new(Int64Array::from(
                    songs.iter().map(|s| s.year).collect::<Vec<_>>(),
                )),
            ],
        )
        .unwrap()
    }

    /// An activity document with the fields the transforms look at.
    #[derive(Clone, Default)]
    pub struct Event {
        pub page: Option<&'static str>,
        pub user_id: Option<&'static str>,
        pub first_name: Option<&'static str>,
        pub level: Option<&'static str>,
        pub song: Option<&'static str>,
        pub artist: Option<&'static str>,
        pub length: Option<f64>,
        pub ts: Option<i64>,
        pub session_id: Option<i64>,
    }

    pub fn play(user_id: &'static str, song: &'static str, length: f64, ts: i64) -> Event {
        Event {
            page: Some("NextSong"),
            user_id: Some(user_id),
            first_name: Some("Ann"),
            level: Some("free"),
            song: Some(song),
            artist: Some("X"),
            length: Some(length),
            ts: Some(ts),
            session_id: Some(7),
        }
    }

    pub fn page_view(user_id: &'static str, page: &'static str, ts: i64) -> Event {
        Event {
            page: Some(page),
            user_id: Some(user_id),
            first_name: Some("Ann"),
            level: Some("free"),
            ts: Some(ts),
            session_id: Some(7),
            ..Default::default()
        }
    }

    pub fn activity_batch(events: &[Event]) -> RecordBatch {
        let n = events.len();
        let strings = |f: fn(&Event) -> Option<&'static str>| {
            Arc::new(StringArray::from(events.iter().map(f).collect::<Vec<_>>()))
        };
        let constant = |value: &'static str| Arc::new(StringArray::from(vec![Some(value); n]));
        RecordBatch::try_new(
            activity_document_schema(),
            vec![
                strings(|e| e.artist),
                constant("Logged In"),
                strings(|e| e.first_name),
                constant("F"),
                Arc::new(Int64Array::from(vec![Some(0i64); n])),
                constant("Smith"),
                Arc::new(Float64Array::from(
                    events.iter().map(|e| e.length).collect::<Vec<_>>(),
                )),
                strings(|e| e.level),
                constant("Portland, OR"),
                constant("PUT"),
                strings(|e| e.page),
                Arc::new(Float64Array::from(vec![Some(1.540e12f64); n])),
                Arc::new(Int64Array::from(
                    events.iter().map(|e| e.session_id).collect::<Vec<_>>(),
                )),
                strings(|e| e.song),
                Arc::new(Int64Array::from(vec![Some(200i64); n])),
                Arc::new(Int64Array::from(
                    events.iter().map(|e| e.ts).collect::<Vec<_>>(),
                )),
                constant("Mozilla/5.0"),
                strings(|e| e.user_id),
            ],
        )
        .unwrap()
    }
}
