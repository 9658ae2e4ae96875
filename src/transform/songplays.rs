//! The `songplays` fact table: song plays joined to the catalog.
//!
//! A play matches a catalog document when `song == title`,
//! `length == duration` and `artist == artist_name`. Every matching pair
//! becomes a row, so a play that matches two documents appears twice and one
//! that matches nothing is left out. Both cases are counted in [`JoinStats`].
//! A matching play whose `ts` is null or out of range has no `year`/`month`
//! to partition by, so it is skipped and counted as well.

use chrono::FixedOffset;
use deltalake::arrow::array::{
    Array, ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray, UInt32Array,
};
use deltalake::arrow::compute::{concat_batches, take};
use deltalake::arrow::datatypes::{Float64Type, Int64Type};
use snafu::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::time::{TimeColumns, decompose};
use super::{FilteredActivity, Table, column, primitive_column, string_column};
use crate::emit;
use crate::error::{ColumnTypeSnafu, ComputeSnafu, TransformError};
use crate::metrics::events::{JoinCompleted, RowsSkipped};
use crate::schema::{activity, catalog, catalog_document_schema, songplays_schema, tables};

pub const SONGPLAYS_PARTITION_BY: &[&str] = &["year", "month"];

/// Bits of the id reserved for the row index within a partition.
const ROW_INDEX_BITS: u32 = 33;

/// Hands out `songplay_id`s that are unique within a run.
///
/// Ids are `(partition << 33) + row`, where a partition is one batch of song
/// plays. They increase in emission order but are not contiguous.
#[derive(Debug, Default)]
pub struct SongplayIdGenerator {
    next_partition: i64,
}

impl SongplayIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids for the `rows` rows emitted from the next partition.
    pub fn next_partition(&mut self, rows: usize) -> Int64Array {
        let base = self.next_partition << ROW_INDEX_BITS;
        self.next_partition += 1;
        (0..rows as i64).map(|row| base + row).collect()
    }
}

/// How song plays fared in the catalog join.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinStats {
    /// Plays with exactly one catalog match.
    pub matched: usize,
    /// Plays with no catalog match.
    pub unmatched: usize,
    /// Plays with more than one catalog match.
    pub multi_matched: usize,
    /// Matching plays dropped because their `ts` does not decompose.
    pub skipped: usize,
    /// Rows emitted into `songplays`.
    pub output_rows: usize,
}

/// The fact table together with its join statistics.
#[derive(Debug, Clone)]
pub struct SongplayTable {
    pub table: Table,
    pub stats: JoinStats,
}

/// Join key of a catalog document. Durations compare by value, so `-0.0`
/// is folded into `0.0`; NaN keys are never built.
type JoinKey<'a> = (&'a str, u64, &'a str);

fn duration_bits(duration: f64) -> Option<u64> {
    if duration.is_nan() {
        None
    } else if duration == 0.0 {
        Some(0.0f64.to_bits())
    } else {
        Some(duration.to_bits())
    }
}

/// Hash index over the catalog documents, keyed on the join columns.
struct CatalogIndex<'a> {
    rows: HashMap<JoinKey<'a>, Vec<u32>>,
}

impl<'a> CatalogIndex<'a> {
    fn build(catalog_docs: &'a RecordBatch) -> Result<Self, TransformError> {
        let title = string_column(catalog_docs, catalog::TITLE)?;
        let duration = primitive_column::<Float64Type>(catalog_docs, catalog::DURATION)?;
        let artist_name = string_column(catalog_docs, catalog::ARTIST_NAME)?;

        let mut rows: HashMap<JoinKey<'a>, Vec<u32>> = HashMap::new();
        for row in 0..catalog_docs.num_rows() {
            if let Some(key) = join_key(title, duration, artist_name, row) {
                rows.entry(key).or_default().push(row as u32);
            }
        }
        Ok(Self { rows })
    }

    fn get(&self, key: &JoinKey<'a>) -> &[u32] {
        self.rows.get(key).map(Vec::as_slice).unwrap_or_default()
    }
}

fn join_key<'a>(
    title: &'a StringArray,
    duration: &Float64Array,
    artist: &'a StringArray,
    row: usize,
) -> Option<JoinKey<'a>> {
    if title.is_null(row) || duration.is_null(row) || artist.is_null(row) {
        return None;
    }
    Some((
        title.value(row),
        duration_bits(duration.value(row))?,
        artist.value(row),
    ))
}

/// Join song plays against the catalog documents and project `songplays`.
///
/// `catalog_docs` are the raw catalog batches already read for the dimension
/// tables. `start_time`, `year` and `month` are wall-clock values in `offset`.
pub fn build_songplays(
    filtered: &FilteredActivity,
    catalog_docs: &[RecordBatch],
    offset: FixedOffset,
    ids: &mut SongplayIdGenerator,
) -> Result<SongplayTable, TransformError> {
    let catalog_docs = concat_batches(&catalog_document_schema(), catalog_docs).context(
        ComputeSnafu {
            operation: "concatenate catalog documents",
        },
    )?;
    let index = CatalogIndex::build(&catalog_docs)?;

    let mut table = Table::new(tables::SONGPLAYS, songplays_schema(), SONGPLAYS_PARTITION_BY);
    let mut stats = JoinStats::default();

    for batch in filtered.batches() {
        let (play_rows, catalog_rows) = match_batch(batch, &index, offset, &mut stats)?;
        if play_rows.is_empty() {
            continue;
        }
        let songplay_ids = ids.next_partition(play_rows.len());
        table.push(project_matches(
            batch,
            &catalog_docs,
            &UInt32Array::from(play_rows),
            &UInt32Array::from(catalog_rows),
            songplay_ids,
            offset,
        )?);
    }
    stats.output_rows = table.num_rows();

    info!(
        "Joined {} song plays: {} matched, {} unmatched, {} matched more than once, {} rows",
        filtered.num_rows(),
        stats.matched,
        stats.unmatched,
        stats.multi_matched,
        stats.output_rows
    );
    if stats.unmatched > 0 {
        warn!(
            "{} song plays have no catalog match and are left out of {}",
            stats.unmatched,
            tables::SONGPLAYS
        );
    }
    if stats.skipped > 0 {
        warn!(
            "{} matching song plays have no usable ts and are left out of {}",
            stats.skipped,
            tables::SONGPLAYS
        );
        emit!(RowsSkipped {
            table: tables::SONGPLAYS,
            count: stats.skipped as u64,
        });
    }
    if stats.multi_matched > 0 {
        warn!(
            "{} song plays match several catalog documents and are repeated in {}",
            stats.multi_matched,
            tables::SONGPLAYS
        );
    }
    emit!(JoinCompleted {
        matched: stats.matched as u64,
        unmatched: stats.unmatched as u64,
        multi_matched: stats.multi_matched as u64,
    });

    Ok(SongplayTable { table, stats })
}

/// Row index pairs (play, catalog) of every match in `batch`.
///
/// Matching plays whose `ts` does not decompose in `offset` are skipped.
fn match_batch(
    batch: &RecordBatch,
    index: &CatalogIndex<'_>,
    offset: FixedOffset,
    stats: &mut JoinStats,
) -> Result<(Vec<u32>, Vec<u32>), TransformError> {
    let song = string_column(batch, activity::SONG)?;
    let length = primitive_column::<Float64Type>(batch, activity::LENGTH)?;
    let artist = string_column(batch, activity::ARTIST)?;
    let ts = primitive_column::<Int64Type>(batch, activity::TS)?;

    let mut play_rows = Vec::new();
    let mut catalog_rows = Vec::new();
    for row in 0..batch.num_rows() {
        let matches: &[u32] = match join_key(song, length, artist, row) {
            Some(key) => index.get(&key),
            None => &[],
        };
        if !matches.is_empty() && (ts.is_null(row) || decompose(ts.value(row), offset).is_none())
        {
            stats.skipped += 1;
            continue;
        }
        match matches.len() {
            0 => stats.unmatched += 1,
            1 => stats.matched += 1,
            _ => stats.multi_matched += 1,
        }
        for &catalog_row in matches {
            play_rows.push(row as u32);
            catalog_rows.push(catalog_row);
        }
    }
    Ok((play_rows, catalog_rows))
}

fn take_column(
    batch: &RecordBatch,
    name: &str,
    indices: &UInt32Array,
) -> Result<ArrayRef, TransformError> {
    take(column(batch, name)?.as_ref(), indices, None).context(ComputeSnafu {
        operation: "take joined rows",
    })
}

fn project_matches(
    plays: &RecordBatch,
    catalog_docs: &RecordBatch,
    play_rows: &UInt32Array,
    catalog_rows: &UInt32Array,
    songplay_ids: Int64Array,
    offset: FixedOffset,
) -> Result<RecordBatch, TransformError> {
    let ts = take_column(plays, activity::TS, play_rows)?;
    let ts = ts
        .as_any()
        .downcast_ref::<Int64Array>()
        .context(ColumnTypeSnafu { column: activity::TS })?;
    let time = TimeColumns::from_epoch_millis(ts, offset);

    let arrays: Vec<ArrayRef> = vec![
        Arc::new(songplay_ids),
        Arc::new(time.start_time),
        Arc::new(time.year),
        Arc::new(time.month),
        take_column(plays, activity::USER_ID, play_rows)?,
        take_column(plays, activity::LEVEL, play_rows)?,
        take_column(catalog_docs, catalog::SONG_ID, catalog_rows)?,
        take_column(catalog_docs, catalog::ARTIST_ID, catalog_rows)?,
        take_column(plays, activity::SESSION_ID, play_rows)?,
        take_column(plays, activity::LOCATION, play_rows)?,
        take_column(plays, activity::USER_AGENT, play_rows)?,
    ];
    RecordBatch::try_new(songplays_schema(), arrays).context(ComputeSnafu {
        operation: "build songplays batch",
    })
}
