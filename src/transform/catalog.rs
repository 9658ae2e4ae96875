//! Song and artist tables projected from catalog documents.

use deltalake::arrow::array::{Array, RecordBatch};
use deltalake::arrow::compute::{and, filter_record_batch, is_not_null};
use snafu::prelude::*;
use tracing::warn;

use super::{Table, column, project};
use crate::emit;
use crate::error::{ComputeSnafu, TransformError};
use crate::metrics::events::RowsSkipped;
use crate::schema::{artists_schema, catalog, songs_schema, tables};

pub const SONGS_PARTITION_BY: &[&str] = &["year", "artist_id"];

const SONG_COLUMNS: &[&str] = &[
    catalog::SONG_ID,
    catalog::TITLE,
    catalog::ARTIST_ID,
    catalog::YEAR,
    catalog::DURATION,
];

const ARTIST_COLUMNS: &[&str] = &[
    catalog::ARTIST_ID,
    catalog::ARTIST_NAME,
    catalog::ARTIST_LOCATION,
    catalog::ARTIST_LATITUDE,
    catalog::ARTIST_LONGITUDE,
];

/// The two dimension tables derived from the catalog.
#[derive(Debug, Clone)]
pub struct CatalogTables {
    pub songs: Table,
    pub artists: Table,
    /// Catalog documents left out of `songs` for lacking a partition key.
    pub skipped_songs: usize,
}

/// Project catalog documents into the `songs` and `artists` tables.
///
/// Both tables keep one row per document. Songs without a `year` or
/// `artist_id` cannot be placed in a partition and are dropped.
pub fn extract_catalog(docs: &[RecordBatch]) -> Result<CatalogTables, TransformError> {
    let mut songs = Table::new(tables::SONGS, songs_schema(), SONGS_PARTITION_BY);
    let mut artists = Table::new(tables::ARTISTS, artists_schema(), &[]);
    let mut skipped_songs = 0;

    for batch in docs {
        let keyed = with_partition_keys(batch)?;
        skipped_songs += batch.num_rows() - keyed.num_rows();
        songs.push(project(&keyed, SONG_COLUMNS, &songs.schema)?);
        artists.push(project(batch, ARTIST_COLUMNS, &artists.schema)?);
    }

    if skipped_songs > 0 {
        warn!(
            "Dropped {} catalog documents without year or artist_id from {}",
            skipped_songs,
            tables::SONGS
        );
        emit!(RowsSkipped {
            table: tables::SONGS,
            count: skipped_songs as u64,
        });
    }

    Ok(CatalogTables {
        songs,
        artists,
        skipped_songs,
    })
}

fn with_partition_keys(batch: &RecordBatch) -> Result<RecordBatch, TransformError> {
    let year = column(batch, catalog::YEAR)?;
    let artist_id = column(batch, catalog::ARTIST_ID)?;
    if year.null_count() == 0 && artist_id.null_count() == 0 {
        return Ok(batch.clone());
    }

    let mask = and(
        &is_not_null(year.as_ref()).context(ComputeSnafu {
            operation: "check year",
        })?,
        &is_not_null(artist_id.as_ref()).context(ComputeSnafu {
            operation: "check artist_id",
        })?,
    )
    .context(ComputeSnafu {
        operation: "combine partition key masks",
    })?;

    filter_record_batch(batch, &mask).context(ComputeSnafu {
        operation: "filter songs without partition keys",
    })
}
