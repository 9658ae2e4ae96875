//! Song-play filtering and the users table.

use deltalake::arrow::array::{Array, RecordBatch, StringArray, UInt32Array};
use deltalake::arrow::compute::kernels::cmp::eq;
use deltalake::arrow::compute::{filter_record_batch, take_record_batch};
use snafu::prelude::*;
use std::collections::HashSet;
use tracing::debug;

use super::{Table, column, project, string_column};
use crate::emit;
use crate::error::{ComputeSnafu, TransformError};
use crate::metrics::events::ActivityFiltered;
use crate::schema::{SONG_PLAY_PAGE, activity, tables, users_schema};

const USER_COLUMNS: &[&str] = &[
    activity::USER_ID,
    activity::FIRST_NAME,
    activity::LAST_NAME,
    activity::GENDER,
    activity::LEVEL,
];

/// Activity documents that record a song being played.
///
/// Batches keep the raw activity schema and the order they were read in.
#[derive(Debug, Clone, Default)]
pub struct FilteredActivity {
    batches: Vec<RecordBatch>,
}

impl FilteredActivity {
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }
}

/// Keep documents whose `page` is `NextSong`. A null page never matches.
pub fn filter_song_plays(docs: &[RecordBatch]) -> Result<FilteredActivity, TransformError> {
    let target = StringArray::new_scalar(SONG_PLAY_PAGE);
    let mut batches = Vec::with_capacity(docs.len());
    let mut dropped = 0;

    for batch in docs {
        let mask = eq(column(batch, activity::PAGE)?, &target).context(ComputeSnafu {
            operation: "compare page",
        })?;
        let kept = filter_record_batch(batch, &mask).context(ComputeSnafu {
            operation: "filter song plays",
        })?;
        dropped += batch.num_rows() - kept.num_rows();
        if kept.num_rows() > 0 {
            batches.push(kept);
        }
    }

    let filtered = FilteredActivity { batches };
    debug!(
        "Kept {} song plays, dropped {} other activity documents",
        filtered.num_rows(),
        dropped
    );
    emit!(ActivityFiltered {
        kept: filtered.num_rows() as u64,
        dropped: dropped as u64,
    });

    Ok(filtered)
}

/// Project song plays into the `users` table, one row per `user_id`.
///
/// The first record seen for a user, in input order, supplies the row. A null
/// `user_id` is treated as one more distinct key.
pub fn extract_users(filtered: &FilteredActivity) -> Result<Table, TransformError> {
    let mut users = Table::new(tables::USERS, users_schema(), &[]);
    let mut seen: HashSet<Option<String>> = HashSet::new();

    for batch in filtered.batches() {
        let user_id = string_column(batch, activity::USER_ID)?;
        let first_seen: UInt32Array = user_id
            .iter()
            .enumerate()
            .filter_map(|(row, id)| seen.insert(id.map(str::to_owned)).then_some(row as u32))
            .collect();

        if first_seen.is_empty() {
            continue;
        }
        let rows = take_record_batch(batch, &first_seen).context(ComputeSnafu {
            operation: "take first-seen users",
        })?;
        users.push(project(&rows, USER_COLUMNS, &users.schema)?);
    }

    Ok(users)
}
