//! Time dimension: calendar fields derived from activity timestamps.

use chrono::{DateTime, Datelike, FixedOffset, Timelike};
use deltalake::arrow::array::{
    ArrayRef, Int32Array, Int64Array, RecordBatch, TimestampMillisecondArray,
};
use deltalake::arrow::datatypes::Int64Type;
use snafu::prelude::*;
use std::sync::Arc;

use super::{FilteredActivity, Table, primitive_column};
use crate::error::{ComputeSnafu, TransformError};
use crate::schema::{activity, tables, time_schema};

/// Calendar breakdown of one timestamp in a fixed offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeParts {
    /// Wall-clock milliseconds since the epoch, as if the local time were UTC.
    pub start_time: i64,
    pub hour: i32,
    pub day: i32,
    /// ISO-8601 week number.
    pub week: i32,
    pub month: i32,
    pub year: i32,
    /// 1 = Sunday through 7 = Saturday.
    pub weekday: i32,
}

/// Break epoch milliseconds down into wall-clock fields in `offset`.
///
/// Returns `None` for instants chrono cannot represent.
pub fn decompose(epoch_millis: i64, offset: FixedOffset) -> Option<TimeParts> {
    let local = DateTime::from_timestamp_millis(epoch_millis)?
        .with_timezone(&offset)
        .naive_local();

    Some(TimeParts {
        start_time: local.and_utc().timestamp_millis(),
        hour: local.hour() as i32,
        day: local.day() as i32,
        week: local.iso_week().week() as i32,
        month: local.month() as i32,
        year: local.year(),
        weekday: local.weekday().number_from_sunday() as i32,
    })
}

/// Columnar form of `decompose` over a `ts` column.
pub(crate) struct TimeColumns {
    pub start_time: TimestampMillisecondArray,
    pub hour: Int32Array,
    pub day: Int32Array,
    pub week: Int32Array,
    pub month: Int32Array,
    pub year: Int32Array,
    pub weekday: Int32Array,
}

impl TimeColumns {
    pub fn from_epoch_millis(ts: &Int64Array, offset: FixedOffset) -> Self {
        let parts: Vec<Option<TimeParts>> = ts
            .iter()
            .map(|value| value.and_then(|ms| decompose(ms, offset)))
            .collect();
        let field = |f: fn(&TimeParts) -> i32| -> Int32Array {
            parts.iter().map(|p| p.as_ref().map(f)).collect()
        };

        Self {
            start_time: parts.iter().map(|p| p.map(|p| p.start_time)).collect(),
            hour: field(|p| p.hour),
            day: field(|p| p.day),
            week: field(|p| p.week),
            month: field(|p| p.month),
            year: field(|p| p.year),
            weekday: field(|p| p.weekday),
        }
    }
}

/// Derive the `time` table, one row per song play.
///
/// Repeated timestamps produce repeated rows. A null `ts` yields a row of
/// nulls.
pub fn derive_time_table(
    filtered: &FilteredActivity,
    offset: FixedOffset,
) -> Result<Table, TransformError> {
    let mut time = Table::new(tables::TIME, time_schema(), &[]);

    for batch in filtered.batches() {
        time.push(time_batch(batch, offset)?);
    }

    Ok(time)
}

fn time_batch(batch: &RecordBatch, offset: FixedOffset) -> Result<RecordBatch, TransformError> {
    let ts = primitive_column::<Int64Type>(batch, activity::TS)?;
    let columns = TimeColumns::from_epoch_millis(ts, offset);

    let arrays: Vec<ArrayRef> = vec![
        Arc::new(columns.start_time),
        Arc::new(columns.hour),
        Arc::new(columns.day),
        Arc::new(columns.week),
        Arc::new(columns.month),
        Arc::new(columns.year),
        Arc::new(columns.weekday),
    ];
    RecordBatch::try_new(time_schema(), arrays).context(ComputeSnafu {
        operation: "build time batch",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::filter_song_plays;
    use crate::transform::test_support::{Event, activity_batch, page_view, play};
    use deltalake::arrow::array::{Array, AsArray};
    use deltalake::arrow::datatypes::{Int32Type, TimestampMillisecondType};

    const NOV_1_2018: i64 = 1_541_105_830_796;

    fn hours(h: i32) -> FixedOffset {
        FixedOffset::east_opt(h * 3600).unwrap()
    }

    #[test]
    fn test_decompose_utc() {
        let parts = decompose(NOV_1_2018, hours(0)).unwrap();
        assert_eq!(
            parts,
            TimeParts {
                start_time: NOV_1_2018,
                hour: 20,
                day: 1,
                week: 44,
                month: 11,
                year: 2018,
                weekday: 5,
            }
        );
    }

    #[test]
    fn test_decompose_positive_offset_crosses_midnight() {
        let parts = decompose(NOV_1_2018, hours(8)).unwrap();
        assert_eq!(parts.start_time, 1_541_134_630_796);
        assert_eq!(parts.hour, 4);
        assert_eq!(parts.day, 2);
        assert_eq!(parts.weekday, 6);
    }

    #[test]
    fn test_decompose_negative_offset_crosses_year() {
        // 2019-01-01T02:00Z is still New Year's Eve at -05:00
        let parts = decompose(1_546_308_000_000, hours(-5)).unwrap();
        assert_eq!(parts.year, 2018);
        assert_eq!(parts.month, 12);
        assert_eq!(parts.day, 31);
        assert_eq!(parts.hour, 21);
        // ISO week 1 of 2019 starts on Monday 2018-12-31
        assert_eq!(parts.week, 1);
        assert_eq!(parts.weekday, 2);
    }

    #[test]
    fn test_decompose_iso_week_53() {
        let parts = decompose(1_609_502_400_000, hours(0)).unwrap();
        assert_eq!((parts.year, parts.week), (2021, 53));
    }

    #[test]
    fn test_decompose_epoch() {
        let parts = decompose(0, hours(0)).unwrap();
        assert_eq!((parts.year, parts.month, parts.day), (1970, 1, 1));
        assert_eq!(parts.weekday, 5);
    }

    #[test]
    fn test_one_time_row_per_song_play() {
        let docs = vec![activity_batch(&[
            play("1", "A", 1.0, NOV_1_2018),
            page_view("1", "Home", NOV_1_2018 + 1),
            play("1", "B", 1.0, NOV_1_2018),
            page_view("1", "Settings", NOV_1_2018 + 2),
            play("2", "C", 1.0, NOV_1_2018 + 3_600_000),
        ])];
        let filtered = filter_song_plays(&docs).unwrap();
        let time = derive_time_table(&filtered, hours(0)).unwrap();

        // Repeated timestamps are not collapsed
        assert_eq!(time.num_rows(), 3);
        let batch = &time.batches[0];
        assert_eq!(batch.schema(), time_schema());

        let start_time = batch
            .column_by_name("start_time")
            .unwrap()
            .as_primitive::<TimestampMillisecondType>();
        assert_eq!(start_time.value(0), start_time.value(1));
        let hour = batch.column_by_name("hour").unwrap().as_primitive::<Int32Type>();
        assert_eq!(hour.values().to_vec(), vec![20, 20, 21]);
    }

    #[test]
    fn test_null_ts_yields_null_fields() {
        let no_ts = Event {
            ts: None,
            ..play("1", "A", 1.0, 0)
        };
        let filtered = filter_song_plays(&[activity_batch(&[no_ts])]).unwrap();
        let time = derive_time_table(&filtered, hours(0)).unwrap();

        let batch = &time.batches[0];
        for column in batch.columns() {
            assert!(column.is_null(0));
        }
    }
}
