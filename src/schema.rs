//! Arrow schemas for the raw documents and the five output tables.
//!
//! Raw schemas are fixed rather than inferred: the JSON decoder projects each
//! document onto them, ignoring unknown fields and nulling missing ones.

use deltalake::arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use std::sync::{Arc, LazyLock};

/// `page` value that marks an activity document as a song play.
pub const SONG_PLAY_PAGE: &str = "NextSong";

/// Column names of catalog documents.
pub mod catalog {
    pub const NUM_SONGS: &str = "num_songs";
    pub const ARTIST_ID: &str = "artist_id";
    pub const ARTIST_LATITUDE: &str = "artist_latitude";
    pub const ARTIST_LONGITUDE: &str = "artist_longitude";
    pub const ARTIST_LOCATION: &str = "artist_location";
    pub const ARTIST_NAME: &str = "artist_name";
    pub const SONG_ID: &str = "song_id";
    pub const TITLE: &str = "title";
    pub const DURATION: &str = "duration";
    pub const YEAR: &str = "year";
}

/// Column names of activity documents.
pub mod activity {
    pub const ARTIST: &str = "artist";
    pub const AUTH: &str = "auth";
    pub const FIRST_NAME: &str = "firstName";
    pub const GENDER: &str = "gender";
    pub const ITEM_IN_SESSION: &str = "itemInSession";
    pub const LAST_NAME: &str = "lastName";
    pub const LENGTH: &str = "length";
    pub const LEVEL: &str = "level";
    pub const LOCATION: &str = "location";
    pub const METHOD: &str = "method";
    pub const PAGE: &str = "page";
    pub const REGISTRATION: &str = "registration";
    pub const SESSION_ID: &str = "sessionId";
    pub const SONG: &str = "song";
    pub const STATUS: &str = "status";
    pub const TS: &str = "ts";
    pub const USER_AGENT: &str = "userAgent";
    pub const USER_ID: &str = "userId";
}

/// Output table names, also their directory names under the output root.
pub mod tables {
    pub const SONGS: &str = "songs";
    pub const ARTISTS: &str = "artists";
    pub const USERS: &str = "users";
    pub const TIME: &str = "time";
    pub const SONGPLAYS: &str = "songplays";
}

static CATALOG_DOCUMENT: LazyLock<SchemaRef> = LazyLock::new(|| {
    use catalog::*;
    Arc::new(Schema::new(vec![
        Field::new(NUM_SONGS, DataType::Int64, true),
        Field::new(ARTIST_ID, DataType::Utf8, true),
        Field::new(ARTIST_LATITUDE, DataType::Float64, true),
        Field::new(ARTIST_LONGITUDE, DataType::Float64, true),
        Field::new(ARTIST_LOCATION, DataType::Utf8, true),
        Field::new(ARTIST_NAME, DataType::Utf8, true),
        Field::new(SONG_ID, DataType::Utf8, true),
        Field::new(TITLE, DataType::Utf8, true),
        Field::new(DURATION, DataType::Float64, true),
        Field::new(YEAR, DataType::Int64, true),
    ]))
});

static ACTIVITY_DOCUMENT: LazyLock<SchemaRef> = LazyLock::new(|| {
    use activity::*;
    Arc::new(Schema::new(vec![
        Field::new(ARTIST, DataType::Utf8, true),
        Field::new(AUTH, DataType::Utf8, true),
        Field::new(FIRST_NAME, DataType::Utf8, true),
        Field::new(GENDER, DataType::Utf8, true),
        Field::new(ITEM_IN_SESSION, DataType::Int64, true),
        Field::new(LAST_NAME, DataType::Utf8, true),
        Field::new(LENGTH, DataType::Float64, true),
        Field::new(LEVEL, DataType::Utf8, true),
        Field::new(LOCATION, DataType::Utf8, true),
        Field::new(METHOD, DataType::Utf8, true),
        Field::new(PAGE, DataType::Utf8, true),
        Field::new(REGISTRATION, DataType::Float64, true),
        Field::new(SESSION_ID, DataType::Int64, true),
        Field::new(SONG, DataType::Utf8, true),
        Field::new(STATUS, DataType::Int64, true),
        Field::new(TS, DataType::Int64, true),
        Field::new(USER_AGENT, DataType::Utf8, true),
        Field::new(USER_ID, DataType::Utf8, true),
    ]))
});

/// Timestamps are wall-clock values in the configured offset, so no
/// timezone is attached to the type.
fn start_time_type() -> DataType {
    DataType::Timestamp(TimeUnit::Millisecond, None)
}

static SONGS: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("song_id", DataType::Utf8, true),
        Field::new("title", DataType::Utf8, true),
        Field::new("artist_id", DataType::Utf8, false),
        Field::new("year", DataType::Int64, false),
        Field::new("duration", DataType::Float64, true),
    ]))
});

static ARTISTS: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("artist_id", DataType::Utf8, true),
        Field::new("name", DataType::Utf8, true),
        Field::new("location", DataType::Utf8, true),
        Field::new("latitude", DataType::Float64, true),
        Field::new("longitude", DataType::Float64, true),
    ]))
});

static USERS: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("user_id", DataType::Utf8, true),
        Field::new("first_name", DataType::Utf8, true),
        Field::new("last_name", DataType::Utf8, true),
        Field::new("gender", DataType::Utf8, true),
        Field::new("level", DataType::Utf8, true),
    ]))
});

static TIME: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("start_time", start_time_type(), true),
        Field::new("hour", DataType::Int32, true),
        Field::new("day", DataType::Int32, true),
        Field::new("week", DataType::Int32, true),
        Field::new("month", DataType::Int32, true),
        Field::new("year", DataType::Int32, true),
        Field::new("weekday", DataType::Int32, true),
    ]))
});

static SONGPLAYS: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("songplay_id", DataType::Int64, false),
        Field::new("start_time", start_time_type(), true),
        Field::new("year", DataType::Int32, true),
        Field::new("month", DataType::Int32, true),
        Field::new("user_id", DataType::Utf8, true),
        Field::new("level", DataType::Utf8, true),
        Field::new("song_id", DataType::Utf8, true),
        Field::new("artist_id", DataType::Utf8, true),
        Field::new("session_id", DataType::Int64, true),
        Field::new("location", DataType::Utf8, true),
        Field::new("user_agent", DataType::Utf8, true),
    ]))
});

/// Schema catalog documents are decoded into.
pub fn catalog_document_schema() -> SchemaRef {
    CATALOG_DOCUMENT.clone()
}

/// Schema activity documents are decoded into.
pub fn activity_document_schema() -> SchemaRef {
    ACTIVITY_DOCUMENT.clone()
}

pub fn songs_schema() -> SchemaRef {
    SONGS.clone()
}

pub fn artists_schema() -> SchemaRef {
    ARTISTS.clone()
}

pub fn users_schema() -> SchemaRef {
    USERS.clone()
}

pub fn time_schema() -> SchemaRef {
    TIME.clone()
}

pub fn songplays_schema() -> SchemaRef {
    SONGPLAYS.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_columns_exist_in_output_schemas() {
        for column in ["year", "artist_id"] {
            assert!(songs_schema().field_with_name(column).is_ok());
        }
        for column in ["year", "month"] {
            assert!(songplays_schema().field_with_name(column).is_ok());
        }
    }

    #[test]
    fn test_raw_schemas_are_fully_nullable() {
        // Missing JSON fields decode to nulls instead of failing the file
        for schema in [catalog_document_schema(), activity_document_schema()] {
            assert!(schema.fields().iter().all(|f| f.is_nullable()));
        }
    }
}
