//! Benchmark utilities for generating catalog and activity documents.

use bytes::Bytes;
use deltalake::arrow::array::RecordBatch;
use playlake::config::CompressionFormat;
use playlake::schema::{activity_document_schema, catalog_document_schema};
use playlake::source::{NdjsonReader, NdjsonReaderConfig};
use rand::Rng;

const ARTISTS: usize = 200;

fn title(song: usize) -> String {
    format!("Song {song}")
}

fn duration(song: usize) -> f64 {
    120.0 + (song % 480) as f64 + 0.25
}

/// Catalog documents, one song per line.
pub fn generate_catalog_lines(count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| {
            let artist = i % ARTISTS;
            let year = if rng.gen_bool(0.8) {
                rng.gen_range(1960..2020)
            } else {
                0
            };
            format!(
                r#"{{"num_songs":1,"artist_id":"AR{artist:05}","artist_latitude":null,"artist_longitude":null,"artist_location":"","artist_name":"Artist {artist}","song_id":"SO{i:08}","title":"{}","duration":{},"year":{year}}}"#,
                title(i),
                duration(i)
            )
        })
        .collect()
}

/// Activity documents. Roughly 80% are song plays, most of which hit a song
/// among the first `catalog_size` catalog entries.
pub fn generate_activity_lines(count: usize, catalog_size: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    let pages = ["Home", "Logout", "Settings", "About"];
    (0..count)
        .map(|i| {
            let user = rng.gen_range(1..100);
            let ts: i64 = 1_541_000_000_000 + (i as i64) * 1_000;
            if rng.gen_bool(0.8) {
                let song = rng.gen_range(0..catalog_size.max(1));
                let artist = song % ARTISTS;
                // A few plays of songs missing from the catalog
                let length = if rng.gen_bool(0.9) {
                    duration(song)
                } else {
                    1.5
                };
                format!(
                    r#"{{"artist":"Artist {artist}","auth":"Logged In","firstName":"User","gender":"F","itemInSession":{i},"lastName":"{user}","length":{length},"level":"free","location":"Somewhere","method":"PUT","page":"NextSong","registration":1540919166796.0,"sessionId":{user},"song":"{}","status":200,"ts":{ts},"userAgent":"Mozilla/5.0","userId":"{user}"}}"#,
                    title(song)
                )
            } else {
                let page = pages[rng.gen_range(0..pages.len())];
                format!(
                    r#"{{"auth":"Logged In","page":"{page}","method":"GET","status":200,"ts":{ts},"sessionId":{user},"userId":"{user}"}}"#
                )
            }
        })
        .collect()
}

fn decode(lines: &[String], reader: NdjsonReader) -> Vec<RecordBatch> {
    let data = Bytes::from(lines.join("\n"));
    reader.read(data, "bench").expect("Failed to decode documents").batches
}

/// Decoded catalog batches.
pub fn catalog_batches(count: usize) -> Vec<RecordBatch> {
    let reader = NdjsonReader::new(
        catalog_document_schema(),
        NdjsonReaderConfig::new(8192, CompressionFormat::None),
    );
    decode(&generate_catalog_lines(count), reader)
}

/// Decoded activity batches.
pub fn activity_batches(count: usize, catalog_size: usize) -> Vec<RecordBatch> {
    let reader = NdjsonReader::new(
        activity_document_schema(),
        NdjsonReaderConfig::new(8192, CompressionFormat::None),
    );
    decode(&generate_activity_lines(count, catalog_size), reader)
}

/// Gzip-compressed activity documents for decompression benchmarks.
pub fn generate_activity_gz(count: usize) -> Bytes {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    for line in generate_activity_lines(count, 1000) {
        writeln!(encoder, "{}", line).expect("Failed to write line");
    }
    Bytes::from(encoder.finish().expect("Failed to finish compression"))
}
