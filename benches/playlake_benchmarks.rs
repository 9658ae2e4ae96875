//! playlake benchmark suite.
//!
//! Benchmarks for key operations:
//! - Document decoding throughput
//! - The catalog join and time decomposition
//! - Partitioned Parquet encoding

use chrono::FixedOffset;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

mod bench_utils;

use bytes::Bytes;
use playlake::config::CompressionFormat;
use playlake::schema::activity_document_schema;
use playlake::sink::parquet::{ParquetWriter, ParquetWriterConfig};
use playlake::sink::partition::{file_schema, split_by_partition};
use playlake::source::{NdjsonReader, NdjsonReaderConfig};
use playlake::transform::{
    SongplayIdGenerator, build_songplays, derive_time_table, extract_catalog, filter_song_plays,
};

fn utc() -> FixedOffset {
    FixedOffset::east_opt(0).expect("zero offset")
}

fn document_decoding_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("document_decoding");

    for size in [1_000, 10_000, 100_000] {
        let plain = Bytes::from(bench_utils::generate_activity_lines(size, 1000).join("\n"));
        let gzipped = bench_utils::generate_activity_gz(size);
        group.throughput(Throughput::Elements(size as u64));

        for (name, data, compression) in [
            ("plain", plain, CompressionFormat::None),
            ("gzip", gzipped, CompressionFormat::Gzip),
        ] {
            let reader = NdjsonReader::new(
                activity_document_schema(),
                NdjsonReaderConfig::new(8192, compression),
            );
            group.bench_with_input(BenchmarkId::new(name, size), &data, |b, data| {
                b.iter(|| reader.read(data.clone(), "bench").unwrap().total_records);
            });
        }
    }

    group.finish();
}

fn join_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("songplays_join");

    for catalog_size in [1_000, 10_000] {
        let catalog = bench_utils::catalog_batches(catalog_size);
        let activity = bench_utils::activity_batches(50_000, catalog_size);
        let filtered = filter_song_plays(&activity).unwrap();
        group.throughput(Throughput::Elements(filtered.num_rows() as u64));

        group.bench_with_input(
            BenchmarkId::new("build_songplays", catalog_size),
            &(catalog, filtered),
            |b, (catalog, filtered)| {
                b.iter(|| {
                    let mut ids = SongplayIdGenerator::new();
                    build_songplays(filtered, catalog, utc(), &mut ids)
                        .unwrap()
                        .stats
                });
            },
        );
    }

    let filtered = filter_song_plays(&bench_utils::activity_batches(100_000, 1000)).unwrap();
    group.bench_function("derive_time_table", |b| {
        b.iter(|| derive_time_table(&filtered, utc()).unwrap().num_rows());
    });

    group.finish();
}

fn parquet_writing_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("parquet_writing");

    for size in [10_000, 100_000] {
        let songs = extract_catalog(&bench_utils::catalog_batches(size))
            .unwrap()
            .songs;
        group.throughput(Throughput::Elements(songs.num_rows() as u64));

        group.bench_with_input(BenchmarkId::new("partitioned_songs", size), &songs, |b, songs| {
            b.iter(|| {
                let schema = file_schema(&songs.schema, songs.partition_by);
                let mut writer = ParquetWriter::new(schema, ParquetWriterConfig::default()).unwrap();
                for batch in &songs.batches {
                    for (values, rows) in split_by_partition(batch, songs.partition_by).unwrap() {
                        writer.set_partition(values).unwrap();
                        writer.write_batch(&rows).unwrap();
                    }
                }
                writer.close().unwrap().len()
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    document_decoding_benchmarks,
    join_benchmarks,
    parquet_writing_benchmarks,
);
criterion_main!(benches);
