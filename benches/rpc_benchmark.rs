//! Benchmarks for worker round trips and WKB encoding.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use geoprov::native::wkb::Geometry;
use geoprov::{DataProvider, ProviderConfig};
use serde_json::json;
use std::hint::black_box;
use tempfile::tempdir;

fn bench_echo(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let provider = DataProvider::start(
        ProviderConfig::default()
            .with_worker_exe(env!("CARGO_BIN_EXE_geoprov"))
            .with_data_dir(dir.path()),
    )
    .unwrap();

    let mut group = c.benchmark_group("echo");
    for size in [1usize, 100, 10_000] {
        let payload = json!({ "values": vec![1.5f64; size] });
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, payload| {
            b.iter(|| provider.echo(black_box(payload.clone())).unwrap())
        });
    }
    group.finish();

    provider.stop();
}

fn bench_wkb(c: &mut Criterion) {
    let mut group = c.benchmark_group("wkb");
    for points in [10usize, 1_000, 100_000] {
        let line = Geometry::LineString {
            coordinates: (0..points).map(|i| [i as f64, (i * 2) as f64]).collect(),
        };
        group.bench_with_input(BenchmarkId::new("linestring", points), &line, |b, line| {
            b.iter(|| black_box(line).to_wkb())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_echo, bench_wkb);
criterion_main!(benches);
