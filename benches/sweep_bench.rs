//! Hot-path benchmarks: set-point generation and in-memory cell writes.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sweep_daq::dataset::DataArray;
use sweep_daq::SweepRange;

fn bench_range_points(c: &mut Criterion) {
    let range = SweepRange::by_num(-1.0, 1.0, 1001);
    c.bench_function("sweep_range_1001_points", |b| {
        b.iter(|| black_box(range.points().sum::<f64>()))
    });
}

fn bench_array_fill(c: &mut Criterion) {
    c.bench_function("data_array_fill_4096", |b| {
        b.iter(|| {
            let mut array = DataArray::new("q", "", vec![64, 64]);
            for i in 0..64 {
                for j in 0..64 {
                    array.write(&[i, j], (i * 64 + j) as f64, false).unwrap();
                }
            }
            black_box(array.written_prefix())
        })
    });
}

fn bench_written_prefix(c: &mut Criterion) {
    let mut array = DataArray::new("q", "", vec![4096]);
    for i in 0..4096 {
        array.write(&[i], i as f64, false).unwrap();
    }
    c.bench_function("written_prefix_4096", |b| {
        b.iter(|| black_box(array.written_prefix()))
    });
}

criterion_group!(
    benches,
    bench_range_points,
    bench_array_fill,
    bench_written_prefix
);
criterion_main!(benches);
