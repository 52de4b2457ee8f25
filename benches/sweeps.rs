//! Host sweep comparison: loop, lanes, static threads and work stealing on an elementwise body
//! and a reduction, at various lengths.

use kperf::drivers::host::HostSweep;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const SWEEPS: [HostSweep; 4] = [
    HostSweep::Loop,
    HostSweep::Lanes,
    HostSweep::StaticThreads,
    HostSweep::WorkStealing,
];

fn inputs(n: usize) -> (Vec<f64>, Vec<f64>) {
    let a = (0..n).map(|i| 0.2 * (i as f64 + 1.1) / (i as f64 + 1.12345)).collect();
    let b = (0..n).map(|i| 0.1 * (i as f64 + 1.1) / (i as f64 + 1.12345)).collect();
    (a, b)
}

fn bench_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("add");
    group.sample_size(30);

    for n in [1 << 10, 1 << 16, 1 << 20] {
        let (a, b) = inputs(n);
        let mut out = vec![0.0; n];
        group.throughput(Throughput::Bytes((3 * n * std::mem::size_of::<f64>()) as u64));

        for sweep in SWEEPS {
            group.bench_with_input(BenchmarkId::new(format!("{sweep:?}"), n), &n, |bench, _| {
                bench.iter(|| {
                    sweep.for_each(black_box(&mut out[..]), |i, c| *c = a[i] + b[i]);
                })
            });
        }
    }
    group.finish();
}

fn bench_sum(c: &mut Criterion) {
    let mut group = c.benchmark_group("sum");
    group.sample_size(30);

    for n in [1 << 10, 1 << 16, 1 << 20] {
        let (a, _) = inputs(n);
        group.throughput(Throughput::Elements(n as u64));

        for sweep in SWEEPS {
            group.bench_with_input(BenchmarkId::new(format!("{sweep:?}"), n), &n, |bench, &n| {
                bench.iter(|| black_box(sweep.reduce(n, 0.0, |i| a[i], |x, y| x + y)))
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_add, bench_sum);
criterion_main!(benches);
