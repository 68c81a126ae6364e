//! Benchmarks for timestamp reconciliation and filename parsing.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use satflow::naming::{FilenameMetaReader, FilenamePattern, FilenameRules};
use satflow::stages::reconcile;
use satflow::utils::MarkTimestamp;
use std::collections::{BTreeMap, BTreeSet};

/// One day of timestamps every `step` minutes, starting at `offset`.
fn cadence(step: u32, offset: u32) -> BTreeSet<MarkTimestamp> {
    (offset..24 * 60)
        .step_by(step as usize)
        .filter_map(|minute| {
            format!("20240101{:02}{:02}", minute / 60, minute % 60)
                .parse()
                .ok()
        })
        .collect()
}

fn reconcile_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");
    for services in [2usize, 4, 8] {
        let sets: Vec<_> = (0..services)
            .map(|i| cadence(5 * (1 + (i as u32 % 3)), 0))
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(services), &sets, |b, sets| {
            b.iter(|| reconcile(black_box(sets)));
        });
    }
    let disjoint = vec![cadence(10, 0), cadence(10, 5)];
    group.bench_function("disjoint", |b| b.iter(|| reconcile(black_box(&disjoint))));
    group.finish();
}

fn filename_benchmark(c: &mut Criterion) {
    let rules: FilenameRules = BTreeMap::from([(
        "goes16".to_string(),
        BTreeMap::from([(
            "rad".to_string(),
            vec![FilenamePattern::new(
                r"^goes16_rad_(?P<start_time>\d{12})_c\d+\.nc$",
            )],
        )]),
    )]);
    let Ok(reader) = FilenameMetaReader::new(&rules) else {
        return;
    };
    let key = "acme/goes16/rad/goes16_rad_202401010010_c13.nc";
    c.bench_function("start_time", |b| {
        b.iter(|| reader.start_time(black_box("goes16"), black_box(key), black_box("rad")));
    });
}

criterion_group!(benches, reconcile_benchmark, filename_benchmark);
criterion_main!(benches);
