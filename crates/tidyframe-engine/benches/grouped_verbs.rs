use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;
use tidyframe_columnar::{Column, Table};
use tidyframe_engine::{
    join, EngineOptions, Expr, Frame, JoinKind, JoinPlan, VerbEngine,
};

fn bench_rows() -> usize {
    std::env::var("TIDYFRAME_BENCH_ROWS")
        .ok()
        .and_then(|v| v.replace('_', "").parse::<usize>().ok())
        .filter(|&v| (10_000..=5_000_000).contains(&v))
        .unwrap_or(500_000)
}

fn build_table(rows: usize, groups: usize) -> Table {
    let key = (0..rows).map(|i| Some((i % groups) as i64));
    // Every 97th value is missing so the null masks are exercised.
    let amount = (0..rows).map(|i| (i % 97 != 0).then(|| (i % 100) as f64 * 0.5));
    let qty = (0..rows).map(|i| Some((i % 13) as i64));
    Table::new(vec![
        Column::int("key", key),
        Column::float("amount", amount),
        Column::int("qty", qty),
    ])
    .unwrap()
}

fn bench_grouped_summarise(c: &mut Criterion) {
    let rows = bench_rows();
    let frame = Frame::grouped(build_table(rows, 1_000), &["key"]).unwrap();

    let mut group = c.benchmark_group("grouped_summarise");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(5));
    group.throughput(Throughput::Elements(rows as u64));

    for (label, options) in [
        ("parallel", EngineOptions::default()),
        ("sequential", EngineOptions::sequential()),
    ] {
        let engine = VerbEngine::new(options);
        for expr in [Expr::sum("amount"), Expr::mean("qty")] {
            let generic = expr.to_generic();
            group.bench_with_input(
                BenchmarkId::new(format!("{label}/fast"), &expr),
                &expr,
                |b, expr| b.iter(|| black_box(engine.summarise(&frame, "out", expr).unwrap())),
            );
            group.bench_with_input(
                BenchmarkId::new(format!("{label}/generic"), &expr),
                &generic,
                |b, expr| b.iter(|| black_box(engine.summarise(&frame, "out", expr).unwrap())),
            );
        }
    }

    group.finish();
}

fn bench_grouped_rank(c: &mut Criterion) {
    let rows = bench_rows();
    let frame = Frame::grouped(build_table(rows, 1_000), &["key"]).unwrap();
    let engine = VerbEngine::default();
    let expr = Expr::min_rank("amount").descending();

    let mut group = c.benchmark_group("grouped_mutate");
    group.sample_size(10);
    group.throughput(Throughput::Elements(rows as u64));
    group.bench_with_input(BenchmarkId::new("min_rank", rows), &expr, |b, expr| {
        b.iter(|| black_box(engine.mutate(&frame, "r", expr).unwrap()))
    });
    group.finish();
}

fn bench_hash_join(c: &mut Criterion) {
    let rows = bench_rows();
    let dim_keys = 10_000usize;
    let fact = build_table(rows, dim_keys);
    let dim = Table::new(vec![
        Column::int("key", (0..dim_keys as i64).map(Some)),
        Column::int("bucket", (0..dim_keys as i64).map(|k| Some(k % 10))),
    ])
    .unwrap();

    let mut group = c.benchmark_group("hash_join");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(5));
    group.throughput(Throughput::Elements(rows as u64));

    for kind in [JoinKind::Inner, JoinKind::Left, JoinKind::Semi] {
        let plan = JoinPlan::on(&["key"], kind);
        group.bench_with_input(BenchmarkId::new(format!("{kind:?}"), rows), &plan, |b, plan| {
            b.iter(|| black_box(join(&fact, &dim, plan).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_grouped_summarise,
    bench_grouped_rank,
    bench_hash_join
);
criterion_main!(benches);
