//! Benchmarks for the render engine
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use graphex::consolidations::ConsolidationFunc;
use graphex::expr::{Evaluator, FunctionRegistry, StaticFetcher};
use graphex::parser::parse;
use graphex::series::{aggregate_series, consolidate, Series};
use std::sync::Arc;

fn create_test_series(count: usize, points: usize) -> Vec<Series> {
    (0..count)
        .map(|n| {
            let values = (0..points)
                .map(|i| if i % 17 == 0 { f64::NAN } else { (i * (n + 1)) as f64 })
                .collect();
            Series::new(format!("servers.host{:03}.cpu", n), values, 60, 0)
        })
        .collect()
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    let targets = [
        ("metric", "servers.web*.cpu.{user,system}"),
        ("nested", "aliasByNode(movingAverage(sumSeries(servers.*.cpu), '5min'), 1)"),
        ("pipe", "servers.*.cpu|scale(2)|summarize('1h', 'max', alignToFrom=true)"),
    ];
    for (label, target) in targets {
        group.bench_function(label, |b| b.iter(|| parse(black_box(target)).unwrap()));
    }

    group.finish();
}

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate");
    let reducer = ConsolidationFunc::parse("sum").unwrap();

    for count in [10, 100] {
        let series = create_test_series(count, 1_440);
        group.throughput(Throughput::Elements((count * 1_440) as u64));
        group.bench_function(format!("sum_{}", count), |b| {
            b.iter(|| aggregate_series("sumSeries", black_box(&series), &|v| reducer.apply(v), 0.0))
        });
    }

    group.finish();
}

fn bench_consolidate(c: &mut Criterion) {
    let mut group = c.benchmark_group("consolidate");
    let series = create_test_series(1, 10_080).remove(0);

    for mdp in [100, 800] {
        group.bench_function(format!("mdp_{}", mdp), |b| {
            b.iter(|| consolidate(black_box(&series), mdp, true))
        });
    }

    group.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let fetcher = StaticFetcher::new(create_test_series(20, 1_440));
    let eval = Evaluator::new(Arc::new(FunctionRegistry::with_builtins()), Arc::new(fetcher));

    let mut group = c.benchmark_group("evaluate");
    group.bench_function("summarize_sum", |b| {
        b.iter(|| {
            runtime
                .block_on(eval.execute(black_box("summarize(sumSeries(servers.*.cpu), '1h', 'sum')"), 0, 86_400))
                .unwrap()
        })
    });
    group.bench_function("moving_average", |b| {
        b.iter(|| {
            runtime
                .block_on(eval.execute(black_box("movingAverage(servers.*.cpu, 10)"), 600, 86_400))
                .unwrap()
        })
    });
    group.finish();
}

criterion_group!(benches, bench_parse, bench_aggregate, bench_consolidate, bench_evaluate);
criterion_main!(benches);
