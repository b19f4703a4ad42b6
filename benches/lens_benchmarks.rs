use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tablelens::lens::load_all_rows;
use tablelens::sequence::TieredVec;
use tablelens::*;

fn numbers(rows: usize) -> Arc<MaterializedTable> {
    let mut data = vec![vec!["id".into(), "bucket".into(), "value".into()]];
    for i in 0..rows {
        data.push(vec![
            ColumnValue::Int32(i as i32),
            ColumnValue::Int32((i % 97) as i32),
            ColumnValue::Float64(i as f64 * 1.5),
        ]);
    }
    Arc::new(MaterializedTable::from_rows(data))
}

fn bench_tiered_vec_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("tiered_vec_insert");

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let mut seq = TieredVec::new();
                for i in 0..size {
                    seq.insert(i / 2, black_box(i));
                }
            });
        });
    }
    group.finish();
}

fn bench_distinct(c: &mut Criterion) {
    let mut group = c.benchmark_group("distinct");
    let table = numbers(10_000);

    for algorithm in [DistinctAlgorithm::Hash, DistinctAlgorithm::Sort] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{algorithm:?}")),
            &algorithm,
            |b, &algorithm| {
                b.iter(|| {
                    let distinct = DistinctTableLens::new(
                        table.clone(),
                        Distinct::on(vec![1, 2]).algorithm(algorithm),
                    );
                    black_box(load_all_rows(&distinct))
                });
            },
        );
    }
    group.finish();
}

fn bench_ranking(c: &mut Criterion) {
    let mut group = c.benchmark_group("ranking_top_100");

    for size in [1000, 10000].iter() {
        let table = numbers(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let top = RankingTableLens::new(table.clone(), Ranking::top(2, 100));
                black_box(load_all_rows(&top))
            });
        });
    }
    group.finish();
}

fn bench_formula_columns(c: &mut Criterion) {
    let table = numbers(10_000);
    c.bench_function("formula_two_columns_10000", |b| {
        b.iter(|| {
            let appender = FormulaColumnAppender::new(
                table.clone(),
                vec!["double".to_string(), "label".to_string()],
                vec!["value * 2".to_string(), "IF(double > 100, 'big', 'small')".to_string()],
            )
            .unwrap();
            black_box(appender.object(10_000, 4))
        });
    });
}

fn bench_cross_join_scan(c: &mut Criterion) {
    let left = numbers(300);
    let right = numbers(300);
    c.bench_function("cross_join_300x300", |b| {
        b.iter(|| {
            let join = CrossJoinTableLens::new(left.clone(), right.clone()).unwrap();
            black_box(load_all_rows(&join))
        });
    });
}

criterion_group!(
    benches,
    bench_tiered_vec_insert,
    bench_distinct,
    bench_ranking,
    bench_formula_columns,
    bench_cross_join_scan
);
criterion_main!(benches);
