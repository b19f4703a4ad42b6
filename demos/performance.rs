/// Performance Example
///
/// This example demonstrates:
/// - Reading the first rows of a filter while its base is still loading
/// - Hash versus sort distinct on a large table
/// - Structural edits on a large materialized table

use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tablelens::lens::load_all_rows;
use tablelens::{
    ColumnValue, Distinct, DistinctAlgorithm, DistinctTableLens, MaterializedTable, TableLens,
};

fn main() {
    env_logger::init();
    println!("=== TableLens Performance Example ===\n");

    let n: i32 = 200_000;

    // 1. Streaming: first rows are readable long before the load finishes
    println!("1. Streaming {n} rows through a distinct filter");
    let source = Arc::new(MaterializedTable::streaming(vec!["id".into(), "bucket".into()]));
    let distinct = DistinctTableLens::new(source.clone(), Distinct::on(vec![1]));
    let loader = {
        let source = Arc::clone(&source);
        thread::spawn(move || {
            for i in 0..n {
                source
                    .append_row(vec![ColumnValue::Int32(i), ColumnValue::Int32(i % 1000)])
                    .unwrap();
            }
            source.finish_loading();
        })
    };
    let start = Instant::now();
    distinct.more_rows(10);
    println!("   First 10 distinct rows after {:?}", start.elapsed());
    let rows = load_all_rows(&distinct);
    println!("   All {} distinct rows after {:?}\n", rows - 1, start.elapsed());
    loader.join().unwrap();

    // 2. Hash versus sort
    println!("2. Distinct over two columns");
    let table = Arc::new(MaterializedTable::from_rows(
        std::iter::once(vec!["a".into(), "b".into()])
            .chain((0..n).map(|i| vec![ColumnValue::Int32(i % 500), ColumnValue::Int32(i % 7)]))
            .collect(),
    ));
    for algorithm in [DistinctAlgorithm::Hash, DistinctAlgorithm::Sort] {
        let start = Instant::now();
        let distinct = DistinctTableLens::new(table.clone(), Distinct::on(vec![0, 1]).algorithm(algorithm));
        let rows = load_all_rows(&distinct);
        println!("   {:?}: {} rows in {:?}", algorithm, rows - 1, start.elapsed());
    }
    println!();

    // 3. Structural edits
    println!("3. Inserting 1000 rows in the middle");
    let start = Instant::now();
    for _ in 0..1000 {
        table.insert_rows((n / 2) as usize, 1).unwrap();
    }
    println!("   Done in {:?}, table has {} rows", start.elapsed(), table.row_count().loaded());

    println!("\n=== Example Complete ===");
}
