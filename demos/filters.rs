/// Filter Chain Example
///
/// This example demonstrates:
/// - Distinct rows over key columns
/// - Computed columns from expressions
/// - Top-N ranking with ties kept
/// - Row limits and sub tables

use std::sync::Arc;
use tablelens::lens::snapshot;
use tablelens::{
    Distinct, DistinctTableLens, FormulaColumnAppender, IndexMap, MaterializedTable,
    MaxRowsTableLens, Ranking, RankingTableLens, SharedLens, SortFilter, SortKey,
    SubTableLens, TableLens,
};

fn print_table(title: &str, table: &dyn TableLens) {
    println!("{title}");
    for row in snapshot(table) {
        let cells: Vec<String> = row.iter().map(|v| format!("{v:>10}")).collect();
        println!("   {}", cells.join(" |"));
    }
    println!();
}

fn main() {
    env_logger::init();
    println!("=== TableLens Filter Example ===\n");

    let sales: SharedLens = Arc::new(MaterializedTable::from_rows(vec![
        vec!["product".into(), "region".into(), "qty".into(), "price".into()],
        vec!["Widget".into(), "West".into(), 10.into(), 9.99.into()],
        vec!["Gadget".into(), "East".into(), 5.into(), 19.99.into()],
        vec!["Widget".into(), "West".into(), 10.into(), 9.99.into()],
        vec!["Doohickey".into(), "East".into(), 15.into(), 4.99.into()],
        vec!["Gadget".into(), "West".into(), 2.into(), 19.99.into()],
        vec!["Sprocket".into(), "North".into(), 5.into(), 19.99.into()],
    ]));
    print_table("1. Source table", sales.as_ref());

    let distinct: SharedLens = Arc::new(DistinctTableLens::new(
        sales.clone(),
        Distinct::on(vec![0, 1, 2]).stable(true),
    ));
    print_table("2. Distinct product/region/qty", distinct.as_ref());

    let priced: SharedLens = Arc::new(
        FormulaColumnAppender::new(
            distinct.clone(),
            vec!["revenue".to_string(), "tier".to_string()],
            vec![
                "qty * price".to_string(),
                "IF(revenue >= 90, 'high', 'low')".to_string(),
            ],
        )
        .unwrap(),
    );
    print_table("3. With computed columns", priced.as_ref());

    let top = RankingTableLens::new(priced.clone(), Ranking::top(2, 1).keep_ties(true));
    print_table("4. Top quantity (ties kept)", &top);

    let sorted: SharedLens = Arc::new(SortFilter::new(priced.clone(), vec![SortKey::descending(4)]));
    let limited = MaxRowsTableLens::new(sorted, 3);
    print_table("5. Three best sellers by revenue", &limited);

    let slice = SubTableLens::new(
        priced,
        IndexMap::Indices(vec![2, 3]),
        IndexMap::Indices(vec![0, 4]),
    );
    print_table("6. Sub table of rows 2-3, product and revenue", &slice);

    println!("=== Example Complete ===");
}
