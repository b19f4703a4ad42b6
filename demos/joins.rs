/// Join Operations Example
///
/// This example demonstrates:
/// - Self join: rows of one table filtered by column comparisons
/// - Cross join: every pairing of two tables, header rows kept
/// - Merged join: two tables side by side, row by row
/// - Union, intersect and minus over tables with the same columns
/// - Joins following their inputs after a change

use std::sync::Arc;
use tablelens::lens::snapshot;
use tablelens::{
    CrossJoinTableLens, JoinCondition, JoinOp, MaterializedTable, MergedJoinTableLens, SelfJoinTableLens,
    SetTableLens, SharedLens, TableLens,
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
    println!("=== TableLens Join Operations Example ===\n");

    // 1. Create tables
    let budget = Arc::new(MaterializedTable::from_rows(vec![
        vec!["dept".into(), "planned".into(), "actual".into()],
        vec!["Sales".into(), 100.into(), 120.into()],
        vec!["Ops".into(), 80.into(), 60.into()],
        vec!["R&D".into(), 150.into(), 150.into()],
    ]));
    let quarters = Arc::new(MaterializedTable::from_rows(vec![
        vec!["quarter".into()],
        vec!["Q1".into()],
        vec!["Q2".into()],
    ]));
    print_table("1. Budget", budget.as_ref());

    // 2. Self join: departments over budget
    let over = SelfJoinTableLens::new(
        budget.clone(),
        vec![JoinCondition::new(2, JoinOp::Gt, 1)],
    )
    .unwrap();
    print_table("2. Actual > planned", &over);

    // 3. Cross join: one row per department and quarter
    let plan = CrossJoinTableLens::new(budget.clone(), quarters.clone()).unwrap();
    print_table("3. Department x quarter", &plan);
    println!("   Fast-varying side: {:?}\n", plan.inner_side());

    // 4. Merged join: side by side
    let merged = MergedJoinTableLens::new(budget.clone(), quarters.clone());
    print_table("4. Budget next to quarters", &merged);

    // 5. Set operations
    let last_year: SharedLens = Arc::new(MaterializedTable::from_rows(vec![
        vec!["dept".into(), "planned".into(), "actual".into()],
        vec!["Sales".into(), 100.into(), 120.into()],
        vec!["Legal".into(), 40.into(), 45.into()],
    ]));
    let both: Vec<SharedLens> = vec![budget.clone() as SharedLens, last_year];
    print_table("5a. Union (distinct)", &SetTableLens::union(both.clone(), true).unwrap());
    print_table("5b. Intersect", &SetTableLens::intersect(both.clone()).unwrap());
    print_table("5c. Minus", &SetTableLens::minus(both).unwrap());

    // 6. Refresh after a change
    println!("6. Ops overspends...");
    budget.set_object(2, 2, 95.into()).unwrap();
    budget.invalidate();
    print_table("   Actual > planned", &over);

    println!("=== Example Complete ===");
}
