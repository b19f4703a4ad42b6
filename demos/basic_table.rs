/// Basic Table Example
///
/// This example demonstrates:
/// - Building a materialized table from rows and from CSV
/// - Editing cells and inserting/removing rows
/// - Layering presentation attributes with an overlay

use std::sync::Arc;
use tablelens::lens::{header_names, snapshot};
use tablelens::{AttributeTableLens, Color, ColumnValue, MaterializedTable, TableLens};

fn print_table(table: &dyn TableLens) {
    for (i, row) in snapshot(table).iter().enumerate() {
        let cells: Vec<String> = row.iter().map(|v| format!("{v:>10}")).collect();
        println!("   {i:>2} |{}", cells.join(" |"));
    }
    println!();
}

fn main() {
    env_logger::init();
    println!("=== TableLens Basic Table Example ===\n");

    // 1. Create a table from rows. Row 0 is the header.
    println!("1. Creating table...");
    let users = Arc::new(MaterializedTable::from_rows(vec![
        vec!["id".into(), "name".into(), "age".into()],
        vec![1.into(), "Alice".into(), 30.into()],
        vec![2.into(), "Bob".into(), ColumnValue::Null],
        vec![3.into(), "Charlie".into(), 25.into()],
    ]));
    println!("   Columns: {:?}", header_names(users.as_ref()));
    print_table(users.as_ref());

    // 2. Update a value
    println!("2. Updating Bob's age...");
    users.set_object(2, 2, 28.into()).unwrap();
    print_table(users.as_ref());

    // 3. Insert and remove rows
    println!("3. Inserting a row at index 1, removing row 3...");
    users.insert_rows(1, 1).unwrap();
    users.set_object(1, 0, 4.into()).unwrap();
    users.set_object(1, 1, "Diana".into()).unwrap();
    users.set_object(1, 2, 35.into()).unwrap();
    users.remove_rows(3, 1).unwrap();
    print_table(users.as_ref());

    // 4. Load CSV with type inference
    println!("4. Loading CSV...");
    let csv = "product,quantity,price\nWidget,10,9.99\nGadget,5,19.99\n";
    let products = MaterializedTable::from_csv(csv).unwrap();
    for col in 0..products.col_count() {
        println!("   column {col}: {:?}", products.col_type(col));
    }
    println!();

    // 5. Overlay attributes without touching the base
    println!("5. Highlighting row 1 through an overlay...");
    let overlay = AttributeTableLens::new(users.clone());
    overlay.update_styles(|s| s.background.set_row(1, Some(Some(Color::rgb(255, 255, 0)))));
    println!("   background(1, 0) = {:?}", overlay.background(1, 0));
    println!("   background(2, 0) = {:?}", overlay.background(2, 0));

    println!("\n=== Example Complete ===");
}
