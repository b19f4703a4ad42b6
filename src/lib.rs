//! TableLens - lazy, filter-composable tables
//!
//! A table is a grid of values with header and trailer regions and per-cell
//! presentation attributes. Filters wrap other tables and translate
//! coordinates on the way down; change notifications travel back up. Filters
//! that need to scan their base materialize rows in the background while
//! readers consume the rows already produced.

pub mod adjust;
pub mod attribute;
pub mod calc_attr;
pub mod column;
pub mod config;
pub mod cross_join;
pub mod distinct;
pub mod error;
pub mod event;
pub mod expr;
pub mod formula;
pub mod lens;
pub mod materialized;
pub mod max_rows;
pub mod merged_join;
pub mod overlay;
pub mod pool;
pub mod ranking;
pub mod script;
pub mod self_join;
pub mod sequence;
pub mod sort;
pub mod stream;
pub mod style;
pub mod sub_table;
pub mod union;
pub mod warning;

pub use attribute::{AttributeTableLens, Attributes};
pub use calc_attr::{CalcAttr, CalcAttrs, Expansion, TopN};
pub use column::{ColumnType, ColumnValue};
pub use config::{LensConfig, LensEnv};
pub use cross_join::{CrossJoinTableLens, Side};
pub use distinct::{Distinct, DistinctAlgorithm, DistinctTableLens, ExecutionMode};
pub use error::{LensError, Result, ScriptError};
pub use event::{ChangeListener, ListenerId, ListenerRegistry, TableChangeEvent};
pub use expr::ExprEngine;
pub use formula::{EvaluationMode, FormulaColumnAppender};
pub use lens::{BinaryTableFilter, RowCount, SharedLens, TableFilter, TableLens};
pub use materialized::MaterializedTable;
pub use max_rows::MaxRowsTableLens;
pub use merged_join::MergedJoinTableLens;
pub use overlay::{Overlay, Scope, StyleOverlays};
pub use pool::WorkerPool;
pub use ranking::{Ranking, RankingTableLens};
pub use script::{CompiledScript, RowScope, ScriptEngine, ScriptEnv};
pub use self_join::{JoinCondition, JoinOp, SelfJoinTableLens};
pub use sort::{Comparer, SortFilter, SortKey, SortOrder};
pub use stream::{Phase, RowStream};
pub use style::{Alignment, BorderStyle, Color, Font, HAlign, Insets, Span, VAlign};
pub use sub_table::{IndexMap, SubTableLens};
pub use union::{RowLocator, SetOperation, SetTableLens, UnionTableLens};
pub use warning::WarningLog;

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::lens::{load_all_rows, snapshot};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn sales() -> Arc<MaterializedTable> {
        Arc::new(MaterializedTable::from_rows(vec![
            vec!["product".into(), "region".into(), "quantity".into(), "price".into()],
            vec!["Widget".into(), "West".into(), 10.into(), 9.99.into()],
            vec!["Gadget".into(), "East".into(), 5.into(), 19.99.into()],
            vec!["Widget".into(), "West".into(), 7.into(), 9.99.into()],
            vec!["Doohickey".into(), "East".into(), 15.into(), 4.99.into()],
            vec!["Gadget".into(), "West".into(), 2.into(), 19.99.into()],
        ]))
    }

    fn keyed_table(pairs: &[(i32, i32)]) -> Arc<MaterializedTable> {
        let mut rows = vec![vec!["a".into(), "b".into(), "seq".into()]];
        rows.extend(
            pairs
                .iter()
                .enumerate()
                .map(|(i, &(a, b))| vec![a.into(), b.into(), (i as i32).into()]),
        );
        Arc::new(MaterializedTable::from_rows(rows))
    }

    #[test]
    fn test_complete_workflow() {
        let _ = env_logger::builder().is_test(true).try_init();
        let table = sales();

        // Distinct products, then a computed revenue column, then the top two.
        let distinct: SharedLens = Arc::new(DistinctTableLens::new(
            table.clone(),
            Distinct::on(vec![0]),
        ));
        let priced: SharedLens = Arc::new(
            FormulaColumnAppender::new(
                distinct.clone(),
                vec!["revenue".to_string()],
                vec!["quantity * price".to_string()],
            )
            .unwrap(),
        );
        let top = RankingTableLens::new(priced.clone(), Ranking::top(4, 2));
        let overlay = AttributeTableLens::new(Arc::new(top));
        overlay.update_styles(|s| s.foreground.set_row(1, Some(Some(Color::rgb(200, 0, 0)))));

        assert_eq!(load_all_rows(&overlay), 3);
        assert_eq!(overlay.object(0, 4), ColumnValue::from("revenue"));
        assert_eq!(overlay.object(1, 0), ColumnValue::from("Gadget"));
        assert_eq!(overlay.object(2, 0), ColumnValue::from("Widget"));
        assert_eq!(overlay.foreground(1, 2), Some(Color::rgb(200, 0, 0)));
        assert_eq!(overlay.foreground(2, 2), None);

        // Editing the source flows through the whole chain.
        table.set_object(2, 2, 1.into()).unwrap();
        table.invalidate();
        assert_eq!(load_all_rows(&overlay), 3);
        assert_eq!(overlay.object(1, 0), ColumnValue::from("Widget"));
        assert_eq!(overlay.object(2, 0), ColumnValue::from("Doohickey"));
    }

    #[test]
    fn test_union_of_filtered_tables() {
        let table = sales();
        let west = SelfJoinTableLens::new(
            table.clone(),
            vec![JoinCondition::new(1, JoinOp::Eq, 1)],
        )
        .unwrap();
        let first_two = SubTableLens::range(table.clone(), 1, 2, 0, 4).unwrap();
        let union = SetTableLens::union(vec![Arc::new(west) as SharedLens, Arc::new(first_two)], true).unwrap();
        let rows = snapshot(&union);
        assert_eq!(rows.len(), 1 + 5);
        assert_eq!(union.locate(0), Some(RowLocator { table: 0, row: 0 }));
    }

    #[test]
    fn test_cross_join_respects_cell_limit() {
        let env = LensEnv::new(LensConfig {
            max_crossjoin_cells: 10,
            ..LensConfig::default()
        });
        let result = CrossJoinTableLens::with_env(sales(), sales(), env);
        assert!(matches!(result, Err(LensError::CellLimitExceeded { .. })));
    }

    proptest! {
        #[test]
        fn prop_sub_table_translates_coordinates(
            pairs in prop::collection::vec((0i32..4, 0i32..4), 1..25),
            picks in prop::collection::vec(any::<prop::sample::Index>(), 0..10),
        ) {
            let base = keyed_table(&pairs);
            let rows: Vec<usize> = picks.iter().map(|p| 1 + p.index(pairs.len())).collect();
            let sub = SubTableLens::new(base.clone(), IndexMap::Indices(rows.clone()), IndexMap::Indices(vec![2, 0]));
            prop_assert_eq!(sub.row_count(), RowCount::Exact(rows.len() + 1));
            for r in 0..=rows.len() {
                let base_row = sub.base_row_index(r).unwrap();
                for c in 0..2 {
                    let base_col = sub.base_col_index(c).unwrap();
                    prop_assert_eq!(sub.object(r, c), base.object(base_row, base_col));
                }
            }
        }

        #[test]
        fn prop_distinct_algorithms_agree(pairs in prop::collection::vec((0i32..4, 0i32..3), 0..40)) {
            let base = keyed_table(&pairs);
            let kept = |algorithm| {
                let distinct = DistinctTableLens::new(
                    base.clone(),
                    Distinct::on(vec![0, 1]).algorithm(algorithm),
                );
                let rows = load_all_rows(&distinct);
                (1..rows)
                    .filter_map(|r| distinct.base_row_index(r))
                    .collect::<BTreeSet<usize>>()
            };
            let by_hash = kept(DistinctAlgorithm::Hash);
            let by_sort = kept(DistinctAlgorithm::Sort);
            let unique: BTreeSet<(i32, i32)> = pairs.iter().copied().collect();
            prop_assert_eq!(by_hash.len(), unique.len());
            prop_assert_eq!(by_hash, by_sort);
        }

        #[test]
        fn prop_most_specific_attribute_wins(
            cell in any::<bool>(),
            row in any::<bool>(),
            col in any::<bool>(),
            table in any::<bool>(),
        ) {
            let overlay = AttributeTableLens::new(sales());
            overlay.update_styles(|s| {
                if table { s.foreground.set_table(Some(Some(Color(4)))); }
                if col { s.foreground.set_col(1, Some(Some(Color(3)))); }
                if row { s.foreground.set_row(2, Some(Some(Color(2)))); }
                if cell { s.foreground.set_cell(2, 1, Some(Some(Color(1)))); }
            });
            let expected = [(cell, 1), (row, 2), (col, 3), (table, 4)]
                .iter()
                .find(|(set, _)| *set)
                .map(|&(_, c)| Color(c));
            prop_assert_eq!(overlay.foreground(2, 1), expected);
        }

        #[test]
        fn prop_union_all_concatenates_bodies(sizes in prop::collection::vec(0usize..12, 2..5)) {
            let tables: Vec<SharedLens> = sizes
                .iter()
                .map(|&n| {
                    let pairs: Vec<(i32, i32)> = (0..n as i32).map(|i| (i, i)).collect();
                    keyed_table(&pairs) as SharedLens
                })
                .collect();
            let union = SetTableLens::union(tables, false).unwrap();
            prop_assert_eq!(load_all_rows(&union), 1 + sizes.iter().sum::<usize>());
        }
    }
}
