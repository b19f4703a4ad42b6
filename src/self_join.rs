//! Row filter comparing columns of the same row.

use crate::column::ColumnValue;
use crate::config::LensEnv;
use crate::error::{LensError, Result};
use crate::event::{BaseChangeHandler, BaseSubscription, ListenerRegistry};
use crate::lens::{present_header_rows, scan_body_rows, RowCount, SharedLens, TableFilter, TableLens};
use crate::pool::WorkerPool;
use crate::stream::{Phase, RowStream, Ticket};
use crate::warning::row_limit_message;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl JoinOp {
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            JoinOp::Eq => ordering == Ordering::Equal,
            JoinOp::Ne => ordering != Ordering::Equal,
            JoinOp::Gt => ordering == Ordering::Greater,
            JoinOp::Ge => ordering != Ordering::Less,
            JoinOp::Lt => ordering == Ordering::Less,
            JoinOp::Le => ordering != Ordering::Greater,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            JoinOp::Eq => "=",
            JoinOp::Ne => "<>",
            JoinOp::Gt => ">",
            JoinOp::Ge => ">=",
            JoinOp::Lt => "<",
            JoinOp::Le => "<=",
        }
    }
}

impl fmt::Display for JoinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// `left_col op right_col`, evaluated within one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinCondition {
    pub left_col: usize,
    pub op: JoinOp,
    pub right_col: usize,
}

impl JoinCondition {
    pub fn new(left_col: usize, op: JoinOp, right_col: usize) -> Self {
        JoinCondition {
            left_col,
            op,
            right_col,
        }
    }

    /// A null on either side never satisfies a condition.
    pub fn matches<T: TableLens + ?Sized>(&self, table: &T, row: usize) -> bool {
        let left = table.object(row, self.left_col);
        let right = table.object(row, self.right_col);
        if left.is_null() || right.is_null() {
            return false;
        }
        self.op.holds(left.compare(&right))
    }
}

struct SelfJoinInner {
    base: SharedLens,
    conditions: Vec<JoinCondition>,
    env: Arc<LensEnv>,
    stream: RowStream<usize>,
    listeners: ListenerRegistry,
}

impl SelfJoinInner {
    fn start(self: &Arc<Self>) {
        if let Some(ticket) = self.stream.begin() {
            let inner = Arc::clone(self);
            WorkerPool::global().execute(move || inner.run(ticket));
        }
    }

    fn run(&self, ticket: Ticket) {
        log::debug!("self join validating {} conditions", self.conditions.len());
        let headers = present_header_rows(self.base.as_ref());
        if !self.stream.extend(ticket, 0..headers) {
            return;
        }
        let limit = self.env.config().max_join_rows;
        let mut matched = 0usize;
        let finished = scan_body_rows(self.base.as_ref(), |row| {
            if !self.stream.is_live(ticket) {
                return false;
            }
            if !self.conditions.iter().all(|c| c.matches(self.base.as_ref(), row)) {
                return true;
            }
            if let Some(limit) = limit {
                if matched >= limit {
                    self.env.warnings().warn(row_limit_message("Join", limit));
                    self.stream.complete(ticket);
                    return false;
                }
            }
            matched += 1;
            self.stream.push(ticket, row)
        });
        if finished {
            self.stream.complete(ticket);
        }
        log::debug!("self join matched {matched} rows");
    }
}

impl BaseChangeHandler for SelfJoinInner {
    fn base_changed(&self) {
        self.stream.reset();
        self.listeners.fire();
    }
}

/// Body rows of the base for which every [`JoinCondition`] holds.
pub struct SelfJoinTableLens {
    inner: Arc<SelfJoinInner>,
    subscription: Mutex<Option<BaseSubscription>>,
}

impl SelfJoinTableLens {
    pub fn new(base: SharedLens, conditions: Vec<JoinCondition>) -> Result<Self> {
        Self::with_env(base, conditions, LensEnv::shared())
    }

    pub fn with_env(base: SharedLens, conditions: Vec<JoinCondition>, env: Arc<LensEnv>) -> Result<Self> {
        let cols = base.col_count();
        if conditions.is_empty() {
            return Err(LensError::Precondition(
                "self join needs at least one condition".to_string(),
            ));
        }
        if let Some(bad) = conditions
            .iter()
            .flat_map(|c| [c.left_col, c.right_col])
            .find(|&c| c >= cols)
        {
            return Err(LensError::ColumnOutOfRange { col: bad, cols });
        }

        let inner = Arc::new(SelfJoinInner {
            base: Arc::clone(&base),
            conditions,
            stream: RowStream::new(env.config().wait_interval()),
            env,
            listeners: ListenerRegistry::new(),
        });
        let subscription = BaseSubscription::forward(base, Arc::downgrade(&inner));
        Ok(SelfJoinTableLens {
            inner,
            subscription: Mutex::new(Some(subscription)),
        })
    }

    pub fn conditions(&self) -> &[JoinCondition] {
        &self.inner.conditions
    }
}

impl TableFilter for SelfJoinTableLens {
    fn base_table(&self) -> SharedLens {
        Arc::clone(&self.inner.base)
    }

    fn base_row_index(&self, row: usize) -> Option<usize> {
        if self.more_rows(row) {
            self.inner.stream.get(row)
        } else {
            None
        }
    }

    fn base_col_index(&self, col: usize) -> Option<usize> {
        Some(col)
    }
}

impl TableLens for SelfJoinTableLens {
    fn row_count(&self) -> RowCount {
        self.inner.start();
        self.inner.stream.row_count()
    }

    fn col_count(&self) -> usize {
        self.inner.base.col_count()
    }

    fn more_rows(&self, row: usize) -> bool {
        self.inner.stream.wait_for(row, || self.inner.start())
    }

    fn header_row_count(&self) -> usize {
        self.inner.base.header_row_count()
    }

    fn header_col_count(&self) -> usize {
        self.inner.base.header_col_count()
    }

    fn trailer_col_count(&self) -> usize {
        self.inner.base.trailer_col_count()
    }

    fn object(&self, row: usize, col: usize) -> ColumnValue {
        match self.base_row_index(row) {
            Some(r) => self.inner.base.object(r, col),
            None => ColumnValue::Null,
        }
    }

    fn kind(&self) -> &'static str {
        "SelfJoinTableLens"
    }

    fn cell_source(&self, row: usize, col: usize) -> Option<(SharedLens, usize, usize)> {
        self.base_row_index(row)
            .map(|r| (Arc::clone(&self.inner.base), r, col))
    }

    fn col_source(&self, col: usize) -> Option<(SharedLens, usize)> {
        Some((Arc::clone(&self.inner.base), col))
    }

    fn invalidate(&self) {
        self.inner.base_changed();
    }

    fn cancel(&self) {
        if self.inner.stream.phase() != Phase::Completed {
            self.inner.stream.cancel();
            self.inner.base.cancel();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.inner.stream.is_cancelled()
    }

    fn dispose(&self) {
        let released = self.subscription.lock().take();
        if let Some(mut subscription) = released {
            subscription.release();
            self.inner.stream.cancel();
            self.inner.base.dispose();
        }
    }

    fn listeners(&self) -> &ListenerRegistry {
        &self.inner.listeners
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LensConfig;
    use crate::lens::load_all_rows;
    use crate::materialized::MaterializedTable;

    fn budgets() -> SharedLens {
        Arc::new(MaterializedTable::from_rows(vec![
            vec!["dept".into(), "budget".into(), "spent".into()],
            vec!["A".into(), 100.into(), 120.into()],
            vec!["B".into(), 200.into(), 150.into()],
            vec!["C".into(), 90.into(), 90.into()],
            vec!["D".into(), ColumnValue::Null, 10.into()],
            vec!["E".into(), 50.into(), 70.5.into()],
        ]))
    }

    fn depts(table: &dyn TableLens) -> Vec<String> {
        (1..load_all_rows(table))
            .map(|r| table.object(r, 0).to_string())
            .collect()
    }

    #[test]
    fn test_join_op_semantics() {
        assert!(JoinOp::Ge.holds(Ordering::Equal));
        assert!(!JoinOp::Gt.holds(Ordering::Equal));
        assert!(JoinOp::Ne.holds(Ordering::Less));
        assert_eq!(JoinOp::Le.to_string(), "<=");
    }

    #[test]
    fn test_filters_rows_where_condition_holds() {
        let over = SelfJoinTableLens::new(budgets(), vec![JoinCondition::new(2, JoinOp::Gt, 1)]).unwrap();
        assert_eq!(depts(&over), vec!["A", "E"]);
        assert_eq!(over.base_row_index(2), Some(5));
        assert_eq!(over.object(0, 0), ColumnValue::from("dept"));
    }

    #[test]
    fn test_conditions_are_conjunctive() {
        let within = SelfJoinTableLens::new(
            budgets(),
            vec![
                JoinCondition::new(2, JoinOp::Le, 1),
                JoinCondition::new(1, JoinOp::Ne, 2),
            ],
        )
        .unwrap();
        assert_eq!(depts(&within), vec!["B"]);
    }

    #[test]
    fn test_invalid_conditions_rejected() {
        assert!(SelfJoinTableLens::new(budgets(), vec![]).is_err());
        let err = SelfJoinTableLens::new(budgets(), vec![JoinCondition::new(0, JoinOp::Eq, 7)])
            .err()
            .unwrap();
        assert_eq!(err, LensError::ColumnOutOfRange { col: 7, cols: 3 });
    }

    #[test]
    fn test_row_cap_warns() {
        let env = LensEnv::new(LensConfig {
            max_join_rows: Some(1),
            ..LensConfig::default()
        });
        let join = SelfJoinTableLens::with_env(
            budgets(),
            vec![JoinCondition::new(1, JoinOp::Ge, 2)],
            Arc::clone(&env),
        )
        .unwrap();
        assert_eq!(depts(&join), vec!["B"]);
        assert_eq!(join.row_count(), RowCount::Exact(2));
        assert_eq!(env.warnings().messages(), vec![row_limit_message("Join", 1)]);
    }
}
