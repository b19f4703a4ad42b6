//! Cartesian product of two tables' body rows.
//!
//! Each side is counted by its own thread so that two streaming inputs drain
//! concurrently. The side that finishes first becomes the inner (fast-varying)
//! side: its final body row count is the divisor that splits an output body
//! row `k` into `outer = k / inner_rows` and `inner = k % inner_rows`. While
//! the outer side is still streaming, output rows become readable one outer
//! row at a time.
//!
//! Which side finishes first is a race when both inputs stream, so the same
//! inputs can map output rows differently between runs. [`CrossJoinTableLens::inner_side`]
//! reports the outcome.

use crate::column::ColumnValue;
use crate::config::LensEnv;
use crate::error::{LensError, Result};
use crate::event::{BaseChangeHandler, BaseSubscription, ListenerRegistry};
use crate::lens::{BinaryTableFilter, RowCount, SharedLens, TableLens};
use crate::pool::WorkerPool;
use crate::warning::row_limit_message;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    fn other(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct SideCount {
    /// Rows of the side known to exist, headers included.
    loaded: usize,
    done: bool,
}

#[derive(Debug, Default)]
struct CrossState {
    generation: u64,
    started: bool,
    cancelled: bool,
    left: SideCount,
    right: SideCount,
    inner: Option<Side>,
    warned: bool,
}

impl CrossState {
    fn side(&self, side: Side) -> &SideCount {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut SideCount {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }
}

/// Readable rows and whether that number is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Extent {
    rows: usize,
    body: usize,
    exact: bool,
    capped: bool,
}

struct CrossInner {
    left: SharedLens,
    right: SharedLens,
    env: Arc<LensEnv>,
    state: Mutex<CrossState>,
    changed: Condvar,
    listeners: ListenerRegistry,
}

impl CrossInner {
    fn table(&self, side: Side) -> &SharedLens {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    fn header_rows(&self) -> usize {
        self.left.header_row_count().min(self.right.header_row_count())
    }

    /// Body rows of a side that can be joined. Trailer rows never join, so
    /// the last rows of a side still streaming are held back until they are
    /// known to be body rows.
    fn body_rows(&self, state: &CrossState, side: Side) -> usize {
        state
            .side(side)
            .loaded
            .saturating_sub(self.header_rows())
            .saturating_sub(self.table(side).trailer_row_count())
    }

    fn extent(&self, state: &CrossState) -> Extent {
        let headers = self.header_rows();
        let ready_headers = headers.min(state.left.loaded).min(state.right.loaded);
        let Some(inner) = state.inner else {
            let exact = state.cancelled;
            return Extent {
                rows: ready_headers,
                body: 0,
                exact,
                capped: false,
            };
        };
        let outer = state.side(inner.other());
        let inner_rows = self.body_rows(state, inner);
        let outer_rows = self.body_rows(state, inner.other());
        let mut body = inner_rows.saturating_mul(outer_rows);
        let mut exact = outer.done || inner_rows == 0 || state.cancelled;
        let mut capped = false;
        if let Some(limit) = self.env.config().max_join_rows {
            if body >= limit && (body > limit || !exact) {
                capped = body > limit;
                body = limit;
                exact = true;
            }
        }
        let rows = if ready_headers < headers {
            ready_headers
        } else {
            headers + body
        };
        Extent {
            rows,
            body,
            exact,
            capped,
        }
    }

    fn start(self: &Arc<Self>) {
        let generation = {
            let mut state = self.state.lock();
            if state.started || state.cancelled {
                return;
            }
            state.started = true;
            state.generation
        };
        log::debug!("cross join starting side counters");
        for side in [Side::Left, Side::Right] {
            let inner = Arc::clone(self);
            let job = move || inner.count(side, generation);
            let name = format!("crossjoin-{}", if side == Side::Left { "left" } else { "right" });
            if let Err(e) = thread::Builder::new().name(name).spawn(job.clone()) {
                log::warn!("cannot spawn cross join counter, using the worker pool: {e}");
                WorkerPool::global().execute(job);
            }
        }
    }

    fn count(&self, side: Side, generation: u64) {
        let table = self.table(side);
        let mut rows = 0;
        loop {
            if !self.is_live(generation) {
                return;
            }
            if !table.more_rows(rows) {
                break;
            }
            rows += 1;
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            state.side_mut(side).loaded = rows;
            self.check_cap(&mut state);
            drop(state);
            self.changed.notify_all();
        }

        let total = table.row_count().loaded();
        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }
        let count = state.side_mut(side);
        count.loaded = total;
        count.done = true;
        if state.inner.is_none() {
            log::debug!("cross join {side:?} side finished first with {total} rows");
            state.inner = Some(side);
        }
        self.check_cap(&mut state);
        drop(state);
        self.changed.notify_all();
    }

    fn check_cap(&self, state: &mut CrossState) {
        if state.warned {
            return;
        }
        let extent = self.extent(state);
        if extent.capped {
            state.warned = true;
            if let Some(limit) = self.env.config().max_join_rows {
                self.env.warnings().warn(row_limit_message("Cross join", limit));
            }
        }
    }

    fn is_live(&self, generation: u64) -> bool {
        let state = self.state.lock();
        state.generation == generation && !state.cancelled
    }

    fn current(&self) -> Extent {
        self.extent(&self.state.lock())
    }

    fn wait_for(self: &Arc<Self>, row: usize) -> bool {
        self.start();
        let mut state = self.state.lock();
        loop {
            let extent = self.extent(&state);
            if row < extent.rows {
                return true;
            }
            if extent.exact || state.cancelled {
                return false;
            }
            let _ = self
                .changed
                .wait_for(&mut state, self.env.config().wait_interval());
        }
    }

    /// Base rows for an output row, `None` for a side with no counterpart.
    fn locate(&self, row: usize) -> Option<(usize, usize)> {
        let headers = self.header_rows();
        if row < headers {
            return Some((row, row));
        }
        let state = self.state.lock();
        let extent = self.extent(&state);
        if row >= extent.rows {
            return None;
        }
        let inner = state.inner?;
        let inner_rows = self.body_rows(&state, inner);
        if inner_rows == 0 {
            return None;
        }
        let k = row - headers;
        let (outer_index, inner_index) = (k / inner_rows, k % inner_rows);
        Some(match inner {
            Side::Left => (headers + inner_index, headers + outer_index),
            Side::Right => (headers + outer_index, headers + inner_index),
        })
    }

    fn split_col(&self, col: usize) -> Option<(Side, usize)> {
        let left_cols = self.left.col_count();
        if col < left_cols {
            Some((Side::Left, col))
        } else if col < left_cols + self.right.col_count() {
            Some((Side::Right, col - left_cols))
        } else {
            None
        }
    }

    fn reset(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        state.started = false;
        state.left = SideCount::default();
        state.right = SideCount::default();
        state.inner = None;
        state.warned = false;
        drop(state);
        self.changed.notify_all();
    }
}

impl BaseChangeHandler for CrossInner {
    fn base_changed(&self) {
        self.reset();
        self.listeners.fire();
    }
}

pub struct CrossJoinTableLens {
    inner: Arc<CrossInner>,
    subscriptions: Mutex<Vec<BaseSubscription>>,
}

impl CrossJoinTableLens {
    pub fn new(left: SharedLens, right: SharedLens) -> Result<Self> {
        Self::with_env(left, right, LensEnv::shared())
    }

    /// Fails with [`LensError::CellLimitExceeded`] if the product of the rows
    /// loaded so far, times the combined column count, exceeds
    /// `crossjoin.cell.max`.
    pub fn with_env(left: SharedLens, right: SharedLens, env: Arc<LensEnv>) -> Result<Self> {
        let headers = left.header_row_count().min(right.header_row_count());
        let body = |table: &SharedLens| {
            table
                .row_count()
                .loaded()
                .saturating_sub(headers)
                .saturating_sub(table.trailer_row_count())
        };
        let left_rows = body(&left);
        let right_rows = body(&right);
        let columns = left.col_count() + right.col_count();
        let cells = left_rows as u128 * right_rows as u128 * columns as u128;
        let limit = env.config().max_crossjoin_cells;
        if cells > u128::from(limit) {
            return Err(LensError::CellLimitExceeded {
                left_rows,
                right_rows,
                columns,
                cells,
                limit,
            });
        }

        let inner = Arc::new(CrossInner {
            left: Arc::clone(&left),
            right: Arc::clone(&right),
            env,
            state: Mutex::new(CrossState::default()),
            changed: Condvar::new(),
            listeners: ListenerRegistry::new(),
        });
        let subscriptions = vec![
            BaseSubscription::forward(left, Arc::downgrade(&inner)),
            BaseSubscription::forward(right, Arc::downgrade(&inner)),
        ];
        Ok(CrossJoinTableLens {
            inner,
            subscriptions: Mutex::new(subscriptions),
        })
    }

    /// The fast-varying side, once one side has finished.
    pub fn inner_side(&self) -> Option<Side> {
        self.inner.state.lock().inner
    }

    fn cell(&self, row: usize, col: usize) -> Option<(Side, usize, usize)> {
        let (side, c) = self.inner.split_col(col)?;
        let (left_row, right_row) = self.inner.locate(row)?;
        let r = match side {
            Side::Left => left_row,
            Side::Right => right_row,
        };
        Some((side, r, c))
    }
}

impl BinaryTableFilter for CrossJoinTableLens {
    fn left_table(&self) -> SharedLens {
        Arc::clone(&self.inner.left)
    }

    fn right_table(&self) -> SharedLens {
        Arc::clone(&self.inner.right)
    }

    fn left_base_row_index(&self, row: usize) -> Option<usize> {
        self.inner.wait_for(row).then(|| self.inner.locate(row)).flatten().map(|(l, _)| l)
    }

    fn right_base_row_index(&self, row: usize) -> Option<usize> {
        self.inner.wait_for(row).then(|| self.inner.locate(row)).flatten().map(|(_, r)| r)
    }

    fn left_base_col_index(&self, col: usize) -> Option<usize> {
        match self.inner.split_col(col) {
            Some((Side::Left, c)) => Some(c),
            _ => None,
        }
    }

    fn right_base_col_index(&self, col: usize) -> Option<usize> {
        match self.inner.split_col(col) {
            Some((Side::Right, c)) => Some(c),
            _ => None,
        }
    }
}

impl TableLens for CrossJoinTableLens {
    fn row_count(&self) -> RowCount {
        self.inner.start();
        let extent = self.inner.current();
        if extent.exact {
            RowCount::Exact(extent.rows)
        } else {
            RowCount::AtLeast(extent.rows)
        }
    }

    fn col_count(&self) -> usize {
        self.inner.left.col_count() + self.inner.right.col_count()
    }

    fn more_rows(&self, row: usize) -> bool {
        self.inner.wait_for(row)
    }

    fn header_row_count(&self) -> usize {
        self.inner.header_rows()
    }

    fn header_col_count(&self) -> usize {
        self.inner.left.header_col_count()
    }

    fn object(&self, row: usize, col: usize) -> ColumnValue {
        if !self.inner.wait_for(row) {
            return ColumnValue::Null;
        }
        match self.cell(row, col) {
            Some((side, r, c)) => self.inner.table(side).object(r, c),
            None => ColumnValue::Null,
        }
    }

    fn kind(&self) -> &'static str {
        "CrossJoinTableLens"
    }

    fn cell_source(&self, row: usize, col: usize) -> Option<(SharedLens, usize, usize)> {
        if !self.inner.wait_for(row) {
            return None;
        }
        self.cell(row, col)
            .map(|(side, r, c)| (Arc::clone(self.inner.table(side)), r, c))
    }

    fn col_source(&self, col: usize) -> Option<(SharedLens, usize)> {
        self.inner
            .split_col(col)
            .map(|(side, c)| (Arc::clone(self.inner.table(side)), c))
    }

    fn invalidate(&self) {
        self.inner.base_changed();
    }

    fn cancel(&self) {
        let cancelled = {
            let mut state = self.inner.state.lock();
            let finished = state.left.done && state.right.done;
            if finished || state.cancelled {
                false
            } else {
                state.cancelled = true;
                true
            }
        };
        if cancelled {
            log::debug!("cross join cancelled");
            self.inner.changed.notify_all();
            self.inner.left.cancel();
            self.inner.right.cancel();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.inner.state.lock().cancelled
    }

    fn dispose(&self) {
        let released = std::mem::take(&mut *self.subscriptions.lock());
        if released.is_empty() {
            return;
        }
        drop(released);
        self.cancel();
        self.inner.left.dispose();
        self.inner.right.dispose();
    }

    fn listeners(&self) -> &ListenerRegistry {
        &self.inner.listeners
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LensConfig;
    use crate::materialized::MaterializedTable;
    use std::time::Duration;

    fn table(header: &[&str], rows: &[&[i32]]) -> Arc<MaterializedTable> {
        let mut all = vec![header.iter().map(|&h| h.into()).collect::<Vec<ColumnValue>>()];
        all.extend(rows.iter().map(|r| r.iter().map(|&v| v.into()).collect()));
        Arc::new(MaterializedTable::from_rows(all))
    }

    #[test]
    fn test_shape_and_mapping() {
        let left = table(&["a", "b"], &[&[1, 10], &[2, 20], &[3, 30]]);
        let right = table(&["x"], &[&[7], &[8]]);
        let join = CrossJoinTableLens::new(left.clone(), right.clone()).unwrap();
        assert_eq!(crate::lens::load_all_rows(&join), 7);
        assert_eq!(join.row_count(), RowCount::Exact(7));
        assert_eq!(join.col_count(), 3);
        assert_eq!(join.object(0, 2), ColumnValue::from("x"));

        let inner = join.inner_side().unwrap();
        let (inner_rows, outer_rows) = match inner {
            Side::Left => (3, 2),
            Side::Right => (2, 3),
        };
        for k in 0..6 {
            let row = 1 + k;
            let (outer, fast) = (k / inner_rows, k % inner_rows);
            let (l, r) = match inner {
                Side::Left => (fast, outer),
                Side::Right => (outer, fast),
            };
            assert!(outer < outer_rows);
            assert_eq!(join.left_base_row_index(row), Some(1 + l));
            assert_eq!(join.right_base_row_index(row), Some(1 + r));
            assert_eq!(join.object(row, 0), left.object(1 + l, 0));
            assert_eq!(join.object(row, 2), right.object(1 + r, 0));
        }
        assert_eq!(join.right_base_col_index(2), Some(0));
        assert_eq!(join.left_base_col_index(2), None);
    }

    #[test]
    fn test_trailer_rows_are_not_joined() {
        let left = table(&["a"], &[&[1], &[2], &[99]]);
        left.set_trailer_row_count(1);
        let right = table(&["b"], &[&[7], &[8], &[0]]);
        right.set_trailer_row_count(1);
        let join = CrossJoinTableLens::new(left, right).unwrap();
        assert_eq!(crate::lens::load_all_rows(&join), 5);
        for row in 1..5 {
            assert_ne!(join.object(row, 0), ColumnValue::Int32(99));
            assert_ne!(join.object(row, 1), ColumnValue::Int32(0));
        }
        assert_eq!(join.left_base_row_index(5), None);
    }

    #[test]
    fn test_cell_guard_fails_before_work() {
        let env = LensEnv::new(LensConfig {
            max_crossjoin_cells: 10,
            ..LensConfig::default()
        });
        let left = table(&["a"], &[&[1], &[2], &[3]]);
        let right = table(&["b"], &[&[1], &[2]]);
        let err = CrossJoinTableLens::with_env(left, right, env).err().unwrap();
        assert!(matches!(
            err,
            LensError::CellLimitExceeded {
                left_rows: 3,
                right_rows: 2,
                columns: 2,
                cells: 12,
                limit: 10
            }
        ));
    }

    #[test]
    fn test_empty_side_yields_headers_only() {
        let left = table(&["a"], &[&[1], &[2]]);
        let right = table(&["b"], &[]);
        let join = CrossJoinTableLens::new(left, right).unwrap();
        assert_eq!(crate::lens::load_all_rows(&join), 1);
        assert!(!join.more_rows(1));
    }

    #[test]
    fn test_streaming_outer_side() {
        let left = table(&["a"], &[&[1], &[2]]);
        let right = Arc::new(MaterializedTable::streaming(vec!["b".into()]));
        let join = CrossJoinTableLens::new(left, right.clone()).unwrap();
        assert!(join.more_rows(0));
        right.append_row(vec![5.into()]).unwrap();
        assert!(join.more_rows(2));
        assert_eq!(join.inner_side(), Some(Side::Left));
        assert!(!join.row_count().is_final());
        right.append_row(vec![6.into()]).unwrap();
        right.finish_loading();
        assert_eq!(crate::lens::load_all_rows(&join), 5);
        assert_eq!(join.object(4, 1), ColumnValue::Int32(6));
        assert_eq!(join.object(3, 0), ColumnValue::Int32(1));
    }

    #[test]
    fn test_row_cap_truncates() {
        let env = LensEnv::new(LensConfig {
            max_join_rows: Some(4),
            ..LensConfig::default()
        });
        let left = table(&["a"], &[&[1], &[2], &[3]]);
        let right = table(&["b"], &[&[1], &[2]]);
        let join = CrossJoinTableLens::with_env(left, right, Arc::clone(&env)).unwrap();
        assert_eq!(crate::lens::load_all_rows(&join), 5);
        assert_eq!(join.row_count(), RowCount::Exact(5));
        assert_eq!(env.warnings().messages().len(), 1);
    }

    #[test]
    fn test_cancel_stops_streaming_sides() {
        let left = Arc::new(MaterializedTable::streaming(vec!["a".into()]));
        let right = table(&["b"], &[&[1]]);
        let join = CrossJoinTableLens::new(left.clone(), right).unwrap();
        join.row_count();
        thread::sleep(Duration::from_millis(20));
        join.cancel();
        assert!(join.is_cancelled());
        assert!(left.is_cancelled());
        assert!(join.row_count().is_final());
        assert!(!join.more_rows(5));
    }
}
