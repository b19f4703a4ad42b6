//! Positional side-by-side merge of two tables.
//!
//! Output row `r` shows row `r` of the left table followed by row `r` of the
//! right table. A side that has no row `r` reads as nulls.

use crate::column::ColumnValue;
use crate::event::{BaseChangeHandler, BaseSubscription, ListenerRegistry};
use crate::lens::{BinaryTableFilter, RowCount, SharedLens, TableLens};
use parking_lot::Mutex;
use std::sync::Arc;

struct MergedInner {
    left: SharedLens,
    right: SharedLens,
    listeners: ListenerRegistry,
}

impl MergedInner {
    fn split_col(&self, col: usize) -> Option<(&SharedLens, usize)> {
        let left_cols = self.left.col_count();
        if col < left_cols {
            Some((&self.left, col))
        } else if col - left_cols < self.right.col_count() {
            Some((&self.right, col - left_cols))
        } else {
            None
        }
    }
}

impl BaseChangeHandler for MergedInner {
    fn base_changed(&self) {
        self.listeners.fire();
    }
}

pub struct MergedJoinTableLens {
    inner: Arc<MergedInner>,
    subscriptions: Mutex<Vec<BaseSubscription>>,
}

impl MergedJoinTableLens {
    pub fn new(left: SharedLens, right: SharedLens) -> Self {
        let inner = Arc::new(MergedInner {
            left: Arc::clone(&left),
            right: Arc::clone(&right),
            listeners: ListenerRegistry::new(),
        });
        let subscriptions = vec![
            BaseSubscription::forward(left, Arc::downgrade(&inner)),
            BaseSubscription::forward(right, Arc::downgrade(&inner)),
        ];
        MergedJoinTableLens {
            inner,
            subscriptions: Mutex::new(subscriptions),
        }
    }

    fn side_row(table: &SharedLens, row: usize) -> Option<usize> {
        table.row_count().covers(row).then_some(row)
    }
}

impl BinaryTableFilter for MergedJoinTableLens {
    fn left_table(&self) -> SharedLens {
        Arc::clone(&self.inner.left)
    }

    fn right_table(&self) -> SharedLens {
        Arc::clone(&self.inner.right)
    }

    fn left_base_row_index(&self, row: usize) -> Option<usize> {
        Self::side_row(&self.inner.left, row)
    }

    fn right_base_row_index(&self, row: usize) -> Option<usize> {
        Self::side_row(&self.inner.right, row)
    }

    fn left_base_col_index(&self, col: usize) -> Option<usize> {
        (col < self.inner.left.col_count()).then_some(col)
    }

    fn right_base_col_index(&self, col: usize) -> Option<usize> {
        let left_cols = self.inner.left.col_count();
        (col >= left_cols && col - left_cols < self.inner.right.col_count()).then(|| col - left_cols)
    }
}

impl TableLens for MergedJoinTableLens {
    fn row_count(&self) -> RowCount {
        let left = self.inner.left.row_count();
        let right = self.inner.right.row_count();
        let rows = left.loaded().max(right.loaded());
        if left.is_final() && right.is_final() {
            RowCount::Exact(rows)
        } else {
            RowCount::AtLeast(rows)
        }
    }

    fn col_count(&self) -> usize {
        self.inner.left.col_count() + self.inner.right.col_count()
    }

    fn more_rows(&self, row: usize) -> bool {
        let (left, right) = (&self.inner.left, &self.inner.right);
        if left.row_count().covers(row) || right.row_count().covers(row) {
            return true;
        }
        left.more_rows(row) || right.more_rows(row)
    }

    fn header_row_count(&self) -> usize {
        self.inner
            .left
            .header_row_count()
            .min(self.inner.right.header_row_count())
    }

    fn header_col_count(&self) -> usize {
        self.inner.left.header_col_count()
    }

    fn object(&self, row: usize, col: usize) -> ColumnValue {
        match self.cell_source(row, col) {
            Some((table, r, c)) => table.object(r, c),
            None => ColumnValue::Null,
        }
    }

    fn kind(&self) -> &'static str {
        "MergedJoinTableLens"
    }

    fn cell_source(&self, row: usize, col: usize) -> Option<(SharedLens, usize, usize)> {
        let (table, c) = self.inner.split_col(col)?;
        let r = Self::side_row(table, row)?;
        Some((Arc::clone(table), r, c))
    }

    fn col_source(&self, col: usize) -> Option<(SharedLens, usize)> {
        self.inner
            .split_col(col)
            .map(|(table, c)| (Arc::clone(table), c))
    }

    fn cancel(&self) {
        self.inner.left.cancel();
        self.inner.right.cancel();
    }

    fn is_cancelled(&self) -> bool {
        self.inner.left.is_cancelled() || self.inner.right.is_cancelled()
    }

    fn dispose(&self) {
        let released = std::mem::take(&mut *self.subscriptions.lock());
        if released.is_empty() {
            return;
        }
        drop(released);
        self.inner.left.dispose();
        self.inner.right.dispose();
    }

    fn listeners(&self) -> &ListenerRegistry {
        &self.inner.listeners
    }
}
