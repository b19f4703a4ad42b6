//! Caps a table at a fixed number of body rows.

use crate::column::ColumnValue;
use crate::event::{BaseChangeHandler, BaseSubscription, ListenerRegistry};
use crate::lens::{RowCount, SharedLens, TableFilter, TableLens};
use parking_lot::Mutex;
use std::sync::Arc;

struct MaxRowsInner {
    base: SharedLens,
    max_rows: usize,
    listeners: ListenerRegistry,
}

impl MaxRowsInner {
    /// Header rows plus the body row cap.
    fn limit(&self) -> usize {
        self.base.header_row_count().saturating_add(self.max_rows)
    }

    /// One past the last row shown: the limit, or the end of the base body
    /// once the base is final.
    fn end(&self) -> usize {
        match self.base.row_count() {
            RowCount::Exact(n) => n.saturating_sub(self.base.trailer_row_count()).min(self.limit()),
            RowCount::AtLeast(_) => self.limit(),
        }
    }
}

impl BaseChangeHandler for MaxRowsInner {
    fn base_changed(&self) {
        self.listeners.fire();
    }
}

/// The first `max_rows` body rows of the base. Trailer rows are dropped.
pub struct MaxRowsTableLens {
    inner: Arc<MaxRowsInner>,
    subscription: Mutex<Option<BaseSubscription>>,
}

impl MaxRowsTableLens {
    pub fn new(base: SharedLens, max_rows: usize) -> Self {
        let inner = Arc::new(MaxRowsInner {
            base: Arc::clone(&base),
            max_rows,
            listeners: ListenerRegistry::new(),
        });
        let subscription = BaseSubscription::forward(base, Arc::downgrade(&inner));
        MaxRowsTableLens {
            inner,
            subscription: Mutex::new(Some(subscription)),
        }
    }

    pub fn max_rows(&self) -> usize {
        self.inner.max_rows
    }
}

impl TableFilter for MaxRowsTableLens {
    fn base_table(&self) -> SharedLens {
        Arc::clone(&self.inner.base)
    }

    fn base_row_index(&self, row: usize) -> Option<usize> {
        (row < self.inner.end()).then_some(row)
    }

    fn base_col_index(&self, col: usize) -> Option<usize> {
        Some(col)
    }
}

impl TableLens for MaxRowsTableLens {
    fn row_count(&self) -> RowCount {
        let limit = self.inner.limit();
        let trailer = self.inner.base.trailer_row_count();
        match self.inner.base.row_count() {
            RowCount::AtLeast(n) if n >= limit.saturating_add(trailer) => RowCount::Exact(limit),
            count => count.map(|n| n.saturating_sub(trailer).min(limit)),
        }
    }

    fn col_count(&self) -> usize {
        self.inner.base.col_count()
    }

    fn more_rows(&self, row: usize) -> bool {
        row < self.inner.limit()
            && self
                .inner
                .base
                .more_rows(row.saturating_add(self.inner.base.trailer_row_count()))
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
        "MaxRowsTableLens"
    }

    fn cell_source(&self, row: usize, col: usize) -> Option<(SharedLens, usize, usize)> {
        self.base_row_index(row)
            .map(|r| (Arc::clone(&self.inner.base), r, col))
    }

    fn col_source(&self, col: usize) -> Option<(SharedLens, usize)> {
        Some((Arc::clone(&self.inner.base), col))
    }

    fn row_height(&self, row: usize) -> Option<u32> {
        self.base_row_index(row)
            .and_then(|r| self.inner.base.row_height(r))
    }

    fn cancel(&self) {
        self.inner.base.cancel();
    }

    fn is_cancelled(&self) -> bool {
        self.inner.base.is_cancelled()
    }

    fn dispose(&self) {
        let released = self.subscription.lock().take();
        if let Some(mut subscription) = released {
            subscription.release();
            self.inner.base.dispose();
        }
    }

    fn listeners(&self) -> &ListenerRegistry {
        &self.inner.listeners
    }
}
