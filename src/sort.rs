//! Sort keys, value comparers and the sort filter.
//!
//! [`SortKey`] addresses a column by index with an order and null placement.
//! [`Comparer`] is the pluggable value ordering used by ranking; comparers
//! that wrap another one with a direction flag can hand back the undirected
//! original through [`Comparer::undirected`].

use crate::column::ColumnValue;
use crate::event::{BaseChangeHandler, BaseSubscription, ListenerRegistry};
use crate::lens::{body_bounds, RowCount, SharedLens, TableFilter, TableLens};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Sort order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortOrder {
    /// Ascending order (smallest first)
    Ascending,
    /// Descending order (largest first)
    Descending,
}

/// A single sort key specifying a column and order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    pub col: usize,
    pub order: SortOrder,
    /// Whether NULL values should be placed first or last
    pub nulls_first: bool,
}

impl SortKey {
    /// Ascending with nulls first, the natural value order.
    pub fn ascending(col: usize) -> Self {
        SortKey {
            col,
            order: SortOrder::Ascending,
            nulls_first: true,
        }
    }

    /// Descending with nulls last, the exact reverse of the natural order.
    pub fn descending(col: usize) -> Self {
        SortKey {
            col,
            order: SortOrder::Descending,
            nulls_first: false,
        }
    }

    pub fn new(col: usize, order: SortOrder, nulls_first: bool) -> Self {
        SortKey {
            col,
            order,
            nulls_first,
        }
    }
}

/// Compare two column values according to a sort key
pub fn compare_values(a: &ColumnValue, b: &ColumnValue, key: &SortKey) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => {
            return if key.nulls_first {
                Ordering::Less
            } else {
                Ordering::Greater
            };
        }
        (false, true) => {
            return if key.nulls_first {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }
        (false, false) => {}
    }

    let base_cmp = a.compare(b);
    match key.order {
        SortOrder::Ascending => base_cmp,
        SortOrder::Descending => base_cmp.reverse(),
    }
}

/// Compare two rows of `table` key by key.
pub fn compare_rows<T: TableLens + ?Sized>(table: &T, a: usize, b: usize, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let cmp = compare_values(&table.object(a, key.col), &table.object(b, key.col), key);
        if cmp != Ordering::Equal {
            return cmp;
        }
    }
    Ordering::Equal
}

/// Value ordering used by ranking.
pub trait Comparer: Send + Sync + fmt::Debug {
    fn compare(&self, a: &ColumnValue, b: &ColumnValue) -> Ordering;

    /// The comparer this one wraps with a direction flag, if any.
    fn undirected(&self) -> Option<Arc<dyn Comparer>> {
        None
    }
}

/// [`ColumnValue::compare`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalComparer;

impl Comparer for NaturalComparer {
    fn compare(&self, a: &ColumnValue, b: &ColumnValue) -> Ordering {
        a.compare(b)
    }
}

/// Text comparison ignoring case; other values compare naturally.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaseInsensitiveComparer;

impl Comparer for CaseInsensitiveComparer {
    fn compare(&self, a: &ColumnValue, b: &ColumnValue) -> Ordering {
        match (a.as_string(), b.as_string()) {
            (Some(x), Some(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
            _ => a.compare(b),
        }
    }
}

/// Another comparer, optionally negated.
#[derive(Debug, Clone)]
pub struct DirectedComparer {
    inner: Arc<dyn Comparer>,
    descending: bool,
}

impl DirectedComparer {
    pub fn new(inner: Arc<dyn Comparer>, descending: bool) -> Self {
        DirectedComparer { inner, descending }
    }
}

impl Comparer for DirectedComparer {
    fn compare(&self, a: &ColumnValue, b: &ColumnValue) -> Ordering {
        let cmp = self.inner.compare(a, b);
        if self.descending {
            cmp.reverse()
        } else {
            cmp
        }
    }

    fn undirected(&self) -> Option<Arc<dyn Comparer>> {
        Some(strip_direction(Arc::clone(&self.inner)))
    }
}

/// Peel off every direction wrapper.
pub fn strip_direction(mut comparer: Arc<dyn Comparer>) -> Arc<dyn Comparer> {
    while let Some(inner) = comparer.undirected() {
        comparer = inner;
    }
    comparer
}

struct SortInner {
    base: SharedLens,
    keys: Vec<SortKey>,
    index: Mutex<Option<Arc<Vec<usize>>>>,
    listeners: ListenerRegistry,
}

impl SortInner {
    /// Output row to base row, header and trailer rows kept in place.
    fn index(&self) -> Arc<Vec<usize>> {
        let mut slot = self.index.lock();
        if let Some(index) = slot.as_ref() {
            return Arc::clone(index);
        }
        let body = body_bounds(self.base.as_ref());
        let total = self.base.row_count().loaded();
        let mut sorted: Vec<usize> = body.clone().collect();
        sorted.sort_by(|&a, &b| compare_rows(self.base.as_ref(), a, b, &self.keys));

        let mut rows: Vec<usize> = (0..body.start).collect();
        rows.extend(sorted);
        rows.extend(body.end..total);
        log::debug!("sorted {} body rows on {} keys", body.len(), self.keys.len());
        let index = Arc::new(rows);
        *slot = Some(Arc::clone(&index));
        index
    }

    fn reset(&self) {
        *self.index.lock() = None;
        self.listeners.fire();
    }
}

impl BaseChangeHandler for SortInner {
    fn base_changed(&self) {
        self.reset();
    }
}

/// Body rows of the base in key order. Sorting happens on first access.
pub struct SortFilter {
    inner: Arc<SortInner>,
    subscription: Mutex<Option<BaseSubscription>>,
}

impl SortFilter {
    pub fn new(base: SharedLens, keys: Vec<SortKey>) -> Self {
        let inner = Arc::new(SortInner {
            base: Arc::clone(&base),
            keys,
            index: Mutex::new(None),
            listeners: ListenerRegistry::new(),
        });
        let subscription = BaseSubscription::forward(base, Arc::downgrade(&inner));
        SortFilter {
            inner,
            subscription: Mutex::new(Some(subscription)),
        }
    }
}

impl TableFilter for SortFilter {
    fn base_table(&self) -> SharedLens {
        Arc::clone(&self.inner.base)
    }

    fn base_row_index(&self, row: usize) -> Option<usize> {
        self.inner.index().get(row).copied()
    }

    fn base_col_index(&self, col: usize) -> Option<usize> {
        Some(col)
    }
}

impl TableLens for SortFilter {
    fn row_count(&self) -> RowCount {
        RowCount::Exact(self.inner.index().len())
    }

    fn col_count(&self) -> usize {
        self.inner.base.col_count()
    }

    fn header_row_count(&self) -> usize {
        self.inner.base.header_row_count()
    }

    fn header_col_count(&self) -> usize {
        self.inner.base.header_col_count()
    }

    fn trailer_row_count(&self) -> usize {
        self.inner.base.trailer_row_count()
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
        "SortFilter"
    }

    fn cell_source(&self, row: usize, col: usize) -> Option<(SharedLens, usize, usize)> {
        self.base_row_index(row)
            .map(|r| (Arc::clone(&self.inner.base), r, col))
    }

    fn col_source(&self, col: usize) -> Option<(SharedLens, usize)> {
        Some((Arc::clone(&self.inner.base), col))
    }

    fn sort_keys(&self) -> Option<Vec<SortKey>> {
        Some(self.inner.keys.clone())
    }

    fn invalidate(&self) {
        self.inner.reset();
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
