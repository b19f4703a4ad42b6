//! Static row and column remapping.
//!
//! A [`SubTableLens`] shows an arbitrary selection of base rows and columns in
//! any order, repeated or not. Unless told otherwise it keeps the base header
//! rows and columns in front of the selection.

use crate::column::ColumnValue;
use crate::error::{LensError, Result};
use crate::event::{BaseChangeHandler, BaseSubscription, ListenerRegistry};
use crate::lens::{RowCount, SharedLens, TableFilter, TableLens};
use parking_lot::Mutex;
use std::sync::Arc;

/// Output index to base index along one axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexMap {
    /// Every base index, unchanged. Follows a streaming base as it grows.
    All,
    Indices(Vec<usize>),
}

impl IndexMap {
    fn get(&self, index: usize) -> Option<usize> {
        match self {
            IndexMap::All => Some(index),
            IndexMap::Indices(indices) => indices.get(index).copied(),
        }
    }

    /// Prepend `0..headers` unless the selection already starts with them.
    fn with_headers(self, headers: usize) -> Self {
        match self {
            IndexMap::All => IndexMap::All,
            IndexMap::Indices(indices) => {
                let present = indices
                    .iter()
                    .take(headers)
                    .enumerate()
                    .take_while(|(i, &base)| *i == base)
                    .count();
                if present == headers {
                    return IndexMap::Indices(indices);
                }
                let mut mapped: Vec<usize> = (0..headers).collect();
                mapped.extend(indices.into_iter().filter(|&i| i >= headers));
                IndexMap::Indices(mapped)
            }
        }
    }

    /// Leading entries that map to base header indices in order.
    fn header_len(&self, base_headers: usize) -> usize {
        match self {
            IndexMap::All => base_headers,
            IndexMap::Indices(indices) => indices
                .iter()
                .enumerate()
                .take_while(|(i, &base)| *i == base && base < base_headers)
                .count(),
        }
    }
}

struct SubTableInner {
    base: SharedLens,
    rows: IndexMap,
    cols: IndexMap,
    listeners: ListenerRegistry,
}

impl BaseChangeHandler for SubTableInner {
    fn base_changed(&self) {
        self.listeners.fire();
    }
}

pub struct SubTableLens {
    inner: Arc<SubTableInner>,
    subscription: Mutex<Option<BaseSubscription>>,
}

impl SubTableLens {
    /// Select `rows` and `cols` of `base`, keeping its headers in front.
    pub fn new(base: SharedLens, rows: IndexMap, cols: IndexMap) -> Self {
        let rows = rows.with_headers(base.header_row_count());
        let cols = cols.with_headers(base.header_col_count());
        Self::exact(base, rows, cols)
    }

    /// Select exactly `rows` and `cols`, without adding header indices.
    pub fn exact(base: SharedLens, rows: IndexMap, cols: IndexMap) -> Self {
        let inner = Arc::new(SubTableInner {
            base: Arc::clone(&base),
            rows,
            cols,
            listeners: ListenerRegistry::new(),
        });
        let subscription = BaseSubscription::forward(base, Arc::downgrade(&inner));
        SubTableLens {
            inner,
            subscription: Mutex::new(Some(subscription)),
        }
    }

    /// A contiguous block of `row_count` rows and `col_count` columns. The
    /// base must already hold every selected row.
    pub fn range(
        base: SharedLens,
        row_start: usize,
        row_count: usize,
        col_start: usize,
        col_count: usize,
    ) -> Result<Self> {
        let rows = base.row_count().loaded();
        let cols = base.col_count();
        let row_end = row_start.saturating_add(row_count);
        let col_end = col_start.saturating_add(col_count);
        if row_end > rows {
            return Err(LensError::RowOutOfRange { row: row_end, rows });
        }
        if col_end > cols {
            return Err(LensError::ColumnOutOfRange { col: col_end, cols });
        }
        Ok(Self::new(
            base,
            IndexMap::Indices((row_start..row_end).collect()),
            IndexMap::Indices((col_start..col_end).collect()),
        ))
    }

    pub fn row_map(&self) -> &IndexMap {
        &self.inner.rows
    }

    pub fn col_map(&self) -> &IndexMap {
        &self.inner.cols
    }
}

impl TableFilter for SubTableLens {
    fn base_table(&self) -> SharedLens {
        Arc::clone(&self.inner.base)
    }

    fn base_row_index(&self, row: usize) -> Option<usize> {
        self.inner.rows.get(row)
    }

    fn base_col_index(&self, col: usize) -> Option<usize> {
        self.inner.cols.get(col)
    }
}

impl TableLens for SubTableLens {
    fn row_count(&self) -> RowCount {
        match &self.inner.rows {
            IndexMap::All => self.inner.base.row_count(),
            IndexMap::Indices(rows) => RowCount::Exact(rows.len()),
        }
    }

    fn col_count(&self) -> usize {
        match &self.inner.cols {
            IndexMap::All => self.inner.base.col_count(),
            IndexMap::Indices(cols) => cols.len(),
        }
    }

    fn more_rows(&self, row: usize) -> bool {
        match self.inner.rows.get(row) {
            Some(r) => self.inner.base.more_rows(r),
            None => false,
        }
    }

    fn header_row_count(&self) -> usize {
        self.inner.rows.header_len(self.inner.base.header_row_count())
    }

    fn header_col_count(&self) -> usize {
        self.inner.cols.header_len(self.inner.base.header_col_count())
    }

    fn trailer_row_count(&self) -> usize {
        match self.inner.rows {
            IndexMap::All => self.inner.base.trailer_row_count(),
            IndexMap::Indices(_) => 0,
        }
    }

    fn trailer_col_count(&self) -> usize {
        match self.inner.cols {
            IndexMap::All => self.inner.base.trailer_col_count(),
            IndexMap::Indices(_) => 0,
        }
    }

    fn object(&self, row: usize, col: usize) -> ColumnValue {
        match (self.base_row_index(row), self.base_col_index(col)) {
            (Some(r), Some(c)) => self.inner.base.object(r, c),
            _ => ColumnValue::Null,
        }
    }

    fn kind(&self) -> &'static str {
        "SubTableLens"
    }

    fn cell_source(&self, row: usize, col: usize) -> Option<(SharedLens, usize, usize)> {
        let r = self.base_row_index(row)?;
        let c = self.base_col_index(col)?;
        Some((Arc::clone(&self.inner.base), r, c))
    }

    fn col_source(&self, col: usize) -> Option<(SharedLens, usize)> {
        self.base_col_index(col)
            .map(|c| (Arc::clone(&self.inner.base), c))
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materialized::MaterializedTable;
    use crate::style::Color;
    use pretty_assertions::assert_eq;

    fn grid() -> Arc<MaterializedTable> {
        let mut rows = vec![vec!["a".into(), "b".into(), "c".into()]];
        for r in 1..=4 {
            rows.push((0..3).map(|c| (r * 10 + c).into()).collect());
        }
        Arc::new(MaterializedTable::from_rows(rows))
    }

    #[test]
    fn test_selection_keeps_header() {
        let sub = SubTableLens::new(
            grid(),
            IndexMap::Indices(vec![3, 1]),
            IndexMap::Indices(vec![2, 0]),
        );
        assert_eq!(sub.row_count(), RowCount::Exact(3));
        assert_eq!(sub.header_row_count(), 1);
        assert_eq!(sub.object(0, 0), ColumnValue::from("c"));
        assert_eq!(sub.object(1, 0), ColumnValue::Int32(32));
        assert_eq!(sub.object(2, 1), ColumnValue::Int32(10));
        assert_eq!(sub.base_row_index(3), None);
        assert_eq!(sub.object(3, 0), ColumnValue::Null);
    }

    #[test]
    fn test_exact_selection_has_no_header() {
        let sub = SubTableLens::exact(grid(), IndexMap::Indices(vec![2, 3]), IndexMap::All);
        assert_eq!(sub.header_row_count(), 0);
        assert_eq!(sub.object(0, 1), ColumnValue::Int32(21));
        assert_eq!(sub.col_count(), 3);
    }

    #[test]
    fn test_range_constructor() {
        let sub = SubTableLens::range(grid(), 2, 2, 1, 2).unwrap();
        assert_eq!(sub.row_count(), RowCount::Exact(3));
        assert_eq!(sub.object(0, 0), ColumnValue::from("b"));
        assert_eq!(sub.object(2, 1), ColumnValue::Int32(32));
        assert!(SubTableLens::range(grid(), 3, 5, 0, 1).is_err());
    }

    #[test]
    fn test_styles_follow_base_cells() {
        let base = grid();
        base.update_styles(|s| s.background.set_cell(4, 2, Some(Some(Color::WHITE))));
        let sub = SubTableLens::new(
            base,
            IndexMap::Indices(vec![4]),
            IndexMap::Indices(vec![2]),
        );
        assert_eq!(sub.background(1, 0), Some(Color::WHITE));
        assert_eq!(sub.background(0, 0), None);
    }

    #[test]
    fn test_writes_reach_base() {
        let base = grid();
        let sub = SubTableLens::new(base.clone(), IndexMap::Indices(vec![2]), IndexMap::All);
        sub.set_object(1, 1, 99.into()).unwrap();
        assert_eq!(base.object(2, 1), ColumnValue::Int32(99));
    }
}
