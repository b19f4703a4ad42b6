//! Sparse layered attribute storage.
//!
//! An [`Overlay`] answers "what is the value for cell (r, c)?" by trying, in
//! order, an exact cell entry, a whole-row entry, a whole-column entry and a
//! table-wide entry. `None` from [`Overlay::get`] means nothing is set at any
//! level and the caller should fall back to its base. To record an explicit
//! "no value" that still stops the fallback, store `None` in an
//! `Overlay<Option<T>>`: `get` then returns `Some(&None)`.

use crate::adjust::IndexAdjuster;
use crate::style::{Alignment, BorderStyle, Color, Font, Insets};
use std::collections::BTreeMap;

/// The level an attribute is set at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Table,
    Row(usize),
    Col(usize),
    Cell(usize, usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Overlay<T> {
    table: Option<T>,
    rows: BTreeMap<usize, T>,
    cols: BTreeMap<usize, T>,
    cells: BTreeMap<(usize, usize), T>,
}

impl<T> Default for Overlay<T> {
    fn default() -> Self {
        Overlay {
            table: None,
            rows: BTreeMap::new(),
            cols: BTreeMap::new(),
            cells: BTreeMap::new(),
        }
    }
}

impl<T> Overlay<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most specific value set for `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> Option<&T> {
        self.cells
            .get(&(row, col))
            .or_else(|| self.rows.get(&row))
            .or_else(|| self.cols.get(&col))
            .or(self.table.as_ref())
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&T> {
        self.cells.get(&(row, col))
    }

    pub fn row(&self, row: usize) -> Option<&T> {
        self.rows.get(&row)
    }

    pub fn col(&self, col: usize) -> Option<&T> {
        self.cols.get(&col)
    }

    pub fn table(&self) -> Option<&T> {
        self.table.as_ref()
    }

    /// Set (`Some`) or remove (`None`) the exact-cell entry.
    pub fn set_cell(&mut self, row: usize, col: usize, value: Option<T>) {
        match value {
            Some(v) => {
                self.cells.insert((row, col), v);
            }
            None => {
                self.cells.remove(&(row, col));
            }
        }
    }

    pub fn set_row(&mut self, row: usize, value: Option<T>) {
        match value {
            Some(v) => {
                self.rows.insert(row, v);
            }
            None => {
                self.rows.remove(&row);
            }
        }
    }

    pub fn set_col(&mut self, col: usize, value: Option<T>) {
        match value {
            Some(v) => {
                self.cols.insert(col, v);
            }
            None => {
                self.cols.remove(&col);
            }
        }
    }

    pub fn set_table(&mut self, value: Option<T>) {
        self.table = value;
    }

    /// Set or remove the entry at `scope`. Other levels are untouched.
    pub fn set(&mut self, scope: Scope, value: Option<T>) {
        match scope {
            Scope::Table => self.set_table(value),
            Scope::Row(r) => self.set_row(r, value),
            Scope::Col(c) => self.set_col(c, value),
            Scope::Cell(r, c) => self.set_cell(r, c, value),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_none() && self.rows.is_empty() && self.cols.is_empty() && self.cells.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Overlay::default();
    }

    pub fn insert_rows(&mut self, at: usize, count: usize) {
        self.rows = shift_keys(std::mem::take(&mut self.rows), |r| {
            Some(IndexAdjuster::after_insert(r, at, count))
        });
        self.cells = shift_keys(std::mem::take(&mut self.cells), |(r, c)| {
            Some((IndexAdjuster::after_insert(r, at, count), c))
        });
    }

    pub fn remove_rows(&mut self, at: usize, count: usize) {
        self.rows = shift_keys(std::mem::take(&mut self.rows), |r| {
            IndexAdjuster::after_remove(r, at, count)
        });
        self.cells = shift_keys(std::mem::take(&mut self.cells), |(r, c)| {
            IndexAdjuster::after_remove(r, at, count).map(|r| (r, c))
        });
    }

    pub fn insert_cols(&mut self, at: usize, count: usize) {
        self.cols = shift_keys(std::mem::take(&mut self.cols), |c| {
            Some(IndexAdjuster::after_insert(c, at, count))
        });
        self.cells = shift_keys(std::mem::take(&mut self.cells), |(r, c)| {
            Some((r, IndexAdjuster::after_insert(c, at, count)))
        });
    }

    pub fn remove_cols(&mut self, at: usize, count: usize) {
        self.cols = shift_keys(std::mem::take(&mut self.cols), |c| {
            IndexAdjuster::after_remove(c, at, count)
        });
        self.cells = shift_keys(std::mem::take(&mut self.cells), |(r, c)| {
            IndexAdjuster::after_remove(c, at, count).map(|c| (r, c))
        });
    }
}

/// Re-key a sparse map, dropping entries whose key maps to `None`.
pub(crate) fn shift_keys<K: Ord + Copy, V>(
    map: BTreeMap<K, V>,
    f: impl Fn(K) -> Option<K>,
) -> BTreeMap<K, V> {
    map.into_iter()
        .filter_map(|(k, v)| f(k).map(|k| (k, v)))
        .collect()
}

/// One overlay per presentation attribute.
///
/// Entries holding `None` are explicit "no value" overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleOverlays {
    pub alignment: Overlay<Alignment>,
    pub font: Overlay<Option<Font>>,
    pub foreground: Overlay<Option<Color>>,
    pub background: Overlay<Option<Color>>,
    pub row_border: Overlay<BorderStyle>,
    pub col_border: Overlay<BorderStyle>,
    pub row_border_color: Overlay<Option<Color>>,
    pub col_border_color: Overlay<Option<Color>>,
    pub line_wrap: Overlay<bool>,
    pub insets: Overlay<Option<Insets>>,
}

impl StyleOverlays {
    pub fn is_empty(&self) -> bool {
        self.alignment.is_empty()
            && self.font.is_empty()
            && self.foreground.is_empty()
            && self.background.is_empty()
            && self.row_border.is_empty()
            && self.col_border.is_empty()
            && self.row_border_color.is_empty()
            && self.col_border_color.is_empty()
            && self.line_wrap.is_empty()
            && self.insets.is_empty()
    }

    pub fn insert_rows(&mut self, at: usize, count: usize) {
        self.alignment.insert_rows(at, count);
        self.font.insert_rows(at, count);
        self.foreground.insert_rows(at, count);
        self.background.insert_rows(at, count);
        self.row_border.insert_rows(at, count);
        self.col_border.insert_rows(at, count);
        self.row_border_color.insert_rows(at, count);
        self.col_border_color.insert_rows(at, count);
        self.line_wrap.insert_rows(at, count);
        self.insets.insert_rows(at, count);
    }

    pub fn remove_rows(&mut self, at: usize, count: usize) {
        self.alignment.remove_rows(at, count);
        self.font.remove_rows(at, count);
        self.foreground.remove_rows(at, count);
        self.background.remove_rows(at, count);
        self.row_border.remove_rows(at, count);
        self.col_border.remove_rows(at, count);
        self.row_border_color.remove_rows(at, count);
        self.col_border_color.remove_rows(at, count);
        self.line_wrap.remove_rows(at, count);
        self.insets.remove_rows(at, count);
    }

    pub fn insert_cols(&mut self, at: usize, count: usize) {
        self.alignment.insert_cols(at, count);
        self.font.insert_cols(at, count);
        self.foreground.insert_cols(at, count);
        self.background.insert_cols(at, count);
        self.row_border.insert_cols(at, count);
        self.col_border.insert_cols(at, count);
        self.row_border_color.insert_cols(at, count);
        self.col_border_color.insert_cols(at, count);
        self.line_wrap.insert_cols(at, count);
        self.insets.insert_cols(at, count);
    }

    pub fn remove_cols(&mut self, at: usize, count: usize) {
        self.alignment.remove_cols(at, count);
        self.font.remove_cols(at, count);
        self.foreground.remove_cols(at, count);
        self.background.remove_cols(at, count);
        self.row_border.remove_cols(at, count);
        self.col_border.remove_cols(at, count);
        self.row_border_color.remove_cols(at, count);
        self.col_border_color.remove_cols(at, count);
        self.line_wrap.remove_cols(at, count);
        self.insets.remove_cols(at, count);
    }
}
