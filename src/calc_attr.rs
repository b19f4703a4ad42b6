//! Cell metadata for spreadsheet-style tables.
//!
//! A [`CalcAttr`] is created the first time a setter touches its cell and is
//! kept in a vector sorted by `(row, col)` so lookups are a binary search.
//! Structural edits re-index the entries and drop those whose row or column
//! was removed.

use crate::adjust::IndexAdjuster;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Expansion {
    #[default]
    None,
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopN {
    pub n: usize,
    /// Bottom N instead of top N.
    pub reverse: bool,
    /// Keep rows tied with the Nth value.
    pub keep_ties: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CalcAttr {
    pub row: usize,
    pub col: usize,
    pub cell_name: Option<String>,
    /// Row group the cell expands with.
    pub row_group: Option<String>,
    /// Column group the cell expands with.
    pub col_group: Option<String>,
    pub expansion: Expansion,
    pub merge_cells: bool,
    pub merge_rows: bool,
    pub merge_cols: bool,
    pub bound: bool,
    /// Column used to order the expanded values, if not the cell itself.
    pub order_by: Option<String>,
    pub descending: bool,
    pub top_n: Option<TopN>,
}

impl CalcAttr {
    pub fn new(row: usize, col: usize) -> Self {
        CalcAttr {
            row,
            col,
            ..CalcAttr::default()
        }
    }

    /// True when no field differs from a freshly created attribute.
    pub fn is_default(&self) -> bool {
        *self == CalcAttr::new(self.row, self.col)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalcAttrs {
    attrs: Vec<CalcAttr>,
}

impl CalcAttrs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    fn search(&self, row: usize, col: usize) -> Result<usize, usize> {
        self.attrs
            .binary_search_by(|attr| (attr.row, attr.col).cmp(&(row, col)))
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&CalcAttr> {
        self.search(row, col).ok().map(|i| &self.attrs[i])
    }

    /// Attribute for the cell, created on first use.
    pub fn get_or_create(&mut self, row: usize, col: usize) -> &mut CalcAttr {
        let index = match self.search(row, col) {
            Ok(i) => i,
            Err(i) => {
                self.attrs.insert(i, CalcAttr::new(row, col));
                i
            }
        };
        &mut self.attrs[index]
    }

    pub fn remove(&mut self, row: usize, col: usize) -> Option<CalcAttr> {
        self.search(row, col).ok().map(|i| self.attrs.remove(i))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&CalcAttr> {
        self.attrs
            .iter()
            .find(|attr| attr.cell_name.as_deref() == Some(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &CalcAttr> + '_ {
        self.attrs.iter()
    }

    /// Attributes on one row, in column order.
    pub fn row(&self, row: usize) -> impl Iterator<Item = &CalcAttr> + '_ {
        let start = self.attrs.partition_point(|attr| attr.row < row);
        self.attrs[start..].iter().take_while(move |attr| attr.row == row)
    }

    pub fn insert_rows(&mut self, at: usize, count: usize) {
        for attr in &mut self.attrs {
            attr.row = IndexAdjuster::after_insert(attr.row, at, count);
        }
    }

    pub fn remove_rows(&mut self, at: usize, count: usize) {
        self.attrs.retain_mut(|attr| match IndexAdjuster::after_remove(attr.row, at, count) {
            Some(row) => {
                attr.row = row;
                true
            }
            None => false,
        });
    }

    pub fn insert_cols(&mut self, at: usize, count: usize) {
        for attr in &mut self.attrs {
            attr.col = IndexAdjuster::after_insert(attr.col, at, count);
        }
    }

    pub fn remove_cols(&mut self, at: usize, count: usize) {
        self.attrs.retain_mut(|attr| match IndexAdjuster::after_remove(attr.col, at, count) {
            Some(col) => {
                attr.col = col;
                true
            }
            None => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positions(attrs: &CalcAttrs) -> Vec<(usize, usize)> {
        attrs.iter().map(|a| (a.row, a.col)).collect()
    }

    #[test]
    fn test_lazy_creation_keeps_order() {
        let mut attrs = CalcAttrs::new();
        attrs.get_or_create(3, 1).cell_name = Some("total".into());
        attrs.get_or_create(0, 2).bound = true;
        attrs.get_or_create(3, 0).expansion = Expansion::Vertical;
        attrs.get_or_create(3, 1).merge_cells = true;

        assert_eq!(attrs.len(), 3);
        assert_eq!(positions(&attrs), vec![(0, 2), (3, 0), (3, 1)]);
        let total = attrs.get(3, 1).unwrap();
        assert!(total.merge_cells);
        assert_eq!(total.cell_name.as_deref(), Some("total"));
        assert!(attrs.get(1, 1).is_none());
    }

    #[test]
    fn test_find_by_name() {
        let mut attrs = CalcAttrs::new();
        attrs.get_or_create(2, 2).cell_name = Some("price".into());
        let found = attrs.find_by_name("price").unwrap();
        assert_eq!((found.row, found.col), (2, 2));
        assert!(attrs.find_by_name("missing").is_none());
    }

    #[test]
    fn test_row_edits_reindex() {
        let mut attrs = CalcAttrs::new();
        attrs.get_or_create(1, 0);
        attrs.get_or_create(2, 0);
        attrs.get_or_create(5, 1);

        attrs.insert_rows(2, 2);
        assert_eq!(positions(&attrs), vec![(1, 0), (4, 0), (7, 1)]);

        attrs.remove_rows(3, 2);
        assert_eq!(positions(&attrs), vec![(1, 0), (5, 1)]);
    }

    #[test]
    fn test_col_edits_reindex() {
        let mut attrs = CalcAttrs::new();
        attrs.get_or_create(0, 0);
        attrs.get_or_create(0, 1);
        attrs.get_or_create(1, 3);

        attrs.remove_cols(1, 1);
        assert_eq!(positions(&attrs), vec![(0, 0), (1, 2)]);
        attrs.insert_cols(0, 1);
        assert_eq!(positions(&attrs), vec![(0, 1), (1, 3)]);
        assert_eq!(attrs.row(1).count(), 1);
    }

    #[test]
    fn test_default_detection() {
        let mut attr = CalcAttr::new(4, 4);
        assert!(attr.is_default());
        attr.top_n = Some(TopN {
            n: 3,
            reverse: false,
            keep_ties: true,
        });
        assert!(!attr.is_default());
    }
}
