//! Attribute overlay on top of any table.
//!
//! [`AttributeTableLens`] shows its base table unchanged except where an
//! override has been set. Every attribute getter tries the cell, row, column
//! and table levels of its [`Overlay`] before asking the base. A separate value
//! cache lets callers overwrite cell values without touching the base, which
//! makes read-only sources (query results, filters) look editable.

use crate::column::{ColumnType, ColumnValue};
use crate::error::Result;
use crate::event::{BaseChangeHandler, BaseSubscription, ListenerRegistry};
use crate::lens::{RowCount, SharedLens, TableFilter, TableLens};
use crate::overlay::{Overlay, StyleOverlays};
use crate::style::{Alignment, BorderStyle, Color, Font, Insets, Span};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Presentation attributes an overlay can carry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    pub styles: StyleOverlays,
    pub span: Overlay<Option<Span>>,
    pub row_heights: BTreeMap<usize, u32>,
    pub col_widths: BTreeMap<usize, u32>,
    pub col_types: BTreeMap<usize, ColumnType>,
    pub identifiers: BTreeMap<usize, String>,
}

struct AttributeInner {
    base: SharedLens,
    attrs: Mutex<Attributes>,
    /// Cell values set through `set_object`. A stored `Null` is an explicit null.
    values: Mutex<BTreeMap<(usize, usize), ColumnValue>>,
    /// Inferred column types; dropped on invalidation.
    type_cache: Mutex<HashMap<usize, ColumnType>>,
    listeners: ListenerRegistry,
}

impl AttributeInner {
    fn clear_caches(&self) {
        self.type_cache.lock().clear();
    }
}

impl BaseChangeHandler for AttributeInner {
    fn base_changed(&self) {
        log::debug!("attribute overlay base changed");
        self.clear_caches();
        self.listeners.fire();
    }
}

pub struct AttributeTableLens {
    inner: Arc<AttributeInner>,
    subscription: Mutex<Option<BaseSubscription>>,
    /// Copies share their base with the original and never dispose it.
    owns_base: bool,
}

impl AttributeTableLens {
    pub fn new(base: SharedLens) -> Self {
        Self::with_parts(base, Attributes::default(), BTreeMap::new(), true)
    }

    fn with_parts(
        base: SharedLens,
        attrs: Attributes,
        values: BTreeMap<(usize, usize), ColumnValue>,
        owns_base: bool,
    ) -> Self {
        let inner = Arc::new(AttributeInner {
            base: Arc::clone(&base),
            attrs: Mutex::new(attrs),
            values: Mutex::new(values),
            type_cache: Mutex::new(HashMap::new()),
            listeners: ListenerRegistry::new(),
        });
        let subscription = BaseSubscription::forward(base, Arc::downgrade(&inner));
        AttributeTableLens {
            inner,
            subscription: Mutex::new(Some(subscription)),
            owns_base,
        }
    }

    /// A full copy: same base table, independent copies of every override
    /// and of the value cache.
    pub fn duplicate(&self) -> Self {
        let attrs = self.inner.attrs.lock().clone();
        let values = self.inner.values.lock().clone();
        Self::with_parts(Arc::clone(&self.inner.base), attrs, values, false)
    }

    /// Share the table data, copy only the presentation attributes.
    pub fn clone_attributes(&self) -> Self {
        let attrs = self.inner.attrs.lock().clone();
        Self::with_parts(Arc::clone(&self.inner.base), attrs, BTreeMap::new(), false)
    }

    /// Replace this overlay's attributes with a copy of `other`'s.
    pub fn copy_attributes_from(&self, other: &AttributeTableLens) {
        let attrs = other.inner.attrs.lock().clone();
        *self.inner.attrs.lock() = attrs;
    }

    pub fn attributes(&self) -> Attributes {
        self.inner.attrs.lock().clone()
    }

    /// Edit the style overlays in place.
    pub fn update_styles<R>(&self, f: impl FnOnce(&mut StyleOverlays) -> R) -> R {
        f(&mut self.inner.attrs.lock().styles)
    }

    pub fn update_attributes<R>(&self, f: impl FnOnce(&mut Attributes) -> R) -> R {
        f(&mut self.inner.attrs.lock())
    }

    pub fn set_span(&self, row: usize, col: usize, span: Option<Span>) {
        let span = span.filter(|s| !s.is_trivial());
        self.inner.attrs.lock().span.set_cell(row, col, Some(span));
    }

    pub fn set_row_height(&self, row: usize, height: Option<u32>) {
        let mut attrs = self.inner.attrs.lock();
        match height {
            Some(h) => attrs.row_heights.insert(row, h),
            None => attrs.row_heights.remove(&row),
        };
    }

    pub fn set_col_width(&self, col: usize, width: Option<u32>) {
        let mut attrs = self.inner.attrs.lock();
        match width {
            Some(w) => attrs.col_widths.insert(col, w),
            None => attrs.col_widths.remove(&col),
        };
    }

    pub fn set_col_type(&self, col: usize, ty: Option<ColumnType>) {
        let mut attrs = self.inner.attrs.lock();
        match ty {
            Some(t) => attrs.col_types.insert(col, t),
            None => attrs.col_types.remove(&col),
        };
    }

    pub fn set_column_identifier(&self, col: usize, id: Option<String>) {
        let mut attrs = self.inner.attrs.lock();
        match id {
            Some(id) => attrs.identifiers.insert(col, id),
            None => attrs.identifiers.remove(&col),
        };
    }

    /// Forget a cell value set through `set_object`.
    pub fn clear_object(&self, row: usize, col: usize) {
        self.inner.values.lock().remove(&(row, col));
    }

    pub fn clear_values(&self) {
        self.inner.values.lock().clear();
    }
}

impl TableFilter for AttributeTableLens {
    fn base_table(&self) -> SharedLens {
        Arc::clone(&self.inner.base)
    }

    fn base_row_index(&self, row: usize) -> Option<usize> {
        Some(row)
    }

    fn base_col_index(&self, col: usize) -> Option<usize> {
        Some(col)
    }
}

impl TableLens for AttributeTableLens {
    fn row_count(&self) -> RowCount {
        self.inner.base.row_count()
    }

    fn col_count(&self) -> usize {
        self.inner.base.col_count()
    }

    fn more_rows(&self, row: usize) -> bool {
        self.inner.base.more_rows(row)
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
        let cached = self.inner.values.lock().get(&(row, col)).cloned();
        cached.unwrap_or_else(|| self.inner.base.object(row, col))
    }

    fn try_object(&self, row: usize, col: usize) -> Result<ColumnValue> {
        let cached = self.inner.values.lock().get(&(row, col)).cloned();
        match cached {
            Some(value) => Ok(value),
            None => self.inner.base.try_object(row, col),
        }
    }

    /// Writes go to the value cache; the base table is never modified.
    fn set_object(&self, row: usize, col: usize, value: ColumnValue) -> Result<()> {
        self.inner.values.lock().insert((row, col), value);
        Ok(())
    }

    fn col_type(&self, col: usize) -> ColumnType {
        let declared = self.inner.attrs.lock().col_types.get(&col).copied();
        if let Some(ty) = declared {
            return ty;
        }
        let cached = self.inner.type_cache.lock().get(&col).copied();
        if let Some(ty) = cached {
            return ty;
        }
        let ty = self.inner.base.col_type(col);
        if self.inner.base.row_count().is_final() {
            self.inner.type_cache.lock().insert(col, ty);
        }
        ty
    }

    fn column_identifier(&self, col: usize) -> Option<String> {
        let set = self.inner.attrs.lock().identifiers.get(&col).cloned();
        set.or_else(|| self.inner.base.column_identifier(col))
    }

    fn kind(&self) -> &'static str {
        "AttributeTableLens"
    }

    fn cell_source(&self, row: usize, col: usize) -> Option<(SharedLens, usize, usize)> {
        Some((Arc::clone(&self.inner.base), row, col))
    }

    fn col_source(&self, col: usize) -> Option<(SharedLens, usize)> {
        Some((Arc::clone(&self.inner.base), col))
    }

    fn alignment(&self, row: usize, col: usize) -> Alignment {
        let set = self.inner.attrs.lock().styles.alignment.get(row, col).copied();
        match set {
            Some(a) => a,
            None => self.inner.base.alignment(row, col),
        }
    }

    fn font(&self, row: usize, col: usize) -> Option<Font> {
        let set = self.inner.attrs.lock().styles.font.get(row, col).cloned();
        match set {
            Some(f) => f,
            None => self.inner.base.font(row, col),
        }
    }

    fn foreground(&self, row: usize, col: usize) -> Option<Color> {
        let set = self.inner.attrs.lock().styles.foreground.get(row, col).copied();
        match set {
            Some(c) => c,
            None => self.inner.base.foreground(row, col),
        }
    }

    fn background(&self, row: usize, col: usize) -> Option<Color> {
        let set = self.inner.attrs.lock().styles.background.get(row, col).copied();
        match set {
            Some(c) => c,
            None => self.inner.base.background(row, col),
        }
    }

    fn row_border(&self, row: usize, col: usize) -> BorderStyle {
        let set = self.inner.attrs.lock().styles.row_border.get(row, col).copied();
        match set {
            Some(b) => b,
            None => self.inner.base.row_border(row, col),
        }
    }

    fn col_border(&self, row: usize, col: usize) -> BorderStyle {
        let set = self.inner.attrs.lock().styles.col_border.get(row, col).copied();
        match set {
            Some(b) => b,
            None => self.inner.base.col_border(row, col),
        }
    }

    fn row_border_color(&self, row: usize, col: usize) -> Option<Color> {
        let set = self.inner.attrs.lock().styles.row_border_color.get(row, col).copied();
        match set {
            Some(c) => c,
            None => self.inner.base.row_border_color(row, col),
        }
    }

    fn col_border_color(&self, row: usize, col: usize) -> Option<Color> {
        let set = self.inner.attrs.lock().styles.col_border_color.get(row, col).copied();
        match set {
            Some(c) => c,
            None => self.inner.base.col_border_color(row, col),
        }
    }

    fn line_wrap(&self, row: usize, col: usize) -> bool {
        let set = self.inner.attrs.lock().styles.line_wrap.get(row, col).copied();
        match set {
            Some(w) => w,
            None => self.inner.base.line_wrap(row, col),
        }
    }

    fn insets(&self, row: usize, col: usize) -> Option<Insets> {
        let set = self.inner.attrs.lock().styles.insets.get(row, col).copied();
        match set {
            Some(i) => i,
            None => self.inner.base.insets(row, col),
        }
    }

    fn span(&self, row: usize, col: usize) -> Option<Span> {
        let set = self.inner.attrs.lock().span.get(row, col).copied();
        match set {
            Some(s) => s,
            None => self.inner.base.span(row, col),
        }
    }

    fn row_height(&self, row: usize) -> Option<u32> {
        let set = self.inner.attrs.lock().row_heights.get(&row).copied();
        set.or_else(|| self.inner.base.row_height(row))
    }

    fn col_width(&self, col: usize) -> Option<u32> {
        let set = self.inner.attrs.lock().col_widths.get(&col).copied();
        set.or_else(|| self.inner.base.col_width(col))
    }

    fn sort_keys(&self) -> Option<Vec<crate::sort::SortKey>> {
        self.inner.base.sort_keys()
    }

    /// Clears computed caches; overrides and cached values stay.
    fn invalidate(&self) {
        self.inner.clear_caches();
        self.inner.listeners.fire();
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
            if self.owns_base {
                self.inner.base.dispose();
            }
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
    use crate::overlay::Scope;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn base() -> Arc<MaterializedTable> {
        let table = MaterializedTable::from_rows(vec![
            vec!["item".into(), "qty".into()],
            vec!["apple".into(), 3.into()],
            vec!["pear".into(), 5.into()],
        ]);
        table.update_styles(|s| s.foreground.set_table(Some(Some(Color::BLACK))));
        Arc::new(table)
    }

    #[test]
    fn test_attribute_priority() {
        let lens = AttributeTableLens::new(base());
        let red = Color::rgb(255, 0, 0);
        let green = Color::rgb(0, 255, 0);
        let blue = Color::rgb(0, 0, 255);
        lens.update_styles(|s| {
            s.foreground.set(Scope::Cell(1, 1), Some(Some(red)));
            s.foreground.set(Scope::Row(1), Some(Some(green)));
            s.foreground.set(Scope::Table, Some(Some(blue)));
        });
        assert_eq!(lens.foreground(1, 1), Some(red));

        lens.update_styles(|s| s.foreground.set(Scope::Cell(1, 1), None));
        assert_eq!(lens.foreground(1, 1), Some(green));
        lens.update_styles(|s| s.foreground.set(Scope::Row(1), None));
        assert_eq!(lens.foreground(1, 1), Some(blue));
        lens.update_styles(|s| s.foreground.set(Scope::Table, None));
        assert_eq!(lens.foreground(1, 1), Some(Color::BLACK));
    }

    #[test]
    fn test_explicit_null_override_hides_base() {
        let lens = AttributeTableLens::new(base());
        lens.update_styles(|s| s.foreground.set(Scope::Col(0), Some(None)));
        assert_eq!(lens.foreground(1, 0), None);
        assert_eq!(lens.foreground(1, 1), Some(Color::BLACK));
    }

    #[test]
    fn test_value_cache_makes_base_editable() {
        let table = base();
        let lens = AttributeTableLens::new(table.clone());
        lens.set_object(1, 1, 42.into()).unwrap();
        lens.set_object(2, 1, ColumnValue::Null).unwrap();
        assert_eq!(lens.object(1, 1), ColumnValue::Int32(42));
        assert_eq!(lens.object(2, 1), ColumnValue::Null);
        assert_eq!(table.object(1, 1), ColumnValue::Int32(3));

        lens.clear_object(2, 1);
        assert_eq!(lens.object(2, 1), ColumnValue::Int32(5));
    }

    #[test]
    fn test_duplicate_is_deep() {
        let lens = AttributeTableLens::new(base());
        lens.set_col_width(0, Some(100));
        lens.set_object(1, 0, "kiwi".into()).unwrap();

        let copy = lens.duplicate();
        copy.set_col_width(0, Some(50));
        copy.set_object(1, 0, "plum".into()).unwrap();

        assert_eq!(lens.col_width(0), Some(100));
        assert_eq!(copy.col_width(0), Some(50));
        assert_eq!(lens.object(1, 0), ColumnValue::from("kiwi"));
        assert_eq!(copy.object(1, 0), ColumnValue::from("plum"));
        assert!(Arc::ptr_eq(&lens.base_table(), &copy.base_table()));
    }

    #[test]
    fn test_clone_attributes_shares_data_only() {
        let lens = AttributeTableLens::new(base());
        lens.set_row_height(1, Some(30));
        lens.set_object(1, 0, "kiwi".into()).unwrap();
        let copy = lens.clone_attributes();
        assert_eq!(copy.row_height(1), Some(30));
        assert_eq!(copy.object(1, 0), ColumnValue::from("apple"));
        assert_eq!(copy.attributes(), lens.attributes());
    }

    #[test]
    fn test_declared_type_and_identifier() {
        let lens = AttributeTableLens::new(base());
        assert_eq!(lens.col_type(1), ColumnType::Int32);
        lens.set_col_type(1, Some(ColumnType::Float64));
        lens.set_column_identifier(1, Some("quantity".into()));
        assert_eq!(lens.col_type(1), ColumnType::Float64);
        assert_eq!(lens.column_identifier(1).as_deref(), Some("quantity"));
        assert_eq!(lens.column_identifier(0), None);
    }

    #[test]
    fn test_base_change_propagates() {
        let table = base();
        let lens = AttributeTableLens::new(table.clone());
        let hits = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&hits);
        lens.add_change_listener(Arc::new(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        }));
        table.insert_rows(1, 1).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        lens.dispose();
        lens.dispose();
        table.insert_rows(1, 1).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disposing_a_copy_keeps_original_subscribed() {
        let table = base();
        let lens = AttributeTableLens::new(table.clone());
        let hits = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&hits);
        lens.add_change_listener(Arc::new(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        }));

        let copy = lens.clone_attributes();
        copy.dispose();
        lens.duplicate().dispose();
        table.insert_rows(1, 1).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(lens.row_count(), RowCount::Exact(4));
    }
}
