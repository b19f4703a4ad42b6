//! The table contract every data source and filter implements.
//!
//! A lens is a rectangular grid of [`ColumnValue`]s with a header region at the
//! top and left, an optional trailer region at the bottom and right, and
//! per-cell presentation attributes. Row production may still be in progress:
//! [`TableLens::row_count`] then reports [`RowCount::AtLeast`] and
//! [`TableLens::more_rows`] blocks until the requested row exists or the table
//! is known to be shorter.
//!
//! Lenses are shared as `Arc<dyn TableLens>` and read from many threads, so
//! every method takes `&self` and implementations lock internally.

use crate::column::{ColumnType, ColumnValue};
use crate::error::{LensError, Result};
use crate::event::{ChangeListener, ListenerId, ListenerRegistry};
use crate::sort::SortKey;
use crate::style::{Alignment, BorderStyle, Color, Font, Insets, Span};
use std::ops::Range;
use std::sync::Arc;

/// Maximum number of body rows sampled when a column type is inferred.
pub const TYPE_SAMPLE_ROWS: usize = 5000;

/// How many rows a table has, or how many it has produced so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowCount {
    /// Final count. Never changes until the table is invalidated.
    Exact(usize),
    /// This many rows are readable; more may follow.
    AtLeast(usize),
}

impl RowCount {
    /// Rows readable right now.
    pub fn loaded(self) -> usize {
        match self {
            RowCount::Exact(n) | RowCount::AtLeast(n) => n,
        }
    }

    pub fn is_final(self) -> bool {
        matches!(self, RowCount::Exact(_))
    }

    /// True if `row` is already readable.
    pub fn covers(self, row: usize) -> bool {
        row < self.loaded()
    }

    /// Decode the legacy signed form where `-n - 1` means "at least `n`".
    pub fn from_signed(count: i64) -> Self {
        if count >= 0 {
            RowCount::Exact(count as usize)
        } else {
            RowCount::AtLeast((-(count + 1)) as usize)
        }
    }

    pub fn to_signed(self) -> i64 {
        match self {
            RowCount::Exact(n) => n as i64,
            RowCount::AtLeast(n) => -(n as i64) - 1,
        }
    }

    pub fn map(self, f: impl FnOnce(usize) -> usize) -> Self {
        match self {
            RowCount::Exact(n) => RowCount::Exact(f(n)),
            RowCount::AtLeast(n) => RowCount::AtLeast(f(n)),
        }
    }
}

pub type SharedLens = Arc<dyn TableLens>;

pub trait TableLens: Send + Sync {
    fn row_count(&self) -> RowCount;

    fn col_count(&self) -> usize;

    /// Block until `row` exists or the table is known to end before it.
    fn more_rows(&self, row: usize) -> bool {
        self.row_count().covers(row)
    }

    fn header_row_count(&self) -> usize {
        1
    }

    fn header_col_count(&self) -> usize {
        0
    }

    fn trailer_row_count(&self) -> usize {
        0
    }

    fn trailer_col_count(&self) -> usize {
        0
    }

    /// Cell value. Out-of-range or untranslatable cells read as null.
    fn object(&self, row: usize, col: usize) -> ColumnValue;

    /// Like [`TableLens::object`] but surfaces evaluation failures.
    fn try_object(&self, row: usize, col: usize) -> Result<ColumnValue> {
        Ok(self.object(row, col))
    }

    fn set_object(&self, row: usize, col: usize, value: ColumnValue) -> Result<()> {
        match self.cell_source(row, col) {
            Some((base, r, c)) => base.set_object(r, c, value),
            None => Err(LensError::Unsupported {
                lens: self.kind(),
                operation: "set_object",
            }),
        }
    }

    fn col_type(&self, col: usize) -> ColumnType {
        match self.col_source(col) {
            Some((base, c)) => base.col_type(c),
            None => infer_col_type(self, col),
        }
    }

    /// Identity of a column that survives header renames.
    fn column_identifier(&self, col: usize) -> Option<String> {
        self.col_source(col)
            .and_then(|(base, c)| base.column_identifier(c))
    }

    /// Short name used in error messages.
    fn kind(&self) -> &'static str {
        "table"
    }

    /// The base cell that styles and writes for `(row, col)` delegate to.
    fn cell_source(&self, _row: usize, _col: usize) -> Option<(SharedLens, usize, usize)> {
        None
    }

    /// The base column that type and identity lookups for `col` delegate to.
    fn col_source(&self, _col: usize) -> Option<(SharedLens, usize)> {
        None
    }

    fn alignment(&self, row: usize, col: usize) -> Alignment {
        match self.cell_source(row, col) {
            Some((base, r, c)) => base.alignment(r, c),
            None => default_alignment(self, col),
        }
    }

    fn font(&self, row: usize, col: usize) -> Option<Font> {
        self.cell_source(row, col)
            .and_then(|(base, r, c)| base.font(r, c))
    }

    fn foreground(&self, row: usize, col: usize) -> Option<Color> {
        self.cell_source(row, col)
            .and_then(|(base, r, c)| base.foreground(r, c))
    }

    fn background(&self, row: usize, col: usize) -> Option<Color> {
        self.cell_source(row, col)
            .and_then(|(base, r, c)| base.background(r, c))
    }

    /// Border drawn below the cell.
    fn row_border(&self, row: usize, col: usize) -> BorderStyle {
        self.cell_source(row, col)
            .map(|(base, r, c)| base.row_border(r, c))
            .unwrap_or_default()
    }

    /// Border drawn right of the cell.
    fn col_border(&self, row: usize, col: usize) -> BorderStyle {
        self.cell_source(row, col)
            .map(|(base, r, c)| base.col_border(r, c))
            .unwrap_or_default()
    }

    fn row_border_color(&self, row: usize, col: usize) -> Option<Color> {
        self.cell_source(row, col)
            .and_then(|(base, r, c)| base.row_border_color(r, c))
    }

    fn col_border_color(&self, row: usize, col: usize) -> Option<Color> {
        self.cell_source(row, col)
            .and_then(|(base, r, c)| base.col_border_color(r, c))
    }

    fn line_wrap(&self, row: usize, col: usize) -> bool {
        self.cell_source(row, col)
            .map(|(base, r, c)| base.line_wrap(r, c))
            .unwrap_or(true)
    }

    fn insets(&self, row: usize, col: usize) -> Option<Insets> {
        self.cell_source(row, col)
            .and_then(|(base, r, c)| base.insets(r, c))
    }

    fn span(&self, row: usize, col: usize) -> Option<Span> {
        self.cell_source(row, col)
            .and_then(|(base, r, c)| base.span(r, c))
    }

    fn row_height(&self, _row: usize) -> Option<u32> {
        None
    }

    fn col_width(&self, col: usize) -> Option<u32> {
        self.col_source(col)
            .and_then(|(base, c)| base.col_width(c))
    }

    /// Sort order this table's body rows are known to follow, if any.
    fn sort_keys(&self) -> Option<Vec<SortKey>> {
        None
    }

    /// Drop cached results and notify listeners.
    fn invalidate(&self) {
        self.listeners().fire();
    }

    /// Stop background work. Idempotent; a no-op once materialization finished.
    fn cancel(&self) {}

    fn is_cancelled(&self) -> bool {
        false
    }

    /// Release resources. Idempotent. The table must not be read afterwards.
    fn dispose(&self) {}

    fn listeners(&self) -> &ListenerRegistry;

    fn add_change_listener(&self, listener: ChangeListener) -> ListenerId {
        self.listeners().subscribe(listener)
    }

    fn remove_change_listener(&self, id: ListenerId) -> bool {
        self.listeners().unsubscribe(id)
    }
}

/// A lens derived from exactly one base table.
pub trait TableFilter: TableLens {
    fn base_table(&self) -> SharedLens;

    /// Base row shown at `row`, or `None` if the row has no base counterpart.
    fn base_row_index(&self, row: usize) -> Option<usize>;

    fn base_col_index(&self, col: usize) -> Option<usize>;
}

/// A lens combining a left and a right table side by side.
pub trait BinaryTableFilter: TableLens {
    fn left_table(&self) -> SharedLens;

    fn right_table(&self) -> SharedLens;

    fn left_base_row_index(&self, row: usize) -> Option<usize>;

    fn right_base_row_index(&self, row: usize) -> Option<usize>;

    fn left_base_col_index(&self, col: usize) -> Option<usize>;

    fn right_base_col_index(&self, col: usize) -> Option<usize>;
}

/// Infer a column type from its body values.
///
/// At most [`TYPE_SAMPLE_ROWS`] rows are read and a streaming table is only
/// sampled up to the rows it has already produced, so inference never blocks.
pub fn infer_col_type<T: TableLens + ?Sized>(table: &T, col: usize) -> ColumnType {
    let start = table.header_row_count();
    let available = table.row_count().loaded();
    let end = available
        .saturating_sub(table.trailer_row_count())
        .min(start.saturating_add(TYPE_SAMPLE_ROWS));

    let mut inferred: Option<ColumnType> = None;
    for row in start..end {
        let value = table.object(row, col);
        if value.is_null() {
            continue;
        }
        let ty = value.column_type();
        inferred = Some(match inferred {
            None => ty,
            Some(prev) => prev.merge(ty),
        });
        if inferred == Some(ColumnType::String) || inferred == Some(ColumnType::Object) {
            break;
        }
    }
    inferred.unwrap_or(ColumnType::Object)
}

/// Right for numeric columns, left otherwise.
pub fn default_alignment<T: TableLens + ?Sized>(table: &T, col: usize) -> Alignment {
    if table.col_type(col).is_numeric() {
        Alignment::RIGHT
    } else {
        Alignment::LEFT
    }
}

/// Drive `table` to completion and return its final row count.
pub fn load_all_rows<T: TableLens + ?Sized>(table: &T) -> usize {
    loop {
        match table.row_count() {
            RowCount::Exact(n) => return n,
            RowCount::AtLeast(n) => {
                if !table.more_rows(n) {
                    return table.row_count().loaded();
                }
            }
        }
    }
}

/// Header rows that actually exist. Blocks until they are produced.
pub fn present_header_rows<T: TableLens + ?Sized>(table: &T) -> usize {
    (0..table.header_row_count())
        .take_while(|&r| table.more_rows(r))
        .count()
}

/// Body rows of a fully loaded table. Blocks until the table completes.
pub fn body_bounds<T: TableLens + ?Sized>(table: &T) -> Range<usize> {
    let total = load_all_rows(table);
    let start = table.header_row_count().min(total);
    let end = total.saturating_sub(table.trailer_row_count()).max(start);
    start..end
}

/// Visit body rows in order as they become available, without waiting for
/// the table to finish unless it has trailer rows. `visit` returns false to
/// stop early; the result is true if every body row was visited.
pub fn scan_body_rows<T: TableLens + ?Sized>(table: &T, mut visit: impl FnMut(usize) -> bool) -> bool {
    if table.trailer_row_count() > 0 {
        return body_bounds(table).all(visit);
    }
    let mut row = table.header_row_count();
    while table.more_rows(row) {
        if !visit(row) {
            return false;
        }
        row += 1;
    }
    true
}

/// Display names of the columns, taken from the first header row.
pub fn header_names<T: TableLens + ?Sized>(table: &T) -> Vec<String> {
    let has_header = table.header_row_count() > 0 && table.more_rows(0);
    (0..table.col_count())
        .map(|col| {
            if has_header {
                table.object(0, col).to_string()
            } else {
                String::new()
            }
        })
        .collect()
}

/// Copy the rows currently readable into plain vectors. Test and demo helper.
pub fn snapshot<T: TableLens + ?Sized>(table: &T) -> Vec<Vec<ColumnValue>> {
    let rows = load_all_rows(table);
    let cols = table.col_count();
    (0..rows)
        .map(|r| (0..cols).map(|c| table.object(r, c)).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ListenerRegistry;

    struct Fixed {
        rows: Vec<Vec<ColumnValue>>,
        listeners: ListenerRegistry,
    }

    impl TableLens for Fixed {
        fn row_count(&self) -> RowCount {
            RowCount::Exact(self.rows.len())
        }

        fn col_count(&self) -> usize {
            self.rows.first().map_or(0, |r| r.len())
        }

        fn object(&self, row: usize, col: usize) -> ColumnValue {
            self.rows
                .get(row)
                .and_then(|r| r.get(col))
                .cloned()
                .unwrap_or_default()
        }

        fn listeners(&self) -> &ListenerRegistry {
            &self.listeners
        }
    }

    fn fixed() -> Fixed {
        Fixed {
            rows: vec![
                vec!["name".into(), "qty".into()],
                vec!["a".into(), 1.into()],
                vec!["b".into(), ColumnValue::Null],
                vec!["c".into(), 2.5.into()],
            ],
            listeners: ListenerRegistry::new(),
        }
    }

    #[test]
    fn test_row_count_signed_encoding() {
        assert_eq!(RowCount::from_signed(5), RowCount::Exact(5));
        assert_eq!(RowCount::from_signed(-1), RowCount::AtLeast(0));
        assert_eq!(RowCount::from_signed(-4), RowCount::AtLeast(3));
        assert_eq!(RowCount::AtLeast(3).to_signed(), -4);
        assert_eq!(RowCount::Exact(7).to_signed(), 7);
    }

    #[test]
    fn test_row_count_covers() {
        assert!(RowCount::AtLeast(3).covers(2));
        assert!(!RowCount::AtLeast(3).covers(3));
        assert!(!RowCount::AtLeast(3).is_final());
        assert!(RowCount::Exact(0).is_final());
    }

    #[test]
    fn test_defaults() {
        let table = fixed();
        assert_eq!(table.header_row_count(), 1);
        assert_eq!(table.header_col_count(), 0);
        assert!(table.more_rows(3));
        assert!(!table.more_rows(4));
        assert_eq!(table.row_border(1, 1), BorderStyle::Thin);
        assert!(table.font(1, 1).is_none());
        assert!(table.span(0, 0).is_none());
        assert!(table.set_object(1, 1, 3.into()).is_err());
    }

    #[test]
    fn test_inferred_types_drive_alignment() {
        let table = fixed();
        assert_eq!(table.col_type(0), ColumnType::String);
        assert_eq!(table.col_type(1), ColumnType::Float64);
        assert_eq!(table.alignment(1, 0), Alignment::LEFT);
        assert_eq!(table.alignment(1, 1), Alignment::RIGHT);
    }

    #[test]
    fn test_header_names() {
        assert_eq!(header_names(&fixed()), vec!["name", "qty"]);
    }
}
