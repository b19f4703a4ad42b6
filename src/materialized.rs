//! In-memory table lens.
//!
//! A `MaterializedTable` stores its cells as a tiered list of fixed-width
//! rows. Besides values it owns every per-cell attribute a report can set on
//! a concrete table: styles, spans, column widths, row heights, declared column
//! types, column identifiers and spreadsheet cell metadata. Structural edits
//! keep all of them aligned with the rows and columns they belong to.
//!
//! The table can also act as a query-result adapter: after `begin_loading`
//! another thread appends rows while readers block in `more_rows`, until
//! `finish_loading` publishes the final count.
//!
//! # Examples
//!
//! ```
//! use tablelens::{MaterializedTable, TableLens, RowCount, ColumnValue};
//!
//! let table = MaterializedTable::from_csv("id,name\n1,Alice\n2,Bob").unwrap();
//! assert_eq!(table.row_count(), RowCount::Exact(3));
//! assert_eq!(table.object(2, 1), ColumnValue::from("Bob"));
//! ```

use crate::adjust::IndexAdjuster;
use crate::calc_attr::{CalcAttr, CalcAttrs};
use crate::column::{ColumnType, ColumnValue};
use crate::config::LensEnv;
use crate::error::{LensError, Result};
use crate::event::ListenerRegistry;
use crate::lens::{default_alignment, infer_col_type, RowCount, TableLens};
use crate::overlay::{shift_keys, StyleOverlays};
use crate::sequence::TieredVec;
use crate::style::{Alignment, BorderStyle, Color, Font, Insets, Span};
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

struct TableState {
    rows: TieredVec<Vec<ColumnValue>>,
    cols: usize,
    header_rows: usize,
    header_cols: usize,
    trailer_rows: usize,
    trailer_cols: usize,
    col_types: Vec<Option<ColumnType>>,
    identifiers: Vec<Option<String>>,
    col_widths: BTreeMap<usize, u32>,
    row_heights: BTreeMap<usize, u32>,
    styles: StyleOverlays,
    spans: BTreeMap<(usize, usize), Span>,
    calc: CalcAttrs,
    loading: bool,
    cancelled: bool,
}

impl TableState {
    fn new(cols: usize) -> Self {
        TableState {
            rows: TieredVec::new(),
            cols,
            header_rows: 1,
            header_cols: 0,
            trailer_rows: 0,
            trailer_cols: 0,
            col_types: vec![None; cols],
            identifiers: vec![None; cols],
            col_widths: BTreeMap::new(),
            row_heights: BTreeMap::new(),
            styles: StyleOverlays::default(),
            spans: BTreeMap::new(),
            calc: CalcAttrs::new(),
            loading: false,
            cancelled: false,
        }
    }

    fn fit(&self, mut row: Vec<ColumnValue>) -> Vec<ColumnValue> {
        row.resize(self.cols, ColumnValue::Null);
        row
    }
}

pub struct MaterializedTable {
    state: Mutex<TableState>,
    loaded: Condvar,
    wait_interval: Duration,
    listeners: ListenerRegistry,
}

impl MaterializedTable {
    /// A `rows` x `cols` table of nulls with one header row.
    pub fn new(rows: usize, cols: usize) -> Self {
        let mut state = TableState::new(cols);
        for _ in 0..rows {
            state.rows.push(vec![ColumnValue::Null; cols]);
        }
        Self::from_state(state)
    }

    /// Build from row vectors; the first row is the header. Short rows are
    /// padded with nulls to the widest row.
    pub fn from_rows(rows: Vec<Vec<ColumnValue>>) -> Self {
        let cols = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut state = TableState::new(cols);
        for row in rows {
            let row = state.fit(row);
            state.rows.push(row);
        }
        Self::from_state(state)
    }

    /// An empty table in loading state with `header` as its only row.
    pub fn streaming(header: Vec<ColumnValue>) -> Self {
        let mut state = TableState::new(header.len());
        state.rows.push(header);
        state.loading = true;
        Self::from_state(state)
    }

    /// Parse CSV text. The first record is the header; cell types are inferred
    /// per value and each column's declared type is the merge of its values.
    pub fn from_csv(csv: &str) -> Result<Self> {
        let records = parse_csv_rows(csv);
        let Some(header) = records.first() else {
            return Err(LensError::Precondition("CSV is empty".to_string()));
        };
        if header.iter().all(|f| f.is_empty()) {
            return Err(LensError::Precondition("CSV header is empty".to_string()));
        }
        let cols = header.len();

        let mut state = TableState::new(cols);
        state
            .rows
            .push(header.iter().map(|name| ColumnValue::from(name.as_str())).collect());
        let mut types: Vec<Option<ColumnType>> = vec![None; cols];
        for (line, record) in records.iter().enumerate().skip(1) {
            if record.iter().all(|f| f.is_empty()) {
                continue;
            }
            if record.len() != cols {
                return Err(LensError::Precondition(format!(
                    "column count mismatch on record {line}: header has {cols}, record has {}",
                    record.len()
                )));
            }
            let values: Vec<ColumnValue> = record.iter().map(|f| ColumnValue::infer(f)).collect();
            for (ty, value) in types.iter_mut().zip(&values) {
                if !value.is_null() {
                    let observed = value.column_type();
                    *ty = Some(ty.map_or(observed, |t| t.merge(observed)));
                }
            }
            state.rows.push(values);
        }
        state.col_types = types;
        log::debug!("loaded CSV table with {} rows and {cols} columns", state.rows.len());
        Ok(Self::from_state(state))
    }

    fn from_state(state: TableState) -> Self {
        MaterializedTable {
            state: Mutex::new(state),
            loaded: Condvar::new(),
            wait_interval: LensEnv::shared().config().wait_interval(),
            listeners: ListenerRegistry::new(),
        }
    }

    /// Copy the readable rows of `table` with its regions, spans, widths and
    /// column identifiers.
    pub fn copy_of(table: &dyn TableLens) -> Self {
        let rows = crate::lens::load_all_rows(table);
        let cols = table.col_count();
        let mut state = TableState::new(cols);
        state.header_rows = table.header_row_count();
        state.header_cols = table.header_col_count();
        state.trailer_rows = table.trailer_row_count();
        state.trailer_cols = table.trailer_col_count();
        for r in 0..rows {
            state
                .rows
                .push((0..cols).map(|c| table.object(r, c)).collect());
            for c in 0..cols {
                if let Some(span) = table.span(r, c) {
                    state.spans.insert((r, c), span);
                }
            }
        }
        for c in 0..cols {
            state.identifiers[c] = table.column_identifier(c);
            if let Some(width) = table.col_width(c) {
                state.col_widths.insert(c, width);
            }
        }
        Self::from_state(state)
    }

    // ------------------------------------------------------------------
    // Streaming
    // ------------------------------------------------------------------

    pub fn begin_loading(&self) {
        let mut state = self.state.lock();
        state.loading = true;
        state.cancelled = false;
    }

    /// Append a row, padding or truncating it to the column count.
    pub fn append_row(&self, row: Vec<ColumnValue>) -> Result<()> {
        let mut state = self.state.lock();
        if state.cancelled {
            return Err(LensError::Cancelled);
        }
        let row = state.fit(row);
        state.rows.push(row);
        drop(state);
        self.loaded.notify_all();
        Ok(())
    }

    pub fn finish_loading(&self) {
        self.state.lock().loading = false;
        self.loaded.notify_all();
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }

    // ------------------------------------------------------------------
    // Regions and column metadata
    // ------------------------------------------------------------------

    pub fn set_header_row_count(&self, n: usize) {
        self.state.lock().header_rows = n;
    }

    pub fn set_header_col_count(&self, n: usize) {
        self.state.lock().header_cols = n;
    }

    pub fn set_trailer_row_count(&self, n: usize) {
        self.state.lock().trailer_rows = n;
    }

    pub fn set_trailer_col_count(&self, n: usize) {
        self.state.lock().trailer_cols = n;
    }

    /// Declare a column type; `None` returns the column to inference.
    pub fn set_col_type(&self, col: usize, ty: Option<ColumnType>) -> Result<()> {
        let mut state = self.state.lock();
        let cols = state.cols;
        let slot = state
            .col_types
            .get_mut(col)
            .ok_or(LensError::ColumnOutOfRange { col, cols })?;
        *slot = ty;
        Ok(())
    }

    pub fn set_column_identifier(&self, col: usize, id: Option<String>) -> Result<()> {
        let mut state = self.state.lock();
        let cols = state.cols;
        let slot = state
            .identifiers
            .get_mut(col)
            .ok_or(LensError::ColumnOutOfRange { col, cols })?;
        *slot = id;
        Ok(())
    }

    pub fn set_col_width(&self, col: usize, width: Option<u32>) {
        let mut state = self.state.lock();
        match width {
            Some(w) => state.col_widths.insert(col, w),
            None => state.col_widths.remove(&col),
        };
    }

    pub fn set_row_height(&self, row: usize, height: Option<u32>) {
        let mut state = self.state.lock();
        match height {
            Some(h) => state.row_heights.insert(row, h),
            None => state.row_heights.remove(&row),
        };
    }

    // ------------------------------------------------------------------
    // Styles and spans
    // ------------------------------------------------------------------

    /// Edit the style overlays in place.
    pub fn update_styles<R>(&self, f: impl FnOnce(&mut StyleOverlays) -> R) -> R {
        f(&mut self.state.lock().styles)
    }

    pub fn styles(&self) -> StyleOverlays {
        self.state.lock().styles.clone()
    }

    /// Set or clear the span anchored at `(row, col)`. A 1x1 span clears.
    pub fn set_span(&self, row: usize, col: usize, span: Option<Span>) {
        let mut state = self.state.lock();
        match span.filter(|s| !s.is_trivial()) {
            Some(s) => state.spans.insert((row, col), s),
            None => state.spans.remove(&(row, col)),
        };
    }

    pub fn spans(&self) -> Vec<((usize, usize), Span)> {
        self.state
            .lock()
            .spans
            .iter()
            .map(|(&at, &span)| (at, span))
            .collect()
    }

    // ------------------------------------------------------------------
    // Cell metadata
    // ------------------------------------------------------------------

    pub fn calc_attr(&self, row: usize, col: usize) -> Option<CalcAttr> {
        self.state.lock().calc.get(row, col).cloned()
    }

    /// Edit the metadata of a cell, creating it on first use.
    pub fn update_calc_attr<R>(&self, row: usize, col: usize, f: impl FnOnce(&mut CalcAttr) -> R) -> R {
        f(self.state.lock().calc.get_or_create(row, col))
    }

    pub fn remove_calc_attr(&self, row: usize, col: usize) -> Option<CalcAttr> {
        self.state.lock().calc.remove(row, col)
    }

    /// Location of the cell registered under `name`.
    pub fn find_cell(&self, name: &str) -> Option<(usize, usize)> {
        self.state
            .lock()
            .calc
            .find_by_name(name)
            .map(|attr| (attr.row, attr.col))
    }

    pub fn calc_attrs(&self) -> CalcAttrs {
        self.state.lock().calc.clone()
    }

    pub fn row(&self, row: usize) -> Option<Vec<ColumnValue>> {
        self.state.lock().rows.get(row).cloned()
    }

    // ------------------------------------------------------------------
    // Structural edits
    // ------------------------------------------------------------------

    /// Insert `count` null rows before `at` (`at == rows` appends).
    pub fn insert_rows(&self, at: usize, count: usize) -> Result<()> {
        {
            let mut state = self.state.lock();
            let len = state.rows.len();
            if at > len {
                return Err(LensError::RowOutOfRange { row: at, rows: len });
            }
            if count == 0 {
                return Ok(());
            }
            let blank = vec![ColumnValue::Null; state.cols];
            state.rows.insert_many(at, count, blank);

            if at < state.header_rows {
                state.header_rows += count;
            }
            if state.trailer_rows > 0 && at > len - state.trailer_rows {
                state.trailer_rows += count;
            }
            state.styles.insert_rows(at, count);
            state.calc.insert_rows(at, count);
            state.row_heights = shift_keys(std::mem::take(&mut state.row_heights), |r| {
                Some(IndexAdjuster::after_insert(r, at, count))
            });
            state.spans = std::mem::take(&mut state.spans)
                .into_iter()
                .map(|((r, c), span)| {
                    if at <= r {
                        ((r + count, c), span)
                    } else if at < r + span.height {
                        ((r, c), Span::new(span.width, span.height + count))
                    } else {
                        ((r, c), span)
                    }
                })
                .collect();
        }
        log::debug!("inserted {count} rows at {at}");
        self.listeners.fire();
        Ok(())
    }

    /// Remove rows `[at, at + count)`, clamped to the table.
    pub fn remove_rows(&self, at: usize, count: usize) -> Result<()> {
        {
            let mut state = self.state.lock();
            let len = state.rows.len();
            if at >= len {
                return Err(LensError::RowOutOfRange { row: at, rows: len });
            }
            let count = count.min(len - at);
            if count == 0 {
                return Ok(());
            }
            state.rows.remove_range(at, count);

            let header = state.header_rows;
            state.header_rows -= IndexAdjuster::overlap(0, header, at, count);
            let trailer = state.trailer_rows;
            state.trailer_rows -= IndexAdjuster::overlap(len - trailer, trailer, at, count);
            state.styles.remove_rows(at, count);
            state.calc.remove_rows(at, count);
            state.row_heights = shift_keys(std::mem::take(&mut state.row_heights), |r| {
                IndexAdjuster::after_remove(r, at, count)
            });
            state.spans = std::mem::take(&mut state.spans)
                .into_iter()
                .filter_map(|((r, c), span)| {
                    let (start, height) = IndexAdjuster::shrink_range(r, span.height, at, count);
                    let span = Span::new(span.width, height);
                    (!span.is_trivial()).then_some(((start, c), span))
                })
                .collect();
        }
        log::debug!("removed {count} rows at {at}");
        self.listeners.fire();
        Ok(())
    }

    /// Insert `count` null columns before `at`.
    pub fn insert_cols(&self, at: usize, count: usize) -> Result<()> {
        {
            let mut state = self.state.lock();
            let cols = state.cols;
            if at > cols {
                return Err(LensError::ColumnOutOfRange { col: at, cols });
            }
            if count == 0 {
                return Ok(());
            }
            for row in state.rows.iter_mut() {
                row.splice(at..at, std::iter::repeat(ColumnValue::Null).take(count));
            }
            state.col_types.splice(at..at, std::iter::repeat(None).take(count));
            state.identifiers.splice(at..at, std::iter::repeat(None).take(count));
            state.cols += count;

            if at < state.header_cols {
                state.header_cols += count;
            }
            if state.trailer_cols > 0 && at > cols - state.trailer_cols {
                state.trailer_cols += count;
            }
            state.styles.insert_cols(at, count);
            state.calc.insert_cols(at, count);
            state.col_widths = shift_keys(std::mem::take(&mut state.col_widths), |c| {
                Some(IndexAdjuster::after_insert(c, at, count))
            });
            state.spans = std::mem::take(&mut state.spans)
                .into_iter()
                .map(|((r, c), span)| {
                    if at <= c {
                        ((r, c + count), span)
                    } else if at < c + span.width {
                        ((r, c), Span::new(span.width + count, span.height))
                    } else {
                        ((r, c), span)
                    }
                })
                .collect();
        }
        log::debug!("inserted {count} columns at {at}");
        self.listeners.fire();
        Ok(())
    }

    /// Remove columns `[at, at + count)`, clamped to the table.
    pub fn remove_cols(&self, at: usize, count: usize) -> Result<()> {
        {
            let mut state = self.state.lock();
            let cols = state.cols;
            if at >= cols {
                return Err(LensError::ColumnOutOfRange { col: at, cols });
            }
            let count = count.min(cols - at);
            if count == 0 {
                return Ok(());
            }
            for row in state.rows.iter_mut() {
                row.drain(at..at + count);
            }
            state.col_types.drain(at..at + count);
            state.identifiers.drain(at..at + count);
            state.cols -= count;

            let header = state.header_cols;
            state.header_cols -= IndexAdjuster::overlap(0, header, at, count);
            let trailer = state.trailer_cols;
            state.trailer_cols -= IndexAdjuster::overlap(cols - trailer, trailer, at, count);
            state.styles.remove_cols(at, count);
            state.calc.remove_cols(at, count);
            state.col_widths = shift_keys(std::mem::take(&mut state.col_widths), |c| {
                IndexAdjuster::after_remove(c, at, count)
            });
            state.spans = std::mem::take(&mut state.spans)
                .into_iter()
                .filter_map(|((r, c), span)| {
                    let (start, width) = IndexAdjuster::shrink_range(c, span.width, at, count);
                    let span = Span::new(width, span.height);
                    (!span.is_trivial()).then_some(((r, start), span))
                })
                .collect();
        }
        log::debug!("removed {count} columns at {at}");
        self.listeners.fire();
        Ok(())
    }
}

impl TableLens for MaterializedTable {
    fn row_count(&self) -> RowCount {
        let state = self.state.lock();
        if state.loading {
            RowCount::AtLeast(state.rows.len())
        } else {
            RowCount::Exact(state.rows.len())
        }
    }

    fn col_count(&self) -> usize {
        self.state.lock().cols
    }

    fn more_rows(&self, row: usize) -> bool {
        let mut state = self.state.lock();
        loop {
            if row < state.rows.len() {
                return true;
            }
            if !state.loading {
                return false;
            }
            let _ = self.loaded.wait_for(&mut state, self.wait_interval);
        }
    }

    fn header_row_count(&self) -> usize {
        self.state.lock().header_rows
    }

    fn header_col_count(&self) -> usize {
        self.state.lock().header_cols
    }

    fn trailer_row_count(&self) -> usize {
        self.state.lock().trailer_rows
    }

    fn trailer_col_count(&self) -> usize {
        self.state.lock().trailer_cols
    }

    fn object(&self, row: usize, col: usize) -> ColumnValue {
        self.state
            .lock()
            .rows
            .get(row)
            .and_then(|r| r.get(col))
            .cloned()
            .unwrap_or_default()
    }

    fn set_object(&self, row: usize, col: usize, value: ColumnValue) -> Result<()> {
        let mut state = self.state.lock();
        let (rows, cols) = (state.rows.len(), state.cols);
        if col >= cols {
            return Err(LensError::ColumnOutOfRange { col, cols });
        }
        let cells = state
            .rows
            .get_mut(row)
            .ok_or(LensError::RowOutOfRange { row, rows })?;
        cells[col] = value;
        Ok(())
    }

    fn col_type(&self, col: usize) -> ColumnType {
        let declared = self.state.lock().col_types.get(col).copied().flatten();
        match declared {
            Some(ty) => ty,
            None => infer_col_type(self, col),
        }
    }

    fn column_identifier(&self, col: usize) -> Option<String> {
        self.state.lock().identifiers.get(col).cloned().flatten()
    }

    fn kind(&self) -> &'static str {
        "MaterializedTable"
    }

    fn alignment(&self, row: usize, col: usize) -> Alignment {
        let set = self.state.lock().styles.alignment.get(row, col).copied();
        set.unwrap_or_else(|| default_alignment(self, col))
    }

    fn font(&self, row: usize, col: usize) -> Option<Font> {
        self.state.lock().styles.font.get(row, col).cloned().flatten()
    }

    fn foreground(&self, row: usize, col: usize) -> Option<Color> {
        self.state.lock().styles.foreground.get(row, col).copied().flatten()
    }

    fn background(&self, row: usize, col: usize) -> Option<Color> {
        self.state.lock().styles.background.get(row, col).copied().flatten()
    }

    fn row_border(&self, row: usize, col: usize) -> BorderStyle {
        self.state
            .lock()
            .styles
            .row_border
            .get(row, col)
            .copied()
            .unwrap_or_default()
    }

    fn col_border(&self, row: usize, col: usize) -> BorderStyle {
        self.state
            .lock()
            .styles
            .col_border
            .get(row, col)
            .copied()
            .unwrap_or_default()
    }

    fn row_border_color(&self, row: usize, col: usize) -> Option<Color> {
        self.state.lock().styles.row_border_color.get(row, col).copied().flatten()
    }

    fn col_border_color(&self, row: usize, col: usize) -> Option<Color> {
        self.state.lock().styles.col_border_color.get(row, col).copied().flatten()
    }

    fn line_wrap(&self, row: usize, col: usize) -> bool {
        self.state
            .lock()
            .styles
            .line_wrap
            .get(row, col)
            .copied()
            .unwrap_or(true)
    }

    fn insets(&self, row: usize, col: usize) -> Option<Insets> {
        self.state.lock().styles.insets.get(row, col).copied().flatten()
    }

    fn span(&self, row: usize, col: usize) -> Option<Span> {
        self.state.lock().spans.get(&(row, col)).copied()
    }

    fn row_height(&self, row: usize) -> Option<u32> {
        self.state.lock().row_heights.get(&row).copied()
    }

    fn col_width(&self, col: usize) -> Option<u32> {
        self.state.lock().col_widths.get(&col).copied()
    }

    /// Stops a load in progress: the rows appended so far become final.
    fn cancel(&self) {
        let mut state = self.state.lock();
        if state.loading {
            state.loading = false;
            state.cancelled = true;
            drop(state);
            log::debug!("cancelled table load");
            self.loaded.notify_all();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    fn dispose(&self) {
        self.cancel();
        self.listeners.clear();
    }

    fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }
}

impl fmt::Debug for MaterializedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MaterializedTable")
            .field("rows", &state.rows.len())
            .field("cols", &state.cols)
            .field("header_rows", &state.header_rows)
            .field("loading", &state.loading)
            .finish()
    }
}

/// Split CSV text into records, honouring quoted fields with embedded commas,
/// doubled quotes and newlines.
fn parse_csv_rows(csv: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut current_row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = csv.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => current_row.push(std::mem::take(&mut field)),
            '\n' if !in_quotes => {
                current_row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut current_row));
            }
            '\r' if !in_quotes => {}
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !current_row.is_empty() {
        current_row.push(field);
        rows.push(current_row);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::thread;

    fn grid(rows: usize, cols: usize) -> MaterializedTable {
        let data = (0..rows)
            .map(|r| (0..cols).map(|c| ColumnValue::Int32((r * 10 + c) as i32)).collect())
            .collect();
        MaterializedTable::from_rows(data)
    }

    #[test]
    fn test_from_rows_pads_short_rows() {
        let table = MaterializedTable::from_rows(vec![
            vec!["a".into(), "b".into()],
            vec![1.into()],
        ]);
        assert_eq!(table.col_count(), 2);
        assert_eq!(table.object(1, 1), ColumnValue::Null);
        assert_eq!(table.row_count(), RowCount::Exact(2));
    }

    #[test]
    fn test_from_csv_infers_types() {
        let csv = "id,name,score\n1,Alice,95.5\n2,\"Bob, Jr.\",87\n";
        let table = MaterializedTable::from_csv(csv).unwrap();
        assert_eq!(table.row_count(), RowCount::Exact(3));
        assert_eq!(table.object(2, 1), ColumnValue::from("Bob, Jr."));
        assert_eq!(table.col_type(0), ColumnType::Int32);
        assert_eq!(table.col_type(1), ColumnType::String);
        assert_eq!(table.col_type(2), ColumnType::Float64);
        assert_eq!(table.alignment(1, 2), Alignment::RIGHT);
    }

    #[test]
    fn test_from_csv_rejects_empty() {
        assert!(MaterializedTable::from_csv("").is_err());
        assert!(MaterializedTable::from_csv("a,b\n1\n").is_err());
    }

    #[test]
    fn test_set_object_bounds() {
        let table = grid(3, 2);
        table.set_object(1, 1, "x".into()).unwrap();
        assert_eq!(table.object(1, 1), ColumnValue::from("x"));
        assert!(matches!(
            table.set_object(5, 0, 1.into()),
            Err(LensError::RowOutOfRange { row: 5, rows: 3 })
        ));
        assert!(table.set_object(0, 2, 1.into()).is_err());
    }

    #[test]
    fn test_insert_rows_inside_span_extends_it() {
        let table = grid(6, 3);
        table.set_span(1, 0, Some(Span::new(2, 2)));
        table.insert_rows(2, 3).unwrap();
        assert_eq!(table.span(1, 0), Some(Span::new(2, 5)));
        assert_eq!(table.row_count(), RowCount::Exact(9));
        assert_eq!(table.object(2, 0), ColumnValue::Null);
        assert_eq!(table.object(5, 0), ColumnValue::Int32(20));
    }

    #[test]
    fn test_insert_rows_above_span_moves_it() {
        let table = grid(6, 3);
        table.set_span(3, 1, Some(Span::new(1, 2)));
        table.insert_rows(1, 2).unwrap();
        assert_eq!(table.span(3, 1), None);
        assert_eq!(table.span(5, 1), Some(Span::new(1, 2)));
    }

    #[test]
    fn test_remove_rows_shrinks_and_clears_spans() {
        let table = grid(8, 3);
        table.set_span(1, 0, Some(Span::new(1, 4)));
        table.set_span(5, 1, Some(Span::new(1, 2)));
        table.remove_rows(2, 2).unwrap();
        assert_eq!(table.span(1, 0), Some(Span::new(1, 2)));
        // second span moved up
        assert_eq!(table.span(3, 1), Some(Span::new(1, 2)));

        table.remove_rows(2, 1).unwrap();
        // 1x1 spans are cleared
        assert_eq!(table.span(1, 0), None);
        assert_eq!(table.spans().len(), 1);
    }

    #[test]
    fn test_remove_rows_covering_span_anchor() {
        let table = grid(8, 3);
        table.set_span(2, 2, Some(Span::new(1, 4)));
        table.remove_rows(1, 2).unwrap();
        assert_eq!(table.span(1, 2), Some(Span::new(1, 3)));
    }

    #[test]
    fn test_header_and_trailer_rows_adjust() {
        let table = grid(6, 2);
        table.set_header_row_count(2);
        table.set_trailer_row_count(1);

        table.insert_rows(1, 2).unwrap();
        assert_eq!(table.header_row_count(), 4);
        table.insert_rows(5, 1).unwrap();
        assert_eq!(table.header_row_count(), 4);
        assert_eq!(table.trailer_row_count(), 1);

        table.remove_rows(0, 3).unwrap();
        assert_eq!(table.header_row_count(), 1);
        let rows = table.row_count().loaded();
        table.remove_rows(rows - 1, 1).unwrap();
        assert_eq!(table.trailer_row_count(), 0);
    }

    #[test]
    fn test_column_edits_shift_metadata() {
        let table = grid(3, 4);
        table.set_header_col_count(1);
        table.set_col_width(2, Some(80));
        table.set_col_type(3, Some(ColumnType::Float64)).unwrap();
        table.set_column_identifier(3, Some("amount".into())).unwrap();
        table.update_styles(|s| s.background.set_col(2, Some(Some(Color::BLACK))));
        table.set_span(0, 1, Some(Span::new(2, 1)));

        table.insert_cols(0, 1).unwrap();
        assert_eq!(table.col_count(), 5);
        assert_eq!(table.header_col_count(), 2);
        assert_eq!(table.col_width(3), Some(80));
        assert_eq!(table.col_type(4), ColumnType::Float64);
        assert_eq!(table.column_identifier(4).as_deref(), Some("amount"));
        assert_eq!(table.background(1, 3), Some(Color::BLACK));
        assert_eq!(table.span(0, 2), Some(Span::new(2, 1)));

        table.remove_cols(3, 1).unwrap();
        assert_eq!(table.col_width(3), None);
        assert_eq!(table.background(1, 3), None);
        assert_eq!(table.span(0, 2), None);
        assert_eq!(table.column_identifier(3).as_deref(), Some("amount"));
        assert_eq!(table.object(1, 3), ColumnValue::Int32(13));
    }

    #[test]
    fn test_calc_attrs_follow_edits() {
        let table = grid(5, 3);
        table.update_calc_attr(3, 1, |a| a.cell_name = Some("total".into()));
        table.update_calc_attr(1, 1, |a| a.bound = true);
        table.remove_rows(1, 1).unwrap();
        assert_eq!(table.find_cell("total"), Some((2, 1)));
        assert!(table.calc_attr(1, 1).is_none());
        table.insert_cols(0, 2).unwrap();
        assert_eq!(table.find_cell("total"), Some((2, 3)));
    }

    #[test]
    fn test_styles_fall_back_to_defaults() {
        let table = grid(3, 2);
        assert_eq!(table.row_border(1, 1), BorderStyle::Thin);
        assert!(table.line_wrap(1, 1));
        table.update_styles(|s| {
            s.line_wrap.set_table(Some(false));
            s.font.set_row(1, Some(Some(Font::new("Serif", 10.0))));
        });
        assert!(!table.line_wrap(0, 0));
        assert_eq!(table.font(1, 0).map(|f| f.name), Some("Serif".to_string()));
        assert_eq!(table.font(2, 0), None);
    }

    #[test]
    fn test_streaming_load() {
        let table = Arc::new(MaterializedTable::streaming(vec!["n".into()]));
        assert_eq!(table.row_count(), RowCount::AtLeast(1));
        let producer = {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for i in 0..50 {
                    table.append_row(vec![i.into()]).unwrap();
                }
                table.finish_loading();
            })
        };
        assert!(table.more_rows(50));
        assert!(!table.more_rows(51));
        producer.join().unwrap();
        assert_eq!(table.row_count(), RowCount::Exact(51));
    }

    #[test]
    fn test_cancel_stops_load() {
        let table = MaterializedTable::streaming(vec!["n".into()]);
        table.append_row(vec![1.into()]).unwrap();
        table.cancel();
        assert!(table.is_cancelled());
        assert!(!table.more_rows(2));
        assert_eq!(table.row_count(), RowCount::Exact(2));
        assert!(matches!(table.append_row(vec![2.into()]), Err(LensError::Cancelled)));
    }

    #[test]
    fn test_structural_edit_notifies() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let table = grid(3, 2);
        let hits = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&hits);
        table.add_change_listener(Arc::new(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        }));
        table.insert_rows(1, 1).unwrap();
        table.remove_cols(0, 1).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
