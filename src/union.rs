//! Set operations over the rows of several tables.
//!
//! Output rows are addressed by [`RowLocator`]s into the inputs. Header rows
//! come from the first table; later tables contribute body rows only. Only the
//! columns every input has are exposed.
//!
//! A plain (non-distinct) union needs no locator list at all: rows are
//! concatenated arithmetically, table by table, and a later table becomes
//! addressable once every table before it has a final row count. Distinct
//! unions, intersections and differences build the locator list on the
//! worker pool, comparing rows by their shared columns.

use crate::column::{ColumnType, ColumnValue};
use crate::config::LensEnv;
use crate::error::{LensError, Result};
use crate::event::{BaseChangeHandler, BaseSubscription, ListenerRegistry};
use crate::lens::{present_header_rows, RowCount, SharedLens, TableLens};
use crate::pool::WorkerPool;
use crate::stream::{Phase, RowStream, Ticket};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetOperation {
    /// Rows of every table, optionally with duplicates removed.
    Union { distinct: bool },
    /// Distinct rows of the first table present in every other table.
    Intersect,
    /// Distinct rows of the first table present in no other table.
    Minus,
}

/// One output row: row `row` of input table `table`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowLocator {
    pub table: usize,
    pub row: usize,
}

struct SetInner {
    tables: Vec<SharedLens>,
    operation: SetOperation,
    cols: usize,
    stream: RowStream<RowLocator>,
    listeners: ListenerRegistry,
}

impl SetInner {
    fn concatenates(&self) -> bool {
        self.operation == SetOperation::Union { distinct: false }
    }

    /// Rows skipped at the top of input `index`.
    fn skipped(&self, index: usize) -> usize {
        if index == 0 {
            0
        } else {
            self.tables[index].header_row_count()
        }
    }

    /// Rows of input `index` taken by concatenation once its count is
    /// `loaded`: everything but skipped headers and trailer rows.
    fn taken(&self, index: usize, loaded: usize) -> usize {
        loaded
            .saturating_sub(self.skipped(index))
            .saturating_sub(self.tables[index].trailer_row_count())
    }

    fn key(&self, locator: RowLocator) -> Vec<ColumnValue> {
        let table = &self.tables[locator.table];
        (0..self.cols).map(|c| table.object(locator.row, c)).collect()
    }

    // ------------------------------------------------------------------
    // Concatenation
    // ------------------------------------------------------------------

    fn concat_count(&self) -> RowCount {
        let mut total = 0;
        for (i, table) in self.tables.iter().enumerate() {
            let count = table.row_count();
            total += self.taken(i, count.loaded());
            if !count.is_final() {
                return RowCount::AtLeast(total);
            }
        }
        RowCount::Exact(total)
    }

    fn concat_locate(&self, mut row: usize) -> Option<RowLocator> {
        for (i, table) in self.tables.iter().enumerate() {
            let skip = self.skipped(i);
            let count = table.row_count();
            let rows = self.taken(i, count.loaded());
            if row < rows {
                return Some(RowLocator {
                    table: i,
                    row: skip + row,
                });
            }
            if !count.is_final() {
                return None;
            }
            row -= rows;
        }
        None
    }

    fn concat_more_rows(&self, mut row: usize) -> bool {
        for (i, table) in self.tables.iter().enumerate() {
            let skip = self.skipped(i);
            if table.more_rows(skip + row + table.trailer_row_count()) {
                return true;
            }
            row -= self.taken(i, table.row_count().loaded()).min(row);
        }
        false
    }

    // ------------------------------------------------------------------
    // Locator list
    // ------------------------------------------------------------------

    fn start(self: &Arc<Self>) {
        if let Some(ticket) = self.stream.begin() {
            let inner = Arc::clone(self);
            WorkerPool::global().execute(move || inner.run(ticket));
        }
    }

    fn run(&self, ticket: Ticket) {
        log::debug!("merging {} tables with {:?}", self.tables.len(), self.operation);
        let headers = present_header_rows(self.tables[0].as_ref());
        let header_rows = (0..headers).map(|row| RowLocator { table: 0, row });
        if !self.stream.extend(ticket, header_rows) {
            return;
        }
        let finished = match self.operation {
            SetOperation::Union { .. } => self.run_union(ticket),
            SetOperation::Intersect => self.run_filtered(ticket, true),
            SetOperation::Minus => self.run_filtered(ticket, false),
        };
        if finished {
            self.stream.complete(ticket);
        }
    }

    /// Visit body rows of input `index` as they arrive.
    fn scan(&self, ticket: Ticket, index: usize, mut visit: impl FnMut(RowLocator) -> bool) -> bool {
        let table = &self.tables[index];
        let mut row = table.header_row_count();
        while table.more_rows(row + table.trailer_row_count()) {
            if !self.stream.is_live(ticket) || !visit(RowLocator { table: index, row }) {
                return false;
            }
            row += 1;
        }
        true
    }

    fn run_union(&self, ticket: Ticket) -> bool {
        let mut seen: HashSet<Vec<ColumnValue>> = HashSet::new();
        for index in 0..self.tables.len() {
            let finished = self.scan(ticket, index, |locator| {
                if seen.insert(self.key(locator)) {
                    self.stream.push(ticket, locator)
                } else {
                    true
                }
            });
            if !finished {
                return false;
            }
        }
        true
    }

    /// Distinct rows of the first table whose key is present in every other
    /// table (`keep_present`) or in none of them.
    fn run_filtered(&self, ticket: Ticket, keep_present: bool) -> bool {
        let mut others: Vec<HashSet<Vec<ColumnValue>>> = Vec::with_capacity(self.tables.len() - 1);
        for index in 1..self.tables.len() {
            let mut keys = HashSet::new();
            let finished = self.scan(ticket, index, |locator| {
                keys.insert(self.key(locator));
                true
            });
            if !finished {
                return false;
            }
            others.push(keys);
        }

        let mut seen: HashSet<Vec<ColumnValue>> = HashSet::new();
        self.scan(ticket, 0, |locator| {
            let key = self.key(locator);
            let keep = if keep_present {
                others.iter().all(|keys| keys.contains(&key))
            } else {
                !others.iter().any(|keys| keys.contains(&key))
            };
            if keep && seen.insert(key) {
                self.stream.push(ticket, locator)
            } else {
                true
            }
        })
    }

    fn locate(&self, row: usize) -> Option<RowLocator> {
        if self.concatenates() {
            return self.concat_locate(row);
        }
        self.stream.get(row)
    }

    fn reset(&self) {
        self.stream.reset();
    }
}

impl BaseChangeHandler for SetInner {
    fn base_changed(&self) {
        self.reset();
        self.listeners.fire();
    }
}

/// Rows of two or more tables combined under a [`SetOperation`].
pub struct SetTableLens {
    inner: Arc<SetInner>,
    subscriptions: Mutex<Vec<BaseSubscription>>,
}

/// The union flavour of [`SetTableLens`].
pub type UnionTableLens = SetTableLens;

impl SetTableLens {
    pub fn new(tables: Vec<SharedLens>, operation: SetOperation) -> Result<Self> {
        Self::with_env(tables, operation, LensEnv::shared())
    }

    pub fn with_env(tables: Vec<SharedLens>, operation: SetOperation, env: Arc<LensEnv>) -> Result<Self> {
        if tables.len() < 2 {
            return Err(LensError::Precondition(format!(
                "a set operation needs at least two tables, got {}",
                tables.len()
            )));
        }
        let cols = tables.iter().map(|t| t.col_count()).min().unwrap_or(0);
        let inner = Arc::new(SetInner {
            tables: tables.clone(),
            operation,
            cols,
            stream: RowStream::new(env.config().wait_interval()),
            listeners: ListenerRegistry::new(),
        });
        let subscriptions = tables
            .into_iter()
            .map(|table| BaseSubscription::forward(table, Arc::downgrade(&inner)))
            .collect();
        Ok(SetTableLens {
            inner,
            subscriptions: Mutex::new(subscriptions),
        })
    }

    pub fn union(tables: Vec<SharedLens>, distinct: bool) -> Result<Self> {
        Self::new(tables, SetOperation::Union { distinct })
    }

    pub fn intersect(tables: Vec<SharedLens>) -> Result<Self> {
        Self::new(tables, SetOperation::Intersect)
    }

    pub fn minus(tables: Vec<SharedLens>) -> Result<Self> {
        Self::new(tables, SetOperation::Minus)
    }

    pub fn operation(&self) -> SetOperation {
        self.inner.operation
    }

    pub fn tables(&self) -> &[SharedLens] {
        &self.inner.tables
    }

    /// The input row shown at `row`. Blocks until it is produced.
    pub fn locate(&self, row: usize) -> Option<RowLocator> {
        if self.more_rows(row) {
            self.inner.locate(row)
        } else {
            None
        }
    }
}

impl TableLens for SetTableLens {
    fn row_count(&self) -> RowCount {
        if self.inner.concatenates() {
            return self.inner.concat_count();
        }
        self.inner.start();
        self.inner.stream.row_count()
    }

    fn col_count(&self) -> usize {
        self.inner.cols
    }

    fn more_rows(&self, row: usize) -> bool {
        if self.inner.concatenates() {
            return self.inner.concat_more_rows(row);
        }
        self.inner.stream.wait_for(row, || self.inner.start())
    }

    fn header_row_count(&self) -> usize {
        self.inner.tables[0].header_row_count()
    }

    fn header_col_count(&self) -> usize {
        self.inner.tables[0].header_col_count()
    }

    fn object(&self, row: usize, col: usize) -> ColumnValue {
        match self.cell_source(row, col) {
            Some((table, r, c)) => table.object(r, c),
            None => ColumnValue::Null,
        }
    }

    /// The common type of the column across inputs. Identical types are kept,
    /// numeric types widen, and anything else reads as `Float64`.
    fn col_type(&self, col: usize) -> ColumnType {
        let mut common: Option<ColumnType> = None;
        for table in &self.inner.tables {
            let ty = table.col_type(col);
            if ty == ColumnType::Object {
                continue;
            }
            common = Some(match common {
                None => ty,
                Some(prev) if prev == ty => prev,
                Some(prev) => prev.widen(ty).unwrap_or(ColumnType::Float64),
            });
        }
        common.unwrap_or(ColumnType::Object)
    }

    fn column_identifier(&self, col: usize) -> Option<String> {
        self.inner.tables[0].column_identifier(col)
    }

    fn kind(&self) -> &'static str {
        "SetTableLens"
    }

    fn cell_source(&self, row: usize, col: usize) -> Option<(SharedLens, usize, usize)> {
        if col >= self.inner.cols {
            return None;
        }
        let locator = self.locate(row)?;
        Some((Arc::clone(&self.inner.tables[locator.table]), locator.row, col))
    }

    fn col_source(&self, col: usize) -> Option<(SharedLens, usize)> {
        (col < self.inner.cols).then(|| (Arc::clone(&self.inner.tables[0]), col))
    }

    fn invalidate(&self) {
        self.inner.base_changed();
    }

    fn cancel(&self) {
        if !self.inner.concatenates() {
            if self.inner.stream.phase() == Phase::Completed {
                return;
            }
            self.inner.stream.cancel();
        }
        for table in &self.inner.tables {
            table.cancel();
        }
    }

    fn is_cancelled(&self) -> bool {
        if self.inner.concatenates() {
            self.inner.tables.iter().any(|t| t.is_cancelled())
        } else {
            self.inner.stream.is_cancelled()
        }
    }

    fn dispose(&self) {
        let released = std::mem::take(&mut *self.subscriptions.lock());
        if released.is_empty() {
            return;
        }
        drop(released);
        self.inner.stream.cancel();
        for table in &self.inner.tables {
            table.dispose();
        }
    }

    fn listeners(&self) -> &ListenerRegistry {
        &self.inner.listeners
    }
}
