//! Computed columns appended to the right of a base table.
//!
//! Each appended column has a header name and an expression. Expressions see
//! every base column and every appended column by name or `$n` position.
//! Within one row the appended columns are evaluated left to right, so an
//! expression can read the columns computed before it; a column computed after
//! it reads as null.
//!
//! Computed rows are produced on the worker pool a batch at a time, a little
//! ahead of the furthest row anyone has asked for. A failing cell does not
//! stop its row: the remaining columns are still evaluated and the failure is
//! reported when that cell is read.

use crate::column::{ColumnType, ColumnValue};
use crate::config::LensEnv;
use crate::error::{LensError, Result, ScriptError};
use crate::event::{BaseChangeHandler, BaseSubscription, ListenerRegistry};
use crate::expr::ExprEngine;
use crate::lens::{header_names, infer_col_type, RowCount, SharedLens, TableFilter, TableLens};
use crate::pool::WorkerPool;
use crate::script::{CompiledScript, RowScope, ScriptEngine, ScriptEnv};
use crate::sort::SortKey;
use crate::stream::{Phase, RowStream, Ticket};
use parking_lot::Mutex;
use std::sync::Arc;

/// Rows evaluated per batch, and how far the producer runs ahead of demand.
const SPECULATIVE_ROWS: usize = 64;

/// What to do with a cell whose expression fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvaluationMode {
    /// Report the failure to whoever reads the cell.
    #[default]
    Runtime,
    /// Log the failure and show null, so a preview can still render.
    Design,
}

/// Outcome of every appended column for one row. Empty for header rows.
#[derive(Debug, Default)]
struct ComputedRow {
    cells: Vec<std::result::Result<ColumnValue, LensError>>,
}

struct FormulaInner {
    base: SharedLens,
    names: Vec<String>,
    expressions: Vec<String>,
    engine: Arc<dyn ScriptEngine>,
    mode: EvaluationMode,
    stream: RowStream<Arc<ComputedRow>>,
    listeners: ListenerRegistry,
}

impl FormulaInner {
    fn start(self: &Arc<Self>) {
        if let Some(ticket) = self.stream.begin() {
            let inner = Arc::clone(self);
            WorkerPool::global().execute(move || inner.run(ticket));
        }
    }

    fn script_env(&self) -> ScriptEnv {
        let mut columns = header_names(self.base.as_ref());
        columns.extend(self.names.iter().cloned());
        ScriptEnv::new(columns)
    }

    fn run(&self, ticket: Ticket) {
        let env = self.script_env();
        let compiled: Vec<std::result::Result<Box<dyn CompiledScript>, LensError>> = self
            .expressions
            .iter()
            .enumerate()
            .map(|(i, expression)| {
                self.engine
                    .compile(expression, &env)
                    .map_err(|cause| self.failure(i, cause, &env))
            })
            .collect();
        log::debug!("evaluating {} computed columns over {}", self.names.len(), self.base.kind());

        let mut row = 0;
        loop {
            if !self.stream.wait_for_demand(ticket, SPECULATIVE_ROWS) {
                return;
            }
            let end = row + SPECULATIVE_ROWS;
            let mut batch = Vec::with_capacity(SPECULATIVE_ROWS);
            while row < end && self.base.more_rows(row) {
                batch.push(Arc::new(self.compute(row, &compiled, &env)));
                row += 1;
            }
            let exhausted = row < end;
            if !self.stream.extend(ticket, batch) {
                return;
            }
            if exhausted {
                self.stream.complete(ticket);
                log::debug!("computed columns finished after {row} rows");
                return;
            }
        }
    }

    fn compute(
        &self,
        row: usize,
        compiled: &[std::result::Result<Box<dyn CompiledScript>, LensError>],
        env: &ScriptEnv,
    ) -> ComputedRow {
        if row < self.base.header_row_count() {
            return ComputedRow::default();
        }
        let base_cols = self.base.col_count();
        let mut values: Vec<Option<ColumnValue>> = (0..base_cols)
            .map(|c| Some(self.base.object(row, c)))
            .collect();
        values.resize(base_cols + compiled.len(), None);

        let mut cells = Vec::with_capacity(compiled.len());
        for (i, script) in compiled.iter().enumerate() {
            let col = base_cols + i;
            let outcome = match script {
                Ok(script) => {
                    let scope = RowScope::new(row, col, env, &values);
                    self.engine
                        .execute(&**script, &scope)
                        .map_err(|cause| self.failure(i, cause, env))
                }
                Err(e) => Err(e.clone()),
            };
            let outcome = match (outcome, self.mode) {
                (Err(e), EvaluationMode::Design) => {
                    log::warn!("row {row}: {e}");
                    Ok(ColumnValue::Null)
                }
                (outcome, _) => outcome,
            };
            values[col] = Some(outcome.as_ref().map_or(ColumnValue::Null, Clone::clone));
            cells.push(outcome);
        }
        ComputedRow { cells }
    }

    fn failure(&self, index: usize, cause: ScriptError, env: &ScriptEnv) -> LensError {
        let suggestion = self
            .engine
            .suggest_fix(&self.expressions[index], &cause, env);
        LensError::ExpressionFailed {
            column: self.names[index].clone(),
            cause,
            suggestion,
        }
    }
}

impl BaseChangeHandler for FormulaInner {
    fn base_changed(&self) {
        log::debug!("computed columns invalidated");
        self.stream.reset();
        self.listeners.fire();
    }
}

/// A base table plus computed columns.
pub struct FormulaColumnAppender {
    inner: Arc<FormulaInner>,
    subscription: Mutex<Option<BaseSubscription>>,
}

impl FormulaColumnAppender {
    /// Append `names.len()` columns evaluated with the built-in [`ExprEngine`].
    pub fn new(base: SharedLens, names: Vec<String>, expressions: Vec<String>) -> Result<Self> {
        Self::with_engine(
            base,
            names,
            expressions,
            Arc::new(ExprEngine),
            EvaluationMode::Runtime,
            LensEnv::shared(),
        )
    }

    pub fn with_engine(
        base: SharedLens,
        names: Vec<String>,
        expressions: Vec<String>,
        engine: Arc<dyn ScriptEngine>,
        mode: EvaluationMode,
        env: Arc<LensEnv>,
    ) -> Result<Self> {
        if names.len() != expressions.len() {
            return Err(LensError::Precondition(format!(
                "{} column names for {} expressions",
                names.len(),
                expressions.len()
            )));
        }
        let inner = Arc::new(FormulaInner {
            base: Arc::clone(&base),
            names,
            expressions,
            engine,
            mode,
            stream: RowStream::new(env.config().wait_interval()),
            listeners: ListenerRegistry::new(),
        });
        let subscription = BaseSubscription::forward(base, Arc::downgrade(&inner));
        Ok(FormulaColumnAppender {
            inner,
            subscription: Mutex::new(Some(subscription)),
        })
    }

    pub fn names(&self) -> &[String] {
        &self.inner.names
    }

    pub fn expressions(&self) -> &[String] {
        &self.inner.expressions
    }

    pub fn mode(&self) -> EvaluationMode {
        self.inner.mode
    }

    /// Index of the computed column `col`, if it is one.
    fn computed_index(&self, col: usize) -> Option<usize> {
        col.checked_sub(self.inner.base.col_count())
            .filter(|&i| i < self.inner.names.len())
    }

    fn computed_row(&self, row: usize) -> Result<Option<Arc<ComputedRow>>> {
        if !self.inner.base.more_rows(row) {
            return Ok(None);
        }
        if self.inner.stream.wait_for(row, || self.inner.start()) {
            return Ok(self.inner.stream.get(row));
        }
        if self.inner.stream.is_cancelled() {
            Err(LensError::Cancelled)
        } else {
            Ok(None)
        }
    }
}

impl Drop for FormulaColumnAppender {
    fn drop(&mut self) {
        // Releases a producer parked on demand.
        self.inner.stream.cancel();
    }
}

impl TableFilter for FormulaColumnAppender {
    fn base_table(&self) -> SharedLens {
        Arc::clone(&self.inner.base)
    }

    fn base_row_index(&self, row: usize) -> Option<usize> {
        self.inner.base.more_rows(row).then_some(row)
    }

    fn base_col_index(&self, col: usize) -> Option<usize> {
        (col < self.inner.base.col_count()).then_some(col)
    }
}

impl TableLens for FormulaColumnAppender {
    fn row_count(&self) -> RowCount {
        self.inner.base.row_count()
    }

    fn col_count(&self) -> usize {
        self.inner.base.col_count() + self.inner.names.len()
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

    fn object(&self, row: usize, col: usize) -> ColumnValue {
        self.try_object(row, col).unwrap_or_default()
    }

    fn try_object(&self, row: usize, col: usize) -> Result<ColumnValue> {
        let Some(index) = self.computed_index(col) else {
            return self.inner.base.try_object(row, col);
        };
        if row < self.inner.base.header_row_count() {
            return Ok(if row == 0 {
                ColumnValue::String(self.inner.names[index].clone())
            } else {
                ColumnValue::Null
            });
        }
        match self.computed_row(row)? {
            Some(computed) => match computed.cells.get(index) {
                Some(cell) => cell.clone(),
                None => Ok(ColumnValue::Null),
            },
            None => Ok(ColumnValue::Null),
        }
    }

    fn col_type(&self, col: usize) -> ColumnType {
        match self.col_source(col) {
            Some((base, c)) => base.col_type(c),
            None => infer_col_type(self, col),
        }
    }

    fn column_identifier(&self, col: usize) -> Option<String> {
        match self.computed_index(col) {
            Some(index) => Some(self.inner.names[index].clone()),
            None => self.inner.base.column_identifier(col),
        }
    }

    fn kind(&self) -> &'static str {
        "FormulaColumnAppender"
    }

    fn cell_source(&self, row: usize, col: usize) -> Option<(SharedLens, usize, usize)> {
        (col < self.inner.base.col_count()).then(|| (Arc::clone(&self.inner.base), row, col))
    }

    fn col_source(&self, col: usize) -> Option<(SharedLens, usize)> {
        (col < self.inner.base.col_count()).then(|| (Arc::clone(&self.inner.base), col))
    }

    fn sort_keys(&self) -> Option<Vec<SortKey>> {
        self.inner.base.sort_keys()
    }

    fn invalidate(&self) {
        self.inner.base_changed();
    }

    fn cancel(&self) {
        if self.inner.stream.phase() != Phase::Completed {
            self.inner.stream.cancel();
            self.inner.base.cancel();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.inner.stream.is_cancelled()
    }

    fn dispose(&self) {
        let released = self.subscription.lock().take();
        if let Some(mut subscription) = released {
            subscription.release();
            self.inner.stream.cancel();
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
    use crate::lens::load_all_rows;
    use crate::materialized::MaterializedTable;
    use pretty_assertions::assert_eq;

    fn items() -> Arc<MaterializedTable> {
        Arc::new(MaterializedTable::from_rows(vec![
            vec!["item".into(), "price".into(), "qty".into()],
            vec!["pen".into(), 1.5.into(), 4.into()],
            vec!["ink".into(), 12.into(), 2.into()],
            vec!["pad".into(), 3.into(), 0.into()],
        ]))
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_computed_columns_see_earlier_ones() {
        let appender = FormulaColumnAppender::new(
            items(),
            strings(&["total", "size"]),
            strings(&["price * qty", "IF(total > 10, 'big', 'small')"]),
        )
        .unwrap();
        assert_eq!(appender.col_count(), 5);
        assert_eq!(appender.row_count(), RowCount::Exact(4));
        assert_eq!(appender.object(0, 3), ColumnValue::from("total"));
        assert_eq!(appender.object(1, 3), ColumnValue::Float64(6.0));
        assert_eq!(appender.object(1, 4), ColumnValue::from("small"));
        assert_eq!(appender.object(2, 3), ColumnValue::Int64(24));
        assert_eq!(appender.object(2, 4), ColumnValue::from("big"));
        assert_eq!(appender.object(2, 0), ColumnValue::from("ink"));
        assert_eq!(appender.column_identifier(4), Some("size".to_string()));
        assert_eq!(appender.base_col_index(3), None);
    }

    #[test]
    fn test_later_column_reads_as_null() {
        let appender = FormulaColumnAppender::new(
            items(),
            strings(&["early", "late"]),
            strings(&["late IS NULL", "qty"]),
        )
        .unwrap();
        assert_eq!(appender.object(1, 3), ColumnValue::Bool(true));
        assert_eq!(appender.object(1, 4), ColumnValue::Int32(4));
    }

    #[test]
    fn test_runtime_failure_surfaces_and_row_continues() {
        let appender = FormulaColumnAppender::new(
            items(),
            strings(&["unit", "label"]),
            strings(&["price / qty", "item + '!'"]),
        )
        .unwrap();
        assert_eq!(appender.object(3, 3), ColumnValue::Null);
        match appender.try_object(3, 3) {
            Err(LensError::ExpressionFailed { column, cause, suggestion }) => {
                assert_eq!(column, "unit");
                assert_eq!(cause, ScriptError::DivisionByZero);
                assert!(suggestion.is_some());
            }
            other => panic!("expected an expression failure, got {other:?}"),
        }
        assert_eq!(appender.try_object(3, 4), Ok(ColumnValue::from("pad!")));
        assert_eq!(appender.try_object(2, 3), Ok(ColumnValue::Int64(6)));
    }

    #[test]
    fn test_design_mode_substitutes_null() {
        let appender = FormulaColumnAppender::with_engine(
            items(),
            strings(&["unit"]),
            strings(&["price / qty"]),
            Arc::new(ExprEngine),
            EvaluationMode::Design,
            LensEnv::shared(),
        )
        .unwrap();
        assert_eq!(appender.try_object(3, 3), Ok(ColumnValue::Null));
        assert_eq!(appender.try_object(1, 3), Ok(ColumnValue::Float64(0.375)));
    }

    #[test]
    fn test_unknown_column_suggests_fix() {
        let appender =
            FormulaColumnAppender::new(items(), strings(&["double"]), strings(&["prise * 2"])).unwrap();
        let err = appender.try_object(1, 3).unwrap_err();
        assert_eq!(
            err.to_string(),
            "expression for column 'double' failed: unknown column 'prise' \
             (suggested fix: use column 'price' instead of 'prise')"
        );
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let result = FormulaColumnAppender::new(items(), strings(&["a", "b"]), strings(&["1"]));
        assert!(matches!(result, Err(LensError::Precondition(_))));
    }

    #[test]
    fn test_invalidate_recomputes() {
        let base = items();
        let appender =
            FormulaColumnAppender::new(base.clone(), strings(&["total"]), strings(&["price * qty"])).unwrap();
        assert_eq!(appender.object(2, 1), ColumnValue::Int32(12));
        assert_eq!(appender.object(2, 3), ColumnValue::Int64(24));
        base.set_object(2, 2, 5.into()).unwrap();
        base.invalidate();
        assert_eq!(appender.object(2, 3), ColumnValue::Int64(60));
    }

    #[test]
    fn test_streaming_base_beyond_one_batch() {
        let base = Arc::new(MaterializedTable::streaming(vec!["n".into()]));
        let appender =
            FormulaColumnAppender::new(base.clone(), strings(&["square"]), strings(&["n * n"])).unwrap();
        let producer = {
            let base = Arc::clone(&base);
            std::thread::spawn(move || {
                for n in 0..200 {
                    base.append_row(vec![ColumnValue::Int32(n)]).unwrap();
                }
                base.finish_loading();
            })
        };
        assert_eq!(appender.object(150, 1), ColumnValue::Int64(149 * 149));
        producer.join().unwrap();
        assert_eq!(load_all_rows(&appender), 201);
        assert_eq!(appender.object(200, 1), ColumnValue::Int64(199 * 199));
    }

    #[test]
    fn test_computed_cells_are_read_only() {
        let appender =
            FormulaColumnAppender::new(items(), strings(&["total"]), strings(&["price * qty"])).unwrap();
        assert!(appender.set_object(1, 3, 1.into()).is_err());
        assert!(appender.set_object(1, 2, 7.into()).is_ok());
    }
}
