//! Duplicate row suppression over a set of key columns.
//!
//! Two algorithms produce the same set of rows:
//!
//! * **Hash**: one streaming pass remembering the key tuples seen so far.
//!   Output keeps the base row order. Used for a single key column or when a
//!   stable order is requested.
//! * **Sort**: order body rows by the key columns and keep the first row of
//!   every run. Output is in key order. When the base already advertises a
//!   compatible sort order the rows are scanned in place.
//!
//! Both keep the earliest base row of each duplicate group.

use crate::column::ColumnValue;
use crate::config::LensEnv;
use crate::event::{BaseChangeHandler, BaseSubscription, ListenerRegistry};
use crate::lens::{body_bounds, present_header_rows, scan_body_rows, RowCount, SharedLens, TableFilter, TableLens};
use crate::pool::WorkerPool;
use crate::sort::{compare_rows, SortKey};
use crate::stream::{Phase, RowStream, Ticket};
use crate::warning::row_limit_message;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistinctAlgorithm {
    Hash,
    Sort,
}

/// Where validation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// On the shared worker pool.
    #[default]
    Background,
    /// On the thread that first needs rows. For callers that already hold a
    /// single-threaded script lock the background job might need.
    Inline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distinct {
    pub cols: Vec<usize>,
    /// Keep the base row order.
    pub stable: bool,
    /// Force one algorithm instead of choosing from `cols` and `stable`.
    pub algorithm: Option<DistinctAlgorithm>,
    pub mode: ExecutionMode,
}

impl Distinct {
    pub fn on(cols: Vec<usize>) -> Self {
        Distinct {
            cols,
            stable: false,
            algorithm: None,
            mode: ExecutionMode::Background,
        }
    }

    pub fn stable(mut self, stable: bool) -> Self {
        self.stable = stable;
        self
    }

    pub fn algorithm(mut self, algorithm: DistinctAlgorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn chosen_algorithm(&self) -> DistinctAlgorithm {
        match self.algorithm {
            Some(algorithm) => algorithm,
            None if self.cols.len() <= 1 || self.stable => DistinctAlgorithm::Hash,
            None => DistinctAlgorithm::Sort,
        }
    }
}

struct DistinctInner {
    base: SharedLens,
    distinct: Distinct,
    env: Arc<LensEnv>,
    stream: RowStream<usize>,
    listeners: ListenerRegistry,
}

impl DistinctInner {
    fn start(self: &Arc<Self>) {
        let Some(ticket) = self.stream.begin() else {
            return;
        };
        match self.distinct.mode {
            ExecutionMode::Inline => self.run(ticket),
            ExecutionMode::Background => {
                let inner = Arc::clone(self);
                WorkerPool::global().execute(move || inner.run(ticket));
            }
        }
    }

    fn run(&self, ticket: Ticket) {
        let algorithm = self.distinct.chosen_algorithm();
        log::debug!("distinct on columns {:?} using {:?}", self.distinct.cols, algorithm);
        let headers = present_header_rows(self.base.as_ref());
        if !self.stream.extend(ticket, 0..headers) {
            return;
        }
        let finished = match algorithm {
            DistinctAlgorithm::Hash => self.run_hash(ticket),
            DistinctAlgorithm::Sort => self.run_sort(ticket),
        };
        if finished {
            self.stream.complete(ticket);
        }
    }

    fn key(&self, row: usize) -> Vec<ColumnValue> {
        self.distinct
            .cols
            .iter()
            .map(|&c| self.base.object(row, c))
            .collect()
    }

    /// Publish one body row. False once the run must stop.
    fn emit(&self, ticket: Ticket, row: usize, emitted: &mut usize) -> bool {
        if let Some(limit) = self.env.config().max_distinct_rows {
            if *emitted >= limit {
                self.env.warnings().warn(row_limit_message("Distinct", limit));
                self.stream.complete(ticket);
                return false;
            }
        }
        *emitted += 1;
        self.stream.push(ticket, row)
    }

    fn run_hash(&self, ticket: Ticket) -> bool {
        let mut seen: HashSet<Vec<ColumnValue>> = HashSet::new();
        let mut emitted = 0;
        scan_body_rows(self.base.as_ref(), |row| {
            if !self.stream.is_live(ticket) {
                return false;
            }
            if seen.insert(self.key(row)) {
                self.emit(ticket, row, &mut emitted)
            } else {
                true
            }
        })
    }

    fn run_sort(&self, ticket: Ticket) -> bool {
        let body = body_bounds(self.base.as_ref());
        if !self.stream.is_live(ticket) {
            return false;
        }
        let keys: Vec<SortKey> = self.distinct.cols.iter().map(|&c| SortKey::ascending(c)).collect();
        let mut rows: Vec<usize> = body.collect();
        if self.base_is_grouped() {
            log::debug!("distinct reuses base sort order");
        } else {
            rows.sort_by(|&a, &b| compare_rows(self.base.as_ref(), a, b, &keys));
        }

        let mut emitted = 0;
        let mut previous: Option<Vec<ColumnValue>> = None;
        for row in rows {
            if !self.stream.is_live(ticket) {
                return false;
            }
            let key = self.key(row);
            if previous.as_ref() == Some(&key) {
                continue;
            }
            if !self.emit(ticket, row, &mut emitted) {
                return false;
            }
            previous = Some(key);
        }
        true
    }

    /// True if the base rows are sorted with the key columns leading, so
    /// equal keys are already adjacent.
    fn base_is_grouped(&self) -> bool {
        let Some(keys) = self.base.sort_keys() else {
            return false;
        };
        let wanted: BTreeSet<usize> = self.distinct.cols.iter().copied().collect();
        if keys.len() < wanted.len() {
            return false;
        }
        let leading: BTreeSet<usize> = keys.iter().take(wanted.len()).map(|k| k.col).collect();
        leading == wanted
    }
}

impl BaseChangeHandler for DistinctInner {
    fn base_changed(&self) {
        self.stream.reset();
        self.listeners.fire();
    }
}

/// Body rows of the base with duplicate key tuples removed.
pub struct DistinctTableLens {
    inner: Arc<DistinctInner>,
    subscription: Mutex<Option<BaseSubscription>>,
}

impl DistinctTableLens {
    pub fn new(base: SharedLens, distinct: Distinct) -> Self {
        Self::with_env(base, distinct, LensEnv::shared())
    }

    pub fn with_env(base: SharedLens, distinct: Distinct, env: Arc<LensEnv>) -> Self {
        let inner = Arc::new(DistinctInner {
            base: Arc::clone(&base),
            distinct,
            stream: RowStream::new(env.config().wait_interval()),
            env,
            listeners: ListenerRegistry::new(),
        });
        let subscription = BaseSubscription::forward(base, Arc::downgrade(&inner));
        DistinctTableLens {
            inner,
            subscription: Mutex::new(Some(subscription)),
        }
    }

    pub fn distinct(&self) -> &Distinct {
        &self.inner.distinct
    }

    /// Block until every distinct row is known.
    pub fn wait_until_complete(&self) {
        self.inner.stream.wait_until_done(|| self.inner.start());
    }
}

impl TableFilter for DistinctTableLens {
    fn base_table(&self) -> SharedLens {
        Arc::clone(&self.inner.base)
    }

    fn base_row_index(&self, row: usize) -> Option<usize> {
        if self.more_rows(row) {
            self.inner.stream.get(row)
        } else {
            None
        }
    }

    fn base_col_index(&self, col: usize) -> Option<usize> {
        Some(col)
    }
}

impl TableLens for DistinctTableLens {
    fn row_count(&self) -> RowCount {
        self.inner.start();
        self.inner.stream.row_count()
    }

    fn col_count(&self) -> usize {
        self.inner.base.col_count()
    }

    fn more_rows(&self, row: usize) -> bool {
        self.inner.stream.wait_for(row, || self.inner.start())
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
        "DistinctTableLens"
    }

    fn cell_source(&self, row: usize, col: usize) -> Option<(SharedLens, usize, usize)> {
        self.base_row_index(row)
            .map(|r| (Arc::clone(&self.inner.base), r, col))
    }

    fn col_source(&self, col: usize) -> Option<(SharedLens, usize)> {
        Some((Arc::clone(&self.inner.base), col))
    }

    fn sort_keys(&self) -> Option<Vec<SortKey>> {
        match self.inner.distinct.chosen_algorithm() {
            DistinctAlgorithm::Sort => Some(
                self.inner
                    .distinct
                    .cols
                    .iter()
                    .map(|&c| SortKey::ascending(c))
                    .collect(),
            ),
            DistinctAlgorithm::Hash => self.inner.base.sort_keys(),
        }
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
    use crate::config::LensConfig;
    use crate::lens::snapshot;
    use crate::materialized::MaterializedTable;
    use crate::sort::SortFilter;
    use pretty_assertions::assert_eq;

    fn orders() -> Arc<MaterializedTable> {
        Arc::new(MaterializedTable::from_rows(vec![
            vec!["region".into(), "product".into(), "qty".into()],
            vec!["West".into(), "pen".into(), 1.into()],
            vec!["East".into(), "ink".into(), 2.into()],
            vec!["West".into(), "pen".into(), 3.into()],
            vec!["East".into(), "pen".into(), 4.into()],
            vec!["East".into(), "ink".into(), 5.into()],
        ]))
    }

    fn body(table: &dyn TableLens, col: usize) -> Vec<ColumnValue> {
        snapshot(table).into_iter().skip(1).map(|r| r[col].clone()).collect()
    }

    #[test]
    fn test_hash_keeps_first_rows_in_base_order() {
        let distinct = DistinctTableLens::new(orders(), Distinct::on(vec![0, 1]).stable(true));
        assert_eq!(distinct.distinct().chosen_algorithm(), DistinctAlgorithm::Hash);
        assert_eq!(body(&distinct, 2), vec![1.into(), 2.into(), 4.into()]);
        assert_eq!(distinct.object(0, 0), ColumnValue::from("region"));
    }

    #[test]
    fn test_sort_path_orders_by_key() {
        let distinct = DistinctTableLens::new(orders(), Distinct::on(vec![0, 1]));
        assert_eq!(distinct.distinct().chosen_algorithm(), DistinctAlgorithm::Sort);
        assert_eq!(body(&distinct, 2), vec![2.into(), 4.into(), 1.into()]);
        assert_eq!(distinct.row_count(), RowCount::Exact(4));
    }

    #[test]
    fn test_single_column_uses_hash() {
        let distinct = DistinctTableLens::new(orders(), Distinct::on(vec![0]));
        assert_eq!(body(&distinct, 0), vec!["West".into(), "East".into()]);
    }

    #[test]
    fn test_reuses_sorted_base() {
        let sorted: SharedLens = Arc::new(SortFilter::new(
            orders(),
            vec![SortKey::ascending(1), SortKey::ascending(0)],
        ));
        let distinct = DistinctTableLens::new(sorted, Distinct::on(vec![0, 1]));
        assert!(distinct.inner.base_is_grouped());
        assert_eq!(body(&distinct, 2), vec![2.into(), 4.into(), 1.into()]);
    }

    #[test]
    fn test_row_cap_truncates_with_one_warning() {
        let config = LensConfig {
            max_distinct_rows: Some(1),
            ..LensConfig::default()
        };
        let env = LensEnv::new(config);
        let distinct = DistinctTableLens::with_env(
            orders(),
            Distinct::on(vec![0]).mode(ExecutionMode::Inline),
            Arc::clone(&env),
        );
        assert!(distinct.more_rows(1));
        assert!(!distinct.more_rows(2));
        assert_eq!(distinct.row_count(), RowCount::Exact(2));
        distinct.invalidate();
        assert!(!distinct.more_rows(2));
        assert_eq!(env.warnings().messages().len(), 1);
    }

    #[test]
    fn test_streaming_base_is_deduplicated_incrementally() {
        let base = Arc::new(MaterializedTable::streaming(vec!["k".into()]));
        let distinct = DistinctTableLens::new(base.clone(), Distinct::on(vec![0]));
        base.append_row(vec![1.into()]).unwrap();
        base.append_row(vec![1.into()]).unwrap();
        base.append_row(vec![2.into()]).unwrap();
        assert!(distinct.more_rows(2));
        assert_eq!(distinct.row_count(), RowCount::AtLeast(3));
        base.finish_loading();
        distinct.wait_until_complete();
        assert_eq!(distinct.row_count(), RowCount::Exact(3));
    }

    #[test]
    fn test_cancel_stops_background_run() {
        let base = Arc::new(MaterializedTable::streaming(vec!["k".into()]));
        let distinct = DistinctTableLens::new(base.clone(), Distinct::on(vec![0]));
        distinct.row_count();
        distinct.cancel();
        assert!(distinct.is_cancelled());
        assert!(base.is_cancelled());
        assert!(!distinct.more_rows(1));
    }
}
