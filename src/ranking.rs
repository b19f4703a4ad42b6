//! Top-N / bottom-N row selection by one column.
//!
//! Ranking needs every body row, so validation loads the base to completion
//! and sorts synchronously on the first read. The result is a row index list:
//! header rows first, then the selected body rows in rank order.

use crate::column::ColumnValue;
use crate::config::LensEnv;
use crate::event::{BaseChangeHandler, BaseSubscription, ListenerRegistry};
use crate::lens::{body_bounds, present_header_rows, RowCount, SharedLens, TableFilter, TableLens};
use crate::sort::{strip_direction, Comparer, NaturalComparer};
use crate::stream::{Phase, RowStream};
use parking_lot::Mutex;
use std::sync::Arc;

/// Which rows a [`RankingTableLens`] keeps.
#[derive(Debug, Clone)]
pub struct Ranking {
    pub col: usize,
    pub n: usize,
    /// Largest values first when true, smallest first otherwise.
    pub top: bool,
    /// Keep every row whose value is among the first `n` distinct values.
    pub equality_kept: bool,
    pub comparer: Option<Arc<dyn Comparer>>,
}

impl Ranking {
    pub fn top(col: usize, n: usize) -> Self {
        Ranking {
            col,
            n,
            top: true,
            equality_kept: false,
            comparer: None,
        }
    }

    pub fn bottom(col: usize, n: usize) -> Self {
        Ranking {
            top: false,
            ..Ranking::top(col, n)
        }
    }

    pub fn keep_ties(mut self, keep: bool) -> Self {
        self.equality_kept = keep;
        self
    }

    /// Order values with `comparer`. Any direction wrapping is discarded;
    /// [`Ranking::top`] alone decides the direction.
    pub fn with_comparer(mut self, comparer: Arc<dyn Comparer>) -> Self {
        self.comparer = Some(strip_direction(comparer));
        self
    }
}

struct RankingInner {
    base: SharedLens,
    ranking: Ranking,
    stream: RowStream<usize>,
    listeners: ListenerRegistry,
}

impl RankingInner {
    fn validate(&self) {
        let Some(ticket) = self.stream.begin() else {
            return;
        };
        log::debug!(
            "ranking {} {} rows on column {}",
            if self.ranking.top { "top" } else { "bottom" },
            self.ranking.n,
            self.ranking.col
        );
        let headers = present_header_rows(self.base.as_ref());
        let body = body_bounds(self.base.as_ref());
        if !self.stream.is_live(ticket) {
            return;
        }

        let mut ranked: Vec<(usize, ColumnValue)> = body
            .map(|r| (r, self.base.object(r, self.ranking.col)))
            .filter(|(_, v)| !v.is_null())
            .collect();
        let natural: Arc<dyn Comparer> = Arc::new(NaturalComparer);
        let comparer = self.ranking.comparer.as_ref().unwrap_or(&natural);
        ranked.sort_by(|(_, a), (_, b)| {
            let cmp = comparer.compare(a, b);
            if self.ranking.top {
                cmp.reverse()
            } else {
                cmp
            }
        });

        let keep = if self.ranking.equality_kept {
            dense_cut(&ranked, self.ranking.n, &**comparer)
        } else {
            self.ranking.n.min(ranked.len())
        };

        let mut rows: Vec<usize> = (0..headers).collect();
        rows.extend(ranked.into_iter().take(keep).map(|(r, _)| r));
        self.stream.complete_with(ticket, rows);
    }
}

/// Length of the prefix holding the first `n` distinct values.
fn dense_cut(ranked: &[(usize, ColumnValue)], n: usize, comparer: &dyn Comparer) -> usize {
    if n == 0 {
        return 0;
    }
    let mut distinct = 0;
    for (i, (_, value)) in ranked.iter().enumerate() {
        let new_value = i == 0 || comparer.compare(&ranked[i - 1].1, value).is_ne();
        if new_value {
            distinct += 1;
            if distinct > n {
                return i;
            }
        }
    }
    ranked.len()
}

impl BaseChangeHandler for RankingInner {
    fn base_changed(&self) {
        self.stream.reset();
        self.listeners.fire();
    }
}

/// The rows of `base` with the `n` highest or lowest values in one column.
pub struct RankingTableLens {
    inner: Arc<RankingInner>,
    subscription: Mutex<Option<BaseSubscription>>,
}

impl RankingTableLens {
    pub fn new(base: SharedLens, ranking: Ranking) -> Self {
        Self::with_env(base, ranking, LensEnv::shared())
    }

    pub fn with_env(base: SharedLens, ranking: Ranking, env: Arc<LensEnv>) -> Self {
        let inner = Arc::new(RankingInner {
            base: Arc::clone(&base),
            ranking,
            stream: RowStream::new(env.config().wait_interval()),
            listeners: ListenerRegistry::new(),
        });
        let subscription = BaseSubscription::forward(base, Arc::downgrade(&inner));
        RankingTableLens {
            inner,
            subscription: Mutex::new(Some(subscription)),
        }
    }

    pub fn ranking(&self) -> &Ranking {
        &self.inner.ranking
    }

    fn validated(&self) -> &RowStream<usize> {
        let inner = &self.inner;
        inner.stream.wait_until_done(|| inner.validate());
        &inner.stream
    }
}

impl TableFilter for RankingTableLens {
    fn base_table(&self) -> SharedLens {
        Arc::clone(&self.inner.base)
    }

    fn base_row_index(&self, row: usize) -> Option<usize> {
        self.validated().get(row)
    }

    fn base_col_index(&self, col: usize) -> Option<usize> {
        Some(col)
    }
}

impl TableLens for RankingTableLens {
    fn row_count(&self) -> RowCount {
        self.validated().row_count()
    }

    fn col_count(&self) -> usize {
        self.inner.base.col_count()
    }

    fn more_rows(&self, row: usize) -> bool {
        let inner = &self.inner;
        inner.stream.wait_for(row, || inner.validate())
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
        "RankingTableLens"
    }

    fn cell_source(&self, row: usize, col: usize) -> Option<(SharedLens, usize, usize)> {
        self.base_row_index(row)
            .map(|r| (Arc::clone(&self.inner.base), r, col))
    }

    fn col_source(&self, col: usize) -> Option<(SharedLens, usize)> {
        Some((Arc::clone(&self.inner.base), col))
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
            self.inner.base.dispose();
        }
    }

    fn listeners(&self) -> &ListenerRegistry {
        &self.inner.listeners
    }
}
