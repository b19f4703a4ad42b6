//! Incrementally materialized row lists.
//!
//! A [`RowStream`] is written by one background producer and read by any
//! number of consumer threads. Consumers block in [`RowStream::wait_for`]
//! until the row they need is published, the producer finishes, or the
//! stream is cancelled. Every state change signals a condition variable; the
//! configured wait interval only bounds how long a waiter sleeps before it
//! re-checks on its own.
//!
//! Each validation run gets a [`Ticket`]. Resetting the stream bumps its
//! generation, after which writes carrying an old ticket are rejected, so a
//! producer that is still running after `invalidate` cannot corrupt the new run.

use crate::error::LensError;
use crate::lens::RowCount;
use parking_lot::{Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unvalidated,
    Validating,
    Completed,
    Cancelled,
}

/// Write permission for one validation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

#[derive(Debug)]
struct StreamState<T> {
    phase: Phase,
    rows: Vec<T>,
    generation: u64,
    error: Option<LensError>,
    /// Highest row count a consumer has asked for.
    demand: usize,
}

impl<T> StreamState<T> {
    fn accepts(&self, ticket: Ticket) -> bool {
        self.phase == Phase::Validating && self.generation == ticket.0
    }
}

#[derive(Debug)]
pub struct RowStream<T> {
    state: Mutex<StreamState<T>>,
    changed: Condvar,
    wait_interval: Duration,
}

impl<T: Clone> RowStream<T> {
    pub fn new(wait_interval: Duration) -> Self {
        RowStream {
            state: Mutex::new(StreamState {
                phase: Phase::Unvalidated,
                rows: Vec::new(),
                generation: 0,
                error: None,
                demand: 0,
            }),
            changed: Condvar::new(),
            wait_interval,
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    /// Claim the producer role. Returns `None` unless the stream is unvalidated.
    pub fn begin(&self) -> Option<Ticket> {
        let mut state = self.state.lock();
        if state.phase != Phase::Unvalidated {
            return None;
        }
        state.phase = Phase::Validating;
        state.generation += 1;
        Some(Ticket(state.generation))
    }

    /// True while `ticket` may still write. Producers poll this between rows.
    pub fn is_live(&self, ticket: Ticket) -> bool {
        self.state.lock().accepts(ticket)
    }

    pub fn push(&self, ticket: Ticket, row: T) -> bool {
        let mut state = self.state.lock();
        if !state.accepts(ticket) {
            return false;
        }
        state.rows.push(row);
        drop(state);
        self.changed.notify_all();
        true
    }

    pub fn extend(&self, ticket: Ticket, rows: impl IntoIterator<Item = T>) -> bool {
        let mut state = self.state.lock();
        if !state.accepts(ticket) {
            return false;
        }
        state.rows.extend(rows);
        drop(state);
        self.changed.notify_all();
        true
    }

    /// Finish the run. Rows published so far become the final content.
    pub fn complete(&self, ticket: Ticket) -> bool {
        let mut state = self.state.lock();
        if !state.accepts(ticket) {
            return false;
        }
        state.phase = Phase::Completed;
        drop(state);
        self.changed.notify_all();
        true
    }

    /// Replace the content and finish in one step.
    pub fn complete_with(&self, ticket: Ticket, rows: Vec<T>) -> bool {
        let mut state = self.state.lock();
        if !state.accepts(ticket) {
            return false;
        }
        state.rows = rows;
        state.phase = Phase::Completed;
        drop(state);
        self.changed.notify_all();
        true
    }

    /// Finish the run early, keeping the rows published so far and the error.
    pub fn fail(&self, ticket: Ticket, error: LensError) -> bool {
        let mut state = self.state.lock();
        if !state.accepts(ticket) {
            return false;
        }
        log::warn!("table materialization failed: {error}");
        state.error = Some(error);
        state.phase = Phase::Completed;
        drop(state);
        self.changed.notify_all();
        true
    }

    pub fn error(&self) -> Option<LensError> {
        self.state.lock().error.clone()
    }

    /// Stop the current run. Returns true if this call did the transition;
    /// a completed stream is left alone.
    pub fn cancel(&self) -> bool {
        let mut state = self.state.lock();
        match state.phase {
            Phase::Unvalidated | Phase::Validating => {
                state.phase = Phase::Cancelled;
                drop(state);
                self.changed.notify_all();
                true
            }
            Phase::Completed | Phase::Cancelled => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.phase() == Phase::Cancelled
    }

    /// Discard all rows and return to `Unvalidated`. Outstanding tickets go
    /// stale. A cancelled stream stays cancelled.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        if state.phase == Phase::Cancelled {
            return;
        }
        state.phase = Phase::Unvalidated;
        state.generation += 1;
        state.rows.clear();
        state.error = None;
        state.demand = 0;
        drop(state);
        self.changed.notify_all();
    }

    /// Block until row `row` is published (true) or the stream ends before
    /// it (false). `start` is called whenever the stream is found unvalidated.
    pub fn wait_for(&self, row: usize, start: impl Fn()) -> bool {
        let mut state = self.state.lock();
        loop {
            if row < state.rows.len() {
                return true;
            }
            match state.phase {
                Phase::Completed | Phase::Cancelled => return false,
                Phase::Unvalidated => {
                    drop(state);
                    start();
                    state = self.state.lock();
                    continue;
                }
                Phase::Validating => {}
            }
            if state.demand <= row {
                state.demand = row + 1;
                self.changed.notify_all();
            }
            let _ = self.changed.wait_for(&mut state, self.wait_interval);
        }
    }

    /// Park a demand-driven producer while it is `ahead` rows past the
    /// highest request. Returns false once the ticket is no longer live.
    pub fn wait_for_demand(&self, ticket: Ticket, ahead: usize) -> bool {
        let mut state = self.state.lock();
        loop {
            if !state.accepts(ticket) {
                return false;
            }
            if state.rows.len() < state.demand.saturating_add(ahead) {
                return true;
            }
            let _ = self.changed.wait_for(&mut state, self.wait_interval);
        }
    }

    /// Raise the demand watermark without blocking.
    pub fn request(&self, rows: usize) {
        let mut state = self.state.lock();
        if state.demand < rows {
            state.demand = rows;
            drop(state);
            self.changed.notify_all();
        }
    }

    /// Block until the stream is no longer validating.
    pub fn wait_until_done(&self, start: impl Fn()) {
        let mut state = self.state.lock();
        loop {
            match state.phase {
                Phase::Completed | Phase::Cancelled => return,
                Phase::Unvalidated => {
                    drop(state);
                    start();
                    state = self.state.lock();
                }
                Phase::Validating => {
                    state.demand = usize::MAX;
                    self.changed.notify_all();
                    let _ = self.changed.wait_for(&mut state, self.wait_interval);
                }
            }
        }
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.state.lock().rows.get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` over the published rows under the stream lock.
    pub fn with_rows<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.state.lock().rows)
    }

    pub fn row_count(&self) -> RowCount {
        let state = self.state.lock();
        match state.phase {
            Phase::Completed | Phase::Cancelled => RowCount::Exact(state.rows.len()),
            Phase::Unvalidated | Phase::Validating => RowCount::AtLeast(state.rows.len()),
        }
    }
}
