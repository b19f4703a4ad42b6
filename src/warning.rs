//! User-visible warnings raised while tables stream.
//!
//! A row cap hit during materialization is not an error: the table is truncated
//! and the user is told once. Messages are de-duplicated by their text.

use parking_lot::Mutex;
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct WarningLog {
    always: bool,
    inner: Mutex<WarningState>,
}

#[derive(Debug, Default)]
struct WarningState {
    seen: HashSet<String>,
    pending: Vec<String>,
}

impl WarningLog {
    pub fn new(always: bool) -> Self {
        WarningLog {
            always,
            inner: Mutex::new(WarningState::default()),
        }
    }

    /// Record a warning. Returns false if an identical message was already
    /// shown and repeats are off.
    pub fn warn(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        let mut state = self.inner.lock();
        if !state.seen.insert(message.clone()) && !self.always {
            return false;
        }
        log::warn!("{message}");
        state.pending.push(message);
        true
    }

    /// Messages recorded so far, oldest first.
    pub fn messages(&self) -> Vec<String> {
        self.inner.lock().pending.clone()
    }

    /// Hand the pending messages to the caller. De-duplication memory is kept.
    pub fn take_messages(&self) -> Vec<String> {
        std::mem::take(&mut self.inner.lock().pending)
    }
}

/// Message shown when a join or distinct output is cut at its row cap.
pub fn row_limit_message(kind: &str, limit: usize) -> String {
    format!("{kind} output exceeded the maximum of {limit} rows; the result has been truncated")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warns_once_per_message() {
        let log = WarningLog::new(false);
        assert!(log.warn(row_limit_message("Join", 10)));
        assert!(!log.warn(row_limit_message("Join", 10)));
        assert!(log.warn(row_limit_message("Distinct", 10)));
        assert_eq!(log.messages().len(), 2);
    }

    #[test]
    fn test_always_warn_repeats() {
        let log = WarningLog::new(true);
        assert!(log.warn("limit"));
        assert!(log.warn("limit"));
        assert_eq!(log.take_messages().len(), 2);
        assert!(log.messages().is_empty());
    }

    #[test]
    fn test_taken_messages_stay_deduplicated() {
        let log = WarningLog::new(false);
        log.warn("limit");
        log.take_messages();
        assert!(!log.warn("limit"));
    }
}
