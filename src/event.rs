//! Change notification between lenses.
//!
//! A filter subscribes to its base table when it is built. When the base
//! reports a change the filter drops whatever it has materialized and passes
//! the notification on to its own subscribers, so invalidation travels up the
//! chain while reads travel down it.
//!
//! Subscriptions are explicit: [`ListenerRegistry::subscribe`] hands back a
//! [`ListenerId`] that must be given back to unsubscribe, and
//! [`BaseSubscription`] does that automatically when a filter goes away.

use crate::lens::TableLens;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// The single "table changed" notification. It carries no diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableChangeEvent;

pub type ChangeListener = Arc<dyn Fn(&TableChangeEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, ChangeListener)>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: ChangeListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    /// Returns false if the id was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.listeners.lock().clear();
    }

    /// Dispatch the change event. Listeners run outside the registry lock so
    /// they may subscribe or unsubscribe while being notified.
    pub fn fire(&self) {
        let snapshot: Vec<ChangeListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        log::trace!("dispatching table change to {} listeners", snapshot.len());
        let event = TableChangeEvent;
        for listener in snapshot {
            listener(&event);
        }
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

/// Filter state that reacts when one of its base tables changes.
pub trait BaseChangeHandler: Send + Sync + 'static {
    fn base_changed(&self);
}

/// A filter's registration on one base table, removed on drop.
pub struct BaseSubscription {
    base: Arc<dyn TableLens>,
    id: Option<ListenerId>,
}

impl BaseSubscription {
    pub fn new(base: Arc<dyn TableLens>, listener: ChangeListener) -> Self {
        let id = base.add_change_listener(listener);
        BaseSubscription { base, id: Some(id) }
    }

    /// Subscribe `handler` without keeping it alive: once the filter state is
    /// dropped the listener does nothing.
    pub fn forward<H: BaseChangeHandler>(base: Arc<dyn TableLens>, handler: Weak<H>) -> Self {
        let listener: ChangeListener = Arc::new(move |_| {
            if let Some(handler) = handler.upgrade() {
                handler.base_changed();
            }
        });
        Self::new(base, listener)
    }

    pub fn base(&self) -> &Arc<dyn TableLens> {
        &self.base
    }

    /// Unregister now. Safe to call more than once.
    pub fn release(&mut self) {
        if let Some(id) = self.id.take() {
            self.base.remove_change_listener(id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.id.is_some()
    }
}

impl Drop for BaseSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for BaseSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseSubscription").field("id", &self.id).finish()
    }
}
