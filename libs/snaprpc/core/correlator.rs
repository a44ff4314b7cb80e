//! Request/response correlation
//!
//! Every outgoing call gets a fresh integer id and a one-shot result slot.
//! The read task settles slots as replies arrive, possibly out of order.
//! Whoever removes the slot from the table first owns it, so each slot is
//! settled at most once no matter how replies, timeouts and teardown race.

use crate::error::{Result, SnapError};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;
use tracing::trace;

/// Receiving end of a pending call
pub type ResultSlot = oneshot::Receiver<Result<Value>>;

#[derive(Default)]
struct TableState {
    pending: HashMap<u64, oneshot::Sender<Result<Value>>>,
    /// Set once the owning connection is gone; later registrations fail with it
    closed: Option<SnapError>,
}

/// Pending-call table for one connection
pub struct CorrelationTable {
    next_id: AtomicU64,
    state: Mutex<TableState>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            state: Mutex::new(TableState::default()),
        }
    }

    /// Allocate an id not used before on this table
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Create the result slot for `id`
    pub fn register(&self, id: u64) -> Result<ResultSlot> {
        let mut state = self.state.lock();
        if let Some(err) = &state.closed {
            return Err(err.clone());
        }
        if state.pending.contains_key(&id) {
            return Err(SnapError::InvalidState(format!("request id {} is already pending", id)));
        }
        let (tx, rx) = oneshot::channel();
        state.pending.insert(id, tx);
        Ok(rx)
    }

    /// Settle `id` with a result. Returns false if nothing was waiting.
    pub fn resolve(&self, id: u64, value: Value) -> bool {
        self.settle(id, Ok(value))
    }

    /// Settle `id` with an error. Returns false if nothing was waiting.
    pub fn reject(&self, id: u64, error: SnapError) -> bool {
        self.settle(id, Err(error))
    }

    /// Drop the slot for `id` without settling it (used on timeout)
    ///
    /// Returns false when the slot was already taken by a reply.
    pub fn forget(&self, id: u64) -> bool {
        self.state.lock().pending.remove(&id).is_some()
    }

    /// Fail every pending call and refuse new registrations
    ///
    /// Returns how many calls were failed.
    pub fn fail_all(&self, error: SnapError) -> usize {
        let drained: Vec<_> = {
            let mut state = self.state.lock();
            if state.closed.is_none() {
                state.closed = Some(error.clone());
            }
            state.pending.drain().collect()
        };

        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(error.clone()));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed.is_some()
    }

    /// Remove the sender for `id`; the caller must send on it
    pub(crate) fn take(&self, id: u64) -> Option<oneshot::Sender<Result<Value>>> {
        self.state.lock().pending.remove(&id)
    }

    fn settle(&self, id: u64, outcome: Result<Value>) -> bool {
        match self.take(id) {
            Some(tx) => {
                // The caller may have given up already; that is fine.
                let _ = tx.send(outcome);
                true
            }
            None => {
                trace!("No pending call for id {}, reply discarded", id);
                false
            }
        }
    }
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ids_are_unique() {
        let table = CorrelationTable::new();
        let a = table.next_id();
        let b = table.next_id();
        assert_eq!(a, 1);
        assert_ne!(a, b);
    }

    #[test]
    fn test_out_of_order_resolution() {
        let table = CorrelationTable::new();
        let mut first = table.register(1).unwrap();
        let mut second = table.register(2).unwrap();

        assert!(table.resolve(2, json!("two")));
        assert!(table.resolve(1, json!("one")));

        assert_eq!(first.try_recv().unwrap().unwrap(), json!("one"));
        assert_eq!(second.try_recv().unwrap().unwrap(), json!("two"));
        assert!(table.is_empty());
    }

    #[test]
    fn test_duplicate_and_unknown_replies_are_ignored() {
        let table = CorrelationTable::new();
        let mut slot = table.register(7).unwrap();

        assert!(table.resolve(7, json!(1)));
        assert!(!table.resolve(7, json!(2)));
        assert!(!table.reject(42, SnapError::NotConnected));

        assert_eq!(slot.try_recv().unwrap().unwrap(), json!(1));
    }

    #[test]
    fn test_forget_then_late_reply() {
        let table = CorrelationTable::new();
        let _slot = table.register(3).unwrap();

        assert!(table.forget(3));
        assert!(!table.forget(3));
        assert!(!table.resolve(3, json!("late")));
    }

    #[test]
    fn test_register_rejects_duplicate_id() {
        let table = CorrelationTable::new();
        let _slot = table.register(1).unwrap();
        assert!(matches!(table.register(1), Err(SnapError::InvalidState(_))));
    }

    #[test]
    fn test_fail_all_settles_everything_once() {
        let table = CorrelationTable::new();
        let mut slots: Vec<_> = (1..=3).map(|id| table.register(id).unwrap()).collect();

        let failed = table.fail_all(SnapError::ConnectionClosed("eof".into()));
        assert_eq!(failed, 3);
        assert_eq!(table.fail_all(SnapError::ConnectionClosed("again".into())), 0);

        for slot in slots.iter_mut() {
            let outcome = slot.try_recv().unwrap();
            assert_eq!(outcome, Err(SnapError::ConnectionClosed("eof".into())));
        }

        assert!(table.is_closed());
        assert!(matches!(table.register(9), Err(SnapError::ConnectionClosed(_))));
    }
}
