//! Registry of rendezvous points awaiting controller replies

use std::collections::HashMap;

use domain::MessageId;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::fault::Fault;

/// One-shot reply slots keyed by message id
///
/// Each slot is consumed by whichever of [`deliver`](Self::deliver) and
/// [`cancel`](Self::cancel) runs first, so a reply reaches its waiter at most
/// once and late replies are dropped.
#[derive(Debug, Default)]
pub struct PendingReplies {
    slots: Mutex<HashMap<MessageId, oneshot::Sender<Fault>>>,
}

impl PendingReplies {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a slot for `id` and return the receiving half
    ///
    /// Ids are fresh v4 UUIDs, so an existing slot is never overwritten in
    /// practice; if it were, the previous waiter would observe a closed channel.
    pub fn register(&self, id: MessageId) -> oneshot::Receiver<Fault> {
        let (tx, rx) = oneshot::channel();
        self.slots.lock().insert(id, tx);
        rx
    }

    /// Hand `fault` to the waiter registered under `id`
    ///
    /// Returns `false` when no waiter exists (unknown id, already answered,
    /// timed out) or when the waiter has gone away.
    pub fn deliver(&self, id: &MessageId, fault: Fault) -> bool {
        let slot = self.slots.lock().remove(id);
        slot.is_some_and(|tx| tx.send(fault).is_ok())
    }

    /// Drop the slot for `id`; returns whether one was still open
    pub fn cancel(&self, id: &MessageId) -> bool {
        self.slots.lock().remove(id).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}
