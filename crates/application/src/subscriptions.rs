//! Controller subscriptions keyed by method pattern

use std::sync::Arc;

use domain::{MessageId, OpaqueMessage, RpcId, SubscriptionId};
use parking_lot::Mutex;
use regex::Regex;
use tokio::sync::mpsc;
use tonic::Status;

use crate::error::ApplicationError;

/// A message captured in flight and forwarded to a controller
#[derive(Debug, Clone)]
pub struct Interception {
    pub rpc_id: RpcId,
    pub message_id: MessageId,
    pub method: String,
    pub payload: OpaqueMessage,
    /// Status the message was about to travel with
    pub status: Status,
}

/// One controller's interest in a set of methods
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    pattern: Regex,
    sender: mpsc::Sender<Interception>,
}

impl Subscription {
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Unanchored search, same as a plain regex find
    #[must_use]
    pub fn matches(&self, method: &str) -> bool {
        self.pattern.is_match(method)
    }

    /// Push an interception to the controller, waiting for buffer space
    ///
    /// Fails when the controller's outbound side has gone away.
    pub async fn forward(&self, interception: Interception) -> Result<(), Interception> {
        self.sender.send(interception).await.map_err(|err| err.0)
    }
}

/// Live subscriptions in registration order
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    entries: Mutex<Vec<Arc<Subscription>>>,
}

impl SubscriptionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `pattern` and register a new subscription
    ///
    /// Returns the subscription together with the receiver its interceptions
    /// are pushed to. `buffer` is clamped to at least one slot.
    pub fn add(
        &self,
        pattern: &str,
        buffer: usize,
    ) -> Result<(Arc<Subscription>, mpsc::Receiver<Interception>), ApplicationError> {
        let pattern = Regex::new(pattern).map_err(|e| {
            ApplicationError::invalid_argument(format!("invalid method regex {pattern:?}: {e}"))
        })?;
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let subscription = Arc::new(Subscription {
            id: SubscriptionId::new(),
            pattern,
            sender,
        });
        self.entries.lock().push(Arc::clone(&subscription));
        Ok((subscription, receiver))
    }

    /// Remove a subscription; returns whether it was present
    pub fn remove(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|s| s.id != id);
        entries.len() != before
    }

    /// Earliest-registered subscription whose pattern matches `method`
    #[must_use]
    pub fn match_first(&self, method: &str) -> Option<Arc<Subscription>> {
        self.entries
            .lock()
            .iter()
            .find(|s| s.matches(method))
            .map(Arc::clone)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
