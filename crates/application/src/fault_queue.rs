//! Preloaded per-method fault queues
//!
//! Faults configured ahead of time are handed out in order, one per call, and
//! take effect without any controller being connected.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::error::ApplicationError;
use crate::fault::Fault;

/// FIFO queues of faults keyed by full method name
#[derive(Debug, Default)]
pub struct FaultQueues {
    queues: Mutex<HashMap<String, VecDeque<Fault>>>,
}

impl FaultQueues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the queue for `method`; an empty list clears it
    pub fn configure(&self, method: &str, faults: Vec<Fault>) -> Result<(), ApplicationError> {
        if method.is_empty() {
            return Err(ApplicationError::invalid_argument(
                "method name must not be empty",
            ));
        }
        let mut queues = self.queues.lock();
        if faults.is_empty() {
            queues.remove(method);
        } else {
            queues.insert(method.to_string(), faults.into());
        }
        Ok(())
    }

    /// Pop the next fault for `method`, if one is queued
    pub fn next(&self, method: &str) -> Option<Fault> {
        let mut queues = self.queues.lock();
        let queue = queues.get_mut(method)?;
        let fault = queue.pop_front();
        if queue.is_empty() {
            queues.remove(method);
        }
        fault
    }

    /// Faults still queued for `method`
    #[must_use]
    pub fn pending(&self, method: &str) -> usize {
        self.queues.lock().get(method).map_or(0, VecDeque::len)
    }
}
