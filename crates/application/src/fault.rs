//! Fault decisions returned by controllers and preloaded queues

use domain::OpaqueMessage;
use tonic::{Code, Status};

/// Status used when a fault carries no explicit status
#[must_use]
pub fn ok_status() -> Status {
    Status::new(Code::Ok, "")
}

/// Replacement payload and/or status for one intercepted message
///
/// A fault with an OK status and no payload is a no-op: the original message
/// flows on unchanged.
#[derive(Debug, Clone)]
pub struct Fault {
    payload: Option<OpaqueMessage>,
    status: Status,
}

impl Fault {
    #[must_use]
    pub const fn new(payload: Option<OpaqueMessage>, status: Status) -> Self {
        Self { payload, status }
    }

    /// Fault that only fails the call
    #[must_use]
    pub fn error(code: Code, message: impl Into<String>) -> Self {
        Self::new(None, Status::new(code, message))
    }

    /// Fault that only replaces the payload
    #[must_use]
    pub fn with_payload(payload: OpaqueMessage) -> Self {
        Self::new(Some(payload), ok_status())
    }

    #[must_use]
    pub const fn payload(&self) -> Option<&OpaqueMessage> {
        self.payload.as_ref()
    }

    #[must_use]
    pub const fn status(&self) -> &Status {
        &self.status
    }

    /// True when the status is OK, regardless of payload
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status.code() == Code::Ok
    }

    #[must_use]
    pub fn into_parts(self) -> (Option<OpaqueMessage>, Status) {
        (self.payload, self.status)
    }
}

impl Default for Fault {
    fn default() -> Self {
        Self::new(None, ok_status())
    }
}
