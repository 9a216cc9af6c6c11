//! Stream port
//!
//! Transport-neutral view of a server stream. The interceptor wraps one of
//! these around the host's stream so every message passing through it can be
//! shown to a controller first.

use async_trait::async_trait;
use tonic::Status;

use crate::codec::ProtoMessage;

/// Boxed stream handed to stream handlers
pub type BoxMessageStream = Box<dyn MessageStream>;

/// Message-at-a-time access to a server stream
#[async_trait]
pub trait MessageStream: Send {
    /// Receive the next inbound message into `message`
    ///
    /// Returns `Ok(false)` at end of stream.
    async fn recv_msg(&mut self, message: &mut dyn ProtoMessage) -> Result<bool, Status>;

    /// Send one outbound message
    async fn send_msg(&mut self, message: &dyn ProtoMessage) -> Result<(), Status>;
}
