//! Port definitions for application layer
//!
//! Ports are interfaces that define how the interceptor talks to the transport
//! it is embedded in. The gRPC presentation layer implements them.

mod message_stream;

pub use message_stream::{BoxMessageStream, MessageStream};
