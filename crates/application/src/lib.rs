//! Application layer - fault injection use cases
//!
//! Holds the interceptor itself: the message codec, the pending-reply
//! registry, the subscription table, preloaded fault queues and the controller
//! session handler. Transport bindings live in the presentation layer.

pub mod codec;
pub mod error;
pub mod fault;
pub mod fault_queue;
pub mod interceptor;
pub mod pending;
pub mod ports;
pub mod session;
pub mod stats;
pub mod stream;
pub mod subscriptions;

#[cfg(test)]
pub(crate) mod test_support;

pub use codec::{CodecError, DynMessage, ProtoMessage, RawFrame};
pub use error::ApplicationError;
pub use fault::{Fault, ok_status};
pub use fault_queue::FaultQueues;
pub use interceptor::{
    CONTROLLER_METHOD, DEFAULT_REPLY_TIMEOUT, DEFAULT_SUBSCRIPTION_BUFFER, FaultInterceptor,
    InterceptorConfig, MethodInfo, RpcContext,
};
pub use pending::PendingReplies;
pub use ports::*;
pub use session::{ControllerMessage, ControllerSession, SessionState};
pub use stats::{InterceptorStats, StatsSnapshot};
pub use subscriptions::{Interception, Subscription, SubscriptionTable};
