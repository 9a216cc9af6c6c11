//! Value objects - Immutable identifiers shared across layers

pub mod message_id;
pub mod rpc_id;
pub mod subscription_id;

pub use message_id::MessageId;
pub use rpc_id::RpcId;
pub use subscription_id::SubscriptionId;
