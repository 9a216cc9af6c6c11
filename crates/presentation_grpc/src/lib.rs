//! gRPC presentation layer
//!
//! Wire types and tonic bindings for the `faultinject.v1.FaultInject`
//! controller protocol, the service that hosts controller sessions, and the
//! adapters a tonic service uses to route its handlers through the interceptor.

pub mod convert;
pub mod handlers;
pub mod intercept;
pub mod proto;
pub mod routes;

pub use handlers::{EchoService, FaultInjectService};
pub use intercept::TonicServerStream;
pub use routes::create_router;
