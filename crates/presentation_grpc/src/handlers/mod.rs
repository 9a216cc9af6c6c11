//! gRPC service implementations

pub mod echo;
pub mod fault_inject;

pub use echo::EchoService;
pub use fault_inject::FaultInjectService;
