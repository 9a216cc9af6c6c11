//! Domain layer for the fault-injection interceptor
//!
//! Contains the identifiers, the opaque message envelope and the domain errors
//! shared by every other layer. Nothing in here knows about gRPC transports.

pub mod entities;
pub mod errors;
pub mod value_objects;

pub use entities::*;
pub use errors::DomainError;
pub use value_objects::*;
