//! Domain entities

pub mod opaque_message;

pub use opaque_message::{OpaqueMessage, TYPE_URL_PREFIX};
