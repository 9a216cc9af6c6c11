//! Message codec for payloads of unknown schema
//!
//! The interceptor sits in front of arbitrary handlers, so it cannot name the
//! request and response types it forwards. [`ProtoMessage`] is the object-safe
//! view it uses instead: every prost message that carries a [`prost::Name`]
//! gets it for free, and anything without a name (see [`RawFrame`]) is
//! reported as not wrappable and passed through untouched.

use std::any::Any;
use std::fmt;

use bytes::Bytes;
use domain::{OpaqueMessage, TYPE_URL_PREFIX};
use thiserror::Error;

/// Boxed, type-erased message
pub type DynMessage = Box<dyn ProtoMessage>;

/// Errors produced while moving payloads in and out of envelopes
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The payload is not a self-describing message
    #[error("Payload is not a self-describing message")]
    NotWrappable,

    /// The envelope does not decode into the expected message type
    #[error("Decode error: {0}")]
    Decode(String),
}

impl From<prost::DecodeError> for CodecError {
    fn from(err: prost::DecodeError) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Schema-agnostic access to a protobuf message
pub trait ProtoMessage: Send + Sync + fmt::Debug + 'static {
    /// Fully-qualified protobuf name, or `None` if the payload does not describe itself
    fn full_name(&self) -> Option<String>;

    /// Encode the message to its wire form
    fn encode_payload(&self) -> Vec<u8>;

    /// Merge wire bytes into this message
    fn merge_payload(&mut self, bytes: &[u8]) -> Result<(), prost::DecodeError>;

    /// Reset every field to its default
    fn clear_payload(&mut self);

    /// Fresh, empty message of the same type
    fn new_instance(&self) -> DynMessage;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<M> ProtoMessage for M
where
    M: prost::Message + prost::Name + Default + 'static,
{
    fn full_name(&self) -> Option<String> {
        Some(<M as prost::Name>::full_name())
    }

    fn encode_payload(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    fn merge_payload(&mut self, bytes: &[u8]) -> Result<(), prost::DecodeError> {
        self.merge(bytes)
    }

    fn clear_payload(&mut self) {
        self.clear();
    }

    fn new_instance(&self) -> DynMessage {
        Box::new(M::default())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// Undescribed bytes, e.g. a stream element whose schema is unknown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFrame(Bytes);

impl RawFrame {
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    #[must_use]
    pub const fn bytes(&self) -> &Bytes {
        &self.0
    }
}

impl ProtoMessage for RawFrame {
    fn full_name(&self) -> Option<String> {
        None
    }

    fn encode_payload(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    fn merge_payload(&mut self, bytes: &[u8]) -> Result<(), prost::DecodeError> {
        let mut merged = self.0.to_vec();
        merged.extend_from_slice(bytes);
        self.0 = Bytes::from(merged);
        Ok(())
    }

    fn clear_payload(&mut self) {
        self.0 = Bytes::new();
    }

    fn new_instance(&self) -> DynMessage {
        Box::new(Self::default())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// Wrap a message into an opaque envelope
///
/// # Errors
///
/// Returns [`CodecError::NotWrappable`] when the message has no protobuf name.
pub fn wrap(message: &dyn ProtoMessage) -> Result<OpaqueMessage, CodecError> {
    let name = message.full_name().ok_or(CodecError::NotWrappable)?;
    OpaqueMessage::new(format!("{TYPE_URL_PREFIX}{name}"), message.encode_payload())
        .map_err(|_| CodecError::NotWrappable)
}

/// Decode an envelope into a fresh message of the prototype's type
///
/// Type URLs are compared by message name, so `type.googleapis.com/a.B` and
/// `/a.B` both match a prototype named `a.B`.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] when the envelope names another type or its
/// bytes are not a valid encoding.
pub fn unwrap(
    opaque: &OpaqueMessage,
    prototype: &dyn ProtoMessage,
) -> Result<DynMessage, CodecError> {
    let expected = prototype.full_name().ok_or(CodecError::NotWrappable)?;
    if opaque.type_name() != expected {
        return Err(CodecError::Decode(format!(
            "expected {expected}, got {}",
            opaque.type_url()
        )));
    }
    let mut message = prototype.new_instance();
    message.merge_payload(opaque.value())?;
    Ok(message)
}

/// Replace the contents of `target` with the envelope's message, in place
///
/// `target` is left untouched when decoding fails.
pub fn merge_into(opaque: &OpaqueMessage, target: &mut dyn ProtoMessage) -> Result<(), CodecError> {
    let replacement = unwrap(opaque, &*target)?;
    target.clear_payload();
    target.merge_payload(&replacement.encode_payload())?;
    Ok(())
}

/// Recover a concrete message from a type-erased one
///
/// Downcasts when the types line up and re-decodes the wire bytes otherwise,
/// which is what a client would observe on the wire.
pub fn into_typed<M>(message: DynMessage) -> Result<M, CodecError>
where
    M: prost::Message + Default + 'static,
{
    if message.as_any().is::<M>() {
        if let Ok(typed) = message.into_any().downcast::<M>() {
            return Ok(*typed);
        }
        return Err(CodecError::Decode("downcast failed".to_string()));
    }
    Ok(M::decode(message.encode_payload().as_slice())?)
}
