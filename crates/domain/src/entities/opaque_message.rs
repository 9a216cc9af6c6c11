//! Type-tagged byte envelope for payloads of unknown schema
//!
//! The interceptor never looks inside intercepted payloads. It ferries them to
//! controllers as an `OpaqueMessage`, which is the in-process twin of
//! `google.protobuf.Any`: a type URL naming the message plus its encoded bytes.

use bytes::Bytes;

use crate::DomainError;

/// Prefix used by protobuf tooling for `Any` type URLs
pub const TYPE_URL_PREFIX: &str = "type.googleapis.com/";

/// An encoded message together with the type URL that describes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueMessage {
    type_url: String,
    value: Bytes,
}

impl OpaqueMessage {
    /// Create an envelope from a type URL and encoded bytes
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidEnvelope`] if the type URL is empty.
    pub fn new(type_url: impl Into<String>, value: impl Into<Bytes>) -> Result<Self, DomainError> {
        let type_url = type_url.into();
        if type_url.trim().is_empty() {
            return Err(DomainError::InvalidEnvelope(
                "type url must not be empty".to_string(),
            ));
        }
        Ok(Self {
            type_url,
            value: value.into(),
        })
    }

    /// Full type URL, e.g. `type.googleapis.com/gnoi.system.RebootRequest`
    #[must_use]
    pub fn type_url(&self) -> &str {
        &self.type_url
    }

    /// Fully-qualified message name, i.e. the part after the last `/`
    #[must_use]
    pub fn type_name(&self) -> &str {
        self.type_url
            .rsplit_once('/')
            .map_or(self.type_url.as_str(), |(_, name)| name)
    }

    /// Encoded message bytes
    #[must_use]
    pub const fn value(&self) -> &Bytes {
        &self.value
    }

    /// Consume the envelope, returning its parts
    #[must_use]
    pub fn into_parts(self) -> (String, Bytes) {
        (self.type_url, self.value)
    }
}

impl From<OpaqueMessage> for prost_types::Any {
    fn from(message: OpaqueMessage) -> Self {
        Self {
            type_url: message.type_url,
            value: message.value.to_vec(),
        }
    }
}

impl TryFrom<prost_types::Any> for OpaqueMessage {
    type Error = DomainError;

    fn try_from(any: prost_types::Any) -> Result<Self, Self::Error> {
        Self::new(any.type_url, any.value)
    }
}
