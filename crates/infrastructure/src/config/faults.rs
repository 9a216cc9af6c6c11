//! Preloaded fault tables.
//!
//! ```toml
//! [[faults]]
//! method = "/gnoi.system.System/Reboot"
//!
//!   [[faults.queue]]
//!   code = "PERMISSION_DENIED"
//!   message = "First failure"
//! ```

use application::Fault;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use domain::OpaqueMessage;
use serde::{Deserialize, Serialize};
use tonic::{Code, Status};

use super::ConfigLoadError;

/// Canonical gRPC code names, indexed by code value
const CODE_NAMES: [(&str, Code); 17] = [
    ("OK", Code::Ok),
    ("CANCELLED", Code::Cancelled),
    ("UNKNOWN", Code::Unknown),
    ("INVALID_ARGUMENT", Code::InvalidArgument),
    ("DEADLINE_EXCEEDED", Code::DeadlineExceeded),
    ("NOT_FOUND", Code::NotFound),
    ("ALREADY_EXISTS", Code::AlreadyExists),
    ("PERMISSION_DENIED", Code::PermissionDenied),
    ("RESOURCE_EXHAUSTED", Code::ResourceExhausted),
    ("FAILED_PRECONDITION", Code::FailedPrecondition),
    ("ABORTED", Code::Aborted),
    ("OUT_OF_RANGE", Code::OutOfRange),
    ("UNIMPLEMENTED", Code::Unimplemented),
    ("INTERNAL", Code::Internal),
    ("UNAVAILABLE", Code::Unavailable),
    ("DATA_LOSS", Code::DataLoss),
    ("UNAUTHENTICATED", Code::Unauthenticated),
];

/// Status code given either by name or by number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusCodeSpec {
    Number(i32),
    Name(String),
}

impl Default for StatusCodeSpec {
    fn default() -> Self {
        Self::Name("OK".to_string())
    }
}

impl StatusCodeSpec {
    /// Resolve to a gRPC code
    ///
    /// Names match case-insensitively and ignore underscores, so
    /// `PERMISSION_DENIED`, `permission_denied` and `PermissionDenied` agree.
    pub fn to_code(&self) -> Result<Code, ConfigLoadError> {
        match self {
            Self::Number(n) => usize::try_from(*n)
                .ok()
                .and_then(|i| CODE_NAMES.get(i))
                .map(|(_, code)| *code)
                .ok_or_else(|| ConfigLoadError::UnknownCode(n.to_string())),
            Self::Name(name) => {
                let wanted = normalize(name);
                CODE_NAMES
                    .iter()
                    .find(|(known, _)| normalize(known) == wanted)
                    .map(|(_, code)| *code)
                    .ok_or_else(|| ConfigLoadError::UnknownCode(name.clone()))
            }
        }
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Replacement payload, encoded as base64
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadSpec {
    /// e.g. `type.googleapis.com/gnoi.system.RebootRequest`
    pub type_url: String,

    #[serde(default)]
    pub value_base64: String,
}

/// One queued fault
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FaultSpec {
    #[serde(default)]
    pub code: StatusCodeSpec,

    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub payload: Option<PayloadSpec>,
}

impl FaultSpec {
    pub fn to_fault(&self, method: &str) -> Result<Fault, ConfigLoadError> {
        let code = self.code.to_code()?;
        let payload = self
            .payload
            .as_ref()
            .map(|spec| {
                let bytes = STANDARD.decode(spec.value_base64.trim()).map_err(|e| {
                    ConfigLoadError::InvalidPayload {
                        method: method.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                OpaqueMessage::new(spec.type_url.clone(), bytes).map_err(|e| {
                    ConfigLoadError::InvalidPayload {
                        method: method.to_string(),
                        reason: e.to_string(),
                    }
                })
            })
            .transpose()?;
        Ok(Fault::new(payload, Status::new(code, self.message.clone())))
    }
}

/// Fault queue for one method
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodFaults {
    /// Full method name, e.g. `/gnoi.system.System/Reboot`
    pub method: String,

    #[serde(default)]
    pub queue: Vec<FaultSpec>,
}
