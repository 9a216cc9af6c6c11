//! Conversions between the controller wire protocol and application types

use application::{ControllerMessage, Fault, Interception, ok_status};
use domain::OpaqueMessage;
use prost::Message;
use tonic::{Code, Status};
use tracing::warn;

use crate::proto::faultinject::{
    FaultMessage, InterceptRequest, InterceptResponse, OriginalMessage, RpcStatus,
    intercept_request::Msg,
};

/// Render a status in its `google.rpc.Status` wire form
///
/// Details are recovered from the status' binary details when they hold an
/// encoded `google.rpc.Status`, which is how tonic carries rich errors.
pub fn status_to_proto(status: &Status) -> RpcStatus {
    let details = if status.details().is_empty() {
        Vec::new()
    } else {
        RpcStatus::decode(status.details())
            .map(|rich| rich.details)
            .unwrap_or_default()
    };
    RpcStatus {
        code: status.code() as i32,
        message: status.message().to_string(),
        details,
    }
}

/// Build a status from its wire form
///
/// Unknown codes map to `Unknown`. Details travel as the encoded wire status.
pub fn status_from_proto(proto: RpcStatus) -> Status {
    let code = Code::from_i32(proto.code);
    if proto.details.is_empty() {
        return Status::new(code, proto.message);
    }
    let details = proto.encode_to_vec();
    Status::with_details(code, proto.message, details.into())
}

/// Turn a controller's fault message into a fault decision
///
/// A payload whose type URL is empty cannot be decoded against anything, so it
/// is dropped and the call proceeds as if none had been sent.
pub fn fault_from_proto(message: FaultMessage) -> (String, Fault) {
    let status = message.status.map_or_else(ok_status, status_from_proto);
    let payload = message.payload.and_then(|any| {
        OpaqueMessage::try_from(any)
            .map_err(|e| warn!(message_id = %message.message_id, error = %e, "Dropping malformed payload"))
            .ok()
    });
    (message.message_id, Fault::new(payload, status))
}

/// Classify a message received on the `Intercept` stream
pub fn controller_message(request: InterceptRequest) -> ControllerMessage {
    match request.msg {
        Some(Msg::Subscription(subscription)) => ControllerMessage::Subscribe {
            method_regex: subscription.method_regex,
        },
        Some(Msg::Fault(fault)) => {
            let (message_id, fault) = fault_from_proto(fault);
            ControllerMessage::Fault { message_id, fault }
        }
        None => ControllerMessage::Unrecognized,
    }
}

impl From<Interception> for InterceptResponse {
    fn from(interception: Interception) -> Self {
        Self {
            original: Some(OriginalMessage {
                rpc_id: interception.rpc_id.to_string(),
                message_id: interception.message_id.to_string(),
                method: interception.method,
                payload: Some(interception.payload.into()),
            }),
        }
    }
}

impl From<Fault> for FaultMessage {
    fn from(fault: Fault) -> Self {
        let (payload, status) = fault.into_parts();
        Self {
            message_id: String::new(),
            payload: payload.map(Into::into),
            status: Some(status_to_proto(&status)),
        }
    }
}

/// Subscription request for controller clients
pub fn subscribe(method_regex: impl Into<String>) -> InterceptRequest {
    InterceptRequest {
        msg: Some(Msg::Subscription(
            crate::proto::faultinject::InterceptSubscription {
                method_regex: method_regex.into(),
            },
        )),
    }
}

/// Reply to the interception identified by `message_id`
pub fn reply(message_id: impl Into<String>, fault: Fault) -> InterceptRequest {
    let mut message = FaultMessage::from(fault);
    message.message_id = message_id.into();
    InterceptRequest {
        msg: Some(Msg::Fault(message)),
    }
}
