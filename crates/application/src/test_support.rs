//! Message types shared by unit tests

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tonic::Status;

use crate::codec::ProtoMessage;
use crate::interceptor::MethodInfo;
use crate::ports::MessageStream;

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct Ping {
    #[prost(string, tag = "1")]
    pub msg: String,
}

impl Ping {
    pub fn new(msg: &str) -> Self {
        Self {
            msg: msg.to_string(),
        }
    }
}

impl prost::Name for Ping {
    const NAME: &'static str = "Ping";
    const PACKAGE: &'static str = "test";
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct Pong {
    #[prost(string, tag = "1")]
    pub msg: String,
}

impl Pong {
    pub fn new(msg: &str) -> Self {
        Self {
            msg: msg.to_string(),
        }
    }
}

impl prost::Name for Pong {
    const NAME: &'static str = "Pong";
    const PACKAGE: &'static str = "test";
}

pub fn ping_method(method: &str) -> MethodInfo {
    MethodInfo::new(method).with_response_prototype(Box::new(Pong::default()))
}

/// Stream fed from a script of inbound results that records what is sent
#[derive(Debug, Default)]
pub struct ScriptedStream {
    pub inbound: VecDeque<Result<Vec<u8>, Status>>,
    pub sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl ScriptedStream {
    pub fn new(inbound: Vec<Result<Vec<u8>, Status>>) -> Self {
        Self {
            inbound: inbound.into(),
            sent: Arc::default(),
        }
    }
}

#[async_trait]
impl MessageStream for ScriptedStream {
    async fn recv_msg(&mut self, message: &mut dyn ProtoMessage) -> Result<bool, Status> {
        match self.inbound.pop_front() {
            None => Ok(false),
            Some(Err(status)) => Err(status),
            Some(Ok(bytes)) => {
                message.clear_payload();
                message
                    .merge_payload(&bytes)
                    .map_err(|e| Status::internal(e.to_string()))?;
                Ok(true)
            }
        }
    }

    async fn send_msg(&mut self, message: &dyn ProtoMessage) -> Result<(), Status> {
        self.sent.lock().push(message.encode_payload());
        Ok(())
    }
}
