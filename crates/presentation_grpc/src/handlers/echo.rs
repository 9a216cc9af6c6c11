//! Demo `faultline.demo.v1.Echo` service
//!
//! Both methods run through the interceptor, so a controller attached to the
//! bundled server has something to rewrite.

use application::{BoxMessageStream, FaultInterceptor};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

use crate::intercept;
use crate::proto::demo::{Ping, Pong, echo_server::Echo};

pub const UNARY_METHOD: &str = "/faultline.demo.v1.Echo/Unary";
pub const CHAT_METHOD: &str = "/faultline.demo.v1.Echo/Chat";

#[derive(Debug, Clone)]
pub struct EchoService {
    interceptor: FaultInterceptor,
}

impl EchoService {
    pub const fn new(interceptor: FaultInterceptor) -> Self {
        Self { interceptor }
    }
}

#[tonic::async_trait]
impl Echo for EchoService {
    async fn unary(&self, request: Request<Ping>) -> Result<Response<Pong>, Status> {
        intercept::unary(&self.interceptor, UNARY_METHOD, request, |request| async move {
            Ok(Response::new(Pong {
                msg: request.into_inner().msg,
            }))
        })
        .await
    }

    type ChatStream = ReceiverStream<Result<Pong, Status>>;

    async fn chat(
        &self,
        request: Request<Streaming<Ping>>,
    ) -> Result<Response<Self::ChatStream>, Status> {
        let outbound = intercept::streaming(
            &self.interceptor,
            CHAT_METHOD,
            request.into_inner(),
            echo_all,
        );
        Ok(Response::new(outbound))
    }
}

/// Answer every ping with a pong carrying the same text
async fn echo_all(mut stream: BoxMessageStream) -> Result<(), Status> {
    loop {
        let mut ping = Ping::default();
        if !stream.recv_msg(&mut ping).await? {
            return Ok(());
        }
        stream.send_msg(&Pong { msg: ping.msg }).await?;
    }
}
