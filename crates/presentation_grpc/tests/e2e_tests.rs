//! End-to-end tests over a real tonic transport
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use application::codec::{self, ProtoMessage};
use application::{Fault, FaultInterceptor, InterceptorConfig};
use futures::StreamExt;
use presentation_grpc::convert;
use presentation_grpc::handlers::FaultInjectService;
use presentation_grpc::handlers::echo::UNARY_METHOD;
use presentation_grpc::intercept;
use presentation_grpc::proto::demo::echo_client::EchoClient;
use presentation_grpc::proto::demo::echo_server::{Echo, EchoServer};
use presentation_grpc::proto::demo::{Ping, Pong};
use presentation_grpc::proto::faultinject::fault_inject_client::FaultInjectClient;
use presentation_grpc::proto::faultinject::fault_inject_server::FaultInjectServer;
use presentation_grpc::proto::faultinject::{InterceptRequest, OriginalMessage};
use presentation_grpc::create_router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::transport::Server;
use tonic::transport::server::Router;
use tonic::{Code, Request, Response, Status, Streaming};

fn ping(msg: &str) -> Ping {
    Ping {
        msg: msg.to_string(),
    }
}

fn pong(msg: &str) -> Pong {
    Pong {
        msg: msg.to_string(),
    }
}

fn payload_fault(message: &dyn ProtoMessage, status: Status) -> Fault {
    Fault::new(Some(codec::wrap(message).unwrap()), status)
}

fn ok() -> Status {
    Status::new(Code::Ok, "")
}

fn interceptor() -> FaultInterceptor {
    FaultInterceptor::new(InterceptorConfig::default().with_reply_timeout(Duration::from_secs(5)))
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

/// Echo service that records every request its handler sees
#[derive(Debug, Clone)]
struct RecordingEcho {
    interceptor: FaultInterceptor,
    seen: Arc<Mutex<Vec<Ping>>>,
}

impl RecordingEcho {
    fn new(interceptor: &FaultInterceptor) -> Self {
        Self {
            interceptor: interceptor.clone(),
            seen: Arc::default(),
        }
    }

    fn seen(&self) -> Vec<Ping> {
        self.seen.lock().unwrap().clone()
    }
}

#[tonic::async_trait]
impl Echo for RecordingEcho {
    async fn unary(&self, request: Request<Ping>) -> Result<Response<Pong>, Status> {
        let seen = Arc::clone(&self.seen);
        intercept::unary(&self.interceptor, UNARY_METHOD, request, |request| async move {
            let ping = request.into_inner();
            seen.lock().unwrap().push(ping.clone());
            Ok(Response::new(Pong { msg: ping.msg }))
        })
        .await
    }

    type ChatStream = ReceiverStream<Result<Pong, Status>>;

    async fn chat(
        &self,
        _request: Request<Streaming<Ping>>,
    ) -> Result<Response<Self::ChatStream>, Status> {
        Err(Status::unimplemented("chat"))
    }
}

fn recording_router(interceptor: &FaultInterceptor, echo: RecordingEcho) -> Router {
    Server::builder()
        .add_service(FaultInjectServer::new(FaultInjectService::new(
            interceptor.clone(),
        )))
        .add_service(EchoServer::new(echo))
}

async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(router.serve_with_incoming(TcpListenerStream::new(listener)));
    addr
}

/// Controller that answers interceptions from a fixed script
struct Controller {
    outbound: mpsc::Sender<InterceptRequest>,
    seen: Arc<Mutex<Vec<OriginalMessage>>>,
    task: JoinHandle<()>,
}

impl Controller {
    async fn connect(addr: SocketAddr, pattern: &str, replies: Vec<Fault>) -> Self {
        let mut client = FaultInjectClient::connect(format!("http://{addr}"))
            .await
            .unwrap();
        let (outbound, rx) = mpsc::channel(16);
        outbound.send(convert::subscribe(pattern)).await.unwrap();
        let mut inbound = client
            .intercept(ReceiverStream::new(rx))
            .await
            .unwrap()
            .into_inner();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&seen);
        let replier = outbound.clone();
        let task = tokio::spawn(async move {
            let mut replies = replies.into_iter();
            while let Some(Ok(response)) = inbound.next().await {
                let original = response.original.unwrap();
                let message_id = original.message_id.clone();
                recorded.lock().unwrap().push(original);
                if let Some(fault) = replies.next() {
                    replier
                        .send(convert::reply(message_id, fault))
                        .await
                        .unwrap();
                }
            }
        });

        Self {
            outbound,
            seen,
            task,
        }
    }

    fn seen(&self) -> Vec<OriginalMessage> {
        self.seen.lock().unwrap().clone()
    }

    fn disconnect(self) {
        self.task.abort();
        drop(self.outbound);
    }
}

async fn echo_client(addr: SocketAddr) -> EchoClient<tonic::transport::Channel> {
    EchoClient::connect(format!("http://{addr}")).await.unwrap()
}

#[tokio::test]
async fn modifies_unary_request_and_response() {
    let interceptor = interceptor();
    let echo = RecordingEcho::new(&interceptor);
    let addr = serve(recording_router(&interceptor, echo.clone())).await;
    let controller = Controller::connect(
        addr,
        ".*",
        vec![
            payload_fault(&ping("test1"), ok()),
            payload_fault(&pong("test2"), ok()),
        ],
    )
    .await;

    let response = echo_client(addr).await.unary(ping("hello")).await.unwrap();

    assert_eq!(response.into_inner(), pong("test2"));
    assert_eq!(echo.seen(), vec![ping("test1")]);

    let seen = controller.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].method, UNARY_METHOD);
    assert_eq!(seen[0].rpc_id, seen[1].rpc_id);
    assert_ne!(seen[0].message_id, seen[1].message_id);
    let request = seen[0].payload.clone().unwrap();
    assert_eq!(request.type_url, "type.googleapis.com/faultline.demo.v1.Ping");
    assert_eq!(request.value, ping("hello").encode_payload());
}

#[tokio::test]
async fn injects_error_on_unary_request() {
    let interceptor = interceptor();
    let echo = RecordingEcho::new(&interceptor);
    let addr = serve(recording_router(&interceptor, echo.clone())).await;
    let _controller = Controller::connect(
        addr,
        ".*",
        vec![payload_fault(
            &pong("test"),
            Status::internal("error message"),
        )],
    )
    .await;

    let err = echo_client(addr).await.unary(ping("hello")).await.unwrap_err();

    assert_eq!(err.code(), Code::Internal);
    assert_eq!(err.message(), "error message");
    assert!(echo.seen().is_empty());
}

#[tokio::test]
async fn injects_error_on_unary_response() {
    let interceptor = interceptor();
    let echo = RecordingEcho::new(&interceptor);
    let addr = serve(recording_router(&interceptor, echo.clone())).await;
    let _controller = Controller::connect(
        addr,
        ".*",
        vec![
            payload_fault(&ping("test"), ok()),
            payload_fault(&pong("test"), Status::internal("error message")),
        ],
    )
    .await;

    let err = echo_client(addr).await.unary(ping("hello")).await.unwrap_err();

    assert_eq!(err.code(), Code::Internal);
    assert_eq!(err.message(), "error message");
    assert_eq!(echo.seen(), vec![ping("test")]);
}

#[tokio::test]
async fn silent_controller_times_out_to_pass_through() {
    let interceptor = FaultInterceptor::new(
        InterceptorConfig::default().with_reply_timeout(Duration::from_millis(100)),
    );
    let echo = RecordingEcho::new(&interceptor);
    let addr = serve(recording_router(&interceptor, echo.clone())).await;
    let _controller = Controller::connect(addr, "Unary$", Vec::new()).await;

    let response = echo_client(addr).await.unary(ping("hello")).await.unwrap();

    assert_eq!(response.into_inner(), pong("hello"));
    assert_eq!(echo.seen(), vec![ping("hello")]);
    assert_eq!(interceptor.stats().controller_timeouts, 2);
}

#[tokio::test]
async fn unmatched_method_is_not_forwarded() {
    let interceptor = interceptor();
    let echo = RecordingEcho::new(&interceptor);
    let addr = serve(recording_router(&interceptor, echo.clone())).await;
    let controller = Controller::connect(addr, "^/gnoi\\.", Vec::new()).await;

    let response = echo_client(addr).await.unary(ping("hello")).await.unwrap();

    assert_eq!(response.into_inner(), pong("hello"));
    assert!(controller.seen().is_empty());
}

#[tokio::test]
async fn rejects_controller_that_does_not_subscribe_first() {
    let interceptor = interceptor();
    let addr = serve(create_router(&interceptor)).await;
    let mut client = FaultInjectClient::connect(format!("http://{addr}"))
        .await
        .unwrap();

    let first = convert::reply("not-a-subscription", Fault::default());
    let err = client
        .intercept(tokio_stream::iter(vec![first]))
        .await
        .unwrap_err();

    assert_eq!(err.code(), Code::InvalidArgument);
    assert_eq!(interceptor.subscription_count(), 0);
}

#[tokio::test]
async fn rejects_invalid_method_regex() {
    let interceptor = interceptor();
    let addr = serve(create_router(&interceptor)).await;
    let mut client = FaultInjectClient::connect(format!("http://{addr}"))
        .await
        .unwrap();

    let err = client
        .intercept(tokio_stream::iter(vec![convert::subscribe("(")]))
        .await
        .unwrap_err();

    assert_eq!(err.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn disconnect_removes_subscription() {
    let interceptor = interceptor();
    let addr = serve(create_router(&interceptor)).await;
    let controller = Controller::connect(addr, ".*", Vec::new()).await;
    assert_eq!(interceptor.subscription_count(), 1);

    controller.disconnect();
    wait_for(|| interceptor.subscription_count() == 0).await;

    let response = echo_client(addr).await.unary(ping("after")).await.unwrap();
    assert_eq!(response.into_inner(), pong("after"));
}

#[tokio::test]
async fn preloaded_faults_apply_over_the_wire() {
    let interceptor = interceptor();
    interceptor
        .configure_faults(
            UNARY_METHOD,
            vec![Fault::error(Code::PermissionDenied, "First failure")],
        )
        .unwrap();
    let addr = serve(create_router(&interceptor)).await;
    let mut client = echo_client(addr).await;

    let err = client.unary(ping("hello")).await.unwrap_err();
    assert_eq!(err.code(), Code::PermissionDenied);
    assert_eq!(err.message(), "First failure");

    let response = client.unary(ping("hello")).await.unwrap();
    assert_eq!(response.into_inner(), pong("hello"));
}

#[tokio::test]
async fn rewrites_bidirectional_stream() {
    let interceptor = interceptor();
    let addr = serve(create_router(&interceptor)).await;
    let controller = Controller::connect(
        addr,
        "Chat$",
        vec![
            payload_fault(&ping("rewritten"), ok()),
            payload_fault(&pong("rewritten!"), ok()),
        ],
    )
    .await;

    let responses = echo_client(addr)
        .await
        .chat(tokio_stream::iter(vec![ping("original")]))
        .await
        .unwrap()
        .into_inner();
    let received: Vec<Pong> = responses.map(Result::unwrap).collect().await;

    assert_eq!(received, vec![pong("rewritten!")]);

    let seen = controller.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].payload.clone().unwrap().value, ping("original").encode_payload());
    assert_eq!(seen[1].payload.clone().unwrap().value, pong("rewritten").encode_payload());
}
