//! Typed adapters between tonic handlers and the interceptor
//!
//! tonic hands services concrete request and response types, while the
//! interceptor works on type-erased messages. These helpers erase on the way in
//! and recover the concrete type on the way out, re-decoding from wire bytes
//! when a fault swapped the message for another type.
//!
//! Interception is opt-in per handler: a tonic service is only observed by the
//! interceptor for the calls it routes through [`unary`] or [`streaming`].
//! Registering a service with `create_router` alone does not intercept it.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;

use application::codec::{self, DynMessage, ProtoMessage};
use application::{BoxMessageStream, FaultInterceptor, MessageStream, MethodInfo};
use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::debug;

/// Buffer between a streaming handler and the response body
const STREAM_BUFFER: usize = 16;

fn codec_status(err: &codec::CodecError) -> Status {
    Status::internal(err.to_string())
}

/// Run a unary tonic handler through the interceptor
///
/// `method` is the full method path, e.g. `/gnoi.system.System/Reboot`.
/// Request metadata and extensions reach the handler unchanged.
pub async fn unary<Req, Resp, F, Fut>(
    interceptor: &FaultInterceptor,
    method: &str,
    request: Request<Req>,
    handler: F,
) -> Result<Response<Resp>, Status>
where
    Req: prost::Message + prost::Name + Default + 'static,
    Resp: prost::Message + prost::Name + Default + 'static,
    F: FnOnce(Request<Req>) -> Fut + Send,
    Fut: Future<Output = Result<Response<Resp>, Status>> + Send,
{
    let (metadata, extensions, message) = request.into_parts();
    let info = MethodInfo::new(method).with_response_prototype(Box::new(Resp::default()));

    let response = interceptor
        .intercept_unary(info, Box::new(message), |request| async move {
            let request = codec::into_typed::<Req>(request).map_err(|e| codec_status(&e))?;
            let response = handler(Request::from_parts(metadata, extensions, request)).await?;
            Ok(Box::new(response.into_inner()) as DynMessage)
        })
        .await?;

    let response = codec::into_typed::<Resp>(response).map_err(|e| codec_status(&e))?;
    Ok(Response::new(response))
}

/// Run a streaming tonic handler through the interceptor
///
/// The handler runs on its own task; its result ends the returned stream, with
/// an error becoming the stream's final item.
pub fn streaming<In, Out, S, F, Fut>(
    interceptor: &FaultInterceptor,
    method: &str,
    inbound: S,
    handler: F,
) -> ReceiverStream<Result<Out, Status>>
where
    In: prost::Message + Default + 'static,
    Out: prost::Message + Default + 'static,
    S: Stream<Item = Result<In, Status>> + Send + 'static,
    F: FnOnce(BoxMessageStream) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), Status>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let interceptor = interceptor.clone();
    let method = method.to_string();
    let stream = TonicServerStream::new(inbound, tx.clone());

    tokio::spawn(async move {
        let result = interceptor
            .intercept_stream(&method, Box::new(stream), handler)
            .await;
        if let Err(status) = result {
            debug!(method = %method, code = ?status.code(), "Stream handler failed");
            // The receiver may already be gone.
            let _ = tx.send(Err(status)).await;
        }
    });

    ReceiverStream::new(rx)
}

/// A tonic server stream seen as a [`MessageStream`]
///
/// Inbound items come from any stream of `In`, typically a
/// [`tonic::Streaming`]; outbound messages are decoded as `Out` and pushed into
/// the channel that backs the response body.
pub struct TonicServerStream<In, Out> {
    inbound: BoxStream<'static, Result<In, Status>>,
    outbound: mpsc::Sender<Result<Out, Status>>,
    _marker: PhantomData<fn() -> Out>,
}

impl<In, Out> fmt::Debug for TonicServerStream<In, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TonicServerStream")
            .field("outbound_closed", &self.outbound.is_closed())
            .finish_non_exhaustive()
    }
}

impl<In, Out> TonicServerStream<In, Out>
where
    In: 'static,
{
    pub fn new<S>(inbound: S, outbound: mpsc::Sender<Result<Out, Status>>) -> Self
    where
        S: Stream<Item = Result<In, Status>> + Send + 'static,
    {
        Self {
            inbound: inbound.boxed(),
            outbound,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<In, Out> MessageStream for TonicServerStream<In, Out>
where
    In: prost::Message + Default + 'static,
    Out: prost::Message + Default + 'static,
{
    async fn recv_msg(&mut self, message: &mut dyn ProtoMessage) -> Result<bool, Status> {
        let Some(item) = self.inbound.next().await else {
            return Ok(false);
        };
        let item = item?;
        message.clear_payload();
        message
            .merge_payload(&item.encode_to_vec())
            .map_err(|e| Status::internal(e.to_string()))?;
        Ok(true)
    }

    async fn send_msg(&mut self, message: &dyn ProtoMessage) -> Result<(), Status> {
        let out = Out::decode(message.encode_payload().as_slice())
            .map_err(|e| Status::internal(e.to_string()))?;
        self.outbound
            .send(Ok(out))
            .await
            .map_err(|_| Status::cancelled("client went away"))
    }
}

#[cfg(test)]
mod tests {
    use application::{CONTROLLER_METHOD, Fault, InterceptorConfig};
    use tonic::Code;

    use super::*;
    use crate::proto::demo::{Ping, Pong};

    const METHOD: &str = "/faultline.demo.v1.Echo/Unary";

    async fn echo(request: Request<Ping>) -> Result<Response<Pong>, Status> {
        Ok(Response::new(Pong {
            msg: request.into_inner().msg,
        }))
    }

    fn ping(msg: &str) -> Ping {
        Ping {
            msg: msg.to_string(),
        }
    }

    #[tokio::test]
    async fn unary_passes_through_without_subscription() {
        let interceptor = FaultInterceptor::default();
        let response = unary(&interceptor, METHOD, Request::new(ping("hello")), echo)
            .await
            .unwrap();
        assert_eq!(response.into_inner().msg, "hello");
    }

    #[tokio::test]
    async fn unary_keeps_request_metadata() {
        let interceptor = FaultInterceptor::default();
        let mut request = Request::new(ping("hello"));
        request
            .metadata_mut()
            .insert("x-trace", "abc".parse().unwrap());

        let response = unary(&interceptor, METHOD, request, |req: Request<Ping>| async move {
            let trace = req
                .metadata()
                .get("x-trace")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            Ok(Response::new(Pong { msg: trace }))
        })
        .await
        .unwrap();
        assert_eq!(response.into_inner().msg, "abc");
    }

    #[tokio::test]
    async fn preloaded_error_reaches_tonic_caller() {
        let interceptor = FaultInterceptor::default();
        interceptor
            .configure_faults(METHOD, vec![Fault::error(Code::Unavailable, "down")])
            .unwrap();

        let err = unary(&interceptor, METHOD, Request::new(ping("hello")), echo)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
        assert_eq!(err.message(), "down");
    }

    #[tokio::test]
    async fn only_adapted_calls_are_observed() {
        let interceptor = FaultInterceptor::default();
        interceptor
            .configure_faults(METHOD, vec![Fault::error(Code::Unavailable, "down")])
            .unwrap();

        let direct = echo(Request::new(ping("direct"))).await.unwrap();
        assert_eq!(direct.into_inner().msg, "direct");
        assert_eq!(interceptor.stats().rpcs_observed, 0);
        assert_eq!(interceptor.queued_faults(METHOD), 1);

        let err = unary(&interceptor, METHOD, Request::new(ping("adapted")), echo)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
        assert_eq!(interceptor.stats().rpcs_observed, 1);
        assert_eq!(interceptor.queued_faults(METHOD), 0);
    }

    #[tokio::test]
    async fn preloaded_payload_is_reread_as_response_type() {
        let interceptor = FaultInterceptor::default();
        let payload = codec::wrap(&ping("canned")).unwrap();
        interceptor
            .configure_faults(METHOD, vec![Fault::with_payload(payload)])
            .unwrap();

        let response = unary(&interceptor, METHOD, Request::new(ping("hello")), |_| async {
            Err::<Response<Pong>, _>(Status::internal("handler must not run"))
        })
        .await
        .unwrap();
        assert_eq!(response.into_inner().msg, "canned");
    }

    #[tokio::test]
    async fn streaming_echoes_without_subscription() {
        let interceptor = FaultInterceptor::new(InterceptorConfig::default());
        let inbound = futures::stream::iter(vec![Ok(ping("a")), Ok(ping("b"))]);

        let outbound = streaming::<Ping, Pong, _, _, _>(
            &interceptor,
            "/faultline.demo.v1.Echo/Chat",
            inbound,
            |mut stream| async move {
                loop {
                    let mut ping = Ping::default();
                    if !stream.recv_msg(&mut ping).await? {
                        return Ok(());
                    }
                    stream.send_msg(&Pong { msg: ping.msg }).await?;
                }
            },
        );

        let received: Vec<String> = outbound
            .map(|item| item.unwrap().msg)
            .collect()
            .await;
        assert_eq!(received, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn streaming_surfaces_handler_error_as_last_item() {
        let interceptor = FaultInterceptor::default();
        let inbound = futures::stream::iter(Vec::<Result<Ping, Status>>::new());

        let outbound = streaming::<Ping, Pong, _, _, _>(
            &interceptor,
            CONTROLLER_METHOD,
            inbound,
            |_| async { Err(Status::failed_precondition("nope")) },
        );

        let items: Vec<Result<Pong, Status>> = outbound.collect().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap_err().code(), Code::FailedPrecondition);
    }

    #[tokio::test]
    async fn inbound_error_is_returned_from_recv() {
        let (tx, _rx) = mpsc::channel::<Result<Pong, Status>>(1);
        let inbound = futures::stream::iter(vec![Err::<Ping, _>(Status::data_loss("torn"))]);
        let mut stream = TonicServerStream::new(inbound, tx);

        let mut ping = Ping::default();
        let err = stream.recv_msg(&mut ping).await.unwrap_err();
        assert_eq!(err.code(), Code::DataLoss);
    }

    #[tokio::test]
    async fn send_after_client_left_is_cancelled() {
        let (tx, rx) = mpsc::channel::<Result<Pong, Status>>(1);
        drop(rx);
        let mut stream = TonicServerStream::new(futures::stream::empty::<Result<Ping, Status>>(), tx);

        let err = stream.send_msg(&ping("late")).await.unwrap_err();
        assert_eq!(err.code(), Code::Cancelled);
    }
}
