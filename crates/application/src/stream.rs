//! Stream interception
//!
//! Streams are intercepted message by message: every received and every sent
//! element makes its own controller round trip.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tonic::{Code, Status};
use tracing::{Instrument, debug, info_span, warn};

use crate::codec::{self, ProtoMessage};
use crate::fault::ok_status;
use crate::interceptor::{FaultInterceptor, PassThrough, RpcContext};
use crate::ports::{BoxMessageStream, MessageStream};
use crate::subscriptions::Subscription;

impl FaultInterceptor {
    /// Run a stream handler under fault injection
    ///
    /// The controller's own method and streams without a matching subscription
    /// reach the handler untouched. Preloaded faults apply to unary calls only.
    pub async fn intercept_stream<F, Fut>(
        &self,
        method: &str,
        stream: BoxMessageStream,
        handler: F,
    ) -> Result<(), Status>
    where
        F: FnOnce(BoxMessageStream) -> Fut + Send,
        Fut: Future<Output = Result<(), Status>> + Send,
    {
        if self.is_controller_method(method) {
            return handler(stream).await;
        }
        self.inner.stats.rpc_observed();

        let Some(subscription) = self.inner.subscriptions.match_first(method) else {
            return handler(stream).await;
        };
        self.inner.stats.rpc_intercepted();

        let ctx = RpcContext::new(method);
        let span = info_span!("intercept_stream", rpc_id = %ctx.rpc_id, method = %ctx.method);
        let wrapped = InterceptedStream {
            interceptor: self.clone(),
            ctx,
            subscription,
            inner: stream,
        };
        handler(Box::new(wrapped)).instrument(span).await
    }
}

/// Stream wrapper that consults a controller for each message
pub(crate) struct InterceptedStream {
    interceptor: FaultInterceptor,
    ctx: RpcContext,
    subscription: Arc<Subscription>,
    inner: BoxMessageStream,
}

impl std::fmt::Debug for InterceptedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptedStream")
            .field("ctx", &self.ctx)
            .field("subscription", &self.subscription.id())
            .finish_non_exhaustive()
    }
}

impl InterceptedStream {
    fn pass_through(&self, reason: PassThrough) {
        self.interceptor.inner.stats.pass_through(reason.as_str());
    }
}

fn into_result(status: Status) -> Result<(), Status> {
    if status.code() == Code::Ok {
        Ok(())
    } else {
        Err(status)
    }
}

#[async_trait]
impl MessageStream for InterceptedStream {
    async fn recv_msg(&mut self, message: &mut dyn ProtoMessage) -> Result<bool, Status> {
        let status = match self.inner.recv_msg(message).await {
            Ok(false) => return Ok(false),
            Ok(true) => ok_status(),
            Err(status) => status,
        };

        let fault = match self
            .interceptor
            .consult(&self.ctx, &self.subscription, &*message, &status)
            .await
        {
            Ok(fault) => fault,
            Err(reason) => {
                self.pass_through(reason);
                return into_result(status).map(|()| true);
            }
        };

        let (payload, reply_status) = fault.into_parts();
        if reply_status.code() != Code::Ok {
            debug!(code = ?reply_status.code(), "Receive failed by controller");
            return Err(reply_status);
        }
        let Some(payload) = payload else {
            return into_result(status).map(|()| true);
        };
        if let Err(e) = codec::merge_into(&payload, message) {
            warn!(error = %e, "Controller payload does not decode, passing through");
            self.pass_through(PassThrough::DecodeFailed);
            return into_result(status).map(|()| true);
        }
        Ok(true)
    }

    async fn send_msg(&mut self, message: &dyn ProtoMessage) -> Result<(), Status> {
        let fault = match self
            .interceptor
            .consult(&self.ctx, &self.subscription, message, &ok_status())
            .await
        {
            Ok(fault) => fault,
            Err(reason) => {
                self.pass_through(reason);
                return self.inner.send_msg(message).await;
            }
        };

        let (payload, status) = fault.into_parts();
        if status.code() != Code::Ok {
            debug!(code = ?status.code(), "Send suppressed by controller");
            return Err(status);
        }
        let Some(payload) = payload else {
            return self.inner.send_msg(message).await;
        };
        match codec::unwrap(&payload, message) {
            Ok(replacement) => self.inner.send_msg(&*replacement).await,
            Err(e) => {
                warn!(error = %e, "Controller payload does not decode, passing through");
                self.pass_through(PassThrough::DecodeFailed);
                self.inner.send_msg(message).await
            }
        }
    }
}
