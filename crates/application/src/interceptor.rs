//! Interceptor core
//!
//! [`FaultInterceptor`] owns the pending-reply registry, the subscription
//! table and the preloaded fault queues. Hosts call
//! [`intercept_unary`](FaultInterceptor::intercept_unary) or
//! [`intercept_stream`](FaultInterceptor::intercept_stream) around their
//! handlers; controllers attach through
//! [`open_session`](FaultInterceptor::open_session).

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use domain::{MessageId, RpcId};
use tonic::{Code, Status};
use tracing::{debug, instrument, warn};

use crate::codec::{self, DynMessage, ProtoMessage};
use crate::error::ApplicationError;
use crate::fault::Fault;
use crate::fault_queue::FaultQueues;
use crate::pending::PendingReplies;
use crate::stats::{InterceptorStats, StatsSnapshot};
use crate::subscriptions::{Interception, Subscription, SubscriptionTable};

/// Full method name of the controller's own `Intercept` stream
pub const CONTROLLER_METHOD: &str = "/faultinject.v1.FaultInject/Intercept";

/// Default time to wait for a controller reply
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(1);

/// Default number of interceptions buffered per controller
pub const DEFAULT_SUBSCRIPTION_BUFFER: usize = 64;

/// Interceptor tuning
#[derive(Debug, Clone)]
pub struct InterceptorConfig {
    /// Upper bound on one controller round trip, including the channel push
    pub reply_timeout: Duration,
    /// Capacity of each controller's outbound queue
    pub subscription_buffer: usize,
    /// Method that is never intercepted
    pub controller_method: String,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            subscription_buffer: DEFAULT_SUBSCRIPTION_BUFFER,
            controller_method: CONTROLLER_METHOD.to_string(),
        }
    }
}

impl InterceptorConfig {
    #[must_use]
    pub const fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    #[must_use]
    pub const fn with_subscription_buffer(mut self, buffer: usize) -> Self {
        self.subscription_buffer = buffer;
        self
    }
}

/// What the interceptor knows about the method being called
pub struct MethodInfo {
    pub full_method: String,
    /// Empty response used to carry a handler error to the controller
    pub response_prototype: Option<DynMessage>,
}

impl MethodInfo {
    #[must_use]
    pub fn new(full_method: impl Into<String>) -> Self {
        Self {
            full_method: full_method.into(),
            response_prototype: None,
        }
    }

    #[must_use]
    pub fn with_response_prototype(mut self, prototype: DynMessage) -> Self {
        self.response_prototype = Some(prototype);
        self
    }
}

impl fmt::Debug for MethodInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodInfo")
            .field("full_method", &self.full_method)
            .field(
                "response_type",
                &self
                    .response_prototype
                    .as_ref()
                    .and_then(|p| p.full_name()),
            )
            .finish()
    }
}

/// Identity of one intercepted call
#[derive(Debug, Clone)]
pub struct RpcContext {
    pub rpc_id: RpcId,
    pub method: String,
}

impl RpcContext {
    #[must_use]
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            rpc_id: RpcId::new(),
            method: method.into(),
        }
    }
}

/// Why a round trip fell back to the original message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PassThrough {
    NotWrappable,
    ControllerGone,
    Timeout,
    DecodeFailed,
}

impl PassThrough {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::NotWrappable => "not_wrappable",
            Self::ControllerGone => "controller_gone",
            Self::Timeout => "timeout",
            Self::DecodeFailed => "decode_failed",
        }
    }
}

#[derive(Debug)]
pub(crate) struct Inner {
    pub(crate) config: InterceptorConfig,
    pub(crate) pending: PendingReplies,
    pub(crate) subscriptions: SubscriptionTable,
    pub(crate) queues: FaultQueues,
    pub(crate) stats: InterceptorStats,
}

/// Shared handle to the interceptor state
#[derive(Debug, Clone)]
pub struct FaultInterceptor {
    pub(crate) inner: Arc<Inner>,
}

impl Default for FaultInterceptor {
    fn default() -> Self {
        Self::new(InterceptorConfig::default())
    }
}

impl FaultInterceptor {
    #[must_use]
    pub fn new(config: InterceptorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                pending: PendingReplies::new(),
                subscriptions: SubscriptionTable::new(),
                queues: FaultQueues::new(),
                stats: InterceptorStats::new(),
            }),
        }
    }

    /// Build an interceptor with fault queues already in place
    pub fn with_preloaded(
        config: InterceptorConfig,
        faults: HashMap<String, Vec<Fault>>,
    ) -> Result<Self, ApplicationError> {
        let interceptor = Self::new(config);
        for (method, queue) in faults {
            interceptor.configure_faults(&method, queue)?;
        }
        Ok(interceptor)
    }

    /// Replace the preloaded queue for `method`
    pub fn configure_faults(&self, method: &str, faults: Vec<Fault>) -> Result<(), ApplicationError> {
        let count = faults.len();
        self.inner.queues.configure(method, faults)?;
        debug!(method, count, "Configured preloaded faults");
        Ok(())
    }

    #[must_use]
    pub fn config(&self) -> &InterceptorConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.len()
    }

    #[must_use]
    pub fn pending_replies(&self) -> usize {
        self.inner.pending.len()
    }

    #[must_use]
    pub fn queued_faults(&self, method: &str) -> usize {
        self.inner.queues.pending(method)
    }

    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub(crate) fn is_controller_method(&self, method: &str) -> bool {
        method == self.inner.config.controller_method
    }

    /// Run a unary handler under fault injection
    ///
    /// Preloaded faults win over controllers. Otherwise the first matching
    /// controller sees the request before the handler runs and the response
    /// (or handler error) after it. Any failure to reach a controller lets the
    /// call proceed as if it had not been intercepted.
    pub async fn intercept_unary<F, Fut>(
        &self,
        method: MethodInfo,
        request: DynMessage,
        handler: F,
    ) -> Result<DynMessage, Status>
    where
        F: FnOnce(DynMessage) -> Fut + Send,
        Fut: Future<Output = Result<DynMessage, Status>> + Send,
    {
        let ctx = RpcContext::new(method.full_method.clone());
        self.run_unary(ctx, method, request, handler).await
    }

    #[instrument(skip_all, fields(rpc_id = %ctx.rpc_id, method = %ctx.method))]
    async fn run_unary<F, Fut>(
        &self,
        ctx: RpcContext,
        method: MethodInfo,
        request: DynMessage,
        handler: F,
    ) -> Result<DynMessage, Status>
    where
        F: FnOnce(DynMessage) -> Fut + Send,
        Fut: Future<Output = Result<DynMessage, Status>> + Send,
    {
        if self.is_controller_method(&ctx.method) {
            return handler(request).await;
        }
        self.inner.stats.rpc_observed();

        if let Some(fault) = self.inner.queues.next(&ctx.method) {
            self.inner.stats.preloaded_fault_served();
            return Self::apply_preloaded(fault, request);
        }

        let Some(subscription) = self.inner.subscriptions.match_first(&ctx.method) else {
            return handler(request).await;
        };
        self.inner.stats.rpc_intercepted();

        let (request, status) = self
            .exchange(&ctx, &subscription, request, Status::new(Code::Ok, ""))
            .await;
        if status.code() != Code::Ok {
            debug!(code = ?status.code(), "Request failed by controller");
            return Err(status);
        }

        let (response, status) = match handler(request).await {
            Ok(response) => (response, Status::new(Code::Ok, "")),
            Err(status) => match &method.response_prototype {
                Some(prototype) => (prototype.new_instance(), status),
                None => return Err(status),
            },
        };

        let (response, status) = self.exchange(&ctx, &subscription, response, status).await;
        if status.code() == Code::Ok {
            Ok(response)
        } else {
            Err(status)
        }
    }

    fn apply_preloaded(fault: Fault, request: DynMessage) -> Result<DynMessage, Status> {
        let (payload, status) = fault.into_parts();
        if status.code() != Code::Ok {
            debug!(code = ?status.code(), "Serving preloaded error");
            return Err(status);
        }
        let Some(payload) = payload else {
            return Ok(request);
        };
        match codec::unwrap(&payload, &*request) {
            Ok(replacement) => Ok(replacement),
            Err(e) => {
                warn!(error = %e, "Preloaded payload does not decode, returning request");
                Ok(request)
            }
        }
    }

    /// Round trip `message` and apply the reply, falling back to the original
    async fn exchange(
        &self,
        ctx: &RpcContext,
        subscription: &Subscription,
        message: DynMessage,
        status: Status,
    ) -> (DynMessage, Status) {
        let fault = match self.consult(ctx, subscription, &*message, &status).await {
            Ok(fault) => fault,
            Err(reason) => {
                self.inner.stats.pass_through(reason.as_str());
                return (message, status);
            }
        };
        let (payload, reply_status) = fault.into_parts();
        // An injected error wins; its payload is never decoded.
        if reply_status.code() != Code::Ok {
            return (message, reply_status);
        }
        // A bare acknowledgement leaves both message and status untouched.
        let Some(payload) = payload else {
            return (message, status);
        };
        match codec::unwrap(&payload, &*message) {
            Ok(replacement) => (replacement, reply_status),
            Err(e) => {
                warn!(error = %e, "Controller payload does not decode, passing through");
                self.inner.stats.pass_through(PassThrough::DecodeFailed.as_str());
                (message, status)
            }
        }
    }

    /// Forward one message to a controller and wait for its decision
    pub(crate) async fn consult(
        &self,
        ctx: &RpcContext,
        subscription: &Subscription,
        message: &dyn ProtoMessage,
        status: &Status,
    ) -> Result<Fault, PassThrough> {
        let Ok(payload) = codec::wrap(message) else {
            debug!("Payload is not self-describing, passing through");
            return Err(PassThrough::NotWrappable);
        };
        let message_id = MessageId::new();
        let reply = self.inner.pending.register(message_id);
        let interception = Interception {
            rpc_id: ctx.rpc_id,
            message_id,
            method: ctx.method.clone(),
            payload,
            status: status.clone(),
        };
        self.inner.stats.round_trip();
        debug!(%message_id, subscription_id = %subscription.id(), "Forwarding message to controller");

        let outcome = tokio::time::timeout(self.inner.config.reply_timeout, async {
            subscription
                .forward(interception)
                .await
                .map_err(|_| PassThrough::ControllerGone)?;
            reply.await.map_err(|_| PassThrough::ControllerGone)
        })
        .await;
        self.inner.pending.cancel(&message_id);

        if let Ok(result) = outcome {
            result
        } else {
            self.inner.stats.controller_timeout();
            warn!(
                %message_id,
                timeout = ?self.inner.config.reply_timeout,
                "Controller did not reply in time"
            );
            Err(PassThrough::Timeout)
        }
    }
}
