//! Controller sessions
//!
//! A controller opens one bidirectional stream. Its first message picks the
//! methods it wants to see; after that the interceptor pushes intercepted
//! messages out and the controller sends fault decisions back, matched by
//! message id.

use std::fmt;

use domain::{MessageId, SubscriptionId};
use futures::stream::{BoxStream, Stream, StreamExt};
use tokio::sync::watch;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Status;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::error::ApplicationError;
use crate::fault::Fault;
use crate::interceptor::FaultInterceptor;
use crate::subscriptions::Interception;

/// Message received from a controller
#[derive(Debug, Clone)]
pub enum ControllerMessage {
    /// Declare interest in methods matching a regular expression
    Subscribe { method_regex: String },
    /// Decision for a previously forwarded message
    Fault { message_id: String, fault: Fault },
    /// Anything the wire layer could not classify
    Unrecognized,
}

impl ControllerMessage {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Subscribe { .. } => "subscription",
            Self::Fault { .. } => "fault",
            Self::Unrecognized => "unrecognized",
        }
    }
}

/// Lifecycle of a controller session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Stream open, subscription not yet received
    AwaitingFilter,
    /// Subscription registered, interceptions flowing
    Active,
    /// Subscription removed; terminal
    Closed,
}

/// An established controller session
pub struct ControllerSession {
    subscription_id: SubscriptionId,
    state: watch::Receiver<SessionState>,
    outbound: BoxStream<'static, Interception>,
}

impl fmt::Debug for ControllerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerSession")
            .field("subscription_id", &self.subscription_id)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl ControllerSession {
    #[must_use]
    pub const fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch for state changes
    ///
    /// A live receiver keeps the session open until the controller's inbound
    /// side ends.
    #[must_use]
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Next interception to send to the controller; `None` once closed
    pub async fn next_interception(&mut self) -> Option<Interception> {
        self.outbound.next().await
    }

    /// Stream of interceptions for the transport to write out
    ///
    /// Dropping the stream ends the session.
    pub fn into_outbound(self) -> BoxStream<'static, Interception> {
        self.outbound
    }
}

impl FaultInterceptor {
    /// Establish a controller session from its inbound message stream
    ///
    /// Waits for the subscription, registers it and spawns the task that
    /// routes fault replies. The session closes when the inbound stream ends
    /// or fails, or when the outbound side is dropped.
    pub async fn open_session<S>(&self, mut inbound: S) -> Result<ControllerSession, ApplicationError>
    where
        S: Stream<Item = Result<ControllerMessage, Status>> + Send + Unpin + 'static,
    {
        let (state_tx, state_rx) = watch::channel(SessionState::AwaitingFilter);

        let method_regex = match inbound.next().await {
            Some(Ok(ControllerMessage::Subscribe { method_regex })) => method_regex,
            Some(Ok(other)) => {
                return Err(ApplicationError::invalid_argument(format!(
                    "first controller message must be a subscription, got {}",
                    other.kind()
                )));
            }
            Some(Err(status)) => {
                return Err(ApplicationError::ControllerDisconnected(
                    status.message().to_string(),
                ));
            }
            None => {
                return Err(ApplicationError::invalid_argument(
                    "controller stream ended before subscribing",
                ));
            }
        };

        let (subscription, receiver) = self
            .inner
            .subscriptions
            .add(&method_regex, self.inner.config.subscription_buffer)?;
        let subscription_id = subscription.id();
        drop(subscription);

        state_tx.send_replace(SessionState::Active);
        self.inner.stats.session_opened();
        info!(%subscription_id, method_regex = %method_regex, "Controller subscribed");

        let interceptor = self.clone();
        let span = info_span!("controller_session", %subscription_id);
        tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        item = inbound.next() => match item {
                            Some(Ok(ControllerMessage::Fault { message_id, fault })) => {
                                interceptor.deliver_reply(&message_id, fault);
                            }
                            Some(Ok(ControllerMessage::Subscribe { method_regex })) => {
                                warn!(method_regex = %method_regex, "Ignoring repeated subscription");
                            }
                            Some(Ok(ControllerMessage::Unrecognized)) => {
                                debug!("Ignoring unrecognized controller message");
                            }
                            Some(Err(status)) => {
                                debug!(code = ?status.code(), reason = status.message(), "Controller stream failed");
                                break;
                            }
                            None => break,
                        },
                        () = state_tx.closed() => {
                            debug!("Outbound side dropped");
                            break;
                        }
                    }
                }
                interceptor.inner.subscriptions.remove(subscription_id);
                interceptor.inner.stats.session_closed();
                state_tx.send_replace(SessionState::Closed);
                info!("Controller session closed");
            }
            .instrument(span),
        );

        let mut closed_rx = state_rx.clone();
        let closed = async move {
            loop {
                let current = *closed_rx.borrow_and_update();
                if current == SessionState::Closed || closed_rx.changed().await.is_err() {
                    break;
                }
            }
        };
        let outbound = ReceiverStream::new(receiver).take_until(closed).boxed();

        Ok(ControllerSession {
            subscription_id,
            state: state_rx,
            outbound,
        })
    }

    fn deliver_reply(&self, message_id: &str, fault: Fault) {
        let Ok(id) = message_id.parse::<MessageId>() else {
            debug!(message_id, "Dropping reply with malformed message id");
            self.inner.stats.reply(false);
            return;
        };
        let delivered = self.inner.pending.deliver(&id, fault);
        self.inner.stats.reply(delivered);
        if !delivered {
            debug!(message_id = %id, "Dropping reply for unknown or expired message");
        }
    }
}
