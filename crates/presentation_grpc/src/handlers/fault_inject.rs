//! `faultinject.v1.FaultInject` service

use application::FaultInterceptor;
use futures::stream::{BoxStream, StreamExt};
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, instrument};

use crate::convert::controller_message;
use crate::proto::faultinject::{
    InterceptRequest, InterceptResponse, fault_inject_server::FaultInject,
};

/// Serves controller sessions for one interceptor
#[derive(Debug, Clone)]
pub struct FaultInjectService {
    interceptor: FaultInterceptor,
}

impl FaultInjectService {
    pub const fn new(interceptor: FaultInterceptor) -> Self {
        Self { interceptor }
    }
}

#[tonic::async_trait]
impl FaultInject for FaultInjectService {
    type InterceptStream = BoxStream<'static, Result<InterceptResponse, Status>>;

    #[instrument(skip_all, fields(remote = ?request.remote_addr()))]
    async fn intercept(
        &self,
        request: Request<Streaming<InterceptRequest>>,
    ) -> Result<Response<Self::InterceptStream>, Status> {
        let inbound = request
            .into_inner()
            .map(|item| item.map(controller_message));

        let session = self.interceptor.open_session(inbound).await.map_err(|e| {
            debug!(error = %e, "Rejecting controller stream");
            Status::from(e)
        })?;

        let outbound = session
            .into_outbound()
            .map(|interception| Ok(InterceptResponse::from(interception)))
            .boxed();
        Ok(Response::new(outbound))
    }
}
