//! Service registration

use application::FaultInterceptor;
use tonic::transport::{Server, server::Router};

use crate::handlers::{EchoService, FaultInjectService};
use crate::proto::demo::echo_server::EchoServer;
use crate::proto::faultinject::fault_inject_server::FaultInjectServer;

/// Build the router serving the controller service and the demo echo service
pub fn create_router(interceptor: &FaultInterceptor) -> Router {
    Server::builder()
        .add_service(FaultInjectServer::new(FaultInjectService::new(
            interceptor.clone(),
        )))
        .add_service(EchoServer::new(EchoService::new(interceptor.clone())))
}
