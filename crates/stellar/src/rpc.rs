use crate::service::Stellar;
use crate::store::InstanceStore;
use common::{Context, Error};
use proto_alioth::alioth_stellar_server::AliothStellar;
use proto_alioth::{
    ServiceDiscoveryRequest, ServiceDiscoveryResponse, ServiceListRequest, ServiceListResponse,
    ServiceRegistrationRequest, ServiceRegistrationResponse, ServiceUnmountRequest,
    ServiceUnmountResponse,
};
use std::sync::Arc;

/// Binds the registry service to the binary RPC transport.
pub struct RpcServer<S> {
    service: Arc<Stellar<S>>,
}

impl<S> RpcServer<S> {
    pub fn new(service: Arc<Stellar<S>>) -> Self {
        Self { service }
    }
}

fn status_of(err: Error) -> tonic::Status {
    let message = err.to_string();
    match err {
        Error::InvalidVersion { .. } => tonic::Status::invalid_argument(message),
        Error::NoAvailableInstance { .. } | Error::NoAvailableService { .. } => {
            tonic::Status::not_found(message)
        }
        Error::InstanceOutOfMaxNumber { .. } => tonic::Status::resource_exhausted(message),
        Error::GetRpcClientIpFailed
        | Error::UnsupportedNetwork { .. }
        | Error::InvalidIpAddress { .. } => tonic::Status::failed_precondition(message),
        _ => tonic::Status::internal(message),
    }
}

#[tonic::async_trait]
impl<S: InstanceStore> AliothStellar for RpcServer<S> {
    async fn service_registration(
        &self,
        request: tonic::Request<ServiceRegistrationRequest>,
    ) -> Result<tonic::Response<ServiceRegistrationResponse>, tonic::Status> {
        let ctx = Context::new()
            .with_peer_opt(request.remote_addr())
            .attach();
        let client_ip = ctx.client_ip().map_err(status_of)?;

        let response = self
            .service
            .register(&ctx, request.get_ref(), &client_ip)
            .await
            .map_err(status_of)?;
        Ok(tonic::Response::new(response))
    }

    async fn service_discovery(
        &self,
        request: tonic::Request<ServiceDiscoveryRequest>,
    ) -> Result<tonic::Response<ServiceDiscoveryResponse>, tonic::Status> {
        let ctx = Context::new()
            .with_peer_opt(request.remote_addr())
            .attach();
        let response = self
            .service
            .discover(&ctx, request.get_ref())
            .await
            .map_err(status_of)?;
        Ok(tonic::Response::new(response))
    }

    async fn service_unmount(
        &self,
        request: tonic::Request<ServiceUnmountRequest>,
    ) -> Result<tonic::Response<ServiceUnmountResponse>, tonic::Status> {
        let ctx = Context::new()
            .with_peer_opt(request.remote_addr())
            .attach();
        let response = self
            .service
            .unmount(&ctx, request.get_ref())
            .await
            .map_err(status_of)?;
        Ok(tonic::Response::new(response))
    }

    async fn service_list(
        &self,
        request: tonic::Request<ServiceListRequest>,
    ) -> Result<tonic::Response<ServiceListResponse>, tonic::Status> {
        let ctx = Context::new()
            .with_peer_opt(request.remote_addr())
            .attach();
        let response = self
            .service
            .list(&ctx, request.get_ref())
            .await
            .map_err(status_of)?;
        Ok(tonic::Response::new(response))
    }
}
