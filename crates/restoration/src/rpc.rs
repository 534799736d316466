use crate::Service;
use common::Context;
use proto_alioth::alioth_restoration_server::AliothRestoration;
use proto_alioth::{RestorationCollectionRequest, RestorationCollectionResponse};
use std::sync::Arc;

/// Binds the collector service to the binary RPC transport.
pub struct RpcServer {
    service: Arc<Service>,
}

impl RpcServer {
    pub fn new(service: Arc<Service>) -> Self {
        Self { service }
    }
}

#[tonic::async_trait]
impl AliothRestoration for RpcServer {
    async fn restoration_collection(
        &self,
        request: tonic::Request<RestorationCollectionRequest>,
    ) -> Result<tonic::Response<RestorationCollectionResponse>, tonic::Status> {
        let ctx = Context::new()
            .with_peer_opt(request.remote_addr())
            .attach();
        self.service
            .collect_internal(&ctx, request.into_inner())
            .await;
        Ok(tonic::Response::new(RestorationCollectionResponse {}))
    }
}
