use crate::Service;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use common::Context;
use proto_alioth::RestorationCollectionRequest;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

/// Routes of the collector's HTTP surface, mounted by the server under
/// its external prefix.
pub fn router(service: Arc<Service>) -> axum::Router {
    axum::Router::new()
        .route("/restoration/ping", get(ping))
        .route("/restoration/collection", post(collection))
        .with_state(service)
}

async fn ping() -> Json<serde_json::Value> {
    Json(json!({ "message": "pong" }))
}

async fn collection(
    State(service): State<Arc<Service>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    body: Result<Json<RestorationCollectionRequest>, JsonRejection>,
) -> (StatusCode, Json<serde_json::Value>) {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "message": "invalid request",
                    "error": rejection.to_string(),
                })),
            );
        }
    };

    let ctx = Context::new()
        .with_peer_opt(peer.map(|ConnectInfo(addr)| addr))
        .attach();
    service.collect_external(&ctx, request).await;

    (StatusCode::OK, Json(json!({ "message": "success" })))
}
