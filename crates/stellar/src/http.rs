use crate::service::Stellar;
use crate::store::InstanceStore;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::Json;
use common::Context;
use proto_alioth::{
    ServiceDiscoveryRequest, ServiceListRequest, ServiceRegistrationRequest, ServiceUnmountRequest,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

/// Routes of the registry's HTTP surface, mounted by the server under
/// its external prefix.
pub fn router<S: InstanceStore>(service: Arc<Stellar<S>>) -> axum::Router {
    axum::Router::new()
        .route("/stellar/ping", get(ping))
        .route("/stellar/registration", post(registration::<S>))
        .route("/stellar/discovery/:service", get(discovery::<S>))
        .route("/stellar/unmount/:service/:handler", delete(unmount::<S>))
        .route("/stellar/list", get(list::<S>))
        .with_state(service)
}

type Reply = (StatusCode, Json<serde_json::Value>);

fn success(data: impl serde::Serialize) -> Reply {
    (
        StatusCode::OK,
        Json(json!({ "message": "success", "data": data })),
    )
}

fn invalid(error: impl ToString) -> Reply {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "message": "invalid request", "error": error.to_string() })),
    )
}

fn internal(error: impl ToString) -> Reply {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": "internal error", "error": error.to_string() })),
    )
}

async fn ping() -> Json<serde_json::Value> {
    Json(json!({ "message": "pong" }))
}

async fn registration<S: InstanceStore>(
    State(service): State<Arc<Stellar<S>>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    body: Result<Json<ServiceRegistrationRequest>, JsonRejection>,
) -> Reply {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => return invalid(rejection),
    };

    let ctx = Context::new()
        .with_peer_opt(peer.map(|ConnectInfo(addr)| addr))
        .attach();
    let client_ip = ctx.client_ip().unwrap_or_default();

    match service.register(&ctx, &request, &client_ip).await {
        Ok(response) => success(response),
        Err(err) => internal(err),
    }
}

#[derive(serde::Deserialize)]
struct DiscoveryParams {
    min_version: Option<String>,
}

async fn discovery<S: InstanceStore>(
    State(service): State<Arc<Stellar<S>>>,
    Path(service_name): Path<String>,
    Query(params): Query<DiscoveryParams>,
) -> Reply {
    let min_version = params.min_version.unwrap_or_default();
    if service_name.is_empty() || min_version.split('.').count() != 4 {
        return invalid("invalid service name or min version");
    }

    let request = ServiceDiscoveryRequest {
        service: service_name,
        min_version,
    };
    let ctx = Context::new().attach();

    // A discovery miss answers 500, not 404.
    match service.discover(&ctx, &request).await {
        Ok(response) => success(response),
        Err(err) => internal(err),
    }
}

async fn unmount<S: InstanceStore>(
    State(service): State<Arc<Stellar<S>>>,
    Path((service_name, handler)): Path<(String, String)>,
) -> Reply {
    if service_name.is_empty() || handler.is_empty() || handler.split(':').count() != 3 {
        return invalid("invalid service name or handler name");
    }

    let request = ServiceUnmountRequest {
        service: service_name,
        name: handler,
    };
    let ctx = Context::new().attach();

    match service.unmount(&ctx, &request).await {
        Ok(response) => success(response),
        Err(err) => internal(err),
    }
}

async fn list<S: InstanceStore>(
    State(service): State<Arc<Stellar<S>>>,
    Query(request): Query<ServiceListRequest>,
) -> Reply {
    let ctx = Context::new().attach();
    match service.list(&ctx, &request).await {
        Ok(response) => success(response),
        Err(err) => internal(err),
    }
}

#[cfg(test)]
mod test {
    use super::router;
    use crate::mem::MemStore;
    use crate::Stellar;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{self, Request, StatusCode};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> axum::Router {
        router(Arc::new(Stellar::new(Arc::new(MemStore::default()))))
    }

    fn peer() -> ConnectInfo<SocketAddr> {
        ConnectInfo("10.0.0.5:39000".parse().unwrap())
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn register_request(port: u16) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/stellar/registration")
            .header(http::header::CONTENT_TYPE, "application/json")
            .extension(peer())
            .body(Body::from(format!(
                r#"{{"service":"alioth-restoration","version":"1.0.0.0","port":{port}}}"#
            )))
            .unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let resp = app()
            .oneshot(
                Request::builder()
                    .uri("/stellar/ping")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, serde_json::json!({"message": "pong"}));
    }

    #[tokio::test]
    async fn test_registration_then_discovery() {
        let app = app();

        let resp = app.clone().oneshot(register_request(50051)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["message"], "success");
        assert_eq!(body["data"]["name"], "alioth-restoration:v1.0.0.0:alpha");
        assert_eq!(body["data"]["address"], "10.0.0.5:50051");

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/stellar/discovery/alioth-restoration?min_version=1.0.0.0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert!(body["data"]["name"]
            .as_str()
            .unwrap()
            .starts_with("alioth-restoration:v1.0.0.0:"));

        // No instance clears the 2.0.0.0 floor: answered as 500.
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/stellar/discovery/alioth-restoration?min_version=2.0.0.0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_discovery_validates_min_version() {
        let resp = app()
            .oneshot(
                Request::builder()
                    .uri("/stellar/discovery/some-service?min_version=1.2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app()
            .oneshot(
                Request::builder()
                    .uri("/stellar/discovery/some-service")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unmount_validates_handler_shape() {
        let resp = app()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/stellar/unmount/svc/not-a-handler")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unmount_and_list() {
        let app = app();
        for port in [50051u16, 50052] {
            let resp = app.clone().oneshot(register_request(port)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
        }

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/stellar/unmount/alioth-restoration/alioth-restoration:v1.0.0.0:alpha")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["success"], true);

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/stellar/list?page_limit=10&page_offset=0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["total"], 1);
        assert_eq!(
            body["data"]["services"][0]["name"],
            "alioth-restoration:v1.0.0.0:beta"
        );
    }
}
