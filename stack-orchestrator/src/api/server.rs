use crate::state::{snapshot, SharedStackState};
use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use log::info;
use tower_http::cors::CorsLayer;

pub fn router(state: SharedStackState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/services", get(list_services))
        .route("/services/:name", get(get_service))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the status view on `0.0.0.0:<port>` until the task is dropped.
pub async fn serve(port: u16, state: SharedStackState) -> Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind status server to {}", addr))?;
    info!("API: Status server listening on {}", addr);
    axum::serve(listener, router(state))
        .await
        .context("Status server failed")?;
    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn list_services(State(state): State<SharedStackState>) -> impl IntoResponse {
    let view = snapshot(&state);
    Json(serde_json::json!({"status": "OK", "stack": view}))
}

async fn get_service(
    State(state): State<SharedStackState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let view = snapshot(&state);
    match view.services.get(&name) {
        Some(service) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "OK", "name": name, "service": service})),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"status": "ERROR", "msg": format!("Unknown service '{}'", name)})),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::SystemEvent;
    use crate::plan::PlanEngine;
    use crate::state::create_state;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use stack_descriptor::parse_str;
    use tower::ServiceExt;

    fn state() -> SharedStackState {
        let descriptor = parse_str(
            "name: shop\nservices:\n  db:\n    image: postgres\n  api:\n    image: api\n    depends_on: [db]\n",
            "shop",
            &|_: &str| None,
        )
        .unwrap();
        let plan = PlanEngine::resolve(&descriptor, std::path::Path::new("."), None).unwrap();
        create_state(&plan)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = router(state())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_services_reflect_state() {
        let state = state();
        state.write().unwrap().apply(&SystemEvent::ServiceStarted {
            service: "db".into(),
            pid: Some(7),
        });

        let (status, body) = get_json(router(state.clone()), "/services").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stack"]["project"], "shop");
        assert_eq!(body["stack"]["services"]["db"]["pid"], 7);
        assert_eq!(body["stack"]["services"]["api"]["state"], "pending");
        assert_eq!(body["stack"]["layers"][1][0], "api");

        let (status, body) = get_json(router(state), "/services/api").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"]["depends_on"][0], "db");
    }

    #[tokio::test]
    async fn test_unknown_service_is_404() {
        let (status, body) = get_json(router(state()), "/services/ghost").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "ERROR");
    }
}
