//! API endpoint handlers
//!
//! Hosts the action-group handlers over HTTP so an agent (or a Lambda shim
//! forwarding its event) can call them.

use crate::agents::actions::ActionRouter;
use crate::core::config::Config;
use crate::models::agent::ActionEvent;
use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub router: Arc<ActionRouter>,
}

/// Create the API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/actions", post(invoke_action))
        .with_state(state)
}

/// POST /actions - Run an action-group event
async fn invoke_action(
    State(state): State<AppState>,
    Json(event): Json<ActionEvent>,
) -> impl IntoResponse {
    info!(
        "📥 Action event: group={}, apiPath={:?}, function={:?}",
        event.action_group, event.api_path, event.function
    );
    debug!("Full event payload: {:?}", event);

    Json(state.router.dispatch(&event).await)
}

/// GET / - Root endpoint
async fn root(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "message": "Bedrock action-group host v1.0.0",
        "status": "running",
        "region": state.config.region,
        "action_groups": state.router.groups(),
        "endpoints": {
            "actions": "/actions",
            "health": "/health",
        },
    }))
}

/// GET /health - Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "action_groups": state.router.groups().len(),
        "api_key_configured": state.config.validate_api_key(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    fn app() -> Router {
        create_router(AppState {
            config: Arc::new(Config::default()),
            router: Arc::new(ActionRouter::with_defaults()),
        })
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_root_lists_groups() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["action_groups"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_invoke_action() {
        let event = json!({
            "messageVersion": "1.0",
            "actionGroup": "ClaimManagementActionGroup",
            "apiPath": "/open-items/{claimId}/detail",
            "httpMethod": "GET",
            "parameters": [{"name": "claimId", "type": "string", "value": "claim-857"}]
        });

        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/actions")
                    .header("content-type", "application/json")
                    .body(Body::from(event.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["response"]["httpStatusCode"], 200);
        let inner: Value = serde_json::from_str(
            body["response"]["responseBody"]["application/json"]["body"]
                .as_str()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(inner["response"]["createdDate"], "21-Jul-2023");
    }

    #[tokio::test]
    async fn test_malformed_event_rejected() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/actions")
                    .header("content-type", "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
