//! Route handlers.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::error;

use crate::controller::{
    BrowserController, CloseRequest, CloseResponse, HealthReport, LaunchRequest, LaunchResponse,
};
use crate::error::{Error, Result};

// ============================================================================
// ApiError
// ============================================================================

/// Maps any [`Error`] to the uniform `500` body.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "Request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": "Something went wrong",
                "message": self.0.to_string(),
            })),
        )
            .into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// `POST /browser/launch`
pub async fn launch(
    State(controller): State<Arc<BrowserController>>,
    body: Bytes,
) -> std::result::Result<Json<LaunchResponse>, ApiError> {
    let request: LaunchRequest = parse_body(&body)?;
    Ok(Json(controller.launch(request).await?))
}

/// `POST /browser/close`
pub async fn close(
    State(controller): State<Arc<BrowserController>>,
    body: Bytes,
) -> std::result::Result<Json<CloseResponse>, ApiError> {
    let request: CloseRequest = parse_body(&body)?;
    Ok(Json(controller.close(request.session_id).await?))
}

/// `GET /health`
pub async fn health(State(controller): State<Arc<BrowserController>>) -> Json<HealthReport> {
    Json(controller.health())
}

/// Parses a JSON body, treating an empty body as the default request.
fn parse_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| Error::invalid_argument(format!("malformed request body: {e}")))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use axum::Router;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::server::router;
    use crate::session::{SessionRegistry, SurfaceLauncher};
    use crate::testing::ScriptedLauncher;
    use crate::upstream::{ConnectionManager, ManagerConfig};

    fn app() -> (Router, Arc<BrowserController>, Arc<ScriptedLauncher>) {
        let launcher = Arc::new(ScriptedLauncher::default());
        let registry = Arc::new(SessionRegistry::new(
            Arc::clone(&launcher) as Arc<dyn SurfaceLauncher>
        ));
        let upstream = ConnectionManager::new(ManagerConfig::new("ws://127.0.0.1:9"));
        let controller = Arc::new(BrowserController::new(registry, upstream));
        (router(Arc::clone(&controller)), controller, launcher)
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_launch_endpoint() {
        let (app, controller, launcher) = app();

        let response = app
            .oneshot(post("/browser/launch", r#"{"url":"https://example.com","portalId":"p-1"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["message"], "Browser launched successfully");
        let session_id = body["sessionId"].as_str().unwrap().to_string();
        assert_eq!(
            body["stream"]["message"],
            format!("Streaming started for session: {session_id}")
        );
        assert_eq!(launcher.launched().len(), 1);
        assert_eq!(controller.registry().ids()[0].to_string(), session_id);
    }

    #[tokio::test]
    async fn test_launch_without_url_is_500() {
        for body in ["", "{}", r#"{"url":""}"#] {
            let (app, _controller, launcher) = app();
            let response = app.oneshot(post("/browser/launch", body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

            let body = body_json(response).await;
            assert_eq!(body["error"], "Something went wrong");
            assert!(body["message"].as_str().unwrap().contains("URL is required"));
            assert!(launcher.launched().is_empty());
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_500() {
        let (app, _controller, _launcher) = app();
        let response = app.oneshot(post("/browser/launch", "{not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"], "Something went wrong");
    }

    #[tokio::test]
    async fn test_launch_failure_is_500() {
        let (app, _controller, launcher) = app();
        launcher.set_fail_launch(true);

        let response = app
            .oneshot(post("/browser/launch", r#"{"url":"https://example.com"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert!(body["message"].as_str().unwrap().contains("Failed to launch browser"));
    }

    #[tokio::test]
    async fn test_close_endpoint() {
        let (app, controller, launcher) = app();
        let launched = controller
            .launch(LaunchRequest {
                url: Some("https://example.com".to_string()),
                ..LaunchRequest::default()
            })
            .await
            .unwrap();

        let body = format!(r#"{{"sessionId":"{}"}}"#, launched.session_id);
        let response = app.clone().oneshot(post("/browser/close", &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["message"], "Browser closed successfully");
        assert!(controller.registry().is_empty());
        assert!(launcher.launched()[0].is_closed());

        let again = app.oneshot(post("/browser/close", &body)).await.unwrap();
        assert_eq!(again.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_close_without_body_closes_all() {
        let (app, controller, launcher) = app();
        for url in ["https://a.example", "https://b.example"] {
            controller
                .launch(LaunchRequest {
                    url: Some(url.to_string()),
                    ..LaunchRequest::default()
                })
                .await
                .unwrap();
        }

        let response = app.oneshot(post("/browser/close", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(controller.registry().is_empty());
        assert!(launcher.launched().iter().all(|s| s.is_closed()));
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (app, _controller, _launcher) = app();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["upstreamConnected"], false);
        assert_eq!(body["sessions"], 0);
    }

    #[test]
    fn test_parse_body() {
        let empty: CloseRequest = parse_body(b"  \n").unwrap();
        assert!(empty.session_id.is_none());
        assert!(parse_body::<CloseRequest>(br#"{"sessionId":"nope"}"#).is_err());
    }
}
