use axum::{
    routing::{any, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::ws::ws_handler;
use crate::state::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        // Session control
        .route("/session", get(handlers::session_status))
        .route("/session/start", post(handlers::session_start))
        .route("/session/stop", post(handlers::session_stop))
        .route("/label", get(handlers::get_label))
        // Live preview
        .route("/snapshot", get(handlers::snapshot))
        .route("/stream/preview", get(handlers::mjpeg_preview))
        // Devices and configuration
        .route("/devices", get(handlers::list_devices))
        .route("/config", get(handlers::get_config))
        // WebSocket endpoint for real-time events
        .route("/ws", any(ws_handler));

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use crate::events::EventBus;
    use crate::media::testing::FakeCamera;
    use crate::recognition::testing::{FakeRecognizer, Reply};
    use crate::session::{CaptureSessionManager, SessionConfig};
    use serde_json::Value;
    use tempfile::TempDir;
    use tokio::sync::broadcast;
    use tokio_test::assert_ok;

    struct TestServer {
        base: String,
        camera: Arc<FakeCamera>,
        _dir: TempDir,
    }

    async fn spawn_server(camera: FakeCamera) -> TestServer {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigStore::new(&dir.path().join("signcam.db")).await.unwrap();
        let events = Arc::new(EventBus::new());
        let camera = Arc::new(camera);
        let session = CaptureSessionManager::new(
            camera.clone(),
            Arc::new(FakeRecognizer::new(Reply::Label("Ka"))),
            SessionConfig::default(),
            events.clone(),
        );
        let (shutdown_tx, _) = broadcast::channel(1);
        let state = AppState::new(config, session, events, shutdown_tx);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = create_router(state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        TestServer {
            base: format!("http://{}/api", addr),
            camera,
            _dir: dir,
        }
    }

    async fn get_json(url: String) -> Value {
        let response = assert_ok!(reqwest::get(url).await);
        assert_ok!(response.json().await)
    }

    async fn post_json(url: String) -> Value {
        let response = assert_ok!(reqwest::Client::new().post(url).send().await);
        assert_ok!(response.json().await)
    }

    #[tokio::test]
    async fn test_health() {
        let server = spawn_server(FakeCamera::new(1)).await;
        let body = get_json(format!("{}/health", server.base)).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_session_start_stop() {
        let server = spawn_server(FakeCamera::new(1)).await;

        let body = get_json(format!("{}/session", server.base)).await;
        assert_eq!(body["state"], "inactive");
        assert_eq!(body["label"], "Loading...");

        let body = post_json(format!("{}/session/start", server.base)).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["state"], "active");
        assert_eq!(body["device"], "fake");

        let body = post_json(format!("{}/session/stop", server.base)).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["state"], "inactive");
        assert_eq!(server.camera.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_camera_failure_is_reported() {
        let server = spawn_server(FakeCamera::failing("permission denied")).await;

        let body = post_json(format!("{}/session/start", server.base)).await;
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().contains("permission denied"));

        let body = get_json(format!("{}/session", server.base)).await;
        assert_eq!(body["state"], "inactive");
        assert!(body["notice"].as_str().unwrap().contains("permission denied"));
    }

    #[tokio::test]
    async fn test_snapshot_unavailable_while_inactive() {
        let server = spawn_server(FakeCamera::new(1)).await;
        let response = assert_ok!(reqwest::get(format!("{}/snapshot", server.base)).await);
        assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

        let response = assert_ok!(reqwest::get(format!("{}/stream/preview", server.base)).await);
        assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_label_endpoint() {
        let server = spawn_server(FakeCamera::new(1)).await;
        let body = get_json(format!("{}/label", server.base)).await;
        assert_eq!(body["label"], "Loading...");
    }

    #[tokio::test]
    async fn test_config_endpoint() {
        let server = spawn_server(FakeCamera::new(1)).await;
        let body = get_json(format!("{}/config", server.base)).await;
        assert_eq!(body["recognition"]["file_name"], "gesture.jpg");
        assert_eq!(body["web"]["http_port"], 8080);
    }
}
