//! Switchyard HTTP API
//!
//! HTTP and WebSocket layer around the hub, built with Axum.
//!
//! # Endpoints
//!
//! ## WebSocket
//! - `GET /api/v1/ws` - Join the hub
//!
//! ## Clients
//! - `GET /api/v1/clients` - List connected clients
//! - `GET /api/v1/clients/:id` - Get a client
//! - `DELETE /api/v1/clients/:id` - Disconnect a client
//!
//! ## Messages
//! - `POST /api/v1/send` - Push a message to all or selected clients
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! # Example
//!
//! ```rust,ignore
//! use switchyard::api::{serve, AppState};
//! use switchyard::config::ServerConfig;
//! use switchyard::hub::HubConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let state = AppState::with_hub_config(HubConfig::default(), config.clone());
//!     serve(state, &config).await?;
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::{AppState, ConnectionInfo};

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::ServerConfig;
use crate::hub::Hub;

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // WebSocket route
        .route("/ws", get(routes::ws::websocket_handler))
        // Client routes
        .route("/clients", get(routes::clients::list_clients))
        .route(
            "/clients/:id",
            get(routes::clients::get_client).delete(routes::clients::disconnect_client),
        )
        // Message routes
        .route("/send", post(routes::send::send_message));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    // Create shared state
    let shared_state = Arc::new(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

/// Start the API server
///
/// Runs until Ctrl+C or SIGTERM, then drains the hub before returning.
pub async fn serve(state: AppState, config: &ServerConfig) -> Result<(), ApiError> {
    let hub = state.hub.clone();
    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Switchyard listening on {}", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(hub.clone()))
    .await
    .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    // No-op when the signal handler already drained it
    hub.shutdown().await;

    tracing::info!("Switchyard shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal, then close every WebSocket through the hub
async fn shutdown_signal<A: Send + Sync + 'static>(hub: Hub<A>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining hub");
    hub.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{memory, Frame, HubConfig};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::util::ServiceExt;

    fn create_test_app() -> (Router, AppState) {
        let state = AppState::with_hub_config(HubConfig::default(), ServerConfig::default());
        (build_router(state.clone()), state)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_live() {
        let (app, _state) = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health/live")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_ready_tracks_hub_state() {
        let (app, state) = create_test_app();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/health/ready")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        state.hub.shutdown().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health/ready")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_health_full() {
        let (app, _state) = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["clients"], 0);
    }

    #[tokio::test]
    async fn test_list_clients() {
        let (app, state) = create_test_app();
        let (transport, _peer) = memory::pair(4);
        let session = state
            .hub
            .register(transport, ConnectionInfo::default())
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/clients")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["clients"][0]["id"], session.id().to_string());
        assert_eq!(body["clients"][0]["state"], "active");

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/clients/{}", session.id()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_unknown_client() {
        let (app, _state) = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/clients/67e55044-10b1-426f-9247-bb680e5fe0c8")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_disconnect_client() {
        let (app, state) = create_test_app();
        let (transport, mut peer) = memory::pair(4);
        let session = state
            .hub
            .register(transport, ConnectionInfo::default())
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/v1/clients/{}", session.id()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(session.is_terminated());
        assert_eq!(peer.recv().await, None);
    }

    #[tokio::test]
    async fn test_send_delivers_to_clients() {
        let (app, state) = create_test_app();
        let (transport, mut peer) = memory::pair(4);
        state
            .hub
            .register(transport, ConnectionInfo::default())
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/send")
                    .header("Content-Type", "application/json")
                    .body(Body::from(r#"{"type": "notice", "data": {"text": "hi"}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(
            peer.recv().await,
            Some(Frame::Text(
                r#"{"type":"notice","data":{"text":"hi"}}"#.to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_send_invalid_json() {
        let (app, _state) = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/send")
                    .header("Content-Type", "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_send_empty_type() {
        let (app, _state) = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/send")
                    .header("Content-Type", "application/json")
                    .body(Body::from(r#"{"type": "  "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_send_after_shutdown() {
        let (app, state) = create_test_app();
        state.hub.shutdown().await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/send")
                    .header("Content-Type", "application/json")
                    .body(Body::from(r#"{"type": "notice"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
