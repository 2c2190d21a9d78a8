//! HTTP server for the document API

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    routing::get,
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use super::handlers::{self, AppState};

/// Creates the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_origin(Any);
    let timeout = TimeoutLayer::new(state.request_timeout);

    Router::new()
        .route("/api/health-check", get(handlers::health_check))
        .route("/api/v1/health", get(handlers::backend_health))
        .route(
            "/api/v1/collections/:collection/documents",
            get(handlers::list_documents).post(handlers::create_document),
        )
        .route(
            "/api/v1/collections/:collection/documents/query",
            axum::routing::post(handlers::query_documents),
        )
        .route(
            "/api/v1/collections/:collection/documents/count",
            get(handlers::count_documents),
        )
        .route(
            "/api/v1/collections/:collection/documents/:id",
            get(handlers::get_document)
                .patch(handlers::patch_document)
                .delete(handlers::delete_document),
        )
        .route("/metrics", get(handlers::metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(timeout)
                .layer(cors),
        )
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn start_server<F>(addr: SocketAddr, state: AppState, shutdown: F) -> crate::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    tracing::info!("Health check available at http://{}/api/health-check", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
