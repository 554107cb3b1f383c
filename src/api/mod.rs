//! Development stub of the generation backend, served over HTTP.

mod handlers;
pub mod middleware;
pub mod stub;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use middleware::AuthConfig;
pub use stub::{StubBackend, StubError};

pub fn create_router(stub: StubBackend) -> Router {
    create_router_with_auth(stub, AuthConfig::disabled())
}

/// Routes under `/api/v1` require the configured key; `/health` never does.
pub fn create_router_with_auth(stub: StubBackend, auth: AuthConfig) -> Router {
    let api = Router::new()
        .route("/preview", post(handlers::preview))
        .route("/generate", post(handlers::generate))
        .route("/sessions", get(handlers::list_sessions))
        .route(
            "/sessions/{id}",
            axum::routing::patch(handlers::update_session).delete(handlers::delete_session),
        )
        .route("/sessions/{id}/versions", get(handlers::get_versions))
        .route("/sessions/{id}/feedback", post(handlers::feedback))
        .route("/sessions/{id}/rollback", post(handlers::rollback))
        .route_layer(from_fn_with_state(auth, middleware::auth_middleware));

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(handlers::health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(stub)
}

/// Serve the stub until the process is stopped.
pub async fn serve(listener: TcpListener, router: Router) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "stub backend listening");
    }
    axum::serve(listener, router).await
}
