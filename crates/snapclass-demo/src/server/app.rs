use crate::server::{routes, static_files, websocket};
use crate::state::DemoAppState;
use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tokio::signal;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the Axum application
pub fn build_app(state: DemoAppState) -> Router {
    // CORS defaults to local origins; override only for explicit demo use.
    let allow_any_origin = state.config.allow_any_origin
        || std::env::var("SNAPCLASS_ALLOW_ANY_ORIGIN")
            .ok()
            .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    let cors = if allow_any_origin {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([
                HeaderValue::from_static("http://localhost:3000"),
                HeaderValue::from_static("http://127.0.0.1:3000"),
            ]))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let body_limit = state.config.max_upload_bytes;

    // API routes
    let api_routes = Router::new()
        // Health
        .route("/health", get(routes::health))
        // Model lifecycle
        .route("/model", get(routes::get_model))
        .route("/model/load", post(routes::load_model))
        // Classification
        .route("/classify", post(routes::classify))
        // Recent images
        .route(
            "/history",
            get(routes::list_history).delete(routes::clear_history),
        )
        .route("/history/:id/image", get(routes::history_image))
        .route("/history/:id/classify", post(routes::reclassify));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(websocket::websocket_handler))
        .route("/metrics", get(routes::render_metrics))
        .fallback(static_files::serve_static)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Run the server until Ctrl+C or SIGTERM
pub async fn run_server(state: DemoAppState, addr: SocketAddr) -> anyhow::Result<()> {
    if state.config.eager_load {
        tracing::info!("Eager loading '{}'", state.classifier.model_id());
        state.classifier.load_in_background();
    }

    let app = build_app(state);

    tracing::info!("Starting SnapClass server on {}", addr);
    tracing::info!("Open http://{} in your browser", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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

    tracing::warn!("Shutdown signal received, stopping server...");
}
