//! TaskPulse Web Server
//!
//! Axum-based transport for the task hub: WebSocket sessions, the SSE ticker
//! stream and a small REST API.

pub mod routes;
pub mod state;
pub mod websocket;

use axum::{
    http::{header, Method},
    routing::get,
    Router,
};
use std::future::Future;
use taskpulse_core::ServerConfig;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(state.cors_origin.clone())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    let api_routes = Router::new()
        .route(
            "/tasks",
            get(routes::tasks::list_tasks).post(routes::tasks::create_task),
        )
        .route(
            "/tasks/{id}",
            get(routes::tasks::get_task)
                .patch(routes::tasks::update_task)
                .delete(routes::tasks::delete_task),
        )
        .route("/presence", get(routes::status::presence))
        .with_state(state.clone());

    Router::new()
        .route("/health", get(routes::status::health))
        .route("/stocks", get(routes::stocks::current_prices))
        .route("/stocks/stream", get(routes::stocks::stream_prices))
        .route("/ws", get(websocket::ws_handler))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve on `listener` until `shutdown` resolves.
///
/// Starts the ticker loop for the lifetime of the server.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state.clone());
    let ticker = state.ticker.start(state.config.tick_interval())?;

    let closing = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Shutdown requested, closing live connections");
            closing.begin_shutdown();
        })
        .await?;

    ticker.stop().await;
    info!("Web server stopped");
    Ok(())
}

/// Run the web server until Ctrl+C.
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let state = AppState::new(config)?;
    let listener = TcpListener::bind(state.config.bind_addr()).await?;
    info!("Web server listening on http://{}", listener.local_addr()?);

    serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}
