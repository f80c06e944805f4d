//! Router assembly and server lifecycle.

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::context::AppContext;

/// Build the API router over a shared context.
pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/stats", get(handlers::stats))
        .route("/api/chat", post(handlers::chat))
        .route("/api/chat/stream", post(handlers::chat_stream))
        .route("/api/search", post(handlers::search))
        .route("/api/suggestions", get(handlers::suggestions))
        .route("/api/match", post(handlers::find_matches))
        .route("/api/session/process", post(handlers::process_session))
        // Mentor index maintenance
        .route("/api/mentors", post(handlers::index_mentor))
        .route(
            "/api/mentors/:id",
            put(handlers::update_mentor).delete(handlers::remove_mentor),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Start the HTTP server.
pub async fn serve(ctx: Arc<AppContext>) -> anyhow::Result<()> {
    let addr = ctx.config.bind_addr();
    let app = router(Arc::clone(&ctx));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let stats = ctx.ledger.get_stats().await;
    tracing::info!(
        "Shutdown complete. Spend today: ${:.4} of ${:.2}",
        stats.today,
        stats.daily_budget
    );
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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

    tracing::info!("Shutdown signal received, draining in-flight requests...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn test_router_builds() {
        let mut config = Config::default();
        config.dev.mock_responses = true;
        let ctx = Arc::new(AppContext::new(Arc::new(config)).unwrap());
        let _app = router(ctx);
    }
}
