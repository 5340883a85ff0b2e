//! HTTP surface of the service.
//!
//! Routes:
//! - `GET /` and `GET /health` report the active model and readiness
//! - `POST /get-embedding` extracts one embedding from a multipart `image`
//! - `POST /compare-embeddings` compares `{"embA": [..], "embB": [..]}`
//! - `POST /verify-face` compares multipart `imageA` and `imageB`

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::{DefaultBodyLimit, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ServerConfig;
use crate::provider::EmbeddingProvider;

pub mod error;
pub mod routes;

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn EmbeddingProvider>,
}

impl AppState {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }
}

pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let cors = if config.cors {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health))
        .route("/get-embedding", post(routes::get_embedding))
        .route("/compare-embeddings", post(routes::compare_embeddings))
        .route("/verify-face", post(routes::verify_face))
        .fallback(routes::not_found)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors)
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let start = Instant::now();

    let response = next.run(req).await;

    log::info!(
        "{} {} -> {} in {:.1?}",
        method,
        path,
        response.status().as_u16(),
        start.elapsed()
    );
    response
}

/// Serve until Ctrl+C or SIGTERM.
pub async fn serve(
    config: &ServerConfig,
    bind: Option<SocketAddr>,
    provider: Arc<dyn EmbeddingProvider>,
) -> Result<()> {
    let addr = bind.unwrap_or(config.bind);
    let app = build_router(AppState::new(provider), config);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    log::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    log::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for ctrl+c: {}", e);
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
                log::error!("failed to listen for SIGTERM: {}", e);
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

    log::info!("shutdown signal received");
}
