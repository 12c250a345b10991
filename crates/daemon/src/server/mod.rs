//! HTTP surface of the daemon.
//!
//! Routes are mounted under `/api`. Everything below `/api/files` passes the
//! [`AuthGate`](crate::auth::AuthGate); every route except the streaming ones
//! counts against the per-IP [`RequestThrottle`].

pub mod auth;
pub mod disposition;
pub mod error;
pub mod handlers;
pub mod query;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{DefaultBodyLimit, Request};
use axum::routing::{get, post};
use axum::{middleware, Router};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{info, info_span, Level};

use crate::auth::{AuthGate, RequestThrottle};
use crate::config::RuntimeConfig;
use crate::files::{ArchiveStreamer, DirectoryLister, PathGuard, TransferEngine, UploadIngestor};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RuntimeConfig>,
    pub guard: PathGuard,
    pub lister: DirectoryLister,
    pub engine: TransferEngine,
    pub archive: ArchiveStreamer,
    pub uploads: UploadIngestor,
    pub gate: Arc<AuthGate>,
    pub throttle: Arc<RequestThrottle>,
}

impl AppState {
    /// Wire every component from the resolved configuration.
    pub fn new(config: RuntimeConfig) -> Self {
        let guard = PathGuard::new(config.safe_base_dir.as_deref());
        let gate = AuthGate::new(config.auth_token.clone(), config.limiter);

        Self {
            lister: DirectoryLister::new(guard.clone()),
            engine: TransferEngine::new(guard.clone()),
            archive: ArchiveStreamer::new(guard.clone()),
            uploads: UploadIngestor::new(guard.clone(), config.uploads_dir()),
            guard,
            gate: Arc::new(gate),
            throttle: Arc::new(RequestThrottle::default()),
            config: Arc::new(config),
        }
    }

    /// Replace the request throttle.
    pub fn with_throttle(mut self, throttle: RequestThrottle) -> Self {
        self.throttle = Arc::new(throttle);
        self
    }
}

/// Build the `/api` router.
pub fn build_router(state: AppState) -> Router {
    let files = Router::new()
        .route("/auth", get(handlers::auth_check))
        .route("/drives", get(handlers::drives))
        .route("/list", get(handlers::list))
        .route("/create-dir", post(handlers::create_dir))
        .route("/rename", post(handlers::rename))
        .route("/copy-paste", post(handlers::copy_paste))
        .route("/delete", post(handlers::delete))
        .route("/stream", get(handlers::stream))
        .route("/download", get(handlers::download))
        .route(
            "/upload-file",
            post(handlers::upload_file).layer(DefaultBodyLimit::disable()),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Router::new()
        .route("/api", get(handlers::server_info))
        .route("/api/", get(handlers::server_info))
        .nest("/api/files", files)
        .layer(middleware::from_fn_with_state(state.clone(), auth::throttle))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    info_span!(
                        "request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .with_state(state)
}

/// Serve until `shutdown` resolves, over TLS when configured.
pub async fn serve<F>(state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let config = Arc::clone(&state.config);
    let addr = config.listen_addr;
    let app = build_router(state).into_make_service_with_connect_info::<SocketAddr>();

    let handle = Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        shutdown.await;
        shutdown_handle.graceful_shutdown(Some(Duration::from_secs(10)));
    });

    match &config.tls {
        Some(tls) => {
            let rustls = RustlsConfig::from_pem_file(&tls.cert, &tls.key)
                .await
                .with_context(|| {
                    format!(
                        "Failed to load TLS certificate {} and key {}",
                        tls.cert.display(),
                        tls.key.display()
                    )
                })?;
            info!("Listening on https://{}", addr);
            axum_server::bind_rustls(addr, rustls)
                .handle(handle)
                .serve(app)
                .await
                .context("HTTPS server failed")?;
        }
        None => {
            info!("Listening on http://{}", addr);
            axum_server::bind(addr)
                .handle(handle)
                .serve(app)
                .await
                .context("HTTP server failed")?;
        }
    }

    info!("Server stopped");
    Ok(())
}
