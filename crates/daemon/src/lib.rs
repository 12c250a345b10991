//! # FileLite Daemon Library
//!
//! This crate provides the server side of FileLite, a remote file manager
//! that exposes a confined part of the host filesystem over HTTP.
//!
//! ## Overview
//!
//! The daemon provides:
//!
//! - **Path confinement**: every operation is checked against an optional
//!   root directory
//! - **File operations**: listing, streaming, copy/move/rename/delete and
//!   uploads
//! - **Streamed archives**: multi-item downloads as ZIP without temp files
//! - **Authentication**: a shared token with per-IP brute-force lockout
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                         axum Router                           │
//! │        TraceLayer ─▶ RequestThrottle ─▶ AuthGate (/files)     │
//! ├───────────────────────────────────────────────────────────────┤
//! │                                                               │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────────┐ │
//! │  │  Directory   │  │   Transfer   │  │  Archive Streamer /  │ │
//! │  │   Lister     │  │    Engine    │  │   Upload Ingestor    │ │
//! │  └──────────────┘  └──────────────┘  └──────────────────────┘ │
//! │                                                               │
//! │  ┌─────────────────────────────────────────────────────────┐  │
//! │  │                       PathGuard                         │  │
//! │  └─────────────────────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use daemon::{AppState, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let data_dir = daemon::config::default_data_dir();
//!     let config = Config::load(daemon::config::config_path_in(&data_dir))?;
//!     let runtime = config.resolve(&data_dir, &std::env::current_dir()?)?;
//!
//!     daemon::server::serve(AppState::new(runtime), async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`files`]: Path confinement and filesystem operations
//! - [`auth`]: Token check, IP lockout and request throttling
//! - [`server`]: HTTP routes, handlers and error mapping

pub mod auth;
pub mod config;
pub mod files;
pub mod server;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::{Config, RuntimeConfig};

// Re-export files types for convenience
pub use files::{
    ArchiveStreamer, CreateDirOutcome, DirectoryLister, FileError, PathGuard, TransferEngine,
    UploadIngestor,
};

// Re-export auth types for convenience
pub use auth::{AuthDecision, AuthGate, BanStatus, IpRateLimiter, RequestThrottle};

// Re-export server types for convenience
pub use server::{build_router, AppState};
