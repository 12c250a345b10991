//! Filesystem core: confinement, listing, transfers, archives and uploads.
//!
//! This module provides the file operations behind the HTTP API:
//! - Lexical path confinement ([`PathGuard`])
//! - Error-tolerant directory listing with bounded concurrent stats
//! - Copy, move, rename and delete with conflict checks
//! - Streamed ZIP archives with backpressure
//! - Upload destination resolution and file name repair
//!
//! # Security
//!
//! Every operation validates its input paths with [`PathGuard::check`]
//! before touching disk. Validation is lexical and does not resolve symlinks.

pub mod archive;
pub mod drives;
pub mod error;
pub mod guard;
pub mod lister;
pub mod probe;
pub mod transfer;
pub mod upload;

pub use archive::{download_name, ArchiveItem, ArchiveStreamer, ChannelWriter};
pub use drives::list_drives;
pub use error::{FileError, FileResult};
pub use guard::{normalize, PathGuard};
pub use lister::DirectoryLister;
pub use probe::probe;
pub use transfer::{BatchError, CreateDirOutcome, TransferEngine};
pub use upload::UploadIngestor;
