//! # FileLite Protocol Library
//!
//! This crate provides the wire types for the FileLite remote file manager.
//!
//! ## Overview
//!
//! The protocol crate is shared by the daemon and any Rust client. It
//! provides:
//!
//! - **Listing types**: [`Entry`] and [`Drive`] as returned by the listing
//!   endpoints
//! - **Request bodies**: one struct per mutating endpoint, each with a
//!   `validate()` boundary check
//! - **Response bodies**: `{path}`, `{message}` and friends
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::messages::RenameRequest;
//!
//! let req: RenameRequest =
//!     serde_json::from_str(r#"{"fromPath":"/srv/a.txt","toPath":"/srv/b.txt"}"#).unwrap();
//! assert!(req.validate().is_ok());
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Wire message definitions
//! - [`error`]: Error types

pub mod error;
pub mod messages;

pub use error::{ProtocolError, Result};
pub use messages::{
    CopyPasteRequest, CreateDirRequest, CreateDirResponse, DeleteRequest, DeleteResponse, Drive,
    Entry, MessageBody, PathResponse, PathSelection, RenameRequest, ServerInfo, PKG_NAME,
};
