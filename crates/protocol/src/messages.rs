//! Wire message definitions for FileLite.
//!
//! This module defines the JSON bodies exchanged with the `/api/files`
//! endpoints. Field names use the camelCase shape the browser client expects.
//! Request bodies carry a `validate()` method so malformed input is rejected
//! at the boundary before it reaches the filesystem layer.

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Package name reported by the info endpoint.
pub const PKG_NAME: &str = "filelite";

/// A single file or directory entry as returned by a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Entry name (not full path).
    pub name: String,
    /// Extension including the leading dot; empty for directories.
    #[serde(rename = "ext")]
    pub extension: String,
    /// Whether the entry is a directory.
    pub is_directory: bool,
    /// Whether the name begins with a dot.
    pub hidden: bool,
    /// Change time in milliseconds since the Unix epoch.
    pub last_modified: u64,
    /// Creation time in milliseconds since the Unix epoch.
    #[serde(rename = "birthtime")]
    pub birth_time: u64,
    /// Size in bytes; `None` for directories.
    pub size: Option<u64>,
    /// Set when the entry's metadata could not be read.
    pub error: Option<String>,
}

impl Entry {
    /// Build the placeholder entry reported when a child cannot be stat'ed.
    ///
    /// Timestamps are zeroed and the size is `Some(0)`, never a real size.
    pub fn unreadable(name: impl Into<String>, error: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            extension: extension_of(&name),
            hidden: name.starts_with('.'),
            name,
            is_directory: false,
            last_modified: 0,
            birth_time: 0,
            size: Some(0),
            error: Some(error.into()),
        }
    }

    /// Whether this entry can be used as a file handle.
    pub fn is_readable(&self) -> bool {
        self.error.is_none()
    }
}

/// Extension of a file name, including the leading dot.
///
/// Mirrors the usual `extname` rules: a name that starts with its only dot
/// (`.bashrc`) has no extension, and a trailing dot yields `"."`.
pub fn extension_of(name: &str) -> String {
    match name.rfind('.') {
        Some(0) | None => String::new(),
        Some(idx) => {
            if name[..idx].chars().all(|c| c == '.') {
                String::new()
            } else {
                name[idx..].to_string()
            }
        }
    }
}

/// A top-level browsable root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drive {
    /// Display label.
    pub label: String,
    /// Absolute path of the root.
    pub path: String,
    /// Free bytes, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free: Option<u64>,
    /// Total bytes, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl Drive {
    /// Create a drive without capacity information.
    pub fn new(label: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            path: path.into(),
            free: None,
            total: None,
        }
    }
}

/// Body of `POST /create-dir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDirRequest {
    /// Directory to create.
    #[serde(default)]
    pub path: String,
}

impl CreateDirRequest {
    /// Reject an empty path.
    pub fn validate(&self) -> Result<()> {
        if self.path.is_empty() {
            return Err(ProtocolError::MissingField("path"));
        }
        Ok(())
    }
}

/// Response of `POST /create-dir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDirResponse {
    /// Present and `true` when the directory was already there.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub existed: bool,
    /// The requested path.
    pub path: String,
}

/// Body of `POST /rename`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameRequest {
    #[serde(default)]
    pub from_path: String,
    #[serde(default)]
    pub to_path: String,
}

impl RenameRequest {
    /// Both paths are required and must differ.
    pub fn validate(&self) -> Result<()> {
        if self.from_path.is_empty() || self.to_path.is_empty() {
            return Err(ProtocolError::MissingField("fromPath or toPath"));
        }
        if self.from_path == self.to_path {
            return Err(ProtocolError::SamePath);
        }
        Ok(())
    }
}

/// Body of `POST /copy-paste`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyPasteRequest {
    /// Sources to copy or move.
    #[serde(default)]
    pub from_paths: Vec<String>,
    /// Destination directory.
    #[serde(default)]
    pub to_path: String,
    /// Remove the sources after copying.
    #[serde(default)]
    pub is_move: bool,
}

impl CopyPasteRequest {
    pub fn validate(&self) -> Result<()> {
        if self.from_paths.is_empty() {
            return Err(ProtocolError::MissingField("fromPaths"));
        }
        if self.to_path.is_empty() {
            return Err(ProtocolError::MissingField("toPath"));
        }
        Ok(())
    }
}

/// One path or a list of paths, as accepted by `POST /delete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSelection {
    One(String),
    Many(Vec<String>),
}

impl PathSelection {
    /// Flatten into a list of paths.
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            PathSelection::One(path) => vec![path.clone()],
            PathSelection::Many(paths) => paths.clone(),
        }
    }
}

/// Body of `POST /delete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub path: PathSelection,
}

impl DeleteRequest {
    pub fn validate(&self) -> Result<()> {
        let paths = self.path.to_vec();
        if paths.is_empty() || paths.iter().any(String::is_empty) {
            return Err(ProtocolError::MissingField("path"));
        }
        Ok(())
    }
}

/// Response of `POST /delete`; echoes the request's path shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub path: PathSelection,
}

/// Generic `{path}` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathResponse {
    pub path: String,
}

/// Generic `{message}` response, used for successes and errors alike.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: String,
}

impl MessageBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Response of `GET /api/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}
