//! Request handlers for the `/api` routes.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Query, RawQuery, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use httpdate::fmt_http_date;
use protocol::{
    CopyPasteRequest, CreateDirRequest, CreateDirResponse, DeleteRequest, DeleteResponse, Drive,
    Entry, MessageBody, PathResponse, RenameRequest, ServerInfo, PKG_NAME,
};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use super::disposition;
use super::error::ApiError;
use super::query;
use super::AppState;
use crate::files::{download_name, list_drives, CreateDirOutcome, FileError};

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    #[serde(default)]
    pub path: String,
}

/// `GET /api/`
pub async fn server_info() -> Json<ServerInfo> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    Json(ServerInfo {
        name: PKG_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp,
    })
}

/// `GET /api/files/auth`; reaching it means the token was accepted.
pub async fn auth_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({}))
}

/// `GET /api/files/drives`
pub async fn drives(State(state): State<AppState>) -> ApiResult<Json<Vec<Drive>>> {
    let guard = state.guard.clone();
    let drives = tokio::task::spawn_blocking(move || list_drives(&guard)).await?;
    Ok(Json(drives))
}

/// `GET /api/files/list?path=`
pub async fn list(
    State(state): State<AppState>,
    Query(PathQuery { path }): Query<PathQuery>,
) -> ApiResult<Json<Vec<Entry>>> {
    let entries = state.lister.list(&path).await?;
    Ok(Json(entries))
}

/// `POST /api/files/create-dir`
pub async fn create_dir(
    State(state): State<AppState>,
    payload: Result<Json<CreateDirRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload?;
    request.validate()?;

    let engine = state.engine.clone();
    let path = request.path.clone();
    let outcome = tokio::task::spawn_blocking(move || engine.create_directory(&path)).await??;

    let response = match outcome {
        CreateDirOutcome::Created => (
            StatusCode::CREATED,
            Json(CreateDirResponse {
                existed: false,
                path: request.path,
            }),
        ),
        CreateDirOutcome::AlreadyExisted => (
            StatusCode::OK,
            Json(CreateDirResponse {
                existed: true,
                path: request.path,
            }),
        ),
    };
    Ok(response.into_response())
}

/// `POST /api/files/rename`
pub async fn rename(
    State(state): State<AppState>,
    payload: Result<Json<RenameRequest>, JsonRejection>,
) -> ApiResult<Json<PathResponse>> {
    let Json(request) = payload?;
    request.validate()?;

    let engine = state.engine.clone();
    let (from, to) = (request.from_path, request.to_path.clone());
    tokio::task::spawn_blocking(move || engine.rename(&from, &to)).await??;

    Ok(Json(PathResponse {
        path: request.to_path,
    }))
}

/// `POST /api/files/copy-paste`
pub async fn copy_paste(
    State(state): State<AppState>,
    payload: Result<Json<CopyPasteRequest>, JsonRejection>,
) -> ApiResult<Json<PathResponse>> {
    let Json(request) = payload?;
    request.validate()?;

    let engine = state.engine.clone();
    let (from_paths, to_path, is_move) = (
        request.from_paths,
        request.to_path.clone(),
        request.is_move,
    );
    tokio::task::spawn_blocking(move || engine.copy_or_move(&from_paths, &to_path, is_move))
        .await??;

    Ok(Json(PathResponse {
        path: request.to_path,
    }))
}

/// `POST /api/files/delete`
pub async fn delete(
    State(state): State<AppState>,
    payload: Result<Json<DeleteRequest>, JsonRejection>,
) -> ApiResult<Json<DeleteResponse>> {
    let Json(request) = payload?;
    request.validate()?;

    let engine = state.engine.clone();
    let paths = request.path.to_vec();
    tokio::task::spawn_blocking(move || engine.delete(&paths)).await??;

    Ok(Json(DeleteResponse { path: request.path }))
}

/// `GET /api/files/stream?path=`
pub async fn stream(
    State(state): State<AppState>,
    Query(PathQuery { path }): Query<PathQuery>,
) -> ApiResult<Response> {
    let file_path = state.guard.check(&path)?;
    send_file(file_path, Disposition::Inline).await
}

/// `GET /api/files/download?path=` or `?paths=…&paths=…`
pub async fn download(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> ApiResult<Response> {
    let single = query::values(raw.as_deref(), "path")
        .into_iter()
        .find(|p| !p.is_empty());
    let paths = match single {
        Some(path) => vec![path],
        None => query::values(raw.as_deref(), "paths"),
    };

    if paths.is_empty() {
        return Err(ApiError::BadRequest(
            "path(s) parameter is required".to_string(),
        ));
    }
    for path in &paths {
        if !state.guard.is_safe(path) {
            return Err(ApiError::BadRequest(format!("Path is not safe: {path}")));
        }
    }

    if let [only] = paths.as_slice() {
        let file_path = state.guard.check(only)?;
        let metadata = tokio::fs::metadata(&file_path)
            .await
            .map_err(|_| FileError::path_not_found())?;
        if !metadata.is_dir() {
            return send_file(file_path, Disposition::Attachment).await;
        }
    }

    let name = download_name(&paths);
    info!(name = %name, items = paths.len(), "Streaming archive download");
    let body = state.archive.stream(paths)?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        header_value(&disposition::attachment(&name))?,
    );
    Ok((StatusCode::OK, headers, Body::from_stream(body)).into_response())
}

/// `POST /api/files/upload-file?path=` with multipart field `file`.
pub async fn upload_file(
    State(state): State<AppState>,
    Query(PathQuery { path }): Query<PathQuery>,
    mut multipart: Multipart,
) -> ApiResult<Json<MessageBody>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Bad Request".to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let uploads = state.uploads.clone();
        let target = path.clone();
        let destination = tokio::task::spawn_blocking(move || {
            uploads.prepare(Some(target.as_str()), file_name.as_deref())
        })
        .await??;

        state.uploads.persist(&destination, field).await?;
        return Ok(Json(MessageBody::new("File uploaded successfully!")));
    }

    Err(ApiError::BadRequest("Bad Request".to_string()))
}

#[derive(Debug, Clone, Copy)]
enum Disposition {
    Inline,
    Attachment,
}

/// Send a regular file with content metadata headers.
async fn send_file(file_path: PathBuf, kind: Disposition) -> ApiResult<Response> {
    let metadata = tokio::fs::metadata(&file_path)
        .await
        .map_err(|_| FileError::path_not_found())?;
    if metadata.is_dir() {
        return Err(FileError::NotAFile.into());
    }

    let file = tokio::fs::File::open(&file_path)
        .await
        .map_err(|e| FileError::io(&file_path, e))?;

    let name = file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    let mime = mime_guess::from_path(&file_path).first_or_octet_stream();

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, header_value(mime.essence_str())?);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(metadata.len()));
    let disposition = match kind {
        Disposition::Inline => disposition::inline(&name),
        Disposition::Attachment => disposition::attachment(&name),
    };
    headers.insert(header::CONTENT_DISPOSITION, header_value(&disposition)?);

    if let Ok(modified) = metadata.modified() {
        headers.insert(header::LAST_MODIFIED, header_value(&fmt_http_date(modified))?);
        let mtime = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        headers.insert(
            header::ETAG,
            header_value(&format!("W/\"{:x}-{:x}\"", metadata.len(), mtime))?,
        );
    }

    debug!(path = %file_path.display(), size = metadata.len(), "Sending file");
    let body = Body::from_stream(ReaderStream::new(file));
    Ok((StatusCode::OK, headers, body).into_response())
}

fn header_value(value: &str) -> ApiResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| ApiError::Internal(format!("invalid header value: {value}")))
}
