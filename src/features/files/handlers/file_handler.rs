use axum::{
    body::{Body, HttpBody},
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::TryStreamExt;
use std::io;
use std::sync::Arc;
use tokio_util::io::StreamReader;
use validator::Validate;

use crate::core::error::{AppError, Result};
use crate::core::extractor::AppQuery;
use crate::features::auth::model::Credentials;
use crate::features::files::dtos::{
    DeleteFileResponseDto, FileItemDto, FileResponseDto, FilesListResponseDto, UploadBody,
    UploadQuery, UID_MAX_LENGTH,
};
use crate::features::files::services::{FileService, UploadFile};
use crate::shared::types::ApiResponse;

/// Declared body size: `Content-Length`, or the exact length of a body known up front
fn declared_size(headers: &HeaderMap, body: &Body) -> Result<i64> {
    if let Some(value) = headers.get(header::CONTENT_LENGTH) {
        return value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|size| *size >= 0)
            .ok_or_else(|| AppError::BadRequest("Invalid Content-Length header".to_string()));
    }

    body.size_hint()
        .exact()
        .and_then(|size| i64::try_from(size).ok())
        .ok_or_else(|| AppError::BadRequest("Content-Length header is required".to_string()))
}

fn validate_uid(uid: &str) -> Result<()> {
    if uid.trim().is_empty() {
        return Err(AppError::Validation("UID is empty".to_string()));
    }
    if uid.len() > UID_MAX_LENGTH {
        return Err(AppError::Validation(format!(
            "UID must have {} symbols or less",
            UID_MAX_LENGTH
        )));
    }
    Ok(())
}

/// Upload a file
///
/// The request body is the raw file content; it is streamed to object storage
/// without being buffered.
#[utoipa::path(
    post,
    path = "/api/1/upload",
    tag = "files",
    params(UploadQuery),
    request_body(
        content = UploadBody,
        content_type = "application/octet-stream",
        description = "Raw file bytes; Content-Length is recorded as the file size",
    ),
    responses(
        (status = 201, description = "File uploaded successfully", body = ApiResponse<FileResponseDto>),
        (status = 400, description = "Invalid filename, missing Content-Length or object path already exists"),
        (status = 401, description = "Authentication required"),
        (status = 500, description = "Session service or object storage failure")
    ),
    security(
        ("bearer_auth" = []),
        ("integrations_token" = [])
    )
)]
pub async fn upload(
    credentials: Credentials,
    State(service): State<Arc<FileService>>,
    AppQuery(query): AppQuery<UploadQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<(StatusCode, Json<ApiResponse<FileResponseDto>>)> {
    query
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let size = declared_size(&headers, &body)?;
    let reader = StreamReader::new(body.into_data_stream().map_err(io::Error::other));

    let file = service
        .upload(
            &credentials,
            UploadFile {
                reader,
                size,
                filename: query.filename,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(Some(file.into()), None, None)),
    ))
}

/// Download a file
///
/// Streams the stored bytes. Images are served inline, everything else as an
/// attachment under the original filename.
#[utoipa::path(
    get,
    path = "/api/1/download/{uid}",
    tag = "files",
    params(
        ("uid" = String, Path, description = "File uid, at most 36 characters")
    ),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 400, description = "Empty or over-long uid"),
        (status = 401, description = "Authentication required (when download authorization is enabled)"),
        (status = 404, description = "File not found")
    ),
    security(
        (),
        ("bearer_auth" = []),
        ("integrations_token" = [])
    )
)]
pub async fn download(
    credentials: Credentials,
    State(service): State<Arc<FileService>>,
    Path(uid): Path<String>,
) -> Result<Response> {
    validate_uid(&uid)?;

    let download = service.download(&credentials, &uid).await?;

    let content_type = HeaderValue::from_str(download.content_type())
        .map_err(|e| AppError::Internal(format!("Invalid stored MIME type: {}", e)))?;
    let disposition = HeaderValue::from_bytes(download.content_disposition.as_bytes())
        .map_err(|e| AppError::Internal(format!("Invalid Content-Disposition: {}", e)))?;

    let body = Body::from_stream(download.into_body());

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// Answer bare `OPTIONS` preflight requests for download links
pub async fn download_options() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// List the caller's files
///
/// Integrations see the files uploaded by integrations.
#[utoipa::path(
    get,
    path = "/api/1/files/list",
    tag = "files",
    responses(
        (status = 200, description = "First page of active files", body = ApiResponse<FilesListResponseDto>),
        (status = 401, description = "Authentication required")
    ),
    security(
        ("bearer_auth" = []),
        ("integrations_token" = [])
    )
)]
pub async fn files_list(
    credentials: Credentials,
    State(service): State<Arc<FileService>>,
) -> Result<Json<ApiResponse<FilesListResponseDto>>> {
    let files = service.list(&credentials).await?;
    let files: Vec<FileItemDto> = files.into_iter().map(Into::into).collect();

    Ok(Json(ApiResponse::success(
        Some(FilesListResponseDto { files }),
        None,
        None,
    )))
}

/// Delete a file
///
/// Only the owner of the file can delete it. The stored object is kept.
#[utoipa::path(
    delete,
    path = "/api/1/files/{uid}",
    tag = "files",
    params(
        ("uid" = String, Path, description = "File uid")
    ),
    responses(
        (status = 200, description = "File deleted successfully", body = ApiResponse<DeleteFileResponseDto>),
        (status = 400, description = "Empty or over-long uid"),
        (status = 401, description = "Authentication required"),
        (status = 404, description = "File not found")
    ),
    security(
        ("bearer_auth" = []),
        ("integrations_token" = [])
    )
)]
pub async fn delete_file(
    credentials: Credentials,
    State(service): State<Arc<FileService>>,
    Path(uid): Path<String>,
) -> Result<Json<ApiResponse<DeleteFileResponseDto>>> {
    validate_uid(&uid)?;

    let file = service.delete(&credentials, &uid).await?;

    Ok(Json(ApiResponse::success(
        Some(DeleteFileResponseDto {
            uid: file.uid,
            deleted: true,
        }),
        Some("File deleted successfully".to_string()),
        None,
    )))
}
