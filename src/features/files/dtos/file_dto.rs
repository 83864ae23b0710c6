use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::features::files::models::FileRecord;

/// Longest accepted file uid in a path
pub const UID_MAX_LENGTH: usize = 36;

/// Query parameters for `POST /api/1/upload`
#[derive(Debug, Deserialize, Validate, IntoParams)]
pub struct UploadQuery {
    /// Original filename; the extension decides the stored MIME type
    #[validate(length(min = 3, max = 255, message = "filename must be 3 to 255 characters"))]
    #[param(min_length = 3, max_length = 255, example = "report.pdf")]
    pub filename: String,
}

/// Raw request body for uploads, for OpenAPI documentation only
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct UploadBody {
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
}

/// Stored file as returned after an upload
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FileResponseDto {
    pub uid: Uuid,
    /// Uploading user; `0` for integrations
    pub user_id: i64,
    pub filename: String,
    pub object_path: String,
    pub mime_type: String,
    pub size: i64,
    pub created_at: DateTime<Utc>,
}

impl From<FileRecord> for FileResponseDto {
    fn from(file: FileRecord) -> Self {
        Self {
            uid: file.uid,
            user_id: file.owner_id,
            filename: file.filename,
            object_path: file.object_path,
            mime_type: file.mime_type,
            size: file.size,
            created_at: file.created_at,
        }
    }
}

/// Compact listing entry
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FileItemDto {
    pub uid: Uuid,
    pub filename: String,
    pub object_path: String,
    pub mime_type: String,
    pub size: i64,
}

impl From<FileRecord> for FileItemDto {
    fn from(file: FileRecord) -> Self {
        Self {
            uid: file.uid,
            filename: file.filename,
            object_path: file.object_path,
            mime_type: file.mime_type,
            size: file.size,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FilesListResponseDto {
    pub files: Vec<FileItemDto>,
}

/// Response DTO for delete operations
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteFileResponseDto {
    pub uid: Uuid,
    /// Confirmation that the file was deleted
    pub deleted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_query_validation() {
        let ok = UploadQuery {
            filename: "a.txt".to_string(),
        };
        assert!(ok.validate().is_ok());

        for filename in ["ab".to_string(), "x".repeat(256)] {
            let query = UploadQuery { filename };
            assert!(query.validate().is_err());
        }
    }
}
