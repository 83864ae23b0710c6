use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use crate::features::files::handlers::{
    delete_file, download, download_options, files_list, upload,
};
use crate::features::files::services::FileService;

/// Create routes for the files feature
pub fn routes(file_service: Arc<FileService>) -> Router {
    Router::new()
        // Bodies are streamed to storage, so the default 2 MB limit does not apply
        .route("/api/1/upload", post(upload).layer(DefaultBodyLimit::disable()))
        .route(
            "/api/1/download/{uid}",
            get(download).options(download_options),
        )
        .route("/api/1/files/list", get(files_list))
        .route("/api/1/files/{uid}", delete(delete_file))
        .with_state(file_service)
}
