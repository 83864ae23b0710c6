mod file_service;

pub use file_service::{FileDownload, FileService, UploadFile, LIST_PAGE_SIZE};
