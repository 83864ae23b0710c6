mod file_dto;

pub use file_dto::{
    DeleteFileResponseDto, FileItemDto, FileResponseDto, FilesListResponseDto, UploadBody,
    UploadQuery, UID_MAX_LENGTH,
};
