//! File storage feature: streaming upload and download of files kept in
//! object storage, with their metadata in Postgres.
//!
//! ## Endpoints
//!
//! | Method | Endpoint | Auth | Description |
//! |--------|----------|------|-------------|
//! | POST | `/api/1/upload?filename=` | Yes (unless anonymous upload is enabled) | Upload raw body bytes |
//! | GET | `/api/1/download/{uid}` | Optional | Stream a file |
//! | GET | `/api/1/files/list` | Yes | First 100 files of the caller |
//! | DELETE | `/api/1/files/{uid}` | Yes | Soft-delete an owned file |

pub mod dtos;
pub mod handlers;
pub mod models;
pub mod naming;
pub mod repositories;
pub mod routes;
pub mod services;

pub use repositories::PgFileRepository;
pub use routes::routes;
pub use services::FileService;
