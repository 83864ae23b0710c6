use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::error::{AppError, Result};
use crate::features::files::models::{FileRecord, NewFile};

const FILE_COLUMNS: &str = "id, uid, owner_id, filename, object_path, size, mime_type, \
                            created_at, updated_at, deleted_at, upload_pending";

/// Metadata persistence for files.
///
/// Every `find_*` method sees active rows only. Soft-deleted rows stay in the
/// table: they are deleted files, uploads still in flight (`upload_pending`),
/// or uploads whose bytes never arrived.
///
/// At most one row per object path is active or pending. `create` and
/// `restore` fail with `Validation` when another row holds the path.
#[async_trait]
pub trait FileRepository: Send + Sync {
    async fn create(&self, file: NewFile) -> Result<FileRecord>;

    /// Mark an active row deleted; `NotFound` when there is none
    async fn delete(&self, uid: Uuid) -> Result<()>;

    /// Clear the deletion and pending markers and return the live row
    async fn restore(&self, uid: Uuid) -> Result<FileRecord>;

    /// Give up the object path claimed by a reservation whose write failed
    async fn release(&self, uid: Uuid) -> Result<()>;

    async fn find_by_uid(&self, uid: Uuid) -> Result<Option<FileRecord>>;

    async fn find_by_owner(&self, owner_id: i64, limit: i64, offset: i64)
        -> Result<Vec<FileRecord>>;

    async fn find_by_filename(&self, filename: &str) -> Result<Option<FileRecord>>;

    async fn find_by_object_path(&self, object_path: &str) -> Result<Option<FileRecord>>;
}

/// Convert database error to more specific AppError with user-friendly messages
fn handle_db_error(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            if let Some(constraint) = db_err.constraint() {
                if constraint.contains("object_path_claimed") {
                    return AppError::Validation(
                        "file with this object path already exists".to_string(),
                    );
                }
            }
            return AppError::Validation("file already exists".to_string());
        }
    }

    AppError::Database(e)
}

pub struct PgFileRepository {
    pool: PgPool,
}

impl PgFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FileRepository for PgFileRepository {
    async fn create(&self, file: NewFile) -> Result<FileRecord> {
        let query = format!(
            r#"
            INSERT INTO files
                (uid, owner_id, filename, object_path, size, mime_type, deleted_at, upload_pending)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            FILE_COLUMNS
        );

        sqlx::query_as::<_, FileRecord>(&query)
            .bind(file.uid)
            .bind(file.owner_id)
            .bind(&file.filename)
            .bind(&file.object_path)
            .bind(file.size)
            .bind(&file.mime_type)
            .bind(file.deleted_at)
            .bind(file.upload_pending)
            .fetch_one(&self.pool)
            .await
            .map_err(handle_db_error)
    }

    async fn delete(&self, uid: Uuid) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE files
            SET deleted_at = NOW(), updated_at = NOW()
            WHERE uid = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(uid)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("File {} not found", uid)));
        }

        Ok(())
    }

    async fn restore(&self, uid: Uuid) -> Result<FileRecord> {
        let query = format!(
            r#"
            UPDATE files
            SET deleted_at = NULL, upload_pending = FALSE, updated_at = NOW()
            WHERE uid = $1
            RETURNING {}
            "#,
            FILE_COLUMNS
        );

        sqlx::query_as::<_, FileRecord>(&query)
            .bind(uid)
            .fetch_optional(&self.pool)
            .await
            .map_err(handle_db_error)?
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", uid)))
    }

    async fn release(&self, uid: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE files
            SET upload_pending = FALSE, updated_at = NOW()
            WHERE uid = $1 AND upload_pending
            "#,
        )
        .bind(uid)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_uid(&self, uid: Uuid) -> Result<Option<FileRecord>> {
        let query = format!(
            "SELECT {} FROM files WHERE uid = $1 AND deleted_at IS NULL",
            FILE_COLUMNS
        );

        let file = sqlx::query_as::<_, FileRecord>(&query)
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?;

        Ok(file)
    }

    async fn find_by_owner(
        &self,
        owner_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FileRecord>> {
        let query = format!(
            r#"
            SELECT {} FROM files
            WHERE owner_id = $1 AND deleted_at IS NULL
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#,
            FILE_COLUMNS
        );

        let files = sqlx::query_as::<_, FileRecord>(&query)
            .bind(owner_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(files)
    }

    async fn find_by_filename(&self, filename: &str) -> Result<Option<FileRecord>> {
        let query = format!(
            "SELECT {} FROM files WHERE filename = $1 AND deleted_at IS NULL ORDER BY id LIMIT 1",
            FILE_COLUMNS
        );

        let file = sqlx::query_as::<_, FileRecord>(&query)
            .bind(filename)
            .fetch_optional(&self.pool)
            .await?;

        Ok(file)
    }

    async fn find_by_object_path(&self, object_path: &str) -> Result<Option<FileRecord>> {
        let query = format!(
            "SELECT {} FROM files WHERE object_path = $1 AND deleted_at IS NULL ORDER BY id LIMIT 1",
            FILE_COLUMNS
        );

        let file = sqlx::query_as::<_, FileRecord>(&query)
            .bind(object_path)
            .fetch_optional(&self.pool)
            .await?;

        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_helpers::InMemoryFileRepository;
    use chrono::Utc;

    fn live_file(filename: &str, object_path: &str) -> NewFile {
        NewFile {
            uid: Uuid::new_v4(),
            owner_id: 42,
            filename: filename.to_string(),
            object_path: object_path.to_string(),
            size: 1,
            mime_type: "text/plain".to_string(),
            deleted_at: None,
            upload_pending: false,
        }
    }

    fn reservation(object_path: &str) -> NewFile {
        NewFile::tombstoned(
            42,
            "x.txt",
            object_path.to_string(),
            1,
            "text/plain".to_string(),
        )
    }

    #[tokio::test]
    async fn test_find_by_filename_sees_active_rows_only() {
        let memory = InMemoryFileRepository::new();
        let repo: &dyn FileRepository = &memory;

        let live = repo.create(live_file("notes.txt", "42/notes.txt")).await.unwrap();
        repo.create(NewFile {
            deleted_at: Some(Utc::now()),
            ..live_file("draft.txt", "42/draft.txt")
        })
        .await
        .unwrap();

        let found = repo.find_by_filename("notes.txt").await.unwrap();
        assert_eq!(found.map(|f| f.uid), Some(live.uid));
        assert!(repo.find_by_filename("draft.txt").await.unwrap().is_none());
        assert!(repo.find_by_filename("missing.txt").await.unwrap().is_none());

        repo.delete(live.uid).await.unwrap();
        assert!(repo.find_by_filename("notes.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pending_reservation_claims_path_until_released() {
        let memory = InMemoryFileRepository::new();
        let repo: &dyn FileRepository = &memory;

        let first = repo.create(reservation("42/x.txt")).await.unwrap();
        assert!(repo.find_by_object_path("42/x.txt").await.unwrap().is_none());

        let err = repo.create(reservation("42/x.txt")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        repo.release(first.uid).await.unwrap();
        let second = repo.create(reservation("42/x.txt")).await.unwrap();
        let restored = repo.restore(second.uid).await.unwrap();
        assert!(restored.is_active());
        assert!(!restored.upload_pending);

        let err = repo.restore(first.uid).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(
            repo.find_by_object_path("42/x.txt")
                .await
                .unwrap()
                .map(|f| f.uid),
            Some(second.uid)
        );
    }

    #[tokio::test]
    async fn test_delete_requires_active_row() {
        let memory = InMemoryFileRepository::new();
        let repo: &dyn FileRepository = &memory;

        let pending = repo.create(reservation("42/y.txt")).await.unwrap();
        let err = repo.delete(pending.uid).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
