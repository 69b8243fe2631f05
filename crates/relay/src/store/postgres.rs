use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use worksync_common::types::{Workspace, WorkspaceFile};

use super::{map_sqlx_error, CreateFileRequest, StoreError, UpdateFileRequest};

#[derive(sqlx::FromRow)]
struct WorkspaceRow {
    id: Uuid,
    user_id: Uuid,
    root_path: String,
    label: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<WorkspaceRow> for Workspace {
    fn from(value: WorkspaceRow) -> Self {
        Self {
            id: value.id,
            user_id: value.user_id,
            root_path: value.root_path,
            label: value.label,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct WorkspaceFileRow {
    id: Uuid,
    user_id: Uuid,
    workspace_id: Uuid,
    path: String,
    content: String,
    content_hash: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<WorkspaceFileRow> for WorkspaceFile {
    fn from(value: WorkspaceFileRow) -> Self {
        Self {
            id: value.id,
            user_id: value.user_id,
            workspace_id: value.workspace_id,
            path: value.path,
            content: value.content,
            content_hash: value.content_hash,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

pub(super) async fn ensure_workspace(
    pool: &PgPool,
    user_id: Uuid,
    root_path: &str,
    label: &str,
) -> Result<Workspace, StoreError> {
    sqlx::query_as::<_, WorkspaceRow>(
        r#"
        INSERT INTO workspaces (user_id, root_path, label)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, root_path) DO UPDATE
        SET label = CASE WHEN EXCLUDED.label = '' THEN workspaces.label ELSE EXCLUDED.label END,
            updated_at = now()
        RETURNING id, user_id, root_path, label, created_at, updated_at
        "#,
    )
    .bind(user_id)
    .bind(root_path)
    .bind(label)
    .fetch_one(pool)
    .await
    .map(Workspace::from)
    .map_err(|error| map_sqlx_error(error, "workspace"))
}

pub(super) async fn get_file_by_path(
    pool: &PgPool,
    user_id: Uuid,
    workspace_id: Uuid,
    path: &str,
) -> Result<WorkspaceFile, StoreError> {
    sqlx::query_as::<_, WorkspaceFileRow>(
        r#"
        SELECT id, user_id, workspace_id, path, content, content_hash, created_at, updated_at
        FROM workspace_files
        WHERE user_id = $1
          AND workspace_id = $2
          AND path = $3
        "#,
    )
    .bind(user_id)
    .bind(workspace_id)
    .bind(path)
    .fetch_one(pool)
    .await
    .map(WorkspaceFile::from)
    .map_err(|error| map_sqlx_error(error, "file"))
}

pub(super) async fn create_file(
    pool: &PgPool,
    request: &CreateFileRequest,
) -> Result<WorkspaceFile, StoreError> {
    sqlx::query_as::<_, WorkspaceFileRow>(
        r#"
        INSERT INTO workspace_files (user_id, workspace_id, path, content, content_hash)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, user_id, workspace_id, path, content, content_hash, created_at, updated_at
        "#,
    )
    .bind(request.user_id)
    .bind(request.workspace_id)
    .bind(&request.path)
    .bind(&request.content)
    .bind(&request.content_hash)
    .fetch_one(pool)
    .await
    .map(WorkspaceFile::from)
    .map_err(|error| map_sqlx_error(error, "file"))
}

pub(super) async fn update_file(
    pool: &PgPool,
    request: &UpdateFileRequest,
) -> Result<WorkspaceFile, StoreError> {
    sqlx::query_as::<_, WorkspaceFileRow>(
        r#"
        UPDATE workspace_files
        SET content = COALESCE($2, content),
            content_hash = COALESCE($3, content_hash),
            updated_at = now()
        WHERE id = $1
        RETURNING id, user_id, workspace_id, path, content, content_hash, created_at, updated_at
        "#,
    )
    .bind(request.id)
    .bind(request.content.as_deref())
    .bind(request.content_hash.as_deref())
    .fetch_optional(pool)
    .await
    .map_err(|error| map_sqlx_error(error, "file"))?
    .map(WorkspaceFile::from)
    .ok_or(StoreError::NotFound)
}

pub(super) async fn delete_file(pool: &PgPool, id: Uuid) -> Result<(), StoreError> {
    let result = sqlx::query("DELETE FROM workspace_files WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|error| map_sqlx_error(error, "file"))?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}
