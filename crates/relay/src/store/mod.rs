// Durable workspace and file storage.
//
// `WorkspaceStore` dispatches to PostgreSQL or to an in-memory backend used
// for local development and tests. Uniqueness of `(user_id, root_path)` for
// workspaces and `(workspace_id, path)` for files is enforced here, never by
// callers.

pub mod cache;
mod memory;
mod postgres;

use std::sync::Arc;

use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;
use worksync_common::types::{Workspace, WorkspaceFile};

pub use memory::MemoryWorkspaceStore;
#[cfg(test)]
pub use memory::StoreOperation;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("{0} already exists")]
    Conflict(&'static str),
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
    #[cfg(test)]
    #[error("injected failure")]
    Injected,
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateFileRequest {
    pub user_id: Uuid,
    pub workspace_id: Uuid,
    pub path: String,
    pub content: String,
    pub content_hash: String,
}

/// Partial update; `None` leaves the stored column untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateFileRequest {
    pub id: Uuid,
    pub content: Option<String>,
    pub content_hash: Option<String>,
}

#[derive(Clone)]
pub enum WorkspaceStore {
    Postgres(PgPool),
    Memory(Arc<RwLock<MemoryWorkspaceStore>>),
}

impl WorkspaceStore {
    pub fn memory() -> Self {
        Self::Memory(Arc::new(RwLock::new(MemoryWorkspaceStore::default())))
    }

    pub async fn ensure_workspace(
        &self,
        user_id: Uuid,
        root_path: &str,
        label: &str,
    ) -> Result<Workspace, StoreError> {
        match self {
            Self::Postgres(pool) => {
                postgres::ensure_workspace(pool, user_id, root_path, label).await
            }
            Self::Memory(store) => store.write().await.ensure_workspace(user_id, root_path, label),
        }
    }

    pub async fn get_file_by_path(
        &self,
        user_id: Uuid,
        workspace_id: Uuid,
        path: &str,
    ) -> Result<WorkspaceFile, StoreError> {
        match self {
            Self::Postgres(pool) => {
                postgres::get_file_by_path(pool, user_id, workspace_id, path).await
            }
            Self::Memory(store) => store.write().await.get_file_by_path(user_id, workspace_id, path),
        }
    }

    pub async fn create_file(&self, request: CreateFileRequest) -> Result<WorkspaceFile, StoreError> {
        match self {
            Self::Postgres(pool) => postgres::create_file(pool, &request).await,
            Self::Memory(store) => store.write().await.create_file(request),
        }
    }

    pub async fn update_file(&self, request: UpdateFileRequest) -> Result<WorkspaceFile, StoreError> {
        match self {
            Self::Postgres(pool) => postgres::update_file(pool, &request).await,
            Self::Memory(store) => store.write().await.update_file(request),
        }
    }

    pub async fn delete_file(&self, id: Uuid) -> Result<(), StoreError> {
        match self {
            Self::Postgres(pool) => postgres::delete_file(pool, id).await,
            Self::Memory(store) => store.write().await.delete_file(id),
        }
    }

    pub async fn health_check(&self) -> anyhow::Result<()> {
        match self {
            Self::Postgres(pool) => crate::db::pool::check_pool_health(pool).await,
            Self::Memory(_) => Ok(()),
        }
    }

    #[cfg(test)]
    pub(crate) async fn operation_count(&self, operation: StoreOperation) -> usize {
        match self {
            Self::Postgres(_) => 0,
            Self::Memory(store) => store.read().await.operation_count(operation),
        }
    }

    #[cfg(test)]
    pub(crate) async fn fail_operation_for_tests(&self, operation: StoreOperation) {
        if let Self::Memory(store) = self {
            store.write().await.fail_operation(operation);
        }
    }
}

pub(crate) fn map_sqlx_error(error: sqlx::Error, entity: &'static str) -> StoreError {
    match &error {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(database_error)
            if database_error.code().as_deref() == Some("23505") =>
        {
            StoreError::Conflict(entity)
        }
        _ => StoreError::Database(error),
    }
}
