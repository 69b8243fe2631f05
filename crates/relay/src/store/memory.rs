use std::collections::HashMap;
#[cfg(test)]
use std::collections::HashSet;

use chrono::Utc;
use uuid::Uuid;
use worksync_common::types::{Workspace, WorkspaceFile};

use super::{CreateFileRequest, StoreError, UpdateFileRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    EnsureWorkspace,
    GetFileByPath,
    CreateFile,
    UpdateFile,
    DeleteFile,
}

#[derive(Debug, Default)]
pub struct MemoryWorkspaceStore {
    workspaces: HashMap<Uuid, Workspace>,
    files: HashMap<Uuid, WorkspaceFile>,
    operations: HashMap<StoreOperation, usize>,
    #[cfg(test)]
    failing: HashSet<StoreOperation>,
}

impl MemoryWorkspaceStore {
    fn begin(&mut self, operation: StoreOperation) -> Result<(), StoreError> {
        *self.operations.entry(operation).or_insert(0) += 1;
        #[cfg(test)]
        if self.failing.contains(&operation) {
            return Err(StoreError::Injected);
        }
        Ok(())
    }

    pub(super) fn ensure_workspace(
        &mut self,
        user_id: Uuid,
        root_path: &str,
        label: &str,
    ) -> Result<Workspace, StoreError> {
        self.begin(StoreOperation::EnsureWorkspace)?;
        let now = Utc::now();

        if let Some(existing) = self
            .workspaces
            .values_mut()
            .find(|workspace| workspace.user_id == user_id && workspace.root_path == root_path)
        {
            existing.updated_at = now;
            if !label.is_empty() {
                existing.label = label.to_owned();
            }
            return Ok(existing.clone());
        }

        let workspace = Workspace {
            id: Uuid::new_v4(),
            user_id,
            root_path: root_path.to_owned(),
            label: label.to_owned(),
            created_at: now,
            updated_at: now,
        };
        self.workspaces.insert(workspace.id, workspace.clone());
        Ok(workspace)
    }

    pub(super) fn get_file_by_path(
        &mut self,
        user_id: Uuid,
        workspace_id: Uuid,
        path: &str,
    ) -> Result<WorkspaceFile, StoreError> {
        self.begin(StoreOperation::GetFileByPath)?;
        self.files
            .values()
            .find(|file| {
                file.user_id == user_id && file.workspace_id == workspace_id && file.path == path
            })
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    pub(super) fn create_file(
        &mut self,
        request: CreateFileRequest,
    ) -> Result<WorkspaceFile, StoreError> {
        self.begin(StoreOperation::CreateFile)?;
        if !self.workspaces.contains_key(&request.workspace_id) {
            return Err(StoreError::NotFound);
        }
        if self
            .files
            .values()
            .any(|file| file.workspace_id == request.workspace_id && file.path == request.path)
        {
            return Err(StoreError::Conflict("file"));
        }

        let now = Utc::now();
        let file = WorkspaceFile {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            workspace_id: request.workspace_id,
            path: request.path,
            content: request.content,
            content_hash: request.content_hash,
            created_at: now,
            updated_at: now,
        };
        self.files.insert(file.id, file.clone());
        Ok(file)
    }

    pub(super) fn update_file(
        &mut self,
        request: UpdateFileRequest,
    ) -> Result<WorkspaceFile, StoreError> {
        self.begin(StoreOperation::UpdateFile)?;
        let file = self.files.get_mut(&request.id).ok_or(StoreError::NotFound)?;
        if let Some(content) = request.content {
            file.content = content;
        }
        if let Some(content_hash) = request.content_hash {
            file.content_hash = content_hash;
        }
        file.updated_at = Utc::now();
        Ok(file.clone())
    }

    pub(super) fn delete_file(&mut self, id: Uuid) -> Result<(), StoreError> {
        self.begin(StoreOperation::DeleteFile)?;
        self.files.remove(&id).map(|_| ()).ok_or(StoreError::NotFound)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn workspace_count(&self) -> usize {
        self.workspaces.len()
    }

    #[cfg(test)]
    pub(super) fn operation_count(&self, operation: StoreOperation) -> usize {
        self.operations.get(&operation).copied().unwrap_or(0)
    }

    #[cfg(test)]
    pub(super) fn fail_operation(&mut self, operation: StoreOperation) {
        self.failing.insert(operation);
    }
}
