use tracing::{debug, info, warn};
use uuid::Uuid;
use worksync_common::types::{EventKind, WorkspaceFile};

use super::{ChangeNotification, ReconciliationOutcome};
use crate::{
    identity::IdentityResolver,
    indexer::{ContentIndexer, IndexFile},
    store::{cache::WorkspaceCache, CreateFileRequest, UpdateFileRequest, WorkspaceStore},
};

/// Applies change notifications to the workspace store.
///
/// Every call to [`Reconciler::reconcile`] ends in exactly one outcome; no
/// error escapes. Cheap to clone: all collaborators are shared handles.
#[derive(Clone)]
pub struct Reconciler {
    identity: IdentityResolver,
    store: WorkspaceStore,
    indexer: ContentIndexer,
    cache: WorkspaceCache,
}

/// Identity and workspace context resolved for one notification.
struct Scope {
    user_id: Uuid,
    workspace_id: Uuid,
}

impl Reconciler {
    pub fn new(
        identity: IdentityResolver,
        store: WorkspaceStore,
        indexer: ContentIndexer,
        cache: WorkspaceCache,
    ) -> Self {
        Self { identity, store, indexer, cache }
    }

    pub fn store(&self) -> &WorkspaceStore {
        &self.store
    }

    pub async fn reconcile(&self, notification: &ChangeNotification) -> ReconciliationOutcome {
        let kind = match notification.event_kind.parse::<EventKind>() {
            Ok(kind) => kind,
            Err(error) => return ReconciliationOutcome::failed(notification, error.to_string()),
        };
        if notification.file_path.is_empty() {
            return ReconciliationOutcome::failed(notification, "no file path provided");
        }

        let user = match self.identity.resolve_by_credential(&notification.credential).await {
            Ok(user) => user,
            Err(error) => {
                debug!(id = %notification.id, error = %error, "credential rejected");
                return ReconciliationOutcome::failed(
                    notification,
                    format!("Invalid API key: {error}"),
                );
            }
        };

        if notification.workspace_root.is_empty() {
            return ReconciliationOutcome::failed(notification, "no workspace path provided");
        }
        let label = workspace_label(&notification.workspace_root);
        let workspace_id = match self
            .cache
            .ensure_workspace(&self.store, user.id, &notification.workspace_root, label)
            .await
        {
            Ok(workspace_id) => workspace_id,
            Err(error) => {
                warn!(user_id = %user.id, root = %notification.workspace_root, error = %error, "failed to ensure workspace");
                return ReconciliationOutcome::failed(
                    notification,
                    format!("Failed to ensure workspace: {error}"),
                );
            }
        };

        let scope = Scope { user_id: user.id, workspace_id };
        let outcome = match kind {
            EventKind::InitialScan | EventKind::Added => self.upsert(&scope, notification).await,
            EventKind::Modified => self.modify(&scope, notification).await,
            EventKind::Deleted => self.delete(&scope, notification).await,
        };

        info!(
            id = %notification.id,
            event = kind.as_str(),
            file = %notification.file_path,
            status = outcome.status.as_str(),
            "reconciled file change"
        );
        outcome
    }

    async fn upsert(&self, scope: &Scope, notification: &ChangeNotification) -> ReconciliationOutcome {
        match self
            .store
            .get_file_by_path(scope.user_id, scope.workspace_id, &notification.file_path)
            .await
        {
            Err(error) if error.is_not_found() => {
                let request = CreateFileRequest {
                    user_id: scope.user_id,
                    workspace_id: scope.workspace_id,
                    path: notification.file_path.clone(),
                    content: notification.content.clone(),
                    content_hash: notification.content_hash.clone(),
                };
                match self.store.create_file(request).await {
                    Ok(file) => {
                        self.submit_for_indexing(scope, &file);
                        ReconciliationOutcome::succeeded(notification, "File created successfully")
                    }
                    Err(error) => ReconciliationOutcome::failed(
                        notification,
                        format!("Failed to create file: {error}"),
                    ),
                }
            }
            Err(error) => ReconciliationOutcome::failed(
                notification,
                format!("Error checking for existing file: {error}"),
            ),
            Ok(existing) if existing.content_hash == notification.content_hash => {
                ReconciliationOutcome::succeeded(notification, "File is already up-to-date")
            }
            Ok(existing) => match self.store.update_file(update_request(&existing, notification)).await {
                Ok(_) => ReconciliationOutcome::succeeded(notification, "File updated successfully"),
                Err(error) => ReconciliationOutcome::failed(
                    notification,
                    format!("Failed to update existing file: {error}"),
                ),
            },
        }
    }

    async fn modify(&self, scope: &Scope, notification: &ChangeNotification) -> ReconciliationOutcome {
        let existing = match self
            .store
            .get_file_by_path(scope.user_id, scope.workspace_id, &notification.file_path)
            .await
        {
            Ok(existing) => existing,
            Err(error) => {
                return ReconciliationOutcome::failed(
                    notification,
                    format!("Failed to find file for update: {error}"),
                )
            }
        };

        match self.store.update_file(update_request(&existing, notification)).await {
            Ok(file) => {
                self.submit_for_indexing(scope, &file);
                ReconciliationOutcome::succeeded(notification, "File updated successfully")
            }
            Err(error) => {
                ReconciliationOutcome::failed(notification, format!("Failed to update file: {error}"))
            }
        }
    }

    async fn delete(&self, scope: &Scope, notification: &ChangeNotification) -> ReconciliationOutcome {
        let existing = match self
            .store
            .get_file_by_path(scope.user_id, scope.workspace_id, &notification.file_path)
            .await
        {
            Ok(existing) => existing,
            Err(error) => {
                return ReconciliationOutcome::failed(
                    notification,
                    format!("Failed to find file for deletion: {error}"),
                )
            }
        };

        match self.store.delete_file(existing.id).await {
            Ok(()) => ReconciliationOutcome::succeeded(notification, "File deleted successfully"),
            Err(error) => {
                ReconciliationOutcome::failed(notification, format!("Failed to delete file: {error}"))
            }
        }
    }

    /// Hands the file to the indexer on its own task; the outcome never waits
    /// for it.
    fn submit_for_indexing(&self, scope: &Scope, file: &WorkspaceFile) {
        if !self.indexer.is_enabled() {
            return;
        }
        let indexer = self.indexer.clone();
        let (user_id, workspace_id) = (scope.user_id, scope.workspace_id);
        let files = [IndexFile::new(file.path.clone(), file.content.clone())];
        tokio::spawn(async move {
            if let Err(error) = indexer.index_files(user_id, workspace_id, &files).await {
                crate::metrics::increment_indexer_failures();
                warn!(file = %files[0].path, error = %error, "content indexing failed");
            }
        });
    }
}

fn update_request(existing: &WorkspaceFile, notification: &ChangeNotification) -> UpdateFileRequest {
    UpdateFileRequest {
        id: existing.id,
        content: Some(notification.content.clone()),
        content_hash: Some(notification.content_hash.clone()),
    }
}

/// Last path component of a workspace root, accepting either separator.
pub(crate) fn workspace_label(root: &str) -> &str {
    let is_separator = |c: char| c == '/' || c == '\\';
    root.trim_end_matches(is_separator)
        .rsplit(is_separator)
        .next()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;
    use worksync_common::{language::CodeLanguage, protocol::sync::AckStatus, types::User};

    use super::{workspace_label, Reconciler};
    use crate::{
        identity::IdentityResolver,
        indexer::ContentIndexer,
        reconcile::ChangeNotification,
        store::{cache::WorkspaceCache, StoreOperation, WorkspaceStore},
    };

    const API_KEY: &str = "sk-test-key";

    async fn reconciler_with(indexer: ContentIndexer) -> Reconciler {
        let identity = IdentityResolver::memory();
        identity
            .register_api_key(
                API_KEY,
                User {
                    id: Uuid::new_v4(),
                    email: "dev@example.test".into(),
                    display_name: "Dev".into(),
                },
            )
            .await;
        Reconciler::new(
            identity,
            WorkspaceStore::memory(),
            indexer,
            WorkspaceCache::new(Duration::from_secs(300)),
        )
    }

    async fn reconciler() -> Reconciler {
        reconciler_with(ContentIndexer::memory()).await
    }

    fn notification(event: &str, path: &str, hash: &str) -> ChangeNotification {
        ChangeNotification {
            id: format!("{event}-{hash}"),
            file_path: path.into(),
            content_hash: hash.into(),
            event_kind: event.into(),
            content: format!("// content {hash}"),
            credential: API_KEY.into(),
            workspace_root: "/home/dev/project".into(),
            ..ChangeNotification::default()
        }
    }

    async fn count(reconciler: &Reconciler, operation: StoreOperation) -> usize {
        reconciler.store().operation_count(operation).await
    }

    #[test]
    fn label_is_last_root_component() {
        assert_eq!(workspace_label("/home/dev/project"), "project");
        assert_eq!(workspace_label("/home/dev/project/"), "project");
        assert_eq!(workspace_label(r"C:\src\app"), "app");
        assert_eq!(workspace_label("/"), "");
    }

    #[tokio::test]
    async fn added_file_is_created() {
        let reconciler = reconciler().await;
        let outcome = reconciler.reconcile(&notification("added", "src/main.rs", "h1")).await;

        assert_eq!(outcome.status, AckStatus::Success);
        assert_eq!(outcome.message, "File created successfully");
        assert_eq!(outcome.correlation_id, "added-h1");
        assert_eq!(outcome.file_path, "src/main.rs");
        assert_eq!(count(&reconciler, StoreOperation::CreateFile).await, 1);
    }

    #[tokio::test]
    async fn repeated_scan_with_same_hash_is_up_to_date() {
        let reconciler = reconciler().await;
        reconciler.reconcile(&notification("initial_scan", "a.rs", "h1")).await;
        let outcome = reconciler.reconcile(&notification("initial_scan", "a.rs", "h1")).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.message, "File is already up-to-date");
        assert_eq!(count(&reconciler, StoreOperation::CreateFile).await, 1);
        assert_eq!(count(&reconciler, StoreOperation::UpdateFile).await, 0);
    }

    #[tokio::test]
    async fn added_with_new_hash_updates_instead_of_creating() {
        let reconciler = reconciler().await;
        reconciler.reconcile(&notification("added", "a.rs", "h1")).await;
        let outcome = reconciler.reconcile(&notification("added", "a.rs", "h2")).await;

        assert_eq!(outcome.message, "File updated successfully");
        assert_eq!(count(&reconciler, StoreOperation::CreateFile).await, 1);
        assert_eq!(count(&reconciler, StoreOperation::UpdateFile).await, 1);
    }

    #[tokio::test]
    async fn modified_missing_file_never_creates() {
        let reconciler = reconciler().await;
        let outcome = reconciler.reconcile(&notification("modified", "ghost.rs", "h1")).await;

        assert_eq!(outcome.status, AckStatus::Error);
        assert!(outcome.message.starts_with("Failed to find file for update"));
        assert_eq!(count(&reconciler, StoreOperation::CreateFile).await, 0);
    }

    #[tokio::test]
    async fn modified_existing_file_updates_and_indexes() {
        let indexer = ContentIndexer::memory();
        let reconciler = reconciler_with(indexer.clone()).await;
        reconciler.reconcile(&notification("added", "web/app.tsx", "h1")).await;
        let outcome = reconciler.reconcile(&notification("modified", "web/app.tsx", "h2")).await;

        assert_eq!(outcome.message, "File updated successfully");
        let submissions = indexer.wait_for_submissions(2).await;
        assert_eq!(submissions.len(), 2, "create and modify are both indexed");
        assert_eq!(submissions[1].files[0].content, "// content h2");
        assert_eq!(submissions[1].files[0].language, Some(CodeLanguage::Tsx));
    }

    #[tokio::test]
    async fn unknown_event_kind_fails_before_any_io() {
        let reconciler = reconciler().await;
        let mut renamed = notification("renamed", "a.rs", "h1");
        renamed.credential = "not-a-registered-key".into();

        let outcome = reconciler.reconcile(&renamed).await;

        assert_eq!(outcome.message, "Unknown event type: renamed");
        for operation in [
            StoreOperation::EnsureWorkspace,
            StoreOperation::GetFileByPath,
            StoreOperation::CreateFile,
            StoreOperation::UpdateFile,
            StoreOperation::DeleteFile,
        ] {
            assert_eq!(count(&reconciler, operation).await, 0, "{operation:?} must not run");
        }
    }

    #[tokio::test]
    async fn empty_file_path_is_rejected() {
        let reconciler = reconciler().await;
        let outcome = reconciler.reconcile(&notification("added", "", "h1")).await;

        assert_eq!(outcome.message, "no file path provided");
        assert_eq!(count(&reconciler, StoreOperation::EnsureWorkspace).await, 0);
    }

    #[tokio::test]
    async fn missing_workspace_root_touches_no_store() {
        let reconciler = reconciler().await;
        let mut rootless = notification("added", "a.rs", "h1");
        rootless.workspace_root.clear();

        let outcome = reconciler.reconcile(&rootless).await;

        assert_eq!(outcome.status, AckStatus::Error);
        assert!(outcome.message.contains("no workspace path provided"));
        assert_eq!(count(&reconciler, StoreOperation::EnsureWorkspace).await, 0);
    }

    #[tokio::test]
    async fn unknown_credential_is_invalid_api_key() {
        let reconciler = reconciler().await;
        let mut stranger = notification("added", "a.rs", "h1");
        stranger.credential = "sk-unknown".into();

        let outcome = reconciler.reconcile(&stranger).await;

        assert_eq!(outcome.message, "Invalid API key: api key is not recognized");
        assert_eq!(count(&reconciler, StoreOperation::EnsureWorkspace).await, 0);
    }

    #[tokio::test]
    async fn workspace_failure_is_reported() {
        let reconciler = reconciler().await;
        reconciler.store().fail_operation_for_tests(StoreOperation::EnsureWorkspace).await;

        let outcome = reconciler.reconcile(&notification("added", "a.rs", "h1")).await;
        assert_eq!(outcome.message, "Failed to ensure workspace: injected failure");
    }

    #[tokio::test]
    async fn lookup_failure_on_added_is_reported() {
        let reconciler = reconciler().await;
        reconciler.store().fail_operation_for_tests(StoreOperation::GetFileByPath).await;

        let outcome = reconciler.reconcile(&notification("added", "a.rs", "h1")).await;
        assert_eq!(outcome.message, "Error checking for existing file: injected failure");
        assert_eq!(count(&reconciler, StoreOperation::CreateFile).await, 0);
    }

    #[tokio::test]
    async fn create_failure_is_reported() {
        let reconciler = reconciler().await;
        reconciler.store().fail_operation_for_tests(StoreOperation::CreateFile).await;

        let outcome = reconciler.reconcile(&notification("added", "a.rs", "h1")).await;
        assert_eq!(outcome.message, "Failed to create file: injected failure");
    }

    #[tokio::test]
    async fn update_failures_use_event_specific_messages() {
        let reconciler = reconciler().await;
        reconciler.reconcile(&notification("added", "a.rs", "h1")).await;
        reconciler.store().fail_operation_for_tests(StoreOperation::UpdateFile).await;

        let added = reconciler.reconcile(&notification("added", "a.rs", "h2")).await;
        let modified = reconciler.reconcile(&notification("modified", "a.rs", "h3")).await;

        assert_eq!(added.message, "Failed to update existing file: injected failure");
        assert_eq!(modified.message, "Failed to update file: injected failure");
    }

    #[tokio::test]
    async fn deleted_file_is_removed() {
        let reconciler = reconciler().await;
        reconciler.reconcile(&notification("added", "a.rs", "h1")).await;

        let outcome = reconciler.reconcile(&notification("deleted", "a.rs", "")).await;
        assert_eq!(outcome.message, "File deleted successfully");

        let again = reconciler.reconcile(&notification("deleted", "a.rs", "")).await;
        assert_eq!(again.message, "Failed to find file for deletion: record not found");
        assert_eq!(count(&reconciler, StoreOperation::DeleteFile).await, 1);
    }

    #[tokio::test]
    async fn delete_failure_is_reported() {
        let reconciler = reconciler().await;
        reconciler.reconcile(&notification("added", "a.rs", "h1")).await;
        reconciler.store().fail_operation_for_tests(StoreOperation::DeleteFile).await;

        let outcome = reconciler.reconcile(&notification("deleted", "a.rs", "")).await;
        assert_eq!(outcome.message, "Failed to delete file: injected failure");
    }

    #[tokio::test]
    async fn indexing_failure_does_not_change_outcome() {
        let reconciler = reconciler_with(ContentIndexer::failing_for_tests()).await;
        let outcome = reconciler.reconcile(&notification("added", "main.go", "h1")).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.message, "File created successfully");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_indexer_does_not_delay_outcome() {
        let indexer = ContentIndexer::stalled_for_tests(Duration::from_secs(30));
        let reconciler = reconciler_with(indexer.clone()).await;

        let outcome = tokio::time::timeout(
            Duration::from_secs(1),
            reconciler.reconcile(&notification("added", "src/slow.rs", "h1")),
        )
        .await
        .expect("outcome must not wait for the indexer");

        assert_eq!(outcome.message, "File created successfully");
        assert!(indexer.submissions().is_empty());
        let submissions = indexer.wait_for_submissions(1).await;
        assert_eq!(submissions[0].files[0].path, "src/slow.rs");
    }

    #[tokio::test]
    async fn workspace_is_resolved_once_per_root() {
        let reconciler = reconciler().await;
        reconciler.reconcile(&notification("added", "a.rs", "h1")).await;
        reconciler.reconcile(&notification("added", "b.rs", "h1")).await;

        assert_eq!(count(&reconciler, StoreOperation::EnsureWorkspace).await, 1);
    }
}
