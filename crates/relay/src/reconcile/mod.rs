// File-change reconciliation.
//
// A `file:update` payload is decoded into a `ChangeNotification`, reconciled
// against the workspace store by the `Reconciler`, and reported back as a
// single `ReconciliationOutcome`.

pub mod decode;
pub mod engine;

use worksync_common::protocol::sync::{AckStatus, FileUpdatePayload, FinalResult};

pub use decode::RawPayload;
pub use engine::Reconciler;

/// One reported file-system event. Immutable once decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeNotification {
    pub id: String,
    pub file_path: String,
    pub content_hash: String,
    pub previous_hash: String,
    /// Raw event kind; validated by the reconciler.
    pub event_kind: String,
    pub content: String,
    pub timestamp: i64,
    pub credential: String,
    pub workspace_root: String,
}

impl From<FileUpdatePayload> for ChangeNotification {
    fn from(payload: FileUpdatePayload) -> Self {
        Self {
            id: payload.id,
            file_path: payload.file_path,
            content_hash: payload.hash,
            previous_hash: payload.previous_hash,
            event_kind: payload.event,
            content: payload.content,
            timestamp: payload.timestamp,
            credential: payload.api_key,
            workspace_root: payload.workspace_path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationOutcome {
    pub status: AckStatus,
    pub message: String,
    pub file_path: String,
    pub correlation_id: String,
}

impl ReconciliationOutcome {
    pub fn succeeded(notification: &ChangeNotification, message: impl Into<String>) -> Self {
        Self::with_status(notification, AckStatus::Success, message.into())
    }

    pub fn failed(notification: &ChangeNotification, message: impl Into<String>) -> Self {
        Self::with_status(notification, AckStatus::Error, message.into())
    }

    fn with_status(notification: &ChangeNotification, status: AckStatus, message: String) -> Self {
        Self {
            status,
            message,
            file_path: notification.file_path.clone(),
            correlation_id: notification.id.clone(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == AckStatus::Success
    }

    pub fn into_final_result(self) -> FinalResult {
        FinalResult {
            id: self.correlation_id,
            status: self.status,
            message: self.message,
            file: self.file_path,
        }
    }
}
