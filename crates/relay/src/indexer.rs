// Best-effort content indexing.
//
// After a file is created or modified the relay submits its content to an
// external indexer. Submissions never influence reconciliation outcomes:
// callers log failures and move on.

#[cfg(test)]
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;
use worksync_common::language::CodeLanguage;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("indexer request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("indexer rejected submission with status {0}")]
    Rejected(u16),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexFile {
    pub path: String,
    pub language: Option<CodeLanguage>,
    pub content: String,
}

impl IndexFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = path.into();
        let language = CodeLanguage::from_path(&path);
        Self { path, language, content: content.into() }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexRequest<'a> {
    user_id: Uuid,
    workspace_id: Uuid,
    files: &'a [IndexFile],
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSubmission {
    pub user_id: Uuid,
    pub workspace_id: Uuid,
    pub files: Vec<IndexFile>,
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct IndexRecorder {
    submissions: Vec<IndexSubmission>,
    fail: bool,
    stall: Option<Duration>,
}

#[derive(Clone)]
pub enum ContentIndexer {
    Http { client: reqwest::Client, url: String },
    Disabled,
    #[cfg(test)]
    Memory(Arc<Mutex<IndexRecorder>>),
}

impl ContentIndexer {
    pub fn http(url: impl Into<String>, timeout: Duration) -> Result<Self, IndexError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::Http { client, url: url.into() })
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    pub async fn index_files(
        &self,
        user_id: Uuid,
        workspace_id: Uuid,
        files: &[IndexFile],
    ) -> Result<(), IndexError> {
        match self {
            Self::Http { client, url } => {
                let response = client
                    .post(url)
                    .json(&IndexRequest { user_id, workspace_id, files })
                    .send()
                    .await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(IndexError::Rejected(status.as_u16()));
                }
                Ok(())
            }
            Self::Disabled => Ok(()),
            #[cfg(test)]
            Self::Memory(recorder) => {
                let stall = recorder.lock().unwrap_or_else(|e| e.into_inner()).stall;
                if let Some(stall) = stall {
                    tokio::time::sleep(stall).await;
                }
                let mut recorder = recorder.lock().unwrap_or_else(|e| e.into_inner());
                if recorder.fail {
                    return Err(IndexError::Rejected(503));
                }
                recorder.submissions.push(IndexSubmission {
                    user_id,
                    workspace_id,
                    files: files.to_vec(),
                });
                Ok(())
            }
        }
    }
}

#[cfg(test)]
impl ContentIndexer {
    pub fn memory() -> Self {
        Self::Memory(Arc::new(Mutex::new(IndexRecorder::default())))
    }

    pub fn failing_for_tests() -> Self {
        Self::Memory(Arc::new(Mutex::new(IndexRecorder { fail: true, ..IndexRecorder::default() })))
    }

    /// Records submissions only after `stall` has elapsed.
    pub fn stalled_for_tests(stall: Duration) -> Self {
        Self::Memory(Arc::new(Mutex::new(IndexRecorder {
            stall: Some(stall),
            ..IndexRecorder::default()
        })))
    }

    /// Waits until at least `count` submissions were recorded.
    pub async fn wait_for_submissions(&self, count: usize) -> Vec<IndexSubmission> {
        let wait = async {
            loop {
                let submissions = self.submissions();
                if submissions.len() >= count {
                    return submissions;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(60), wait)
            .await
            .unwrap_or_else(|_| panic!("expected {count} index submissions"))
    }

    pub fn submissions(&self) -> Vec<IndexSubmission> {
        match self {
            Self::Memory(recorder) => {
                recorder.lock().unwrap_or_else(|e| e.into_inner()).submissions.clone()
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;
    use worksync_common::language::CodeLanguage;

    use super::{ContentIndexer, IndexFile, IndexRequest};

    #[test]
    fn index_file_detects_language_from_path() {
        assert_eq!(IndexFile::new("src/main.rs", "").language, Some(CodeLanguage::Rust));
        assert_eq!(IndexFile::new("README", "").language, None);
    }

    #[test]
    fn request_body_is_camel_case() {
        let files = vec![IndexFile::new("web/app.tsx", "export {}")];
        let body = serde_json::to_value(IndexRequest {
            user_id: Uuid::nil(),
            workspace_id: Uuid::nil(),
            files: &files,
        })
        .expect("index request should serialize");

        assert!(body.get("userId").is_some());
        assert!(body.get("workspaceId").is_some());
        assert_eq!(body["files"][0]["language"], "tsx");
        assert_eq!(body["files"][0]["path"], "web/app.tsx");
    }

    #[tokio::test]
    async fn disabled_indexer_accepts_everything() {
        let indexer = ContentIndexer::Disabled;
        assert!(!indexer.is_enabled());
        indexer
            .index_files(Uuid::new_v4(), Uuid::new_v4(), &[IndexFile::new("a.go", "package a")])
            .await
            .expect("disabled indexer should not fail");
    }

    #[tokio::test]
    async fn memory_indexer_records_submissions() {
        let indexer = ContentIndexer::memory();
        let user_id = Uuid::new_v4();
        indexer
            .index_files(user_id, Uuid::new_v4(), &[IndexFile::new("a.py", "print(1)")])
            .await
            .expect("memory indexer should record");

        let submissions = indexer.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].user_id, user_id);
        assert_eq!(submissions[0].files[0].language, Some(CodeLanguage::Python));
    }

    #[tokio::test]
    async fn unreachable_endpoint_surfaces_request_error() {
        let indexer = ContentIndexer::http("http://127.0.0.1:9/index", Duration::from_millis(200))
            .expect("client should build");
        let error = indexer
            .index_files(Uuid::new_v4(), Uuid::new_v4(), &[])
            .await
            .expect_err("nothing listens on the discard port");
        assert!(error.to_string().starts_with("indexer request failed"));
    }
}
