// Core domain types shared across the worksync crates.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// An account resolved from an API key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
}

/// A synchronized workspace, unique per `(user_id, root_path)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Workspace {
    pub id: Uuid,
    pub user_id: Uuid,
    pub root_path: String,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A file tracked inside a workspace, unique per `(workspace_id, path)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkspaceFile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub workspace_id: Uuid,
    pub path: String,
    pub content: String,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// File-system event kinds a client may report.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    InitialScan,
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown event type: {0}")]
pub struct UnknownEventKind(pub String);

impl EventKind {
    pub const ALL: [Self; 4] = [Self::InitialScan, Self::Added, Self::Modified, Self::Deleted];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InitialScan => "initial_scan",
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }
}

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "initial_scan" => Ok(Self::InitialScan),
            "added" => Ok(Self::Added),
            "modified" => Ok(Self::Modified),
            "deleted" => Ok(Self::Deleted),
            other => Err(UnknownEventKind(other.to_string())),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
