// Read-through cache of workspace resolutions.
//
// Workspaces are never deleted by the relay, so entries only leave the cache
// when their TTL elapses.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{sync::RwLock, time::Instant};
use uuid::Uuid;

use super::{StoreError, WorkspaceStore};

#[derive(Debug, Clone, Copy)]
struct CachedWorkspace {
    workspace_id: Uuid,
    expires_at: Instant,
}

#[derive(Clone)]
pub struct WorkspaceCache {
    ttl: Duration,
    entries: Arc<RwLock<HashMap<(Uuid, String), CachedWorkspace>>>,
}

impl WorkspaceCache {
    /// A zero `ttl` disables caching; every call reaches the store.
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Resolve the workspace id for `(user_id, root_path)`, creating the
    /// workspace through `store` on a miss.
    pub async fn ensure_workspace(
        &self,
        store: &WorkspaceStore,
        user_id: Uuid,
        root_path: &str,
        label: &str,
    ) -> Result<Uuid, StoreError> {
        let key = (user_id, root_path.to_owned());

        if self.is_enabled() {
            if let Some(cached) = self.entries.read().await.get(&key) {
                if cached.expires_at > Instant::now() {
                    tracing::trace!(%user_id, root_path, "workspace cache hit");
                    return Ok(cached.workspace_id);
                }
            }
        }

        let workspace = store.ensure_workspace(user_id, root_path, label).await?;

        if self.is_enabled() {
            let mut entries = self.entries.write().await;
            let now = Instant::now();
            entries.retain(|_, entry| entry.expires_at > now);
            entries.insert(
                key,
                CachedWorkspace { workspace_id: workspace.id, expires_at: now + self.ttl },
            );
        }

        Ok(workspace.id)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
