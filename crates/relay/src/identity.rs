// API-key identity resolution.
//
// Keys are never stored in clear text: both backends index users by the hex
// SHA-256 digest of the key.

use std::{collections::HashMap, sync::Arc};

use sha2::{Digest, Sha256};
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;
use worksync_common::types::User;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("api key is missing")]
    Missing,
    #[error("api key is not recognized")]
    Unknown,
    #[error("api key lookup failed: {0}")]
    Lookup(#[from] sqlx::Error),
}

#[derive(Clone)]
pub enum IdentityResolver {
    Postgres(PgPool),
    Memory(Arc<RwLock<HashMap<String, User>>>),
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    display_name: String,
}

impl From<UserRow> for User {
    fn from(value: UserRow) -> Self {
        Self { id: value.id, email: value.email, display_name: value.display_name }
    }
}

impl IdentityResolver {
    pub fn memory() -> Self {
        Self::Memory(Arc::new(RwLock::new(HashMap::new())))
    }

    pub async fn resolve_by_credential(&self, credential: &str) -> Result<User, IdentityError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(IdentityError::Missing);
        }
        let key_hash = hash_api_key(credential);

        match self {
            Self::Postgres(pool) => sqlx::query_as::<_, UserRow>(
                r#"
                SELECT id, email, display_name
                FROM users
                WHERE api_key_hash = $1
                  AND disabled_at IS NULL
                "#,
            )
            .bind(&key_hash)
            .fetch_optional(pool)
            .await?
            .map(User::from)
            .ok_or(IdentityError::Unknown),
            Self::Memory(users) => {
                users.read().await.get(&key_hash).cloned().ok_or(IdentityError::Unknown)
            }
        }
    }

    /// Register `api_key` for `user`. Only the in-memory backend accepts
    /// registrations; PostgreSQL keys are provisioned out of band.
    pub async fn register_api_key(&self, api_key: &str, user: User) -> bool {
        match self {
            Self::Postgres(_) => false,
            Self::Memory(users) => {
                users.write().await.insert(hash_api_key(api_key.trim()), user);
                true
            }
        }
    }
}

pub fn hash_api_key(api_key: &str) -> String {
    format!("{:x}", Sha256::digest(api_key.as_bytes()))
}
