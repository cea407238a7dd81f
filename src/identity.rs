//! Identity store collaborator.
//!
//! User accounts live outside this service; the core only needs the small
//! contract below. The in-memory implementation backs the default binary
//! and the test suite.

use crate::types::UserId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_watchlisted: bool,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn get_user(&self, id: &str) -> Option<UserRecord>;
    async fn list_users(&self, ids: &[UserId]) -> Vec<UserRecord>;
}

/// In-memory identity store.
pub struct InMemoryIdentityStore {
    users: RwLock<HashMap<UserId, UserRecord>>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Seed users from the `AGORA_USERS` environment variable, a
    /// comma-separated list of ids with an optional `:admin` suffix,
    /// e.g. `AGORA_USERS=alice:admin,bob,carol`.
    pub fn from_env() -> Self {
        let mut users = HashMap::new();
        if let Ok(spec) = std::env::var("AGORA_USERS") {
            for entry in spec.split(',') {
                let entry = entry.trim();
                if entry.is_empty() {
                    continue;
                }
                let (id, is_admin) = match entry.strip_suffix(":admin") {
                    Some(id) => (id, true),
                    None => (entry, false),
                };
                users.insert(
                    id.to_string(),
                    UserRecord {
                        id: id.to_string(),
                        display_name: None,
                        email: None,
                        is_admin,
                        is_watchlisted: false,
                    },
                );
            }
            tracing::info!("Seeded {} users from AGORA_USERS", users.len());
        }
        Self {
            users: RwLock::new(users),
        }
    }

    pub async fn insert(&self, user: UserRecord) {
        self.users.write().await.insert(user.id.clone(), user);
    }
}

impl Default for InMemoryIdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn get_user(&self, id: &str) -> Option<UserRecord> {
        self.users.read().await.get(id).cloned()
    }

    async fn list_users(&self, ids: &[UserId]) -> Vec<UserRecord> {
        let users = self.users.read().await;
        ids.iter().filter_map(|id| users.get(id).cloned()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let store = InMemoryIdentityStore::new();
        store
            .insert(UserRecord {
                id: "alice".into(),
                display_name: Some("Alice".into()),
                email: Some("alice@example.org".into()),
                is_admin: false,
                is_watchlisted: false,
            })
            .await;

        assert!(store.get_user("alice").await.is_some());
        assert!(store.get_user("bob").await.is_none());

        let listed = store
            .list_users(&["alice".to_string(), "bob".to_string()])
            .await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "alice");
    }
}
