//! Process-local session store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{SessionKey, SessionStore, DEFAULT_SESSION_TTL};
use crate::error::AppError;

#[derive(Debug)]
struct Entry {
    workspace: String,
    expires_at: Instant,
}

/// In-memory session store for a single server instance.
///
/// One lock guards the whole map; every operation is a single map access and
/// the lock is never held across an `.await`. Entries idle for longer than
/// the TTL read as absent and are dropped by [`SessionStore::purge_expired`].
#[derive(Debug)]
pub struct MemoryStore {
    ttl: Duration,
    entries: Mutex<HashMap<SessionKey, Entry>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_SESSION_TTL)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of sessions currently holding a workspace.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<SessionKey, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self) -> Result<SessionKey, AppError> {
        Ok(SessionKey::generate())
    }

    async fn get_workspace(&self, key: &SessionKey) -> Result<String, AppError> {
        let now = Instant::now();
        let mut entries = self.entries();

        match entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.expires_at = now + self.ttl;
                Ok(entry.workspace.clone())
            }
            Some(_) => {
                entries.remove(key);
                Err(AppError::NoWorkspaceSelected)
            }
            None => Err(AppError::NoWorkspaceSelected),
        }
    }

    async fn set_workspace(&self, key: &SessionKey, workspace_id: &str) -> Result<(), AppError> {
        tracing::debug!(session = %key, workspace = workspace_id, "Setting session workspace");
        self.entries().insert(
            key.clone(),
            Entry {
                workspace: workspace_id.to_string(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(())
    }

    async fn remove_session(&self, key: &SessionKey) -> Result<(), AppError> {
        self.entries().remove(key);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, AppError> {
        let now = Instant::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_get_without_set_fails() {
        let store = MemoryStore::new();
        let key = store.create_session().await.unwrap();
        assert!(matches!(
            store.get_workspace(&key).await,
            Err(AppError::NoWorkspaceSelected)
        ));
    }

    #[tokio::test]
    async fn test_create_session_stores_nothing() {
        let store = MemoryStore::new();
        for _ in 0..10 {
            store.create_session().await.unwrap();
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = MemoryStore::new();
        let key = SessionKey::from("s-1");

        store.set_workspace(&key, "ws-1").await.unwrap();
        assert_eq!(store.get_workspace(&key).await.unwrap(), "ws-1");

        store.set_workspace(&key, "ws-2").await.unwrap();
        assert_eq!(store.get_workspace(&key).await.unwrap(), "ws-2");
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = MemoryStore::new();
        let a = store.create_session().await.unwrap();
        let b = store.create_session().await.unwrap();
        assert_ne!(a, b);

        store.set_workspace(&a, "ws-a").await.unwrap();

        assert_eq!(store.get_workspace(&a).await.unwrap(), "ws-a");
        assert!(store.get_workspace(&b).await.is_err());
    }

    #[tokio::test]
    async fn test_removed_session_reads_as_absent() {
        let store = MemoryStore::new();
        let key = SessionKey::from("s-1");
        store.set_workspace(&key, "ws-1").await.unwrap();

        store.remove_session(&key).await.unwrap();

        assert!(store.is_empty());
        assert!(matches!(
            store.get_workspace(&key).await,
            Err(AppError::NoWorkspaceSelected)
        ));
    }

    #[tokio::test]
    async fn test_purge_keeps_store_bounded() {
        let store = MemoryStore::with_ttl(Duration::from_millis(20));
        for i in 0..100 {
            let key = SessionKey::from(format!("s-{}", i));
            store.set_workspace(&key, "ws").await.unwrap();
        }
        assert_eq!(store.len(), 100);

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(store.purge_expired().await.unwrap(), 100);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_read_refreshes_ttl() {
        let store = MemoryStore::with_ttl(Duration::from_millis(200));
        let key = SessionKey::from("s-1");
        store.set_workspace(&key, "ws-1").await.unwrap();

        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(80)).await;
            assert_eq!(store.get_workspace(&key).await.unwrap(), "ws-1");
        }
        assert_eq!(store.purge_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expired_session_reads_as_absent() {
        let store = MemoryStore::with_ttl(Duration::from_millis(20));
        let key = SessionKey::from("s-1");
        store.set_workspace(&key, "ws-1").await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(matches!(
            store.get_workspace(&key).await,
            Err(AppError::NoWorkspaceSelected)
        ));
        assert!(store.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sessions() {
        let store = Arc::new(MemoryStore::new());

        let handles: Vec<_> = (0..64)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let key = SessionKey::from(format!("s-{}", i));
                    let workspace = format!("ws-{}", i);
                    store.set_workspace(&key, &workspace).await.unwrap();
                    store.get_workspace(&key).await.unwrap() == workspace
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap());
        }
    }
}
