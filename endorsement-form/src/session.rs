use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::{catalog::FormCatalog, error::StorageError, form::FormState};

/// One user's form, from first edit to submission.
#[derive(Debug, Clone)]
pub struct FormSession {
    pub id: String,
    pub state: FormState,
    pub status_message: Option<String>,
    pub submitted: bool,
}

impl FormSession {
    pub fn new(catalog: Arc<FormCatalog>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), catalog)
    }

    pub fn with_id(id: impl Into<String>, catalog: Arc<FormCatalog>) -> Self {
        Self {
            id: id.into(),
            state: FormState::new(catalog),
            status_message: None,
            submitted: false,
        }
    }
}

/// Trait for storing and retrieving form sessions
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn save(&self, session: FormSession) -> Result<(), StorageError>;
    async fn get(&self, id: &str) -> Result<Option<FormSession>, StorageError>;
    async fn delete(&self, id: &str) -> Result<(), StorageError>;
}

/// In-memory implementation of SessionStorage
pub struct InMemorySessionStorage {
    sessions: Arc<DashMap<String, FormSession>>,
}

impl InMemorySessionStorage {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }
}

impl Default for InMemorySessionStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn save(&self, session: FormSession) -> Result<(), StorageError> {
        self.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<FormSession>, StorageError> {
        Ok(self.sessions.get(id).map(|entry| entry.clone()))
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.sessions.remove(id);
        Ok(())
    }
}

/// Per-session mutexes. Holding a session's guard across load, modify and save
/// keeps concurrent writers from overwriting each other's snapshot.
#[derive(Clone, Default)]
pub struct SessionLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(id.to_string()).or_default().clone();
        lock.lock_owned().await
    }
}
