//! Process-wide mapping from session-id to its registry entry.
//!
//! Mutex granularity: one mutex per `Session`; the map
//! itself is guarded by a separate lock for membership changes (insert,
//! remove) so no caller ever needs to hold a global lock while mutating an
//! individual session.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use crate::session::Session;

pub type SharedSession = Arc<Mutex<Session>>;

#[derive(Default)]
pub struct Registry {
    sessions: RwLock<HashMap<String, SharedSession>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, session_id: &str) -> Option<SharedSession> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Returns the existing entry, or inserts and returns a new one built
    /// by `create`. `create` only runs when the session is genuinely new.
    pub async fn get_or_insert_with<F>(&self, session_id: &str, create: F) -> (SharedSession, bool)
    where
        F: FnOnce() -> Session,
    {
        if let Some(existing) = self.get(session_id).await {
            return (existing, false);
        }

        let mut guard = self.sessions.write().await;
        if let Some(existing) = guard.get(session_id) {
            return (existing.clone(), false);
        }
        let shared = Arc::new(Mutex::new(create()));
        guard.insert(session_id.to_string(), shared.clone());
        (shared, true)
    }

    pub async fn remove(&self, session_id: &str) -> Option<SharedSession> {
        self.sessions.write().await.remove(session_id)
    }

    pub async fn all_session_ids(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

pub fn now() -> chrono::DateTime<Utc> {
    Utc::now()
}
