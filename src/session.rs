//! Participant sessions.
//!
//! A session carries the participant id and the current task counter for one
//! pass through a flow. Sessions are held in memory only: losing the session
//! id restarts the participant at task zero.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::flow::FlowKind;

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub flow: FlowKind,
    pub participant_id: String,
    /// Zero-based index of the task currently shown
    pub task_id: usize,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Session {
    pub fn new(flow: FlowKind, participant_id: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            flow,
            participant_id,
            task_id: 0,
            created_at: now,
            last_seen: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }
}

/// A session behind its own lock, so one participant's requests run one at a time.
pub type SessionHandle = Arc<Mutex<Session>>;

/// In-memory session table.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: Session) -> SessionHandle {
        let id = session.id;
        let handle = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(id, Arc::clone(&handle));
        handle
    }

    pub async fn get(&self, id: Uuid) -> Option<SessionHandle> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop sessions idle for longer than `ttl`. Returns how many were removed.
    pub async fn evict_idle(&self, ttl: Duration) -> usize {
        let cutoff = Utc::now() - ttl;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        let mut expired = Vec::new();
        for (id, handle) in sessions.iter() {
            // A locked session is mid-request and therefore not idle.
            if let Ok(session) = handle.try_lock() {
                if session.last_seen < cutoff {
                    expired.push(*id);
                }
            }
        }
        for id in expired {
            sessions.remove(&id);
        }
        before - sessions.len()
    }

    /// Periodically evict idle sessions in the background.
    pub fn start_cleanup_task(self: Arc<Self>, ttl: Duration) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                let removed = self.evict_idle(ttl).await;
                if removed > 0 {
                    tracing::info!("Evicted {} idle annotation sessions", removed);
                }
            }
        });
    }
}
