//! In-memory session registry

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tutor_core::{EngineManager, Session, SessionConfig, Tutor};

use crate::error::AppError;

/// A session plus the lock that serializes requests against it
pub type SharedSession = Arc<Mutex<Session>>;

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

struct Entry {
    session: SharedSession,
    /// Milliseconds since the store's epoch at the last lookup
    touched_ms: AtomicU64,
}

pub struct SessionStore {
    sessions: RwLock<HashMap<u64, Entry>>,
    next_id: AtomicU64,
    epoch: Instant,
    idle_timeout: Duration,
    engine: Option<Arc<EngineManager>>,
    tutor: Tutor,
    config: SessionConfig,
}

impl SessionStore {
    pub fn new(engine: Option<Arc<EngineManager>>, tutor: Tutor, config: SessionConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            epoch: Instant::now(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            engine,
            tutor,
            config,
        }
    }

    /// Sessions untouched for longer than `timeout` are dropped when new ones
    /// are created
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn engine(&self) -> Option<&Arc<EngineManager>> {
        self.engine.as_ref()
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    pub async fn create(&self) -> (u64, SharedSession) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(Mutex::new(Session::new(
            self.engine.clone(),
            self.tutor.clone(),
            self.config,
        )));

        let mut sessions = self.sessions.write().await;
        let evicted = self.evict_idle_locked(&mut sessions);
        if evicted > 0 {
            tracing::info!(evicted, "Idle sessions evicted");
        }
        sessions.insert(
            id,
            Entry {
                session: session.clone(),
                touched_ms: AtomicU64::new(self.now_ms()),
            },
        );
        tracing::info!(session_id = id, "Session created");
        (id, session)
    }

    pub async fn get(&self, id: u64) -> Result<SharedSession, AppError> {
        let sessions = self.sessions.read().await;
        let entry = sessions
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("Session {id} not found")))?;
        entry.touched_ms.store(self.now_ms(), Ordering::Relaxed);
        Ok(entry.session.clone())
    }

    pub async fn remove(&self, id: u64) -> Result<(), AppError> {
        match self.sessions.write().await.remove(&id) {
            Some(_) => {
                tracing::info!(session_id = id, "Session closed");
                Ok(())
            }
            None => Err(AppError::NotFound(format!("Session {id} not found"))),
        }
    }

    /// Drop every session idle for longer than the timeout
    pub async fn evict_idle(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        self.evict_idle_locked(&mut sessions)
    }

    fn evict_idle_locked(&self, sessions: &mut HashMap<u64, Entry>) -> usize {
        let now = self.now_ms();
        let limit = self.idle_timeout.as_millis() as u64;
        let before = sessions.len();
        sessions.retain(|_, entry| now.saturating_sub(entry.touched_ms.load(Ordering::Relaxed)) <= limit);
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
