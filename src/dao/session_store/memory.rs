use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
};

use futures::{FutureExt, future::BoxFuture};

use crate::dao::{models::SessionEntity, session_store::SessionStore, storage::StorageResult};

/// In-process store, used by tests and when no data path is configured.
#[derive(Clone, Default)]
pub struct MemoryStore {
    sessions: Arc<Mutex<Vec<SessionEntity>>>,
    saves: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with records, as if they were written by a previous run.
    pub fn with_sessions(sessions: Vec<SessionEntity>) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(sessions)),
            saves: Arc::default(),
        }
    }

    /// Last saved collection.
    pub fn saved(&self) -> Vec<SessionEntity> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of completed saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl SessionStore for MemoryStore {
    fn load(&self) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>> {
        let sessions = self.saved();
        async move { Ok(sessions) }.boxed()
    }

    fn save(&self, sessions: Vec<SessionEntity>) -> BoxFuture<'static, StorageResult<()>> {
        let slot = self.sessions.clone();
        let saves = self.saves.clone();
        async move {
            *slot.lock().unwrap_or_else(PoisonError::into_inner) = sessions;
            saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        .boxed()
    }
}
