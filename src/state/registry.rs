//! Keyed collection of live sessions and its persistence.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::{
    dao::{
        models::SessionEntity,
        session_store::SessionStore,
        storage::StorageResult,
    },
    services::coalescer::{Flight, SingleFlight},
    state::{
        session::{SessionId, TrainingSession},
        state_machine::SessionStatus,
    },
};

/// Age limits applied by the eviction sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Sessions without participants older than this are evicted.
    pub empty_ttl: Duration,
    /// Sessions that are not being played older than this are evicted.
    pub stale_ttl: Duration,
}

impl RetentionPolicy {
    /// Whether `session` should be evicted at `now`.
    pub fn is_expired(&self, session: &TrainingSession, now: SystemTime) -> bool {
        let age = session.age(now);
        (session.participants.is_empty() && age > self.empty_ttl)
            || (session.status != SessionStatus::InProgress && age > self.stale_ttl)
    }
}

/// Live sessions keyed by id.
///
/// Each mutation runs under the map's per-key lock; callers must not await while holding it.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, TrainingSession>,
    store: Arc<dyn SessionStore>,
    writer: SingleFlight,
    policy: RetentionPolicy,
}

impl SessionRegistry {
    /// Restore sessions from `store`.
    ///
    /// Records that cannot be restored are skipped, as are sessions still in registration without
    /// any participant.
    pub async fn load(store: Arc<dyn SessionStore>, policy: RetentionPolicy) -> StorageResult<Self> {
        let entities = store.load().await?;
        let total = entities.len();
        let sessions = DashMap::with_capacity(total);

        for entity in entities {
            let id = entity.id;
            match TrainingSession::try_from(entity) {
                Ok(session)
                    if session.status == SessionStatus::Registration
                        && session.participants.is_empty() =>
                {
                    debug!(session_id = %id, "dropping empty session on load");
                }
                Ok(session) => {
                    sessions.insert(id, session);
                }
                Err(err) => {
                    warn!(session_id = %id, error = %err, "skipping unreadable session");
                }
            }
        }

        info!(restored = sessions.len(), total, "sessions loaded");
        Ok(Self {
            sessions,
            store,
            writer: SingleFlight::new(),
            policy,
        })
    }

    /// Insert a new session.
    pub fn insert(&self, session: TrainingSession) {
        self.sessions.insert(session.id, session);
    }

    /// Apply `mutation` atomically to session `id`; `None` when it does not exist.
    pub fn mutate<T>(
        &self,
        id: SessionId,
        mutation: impl FnOnce(&mut TrainingSession) -> T,
    ) -> Option<T> {
        self.sessions
            .get_mut(&id)
            .map(|mut session| mutation(&mut session))
    }

    /// Clone of session `id`.
    pub fn snapshot(&self, id: SessionId) -> Option<TrainingSession> {
        self.sessions.get(&id).map(|session| session.clone())
    }

    /// Whether session `id` exists.
    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Clones of every session, oldest first.
    pub fn list(&self) -> Vec<TrainingSession> {
        let mut sessions: Vec<TrainingSession> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        sessions.sort_by_key(|session| session.created_at);
        sessions
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove session `id` if `predicate` holds, atomically with respect to other mutations.
    pub fn remove_if(
        &self,
        id: SessionId,
        predicate: impl FnOnce(&TrainingSession) -> bool,
    ) -> Option<TrainingSession> {
        self.sessions
            .remove_if(&id, |_, session| predicate(session))
            .map(|(_, session)| session)
    }

    /// Evict sessions that outlived the retention policy, returning their ids.
    pub fn evict_expired(&self, now: SystemTime) -> Vec<SessionId> {
        let mut evicted = Vec::new();
        self.sessions.retain(|id, session| {
            let expired = self.policy.is_expired(session, now);
            if expired {
                evicted.push(*id);
            }
            !expired
        });
        evicted
    }

    /// Write every session to the store.
    ///
    /// Concurrent calls coalesce into one trailing write that captures the latest state. Failures
    /// are logged; in-memory state is kept either way.
    pub async fn persist(&self) -> Flight {
        self.writer.run(|| self.write_all()).await
    }

    /// Write every session and return only once the current state is on disk, even when another
    /// write was already running.
    pub async fn persist_settled(&self) -> Flight {
        self.writer.run_settled(|| self.write_all()).await
    }

    /// Snapshot every session and save it.
    fn write_all(&self) -> impl Future<Output = ()> + Send + 'static {
        let store = self.store.clone();
        let entities: Vec<SessionEntity> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone().into())
            .collect();
        async move {
            let count = entities.len();
            match store.save(entities).await {
                Ok(()) => debug!(count, "sessions persisted"),
                Err(err) => warn!(error = %err, "failed to persist sessions"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::future::BoxFuture;
    use tokio::{sync::Semaphore, task::yield_now};

    use super::*;
    use crate::{
        dao::{models::BracketEntity, session_store::MemoryStore},
        state::session::{MatchBracket, Slot, Team},
    };

    const POLICY: RetentionPolicy = RetentionPolicy {
        empty_ttl: Duration::from_secs(30 * 60),
        stale_ttl: Duration::from_secs(12 * 60 * 60),
    };

    /// Store whose saves block until the test opens the gate.
    struct GatedStore {
        inner: MemoryStore,
        gate: Arc<Semaphore>,
    }

    impl SessionStore for GatedStore {
        fn load(&self) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>> {
            self.inner.load()
        }

        fn save(&self, sessions: Vec<SessionEntity>) -> BoxFuture<'static, StorageResult<()>> {
            let gate = self.gate.clone();
            let inner = self.inner.clone();
            Box::pin(async move {
                let _permit = gate.acquire_owned().await;
                inner.save(sessions).await
            })
        }
    }

    fn session(status: SessionStatus, participants: &[u64], age: Duration) -> TrainingSession {
        let mut session = TrainingSession::new("ranked");
        session.status = status;
        session.participants.extend(participants.iter().copied());
        session.created_at = SystemTime::now() - age;
        session
    }

    #[tokio::test]
    async fn load_drops_empty_registrations_and_broken_records() {
        let kept = session(SessionStatus::Registration, &[1], Duration::ZERO);
        let empty = session(SessionStatus::Registration, &[], Duration::ZERO);
        let drafted_empty = session(SessionStatus::Drafted, &[], Duration::ZERO);
        let mut broken: SessionEntity =
            session(SessionStatus::Drafted, &[1, 2], Duration::ZERO).into();
        broken.brackets.push(BracketEntity {
            slot_a: 0,
            slot_b: 1,
            winner: None,
            phase: "Final".into(),
            room_code: None,
        });

        let store = Arc::new(MemoryStore::with_sessions(vec![
            kept.clone().into(),
            empty.into(),
            drafted_empty.clone().into(),
            broken,
        ]));
        let registry = SessionRegistry::load(store, POLICY).await.unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(kept.id));
        assert!(registry.contains(drafted_empty.id));
    }

    #[test]
    fn retention_policy_matches_the_documented_ages() {
        let now = SystemTime::now();
        let minutes = |m: u64| Duration::from_secs(m * 60);

        assert!(POLICY.is_expired(&session(SessionStatus::Registration, &[], minutes(31)), now));
        assert!(!POLICY.is_expired(&session(SessionStatus::Registration, &[], minutes(29)), now));
        assert!(!POLICY.is_expired(&session(SessionStatus::Registration, &[1], minutes(31)), now));
        assert!(POLICY.is_expired(&session(SessionStatus::Drafted, &[1], minutes(12 * 60 + 1)), now));
        assert!(POLICY.is_expired(&session(SessionStatus::Finalized, &[1], minutes(12 * 60 + 1)), now));
        assert!(!POLICY.is_expired(&session(SessionStatus::InProgress, &[1], minutes(12 * 60 + 1)), now));
        assert!(POLICY.is_expired(&session(SessionStatus::InProgress, &[], minutes(31)), now));
    }

    #[tokio::test]
    async fn eviction_removes_only_expired_sessions() {
        let store = Arc::new(MemoryStore::new());
        let registry = SessionRegistry::load(store, POLICY).await.unwrap();
        let old = session(SessionStatus::Drafted, &[1, 2], Duration::from_secs(13 * 60 * 60));
        let fresh = session(SessionStatus::Drafted, &[1, 2], Duration::from_secs(60));
        registry.insert(old.clone());
        registry.insert(fresh.clone());

        assert_eq!(registry.evict_expired(SystemTime::now()), vec![old.id]);
        assert!(registry.contains(fresh.id));
        assert!(!registry.contains(old.id));
    }

    #[tokio::test]
    async fn persist_writes_the_current_sessions() {
        let store = Arc::new(MemoryStore::new());
        let registry = SessionRegistry::load(store.clone(), POLICY).await.unwrap();

        let mut drafted = session(SessionStatus::InProgress, &[1, 2, 3, 4], Duration::ZERO);
        drafted.teams = vec![Team::numbered(1, vec![1, 2]), Team::numbered(2, vec![3, 4])];
        drafted.brackets = vec![MatchBracket::new(Slot::Seed(1), Slot::Seed(2), "Final")];
        registry.insert(drafted.clone());

        assert_eq!(registry.persist().await, Flight::Led { runs: 1 });
        let saved = store.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].id, drafted.id);
        assert_eq!(saved[0].brackets[0].slot_b, 2);
    }

    #[tokio::test]
    async fn conditional_removal_respects_the_predicate() {
        let store = Arc::new(MemoryStore::new());
        let registry = SessionRegistry::load(store, POLICY).await.unwrap();
        let live = session(SessionStatus::InProgress, &[1, 2], Duration::ZERO);
        registry.insert(live.clone());

        assert!(registry
            .remove_if(live.id, |s| s.status == SessionStatus::Finalized)
            .is_none());
        registry.mutate(live.id, |s| s.status = SessionStatus::Finalized);
        assert_eq!(
            registry
                .remove_if(live.id, |s| s.status == SessionStatus::Finalized)
                .map(|s| s.id),
            Some(live.id)
        );
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn settled_persist_waits_for_the_running_write() {
        let memory = MemoryStore::new();
        let gate = Arc::new(Semaphore::new(0));
        let store = Arc::new(GatedStore {
            inner: memory.clone(),
            gate: gate.clone(),
        });
        let registry = Arc::new(SessionRegistry::load(store, POLICY).await.unwrap());
        registry.insert(session(SessionStatus::InProgress, &[1, 2], Duration::ZERO));

        let leader = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.persist().await })
        };
        while !registry.writer.is_in_flight() {
            yield_now().await;
        }

        let late = session(SessionStatus::InProgress, &[3, 4], Duration::ZERO);
        registry.insert(late.clone());
        let settled = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.persist_settled().await })
        };
        yield_now().await;
        assert!(!settled.is_finished());
        assert!(memory.saved().is_empty());

        gate.add_permits(1);
        assert_eq!(settled.await.unwrap(), Flight::Coalesced);
        let saved = memory.saved();
        assert_eq!(saved.len(), 2);
        assert!(saved.iter().any(|entity| entity.id == late.id));
        assert_eq!(leader.await.unwrap(), Flight::Led { runs: 2 });
    }
}
