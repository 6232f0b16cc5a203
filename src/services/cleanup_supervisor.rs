use std::time::{Duration, SystemTime};

use tokio::time::sleep;
use tracing::{debug, info};

use crate::state::{SharedState, session::SessionId};

/// Shortest pause between sweeps, whatever the configuration says.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Periodically evict sessions that outlived the retention policy.
pub async fn run(state: SharedState) {
    let interval = state.config().cleanup_interval.max(MIN_INTERVAL);
    info!(interval_secs = interval.as_secs(), "session cleanup started");

    loop {
        sleep(interval).await;
        sweep(&state, SystemTime::now()).await;
    }
}

/// Evict expired sessions, drop their pending refreshes and persist the result.
pub async fn sweep(state: &SharedState, now: SystemTime) -> Vec<SessionId> {
    let evicted = state.sessions().evict_expired(now);
    if evicted.is_empty() {
        debug!("no expired sessions");
        return evicted;
    }

    for id in &evicted {
        state.refresh().cancel(id);
    }
    info!(count = evicted.len(), "evicted expired sessions");
    state.sessions().persist().await;
    evicted
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::session_store::MemoryStore,
        services::{identity::StaticDirectory, scoring::MemoryLedger, session_service},
        state::{AppState, Collaborators},
    };

    #[tokio::test]
    async fn sweep_evicts_abandoned_sessions_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(
            AppConfig::default(),
            store.clone(),
            Collaborators {
                identity: Arc::new(StaticDirectory::default()),
                ledger: Arc::new(MemoryLedger::default()),
                summary: None,
            },
        )
        .await
        .unwrap();

        let empty = session_service::create_session(&state, "ranked").await.unwrap();
        let busy = session_service::create_session(&state, "ranked").await.unwrap();
        assert!(session_service::add_participant(&state, busy, 1).await.unwrap());

        let later = SystemTime::now() + Duration::from_secs(31 * 60);
        assert_eq!(sweep(&state, later).await, vec![empty]);
        assert!(!state.refresh().is_pending(&empty));

        let saved = store.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].id, busy);

        assert!(sweep(&state, later).await.is_empty());
    }
}
