pub mod registry;
pub mod session;
mod sse;
pub mod state_machine;

use std::sync::Arc;

use crate::{
    config::{AppConfig, ScoringRules},
    dao::{session_store::SessionStore, storage::StorageResult},
    services::{
        coalescer::Debouncer,
        identity::{CachedIdentity, IdentityResolver},
        scoring::ScoringLedger,
        summary::{SseSummarySink, SummarySink},
    },
};

pub use self::sse::SseHub;
use self::{
    registry::{RetentionPolicy, SessionRegistry},
    session::SessionId,
};

/// Handle to the application state shared across handlers.
pub type SharedState = Arc<AppState>;

/// Capacity of the public SSE broadcast channel.
const PUBLIC_SSE_CAPACITY: usize = 64;

/// External services the engine talks to.
pub struct Collaborators {
    /// Display names and captain flags.
    pub identity: Arc<dyn IdentityResolver>,
    /// Point awards at close-out.
    pub ledger: Arc<dyn ScoringLedger>,
    /// Close-out summary destination; defaults to the public SSE stream.
    pub summary: Option<Arc<dyn SummarySink>>,
}

/// Central application state shared by every request handler and background task.
pub struct AppState {
    config: AppConfig,
    sessions: SessionRegistry,
    sse: SseHub,
    refresh: Debouncer<SessionId>,
    identity: CachedIdentity,
    ledger: Arc<dyn ScoringLedger>,
    summary: Arc<dyn SummarySink>,
}

impl AppState {
    /// Construct the shared state, restoring persisted sessions from `store`.
    pub async fn new(
        config: AppConfig,
        store: Arc<dyn SessionStore>,
        collaborators: Collaborators,
    ) -> StorageResult<SharedState> {
        let policy = RetentionPolicy {
            empty_ttl: config.empty_session_ttl,
            stale_ttl: config.stale_session_ttl,
        };
        let sessions = SessionRegistry::load(store, policy).await?;
        let sse = SseHub::new(PUBLIC_SSE_CAPACITY);
        let summary: Arc<dyn SummarySink> = match collaborators.summary {
            Some(summary) => summary,
            None => Arc::new(SseSummarySink::new(sse.clone())),
        };

        Ok(Arc::new(Self {
            refresh: Debouncer::new(config.refresh_debounce),
            identity: CachedIdentity::new(collaborators.identity, config.name_cache_ttl),
            ledger: collaborators.ledger,
            summary,
            sessions,
            sse,
            config,
        }))
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Point values used at close-out.
    pub fn scoring_rules(&self) -> &ScoringRules {
        &self.config.scoring
    }

    /// Live sessions.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Broadcast hub used for the public SSE stream.
    pub fn public_sse(&self) -> &SseHub {
        &self.sse
    }

    /// Debounced snapshot broadcasts keyed by session.
    pub fn refresh(&self) -> &Debouncer<SessionId> {
        &self.refresh
    }

    /// Cached identity lookups.
    pub fn identity(&self) -> &CachedIdentity {
        &self.identity
    }

    /// Scoring ledger receiving close-out awards.
    pub fn ledger(&self) -> &dyn ScoringLedger {
        self.ledger.as_ref()
    }

    /// Destination of close-out summaries.
    pub fn summary(&self) -> &dyn SummarySink {
        self.summary.as_ref()
    }
}
