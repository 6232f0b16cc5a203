//! Cumulative player points awarded at close-out.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use thiserror::Error;
use tracing::info;

use crate::{config::ScoringRules, state::session::PlayerId};

/// Failure reported by a scoring ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The ledger could not be reached.
    #[error("scoring ledger unavailable: {0}")]
    Unavailable(String),
    /// The ledger refused the award.
    #[error("scoring ledger rejected the award: {0}")]
    Rejected(String),
}

/// Persistent store of player points, partitioned by category.
pub trait ScoringLedger: Send + Sync {
    /// Credit every member of the champion team.
    fn award_win(
        &self,
        category: &str,
        players: &[PlayerId],
    ) -> BoxFuture<'static, Result<(), LedgerError>>;
    /// Credit a highlighted player.
    fn award_highlight(
        &self,
        category: &str,
        player: PlayerId,
    ) -> BoxFuture<'static, Result<(), LedgerError>>;
    /// Credit the MVP.
    fn award_mvp(
        &self,
        category: &str,
        player: PlayerId,
    ) -> BoxFuture<'static, Result<(), LedgerError>>;
}

/// In-process ledger applying the configured point values.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    rules: ScoringRules,
    points: Arc<DashMap<(String, PlayerId), u64>>,
}

impl MemoryLedger {
    /// Create an empty ledger awarding points per `rules`.
    pub fn new(rules: ScoringRules) -> Self {
        Self {
            rules,
            points: Arc::new(DashMap::new()),
        }
    }

    /// Points accumulated by `player` in `category`.
    pub fn points(&self, category: &str, player: PlayerId) -> u64 {
        self.points
            .get(&(category.to_string(), player))
            .map(|entry| *entry)
            .unwrap_or(0)
    }

    fn credit(&self, category: &str, player: PlayerId, amount: u32) {
        *self
            .points
            .entry((category.to_string(), player))
            .or_insert(0) += u64::from(amount);
    }
}

impl ScoringLedger for MemoryLedger {
    fn award_win(
        &self,
        category: &str,
        players: &[PlayerId],
    ) -> BoxFuture<'static, Result<(), LedgerError>> {
        for &player in players {
            self.credit(category, player, self.rules.win);
        }
        info!(category, players = players.len(), "win points awarded");
        Box::pin(async { Ok(()) })
    }

    fn award_highlight(
        &self,
        category: &str,
        player: PlayerId,
    ) -> BoxFuture<'static, Result<(), LedgerError>> {
        self.credit(category, player, self.rules.highlight);
        Box::pin(async { Ok(()) })
    }

    fn award_mvp(
        &self,
        category: &str,
        player: PlayerId,
    ) -> BoxFuture<'static, Result<(), LedgerError>> {
        self.credit(category, player, self.rules.mvp);
        Box::pin(async { Ok(()) })
    }
}
