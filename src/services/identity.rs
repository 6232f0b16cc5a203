//! Player identity lookups.
//!
//! Display names only ever feed rendering. Engine decisions never depend on the name cache, so a
//! stale or placeholder name is harmless.

use std::{collections::HashMap, sync::Arc, time::Duration};

use dashmap::DashMap;
use futures::future::{BoxFuture, join_all};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{config::PlayerEntry, state::session::PlayerId};

/// Failure reported by an identity backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// The backend has no record of the player.
    #[error("player {0} is unknown")]
    UnknownPlayer(PlayerId),
    /// The backend could not be reached.
    #[error("identity backend unavailable: {0}")]
    Unavailable(String),
}

/// Source of display names and captain flags.
pub trait IdentityResolver: Send + Sync {
    /// Resolve the name shown for `player`.
    fn display_name(&self, player: PlayerId) -> BoxFuture<'static, Result<String, IdentityError>>;
    /// Whether `player` holds the captain role.
    fn is_captain(&self, player: PlayerId) -> BoxFuture<'static, bool>;
}

#[derive(Debug, Clone)]
struct DirectoryEntry {
    name: String,
    captain: bool,
}

/// Identity backend serving a fixed player directory.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    players: Arc<HashMap<PlayerId, DirectoryEntry>>,
}

impl StaticDirectory {
    /// Build the directory from configured player entries.
    pub fn from_entries(entries: &[PlayerEntry]) -> Self {
        let players = entries
            .iter()
            .map(|entry| {
                (
                    entry.id,
                    DirectoryEntry {
                        name: entry.name.clone(),
                        captain: entry.captain,
                    },
                )
            })
            .collect();
        Self {
            players: Arc::new(players),
        }
    }
}

impl IdentityResolver for StaticDirectory {
    fn display_name(&self, player: PlayerId) -> BoxFuture<'static, Result<String, IdentityError>> {
        let result = self
            .players
            .get(&player)
            .map(|entry| entry.name.clone())
            .ok_or(IdentityError::UnknownPlayer(player));
        Box::pin(async move { result })
    }

    fn is_captain(&self, player: PlayerId) -> BoxFuture<'static, bool> {
        let captain = self
            .players
            .get(&player)
            .is_some_and(|entry| entry.captain);
        Box::pin(async move { captain })
    }
}

/// Name shown when no backend answer is available.
pub fn placeholder_name(player: PlayerId) -> String {
    format!("Player {player}")
}

/// Multiple of the TTL after which an unrequested name is dropped from the cache.
const STALE_NAME_RETENTION: u32 = 4;

struct CachedName {
    name: String,
    fetched_at: Instant,
}

/// TTL cache in front of an [`IdentityResolver`].
pub struct CachedIdentity {
    inner: Arc<dyn IdentityResolver>,
    ttl: Duration,
    names: DashMap<PlayerId, CachedName>,
}

impl CachedIdentity {
    /// Wrap `inner`, keeping resolved names for `ttl`.
    pub fn new(inner: Arc<dyn IdentityResolver>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            names: DashMap::new(),
        }
    }

    /// Resolve a display name, serving fresh cache hits without asking the backend.
    ///
    /// Backend failures fall back to the last known name, then to a placeholder.
    pub async fn display_name(&self, player: PlayerId) -> String {
        if let Some(cached) = self.names.get(&player) {
            if cached.fetched_at.elapsed() < self.ttl {
                return cached.name.clone();
            }
        }

        match self.inner.display_name(player).await {
            Ok(name) => {
                self.names.insert(
                    player,
                    CachedName {
                        name: name.clone(),
                        fetched_at: Instant::now(),
                    },
                );
                name
            }
            Err(err) => {
                warn!(player_id = player, error = %err, "failed to resolve display name");
                match self.names.get(&player) {
                    Some(stale) => {
                        debug!(player_id = player, "serving stale display name");
                        stale.name.clone()
                    }
                    None => placeholder_name(player),
                }
            }
        }
    }

    /// Resolve several names concurrently.
    pub async fn display_names(
        &self,
        players: impl IntoIterator<Item = PlayerId>,
    ) -> HashMap<PlayerId, String> {
        let players: Vec<PlayerId> = players.into_iter().collect();
        self.evict_stale(&players);
        let names = join_all(players.iter().map(|&player| self.display_name(player))).await;
        players.into_iter().zip(names).collect()
    }

    /// Drop names far past their TTL, keeping those about to be requested as fallbacks.
    fn evict_stale(&self, requested: &[PlayerId]) {
        let retention = self.ttl * STALE_NAME_RETENTION;
        self.names.retain(|player, cached| {
            requested.contains(player) || cached.fetched_at.elapsed() < retention
        });
    }

    /// Captain flag straight from the backend; never cached.
    pub async fn is_captain(&self, player: PlayerId) -> bool {
        self.inner.is_captain(player).await
    }

    /// Subset of `players` holding the captain role, in input order.
    pub async fn captains_among(&self, players: &[PlayerId]) -> Vec<PlayerId> {
        let flags = join_all(players.iter().map(|&player| self.is_captain(player))).await;
        players
            .iter()
            .zip(flags)
            .filter_map(|(&player, captain)| captain.then_some(player))
            .collect()
    }
}
