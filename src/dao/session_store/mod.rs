mod json_file;
mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use crate::dao::models::SessionEntity;
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;

/// Abstraction over the persistence layer for training sessions.
///
/// Backends persist the whole collection at once; the caller serializes writes.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>>;
    fn save(&self, sessions: Vec<SessionEntity>) -> BoxFuture<'static, StorageResult<()>>;
}
