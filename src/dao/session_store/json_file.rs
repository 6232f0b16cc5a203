//! Session store writing the whole collection to a single JSON document.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::{FutureExt, future::BoxFuture};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::dao::{
    models::SessionEntity,
    session_store::SessionStore,
    storage::{StorageError, StorageResult},
};

/// On-disk document layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionsDocument {
    sessions: Vec<SessionEntity>,
}

#[derive(Clone)]
pub struct JsonFileStore {
    path: Arc<Path>,
}

impl JsonFileStore {
    /// Create a store backed by `path`. The file is created on the first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::from(path.into()),
        }
    }

    /// Location of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn read_document(path: Arc<Path>) -> StorageResult<Vec<SessionEntity>> {
    let contents = match fs::read_to_string(&path).await {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "sessions file not found; starting empty");
            return Ok(Vec::new());
        }
        Err(err) => {
            return Err(StorageError::unavailable(
                format!("failed to read `{}`", path.display()),
                err,
            ));
        }
    };

    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }

    serde_json::from_str::<SessionsDocument>(&contents)
        .map(|document| document.sessions)
        .map_err(|err| StorageError::malformed(format!("failed to parse `{}`", path.display()), err))
}

async fn write_document(path: Arc<Path>, sessions: Vec<SessionEntity>) -> StorageResult<()> {
    let payload = serde_json::to_vec_pretty(&SessionsDocument { sessions }).map_err(|err| {
        StorageError::malformed(format!("failed to encode `{}`", path.display()), err)
    })?;

    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(|err| {
            StorageError::unavailable(format!("failed to create `{}`", parent.display()), err)
        })?;
    }

    // Write next to the target and rename so readers never observe a torn file.
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, payload).await.map_err(|err| {
        StorageError::unavailable(format!("failed to write `{}`", staging.display()), err)
    })?;
    fs::rename(&staging, &path).await.map_err(|err| {
        StorageError::unavailable(format!("failed to replace `{}`", path.display()), err)
    })?;

    Ok(())
}

impl SessionStore for JsonFileStore {
    fn load(&self) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>> {
        read_document(self.path.clone()).boxed()
    }

    fn save(&self, sessions: Vec<SessionEntity>) -> BoxFuture<'static, StorageResult<()>> {
        write_document(self.path.clone(), sessions).boxed()
    }
}
