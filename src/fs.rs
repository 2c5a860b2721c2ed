//! Filesystem capability used by the file-serving handler.
//!
//! The handler only needs to open a path and read it to the end, so the trait
//! exposes exactly that. `OsFs` talks to the real disk through `tokio::fs`;
//! `MemFs` keeps files in memory for tests.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;

pub trait FileSystem: Send + Sync + 'static {
    type Handle: Send;

    /// Opens `path` for reading. A missing file yields `ErrorKind::NotFound`.
    fn open(&self, path: &Path) -> impl Future<Output = io::Result<Self::Handle>> + Send;

    /// Reads the rest of an open file.
    fn read_all(&self, handle: &mut Self::Handle) -> impl Future<Output = io::Result<Vec<u8>>> + Send;
}

/// The host filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFs;

impl FileSystem for OsFs {
    type Handle = tokio::fs::File;

    async fn open(&self, path: &Path) -> io::Result<Self::Handle> {
        tokio::fs::File::open(path).await
    }

    async fn read_all(&self, handle: &mut Self::Handle) -> io::Result<Vec<u8>> {
        let mut data = Vec::new();
        handle.read_to_end(&mut data).await?;
        Ok(data)
    }
}

/// An in-memory filesystem keyed by exact path.
///
/// Clones share the same file table.
#[derive(Debug, Clone, Default)]
pub struct MemFs {
    files: Arc<RwLock<HashMap<PathBuf, Bytes>>>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<Bytes>) {
        self.files.write().await.insert(path.into(), contents.into());
    }

    pub async fn remove(&self, path: &Path) -> Option<Bytes> {
        self.files.write().await.remove(path)
    }
}

impl FileSystem for MemFs {
    type Handle = Bytes;

    async fn open(&self, path: &Path) -> io::Result<Self::Handle> {
        self.files
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path.display())))
    }

    async fn read_all(&self, handle: &mut Self::Handle) -> io::Result<Vec<u8>> {
        Ok(std::mem::take(handle).to_vec())
    }
}
