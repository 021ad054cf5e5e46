//! Scratch directory for auto-named snapshots
//!
//! The snapshot codec only needs a handful of filesystem capabilities; they
//! are gathered behind [`ScratchDir`] so the codec can be pointed at any
//! directory convention.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::error::BacklogResult;

/// Filesystem capabilities required by the snapshot codec
#[async_trait]
pub trait ScratchDir: Send + Sync {
    /// Root of the scratch directory
    fn path(&self) -> &Path;

    /// Whether the directory currently exists
    async fn exists(&self) -> bool;

    /// Create the directory (and parents) if missing
    async fn ensure(&self) -> BacklogResult<()>;

    /// Remove the files directly inside the directory that satisfy
    /// `matches`, returning how many were deleted. Subdirectories and
    /// non-matching files are left alone; a missing directory counts as empty.
    async fn empty(&self, matches: &(dyn for<'p> Fn(&'p Path) -> bool + Sync)) -> BacklogResult<usize>;

    /// Files directly inside the directory, sorted by path
    async fn list(&self) -> BacklogResult<Vec<PathBuf>>;

    /// Delete a single file
    async fn remove_file(&self, path: &Path) -> BacklogResult<()>;
}

/// [`ScratchDir`] backed by a real directory via `tokio::fs`
#[derive(Debug, Clone)]
pub struct FsScratchDir {
    root: PathBuf,
}

impl FsScratchDir {
    /// Use `root` as the scratch directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ScratchDir for FsScratchDir {
    fn path(&self) -> &Path {
        &self.root
    }

    async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.root).await.unwrap_or(false)
    }

    async fn ensure(&self) -> BacklogResult<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    async fn empty(&self, matches: &(dyn for<'p> Fn(&'p Path) -> bool + Sync)) -> BacklogResult<usize> {
        if !self.exists().await {
            return Ok(0);
        }

        let mut removed = 0;
        for path in self.list().await? {
            if !matches(&path) {
                continue;
            }
            tokio::fs::remove_file(&path).await?;
            trace!(path = %path.display(), "Pruned scratch entry");
            removed += 1;
        }

        debug!(dir = %self.root.display(), removed = removed, "Emptied scratch directory");
        Ok(removed)
    }

    async fn list(&self) -> BacklogResult<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    async fn remove_file(&self, path: &Path) -> BacklogResult<()> {
        tokio::fs::remove_file(path).await?;
        Ok(())
    }
}
