//! Snapshot codec (freeze / load)
//!
//! A snapshot is the whole backlog written as a pretty-printed JSON array:
//!
//! ```text
//! [
//!   { "consumed": true,  "value": ... },
//!   { "consumed": false, "value": ... }
//! ]
//! ```
//!
//! Snapshots are written either to an explicit path or, when none is given,
//! to an auto-named file in the scratch directory. Auto-named files are
//! `snapshot-<micros>.json` with the timestamp zero-padded, so the newest one
//! sorts last. At most one auto-named snapshot is kept: freezing deletes
//! earlier auto-named snapshots first, and loading deletes all but the
//! newest. Other files in the scratch directory are never touched.
//!
//! Loading resumes at the first unconsumed record.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use crate::config::SequenceOptions;
use crate::error::{BacklogError, BacklogResult, ConfigError};
use crate::record::Record;
use crate::scratch::{FsScratchDir, ScratchDir};
use crate::sequence::Sequence;
use crate::store::{BacklogStore, resume_index};

/// File name prefix of auto-named snapshots
pub const SNAPSHOT_PREFIX: &str = "snapshot-";

/// File extension of auto-named snapshots
pub const SNAPSHOT_EXTENSION: &str = "json";

/// How a loaded snapshot is combined with the live backlog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// Discard current state; the snapshot becomes the backlog
    #[default]
    Replace,
    /// Append only the snapshot's unconsumed tail; the cursor is untouched
    Append,
}

impl From<bool> for LoadMode {
    fn from(append: bool) -> Self {
        if append {
            LoadMode::Append
        } else {
            LoadMode::Replace
        }
    }
}

/// What a load did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    /// File the snapshot was read from
    pub path: PathBuf,
    /// Mode used
    pub mode: LoadMode,
    /// Records decoded from the file
    pub records: usize,
    /// Records added to the live backlog
    pub appended: usize,
    /// Cursor after the load
    pub cursor: usize,
}

/// Reject paths that cannot name a snapshot file. Performs no I/O.
pub fn validate_path(path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::InvalidPath("path is empty".to_string()));
    }
    if path.file_name().is_none() {
        return Err(ConfigError::InvalidPath(format!(
            "{} does not name a file",
            path.display()
        )));
    }
    Ok(())
}

/// Fresh auto-snapshot file name, strictly increasing within the process
pub fn snapshot_file_name() -> String {
    format!(
        "{}{:020}.{}",
        SNAPSHOT_PREFIX,
        next_stamp(),
        SNAPSHOT_EXTENSION
    )
}

fn next_stamp() -> i64 {
    static LAST: AtomicI64 = AtomicI64::new(0);

    let now = chrono::Utc::now().timestamp_micros();
    let prev = LAST
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or_else(|last| last);
    now.max(prev + 1)
}

/// Whether `path` looks like an auto-named snapshot
pub fn is_snapshot_file(path: &Path) -> bool {
    let named = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(SNAPSHOT_PREFIX));
    let json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e == SNAPSHOT_EXTENSION);
    named && json
}

/// Reads and writes backlog snapshots
#[derive(Debug, Clone)]
pub struct SnapshotCodec<D = FsScratchDir> {
    scratch: D,
}

impl<D: ScratchDir> SnapshotCodec<D> {
    /// Create a codec using `scratch` for auto-named snapshots
    pub fn new(scratch: D) -> Self {
        Self { scratch }
    }

    /// The scratch directory backing auto-named snapshots
    pub fn scratch(&self) -> &D {
        &self.scratch
    }

    /// Serialize records to snapshot JSON
    pub fn encode<T: Serialize>(records: &[Record<T>]) -> BacklogResult<Vec<u8>> {
        serde_json::to_vec_pretty(records).map_err(|e| BacklogError::serialization(e.to_string()))
    }

    /// Parse snapshot JSON
    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> BacklogResult<Vec<Record<T>>> {
        serde_json::from_slice(bytes).map_err(|e| BacklogError::deserialization(e.to_string()))
    }

    /// Write encoded snapshot bytes to `path`, or to a fresh auto-named file
    #[instrument(skip_all)]
    pub async fn persist(&self, bytes: Vec<u8>, path: Option<&Path>) -> BacklogResult<PathBuf> {
        let target = match path {
            Some(path) => {
                validate_path(path)?;
                path.to_path_buf()
            }
            None => {
                let pruned = self.scratch.empty(&is_snapshot_file).await?;
                self.scratch.ensure().await?;
                if pruned > 0 {
                    debug!(pruned = pruned, "Pruned previous snapshots");
                }
                self.scratch.path().join(snapshot_file_name())
            }
        };

        tokio::fs::write(&target, &bytes).await?;
        debug!(path = %target.display(), bytes = bytes.len(), "Wrote snapshot");
        Ok(target)
    }

    /// Encode and persist `records`
    pub async fn write<T: Serialize>(
        &self,
        records: &[Record<T>],
        path: Option<&Path>,
    ) -> BacklogResult<PathBuf> {
        let bytes = Self::encode(records)?;
        self.persist(bytes, path).await
    }

    /// Read a snapshot
    ///
    /// With an explicit path, a missing file is [`BacklogError::SnapshotNotFound`].
    /// Without one, the newest auto-named snapshot is used and `None` is
    /// returned when there is nothing to load.
    #[instrument(skip_all)]
    pub async fn read<T: DeserializeOwned>(
        &self,
        path: Option<&Path>,
    ) -> BacklogResult<Option<(PathBuf, Vec<Record<T>>)>> {
        let source = match path {
            Some(path) => {
                validate_path(path)?;
                path.to_path_buf()
            }
            None => match self.latest().await? {
                Some(latest) => latest,
                None => {
                    debug!(dir = %self.scratch.path().display(), "No snapshot to load");
                    return Ok(None);
                }
            },
        };

        let bytes = match tokio::fs::read(&source).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if path.is_some() {
                    return Err(BacklogError::SnapshotNotFound(source));
                }
                warn!(path = %source.display(), "Snapshot vanished before it could be read");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let records = Self::decode(&bytes)?;
        debug!(path = %source.display(), records = records.len(), "Read snapshot");
        Ok(Some((source, records)))
    }

    /// Newest auto-named snapshot, deleting any older ones
    pub async fn latest(&self) -> BacklogResult<Option<PathBuf>> {
        if !self.scratch.exists().await {
            return Ok(None);
        }

        let mut snapshots: Vec<PathBuf> = self
            .scratch
            .list()
            .await?
            .into_iter()
            .filter(|p| is_snapshot_file(p))
            .collect();

        let Some(latest) = snapshots.pop() else {
            return Ok(None);
        };

        for stale in snapshots {
            self.scratch.remove_file(&stale).await?;
            debug!(path = %stale.display(), "Removed stale snapshot");
        }

        Ok(Some(latest))
    }
}

impl<T> Sequence<T> {
    /// Codec over this sequence's scratch directory
    pub fn snapshot_codec(&self) -> SnapshotCodec<FsScratchDir> {
        SnapshotCodec::new(FsScratchDir::new(self.options().scratch_dir().to_path_buf()))
    }
}

impl<T: Clone + Serialize> Sequence<T> {
    /// Stop the sequence and write its backlog to a snapshot
    ///
    /// Without a path the snapshot is auto-named in the scratch directory,
    /// replacing any earlier auto-named snapshot. Returns the file written.
    ///
    /// Freezing always finishes the sequence, even if writing fails.
    pub async fn freeze(&self, path: Option<&Path>) -> BacklogResult<PathBuf> {
        let codec = self.snapshot_codec();
        self.freeze_with(&codec, path).await
    }

    /// [`freeze`](Self::freeze) through a specific codec
    pub async fn freeze_with<D: ScratchDir>(
        &self,
        codec: &SnapshotCodec<D>,
        path: Option<&Path>,
    ) -> BacklogResult<PathBuf> {
        if let Some(path) = path {
            validate_path(path)?;
        }

        let (bytes, count, cursor) = {
            let (records, cursor) = self.halt_and_collect();
            (SnapshotCodec::<D>::encode(&records)?, records.len(), cursor)
        };

        let written = codec.persist(bytes, path).await?;
        info!(
            path = %written.display(),
            records = count,
            cursor = cursor,
            "Froze sequence"
        );
        Ok(written)
    }
}

impl<T: DeserializeOwned> Sequence<T> {
    /// Load a snapshot into this sequence
    ///
    /// Without a path the newest auto-named snapshot is used; if there is
    /// none this is a no-op returning `None`. An explicit path that does not
    /// exist is an error.
    ///
    /// [`LoadMode::Replace`] swaps in the snapshot and revives a finished
    /// sequence. [`LoadMode::Append`] adds the snapshot's unconsumed tail and,
    /// like [`update`](Self::update), does nothing on a finished sequence.
    pub async fn load(
        &self,
        path: Option<&Path>,
        mode: LoadMode,
    ) -> BacklogResult<Option<LoadSummary>> {
        let codec = self.snapshot_codec();
        self.load_with(&codec, path, mode).await
    }

    /// [`load`](Self::load) through a specific codec
    pub async fn load_with<D: ScratchDir>(
        &self,
        codec: &SnapshotCodec<D>,
        path: Option<&Path>,
        mode: LoadMode,
    ) -> BacklogResult<Option<LoadSummary>> {
        let Some((path, records)) = codec.read::<T>(path).await? else {
            return Ok(None);
        };

        let total = records.len();
        let summary = match mode {
            LoadMode::Replace => {
                let cursor = self.replace(records);
                LoadSummary {
                    path,
                    mode,
                    records: total,
                    appended: total,
                    cursor,
                }
            }
            LoadMode::Append => {
                let resume = resume_index(&records);
                let tail: Vec<Record<T>> = records.into_iter().skip(resume).collect();
                let appended = match self.append_loaded(tail) {
                    Some(appended) => appended,
                    None => {
                        warn!(path = %path.display(), "Ignoring append-mode load on finished sequence");
                        0
                    }
                };
                LoadSummary {
                    path,
                    mode,
                    records: total,
                    appended,
                    cursor: self.index(),
                }
            }
        };

        info!(
            path = %summary.path.display(),
            mode = ?summary.mode,
            records = summary.records,
            appended = summary.appended,
            cursor = summary.cursor,
            "Loaded snapshot"
        );
        Ok(Some(summary))
    }

    /// Create a live sequence from an explicit snapshot file
    ///
    /// # Errors
    ///
    /// [`BacklogError::SnapshotNotFound`] if the file is missing, and
    /// [`ConfigError::EmptyBacklog`] if it holds no records.
    pub async fn restore(path: &Path, options: SequenceOptions) -> BacklogResult<Self> {
        let codec = SnapshotCodec::new(FsScratchDir::new(options.scratch_dir().to_path_buf()));
        let Some((_, records)) = codec.read::<T>(Some(path)).await? else {
            return Err(BacklogError::SnapshotNotFound(path.to_path_buf()));
        };
        if records.is_empty() {
            return Err(ConfigError::EmptyBacklog.into());
        }

        let store = BacklogStore::from_records(records);
        let cursor = store.resume_index();
        info!(path = %path.display(), len = store.len(), cursor = cursor, "Restored sequence");
        Ok(Self::from_parts(store, cursor, options))
    }
}
