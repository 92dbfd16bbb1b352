//! Snapshot store.
//!
//! Layout under the data directory:
//!
//! ```text
//! <data>/.hydra.lock                         single-writer lock
//! <data>/snapshots/snapshot-YYYYMMDD-HHMMSS-mmm.txt
//! <data>/snapshots/latest.txt                path=<id>, generated_at=<rfc3339>
//! <data>/reports/drift-YYYYMMDD-HHMMSS-mmm.md
//! ```
//!
//! Artifact names embed a fixed-width UTC timestamp, so lexicographic order
//! is chronological order. Every write goes through a temp file, fsync and
//! rename; a killed write leaves no partial artifact and no dangling pointer.

pub mod lock;
pub mod retention;

pub use lock::StoreLock;
pub use retention::{PruneReport, RetentionEvent, RetentionReason};

use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use hydra_bundle::{serialize, SnapshotBundle};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const SNAPSHOTS_DIR: &str = "snapshots";
pub const REPORTS_DIR: &str = "reports";
pub const LOCK_FILE: &str = ".hydra.lock";
pub const LATEST_FILE: &str = "latest.txt";

/// `YYYYMMDD-HHMMSS-mmm`
const STAMP_LEN: usize = 19;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store is locked by another run ({path}): {holder}")]
    Locked { path: PathBuf, holder: String },

    #[error("artifact already exists: {id}")]
    AlreadyExists { id: String },

    #[error("artifact not found: {id}")]
    NotFound { id: String },

    #[error("not a valid artifact id: {id}")]
    InvalidId { id: String },

    #[error("invalid latest pointer {path}: {message}")]
    InvalidPointer { path: PathBuf, message: String },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Kinds of persisted artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Bundle,
    Report,
}

impl ArtifactKind {
    fn prefix(self) -> &'static str {
        match self {
            ArtifactKind::Bundle => "snapshot-",
            ArtifactKind::Report => "drift-",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Bundle => ".txt",
            ArtifactKind::Report => ".md",
        }
    }

    fn dir_name(self) -> &'static str {
        match self {
            ArtifactKind::Bundle => SNAPSHOTS_DIR,
            ArtifactKind::Report => REPORTS_DIR,
        }
    }

    /// Artifact id for a timestamp.
    pub fn id_for(self, timestamp: DateTime<Utc>) -> String {
        format!(
            "{}{}{}",
            self.prefix(),
            timestamp.format("%Y%m%d-%H%M%S-%3f"),
            self.extension()
        )
    }

    /// Timestamp embedded in `id`, or None if `id` is not this kind.
    pub fn parse_id(self, id: &str) -> Option<DateTime<Utc>> {
        let stamp = id
            .strip_prefix(self.prefix())?
            .strip_suffix(self.extension())?;
        if stamp.len() != STAMP_LEN || stamp.as_bytes()[15] != b'-' {
            return None;
        }
        let millis: i64 = stamp
            .get(16..)
            .filter(|m| m.bytes().all(|b| b.is_ascii_digit()))?
            .parse()
            .ok()?;
        let naive = NaiveDateTime::parse_from_str(&stamp[..15], "%Y%m%d-%H%M%S").ok()?;
        Some(Utc.from_utc_datetime(&naive) + chrono::Duration::milliseconds(millis))
    }
}

/// One stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub id: String,
    pub kind: ArtifactKind,
    pub timestamp: DateTime<Utc>,
}

/// Contents of the latest pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestPointer {
    pub id: String,
    pub generated_at: DateTime<Utc>,
}

impl LatestPointer {
    fn render(&self) -> String {
        format!(
            "path={}\ngenerated_at={}\n",
            self.id,
            self.generated_at.to_rfc3339()
        )
    }

    fn parse(content: &str) -> Result<Self, String> {
        let mut id = None;
        let mut generated_at = None;
        for line in content.lines() {
            if let Some(v) = line.strip_prefix("path=") {
                id = Some(v.trim().to_string());
            } else if let Some(v) = line.strip_prefix("generated_at=") {
                generated_at = Some(
                    DateTime::parse_from_rfc3339(v.trim())
                        .map_err(|e| format!("bad generated_at: {}", e))?
                        .with_timezone(&Utc),
                );
            }
        }
        Ok(LatestPointer {
            id: id.ok_or("missing path= line")?,
            generated_at: generated_at.ok_or("missing generated_at= line")?,
        })
    }
}

/// Filesystem-backed artifact store.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
    lock_lease: Duration,
    ctx: LogContext,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>, lock_lease: Duration, ctx: LogContext) -> Self {
        Self {
            root: root.into(),
            lock_lease,
            ctx,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.root.join(SNAPSHOTS_DIR)
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.root.join(REPORTS_DIR)
    }

    fn latest_path(&self) -> PathBuf {
        self.snapshots_dir().join(LATEST_FILE)
    }

    /// Take the single-writer lock.
    pub fn lock(&self) -> Result<StoreLock, StoreError> {
        fs::create_dir_all(&self.root).map_err(io_err(&self.root))?;
        StoreLock::acquire(&self.root.join(LOCK_FILE), self.lock_lease, &self.ctx)
    }

    /// Persist a bundle and point `latest` at it. Returns the artifact id.
    pub fn write(&self, bundle: &SnapshotBundle) -> Result<String, StoreError> {
        let _lock = self.lock()?;
        let id = ArtifactKind::Bundle.id_for(bundle.timestamp);
        let path = self.snapshots_dir().join(&id);
        if path.exists() {
            return Err(StoreError::AlreadyExists { id });
        }

        let text = serialize(bundle);
        write_atomic(&path, text.as_bytes())?;
        log_event!(
            self.ctx,
            INFO,
            event_names::STORE_BUNDLE_WRITTEN,
            Stage::Store,
            "bundle written",
            id = id.as_str(),
            nodes = bundle.nodes.len(),
            bytes = text.len()
        );

        self.advance_latest(&id, bundle.timestamp)?;
        Ok(id)
    }

    /// Point `latest` at `id` unless it already names a newer bundle.
    ///
    /// Overlapping runs can finish out of timestamp order; the pointer must
    /// agree with [`SnapshotStore::list_recent`]. Caller holds the lock.
    fn advance_latest(&self, id: &str, generated_at: DateTime<Utc>) -> Result<(), StoreError> {
        let current = match self.latest() {
            Ok(pointer) => pointer,
            Err(StoreError::InvalidPointer { path, message }) => {
                log_event!(
                    self.ctx,
                    WARN,
                    event_names::STORE_LATEST_UPDATED,
                    Stage::Store,
                    "replacing unreadable latest pointer",
                    path = path.display().to_string().as_str(),
                    error = message.as_str()
                );
                None
            }
            Err(e) => return Err(e),
        };
        if let Some(current) = current.filter(|c| c.id.as_str() > id) {
            log_event!(
                self.ctx,
                INFO,
                event_names::STORE_LATEST_KEPT,
                Stage::Store,
                "latest pointer already names a newer bundle",
                id = id,
                latest = current.id.as_str()
            );
            return Ok(());
        }

        let pointer = LatestPointer {
            id: id.to_string(),
            generated_at,
        };
        write_atomic(&self.latest_path(), pointer.render().as_bytes())?;
        log_event!(
            self.ctx,
            DEBUG,
            event_names::STORE_LATEST_UPDATED,
            Stage::Store,
            "latest pointer updated",
            id = id
        );
        Ok(())
    }

    /// Persist a rendered drift report. Returns the artifact id.
    pub fn write_report(
        &self,
        generated_at: DateTime<Utc>,
        body: &str,
    ) -> Result<String, StoreError> {
        let _lock = self.lock()?;
        let id = ArtifactKind::Report.id_for(generated_at);
        let path = self.reports_dir().join(&id);
        if path.exists() {
            return Err(StoreError::AlreadyExists { id });
        }
        write_atomic(&path, body.as_bytes())?;
        log_event!(
            self.ctx,
            INFO,
            event_names::STORE_REPORT_WRITTEN,
            Stage::Store,
            "drift report written",
            id = id.as_str()
        );
        Ok(id)
    }

    /// Artifacts of `kind`, newest first. Unrelated files are ignored.
    pub fn list(&self, kind: ArtifactKind) -> Result<Vec<ArtifactInfo>, StoreError> {
        let dir = self.root.join(kind.dir_name());
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&dir)(e)),
        };

        let mut artifacts = Vec::new();
        for entry in entries {
            let entry = entry.map_err(io_err(&dir))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if let Some(timestamp) = kind.parse_id(&name) {
                artifacts.push(ArtifactInfo {
                    id: name,
                    kind,
                    timestamp,
                });
            }
        }
        artifacts.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(artifacts)
    }

    /// Ids of the `n` most recent bundles, newest first.
    pub fn list_recent(&self, n: usize) -> Result<Vec<String>, StoreError> {
        Ok(self
            .list(ArtifactKind::Bundle)?
            .into_iter()
            .take(n)
            .map(|a| a.id)
            .collect())
    }

    /// Raw text of a stored bundle.
    pub fn read(&self, id: &str) -> Result<String, StoreError> {
        if ArtifactKind::Bundle.parse_id(id).is_none() {
            return Err(StoreError::InvalidId { id: id.to_string() });
        }
        let path = self.snapshots_dir().join(id);
        fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound { id: id.to_string() }
            } else {
                io_err(&path)(e)
            }
        })
    }

    /// Raw bytes of a stored bundle, for callers that validate encoding
    /// themselves.
    pub fn read_bytes(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        if ArtifactKind::Bundle.parse_id(id).is_none() {
            return Err(StoreError::InvalidId { id: id.to_string() });
        }
        let path = self.snapshots_dir().join(id);
        fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound { id: id.to_string() }
            } else {
                io_err(&path)(e)
            }
        })
    }

    /// Raw text of a stored report.
    pub fn read_report(&self, id: &str) -> Result<String, StoreError> {
        if ArtifactKind::Report.parse_id(id).is_none() {
            return Err(StoreError::InvalidId { id: id.to_string() });
        }
        let path = self.reports_dir().join(id);
        fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound { id: id.to_string() }
            } else {
                io_err(&path)(e)
            }
        })
    }

    /// The latest pointer, if one has been written.
    pub fn latest(&self) -> Result<Option<LatestPointer>, StoreError> {
        let path = self.latest_path();
        match fs::read_to_string(&path) {
            Ok(content) => LatestPointer::parse(&content)
                .map(Some)
                .map_err(|message| StoreError::InvalidPointer { path, message }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&path)(e)),
        }
    }

    pub(crate) fn ctx(&self) -> &LogContext {
        &self.ctx
    }
}

/// Write `bytes` to `path` via a same-directory temp file and rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("artifact");
    let tmp_path = path.with_file_name(format!(".{}.tmp.{}", file_name, std::process::id()));
    {
        let mut file = fs::File::create(&tmp_path).map_err(io_err(&tmp_path))?;
        file.write_all(bytes).map_err(io_err(&tmp_path))?;
        file.sync_all().map_err(io_err(&tmp_path))?;
    }
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        io_err(path)(e)
    })
}
