//! Store lock with a lease.
//!
//! The lock file is created with create-new semantics and holds the owner's
//! pid and acquisition time. It is removed when the guard drops. A lock older
//! than the lease belongs to a run that died without cleaning up; it is
//! logged and broken.

use super::StoreError;
use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Held store lock; released on drop.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    /// Acquire the lock at `path`, breaking it if its lease has expired.
    pub fn acquire(path: &Path, lease: Duration, ctx: &LogContext) -> Result<Self, StoreError> {
        match try_create(path) {
            Ok(lock) => {
                log_event!(
                    ctx,
                    DEBUG,
                    event_names::LOCK_ACQUIRED,
                    Stage::Init,
                    "store lock acquired",
                    path = path.display().to_string().as_str()
                );
                return Ok(lock);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        }

        let holder = fs::read_to_string(path).unwrap_or_default();
        let age = lock_age(path, &holder);
        if age.map_or(true, |a| a <= lease) {
            return Err(StoreError::Locked {
                path: path.to_path_buf(),
                holder: holder.lines().collect::<Vec<_>>().join(", "),
            });
        }

        log_event!(
            ctx,
            WARN,
            event_names::LOCK_STALE_BROKEN,
            Stage::Init,
            "breaking stale store lock",
            path = path.display().to_string().as_str(),
            age_secs = age.map(|a| a.as_secs()).unwrap_or_default(),
            lease_secs = lease.as_secs()
        );
        break_stale(path, &holder)?;

        try_create(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                // Another run broke the same stale lock first.
                StoreError::Locked {
                    path: path.to_path_buf(),
                    holder: String::new(),
                }
            } else {
                StoreError::Io {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn try_create(path: &Path) -> std::io::Result<StoreLock> {
    let mut file = OpenOptions::new().create_new(true).write(true).open(path)?;
    let lock = StoreLock {
        path: path.to_path_buf(),
    };
    write!(
        file,
        "pid={}\nacquired_at={}\n",
        std::process::id(),
        Utc::now().to_rfc3339()
    )?;
    file.sync_all()?;
    Ok(lock)
}

/// Move the stale lock aside and discard it, but only if it is still the
/// lock that was judged stale.
///
/// Two runs can judge the same lock stale. The rename is atomic, so only one
/// of them takes the file. A run that loses the race may instead rename the
/// winner's fresh lock; it sees different content and links the file back.
fn break_stale(path: &Path, stale_content: &str) -> Result<(), StoreError> {
    let aside = path.with_extension(format!(
        "stale.{}.{}",
        std::process::id(),
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    match fs::rename(path, &aside) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    }

    let taken = fs::read_to_string(&aside).unwrap_or_default();
    if taken != stale_content {
        // hard_link fails if yet another run already holds `path`.
        let _ = fs::hard_link(&aside, path);
        let _ = fs::remove_file(&aside);
        return Err(StoreError::Locked {
            path: path.to_path_buf(),
            holder: taken.lines().collect::<Vec<_>>().join(", "),
        });
    }
    fs::remove_file(&aside).map_err(|e| StoreError::Io {
        path: aside.clone(),
        source: e,
    })
}

/// Age from the recorded acquisition time, falling back to file mtime.
fn lock_age(path: &Path, content: &str) -> Option<Duration> {
    let recorded = content
        .lines()
        .find_map(|l| l.strip_prefix("acquired_at="))
        .and_then(|v| DateTime::parse_from_rfc3339(v.trim()).ok())
        .map(|t| t.with_timezone(&Utc));

    match recorded {
        Some(at) => (Utc::now() - at).to_std().ok().or(Some(Duration::ZERO)),
        None => fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|m| SystemTime::now().duration_since(m).ok()),
    }
}
