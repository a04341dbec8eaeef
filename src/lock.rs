// ABOUTME: Target lock preventing concurrent releases to the same cluster/namespace/release.
// ABOUTME: Uses atomic file creation with lock info stored under the state directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::diagnostics::Warning;
use crate::request::TargetEnvironment;

/// State directory relative to $HOME (XDG Base Directory compliant).
const STATE_DIR: &str = ".local/state/releasectl";

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("release to {target} already in progress: held by {holder} (pid {pid}) since {started_at}")]
    Held {
        target: String,
        holder: String,
        pid: u32,
        started_at: DateTime<Utc>,
    },

    #[error("lock for {0} was taken by another process while breaking it")]
    Contended(String),

    #[error("lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode lock info: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Who holds a target lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    /// Target environment being released to.
    pub target: String,
}

impl LockInfo {
    pub fn new(target: &TargetEnvironment) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            target: target.to_string(),
        }
    }

    /// Locks older than one hour are considered abandoned.
    pub fn is_stale(&self) -> bool {
        let age = Utc::now() - self.started_at;
        age.num_hours() >= 1
    }

    pub fn lock_path(state_dir: &Path, target: &TargetEnvironment) -> PathBuf {
        let cluster: String = target
            .cluster
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        state_dir.join("locks").join(format!(
            "{}__{}__{}.lock",
            cluster, target.namespace, target.release
        ))
    }
}

/// Default state directory: `$XDG_STATE_HOME/releasectl`, then
/// `$HOME/.local/state/releasectl`, then `.release/state`.
pub fn default_state_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_STATE_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(xdg).join("releasectl");
    }
    match std::env::var_os("HOME").filter(|v| !v.is_empty()) {
        Some(home) => PathBuf::from(home).join(STATE_DIR),
        None => PathBuf::from(".release/state"),
    }
}

/// A held target lock. Released explicitly or on drop.
#[derive(Debug)]
pub struct TargetLock {
    path: PathBuf,
    target: String,
    released: bool,
}

impl TargetLock {
    /// Acquire the lock for `target`.
    ///
    /// Creation is atomic (`create_new`), so two processes can never both
    /// succeed. Stale locks are broken automatically; `force` also breaks
    /// live ones. Returns a warning when an existing lock was broken.
    pub fn acquire(
        state_dir: &Path,
        target: &TargetEnvironment,
        force: bool,
    ) -> Result<(Self, Option<Warning>), LockError> {
        let path = LockInfo::lock_path(state_dir, target);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| LockError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let info = LockInfo::new(target);
        let json = serde_json::to_string(&info)?;

        if try_create(&path, &json)? {
            tracing::debug!(lock = %path.display(), "target lock acquired");
            return Ok((Self::held(path, target), None));
        }

        let warning = match read_lock(&path) {
            Some(existing) if force => Warning::stale_lock(format!(
                "breaking lock on {} held by {} (pid {}) since {}",
                existing.target, existing.holder, existing.pid, existing.started_at
            )),
            Some(existing) if existing.is_stale() => Warning::stale_lock(format!(
                "auto-breaking stale lock on {} held by {} (pid {}) since {}",
                existing.target, existing.holder, existing.pid, existing.started_at
            )),
            Some(existing) => {
                return Err(LockError::Held {
                    target: existing.target,
                    holder: existing.holder,
                    pid: existing.pid,
                    started_at: existing.started_at,
                });
            }
            None => Warning::stale_lock(format!(
                "lock info at {} unreadable, breaking lock",
                path.display()
            )),
        };

        tracing::debug!(lock = %path.display(), "removing stale or forced lock");
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(source) => return Err(LockError::Io { path, source }),
        }

        if !try_create(&path, &json)? {
            return Err(LockError::Contended(target.to_string()));
        }

        Ok((Self::held(path, target), Some(warning)))
    }

    fn held(path: PathBuf, target: &TargetEnvironment) -> Self {
        Self {
            path,
            target: target.to_string(),
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(LockError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl Drop for TargetLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != ErrorKind::NotFound
        {
            tracing::warn!(lock = %self.target, "failed to release lock: {}", e);
        }
    }
}

/// Create the lock file if absent. `Ok(false)` means another holder exists.
fn try_create(path: &Path, content: &str) -> Result<bool, LockError> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(source) => {
            return Err(LockError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    file.write_all(content.as_bytes())
        .map_err(|source| LockError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(true)
}

fn read_lock(path: &Path) -> Option<LockInfo> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}
