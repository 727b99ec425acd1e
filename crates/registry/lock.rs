//! Advisory lock on the registry file.
//!
//! The lock is a sibling `<registry>.lock` file created with create-new
//! semantics. It holds a random owner token so a holder only ever removes its
//! own lock, and it is considered abandoned once it is older than
//! [`LockOptions::stale_after`].

use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    thread,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::RegistryError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOptions {
    pub stale_after: Duration,
    /// Total acquisition attempts before giving up with `Locked`.
    pub attempts: u32,
    pub retry_delay: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(30),
            attempts: 10,
            retry_delay: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    token: String,
    pid: u32,
    acquired_at_ms: u128,
}

/// Held lock. Dropping it removes the lock file if this guard still owns it.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    token: String,
}

pub fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    target.with_file_name(name)
}

impl LockGuard {
    pub fn acquire(target: &Path, options: &LockOptions) -> Result<Self, RegistryError> {
        let path = lock_path_for(target);
        let token = Uuid::new_v4().to_string();
        let attempts = options.attempts.max(1);

        for attempt in 1..=attempts {
            match create_lock_file(&path, &token) {
                Ok(()) => {
                    debug!(lock = %path.display(), attempt, "Acquired registry lock");
                    return Ok(Self { path, token });
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    if reclaim_if_stale(&path, options.stale_after)? {
                        continue;
                    }
                    debug!(lock = %path.display(), attempt, "Registry lock busy");
                    if attempt < attempts {
                        thread::sleep(options.retry_delay);
                    }
                }
                Err(err) => return Err(RegistryError::io(&path, err)),
            }
        }

        Err(RegistryError::Locked {
            path: target.to_path_buf(),
            lock: path,
            attempts,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn still_owned(&self) -> bool {
        read_info(&self.path).is_some_and(|info| info.token == self.token)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.still_owned() {
            warn!(lock = %self.path.display(), "Registry lock was taken over before release");
            return;
        }
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), %err, "Failed to remove registry lock");
        }
    }
}

fn create_lock_file(path: &Path, token: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let info = LockInfo {
        token: token.to_owned(),
        pid: std::process::id(),
        acquired_at_ms: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default(),
    };
    let body = serde_json::to_vec(&info).map_err(std::io::Error::other)?;
    file.write_all(&body)?;
    file.sync_all()
}

fn read_info(path: &Path) -> Option<LockInfo> {
    let raw = fs::read(path).ok()?;
    serde_json::from_slice(&raw).ok()
}

/// Age by modification time; a lock whose holder died before writing its
/// body still ages out.
fn lock_age(path: &Path) -> std::io::Result<Duration> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(SystemTime::now()
        .duration_since(modified)
        .unwrap_or_default())
}

/// Moves a stale lock aside. Returns `true` when the lock is gone (reclaimed
/// here, or released by its holder meanwhile) and acquisition should retry
/// immediately.
fn reclaim_if_stale(path: &Path, stale_after: Duration) -> Result<bool, RegistryError> {
    let age = match lock_age(path) {
        Ok(age) => age,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(true),
        Err(err) => return Err(RegistryError::io(path, err)),
    };
    if age < stale_after {
        return Ok(false);
    }

    let observed = read_info(path);
    let aside = path.with_extension(format!("lock.stale-{}", Uuid::new_v4()));
    match fs::rename(path, &aside) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(true),
        Err(err) => return Err(RegistryError::io(path, err)),
    }

    // Another process may have reclaimed the stale lock and created a fresh
    // one between our age check and the rename. Put a fresh lock back.
    let moved = read_info(&aside);
    let moved_fresh = lock_age(&aside).is_ok_and(|age| age < stale_after);
    let same_token = match (&observed, &moved) {
        (Some(observed), Some(moved)) => observed.token == moved.token,
        _ => !moved_fresh,
    };
    if !same_token || moved_fresh {
        if let Err(err) = fs::hard_link(&aside, path) {
            warn!(lock = %path.display(), %err, "Could not restore a live registry lock moved aside");
        }
        let _ = fs::remove_file(&aside);
        return Ok(false);
    }

    warn!(
        lock = %path.display(),
        age_secs = age.as_secs(),
        holder_pid = moved.map(|info| info.pid),
        "Reclaimed stale registry lock"
    );
    let _ = fs::remove_file(&aside);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn quick() -> LockOptions {
        LockOptions {
            stale_after: Duration::from_secs(30),
            attempts: 3,
            retry_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn lock_path_is_a_sibling() {
        assert_eq!(
            lock_path_for(Path::new("/tmp/deployments.json")),
            PathBuf::from("/tmp/deployments.json.lock")
        );
    }

    #[test]
    fn guard_removes_its_lock_on_drop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("deployments.json");
        {
            let guard = LockGuard::acquire(&target, &quick()).expect("lock is free");
            assert!(guard.path().exists());
        }
        assert!(!lock_path_for(&target).exists());
    }

    #[test]
    fn fresh_lock_blocks_until_attempts_run_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("deployments.json");
        let _held = LockGuard::acquire(&target, &quick()).expect("lock is free");

        match LockGuard::acquire(&target, &quick()) {
            Err(RegistryError::Locked { attempts, lock, .. }) => {
                assert_eq!(attempts, 3);
                assert_eq!(lock, lock_path_for(&target));
            }
            other => panic!("expected Locked, got {other:?}"),
        }
        assert!(lock_path_for(&target).exists());
    }

    #[test]
    fn stale_lock_is_reclaimed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("deployments.json");
        let lock = lock_path_for(&target);
        fs::write(&lock, br#"{"token":"crashed","pid":1,"acquired_at_ms":0}"#).expect("write lock");
        File::options()
            .write(true)
            .open(&lock)
            .and_then(|file| file.set_modified(SystemTime::now() - Duration::from_secs(120)))
            .expect("backdate lock");

        let guard = LockGuard::acquire(&target, &quick()).expect("stale lock is reclaimed");
        assert!(guard.still_owned());
        drop(guard);
        assert!(!lock.exists());
        let leftovers = fs::read_dir(dir.path()).expect("read dir").count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn guard_leaves_a_lock_it_no_longer_owns() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("deployments.json");
        let guard = LockGuard::acquire(&target, &quick()).expect("lock is free");
        fs::write(guard.path(), br#"{"token":"someone-else","pid":2,"acquired_at_ms":0}"#)
            .expect("overwrite lock");
        drop(guard);
        assert!(lock_path_for(&target).exists());
    }
}
