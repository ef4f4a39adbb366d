//! Repository lock and crash-safe lifecycle
//!
//! Direct generalization of the teacher's `utils/lock.rs::FileLock`:
//! an exclusive lock file holding the owning PID, removed on `Drop`,
//! with a global registry so a signal handler can clean it up even if
//! the normal unwind path is skipped.

use crate::error::{RepoError, RepoResult};
use crate::logging::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

const LOCK_FILE_NAME: &str = ".ori-lock";

static LOCK_PATH: OnceLock<Mutex<Option<PathBuf>>> = OnceLock::new();

/// Exclusive writer lock over a repository directory. Only one
/// `RepoLock` may be held per repository at a time; readers do not
/// need one (spec §4.9).
pub struct RepoLock {
	path: PathBuf,
}

impl RepoLock {
	pub fn acquire(repo_dir: &Path) -> RepoResult<Self> {
		let lock_path = repo_dir.join(LOCK_FILE_NAME);

		if lock_path.exists() {
			return Err(RepoError::RepoLocked);
		}

		let pid = std::process::id();
		std::fs::write(&lock_path, pid.to_string())?;

		let storage = LOCK_PATH.get_or_init(|| Mutex::new(None));
		if let Ok(mut guard) = storage.lock() {
			*guard = Some(lock_path.clone());
		}

		Ok(RepoLock { path: lock_path })
	}

	fn remove_now(&self) {
		let _ = std::fs::remove_file(&self.path);
		if let Some(storage) = LOCK_PATH.get() {
			if let Ok(mut guard) = storage.lock() {
				*guard = None;
			}
		}
	}
}

impl Drop for RepoLock {
	fn drop(&mut self) {
		self.remove_now();
	}
}

/// Register SIGTERM/SIGINT handlers that remove the currently-held
/// lock file before exiting. Call once per process, from the binary
/// entry point — not from library code that might be embedded.
pub fn setup_signal_handlers() {
	tokio::spawn(async {
		use tokio::signal;

		let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(stream) => stream,
			Err(e) => {
				warn!("failed to install SIGTERM handler: {}", e);
				return;
			}
		};
		let mut sigint = match signal::unix::signal(signal::unix::SignalKind::interrupt()) {
			Ok(stream) => stream,
			Err(e) => {
				warn!("failed to install SIGINT handler: {}", e);
				return;
			}
		};

		tokio::select! {
			_ = sigterm.recv() => {
				debug!("received SIGTERM, releasing repository lock");
				cleanup_lock_file();
				std::process::exit(130);
			}
			_ = sigint.recv() => {
				debug!("received SIGINT, releasing repository lock");
				cleanup_lock_file();
				std::process::exit(130);
			}
		}
	});
}

fn cleanup_lock_file() {
	if let Some(storage) = LOCK_PATH.get() {
		if let Ok(guard) = storage.lock() {
			if let Some(path) = guard.as_ref() {
				let _ = std::fs::remove_file(path);
				info!(path = %path.display(), "lock file removed on signal termination");
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn acquire_writes_pid() {
		let dir = tempdir().unwrap();
		let lock = RepoLock::acquire(dir.path()).unwrap();
		let contents = std::fs::read_to_string(&lock.path).unwrap();
		assert_eq!(contents, std::process::id().to_string());
	}

	#[test]
	fn drop_removes_lock_file() {
		let dir = tempdir().unwrap();
		let lock_path = {
			let lock = RepoLock::acquire(dir.path()).unwrap();
			lock.path.clone()
		};
		assert!(!lock_path.exists());
	}

	#[test]
	fn second_acquire_fails_while_held() {
		let dir = tempdir().unwrap();
		let _lock = RepoLock::acquire(dir.path()).unwrap();
		let err = RepoLock::acquire(dir.path()).unwrap_err();
		assert!(matches!(err, RepoError::RepoLocked));
	}
}
