//! Stale-mount cleanup hook
//!
//! The FUSE working-tree layer is out of scope (spec §1), but spec
//! §4.12 calls out that anything it leaves behind on an unclean exit
//! "must be cleaned up by an explicit cleanup operation" belonging to
//! the core. This is that operation: it removes the local RPC socket
//! and scratch work directory a mount process would have owned,
//! without knowing anything about FUSE itself.

use crate::error::RepoResult;
use crate::logging::info;
use std::path::Path;

const SOCKET_NAME: &str = "uds.sock";
const TMP_DIR_NAME: &str = "tmp";

/// Remove an abandoned Unix socket and scratch directory left behind
/// by a mount process that exited without cleaning up after itself.
/// Safe to call on a repository with no stale state (both removals
/// are no-ops if the paths don't exist).
pub fn stale_mount_cleanup(repo_dir: &Path) -> RepoResult<()> {
	let socket_path = repo_dir.join(SOCKET_NAME);
	if socket_path.exists() {
		std::fs::remove_file(&socket_path)?;
		info!(path = %socket_path.display(), "removed stale mount socket");
	}

	let tmp_path = repo_dir.join(TMP_DIR_NAME);
	if tmp_path.exists() {
		std::fs::remove_dir_all(&tmp_path)?;
		info!(path = %tmp_path.display(), "removed stale mount work directory");
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn removes_stale_socket_and_tmp_dir() {
		let dir = tempdir().unwrap();
		std::fs::write(dir.path().join(SOCKET_NAME), b"").unwrap();
		std::fs::create_dir(dir.path().join(TMP_DIR_NAME)).unwrap();
		std::fs::write(dir.path().join(TMP_DIR_NAME).join("leftover"), b"x").unwrap();

		stale_mount_cleanup(dir.path()).unwrap();

		assert!(!dir.path().join(SOCKET_NAME).exists());
		assert!(!dir.path().join(TMP_DIR_NAME).exists());
	}

	#[test]
	fn no_op_on_clean_repo() {
		let dir = tempdir().unwrap();
		stale_mount_cleanup(dir.path()).unwrap();
	}
}
