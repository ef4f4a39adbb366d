//! Repository configuration
//!
//! Generalized from the teacher's `config.rs` (which resolved a "sync
//! profile" directory and consolidated two dozen scattered option
//! structs into one `Config`) down to the handful of knobs spec.md
//! leaves as "default": chunker target/min/max, the compression
//! threshold, the packfile rotation size, and the RPC listen path.
//! Loaded from an optional `~/.ori/config.toml`; every field falls
//! back to the spec's stated default when the file or a key is
//! absent.

use crate::chunker::ChunkerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Objects at or above this size are FastLZ-compressed by default
/// (spec §4.7 ADDED compression policy); below it they're stored
/// uncompressed since the compression framing would cost more than
/// it saves.
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 256;

/// Packfile rotation threshold (spec §9 Open Question #4 resolution):
/// 256 MiB, an order of magnitude above the teacher's own 16 MiB
/// `MAX_CHUNK_SIZE` cap, scaled for a packfile rather than a chunk.
pub const DEFAULT_PACKFILE_ROTATE_BYTES: u64 = 256 * 1024 * 1024;

const DEFAULT_SOCKET_NAME: &str = "uds.sock";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RepoConfig {
	/// Target average chunk size for content-defined chunking.
	pub chunk_target: usize,
	/// Minimum chunk size.
	pub chunk_min: usize,
	/// Maximum chunk size.
	pub chunk_max: usize,

	/// Objects at or above this size are compressed.
	pub compression_threshold: usize,

	/// Rotate to a new packfile once the current one reaches this size.
	pub packfile_rotate_bytes: u64,

	/// Path (relative to the repository directory) of the local RPC
	/// socket.
	pub rpc_socket_name: String,
}

impl Default for RepoConfig {
	fn default() -> Self {
		let chunker_defaults = ChunkerConfig::default();
		RepoConfig {
			chunk_target: chunker_defaults.target,
			chunk_min: chunker_defaults.min,
			chunk_max: chunker_defaults.max,
			compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
			packfile_rotate_bytes: DEFAULT_PACKFILE_ROTATE_BYTES,
			rpc_socket_name: DEFAULT_SOCKET_NAME.to_string(),
		}
	}
}

impl RepoConfig {
	pub fn chunker_config(&self) -> ChunkerConfig {
		ChunkerConfig {
			window: ChunkerConfig::default().window,
			base: ChunkerConfig::default().base,
			target: self.chunk_target,
			min: self.chunk_min,
			max: self.chunk_max,
		}
	}

	/// Load from `~/.ori/config.toml`. Missing file falls back to
	/// `Default::default()`; an unparsable file is a hard error since
	/// it means the operator wrote something broken on purpose or by
	/// accident and silently ignoring it would mask that.
	pub fn load(home_dir: &Path) -> crate::error::RepoResult<Self> {
		let path = Self::config_path(home_dir);
		match std::fs::read_to_string(&path) {
			Ok(contents) => toml::from_str(&contents).map_err(|e| crate::error::RepoError::InvalidArgs {
				message: format!("failed to parse {}: {}", path.display(), e),
			}),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RepoConfig::default()),
			Err(e) => Err(e.into()),
		}
	}

	fn config_path(home_dir: &Path) -> PathBuf {
		ori_dir(home_dir).join("config.toml")
	}
}

/// Resolve `~/.ori`, the repository store root (spec §6).
pub fn ori_dir(home_dir: &Path) -> PathBuf {
	home_dir.join(".ori")
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn missing_config_file_uses_defaults() {
		let dir = tempdir().unwrap();
		let config = RepoConfig::load(dir.path()).unwrap();
		assert_eq!(config.chunk_target, 4096);
		assert_eq!(config.packfile_rotate_bytes, DEFAULT_PACKFILE_ROTATE_BYTES);
	}

	#[test]
	fn partial_config_file_overrides_only_given_keys() {
		let dir = tempdir().unwrap();
		std::fs::create_dir_all(ori_dir(dir.path())).unwrap();
		std::fs::write(ori_dir(dir.path()).join("config.toml"), "chunk-target = 8192\n").unwrap();
		let config = RepoConfig::load(dir.path()).unwrap();
		assert_eq!(config.chunk_target, 8192);
		assert_eq!(config.chunk_min, 2048);
	}

	#[test]
	fn malformed_config_file_is_an_error() {
		let dir = tempdir().unwrap();
		std::fs::create_dir_all(ori_dir(dir.path())).unwrap();
		std::fs::write(ori_dir(dir.path()).join("config.toml"), "not valid toml {{{").unwrap();
		assert!(RepoConfig::load(dir.path()).is_err());
	}
}
