//! Error taxonomy for the repository core
//!
//! This is the unified error type returned by the hash, stream, packfile,
//! index, metadata, object, diff/merge, repository and RPC layers. It is
//! hand-rolled rather than derived (no `thiserror`) to match the way the
//! rest of this crate builds its error enums.

use std::fmt;
use std::io;

/// Stable error taxonomy, per the on-disk/wire contract.
///
/// Callers across a process boundary (RPC) only ever see the `Display`
/// string; the variant itself is for in-process callers that need to
/// branch on error kind (e.g. "retry on `TransportClosed`").
#[derive(Debug)]
pub enum RepoError {
	InvalidArgs { message: String },
	UnsupportedVersion { found: String },
	IndexDirty,
	IndexCorrupt,
	IndexNotFound,
	BlobStoreCorrupt { message: String },
	ObjectNotFound { hash: String },
	HashMismatch { expected: String, actual: String },
	TransportClosed,
	ProtocolError { message: String },
	IOFailure(io::Error),
	NoCommonAncestor,
	MergeConflict { path: String },
	FileDirConflict { path: String },
	RepoLocked,
	BareRepo,
}

impl fmt::Display for RepoError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RepoError::InvalidArgs { message } => write!(f, "invalid arguments: {}", message),
			RepoError::UnsupportedVersion { found } => {
				write!(f, "unsupported version: {}", found)
			}
			RepoError::IndexDirty => {
				write!(f, "index file length is not a multiple of the record size")
			}
			RepoError::IndexCorrupt => write!(f, "index entry checksum mismatch"),
			RepoError::IndexNotFound => write!(f, "object not present in index"),
			RepoError::BlobStoreCorrupt { message } => write!(f, "blob store corrupt: {}", message),
			RepoError::ObjectNotFound { hash } => write!(f, "object not found: {}", hash),
			RepoError::HashMismatch { expected, actual } => {
				write!(f, "hash mismatch: expected {}, got {}", expected, actual)
			}
			RepoError::TransportClosed => write!(f, "transport closed"),
			RepoError::ProtocolError { message } => write!(f, "protocol error: {}", message),
			RepoError::IOFailure(e) => write!(f, "I/O error: {}", e),
			RepoError::NoCommonAncestor => write!(f, "no common ancestor between commits"),
			RepoError::MergeConflict { path } => write!(f, "merge conflict at {}", path),
			RepoError::FileDirConflict { path } => write!(f, "file/directory conflict at {}", path),
			RepoError::RepoLocked => write!(f, "repository is locked by another writer"),
			RepoError::BareRepo => write!(f, "operation requires a non-bare repository"),
		}
	}
}

impl std::error::Error for RepoError {}

impl From<io::Error> for RepoError {
	fn from(e: io::Error) -> Self {
		RepoError::IOFailure(e)
	}
}

pub type RepoResult<T> = Result<T, RepoError>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn display_hash_mismatch() {
		let e = RepoError::HashMismatch { expected: "a".into(), actual: "b".into() };
		assert!(e.to_string().contains("expected a"));
	}

	#[test]
	fn io_error_converts() {
		let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
		let e: RepoError = io_err.into();
		assert!(matches!(e, RepoError::IOFailure(_)));
	}
}
