//! Key material layout
//!
//! Signature verification is out of scope (spec §1 Non-goals), but the
//! on-disk key layout (`keys/private`, `keys/trusted/<fingerprint>`) is
//! part of the repository's external interface (spec §6) and a future
//! verifier needs something to read. This module only loads bytes and
//! reports fingerprints; it never validates a signature.

use crate::error::RepoResult;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

const PRIVATE_KEY_NAME: &str = "private";
const TRUSTED_DIR_NAME: &str = "trusted";

pub struct Keyring {
	keys_dir: PathBuf,
}

impl Keyring {
	pub fn open(repo_dir: &Path) -> Self {
		Keyring { keys_dir: repo_dir.join("keys") }
	}

	fn private_path(&self) -> PathBuf {
		self.keys_dir.join(PRIVATE_KEY_NAME)
	}

	fn trusted_dir(&self) -> PathBuf {
		self.keys_dir.join(TRUSTED_DIR_NAME)
	}

	pub fn private_key(&self) -> RepoResult<Option<Vec<u8>>> {
		match fs::read(self.private_path()) {
			Ok(bytes) => Ok(Some(bytes)),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(e.into()),
		}
	}

	pub fn set_private_key(&self, bytes: &[u8]) -> RepoResult<()> {
		fs::create_dir_all(&self.keys_dir)?;
		fs::write(self.private_path(), bytes)?;
		Ok(())
	}

	/// SHA-256 of raw key bytes, hex-encoded. Used both as the
	/// fingerprint identifying a trusted key file and as the value a
	/// future verifier would compare a signer's claimed identity
	/// against.
	pub fn fingerprint(key_bytes: &[u8]) -> String {
		let digest = Sha256::digest(key_bytes);
		hex::encode(digest)
	}

	pub fn trust(&self, key_bytes: &[u8]) -> RepoResult<String> {
		let fingerprint = Self::fingerprint(key_bytes);
		let dir = self.trusted_dir();
		fs::create_dir_all(&dir)?;
		fs::write(dir.join(&fingerprint), key_bytes)?;
		Ok(fingerprint)
	}

	pub fn trusted_key(&self, fingerprint: &str) -> RepoResult<Option<Vec<u8>>> {
		match fs::read(self.trusted_dir().join(fingerprint)) {
			Ok(bytes) => Ok(Some(bytes)),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(e.into()),
		}
	}

	pub fn trusted_fingerprints(&self) -> RepoResult<Vec<String>> {
		let dir = self.trusted_dir();
		if !dir.exists() {
			return Ok(Vec::new());
		}
		let mut out = Vec::new();
		for entry in fs::read_dir(dir)? {
			let entry = entry?;
			if let Some(name) = entry.file_name().to_str() {
				out.push(name.to_string());
			}
		}
		out.sort();
		Ok(out)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn private_key_round_trips() {
		let dir = tempdir().unwrap();
		let ring = Keyring::open(dir.path());
		assert!(ring.private_key().unwrap().is_none());
		ring.set_private_key(b"secret-key-bytes").unwrap();
		assert_eq!(ring.private_key().unwrap().unwrap(), b"secret-key-bytes");
	}

	#[test]
	fn trust_stores_key_under_its_fingerprint() {
		let dir = tempdir().unwrap();
		let ring = Keyring::open(dir.path());
		let fingerprint = ring.trust(b"a-public-key").unwrap();
		assert_eq!(fingerprint, Keyring::fingerprint(b"a-public-key"));
		assert_eq!(ring.trusted_key(&fingerprint).unwrap().unwrap(), b"a-public-key");
	}

	#[test]
	fn trusted_fingerprints_lists_all_trusted_keys() {
		let dir = tempdir().unwrap();
		let ring = Keyring::open(dir.path());
		let fp1 = ring.trust(b"key-one").unwrap();
		let fp2 = ring.trust(b"key-two").unwrap();
		let mut listed = ring.trusted_fingerprints().unwrap();
		listed.sort();
		let mut expected = vec![fp1, fp2];
		expected.sort();
		assert_eq!(listed, expected);
	}
}
