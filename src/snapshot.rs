//! Named snapshot/branch index
//!
//! Ported from `libori/snapshotindex.cc`: an append-log of
//! `hex(hash) name\n` lines, last writer for a given name wins when
//! the log is replayed, and deletion triggers an atomic rewrite to
//! drop superseded lines rather than leaving tombstones in the log.

use crate::error::RepoResult;
use crate::hash::ObjectHash;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct SnapshotIndex {
	path: PathBuf,
	file: File,
	snapshots: HashMap<String, ObjectHash>,
}

impl SnapshotIndex {
	pub fn open(path: impl Into<PathBuf>) -> RepoResult<Self> {
		let path = path.into();
		let snapshots = match fs::read_to_string(&path) {
			Ok(contents) => Self::parse(&contents),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
			Err(e) => return Err(e.into()),
		};

		let tmp_path = Self::tmp_path(&path);
		if tmp_path.exists() {
			let _ = fs::remove_file(&tmp_path);
		}

		let file = OpenOptions::new().create(true).append(true).open(&path)?;
		Ok(SnapshotIndex { path, file, snapshots })
	}

	fn tmp_path(path: &Path) -> PathBuf {
		path.with_extension("tmp")
	}

	/// Parse `hex(hash) name\n` lines. A trailing partial line (no
	/// newline, e.g. a write that was interrupted mid-append) is
	/// tolerated and discarded rather than treated as corruption.
	fn parse(contents: &str) -> HashMap<String, ObjectHash> {
		let mut snapshots = HashMap::new();
		for line in contents.lines() {
			if line.len() < 65 {
				continue;
			}
			let (hex_part, rest) = line.split_at(64);
			let name = &rest[1.min(rest.len())..];
			if let Ok(hash) = ObjectHash::from_hex(hex_part) {
				snapshots.insert(name.to_string(), hash);
			}
		}
		snapshots
	}

	pub fn get(&self, name: &str) -> Option<ObjectHash> {
		self.snapshots.get(name).copied()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&String, &ObjectHash)> {
		self.snapshots.iter()
	}

	/// Append a new mapping. Does not remove a prior mapping for the
	/// same name from the log — last-writer-wins on replay makes that
	/// unnecessary — but does update the in-memory map immediately.
	pub fn put(&mut self, name: &str, hash: ObjectHash) -> RepoResult<()> {
		writeln!(self.file, "{} {}", hash.hex(), name)?;
		self.file.sync_all()?;
		self.snapshots.insert(name.to_string(), hash);
		Ok(())
	}

	/// Remove a name. Since the log format has no tombstone, this
	/// always goes through a full rewrite.
	pub fn remove(&mut self, name: &str) -> RepoResult<()> {
		self.snapshots.remove(name);
		self.rewrite()
	}

	fn rewrite(&mut self) -> RepoResult<()> {
		let tmp_path = Self::tmp_path(&self.path);
		{
			let mut tmp = File::create(&tmp_path)?;
			for (name, hash) in &self.snapshots {
				writeln!(tmp, "{} {}", hash.hex(), name)?;
			}
			tmp.sync_all()?;
		}
		fs::rename(&tmp_path, &self.path)?;
		self.file = OpenOptions::new().append(true).open(&self.path)?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn put_then_reopen_round_trips() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("snapshotindex");
		let h = ObjectHash::of(b"snap");
		{
			let mut idx = SnapshotIndex::open(&path).unwrap();
			idx.put("release-1", h).unwrap();
		}
		let reopened = SnapshotIndex::open(&path).unwrap();
		assert_eq!(reopened.get("release-1"), Some(h));
	}

	#[test]
	fn last_write_wins_on_replay() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("snapshotindex");
		let h1 = ObjectHash::of(b"first");
		let h2 = ObjectHash::of(b"second");
		{
			let mut idx = SnapshotIndex::open(&path).unwrap();
			idx.put("tag", h1).unwrap();
			idx.put("tag", h2).unwrap();
		}
		let reopened = SnapshotIndex::open(&path).unwrap();
		assert_eq!(reopened.get("tag"), Some(h2));
	}

	#[test]
	fn tolerates_trailing_partial_line() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("snapshotindex");
		let h = ObjectHash::of(b"ok");
		fs::write(&path, format!("{} good\n{}partial", h.hex(), "a".repeat(30))).unwrap();
		let idx = SnapshotIndex::open(&path).unwrap();
		assert_eq!(idx.get("good"), Some(h));
	}

	#[test]
	fn remove_drops_entry_after_rewrite() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("snapshotindex");
		let h = ObjectHash::of(b"x");
		let mut idx = SnapshotIndex::open(&path).unwrap();
		idx.put("name", h).unwrap();
		idx.remove("name").unwrap();
		assert_eq!(idx.get("name"), None);

		let reopened = SnapshotIndex::open(&path).unwrap();
		assert_eq!(reopened.get("name"), None);
	}
}
