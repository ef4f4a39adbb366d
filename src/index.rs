//! On-disk index: `ObjectHash -> (packfile, offset, size)`
//!
//! One file per repository, loaded into memory at open and rewritten
//! wholesale (temp file + rename) whenever an entry changes. Readers
//! only ever consult this in-memory map; packfiles are never scanned
//! to answer a lookup.

use crate::error::{RepoError, RepoResult};
use crate::hash::ObjectHash;
use crate::object::{ObjectFlags, ObjectInfo, ObjectType};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Compact on-disk form of an object's location plus its `ObjectInfo`.
/// This is a narrower layout than [`ObjectInfo::to_bytes`] (no reserved
/// padding) so that the fixed block plus its MD5 trailer lands on the
/// spec's 72-byte record exactly: 4 (type) + 32 (hash) + 4 (flags) + 4
/// (payload_size) + 4 (offset) + 4 (packed_size) + 4 (packfile_id) = 56,
/// plus a 16-byte MD5 trailer over those 56 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
	pub info: ObjectInfo,
	pub offset: u32,
	pub packed_size: u32,
	pub packfile_id: u32,
}

impl IndexEntry {
	pub const RECORD_SIZE: usize = 72;
	const FIXED_SIZE: usize = 56;

	fn to_fixed_bytes(&self) -> [u8; Self::FIXED_SIZE] {
		let mut out = [0u8; Self::FIXED_SIZE];
		let type_tag: &[u8; 4] = match self.info.object_type {
			ObjectType::Commit => b"CMMT",
			ObjectType::Tree => b"TREE",
			ObjectType::Blob => b"BLOB",
			ObjectType::LargeBlob => b"LGBL",
			ObjectType::Purged => b"PURG",
		};
		out[0..4].copy_from_slice(type_tag);
		out[4..36].copy_from_slice(self.info.hash.as_bytes());
		out[36..40].copy_from_slice(&self.info.flags.bits().to_be_bytes());
		out[40..44].copy_from_slice(&self.info.payload_size.to_be_bytes());
		out[44..48].copy_from_slice(&self.offset.to_be_bytes());
		out[48..52].copy_from_slice(&self.packed_size.to_be_bytes());
		out[52..56].copy_from_slice(&self.packfile_id.to_be_bytes());
		out
	}

	fn from_record(buf: &[u8]) -> RepoResult<Self> {
		if buf.len() != Self::RECORD_SIZE {
			return Err(RepoError::IndexDirty);
		}
		let fixed = &buf[..Self::FIXED_SIZE];
		let trailer = &buf[Self::FIXED_SIZE..];

		let digest = md5::compute(fixed);
		if &digest.0[..] != trailer {
			return Err(RepoError::IndexCorrupt);
		}

		let mut tag = [0u8; 4];
		tag.copy_from_slice(&fixed[0..4]);
		let object_type = match &tag {
			b"CMMT" => ObjectType::Commit,
			b"TREE" => ObjectType::Tree,
			b"BLOB" => ObjectType::Blob,
			b"LGBL" => ObjectType::LargeBlob,
			b"PURG" => ObjectType::Purged,
			_ => return Err(RepoError::IndexCorrupt),
		};
		let mut hash = [0u8; 32];
		hash.copy_from_slice(&fixed[4..36]);
		let flags = ObjectFlags::from_bits_truncate(u32::from_be_bytes(fixed[36..40].try_into().unwrap()));
		let payload_size = u32::from_be_bytes(fixed[40..44].try_into().unwrap());
		let offset = u32::from_be_bytes(fixed[44..48].try_into().unwrap());
		let packed_size = u32::from_be_bytes(fixed[48..52].try_into().unwrap());
		let packfile_id = u32::from_be_bytes(fixed[52..56].try_into().unwrap());

		Ok(IndexEntry {
			info: ObjectInfo { object_type, hash: ObjectHash(hash), flags, payload_size },
			offset,
			packed_size,
			packfile_id,
		})
	}

	fn to_record_bytes(&self) -> [u8; Self::RECORD_SIZE] {
		let fixed = self.to_fixed_bytes();
		let digest = md5::compute(fixed);
		let mut out = [0u8; Self::RECORD_SIZE];
		out[..Self::FIXED_SIZE].copy_from_slice(&fixed);
		out[Self::FIXED_SIZE..].copy_from_slice(&digest.0);
		out
	}
}

/// In-memory index, backed by a single flat file of fixed-size
/// records. Ordinary updates append a single record to this file
/// (an open handle is kept around for that, same idiom as
/// [`crate::snapshot::SnapshotIndex`]); only bulk/compaction callers
/// rewrite the file wholesale.
pub struct Index {
	path: PathBuf,
	file: File,
	entries: HashMap<ObjectHash, IndexEntry>,
}

impl Index {
	/// Load an index file. A missing file is treated as an empty,
	/// freshly-initialized index (the caller creates it on first
	/// `write()`), matching `Repository::init`'s expectation that
	/// opening a brand-new repo directory doesn't require pre-seeding
	/// this file.
	pub fn open(path: impl Into<PathBuf>) -> RepoResult<Self> {
		let path = path.into();
		let entries = match fs::read(&path) {
			Ok(data) => Self::parse(&data)?,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
			Err(e) => return Err(e.into()),
		};
		let file = OpenOptions::new().create(true).append(true).open(&path)?;
		Ok(Index { path, file, entries })
	}

	fn parse(data: &[u8]) -> RepoResult<HashMap<ObjectHash, IndexEntry>> {
		if data.len() % IndexEntry::RECORD_SIZE != 0 {
			return Err(RepoError::IndexDirty);
		}
		let mut entries = HashMap::with_capacity(data.len() / IndexEntry::RECORD_SIZE);
		for chunk in data.chunks(IndexEntry::RECORD_SIZE) {
			let entry = IndexEntry::from_record(chunk)?;
			entries.insert(entry.info.hash, entry);
		}
		Ok(entries)
	}

	pub fn get(&self, hash: &ObjectHash) -> RepoResult<&IndexEntry> {
		self.entries.get(hash).ok_or(RepoError::IndexNotFound)
	}

	pub fn contains(&self, hash: &ObjectHash) -> bool {
		self.entries.contains_key(hash)
	}

	pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
		self.entries.values()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Append a single record and update the in-memory map. A later
	/// record for the same hash simply shadows the earlier one on
	/// replay (last writer wins), so a full rewrite isn't needed here.
	/// Crash-consistency relies on the caller having already appended
	/// and fsynced the packfile record before this is called
	/// (data-then-index ordering, spec §4.4/§4.9).
	pub fn insert(&mut self, entry: IndexEntry) -> RepoResult<()> {
		self.file.write_all(&entry.to_record_bytes())?;
		self.file.sync_all()?;
		self.entries.insert(entry.info.hash, entry);
		Ok(())
	}

	/// Drop a hash from the in-memory map. The fixed-record log has no
	/// tombstone, so this alone doesn't shrink the file on disk;
	/// bulk/compaction callers (`Repository::gc`) call [`Self::rewrite`]
	/// once after their whole pass to persist the removals.
	pub fn remove(&mut self, hash: &ObjectHash) {
		self.entries.remove(hash);
	}

	/// Atomically replace the on-disk file: write to a sibling temp
	/// file, fsync, then rename over the real path. Reserved for
	/// bulk operations (e.g. `gc`'s compaction pass) rather than
	/// per-entry updates.
	pub fn rewrite(&mut self) -> RepoResult<()> {
		let tmp_path = self.path.with_extension("tmp");
		{
			let mut f = fs::File::create(&tmp_path)?;
			for entry in self.entries.values() {
				f.write_all(&entry.to_record_bytes())?;
			}
			f.sync_all()?;
		}
		fs::rename(&tmp_path, &self.path)?;
		self.file = OpenOptions::new().append(true).open(&self.path)?;
		Ok(())
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}
