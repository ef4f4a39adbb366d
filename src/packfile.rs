//! Append-only packfile storage
//!
//! A packfile is a flat sequence of `ObjectInfo (56 bytes) |
//! packed_size bytes of payload` records. Objects become visible only
//! once [`Index::insert`](crate::index::Index::insert) records their
//! location, and the write order (fsync the packfile, then update the
//! index) is what keeps a crash from ever pointing the index at a
//! record that isn't durably on disk.

use crate::error::{RepoError, RepoResult};
use crate::object::ObjectInfo;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub struct PackRecord {
	pub info: ObjectInfo,
	pub packed_size: u32,
	pub payload: Vec<u8>,
}

/// A single append-only packfile. `Repository` owns a current
/// packfile and rotates to a fresh one once this grows past the
/// configured size threshold (see DESIGN.md §9.4 for the rotation
/// constant — not specified upstream).
pub struct Packfile {
	path: PathBuf,
	file: File,
	len: u64,
}

impl Packfile {
	pub fn open(path: impl Into<PathBuf>) -> RepoResult<Self> {
		let path = path.into();
		let file = OpenOptions::new().create(true).read(true).append(true).open(&path)?;
		let len = file.metadata()?.len();
		Ok(Packfile { path, file, len })
	}

	pub fn len(&self) -> u64 {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Append one record and fsync before returning, so the caller can
	/// safely update the index immediately afterward. Returns the byte
	/// offset the record was written at.
	pub fn append(&mut self, info: &ObjectInfo, payload: &[u8]) -> RepoResult<u32> {
		if payload.len() > u32::MAX as usize {
			return Err(RepoError::InvalidArgs {
				message: format!("payload of {} bytes exceeds u32 packed_size", payload.len()),
			});
		}
		let offset = self.len;
		if offset > u32::MAX as u64 {
			return Err(RepoError::BlobStoreCorrupt {
				message: "packfile exceeds 4 GiB, should have been rotated".into(),
			});
		}
		self.file.write_all(&info.to_bytes())?;
		self.file.write_all(payload)?;
		self.file.sync_all()?;
		self.len += ObjectInfo::SIZE as u64 + payload.len() as u64;
		Ok(offset as u32)
	}

	/// Read back a single record at a known offset/size (as recorded
	/// by the index). Readers never scan a packfile linearly; this is
	/// the only read path.
	pub fn read_at(&mut self, offset: u32, packed_size: u32) -> RepoResult<PackRecord> {
		self.file.seek(SeekFrom::Start(offset as u64))?;
		let mut info_bytes = [0u8; ObjectInfo::SIZE];
		self.file.read_exact(&mut info_bytes)?;
		let info = ObjectInfo::from_bytes(&info_bytes)?;
		let mut payload = vec![0u8; packed_size as usize];
		self.file.read_exact(&mut payload)?;
		Ok(PackRecord { info, packed_size, payload })
	}

	/// Copy every live record (per `keep`) to a fresh `.tmp` sibling,
	/// then atomically rename it over this packfile. Returns the new
	/// offset of each kept record, keyed by its old offset, so the
	/// caller can update the index accordingly.
	pub fn compact(
		&mut self,
		keep: impl Fn(&ObjectInfo) -> bool,
		records: &[(u32, u32)],
	) -> RepoResult<Vec<(u32, u32)>> {
		let tmp_path = self.path.with_extension("compact.tmp");
		let mut remap = Vec::with_capacity(records.len());
		{
			let mut tmp = File::create(&tmp_path)?;
			let mut written = 0u64;
			for &(offset, packed_size) in records {
				let record = self.read_at(offset, packed_size)?;
				if !keep(&record.info) {
					continue;
				}
				tmp.write_all(&record.info.to_bytes())?;
				tmp.write_all(&record.payload)?;
				remap.push((offset, written as u32));
				written += ObjectInfo::SIZE as u64 + record.payload.len() as u64;
			}
			tmp.sync_all()?;
			self.len = written;
		}
		fs::rename(&tmp_path, &self.path)?;
		self.file = OpenOptions::new().read(true).append(true).open(&self.path)?;
		Ok(remap)
	}
}
