//! KV00 key-value serializer, refcount map and backref list
//!
//! Ported from `liboriutil/kvserializer.cc`: a leading 4-byte version
//! tag (`KV00`), then repeated `u16 keylen | key | u16 vallen | value`
//! entries where each value is itself type-tagged by its first byte
//! (`S`/`B`/`W`/`D`/`Q` for string/u8/u16/u32/u64). The tag is always
//! written and always consumed on read, per the resolved open question
//! in DESIGN.md — there is no "legacy untagged" read path.

mod kv;

pub use kv::{KvSerializer, KvValue};

use crate::error::{RepoError, RepoResult};
use crate::hash::ObjectHash;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Per-object reference counts, persisted as a KV00 blob keyed by hex
/// hash with a `u32` value.
pub struct RefCounts {
	path: PathBuf,
	counts: HashMap<ObjectHash, u32>,
}

impl RefCounts {
	pub fn open(path: impl Into<PathBuf>) -> RepoResult<Self> {
		let path = path.into();
		let counts = match fs::read(&path) {
			Ok(data) => Self::parse(&data)?,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
			Err(e) => return Err(e.into()),
		};
		Ok(RefCounts { path, counts })
	}

	fn parse(data: &[u8]) -> RepoResult<HashMap<ObjectHash, u32>> {
		let kv = KvSerializer::from_blob(data)?;
		let mut counts = HashMap::new();
		for (key, value) in kv.iter() {
			let hash = ObjectHash::from_hex(key)
				.map_err(|_| RepoError::BlobStoreCorrupt { message: format!("bad hash key {}", key) })?;
			let count = match value {
				KvValue::U32(n) => *n,
				_ => {
					return Err(RepoError::BlobStoreCorrupt {
						message: format!("refcount for {} is not a u32", key),
					})
				}
			};
			counts.insert(hash, count);
		}
		Ok(counts)
	}

	pub fn get(&self, hash: &ObjectHash) -> u32 {
		self.counts.get(hash).copied().unwrap_or(0)
	}

	pub fn increment(&mut self, hash: ObjectHash) -> RepoResult<u32> {
		let count = self.counts.entry(hash).or_insert(0);
		*count += 1;
		let new_count = *count;
		self.rewrite()?;
		Ok(new_count)
	}

	/// Decrement and return the new count. Saturates at zero rather
	/// than underflowing — a double-decrement is a caller bug, logged
	/// rather than turned into a panic.
	pub fn decrement(&mut self, hash: ObjectHash) -> RepoResult<u32> {
		let new_count = match self.counts.get_mut(&hash) {
			Some(count) if *count > 0 => {
				*count -= 1;
				*count
			}
			Some(_) => {
				crate::logging::warn!(hash = %hash, "refcount already zero, ignoring decrement");
				0
			}
			None => {
				crate::logging::warn!(hash = %hash, "decrement of untracked object");
				0
			}
		};
		if new_count == 0 {
			self.counts.remove(&hash);
		}
		self.rewrite()?;
		Ok(new_count)
	}

	pub fn set(&mut self, hash: ObjectHash, count: u32) -> RepoResult<()> {
		if count == 0 {
			self.counts.remove(&hash);
		} else {
			self.counts.insert(hash, count);
		}
		self.rewrite()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&ObjectHash, &u32)> {
		self.counts.iter()
	}

	fn rewrite(&self) -> RepoResult<()> {
		let mut kv = KvSerializer::new();
		for (hash, count) in &self.counts {
			kv.put_u32(&hash.hex(), *count);
		}
		let blob = kv.to_blob();
		let tmp = self.path.with_extension("tmp");
		fs::write(&tmp, &blob)?;
		fs::rename(&tmp, &self.path)?;
		Ok(())
	}
}

/// Backref list: which commits/trees reference a given blob, used to
/// accelerate diff/gc without re-walking every tree. Stored as one
/// KV00 entry per blob hash, value a comma-joined list of referrer
/// hex hashes (kept as a string value so it rides the same KV00
/// primitive set as everything else rather than inventing a new tag).
pub struct BackrefIndex {
	path: PathBuf,
	refs: HashMap<ObjectHash, Vec<ObjectHash>>,
}

impl BackrefIndex {
	pub fn open(path: impl Into<PathBuf>) -> RepoResult<Self> {
		let path = path.into();
		let refs = match fs::read(&path) {
			Ok(data) => Self::parse(&data)?,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
			Err(e) => return Err(e.into()),
		};
		Ok(BackrefIndex { path, refs })
	}

	fn parse(data: &[u8]) -> RepoResult<HashMap<ObjectHash, Vec<ObjectHash>>> {
		let kv = KvSerializer::from_blob(data)?;
		let mut refs = HashMap::new();
		for (key, value) in kv.iter() {
			let hash = ObjectHash::from_hex(key)
				.map_err(|_| RepoError::BlobStoreCorrupt { message: format!("bad hash key {}", key) })?;
			let list_str = match value {
				KvValue::Str(s) => s.as_str(),
				_ => {
					return Err(RepoError::BlobStoreCorrupt {
						message: format!("backref list for {} is not a string", key),
					})
				}
			};
			let mut list = Vec::new();
			if !list_str.is_empty() {
				for part in list_str.split(',') {
					list.push(ObjectHash::from_hex(part).map_err(|_| RepoError::BlobStoreCorrupt {
						message: format!("bad backref entry {}", part),
					})?);
				}
			}
			refs.insert(hash, list);
		}
		Ok(refs)
	}

	pub fn referrers_of(&self, hash: &ObjectHash) -> &[ObjectHash] {
		self.refs.get(hash).map(|v| v.as_slice()).unwrap_or(&[])
	}

	pub fn add_referrer(&mut self, target: ObjectHash, referrer: ObjectHash) -> RepoResult<()> {
		let list = self.refs.entry(target).or_default();
		if !list.contains(&referrer) {
			list.push(referrer);
		}
		self.rewrite()
	}

	pub fn remove_referrer(&mut self, target: &ObjectHash, referrer: &ObjectHash) -> RepoResult<()> {
		if let Some(list) = self.refs.get_mut(target) {
			list.retain(|r| r != referrer);
			if list.is_empty() {
				self.refs.remove(target);
			}
		}
		self.rewrite()
	}

	fn rewrite(&self) -> RepoResult<()> {
		let mut kv = KvSerializer::new();
		for (hash, list) in &self.refs {
			let joined = list.iter().map(|h| h.hex()).collect::<Vec<_>>().join(",");
			kv.put_str(&hash.hex(), &joined);
		}
		let blob = kv.to_blob();
		let tmp = self.path.with_extension("tmp");
		fs::write(&tmp, &blob)?;
		fs::rename(&tmp, &self.path)?;
		Ok(())
	}
}

/// Read-through cache of the named-head map, built by listing `refs/`
/// rather than duplicated into a KV metadata file — see the resolved
/// open question in DESIGN.md §9.2. `Repository` refreshes this by
/// calling [`HeadIndex::rebuild`] after any ref mutation.
#[derive(Debug, Clone, Default)]
pub struct HeadIndex {
	heads: HashMap<String, ObjectHash>,
}

impl HeadIndex {
	pub fn rebuild(refs_dir: &Path) -> RepoResult<Self> {
		let mut heads = HashMap::new();
		if !refs_dir.exists() {
			return Ok(HeadIndex { heads });
		}
		for entry in fs::read_dir(refs_dir)? {
			let entry = entry?;
			let name = entry.file_name().to_string_lossy().into_owned();
			let contents = fs::read_to_string(entry.path())?;
			let trimmed = contents.trim();
			if trimmed.is_empty() {
				continue;
			}
			let hash = ObjectHash::from_hex(trimmed).map_err(|_| RepoError::BlobStoreCorrupt {
				message: format!("ref {} does not contain a valid hash", name),
			})?;
			heads.insert(name, hash);
		}
		Ok(HeadIndex { heads })
	}

	pub fn get(&self, name: &str) -> Option<ObjectHash> {
		self.heads.get(name).copied()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&String, &ObjectHash)> {
		self.heads.iter()
	}
}
