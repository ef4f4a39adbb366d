//! Object model: `ObjectInfo`, `Object`, `Commit`, `Tree`, `Blob`,
//! `LargeBlob`, `Purged`
//!
//! Everything in this module is pure data plus serialization; the
//! operations that actually read/write objects through the index and
//! packfile (`add_blob`, `add_file`, `get_object`, ...) live on
//! `Repository` in `repo`, which owns the storage layers this module's
//! types get stored into.

use crate::error::{RepoError, RepoResult};
use crate::hash::ObjectHash;
use crate::stream::{ReadStream, WriteStream};
use std::collections::BTreeMap;

/// Four-byte ASCII type tags as stored in [`ObjectInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
	Commit,
	Tree,
	Blob,
	LargeBlob,
	Purged,
}

impl ObjectType {
	fn tag(&self) -> &'static [u8; 4] {
		match self {
			ObjectType::Commit => b"CMMT",
			ObjectType::Tree => b"TREE",
			ObjectType::Blob => b"BLOB",
			ObjectType::LargeBlob => b"LGBL",
			ObjectType::Purged => b"PURG",
		}
	}

	fn from_tag(tag: &[u8; 4]) -> RepoResult<Self> {
		Ok(match tag {
			b"CMMT" => ObjectType::Commit,
			b"TREE" => ObjectType::Tree,
			b"BLOB" => ObjectType::Blob,
			b"LGBL" => ObjectType::LargeBlob,
			b"PURG" => ObjectType::Purged,
			_ => {
				return Err(RepoError::BlobStoreCorrupt {
					message: format!("unrecognized object type tag {:?}", String::from_utf8_lossy(tag)),
				})
			}
		})
	}
}

bitflags::bitflags! {
	/// Low two bits are the compression algorithm field (spec "ORI_FLAG_ZIPMASK");
	/// remaining bits are reserved for future use and must round-trip as zero.
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct ObjectFlags: u32 {
		const UNCOMPRESSED    = 0b0000_0000;
		const COMPRESSED_FAST = 0b0000_0001;
		const COMPRESSED_MAX  = 0b0000_0010;
		const COMPRESSION_UNKNOWN = 0b0000_0011;
	}
}

const ZIP_MASK: u32 = 0b11;

impl ObjectFlags {
	pub fn is_compressed(&self) -> bool {
		self.bits() & ZIP_MASK != ObjectFlags::UNCOMPRESSED.bits()
	}
}

/// Fixed 56-byte directory-entry-like record: `type`(4) | `hash`(32) |
/// `flags`(4) | `payload_size`(4) | reserved(12, zero). The reserved
/// tail pads the record to the spec's 56-byte total and is available
/// for a future field without shifting every other offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectInfo {
	pub object_type: ObjectType,
	pub hash: ObjectHash,
	pub flags: ObjectFlags,
	/// Uncompressed payload length. `u32::MAX` means "unset" and is
	/// invalid for any object actually committed to storage.
	pub payload_size: u32,
}

impl ObjectInfo {
	pub const SIZE: usize = 56;
	pub const UNSET_SIZE: u32 = u32::MAX;

	pub fn new(object_type: ObjectType, hash: ObjectHash, payload_size: u32) -> Self {
		ObjectInfo { object_type, hash, flags: ObjectFlags::UNCOMPRESSED, payload_size }
	}

	pub fn has_all_fields(&self) -> bool {
		!self.hash.is_empty() && self.payload_size != Self::UNSET_SIZE
	}

	pub fn to_bytes(&self) -> [u8; Self::SIZE] {
		let mut out = [0u8; Self::SIZE];
		out[0..4].copy_from_slice(self.object_type.tag());
		out[4..36].copy_from_slice(self.hash.as_bytes());
		out[36..40].copy_from_slice(&self.flags.bits().to_be_bytes());
		out[40..44].copy_from_slice(&self.payload_size.to_be_bytes());
		out
	}

	pub fn from_bytes(buf: &[u8]) -> RepoResult<Self> {
		if buf.len() != Self::SIZE {
			return Err(RepoError::BlobStoreCorrupt {
				message: format!("ObjectInfo record is {} bytes, expected {}", buf.len(), Self::SIZE),
			});
		}
		let mut tag = [0u8; 4];
		tag.copy_from_slice(&buf[0..4]);
		let object_type = ObjectType::from_tag(&tag)?;
		let mut hash = [0u8; 32];
		hash.copy_from_slice(&buf[4..36]);
		let flags_bits = u32::from_be_bytes(buf[36..40].try_into().unwrap());
		let flags = ObjectFlags::from_bits_truncate(flags_bits);
		let payload_size = u32::from_be_bytes(buf[40..44].try_into().unwrap());
		Ok(ObjectInfo { object_type, hash: ObjectHash(hash), flags, payload_size })
	}
}

/// An `ObjectInfo` plus the opaque payload it describes. Constructing
/// one does not itself verify `hash(payload) == info.hash`; callers
/// that read trust-sensitive data should call [`Object::verify`].
#[derive(Debug, Clone)]
pub struct Object {
	pub info: ObjectInfo,
	pub payload: Vec<u8>,
}

impl Object {
	pub fn new(object_type: ObjectType, payload: Vec<u8>) -> Self {
		let hash = ObjectHash::of(&payload);
		let info = ObjectInfo::new(object_type, hash, payload.len() as u32);
		Object { info, payload }
	}

	pub fn verify(&self) -> RepoResult<()> {
		let actual = ObjectHash::of(&self.payload);
		if actual != self.info.hash {
			return Err(RepoError::HashMismatch {
				expected: self.info.hash.hex(),
				actual: actual.hex(),
			});
		}
		Ok(())
	}
}

/// A commit: a tree snapshot plus ancestry and metadata.
///
/// Serialized as `tree_hash | parent_count(u8) | parents | user(pstr)
/// | time(u64) | snapshot_name(pstr) | graft_present(u8) |
/// [graft_repo(pstr), graft_path(pstr), graft_commit(hash)] |
/// message(pstr)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
	pub tree: ObjectHash,
	pub parents: Vec<ObjectHash>,
	pub user: String,
	pub time: u64,
	pub snapshot_name: String,
	pub graft: Option<Graft>,
	pub message: String,
}

/// Source coordinates for a commit grafted in from another repository.
/// Paths are stored verbatim as given by the caller, with no
/// portability normalization (see DESIGN.md §9.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graft {
	pub repo: String,
	pub path: String,
	pub commit: ObjectHash,
}

impl Commit {
	pub fn serialize(&self, w: &mut impl WriteStream) -> RepoResult<()> {
		if self.parents.len() > 2 {
			return Err(RepoError::InvalidArgs {
				message: format!("commit has {} parents, at most 2 allowed", self.parents.len()),
			});
		}
		w.write_hash(&self.tree)?;
		w.write_u8(self.parents.len() as u8)?;
		for p in &self.parents {
			w.write_hash(p)?;
		}
		w.write_pstr(&self.user)?;
		w.write_u64(self.time)?;
		w.write_pstr(&self.snapshot_name)?;
		match &self.graft {
			Some(g) => {
				w.write_u8(1)?;
				w.write_pstr(&g.repo)?;
				w.write_pstr(&g.path)?;
				w.write_hash(&g.commit)?;
			}
			None => w.write_u8(0)?,
		}
		w.write_pstr(&self.message)?;
		Ok(())
	}

	pub fn deserialize(r: &mut impl ReadStream) -> RepoResult<Self> {
		let tree = r.read_hash()?;
		let parent_count = r.read_u8()?;
		if parent_count > 2 {
			return Err(RepoError::BlobStoreCorrupt {
				message: format!("commit claims {} parents, at most 2 allowed", parent_count),
			});
		}
		let mut parents = Vec::with_capacity(parent_count as usize);
		for _ in 0..parent_count {
			parents.push(r.read_hash()?);
		}
		let user = r.read_pstr()?;
		let time = r.read_u64()?;
		let snapshot_name = r.read_pstr()?;
		let graft_present = r.read_u8()?;
		let graft = match graft_present {
			0 => None,
			1 => {
				let repo = r.read_pstr()?;
				let path = r.read_pstr()?;
				let commit = r.read_hash()?;
				Some(Graft { repo, path, commit })
			}
			other => {
				return Err(RepoError::BlobStoreCorrupt {
					message: format!("invalid graft_present byte {}", other),
				})
			}
		};
		let message = r.read_pstr()?;
		Ok(Commit { tree, parents, user, time, snapshot_name, graft, message })
	}

	pub fn is_root(&self) -> bool {
		self.parents.is_empty()
	}
}

/// Recognized keys in a [`TreeEntry`]'s attribute map, documented for
/// callers rather than enforced — unrecognized keys round-trip as-is.
pub mod attr_keys {
	pub const SIZE: &str = "size";
	pub const PERMS: &str = "perms";
	pub const USER: &str = "user";
	pub const GROUP: &str = "group";
	pub const CTIME: &str = "ctime";
	pub const MTIME: &str = "mtime";
}

pub type AttrMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeEntryType {
	Tree,
	Blob,
	LargeBlob,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
	pub entry_type: TreeEntryType,
	/// For `Tree`: hash of the child Tree object. For `Blob`: hash of
	/// the blob payload. For `LargeBlob`: hash of the blob payload as
	/// reconstructed from chunks (the content identity callers see).
	pub hash: ObjectHash,
	/// Only set for `LargeBlob`: hash of the `LargeBlob` descriptor
	/// object that lists the chunk spans.
	pub large_blob_hash: Option<ObjectHash>,
	pub attrs: AttrMap,
}

impl TreeEntry {
	pub fn new_tree(hash: ObjectHash) -> Self {
		TreeEntry { entry_type: TreeEntryType::Tree, hash, large_blob_hash: None, attrs: AttrMap::new() }
	}

	pub fn new_blob(hash: ObjectHash, attrs: AttrMap) -> Self {
		TreeEntry { entry_type: TreeEntryType::Blob, hash, large_blob_hash: None, attrs }
	}

	pub fn new_large_blob(content_hash: ObjectHash, descriptor_hash: ObjectHash, attrs: AttrMap) -> Self {
		TreeEntry {
			entry_type: TreeEntryType::LargeBlob,
			hash: content_hash,
			large_blob_hash: Some(descriptor_hash),
			attrs,
		}
	}

	pub fn is_dir(&self) -> bool {
		self.entry_type == TreeEntryType::Tree
	}
}

/// Ordered map from a single relative path segment to its `TreeEntry`.
/// `BTreeMap` keeps iteration order name-sorted, which both makes the
/// serialized form canonical (same tree contents hash the same way
/// regardless of insertion order) and makes diffing two trees a single
/// merge-join over two sorted iterators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
	pub entries: BTreeMap<String, TreeEntry>,
}

impl Tree {
	pub fn new() -> Self {
		Tree::default()
	}

	pub fn serialize(&self, w: &mut impl WriteStream) -> RepoResult<()> {
		w.write_u32(self.entries.len() as u32)?;
		for (name, entry) in &self.entries {
			w.write_lpstr(name)?;
			let type_byte = match entry.entry_type {
				TreeEntryType::Tree => 0u8,
				TreeEntryType::Blob => 1u8,
				TreeEntryType::LargeBlob => 2u8,
			};
			w.write_u8(type_byte)?;
			w.write_hash(&entry.hash)?;
			match entry.large_blob_hash {
				Some(h) => {
					w.write_u8(1)?;
					w.write_hash(&h)?;
				}
				None => w.write_u8(0)?,
			}
			w.write_u32(entry.attrs.len() as u32)?;
			for (k, v) in &entry.attrs {
				w.write_lpstr(k)?;
				w.write_lpstr(v)?;
			}
		}
		Ok(())
	}

	pub fn deserialize(r: &mut impl ReadStream) -> RepoResult<Self> {
		let count = r.read_u32()?;
		let mut entries = BTreeMap::new();
		for _ in 0..count {
			let name = r.read_lpstr()?;
			let type_byte = r.read_u8()?;
			let entry_type = match type_byte {
				0 => TreeEntryType::Tree,
				1 => TreeEntryType::Blob,
				2 => TreeEntryType::LargeBlob,
				other => {
					return Err(RepoError::BlobStoreCorrupt {
						message: format!("invalid tree entry type byte {}", other),
					})
				}
			};
			let hash = r.read_hash()?;
			let has_large_blob = r.read_u8()?;
			let large_blob_hash = match has_large_blob {
				0 => None,
				1 => Some(r.read_hash()?),
				other => {
					return Err(RepoError::BlobStoreCorrupt {
						message: format!("invalid large_blob presence byte {}", other),
					})
				}
			};
			let attr_count = r.read_u32()?;
			let mut attrs = AttrMap::new();
			for _ in 0..attr_count {
				let k = r.read_lpstr()?;
				let v = r.read_lpstr()?;
				attrs.insert(k, v);
			}
			entries.insert(name, TreeEntry { entry_type, hash, large_blob_hash, attrs });
		}
		Ok(Tree { entries })
	}
}

/// One chunk span in a [`LargeBlob`] descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
	pub offset: u64,
	pub hash: ObjectHash,
	pub length: u32,
}

/// Descriptor for a file stored as a chunk sequence rather than one
/// `Blob`. Concatenating chunk payloads in offset order reproduces the
/// logical file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LargeBlob {
	pub chunks: Vec<ChunkSpan>,
}

impl LargeBlob {
	pub fn total_length(&self) -> u64 {
		self.chunks.iter().map(|c| c.length as u64).sum()
	}

	pub fn serialize(&self, w: &mut impl WriteStream) -> RepoResult<()> {
		w.write_u32(self.chunks.len() as u32)?;
		for c in &self.chunks {
			w.write_u64(c.offset)?;
			w.write_hash(&c.hash)?;
			w.write_u32(c.length)?;
		}
		Ok(())
	}

	pub fn deserialize(r: &mut impl ReadStream) -> RepoResult<Self> {
		let count = r.read_u32()?;
		let mut chunks = Vec::with_capacity(count as usize);
		for _ in 0..count {
			let offset = r.read_u64()?;
			let hash = r.read_hash()?;
			let length = r.read_u32()?;
			chunks.push(ChunkSpan { offset, hash, length });
		}
		Ok(LargeBlob { chunks })
	}
}

/// Tombstone left behind by garbage collection: the `ObjectInfo` is
/// retained (so lookups still resolve the hash to *something*) but the
/// payload is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Purged {
	pub hash: ObjectHash,
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::stream::MemoryStream;

	#[test]
	fn object_info_round_trip() {
		let info = ObjectInfo {
			object_type: ObjectType::Blob,
			hash: ObjectHash::of(b"payload"),
			flags: ObjectFlags::COMPRESSED_FAST,
			payload_size: 7,
		};
		let bytes = info.to_bytes();
		assert_eq!(bytes.len(), ObjectInfo::SIZE);
		let back = ObjectInfo::from_bytes(&bytes).unwrap();
		assert_eq!(info, back);
	}

	#[test]
	fn rejects_unknown_type_tag() {
		let mut bytes = [0u8; ObjectInfo::SIZE];
		bytes[0..4].copy_from_slice(b"XXXX");
		assert!(ObjectInfo::from_bytes(&bytes).is_err());
	}

	#[test]
	fn commit_round_trip_with_graft() {
		let commit = Commit {
			tree: ObjectHash::of(b"tree"),
			parents: vec![ObjectHash::of(b"p1")],
			user: "alice".into(),
			time: 1_700_000_000,
			snapshot_name: "".into(),
			graft: Some(Graft {
				repo: "/remote/repo".into(),
				path: "sub/dir".into(),
				commit: ObjectHash::of(b"graft-commit"),
			}),
			message: "initial import".into(),
		};
		let mut buf = MemoryStream::new(Vec::new());
		commit.serialize(&mut buf).unwrap();
		let mut reader = MemoryStream::new(buf.into_inner());
		let back = Commit::deserialize(&mut reader).unwrap();
		assert_eq!(commit, back);
	}

	#[test]
	fn tree_round_trip_is_sorted() {
		let mut tree = Tree::new();
		tree.entries.insert("b.txt".into(), TreeEntry::new_blob(ObjectHash::of(b"b"), AttrMap::new()));
		tree.entries.insert("a.txt".into(), TreeEntry::new_blob(ObjectHash::of(b"a"), AttrMap::new()));
		let names: Vec<_> = tree.entries.keys().cloned().collect();
		assert_eq!(names, vec!["a.txt".to_string(), "b.txt".to_string()]);

		let mut buf = MemoryStream::new(Vec::new());
		tree.serialize(&mut buf).unwrap();
		let mut reader = MemoryStream::new(buf.into_inner());
		let back = Tree::deserialize(&mut reader).unwrap();
		assert_eq!(tree, back);
	}

	#[test]
	fn commit_rejects_too_many_parents() {
		let commit = Commit {
			tree: ObjectHash::ZERO,
			parents: vec![ObjectHash::ZERO, ObjectHash::ZERO, ObjectHash::ZERO],
			user: "a".into(),
			time: 0,
			snapshot_name: "".into(),
			graft: None,
			message: "".into(),
		};
		let mut buf = MemoryStream::new(Vec::new());
		assert!(commit.serialize(&mut buf).is_err());
	}

	#[test]
	fn large_blob_total_length() {
		let blob = LargeBlob {
			chunks: vec![
				ChunkSpan { offset: 0, hash: ObjectHash::of(b"a"), length: 4096 },
				ChunkSpan { offset: 4096, hash: ObjectHash::of(b"b"), length: 2048 },
			],
		};
		assert_eq!(blob.total_length(), 6144);
	}
}
