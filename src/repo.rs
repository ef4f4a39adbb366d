//! Repository engine
//!
//! `Repository` owns every on-disk storage layer (index, packfiles,
//! refcount/backref metadata, the named-head cache, the snapshot log,
//! the repo lock) and is the one place `object`'s pure data types meet
//! actual storage — `addBlob`/`addFile`/`addLargeFile`/`getObject` live
//! here rather than in `object` because they need index + packfile +
//! metadata access (spec §4.7), mirroring the teacher's own split
//! between `types.rs` data structures and the operations in
//! `sync_impl.rs`/`serve.rs`.

use crate::chunker::Chunker;
use crate::config::RepoConfig;
use crate::diff::FlatTree;
use crate::error::{RepoError, RepoResult};
use crate::hash::ObjectHash;
use crate::index::{Index, IndexEntry};
use crate::keys::Keyring;
use crate::lock::RepoLock;
use crate::logging::info;
use crate::metadata::{BackrefIndex, HeadIndex, RefCounts};
use crate::object::{
	ChunkSpan as ObjChunkSpan, Commit, Graft, LargeBlob, Object, ObjectFlags, ObjectInfo, ObjectType,
	Tree, TreeEntry, TreeEntryType,
};
use crate::packfile::Packfile;
use crate::snapshot::SnapshotIndex;
use crate::stream::{CompressStream, CompressionAlgo, MemoryStream, WriteStream};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

const ID_FILE: &str = "id";
const VERSION_FILE: &str = "version";
const HEAD_FILE: &str = "HEAD";
const INDEX_FILE: &str = "index";
const SNAPSHOTS_FILE: &str = "snapshots";
const METADATA_DIR: &str = "metadata";
const REFCOUNTS_FILE: &str = "refcounts";
const BACKREFS_FILE: &str = "backrefs";
const OBJS_DIR: &str = "objs";
const REFS_DIR: &str = "refs";
const REMOTES_DIR: &str = "remotes";
const TMP_DIR: &str = "tmp";
const PROTOCOL_VERSION: &str = "ori/1";

/// The minimal surface `Repository::pull` needs from a remote peer.
/// Satisfied by `rpc::client::RepoClient`; kept as a trait here so
/// this module carries no dependency on transport machinery.
pub trait RemoteSource {
	fn remote_head(&mut self) -> RepoResult<Option<ObjectHash>>;
	fn remote_objects(&mut self) -> RepoResult<Vec<ObjectInfo>>;
	fn fetch_objects(&mut self, hashes: &[ObjectHash]) -> RepoResult<Vec<Object>>;
}

pub struct Repository {
	dir: PathBuf,
	config: RepoConfig,
	index: Index,
	packfiles: HashMap<u32, Packfile>,
	current_packfile_id: u32,
	refcounts: RefCounts,
	backrefs: BackrefIndex,
	heads: HeadIndex,
	snapshots: SnapshotIndex,
	fsid: String,
	_lock: Option<RepoLock>,
}

impl Repository {
	/// Open a repository at `dir`, creating the on-disk layout of §6 if
	/// this is the first time anything has touched the directory. A
	/// `writable` handle takes the exclusive repo lock for its lifetime;
	/// readers may open the same repository concurrently without one.
	pub fn open(dir: impl Into<PathBuf>, writable: bool) -> RepoResult<Self> {
		let dir = dir.into();
		if !dir.join(ID_FILE).exists() {
			Self::init_layout(&dir)?;
		}

		let lock = if writable { Some(RepoLock::acquire(&dir)?) } else { None };

		let fsid = fs::read_to_string(dir.join(ID_FILE))?.trim().to_string();
		let index = Index::open(dir.join(INDEX_FILE))?;
		let metadata_dir = dir.join(METADATA_DIR);
		let refcounts = RefCounts::open(metadata_dir.join(REFCOUNTS_FILE))?;
		let backrefs = BackrefIndex::open(metadata_dir.join(BACKREFS_FILE))?;
		let heads = HeadIndex::rebuild(&dir.join(REFS_DIR))?;
		let snapshots = SnapshotIndex::open(dir.join(SNAPSHOTS_FILE))?;

		let (packfiles, current_packfile_id) = Self::open_packfiles(&dir)?;

		Ok(Repository {
			dir,
			config: RepoConfig::default(),
			index,
			packfiles,
			current_packfile_id,
			refcounts,
			backrefs,
			heads,
			snapshots,
			fsid,
			_lock: lock,
		})
	}

	pub fn with_config(mut self, config: RepoConfig) -> Self {
		self.config = config;
		self
	}

	fn open_packfiles(dir: &Path) -> RepoResult<(HashMap<u32, Packfile>, u32)> {
		let objs_dir = dir.join(OBJS_DIR);
		let mut packfiles = HashMap::new();
		let mut max_id = 0u32;
		if objs_dir.exists() {
			for entry in fs::read_dir(&objs_dir)? {
				let entry = entry?;
				if let Some(id) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) {
					max_id = max_id.max(id);
					packfiles.insert(id, Packfile::open(entry.path())?);
				}
			}
		}
		if packfiles.is_empty() {
			let path = objs_dir.join("0");
			packfiles.insert(0, Packfile::open(path)?);
		}
		Ok((packfiles, max_id))
	}

	fn init_layout(dir: &Path) -> RepoResult<()> {
		fs::create_dir_all(dir)?;
		fs::create_dir_all(dir.join(OBJS_DIR))?;
		fs::create_dir_all(dir.join(REFS_DIR))?;
		fs::create_dir_all(dir.join(REMOTES_DIR))?;
		fs::create_dir_all(dir.join(METADATA_DIR))?;
		fs::create_dir_all(dir.join(TMP_DIR))?;
		fs::create_dir_all(dir.join("keys").join("trusted"))?;

		let fsid = uuid::Uuid::new_v4().to_string();
		fs::write(dir.join(ID_FILE), &fsid)?;
		fs::write(dir.join(VERSION_FILE), PROTOCOL_VERSION)?;
		if !dir.join(HEAD_FILE).exists() {
			fs::write(dir.join(HEAD_FILE), "")?;
		}
		info!(dir = %dir.display(), fsid = %fsid, "initialized repository layout");
		Ok(())
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	pub fn fsid(&self) -> &str {
		&self.fsid
	}

	pub fn protocol_version(&self) -> &str {
		PROTOCOL_VERSION
	}

	pub fn keyring(&self) -> Keyring {
		Keyring::open(&self.dir)
	}

	// -- head ----------------------------------------------------------

	/// Both a missing `HEAD` file and a stored all-zero hash mean "empty
	/// commit, no parent" (spec §9 Open Question #2 resolution).
	pub fn get_head(&self) -> RepoResult<Option<ObjectHash>> {
		let contents = match fs::read_to_string(self.dir.join(HEAD_FILE)) {
			Ok(s) => s,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(e.into()),
		};
		let trimmed = contents.trim();
		if trimmed.is_empty() {
			return Ok(None);
		}
		let hash = ObjectHash::from_hex(trimmed)
			.map_err(|_| RepoError::BlobStoreCorrupt { message: "HEAD does not contain a valid hash".into() })?;
		Ok(if hash.is_empty() { None } else { Some(hash) })
	}

	pub fn update_head(&mut self, hash: ObjectHash) -> RepoResult<()> {
		let tmp = self.dir.join("HEAD.tmp");
		fs::write(&tmp, hash.hex())?;
		fs::rename(&tmp, self.dir.join(HEAD_FILE))?;
		Ok(())
	}

	// -- object storage --------------------------------------------------

	pub fn has_object(&self, hash: &ObjectHash) -> bool {
		self.index.contains(hash)
	}

	pub fn list_objects(&self) -> Vec<ObjectInfo> {
		self.index.iter().map(|e| e.info).collect()
	}

	pub fn object_info(&self, hash: &ObjectHash) -> RepoResult<ObjectInfo> {
		Ok(self.index.get(hash)?.info)
	}

	fn rotate_packfile_if_needed(&mut self) -> RepoResult<()> {
		let current_len = self.packfiles.get(&self.current_packfile_id).map(|p| p.len()).unwrap_or(0);
		if current_len >= self.config.packfile_rotate_bytes {
			self.current_packfile_id += 1;
			let path = self.dir.join(OBJS_DIR).join(self.current_packfile_id.to_string());
			self.packfiles.insert(self.current_packfile_id, Packfile::open(path)?);
		}
		Ok(())
	}

	/// Write a payload as a new object of the given type, deduplicating
	/// against an existing object with the same content hash. Objects at
	/// or above the configured compression threshold are FastLZ
	/// (`lz4_flex`)-compressed before being appended (spec §4.7 ADDED
	/// compression policy).
	/// Write `payload` as a new object, or dedup onto an existing one.
	/// Either way the object's refcount reflects this write (spec
	/// §4.7): a dedup hit increments the existing count, a fresh object
	/// starts at 1.
	fn write_object(&mut self, object_type: ObjectType, payload: Vec<u8>) -> RepoResult<ObjectHash> {
		let hash = ObjectHash::of(&payload);
		if self.index.contains(&hash) {
			self.refcounts.increment(hash)?;
			return Ok(hash);
		}

		let (flags, stored_payload) = if payload.len() >= self.config.compression_threshold {
			(ObjectFlags::COMPRESSED_FAST, CompressStream::compress(CompressionAlgo::Fast, &payload)?)
		} else {
			(ObjectFlags::UNCOMPRESSED, payload.clone())
		};

		let mut info = ObjectInfo::new(object_type, hash, payload.len() as u32);
		info.flags = flags;

		self.rotate_packfile_if_needed()?;
		let packfile_id = self.current_packfile_id;
		let packfile = self.packfiles.get_mut(&packfile_id).expect("current packfile is always open");
		let offset = packfile.append(&info, &stored_payload)?;
		self.index.insert(IndexEntry { info, offset, packed_size: stored_payload.len() as u32, packfile_id })?;
		self.refcounts.set(hash, 1)?;
		Ok(hash)
	}

	pub fn get_object(&mut self, hash: &ObjectHash) -> RepoResult<Object> {
		let entry = *self.index.get(hash)?;
		let packfile = self.packfiles.get_mut(&entry.packfile_id).ok_or_else(|| {
			RepoError::BlobStoreCorrupt {
				message: format!("packfile {} referenced by index is not open", entry.packfile_id),
			}
		})?;
		let record = packfile.read_at(entry.offset, entry.packed_size)?;
		let payload = match CompressionAlgo::from_flags(record.info.flags) {
			Some(algo) => CompressStream::decompress(algo, &record.payload)?,
			None => record.payload,
		};
		let object = Object { info: record.info, payload };
		object.verify()?;
		Ok(object)
	}

	pub fn add_blob(&mut self, payload: &[u8]) -> RepoResult<ObjectHash> {
		self.write_object(ObjectType::Blob, payload.to_vec())
	}

	/// Store `contents` as a single blob, matching spec's "addFile"
	/// semantics for anything under the chunking size (small files are
	/// whole blobs; use [`Repository::add_large_file`] for chunked
	/// storage).
	pub fn add_file(&mut self, contents: &[u8]) -> RepoResult<ObjectHash> {
		self.add_blob(contents)
	}

	/// Chunk `contents` with the configured content-defined chunker,
	/// store each chunk as its own blob, and write a `LargeBlob`
	/// descriptor listing the spans. Returns `(content_hash,
	/// descriptor_hash)`: `content_hash` is the hash of the whole file
	/// (the identity a `TreeEntry` exposes to callers), `descriptor_hash`
	/// is the `LargeBlob` object's own hash.
	pub fn add_large_file(&mut self, contents: &[u8]) -> RepoResult<(ObjectHash, ObjectHash)> {
		let mut chunker = Chunker::new(self.config.chunker_config());
		let mut spans = chunker.push(contents);
		if let Some(last) = chunker.finish() {
			spans.push(last);
		}

		let mut chunks = Vec::with_capacity(spans.len());
		for span in spans {
			let start = span.offset as usize;
			let end = start + span.length as usize;
			let chunk_hash = self.add_blob(&contents[start..end])?;
			chunks.push(ObjChunkSpan { offset: span.offset, hash: chunk_hash, length: span.length });
		}

		let large_blob = LargeBlob { chunks };
		let mut buf = MemoryStream::new(Vec::new());
		large_blob.serialize(&mut buf)?;
		let descriptor_hash = self.write_object(ObjectType::LargeBlob, buf.into_inner())?;
		let content_hash = ObjectHash::of(contents);
		Ok((content_hash, descriptor_hash))
	}

	// -- trees -----------------------------------------------------------

	/// Flatten a `Tree` object graph into a single path -> entry map
	/// (spec §8's `flatten`/`unflatten` round-trip invariant). Directory
	/// entries appear under their own path *and* are recursed into, so a
	/// diff can see both "this path became a directory" and its contents
	/// in one map.
	pub fn flatten_tree(&mut self, root: ObjectHash) -> RepoResult<FlatTree> {
		let mut flat = FlatTree::new();
		self.flatten_into(root, "", &mut flat)?;
		Ok(flat)
	}

	fn flatten_into(&mut self, tree_hash: ObjectHash, prefix: &str, out: &mut FlatTree) -> RepoResult<()> {
		let object = self.get_object(&tree_hash)?;
		let mut reader = MemoryStream::new(object.payload);
		let tree = Tree::deserialize(&mut reader)?;
		for (name, entry) in tree.entries {
			let path = if prefix.is_empty() { name } else { format!("{}/{}", prefix, name) };
			if entry.entry_type == TreeEntryType::Tree {
				self.flatten_into(entry.hash, &path, out)?;
			}
			out.insert(path, entry);
		}
		Ok(())
	}

	/// Inverse of [`Repository::flatten_tree`]: rebuild the `Tree` object
	/// graph bottom-up from a flat path map and return the root hash.
	pub fn unflatten_tree(&mut self, flat: &FlatTree) -> RepoResult<ObjectHash> {
		self.build_tree_level(flat, "")
	}

	fn build_tree_level(&mut self, flat: &FlatTree, prefix: &str) -> RepoResult<ObjectHash> {
		let mut child_names: Vec<String> = Vec::new();
		for path in flat.keys() {
			if let Some(rel) = strip_dir_prefix(path, prefix) {
				let first = rel.split('/').next().unwrap_or(rel);
				if !child_names.iter().any(|n| n == first) {
					child_names.push(first.to_string());
				}
			}
		}

		let mut tree = Tree::new();
		for name in child_names {
			let child_path = if prefix.is_empty() { name.clone() } else { format!("{}/{}", prefix, name) };
			match flat.get(&child_path) {
				Some(entry) if entry.entry_type != TreeEntryType::Tree => {
					tree.entries.insert(name, entry.clone());
				}
				_ => {
					// Either an explicit directory entry or one implied
					// by a deeper path with no entry of its own.
					let child_hash = self.build_tree_level(flat, &child_path)?;
					tree.entries.insert(name, TreeEntry::new_tree(child_hash));
				}
			}
		}

		let children: Vec<ObjectHash> = tree.entries.values().map(|e| e.hash).collect();
		let mut buf = MemoryStream::new(Vec::new());
		tree.serialize(&mut buf)?;
		let hash = self.write_object(ObjectType::Tree, buf.into_inner())?;
		for child in children {
			self.backrefs.add_referrer(child, hash)?;
		}
		Ok(hash)
	}

	// -- commits -----------------------------------------------------------

	pub fn get_commit(&mut self, hash: ObjectHash) -> RepoResult<Commit> {
		let object = self.get_object(&hash)?;
		let mut reader = MemoryStream::new(object.payload);
		Commit::deserialize(&mut reader)
	}

	/// Construct a `Commit` pointing at `tree` and the current head,
	/// write it, then update head atomically (write-temp, rename) as
	/// specified.
	pub fn commit_from_tree(
		&mut self,
		tree: ObjectHash,
		user: &str,
		time: u64,
		snapshot_name: Option<&str>,
		message: &str,
	) -> RepoResult<ObjectHash> {
		let parents = self.get_head()?.into_iter().collect();
		let commit = Commit {
			tree,
			parents,
			user: user.to_string(),
			time,
			snapshot_name: snapshot_name.unwrap_or("").to_string(),
			graft: None,
			message: message.to_string(),
		};
		let mut buf = MemoryStream::new(Vec::new());
		commit.serialize(&mut buf)?;
		let hash = self.write_object(ObjectType::Commit, buf.into_inner())?;
		self.backrefs.add_referrer(tree, hash)?;
		self.update_head(hash)?;
		Ok(hash)
	}

	/// Copy a subtree rooted at `src_path` in `src_commit` of `src`,
	/// along with every object it transitively references, into `self`,
	/// then synthesize a commit whose `graft` field records the source
	/// repository, path and commit.
	pub fn graft_subtree(
		&mut self,
		src: &mut Repository,
		src_path: &str,
		src_commit_hash: ObjectHash,
		user: &str,
		time: u64,
		message: &str,
	) -> RepoResult<ObjectHash> {
		crate::validation::validate_path_safe(Path::new(src_path))?;

		let src_commit = src.get_commit(src_commit_hash)?;
		let src_flat = src.flatten_tree(src_commit.tree)?;

		let mut grafted: FlatTree = FlatTree::new();
		for (path, entry) in &src_flat {
			let rel = if src_path.is_empty() {
				Some(path.as_str())
			} else if path == src_path {
				Some("")
			} else {
				path.strip_prefix(&format!("{}/", src_path))
			};
			let rel = match rel {
				Some(r) => r,
				None => continue,
			};
			if rel.is_empty() {
				continue;
			}
			self.copy_object_closure(src, entry)?;
			grafted.insert(rel.to_string(), entry.clone());
		}

		let new_tree_hash = self.unflatten_tree(&grafted)?;
		let commit = Commit {
			tree: new_tree_hash,
			parents: self.get_head()?.into_iter().collect(),
			user: user.to_string(),
			time,
			snapshot_name: String::new(),
			graft: Some(Graft { repo: src.fsid.clone(), path: src_path.to_string(), commit: src_commit_hash }),
			message: message.to_string(),
		};
		let mut buf = MemoryStream::new(Vec::new());
		commit.serialize(&mut buf)?;
		let hash = self.write_object(ObjectType::Commit, buf.into_inner())?;
		self.backrefs.add_referrer(new_tree_hash, hash)?;
		self.update_head(hash)?;
		Ok(hash)
	}

	fn copy_object_closure(&mut self, src: &mut Repository, entry: &TreeEntry) -> RepoResult<()> {
		match entry.entry_type {
			TreeEntryType::Blob => {
				if !self.has_object(&entry.hash) {
					let object = src.get_object(&entry.hash)?;
					self.write_object(ObjectType::Blob, object.payload)?;
				}
			}
			TreeEntryType::LargeBlob => {
				let descriptor_hash =
					entry.large_blob_hash.expect("LargeBlob tree entry always carries a descriptor hash");
				if self.has_object(&descriptor_hash) {
					return Ok(());
				}
				let descriptor_object = src.get_object(&descriptor_hash)?;
				let mut reader = MemoryStream::new(descriptor_object.payload.clone());
				let large_blob = LargeBlob::deserialize(&mut reader)?;
				for chunk in &large_blob.chunks {
					if !self.has_object(&chunk.hash) {
						let chunk_object = src.get_object(&chunk.hash)?;
						self.write_object(ObjectType::Blob, chunk_object.payload)?;
					}
				}
				self.write_object(ObjectType::LargeBlob, descriptor_object.payload)?;
			}
			TreeEntryType::Tree => {
				// Nothing to copy directly: the Tree object itself is
				// rebuilt by `unflatten_tree` from the flattened entries.
			}
		}
		Ok(())
	}

	// -- named heads / snapshots ------------------------------------------

	pub fn snapshot(&mut self, name: &str, hash: ObjectHash) -> RepoResult<()> {
		self.snapshots.put(name, hash)?;
		let refs_dir = self.dir.join(REFS_DIR);
		let tmp = refs_dir.join(format!("{}.tmp", name));
		fs::write(&tmp, hash.hex())?;
		fs::rename(&tmp, refs_dir.join(name))?;
		self.heads = HeadIndex::rebuild(&refs_dir)?;
		Ok(())
	}

	pub fn heads(&self) -> impl Iterator<Item = (&String, &ObjectHash)> {
		self.heads.iter()
	}

	/// Walk parent links from every live head, not just the primary
	/// `HEAD` (§13 supplement, grounded in `cmd_log.cc`'s multi-head
	/// traversal), deduplicating commits reachable from more than one
	/// head.
	pub fn list_commits(&mut self) -> RepoResult<Vec<Commit>> {
		let mut roots: Vec<ObjectHash> = self.heads.iter().map(|(_, h)| *h).collect();
		if let Some(h) = self.get_head()? {
			roots.push(h);
		}

		let mut seen: HashSet<ObjectHash> = HashSet::new();
		let mut frontier = roots;
		let mut commits = Vec::new();
		while let Some(hash) = frontier.pop() {
			if !seen.insert(hash) {
				continue;
			}
			let commit = self.get_commit(hash)?;
			frontier.extend(commit.parents.iter().copied());
			commits.push(commit);
		}
		Ok(commits)
	}

	// -- remotes -----------------------------------------------------------

	pub fn add_remote(&self, name: &str, url: &str) -> RepoResult<()> {
		fs::write(self.dir.join(REMOTES_DIR).join(name), url)?;
		Ok(())
	}

	pub fn get_remote(&self, name: &str) -> RepoResult<Option<String>> {
		match fs::read_to_string(self.dir.join(REMOTES_DIR).join(name)) {
			Ok(s) => Ok(Some(s.trim().to_string())),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(e.into()),
		}
	}

	// -- replication ---------------------------------------------------

	/// Write the "readobjs" packed object stream (spec §4.10): repeated
	/// `u32 group_count | group_count x (ObjectInfo, u32 packed_size,
	/// bytes)`, terminated by a `u32 0`. Compression is carried as-is
	/// from the packfile record — the stream's bytes are whatever is
	/// stored on disk, compressed or not, per `ObjectInfo.flags`.
	pub fn transmit(&mut self, writer: &mut impl WriteStream, hashes: &[ObjectHash]) -> RepoResult<()> {
		const GROUP_SIZE: usize = 64;
		for group in hashes.chunks(GROUP_SIZE) {
			writer.write_u32(group.len() as u32)?;
			for hash in group {
				let entry = *self.index.get(hash)?;
				let packfile = self.packfiles.get_mut(&entry.packfile_id).ok_or_else(|| {
					RepoError::BlobStoreCorrupt {
						message: format!("packfile {} referenced by index is not open", entry.packfile_id),
					}
				})?;
				let record = packfile.read_at(entry.offset, entry.packed_size)?;
				writer.write_object_info(&record.info)?;
				writer.write_u32(entry.packed_size)?;
				writer.write_all(&record.payload)?;
			}
		}
		writer.write_u32(0)?;
		Ok(())
	}

	/// Pull protocol (spec §4.10): fetch the remote's head and object
	/// list, batch-fetch unknown hashes, verify and store each one, then
	/// recompute refcounts and advance head. A failure at any step
	/// leaves head untouched; already-stored objects are valid cache but
	/// unreferenced until a later pull succeeds.
	pub fn pull(&mut self, remote: &mut impl RemoteSource) -> RepoResult<()> {
		let remote_head = remote.remote_head()?;
		let remote_objects = remote.remote_objects()?;

		let missing: Vec<ObjectHash> =
			remote_objects.iter().map(|info| info.hash).filter(|h| !self.has_object(h)).collect();

		const FANOUT: usize = 256;
		for batch in missing.chunks(FANOUT) {
			let objects = remote.fetch_objects(batch)?;
			for object in objects {
				object.verify()?;
				self.write_object(object.info.object_type, object.payload)?;
			}
		}

		self.rewrite_ref_counts()?;
		if let Some(head) = remote_head {
			self.update_head(head)?;
		}
		Ok(())
	}

	// -- refcounts & gc --------------------------------------------------

	/// Reachability walk from every live head (commits, trees, blobs,
	/// LargeBlob descriptors and chunks), grounded in `cmd_cleanup.cc`'s
	/// refcount recompute. Returns the freshly computed counts without
	/// persisting them — see [`Repository::rewrite_ref_counts`].
	pub fn recompute_ref_counts(&mut self) -> RepoResult<HashMap<ObjectHash, u32>> {
		let mut counts: HashMap<ObjectHash, u32> = HashMap::new();
		let mut roots: Vec<ObjectHash> = self.heads.iter().map(|(_, h)| *h).collect();
		if let Some(h) = self.get_head()? {
			roots.push(h);
		}

		let mut seen_commits: HashSet<ObjectHash> = HashSet::new();
		let mut frontier = roots;
		while let Some(commit_hash) = frontier.pop() {
			if !seen_commits.insert(commit_hash) {
				continue;
			}
			*counts.entry(commit_hash).or_insert(0) += 1;
			let commit = self.get_commit(commit_hash)?;
			frontier.extend(commit.parents.iter().copied());
			self.count_tree(commit.tree, &mut counts)?;
		}
		Ok(counts)
	}

	fn count_tree(&mut self, tree_hash: ObjectHash, counts: &mut HashMap<ObjectHash, u32>) -> RepoResult<()> {
		*counts.entry(tree_hash).or_insert(0) += 1;
		let object = self.get_object(&tree_hash)?;
		let mut reader = MemoryStream::new(object.payload);
		let tree = Tree::deserialize(&mut reader)?;
		for entry in tree.entries.values() {
			match entry.entry_type {
				TreeEntryType::Tree => self.count_tree(entry.hash, counts)?,
				TreeEntryType::Blob => {
					*counts.entry(entry.hash).or_insert(0) += 1;
				}
				TreeEntryType::LargeBlob => {
					let descriptor_hash = entry
						.large_blob_hash
						.expect("LargeBlob tree entry always carries a descriptor hash");
					*counts.entry(descriptor_hash).or_insert(0) += 1;
					let descriptor_object = self.get_object(&descriptor_hash)?;
					let mut reader = MemoryStream::new(descriptor_object.payload);
					let large_blob = LargeBlob::deserialize(&mut reader)?;
					for chunk in &large_blob.chunks {
						*counts.entry(chunk.hash).or_insert(0) += 1;
					}
				}
			}
		}
		Ok(())
	}

	/// Recompute refcounts from scratch and persist the result,
	/// replacing whatever the on-disk refcount table previously said.
	pub fn rewrite_ref_counts(&mut self) -> RepoResult<()> {
		let counts = self.recompute_ref_counts()?;
		let known: Vec<ObjectHash> = self.index.iter().map(|e| e.info.hash).collect();
		for hash in known {
			let new_count = counts.get(&hash).copied().unwrap_or(0);
			self.refcounts.set(hash, new_count)?;
		}
		Ok(())
	}

	/// Full sweep (spec §3/§4.9, narratively described; fleshed out per
	/// §13 from `cmd_cleanup.cc`'s reachability walk): recompute
	/// refcounts, then compact every packfile, eliding objects with a
	/// zero count.
	pub fn gc(&mut self) -> RepoResult<()> {
		self.rewrite_ref_counts()?;
		let live_counts: HashMap<ObjectHash, u32> = self.refcounts.iter().map(|(h, c)| (*h, *c)).collect();

		let packfile_ids: Vec<u32> = self.packfiles.keys().copied().collect();
		for id in packfile_ids {
			let records: Vec<(u32, u32)> =
				self.index.iter().filter(|e| e.packfile_id == id).map(|e| (e.offset, e.packed_size)).collect();
			if records.is_empty() {
				continue;
			}

			let hashes_in_pack: Vec<ObjectHash> =
				self.index.iter().filter(|e| e.packfile_id == id).map(|e| e.info.hash).collect();

			// A dying tree's child backrefs go stale once it's gone; read
			// its entries before `compact` below removes the bytes.
			let mut stale_backrefs: Vec<(ObjectHash, ObjectHash)> = Vec::new();
			for &hash in &hashes_in_pack {
				if live_counts.get(&hash).copied().unwrap_or(0) > 0 {
					continue;
				}
				if self.index.get(&hash)?.info.object_type != ObjectType::Tree {
					continue;
				}
				let object = self.get_object(&hash)?;
				let mut reader = MemoryStream::new(object.payload);
				let tree = Tree::deserialize(&mut reader)?;
				for child in tree.entries.values() {
					stale_backrefs.push((child.hash, hash));
				}
			}

			let remap: HashMap<u32, u32> = {
				let packfile = self.packfiles.get_mut(&id).expect("packfile listed in index is open");
				packfile
					.compact(|info| live_counts.get(&info.hash).copied().unwrap_or(0) > 0, &records)?
					.into_iter()
					.collect()
			};

			for hash in hashes_in_pack {
				let old_entry = *self.index.get(&hash)?;
				if live_counts.get(&hash).copied().unwrap_or(0) == 0 {
					self.index.remove(&hash);
					continue;
				}
				if let Some(&new_offset) = remap.get(&old_entry.offset) {
					let mut updated = old_entry;
					updated.offset = new_offset;
					self.index.insert(updated)?;
				}
			}

			for (child, dead_tree) in stale_backrefs {
				self.backrefs.remove_referrer(&child, &dead_tree)?;
			}
		}
		// Persist removals and canonicalize offsets in one pass, rather
		// than rewriting the whole index file per removed/remapped entry.
		self.index.rewrite()?;
		Ok(())
	}

	pub fn backrefs(&self) -> &BackrefIndex {
		&self.backrefs
	}

	pub fn backrefs_mut(&mut self) -> &mut BackrefIndex {
		&mut self.backrefs
	}
}

/// Strip `prefix` (a directory path, possibly empty for the root) plus
/// a following `/` from `path`, returning `None` if `path` isn't a
/// strict descendant of `prefix`.
fn strip_dir_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
	if prefix.is_empty() {
		if path.is_empty() {
			None
		} else {
			Some(path)
		}
	} else {
		path.strip_prefix(prefix)?.strip_prefix('/')
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::object::AttrMap;
	use tempfile::tempdir;

	fn single_file_tree(repo: &mut Repository, name: &str, contents: &[u8]) -> ObjectHash {
		let blob_hash = repo.add_file(contents).unwrap();
		let mut flat = FlatTree::new();
		flat.insert(name.to_string(), TreeEntry::new_blob(blob_hash, AttrMap::new()));
		repo.unflatten_tree(&flat).unwrap()
	}

	#[test]
	fn round_trip_blob() {
		let dir = tempdir().unwrap();
		let mut repo = Repository::open(dir.path(), true).unwrap();
		let payload: Vec<u8> = (0..=0xFFu16).map(|b| b as u8).cycle().take(4096).collect();
		let hash = repo.add_blob(&payload).unwrap();
		assert_eq!(hash, ObjectHash::of(&payload));

		let object = repo.get_object(&hash).unwrap();
		assert_eq!(object.payload, payload);
	}

	#[test]
	fn commit_from_tree_is_deterministic_for_fixed_inputs() {
		let dir1 = tempdir().unwrap();
		let dir2 = tempdir().unwrap();
		let mut repo1 = Repository::open(dir1.path(), true).unwrap();
		let mut repo2 = Repository::open(dir2.path(), true).unwrap();

		let tree1 = single_file_tree(&mut repo1, "a/b.txt", b"hello");
		let tree2 = single_file_tree(&mut repo2, "a/b.txt", b"hello");
		assert_eq!(tree1, tree2);

		let c1 = repo1.commit_from_tree(tree1, "alice", 0, None, "").unwrap();
		let c2 = repo2.commit_from_tree(tree2, "alice", 0, None, "").unwrap();
		assert_eq!(c1, c2);
	}

	#[test]
	fn flatten_unflatten_round_trips_tree_hash() {
		let dir = tempdir().unwrap();
		let mut repo = Repository::open(dir.path(), true).unwrap();
		let a = repo.add_file(b"file a").unwrap();
		let b = repo.add_file(b"file b").unwrap();

		let mut flat = FlatTree::new();
		flat.insert("top.txt".into(), TreeEntry::new_blob(a, AttrMap::new()));
		flat.insert("dir/nested.txt".into(), TreeEntry::new_blob(b, AttrMap::new()));
		let root = repo.unflatten_tree(&flat).unwrap();

		let round_tripped = repo.flatten_tree(root).unwrap();
		let root_again = repo.unflatten_tree(&round_tripped).unwrap();
		assert_eq!(root, root_again);
	}

	#[test]
	fn large_file_chunks_reassemble_to_original_bytes() {
		let dir = tempdir().unwrap();
		let mut repo = Repository::open(dir.path(), true).unwrap();
		let contents = vec![0x41u8; 1024 * 1024];
		let (content_hash, descriptor_hash) = repo.add_large_file(&contents).unwrap();
		assert_eq!(content_hash, ObjectHash::of(&contents));

		let descriptor_object = repo.get_object(&descriptor_hash).unwrap();
		let mut reader = MemoryStream::new(descriptor_object.payload);
		let large_blob = LargeBlob::deserialize(&mut reader).unwrap();
		assert_eq!(large_blob.total_length(), contents.len() as u64);

		let mut reassembled = Vec::with_capacity(contents.len());
		for chunk in &large_blob.chunks {
			let chunk_object = repo.get_object(&chunk.hash).unwrap();
			reassembled.extend_from_slice(&chunk_object.payload);
		}
		assert_eq!(reassembled, contents);
	}

	#[test]
	fn gc_drops_unreferenced_objects_and_keeps_live_ones() {
		let dir = tempdir().unwrap();
		let mut repo = Repository::open(dir.path(), true).unwrap();
		let tree = single_file_tree(&mut repo, "a.txt", b"kept");
		let orphan = repo.add_blob(b"never referenced by any tree").unwrap();
		let commit = repo.commit_from_tree(tree, "bob", 1, None, "").unwrap();
		repo.snapshot("master", commit).unwrap();

		repo.gc().unwrap();

		assert!(repo.get_commit(commit).is_ok());
		assert!(!repo.has_object(&orphan));
	}

	struct LocalRemote<'a> {
		repo: &'a mut Repository,
	}

	impl<'a> RemoteSource for LocalRemote<'a> {
		fn remote_head(&mut self) -> RepoResult<Option<ObjectHash>> {
			self.repo.get_head()
		}

		fn remote_objects(&mut self) -> RepoResult<Vec<ObjectInfo>> {
			Ok(self.repo.list_objects())
		}

		fn fetch_objects(&mut self, hashes: &[ObjectHash]) -> RepoResult<Vec<Object>> {
			hashes.iter().map(|h| self.repo.get_object(h)).collect()
		}
	}

	#[test]
	fn pull_reaches_head_and_object_set_equivalence() {
		let src_dir = tempdir().unwrap();
		let dst_dir = tempdir().unwrap();
		let mut src = Repository::open(src_dir.path(), true).unwrap();
		let mut dst = Repository::open(dst_dir.path(), true).unwrap();

		let tree = single_file_tree(&mut src, "a.txt", b"content");
		let commit = src.commit_from_tree(tree, "carol", 2, None, "").unwrap();

		{
			let mut remote = LocalRemote { repo: &mut src };
			dst.pull(&mut remote).unwrap();
		}

		assert_eq!(dst.get_head().unwrap(), Some(commit));
		let mut src_objects = src.list_objects();
		let mut dst_objects = dst.list_objects();
		src_objects.sort_by_key(|i| i.hash);
		dst_objects.sort_by_key(|i| i.hash);
		assert_eq!(src_objects, dst_objects);
	}

	#[test]
	fn second_pull_with_no_remote_changes_transfers_nothing_new() {
		let src_dir = tempdir().unwrap();
		let dst_dir = tempdir().unwrap();
		let mut src = Repository::open(src_dir.path(), true).unwrap();
		let mut dst = Repository::open(dst_dir.path(), true).unwrap();

		let tree = single_file_tree(&mut src, "a.txt", b"content");
		let commit = src.commit_from_tree(tree, "carol", 2, None, "").unwrap();

		{
			let mut remote = LocalRemote { repo: &mut src };
			dst.pull(&mut remote).unwrap();
		}
		let object_count_after_first_pull = dst.list_objects().len();

		{
			let mut remote = LocalRemote { repo: &mut src };
			dst.pull(&mut remote).unwrap();
		}
		assert_eq!(dst.list_objects().len(), object_count_after_first_pull);
		assert_eq!(dst.get_head().unwrap(), Some(commit));
	}
}
