//! Structural tree diff
//!
//! Ported from `libori/treediff.cc`: a diff is computed over two
//! *flattened* trees (absolute repo path -> `TreeEntry`), not by
//! walking the `Tree` object graph recursively, so that renamed-file
//! detection and path-keyed folding are simple map operations.

use crate::hash::ObjectHash;
use crate::object::{AttrMap, TreeEntry};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeDiffType {
	NewFile,
	NewDir,
	DeletedFile,
	DeletedDir,
	Modified,
	Renamed,
	MergeConflict,
	FileDirConflict,
	Noop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeDiffEntry {
	pub diff_type: TreeDiffType,
	pub path: String,
	pub new_path: Option<String>,
	pub hash_a: Option<ObjectHash>,
	pub hash_b: Option<ObjectHash>,
	pub hash_base: Option<ObjectHash>,
	pub attrs_a: Option<AttrMap>,
	pub attrs_b: Option<AttrMap>,
}

impl TreeDiffEntry {
	fn new(diff_type: TreeDiffType, path: impl Into<String>) -> Self {
		TreeDiffEntry {
			diff_type,
			path: path.into(),
			new_path: None,
			hash_a: None,
			hash_b: None,
			hash_base: None,
			attrs_a: None,
			attrs_b: None,
		}
	}
}

/// A flattened tree: absolute path inside the repo -> entry.
pub type FlatTree = BTreeMap<String, TreeEntry>;

/// Ordered diff with a path index, so repeated mutations to the same
/// path (e.g. during an in-progress fold) replace or cancel the prior
/// entry in place instead of appending a new, contradictory one.
#[derive(Debug, Clone, Default)]
pub struct TreeDiff {
	entries: Vec<TreeDiffEntry>,
	index_of_path: BTreeMap<String, usize>,
}

impl TreeDiff {
	pub fn new() -> Self {
		TreeDiff::default()
	}

	/// Append an entry, or replace the most recent entry for the same
	/// path if one exists — `Noop` cancels any prior entry outright,
	/// since a path that nets out unchanged shouldn't appear at all.
	pub fn append(&mut self, entry: TreeDiffEntry) {
		if entry.diff_type == TreeDiffType::Noop {
			if let Some(&idx) = self.index_of_path.get(&entry.path) {
				self.entries[idx] = entry;
			}
			return;
		}
		match self.index_of_path.get(&entry.path) {
			Some(&idx) => self.entries[idx] = entry,
			None => {
				self.index_of_path.insert(entry.path.clone(), self.entries.len());
				self.entries.push(entry);
			}
		}
	}

	pub fn merge_into(&mut self, other: TreeDiff) {
		for entry in other.entries {
			self.append(entry);
		}
	}

	pub fn entries(&self) -> impl Iterator<Item = &TreeDiffEntry> {
		self.entries.iter().filter(|e| e.diff_type != TreeDiffType::Noop)
	}

	pub fn get(&self, path: &str) -> Option<&TreeDiffEntry> {
		self.index_of_path.get(path).map(|&idx| &self.entries[idx])
	}

	pub fn is_empty(&self) -> bool {
		self.entries().next().is_none()
	}
}

/// Diff two flattened trees against each other. `tree_a` is the "new"
/// side for `NewFile`/`NewDir`/`Modified`, `tree_b` is the "old"/base
/// side for `DeletedFile`/`DeletedDir`.
pub fn diff_two_trees(tree_a: &FlatTree, tree_b: &FlatTree) -> TreeDiff {
	let mut diff = TreeDiff::new();

	for (path, entry_a) in tree_a {
		match tree_b.get(path) {
			None => {
				let diff_type = if entry_a.is_dir() { TreeDiffType::NewDir } else { TreeDiffType::NewFile };
				let mut e = TreeDiffEntry::new(diff_type, path.clone());
				e.hash_a = Some(entry_a.hash);
				e.attrs_a = Some(entry_a.attrs.clone());
				diff.append(e);
			}
			Some(entry_b) => {
				if entry_a.is_dir() != entry_b.is_dir() {
					let mut e = TreeDiffEntry::new(TreeDiffType::FileDirConflict, path.clone());
					e.hash_a = Some(entry_a.hash);
					e.hash_b = Some(entry_b.hash);
					diff.append(e);
				} else if entry_a.hash == entry_b.hash && entry_a.attrs == entry_b.attrs {
					diff.append(TreeDiffEntry::new(TreeDiffType::Noop, path.clone()));
				} else {
					let mut e = TreeDiffEntry::new(TreeDiffType::Modified, path.clone());
					e.hash_a = Some(entry_a.hash);
					e.hash_b = Some(entry_b.hash);
					e.attrs_a = Some(entry_a.attrs.clone());
					e.attrs_b = Some(entry_b.attrs.clone());
					diff.append(e);
				}
			}
		}
	}

	for (path, entry_b) in tree_b {
		if !tree_a.contains_key(path) {
			let diff_type =
				if entry_b.is_dir() { TreeDiffType::DeletedDir } else { TreeDiffType::DeletedFile };
			let mut e = TreeDiffEntry::new(diff_type, path.clone());
			e.hash_b = Some(entry_b.hash);
			e.attrs_b = Some(entry_b.attrs.clone());
			diff.append(e);
		}
	}

	diff
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::object::TreeEntryType;

	fn blob_entry(hash: ObjectHash) -> TreeEntry {
		TreeEntry { entry_type: TreeEntryType::Blob, hash, large_blob_hash: None, attrs: AttrMap::new() }
	}

	fn dir_entry(hash: ObjectHash) -> TreeEntry {
		TreeEntry { entry_type: TreeEntryType::Tree, hash, large_blob_hash: None, attrs: AttrMap::new() }
	}

	#[test]
	fn detects_new_modified_deleted() {
		let mut a = FlatTree::new();
		let mut b = FlatTree::new();

		a.insert("new.txt".into(), blob_entry(ObjectHash::of(b"new")));
		a.insert("same.txt".into(), blob_entry(ObjectHash::of(b"same")));
		b.insert("same.txt".into(), blob_entry(ObjectHash::of(b"same")));
		a.insert("changed.txt".into(), blob_entry(ObjectHash::of(b"v2")));
		b.insert("changed.txt".into(), blob_entry(ObjectHash::of(b"v1")));
		b.insert("gone.txt".into(), blob_entry(ObjectHash::of(b"gone")));

		let diff = diff_two_trees(&a, &b);
		let entries: Vec<_> = diff.entries().collect();
		assert_eq!(entries.len(), 3);
		assert!(diff.get("same.txt").is_none());
		assert_eq!(diff.get("new.txt").unwrap().diff_type, TreeDiffType::NewFile);
		assert_eq!(diff.get("changed.txt").unwrap().diff_type, TreeDiffType::Modified);
		assert_eq!(diff.get("gone.txt").unwrap().diff_type, TreeDiffType::DeletedFile);
	}

	#[test]
	fn file_dir_conflict_detected() {
		let mut a = FlatTree::new();
		let mut b = FlatTree::new();
		a.insert("x".into(), dir_entry(ObjectHash::of(b"dir")));
		b.insert("x".into(), blob_entry(ObjectHash::of(b"file")));

		let diff = diff_two_trees(&a, &b);
		assert_eq!(diff.get("x").unwrap().diff_type, TreeDiffType::FileDirConflict);
	}

	#[test]
	fn append_replaces_same_path_entry() {
		let mut diff = TreeDiff::new();
		let mut e1 = TreeDiffEntry::new(TreeDiffType::NewFile, "a");
		e1.hash_a = Some(ObjectHash::of(b"1"));
		diff.append(e1);

		let mut e2 = TreeDiffEntry::new(TreeDiffType::Modified, "a");
		e2.hash_a = Some(ObjectHash::of(b"2"));
		diff.append(e2);

		assert_eq!(diff.entries().count(), 1);
		assert_eq!(diff.get("a").unwrap().diff_type, TreeDiffType::Modified);
	}
}
