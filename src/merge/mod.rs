//! Three-way tree merge
//!
//! Folds the two diffs against a common ancestor per the table in
//! `libori/treediff.cc::mergeTrees`, then resolves textual conflicts
//! with [`text::three_way`] where all three sides look like text.

pub mod text;

use crate::diff::{TreeDiffEntry, TreeDiffType};
use crate::error::{RepoError, RepoResult};
use crate::hash::ObjectHash;
use std::collections::BTreeMap;

/// Outcome of folding one path's entries from both sides of a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeAction {
	/// Keep this hash (no change needed relative to the merge base).
	Keep(ObjectHash),
	/// The path was deleted on at least one side with no conflicting edit.
	Delete,
	/// A new or modified blob, its hash to be written into the result tree.
	Take(ObjectHash),
	/// Same path edited incompatibly on both sides.
	Conflict { a: Option<ObjectHash>, b: Option<ObjectHash>, base: Option<ObjectHash> },
	/// A file exists on one side where a directory exists on the other.
	FileDirConflict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
	pub path: String,
	pub action: MergeAction,
}

/// Fold `td1` (tree1 vs base) and `td2` (tree2 vs base) together,
/// path by path, per the merge table in spec §4.8.
pub fn merge_trees(
	td1: &BTreeMap<String, TreeDiffEntry>,
	td2: &BTreeMap<String, TreeDiffEntry>,
) -> Vec<MergeResult> {
	let mut paths: Vec<&String> = td1.keys().chain(td2.keys()).collect();
	paths.sort();
	paths.dedup();

	let mut results = Vec::with_capacity(paths.len());
	for path in paths {
		let e1 = td1.get(path);
		let e2 = td2.get(path);
		let action = fold_one(e1, e2);
		results.push(MergeResult { path: path.clone(), action });
	}
	results
}

fn is_new(t: TreeDiffType) -> bool {
	matches!(t, TreeDiffType::NewFile | TreeDiffType::NewDir)
}

fn is_deleted(t: TreeDiffType) -> bool {
	matches!(t, TreeDiffType::DeletedFile | TreeDiffType::DeletedDir)
}

fn fold_one(e1: Option<&TreeDiffEntry>, e2: Option<&TreeDiffEntry>) -> MergeAction {
	match (e1, e2) {
		(None, None) => unreachable!("path must appear in at least one diff"),
		(None, Some(e)) if e.diff_type == TreeDiffType::FileDirConflict => MergeAction::FileDirConflict,
		(None, Some(e)) => match e.hash_a {
			Some(h) => MergeAction::Take(h),
			None => MergeAction::Delete,
		},
		(Some(e), None) if e.diff_type == TreeDiffType::FileDirConflict => MergeAction::FileDirConflict,
		(Some(e), None) => match e.hash_a {
			Some(h) => MergeAction::Take(h),
			None => MergeAction::Delete,
		},
		(Some(e1), Some(e2)) => {
			if e1.diff_type == TreeDiffType::FileDirConflict || e2.diff_type == TreeDiffType::FileDirConflict {
				return MergeAction::FileDirConflict;
			}

			if is_new(e1.diff_type) && is_new(e2.diff_type) {
				return match (e1.hash_a, e2.hash_a) {
					(Some(h1), Some(h2)) if h1 == h2 => MergeAction::Keep(h1),
					(h1, h2) => MergeAction::Conflict { a: h1, b: h2, base: None },
				};
			}

			let e1_touches = is_new(e1.diff_type) || e1.diff_type == TreeDiffType::Modified;
			let e2_touches = is_new(e2.diff_type) || e2.diff_type == TreeDiffType::Modified;

			if e1_touches && is_deleted(e2.diff_type) {
				return MergeAction::Delete;
			}
			if is_deleted(e1.diff_type) && e2_touches {
				return match e2.hash_a {
					Some(h) => MergeAction::Take(h),
					None => MergeAction::Delete,
				};
			}

			if e1.diff_type == TreeDiffType::Modified && e2.diff_type == TreeDiffType::Modified {
				return match (e1.hash_a, e2.hash_a) {
					(Some(h1), Some(h2)) if h1 == h2 => MergeAction::Keep(h1),
					(h1, h2) => MergeAction::Conflict { a: h1, b: h2, base: e1.hash_b.or(e2.hash_b) },
				};
			}

			if is_deleted(e1.diff_type) && is_deleted(e2.diff_type) {
				return MergeAction::Delete;
			}

			MergeAction::Conflict { a: e1.hash_a, b: e2.hash_a, base: e1.hash_b.or(e2.hash_b) }
		}
	}
}

/// Find the lowest common ancestor of two commits by parallel BFS
/// upward through the parent DAG, as specified (ported from the
/// shape of `libori/commit.cc`'s ancestry walks). `parents_of` is
/// injected so this stays independent of how a `Repository` loads
/// commit objects.
pub fn find_common_ancestor(
	start_a: ObjectHash,
	start_b: ObjectHash,
	parents_of: impl Fn(&ObjectHash) -> RepoResult<Vec<ObjectHash>>,
) -> RepoResult<ObjectHash> {
	use std::collections::{HashSet, VecDeque};

	let mut seen_a: HashSet<ObjectHash> = HashSet::new();
	let mut seen_b: HashSet<ObjectHash> = HashSet::new();
	let mut frontier_a: VecDeque<ObjectHash> = VecDeque::new();
	let mut frontier_b: VecDeque<ObjectHash> = VecDeque::new();

	seen_a.insert(start_a);
	seen_b.insert(start_b);
	frontier_a.push_back(start_a);
	frontier_b.push_back(start_b);

	if start_a == start_b {
		return Ok(start_a);
	}

	while !frontier_a.is_empty() || !frontier_b.is_empty() {
		if let Some(node) = frontier_a.pop_front() {
			for parent in parents_of(&node)? {
				if seen_b.contains(&parent) {
					return Ok(parent);
				}
				if seen_a.insert(parent) {
					frontier_a.push_back(parent);
				}
			}
		}
		if let Some(node) = frontier_b.pop_front() {
			for parent in parents_of(&node)? {
				if seen_a.contains(&parent) {
					return Ok(parent);
				}
				if seen_b.insert(parent) {
					frontier_b.push_back(parent);
				}
			}
		}
	}

	Err(RepoError::NoCommonAncestor)
}

/// Turns a flattened tree pair's diff-against-base into a `BTreeMap`
/// keyed the way [`merge_trees`] expects its two inputs.
pub fn index_diff_by_path(diff: &crate::diff::TreeDiff) -> BTreeMap<String, TreeDiffEntry> {
	diff.entries().map(|e| (e.path.clone(), e.clone())).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn entry(diff_type: TreeDiffType, hash_a: Option<ObjectHash>, hash_b: Option<ObjectHash>) -> TreeDiffEntry {
		TreeDiffEntry {
			diff_type,
			path: "p".into(),
			new_path: None,
			hash_a,
			hash_b,
			hash_base: None,
			attrs_a: None,
			attrs_b: None,
		}
	}

	#[test]
	fn both_modified_same_hash_keeps() {
		let h = ObjectHash::of(b"same");
		let e1 = entry(TreeDiffType::Modified, Some(h), Some(ObjectHash::of(b"base")));
		let e2 = entry(TreeDiffType::Modified, Some(h), Some(ObjectHash::of(b"base")));
		assert_eq!(fold_one(Some(&e1), Some(&e2)), MergeAction::Keep(h));
	}

	#[test]
	fn both_modified_different_hash_conflicts() {
		let e1 = entry(TreeDiffType::Modified, Some(ObjectHash::of(b"a")), Some(ObjectHash::of(b"base")));
		let e2 = entry(TreeDiffType::Modified, Some(ObjectHash::of(b"b")), Some(ObjectHash::of(b"base")));
		assert!(matches!(fold_one(Some(&e1), Some(&e2)), MergeAction::Conflict { .. }));
	}

	#[test]
	fn modify_vs_delete_deletes() {
		let e1 = entry(TreeDiffType::Modified, Some(ObjectHash::of(b"a")), Some(ObjectHash::of(b"base")));
		let e2 = entry(TreeDiffType::DeletedFile, None, Some(ObjectHash::of(b"base")));
		assert_eq!(fold_one(Some(&e1), Some(&e2)), MergeAction::Delete);
	}

	#[test]
	fn delete_vs_new_takes_new() {
		let h = ObjectHash::of(b"new");
		let e1 = entry(TreeDiffType::DeletedFile, None, Some(ObjectHash::of(b"base")));
		let e2 = entry(TreeDiffType::NewFile, Some(h), None);
		assert_eq!(fold_one(Some(&e1), Some(&e2)), MergeAction::Take(h));
	}

	#[test]
	fn common_ancestor_found_across_branches() {
		use std::collections::HashMap;
		// root -> c1 -> c2a
		//            \-> c2b
		let root = ObjectHash::of(b"root");
		let c1 = ObjectHash::of(b"c1");
		let c2a = ObjectHash::of(b"c2a");
		let c2b = ObjectHash::of(b"c2b");

		let mut parents: HashMap<ObjectHash, Vec<ObjectHash>> = HashMap::new();
		parents.insert(c2a, vec![c1]);
		parents.insert(c2b, vec![c1]);
		parents.insert(c1, vec![root]);
		parents.insert(root, vec![]);

		let ancestor = find_common_ancestor(c2a, c2b, |h| Ok(parents.get(h).cloned().unwrap_or_default()))
			.unwrap();
		assert_eq!(ancestor, c1);
	}

	#[test]
	fn no_common_ancestor_errors() {
		use std::collections::HashMap;
		let a = ObjectHash::of(b"a");
		let b = ObjectHash::of(b"b");
		let parents: HashMap<ObjectHash, Vec<ObjectHash>> = HashMap::new();
		let err = find_common_ancestor(a, b, |h| Ok(parents.get(h).cloned().unwrap_or_default())).unwrap_err();
		assert!(matches!(err, RepoError::NoCommonAncestor));
	}
}
