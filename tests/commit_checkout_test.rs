//! Commit/flatten/unflatten identity and determinism.

use ori_store::diff::FlatTree;
use ori_store::hash::ObjectHash;
use ori_store::object::TreeEntry;
use ori_store::repo::Repository;
use tempfile::tempdir;

#[test]
fn fixed_inputs_produce_a_deterministic_commit_hash() {
	let dir = tempdir().unwrap();
	let mut repo = Repository::open(dir.path(), true).unwrap();

	let blob = repo.add_file(b"hello world").unwrap();
	let mut flat = FlatTree::new();
	flat.insert("greeting.txt".to_string(), TreeEntry::new_blob(blob, Default::default()));
	let tree = repo.unflatten_tree(&flat).unwrap();

	let commit_a = repo.commit_from_tree(tree, "alice", 0, None, "initial").unwrap();

	// A second repository, built from the same fixed user/time/message,
	// must produce the identical commit hash.
	let dir2 = tempdir().unwrap();
	let mut repo2 = Repository::open(dir2.path(), true).unwrap();
	let blob2 = repo2.add_file(b"hello world").unwrap();
	let mut flat2 = FlatTree::new();
	flat2.insert("greeting.txt".to_string(), TreeEntry::new_blob(blob2, Default::default()));
	let tree2 = repo2.unflatten_tree(&flat2).unwrap();
	let commit_b = repo2.commit_from_tree(tree2, "alice", 0, None, "initial").unwrap();

	assert_eq!(commit_a, commit_b);
}

#[test]
fn flatten_unflatten_round_trips_a_nested_tree() {
	let dir = tempdir().unwrap();
	let mut repo = Repository::open(dir.path(), true).unwrap();

	let a = repo.add_file(b"contents a").unwrap();
	let b = repo.add_file(b"contents b").unwrap();

	let mut flat = FlatTree::new();
	flat.insert("top.txt".to_string(), TreeEntry::new_blob(a, Default::default()));
	flat.insert("sub/dir/nested.txt".to_string(), TreeEntry::new_blob(b, Default::default()));

	let root = repo.unflatten_tree(&flat).unwrap();
	let round_tripped = repo.flatten_tree(root).unwrap();

	assert_eq!(round_tripped.get("top.txt").unwrap().hash, a);
	assert_eq!(round_tripped.get("sub/dir/nested.txt").unwrap().hash, b);
}

#[test]
fn update_head_then_get_head_round_trips() {
	let dir = tempdir().unwrap();
	let mut repo = Repository::open(dir.path(), true).unwrap();
	assert_eq!(repo.get_head().unwrap(), None);

	let blob = repo.add_file(b"x").unwrap();
	let mut flat = FlatTree::new();
	flat.insert("x.txt".to_string(), TreeEntry::new_blob(blob, Default::default()));
	let tree = repo.unflatten_tree(&flat).unwrap();
	let commit = repo.commit_from_tree(tree, "bob", 1, None, "first").unwrap();
	assert_eq!(repo.get_head().unwrap(), Some(commit));

	let fetched = repo.get_commit(commit).unwrap();
	assert!(fetched.is_root());
	assert_eq!(fetched.user, "bob");

	let _ = ObjectHash::ZERO;
}
