//! Pull equivalence: after a successful pull, the puller's object list
//! and head match the source's, using a local `RemoteSource` adapter
//! instead of a live RPC transport.

use ori_store::diff::FlatTree;
use ori_store::error::RepoResult;
use ori_store::hash::ObjectHash;
use ori_store::object::{Object, ObjectInfo, TreeEntry};
use ori_store::repo::{RemoteSource, Repository};
use tempfile::tempdir;

struct LocalRemote<'a> {
	repo: &'a mut Repository,
}

impl RemoteSource for LocalRemote<'_> {
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
fn pull_reproduces_the_sources_object_set_and_head() {
	let source_dir = tempdir().unwrap();
	let mut source = Repository::open(source_dir.path(), true).unwrap();

	let blob_a = source.add_file(b"file a").unwrap();
	let blob_b = source.add_file(b"file b").unwrap();
	let mut flat = FlatTree::new();
	flat.insert("a.txt".to_string(), TreeEntry::new_blob(blob_a, Default::default()));
	flat.insert("b.txt".to_string(), TreeEntry::new_blob(blob_b, Default::default()));
	let tree = source.unflatten_tree(&flat).unwrap();
	let commit = source.commit_from_tree(tree, "source", 1, None, "seed").unwrap();

	let puller_dir = tempdir().unwrap();
	let mut puller = Repository::open(puller_dir.path(), true).unwrap();
	assert_eq!(puller.get_head().unwrap(), None);

	{
		let mut remote = LocalRemote { repo: &mut source };
		puller.pull(&mut remote).unwrap();
	}

	assert_eq!(puller.get_head().unwrap(), Some(commit));

	let mut source_hashes: Vec<ObjectHash> = source.list_objects().iter().map(|i| i.hash).collect();
	let mut puller_hashes: Vec<ObjectHash> = puller.list_objects().iter().map(|i| i.hash).collect();
	source_hashes.sort();
	puller_hashes.sort();
	assert_eq!(source_hashes, puller_hashes);

	for hash in &source_hashes {
		assert!(puller.has_object(hash));
	}
}

#[test]
fn a_second_pull_with_no_new_objects_is_a_no_op() {
	let source_dir = tempdir().unwrap();
	let mut source = Repository::open(source_dir.path(), true).unwrap();
	let blob = source.add_file(b"only file").unwrap();
	let mut flat = FlatTree::new();
	flat.insert("f.txt".to_string(), TreeEntry::new_blob(blob, Default::default()));
	let tree = source.unflatten_tree(&flat).unwrap();
	let commit = source.commit_from_tree(tree, "source", 1, None, "seed").unwrap();

	let puller_dir = tempdir().unwrap();
	let mut puller = Repository::open(puller_dir.path(), true).unwrap();

	{
		let mut remote = LocalRemote { repo: &mut source };
		puller.pull(&mut remote).unwrap();
	}
	{
		let mut remote = LocalRemote { repo: &mut source };
		puller.pull(&mut remote).unwrap();
	}

	assert_eq!(puller.get_head().unwrap(), Some(commit));
	assert_eq!(puller.list_objects().len(), source.list_objects().len());
}
