//! Black-box round trip of the store's content-addressing contract.

use ori_store::hash::ObjectHash;
use ori_store::object::ObjectType;
use ori_store::repo::Repository;
use tempfile::tempdir;

#[test]
fn blob_hash_matches_sha256_of_a_known_pattern() {
	let dir = tempdir().unwrap();
	let mut repo = Repository::open(dir.path(), true).unwrap();

	let mut payload = Vec::with_capacity(4096);
	for _ in 0..16 {
		for b in 0u16..256 {
			payload.push(b as u8);
		}
	}

	let hash = repo.add_blob(&payload).unwrap();
	assert_eq!(hash, ObjectHash::of(&payload));

	let object = repo.get_object(&hash).unwrap();
	assert_eq!(object.info.object_type, ObjectType::Blob);
	assert_eq!(object.payload, payload);
}

#[test]
fn identical_content_deduplicates_to_one_object() {
	let dir = tempdir().unwrap();
	let mut repo = Repository::open(dir.path(), true).unwrap();

	let a = repo.add_blob(b"same content").unwrap();
	let b = repo.add_blob(b"same content").unwrap();
	assert_eq!(a, b);
	assert_eq!(repo.list_objects().iter().filter(|info| info.hash == a).count(), 1);
}

#[test]
fn unknown_hash_is_reported_as_not_found() {
	let dir = tempdir().unwrap();
	let mut repo = Repository::open(dir.path(), true).unwrap();
	let bogus = ObjectHash::of(b"never stored");
	assert!(!repo.has_object(&bogus));
	assert!(repo.get_object(&bogus).is_err());
}
