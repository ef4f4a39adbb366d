//! HTTP surface for the replication RPC (spec §6)
//!
//! **[ADDED dependency, grounded in the pack]**: the teacher has no
//! HTTP framework in its dependency graph; `axum` + `tower-http` are
//! adopted from the `4-R-C-4-N-4-summit` example repo, whose
//! `summit-api`/`summitd` crates show the same small-route-count,
//! mostly-`octet-stream` shape this surface needs.
//!
//! Every route returns the identical payload bytes the stream
//! protocol's matching command would, so [`super::wire`]'s encoders
//! are reused rather than duplicated. Each handler is a thin axum
//! wrapper around a plain, synchronous, non-`axum`-typed function so
//! the payload logic can be unit tested without spinning up a router.

use axum::body::Bytes;
use axum::extract::{Path as AxumPath, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use std::sync::{Arc, Mutex};
use tower_http::trace::TraceLayer;

use crate::error::RepoError;
use crate::hash::ObjectHash;
use crate::repo::Repository;
use crate::stream::{MemoryStream, WriteStream};

use super::wire;

type SharedRepo = Arc<Mutex<Repository>>;

pub fn router(repo: SharedRepo) -> Router {
	Router::new()
		.route("/id", get(get_id))
		.route("/version", get(get_version))
		.route("/HEAD", get(get_head))
		.route("/index", get(get_index))
		.route("/commits", get(get_commits))
		.route("/contains", post(post_contains))
		.route("/getobjs", post(post_getobjs))
		.route("/objinfo/:hex", get(get_objinfo))
		.layer(TraceLayer::new_for_http())
		.with_state(repo)
}

fn text(body: String) -> Response {
	([(header::CONTENT_TYPE, "text/plain")], body).into_response()
}

fn octet_stream(body: Vec<u8>) -> Response {
	([(header::CONTENT_TYPE, "application/octet-stream")], body).into_response()
}

fn internal_error(e: RepoError) -> Response {
	(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
}

fn id_body(repo: &Mutex<Repository>) -> String {
	repo.lock().unwrap().fsid().to_string()
}

fn version_body(repo: &Mutex<Repository>) -> String {
	repo.lock().unwrap().protocol_version().to_string()
}

fn head_body(repo: &Mutex<Repository>) -> Result<String, RepoError> {
	let head = repo.lock().unwrap().get_head()?;
	Ok(head.unwrap_or(ObjectHash::ZERO).hex())
}

fn index_body(repo: &Mutex<Repository>) -> Result<Vec<u8>, RepoError> {
	let objects = repo.lock().unwrap().list_objects();
	let mut buf = MemoryStream::new(Vec::new());
	wire::write_object_info_list(&mut buf, &objects)?;
	Ok(buf.into_inner())
}

fn commits_body(repo: &Mutex<Repository>) -> Result<Vec<u8>, RepoError> {
	let commits = repo.lock().unwrap().list_commits()?;
	let mut buf = MemoryStream::new(Vec::new());
	wire::write_commit_list(&mut buf, &commits)?;
	Ok(buf.into_inner())
}

/// Body is a raw hash list (spec's `readobjs` request encoding, reused
/// here since both need "a list of hashes"). Response is a single byte
/// per requested hash, `1` present / `0` absent, in request order.
fn contains_body(repo: &Mutex<Repository>, request: &[u8]) -> Result<Vec<u8>, RepoError> {
	let mut reader = MemoryStream::new(request.to_vec());
	let hashes = wire::read_hash_list(&mut reader)?;
	let repo = repo.lock().unwrap();
	Ok(hashes.iter().map(|h| if repo.has_object(h) { 1 } else { 0 }).collect())
}

/// Body is a raw hash list; response is the same packed object stream
/// `readobjs` returns over the stream transports.
fn getobjs_body(repo: &Mutex<Repository>, request: &[u8]) -> Result<Vec<u8>, RepoError> {
	let mut reader = MemoryStream::new(request.to_vec());
	let hashes = wire::read_hash_list(&mut reader)?;
	let mut repo = repo.lock().unwrap();
	let mut buf = MemoryStream::new(Vec::new());
	repo.transmit(&mut buf, &hashes)?;
	Ok(buf.into_inner())
}

fn objinfo_body(repo: &Mutex<Repository>, hex: &str) -> Result<Vec<u8>, Response> {
	let hash = ObjectHash::from_hex(hex)
		.map_err(|_| (StatusCode::BAD_REQUEST, "invalid hash".to_string()).into_response())?;
	let info = repo
		.lock()
		.unwrap()
		.object_info(&hash)
		.map_err(|_| (StatusCode::NOT_FOUND, "object not found".to_string()).into_response())?;
	let mut buf = MemoryStream::new(Vec::new());
	buf.write_object_info(&info).map_err(internal_error)?;
	Ok(buf.into_inner())
}

async fn get_id(State(repo): State<SharedRepo>) -> Response {
	text(id_body(&repo))
}

async fn get_version(State(repo): State<SharedRepo>) -> Response {
	text(version_body(&repo))
}

async fn get_head(State(repo): State<SharedRepo>) -> Response {
	match head_body(&repo) {
		Ok(hex) => text(hex),
		Err(e) => internal_error(e),
	}
}

async fn get_index(State(repo): State<SharedRepo>) -> Response {
	match index_body(&repo) {
		Ok(body) => octet_stream(body),
		Err(e) => internal_error(e),
	}
}

async fn get_commits(State(repo): State<SharedRepo>) -> Response {
	match commits_body(&repo) {
		Ok(body) => octet_stream(body),
		Err(e) => internal_error(e),
	}
}

async fn post_contains(State(repo): State<SharedRepo>, body: Bytes) -> Response {
	match contains_body(&repo, &body) {
		Ok(flags) => octet_stream(flags),
		Err(e) => internal_error(e),
	}
}

async fn post_getobjs(State(repo): State<SharedRepo>, body: Bytes) -> Response {
	match getobjs_body(&repo, &body) {
		Ok(body) => octet_stream(body),
		Err(e) => internal_error(e),
	}
}

async fn get_objinfo(State(repo): State<SharedRepo>, AxumPath(hex): AxumPath<String>) -> Response {
	match objinfo_body(&repo, &hex) {
		Ok(body) => octet_stream(body),
		Err(response) => response,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::object::TreeEntry;
	use tempfile::tempdir;

	fn repo_with_one_commit() -> (tempfile::TempDir, Arc<Mutex<Repository>>, ObjectHash) {
		let dir = tempdir().unwrap();
		let mut repo = Repository::open(dir.path(), true).unwrap();
		let blob = repo.add_file(b"hello").unwrap();
		let mut flat = crate::diff::FlatTree::new();
		flat.insert("a.txt".into(), TreeEntry::new_blob(blob, Default::default()));
		let tree = repo.unflatten_tree(&flat).unwrap();
		let commit = repo.commit_from_tree(tree, "alice", 1, None, "first").unwrap();
		(dir, Arc::new(Mutex::new(repo)), commit)
	}

	#[test]
	fn id_and_version_match_repository() {
		let (_dir, repo, _) = repo_with_one_commit();
		let locked = repo.lock().unwrap();
		let fsid = locked.fsid().to_string();
		let version = locked.protocol_version().to_string();
		drop(locked);
		assert_eq!(id_body(&repo), fsid);
		assert_eq!(version_body(&repo), version);
	}

	#[test]
	fn head_reports_latest_commit() {
		let (_dir, repo, commit) = repo_with_one_commit();
		assert_eq!(head_body(&repo).unwrap(), commit.hex());
	}

	#[test]
	fn contains_reports_known_and_unknown_hashes() {
		let (_dir, repo, commit) = repo_with_one_commit();
		let unknown = ObjectHash::of(b"nope");
		let mut request = MemoryStream::new(Vec::new());
		wire::write_hash_list(&mut request, &[commit, unknown]).unwrap();

		let flags = contains_body(&repo, request.as_slice()).unwrap();
		assert_eq!(flags, vec![1, 0]);
	}

	#[test]
	fn getobjs_round_trips_through_read_packed_objects() {
		let (_dir, repo, commit) = repo_with_one_commit();
		let mut request = MemoryStream::new(Vec::new());
		wire::write_hash_list(&mut request, &[commit]).unwrap();

		let body = getobjs_body(&repo, request.as_slice()).unwrap();
		let mut reader = MemoryStream::new(body);
		let objects = wire::read_packed_objects(&mut reader).unwrap();
		assert_eq!(objects.len(), 1);
		assert_eq!(objects[0].info.hash, commit);
	}

	#[test]
	fn objinfo_matches_list_objects_entry() {
		let (_dir, repo, commit) = repo_with_one_commit();
		let body = objinfo_body(&repo, &commit.hex()).unwrap();
		let mut reader = MemoryStream::new(body);
		use crate::stream::ReadStream;
		let info = reader.read_object_info().unwrap();
		assert_eq!(info.hash, commit);
	}
}
