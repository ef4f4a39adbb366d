//! RPC server: one dedicated accept thread, one worker thread per
//! session (spec §5's "parallel threads" scheduling model — this
//! layer deliberately does not run on the tokio reactor the rest of
//! the crate uses for signal handling and the HTTP surface).

use crate::error::{RepoError, RepoResult};
use crate::logging::{info, warn};
use crate::repo::Repository;
use crate::stream::{ReadStream, WriteStream};
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::transport::DuplexStream;
use super::wire;

/// Per-session lifecycle, mirrored from spec §4.10's state table.
/// Tracked for observability (logged on transition) rather than
/// branched on — the dispatch loop's control flow already encodes the
/// same states structurally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	Idle,
	ReadingCmd,
	Dispatching,
	WritingResp,
	Closed,
}

pub struct RpcServer {
	repo: Arc<Mutex<Repository>>,
	listener: UnixListener,
	interrupt: Arc<AtomicBool>,
}

impl RpcServer {
	pub fn bind(repo: Arc<Mutex<Repository>>, socket_path: impl Into<PathBuf>) -> RepoResult<Self> {
		let socket_path = socket_path.into();
		if socket_path.exists() {
			std::fs::remove_file(&socket_path)?;
		}
		let listener = UnixListener::bind(&socket_path)?;
		Ok(RpcServer { repo, listener, interrupt: Arc::new(AtomicBool::new(false)) })
	}

	pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
		Arc::clone(&self.interrupt)
	}

	/// Accept loop: spawn one worker thread per session, checking the
	/// interrupt flag between accepts. On interrupt, stop accepting and
	/// give in-flight sessions up to 30s to drain (spec §5).
	pub fn serve_forever(&self) -> RepoResult<()> {
		let active = Arc::new(AtomicBool::new(false));
		for stream in self.listener.incoming() {
			if self.interrupt.load(Ordering::SeqCst) {
				break;
			}
			let stream = match stream {
				Ok(s) => s,
				Err(e) => {
					warn!(error = %e, "failed to accept RPC connection");
					continue;
				}
			};
			let repo = Arc::clone(&self.repo);
			let active = Arc::clone(&active);
			active.store(true, Ordering::SeqCst);
			thread::spawn(move || {
				if let Err(e) = handle_session(DuplexStream::new(stream), repo) {
					warn!(error = %e, "RPC session ended with an error");
				}
				active.store(false, Ordering::SeqCst);
			});
		}

		let deadline = std::time::Instant::now() + Duration::from_secs(30);
		while active.load(Ordering::SeqCst) && std::time::Instant::now() < deadline {
			thread::sleep(Duration::from_millis(50));
		}
		Ok(())
	}
}

/// Drive one session to completion over any duplex byte stream —
/// shared by the Unix-socket listener and the SSH/local
/// child-process-stdio entry point (`ori-serve --stdio`).
pub fn handle_session(mut io: DuplexStream<impl std::io::Read + std::io::Write>, repo: Arc<Mutex<Repository>>) -> RepoResult<()> {
	let mut state = SessionState::Idle;
	io.write_u8(wire::STATUS_OK)?;

	loop {
		state = SessionState::ReadingCmd;
		let cmd = match wire::read_command(&mut io) {
			Ok(cmd) => cmd,
			Err(_) => break,
		};

		state = SessionState::Dispatching;
		let outcome = dispatch(&repo, cmd, &mut io);

		state = SessionState::WritingResp;
		if let Err(e) = outcome {
			wire::write_err(&mut io, &e.to_string())?;
		}
	}

	state = SessionState::Closed;
	info!(state = ?state, "RPC session closed");
	Ok(())
}

fn dispatch(
	repo: &Arc<Mutex<Repository>>,
	cmd: wire::Command,
	io: &mut DuplexStream<impl std::io::Read + std::io::Write>,
) -> RepoResult<()> {
	use wire::Command::*;
	match cmd {
		Hello => {
			let version = repo.lock().unwrap().protocol_version().to_string();
			wire::write_ok(io)?;
			io.write_pstr(&version)
		}
		GetFsid => {
			let fsid = repo.lock().unwrap().fsid().to_string();
			wire::write_ok(io)?;
			io.write_pstr(&fsid)
		}
		GetVersion => {
			wire::write_ok(io)?;
			io.write_pstr(env!("CARGO_PKG_VERSION"))
		}
		GetHead => {
			let head = repo.lock().unwrap().get_head()?;
			wire::write_ok(io)?;
			io.write_hash(&head.unwrap_or(crate::hash::ObjectHash::ZERO))
		}
		ListObjs => {
			let objects = repo.lock().unwrap().list_objects();
			wire::write_ok(io)?;
			wire::write_object_info_list(io, &objects)
		}
		ListCommits => {
			let commits = repo.lock().unwrap().list_commits()?;
			wire::write_ok(io)?;
			wire::write_commit_list(io, &commits)
		}
		ReadObjs => {
			let hashes = wire::read_hash_list(io)?;
			let mut repo = repo.lock().unwrap();
			wire::write_ok(io)?;
			repo.transmit(io, &hashes)
		}
		GetObjInfo => {
			let hash = io.read_hash()?;
			let info = repo.lock().unwrap().object_info(&hash)?;
			wire::write_ok(io)?;
			io.write_object_info(&info)
		}
		ExtList => {
			wire::write_ok(io)?;
			io.write_u8(0)
		}
		ExtCall => {
			let ext_name = io.read_pstr()?;
			let _data = wire::read_blob(io)?;
			Err(RepoError::ProtocolError { message: format!("no such extension: {}", ext_name) })
		}
	}
}

/// Helper for `ori-serve --stdio <path>`: run a single session over
/// the process's own stdin/stdout rather than a socket.
pub fn serve_stdio(repo_dir: &Path) -> RepoResult<()> {
	let repo = Arc::new(Mutex::new(Repository::open(repo_dir, false)?));
	let io = DuplexStream::new(StdioDuplex);
	handle_session(io, repo)
}

struct StdioDuplex;

impl std::io::Read for StdioDuplex {
	fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
		std::io::stdin().read(buf)
	}
}

impl std::io::Write for StdioDuplex {
	fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
		std::io::stdout().write(buf)
	}

	fn flush(&mut self) -> std::io::Result<()> {
		std::io::stdout().flush()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::object::TreeEntry;
	use crate::rpc::client::RepoClient;
	use std::os::unix::net::UnixStream;
	use tempfile::tempdir;

	#[test]
	fn session_answers_hello_and_get_head() {
		let dir = tempdir().unwrap();
		let mut repo = Repository::open(dir.path(), true).unwrap();
		let blob = repo.add_file(b"hi").unwrap();
		let mut flat = crate::diff::FlatTree::new();
		flat.insert("a.txt".into(), TreeEntry::new_blob(blob, Default::default()));
		let tree = repo.unflatten_tree(&flat).unwrap();
		let commit = repo.commit_from_tree(tree, "alice", 1, None, "").unwrap();
		let repo = Arc::new(Mutex::new(repo));

		let (client_sock, server_sock) = UnixStream::pair().unwrap();
		let server_repo = Arc::clone(&repo);
		let handle = thread::spawn(move || {
			let _ = handle_session(DuplexStream::new(server_sock), server_repo);
		});

		let mut client = RepoClient::handshake(client_sock).unwrap();
		assert_eq!(client.hello().unwrap(), "ori/1");
		assert_eq!(client.get_head().unwrap(), Some(commit));
		drop(client);
		handle.join().unwrap();
	}
}
