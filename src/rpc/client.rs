//! Client stub for the replication RPC (spec §4.10)
//!
//! `RepoClient` issues the nine wire commands over any duplex byte
//! stream and implements [`crate::repo::RemoteSource`], so
//! `Repository::pull` can drive a real peer without knowing whether it
//! is reached over a Unix socket, SSH-spawned child, or HTTP.

use crate::error::{RepoError, RepoResult};
use crate::hash::ObjectHash;
use crate::object::{Commit, Object, ObjectInfo};
use crate::repo::RemoteSource;
use crate::stream::{ReadStream, WriteStream};

use super::transport::DuplexStream;
use super::wire::{self, Command};

pub struct RepoClient<S> {
	io: DuplexStream<S>,
}

impl<S: std::io::Read + std::io::Write> RepoClient<S> {
	/// Complete the opening handshake (read the server's leading status
	/// byte) and wrap the stream for command/response framing.
	pub fn handshake(inner: S) -> RepoResult<Self> {
		let mut io = DuplexStream::new(inner);
		let status = io.read_u8()?;
		if status != wire::STATUS_OK {
			return Err(RepoError::ProtocolError {
				message: format!("server greeting was {:#x}, expected OK", status),
			});
		}
		Ok(RepoClient { io })
	}

	fn request(&mut self, cmd: Command) -> RepoResult<()> {
		wire::write_command(&mut self.io, cmd)
	}

	pub fn hello(&mut self) -> RepoResult<String> {
		self.request(Command::Hello)?;
		wire::read_status(&mut self.io)?;
		self.io.read_pstr()
	}

	pub fn get_fsid(&mut self) -> RepoResult<String> {
		self.request(Command::GetFsid)?;
		wire::read_status(&mut self.io)?;
		self.io.read_pstr()
	}

	pub fn get_version(&mut self) -> RepoResult<String> {
		self.request(Command::GetVersion)?;
		wire::read_status(&mut self.io)?;
		self.io.read_pstr()
	}

	pub fn get_head(&mut self) -> RepoResult<Option<ObjectHash>> {
		self.request(Command::GetHead)?;
		wire::read_status(&mut self.io)?;
		let hash = self.io.read_hash()?;
		Ok(if hash.is_empty() { None } else { Some(hash) })
	}

	pub fn list_objs(&mut self) -> RepoResult<Vec<ObjectInfo>> {
		self.request(Command::ListObjs)?;
		wire::read_status(&mut self.io)?;
		wire::read_object_info_list(&mut self.io)
	}

	pub fn list_commits(&mut self) -> RepoResult<Vec<Commit>> {
		self.request(Command::ListCommits)?;
		wire::read_status(&mut self.io)?;
		wire::read_commit_list(&mut self.io)
	}

	pub fn readobjs(&mut self, hashes: &[ObjectHash]) -> RepoResult<Vec<Object>> {
		self.request(Command::ReadObjs)?;
		wire::write_hash_list(&mut self.io, hashes)?;
		wire::read_status(&mut self.io)?;
		wire::read_packed_objects(&mut self.io)
	}

	pub fn getobjinfo(&mut self, hash: &ObjectHash) -> RepoResult<ObjectInfo> {
		self.request(Command::GetObjInfo)?;
		self.io.write_hash(hash)?;
		wire::read_status(&mut self.io)?;
		self.io.read_object_info()
	}

	pub fn ext_list(&mut self) -> RepoResult<Vec<String>> {
		self.request(Command::ExtList)?;
		wire::read_status(&mut self.io)?;
		let count = self.io.read_u8()?;
		let mut names = Vec::with_capacity(count as usize);
		for _ in 0..count {
			names.push(self.io.read_pstr()?);
		}
		Ok(names)
	}

	pub fn ext_call(&mut self, name: &str, data: &[u8]) -> RepoResult<Vec<u8>> {
		self.request(Command::ExtCall)?;
		self.io.write_pstr(name)?;
		wire::write_blob(&mut self.io, data)?;
		wire::read_status(&mut self.io)?;
		wire::read_blob(&mut self.io)
	}
}

/// `Repository::pull` already batches calls at its own fanout before
/// invoking [`RemoteSource::fetch_objects`], so this just issues one
/// `readobjs` round trip per call.
impl<S: std::io::Read + std::io::Write> RemoteSource for RepoClient<S> {
	fn remote_head(&mut self) -> RepoResult<Option<ObjectHash>> {
		self.get_head()
	}

	fn remote_objects(&mut self) -> RepoResult<Vec<ObjectInfo>> {
		self.list_objs()
	}

	fn fetch_objects(&mut self, hashes: &[ObjectHash]) -> RepoResult<Vec<Object>> {
		self.readobjs(hashes)
	}
}
