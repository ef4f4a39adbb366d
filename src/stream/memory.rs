use super::{ReadStream, WriteStream};
use crate::error::RepoResult;

/// In-memory stream, typically backing small serialized objects
/// (commits, trees, KV00 blobs) that never touch disk on their own.
pub struct MemoryStream {
	buf: Vec<u8>,
	pos: usize,
	typed: bool,
}

impl MemoryStream {
	pub fn new(buf: Vec<u8>) -> Self {
		MemoryStream { buf, pos: 0, typed: false }
	}

	pub fn new_typed(buf: Vec<u8>) -> Self {
		MemoryStream { buf, pos: 0, typed: true }
	}

	pub fn from_vec(buf: Vec<u8>) -> Self {
		Self::new(buf)
	}

	pub fn from_vec_typed(buf: Vec<u8>) -> Self {
		Self::new_typed(buf)
	}

	pub fn into_inner(self) -> Vec<u8> {
		self.buf
	}

	pub fn as_slice(&self) -> &[u8] {
		&self.buf
	}
}

impl ReadStream for MemoryStream {
	fn read(&mut self, buf: &mut [u8]) -> RepoResult<usize> {
		let remaining = &self.buf[self.pos..];
		let n = remaining.len().min(buf.len());
		buf[..n].copy_from_slice(&remaining[..n]);
		self.pos += n;
		Ok(n)
	}

	fn size_hint(&self) -> u64 {
		(self.buf.len() - self.pos) as u64
	}

	fn ended(&self) -> bool {
		self.pos >= self.buf.len()
	}

	fn is_typed(&self) -> bool {
		self.typed
	}
}

impl WriteStream for MemoryStream {
	fn write(&mut self, buf: &[u8]) -> RepoResult<usize> {
		self.buf.extend_from_slice(buf);
		Ok(buf.len())
	}

	fn is_typed(&self) -> bool {
		self.typed
	}
}
