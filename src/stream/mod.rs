//! Byte-oriented streams with an optional type-tagged wire mode
//!
//! Every object payload that crosses a module boundary (packfile record,
//! RPC frame, compression pipeline) goes through a [`ReadStream`] /
//! [`WriteStream`] pair rather than a raw `Read`/`Write`. In "typed" mode
//! each primitive write is preceded by a one-byte tag (`0xA0`-`0xAB`,
//! mirroring the tag space a length-prefixed wire format reserves for
//! framing) so a reader can sanity-check the shape of what it is
//! decoding instead of trusting the byte offset blindly. Untyped mode
//! is the same primitives with the tag byte omitted, used for the bulk
//! chunk payloads where the extra byte per field would be pure
//! overhead.

mod compress;
mod file;
mod memory;

pub use compress::{CompressStream, CompressionAlgo};
pub use file::DiskFileStream;
pub use memory::MemoryStream;

use crate::error::{RepoError, RepoResult};
use crate::hash::ObjectHash;
use crate::object::ObjectInfo;

/// Tag bytes written ahead of each primitive in typed mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamTag {
	Int8 = 0xA0,
	Int16 = 0xA1,
	Int32 = 0xA2,
	Int64 = 0xA3,
	UInt8 = 0xA4,
	UInt16 = 0xA5,
	UInt32 = 0xA6,
	UInt64 = 0xA7,
	PStr = 0xA8,
	LPStr = 0xA9,
	ObjHash = 0xAA,
	ObjInfo = 0xAB,
}

impl StreamTag {
	fn from_byte(b: u8) -> Option<Self> {
		Some(match b {
			0xA0 => StreamTag::Int8,
			0xA1 => StreamTag::Int16,
			0xA2 => StreamTag::Int32,
			0xA3 => StreamTag::Int64,
			0xA4 => StreamTag::UInt8,
			0xA5 => StreamTag::UInt16,
			0xA6 => StreamTag::UInt32,
			0xA7 => StreamTag::UInt64,
			0xA8 => StreamTag::PStr,
			0xA9 => StreamTag::LPStr,
			0xAA => StreamTag::ObjHash,
			0xAB => StreamTag::ObjInfo,
			_ => return None,
		})
	}
}

/// Readable byte source, with typed-mode framing built on top of the
/// minimal `read`/`size_hint`/`ended` primitives a concrete stream
/// implements.
pub trait ReadStream {
	/// Read up to `buf.len()` bytes, returning the number actually read.
	/// `Ok(0)` with `ended() == false` is a transient short read, not EOF.
	fn read(&mut self, buf: &mut [u8]) -> RepoResult<usize>;

	/// Total size if known up front (file-backed streams), 0 otherwise.
	fn size_hint(&self) -> u64;

	fn ended(&self) -> bool;

	/// Whether primitive reads expect a leading [`StreamTag`] byte.
	fn is_typed(&self) -> bool {
		false
	}

	fn read_exact(&mut self, buf: &mut [u8]) -> RepoResult<()> {
		let mut total = 0;
		while total < buf.len() {
			let n = self.read(&mut buf[total..])?;
			if n == 0 {
				if self.ended() {
					return Err(RepoError::ProtocolError {
						message: "unexpected end of stream".into(),
					});
				}
				continue;
			}
			total += n;
		}
		Ok(())
	}

	fn read_all(&mut self) -> RepoResult<Vec<u8>> {
		let hint = self.size_hint();
		if hint > 0 {
			let mut buf = vec![0u8; hint as usize];
			self.read_exact(&mut buf)?;
			return Ok(buf);
		}
		let mut out = Vec::new();
		let mut chunk = [0u8; 8192];
		while !self.ended() {
			let n = self.read(&mut chunk)?;
			out.extend_from_slice(&chunk[..n]);
		}
		Ok(out)
	}

	fn expect_tag(&mut self, tag: StreamTag) -> RepoResult<()> {
		if !self.is_typed() {
			return Ok(());
		}
		let mut b = [0u8; 1];
		self.read_exact(&mut b)?;
		match StreamTag::from_byte(b[0]) {
			Some(t) if t == tag => Ok(()),
			_ => Err(RepoError::ProtocolError {
				message: format!("expected stream tag {:?}, found byte {:#x}", tag, b[0]),
			}),
		}
	}

	fn read_i8(&mut self) -> RepoResult<i8> {
		self.expect_tag(StreamTag::Int8)?;
		let mut b = [0u8; 1];
		self.read_exact(&mut b)?;
		Ok(b[0] as i8)
	}

	fn read_i16(&mut self) -> RepoResult<i16> {
		self.expect_tag(StreamTag::Int16)?;
		let mut b = [0u8; 2];
		self.read_exact(&mut b)?;
		Ok(i16::from_be_bytes(b))
	}

	fn read_i32(&mut self) -> RepoResult<i32> {
		self.expect_tag(StreamTag::Int32)?;
		let mut b = [0u8; 4];
		self.read_exact(&mut b)?;
		Ok(i32::from_be_bytes(b))
	}

	fn read_i64(&mut self) -> RepoResult<i64> {
		self.expect_tag(StreamTag::Int64)?;
		let mut b = [0u8; 8];
		self.read_exact(&mut b)?;
		Ok(i64::from_be_bytes(b))
	}

	fn read_u8(&mut self) -> RepoResult<u8> {
		self.expect_tag(StreamTag::UInt8)?;
		let mut b = [0u8; 1];
		self.read_exact(&mut b)?;
		Ok(b[0])
	}

	fn read_u16(&mut self) -> RepoResult<u16> {
		self.expect_tag(StreamTag::UInt16)?;
		let mut b = [0u8; 2];
		self.read_exact(&mut b)?;
		Ok(u16::from_be_bytes(b))
	}

	fn read_u32(&mut self) -> RepoResult<u32> {
		self.expect_tag(StreamTag::UInt32)?;
		let mut b = [0u8; 4];
		self.read_exact(&mut b)?;
		Ok(u32::from_be_bytes(b))
	}

	fn read_u64(&mut self) -> RepoResult<u64> {
		self.expect_tag(StreamTag::UInt64)?;
		let mut b = [0u8; 8];
		self.read_exact(&mut b)?;
		Ok(u64::from_be_bytes(b))
	}

	/// Short Pascal string: one length byte followed by that many bytes.
	fn read_pstr(&mut self) -> RepoResult<String> {
		self.expect_tag(StreamTag::PStr)?;
		let mut len = [0u8; 1];
		self.read_exact(&mut len)?;
		let mut buf = vec![0u8; len[0] as usize];
		self.read_exact(&mut buf)?;
		String::from_utf8(buf)
			.map_err(|_| RepoError::ProtocolError { message: "pstr is not valid utf-8".into() })
	}

	/// Long Pascal string: u16 length prefix followed by that many bytes.
	fn read_lpstr(&mut self) -> RepoResult<String> {
		self.expect_tag(StreamTag::LPStr)?;
		let mut len = [0u8; 2];
		self.read_exact(&mut len)?;
		let n = u16::from_be_bytes(len) as usize;
		let mut buf = vec![0u8; n];
		self.read_exact(&mut buf)?;
		String::from_utf8(buf)
			.map_err(|_| RepoError::ProtocolError { message: "lpstr is not valid utf-8".into() })
	}

	fn read_hash(&mut self) -> RepoResult<ObjectHash> {
		self.expect_tag(StreamTag::ObjHash)?;
		let mut buf = [0u8; 32];
		self.read_exact(&mut buf)?;
		Ok(ObjectHash(buf))
	}

	fn read_object_info(&mut self) -> RepoResult<ObjectInfo> {
		self.expect_tag(StreamTag::ObjInfo)?;
		let mut buf = [0u8; ObjectInfo::SIZE];
		self.read_exact(&mut buf)?;
		ObjectInfo::from_bytes(&buf)
	}
}

/// Writable byte sink, mirroring [`ReadStream`].
pub trait WriteStream {
	fn write(&mut self, buf: &[u8]) -> RepoResult<usize>;

	fn is_typed(&self) -> bool {
		false
	}

	fn write_all(&mut self, buf: &[u8]) -> RepoResult<()> {
		let mut total = 0;
		while total < buf.len() {
			let n = self.write(&buf[total..])?;
			if n == 0 {
				return Err(RepoError::ProtocolError { message: "write returned 0".into() });
			}
			total += n;
		}
		Ok(())
	}

	fn write_tag(&mut self, tag: StreamTag) -> RepoResult<()> {
		if self.is_typed() {
			self.write_all(&[tag as u8])?;
		}
		Ok(())
	}

	fn write_i8(&mut self, v: i8) -> RepoResult<()> {
		self.write_tag(StreamTag::Int8)?;
		self.write_all(&[v as u8])
	}

	fn write_i16(&mut self, v: i16) -> RepoResult<()> {
		self.write_tag(StreamTag::Int16)?;
		self.write_all(&v.to_be_bytes())
	}

	fn write_i32(&mut self, v: i32) -> RepoResult<()> {
		self.write_tag(StreamTag::Int32)?;
		self.write_all(&v.to_be_bytes())
	}

	fn write_i64(&mut self, v: i64) -> RepoResult<()> {
		self.write_tag(StreamTag::Int64)?;
		self.write_all(&v.to_be_bytes())
	}

	fn write_u8(&mut self, v: u8) -> RepoResult<()> {
		self.write_tag(StreamTag::UInt8)?;
		self.write_all(&[v])
	}

	fn write_u16(&mut self, v: u16) -> RepoResult<()> {
		self.write_tag(StreamTag::UInt16)?;
		self.write_all(&v.to_be_bytes())
	}

	fn write_u32(&mut self, v: u32) -> RepoResult<()> {
		self.write_tag(StreamTag::UInt32)?;
		self.write_all(&v.to_be_bytes())
	}

	fn write_u64(&mut self, v: u64) -> RepoResult<()> {
		self.write_tag(StreamTag::UInt64)?;
		self.write_all(&v.to_be_bytes())
	}

	fn write_pstr(&mut self, s: &str) -> RepoResult<()> {
		if s.len() > u8::MAX as usize {
			return Err(RepoError::InvalidArgs {
				message: format!("pstr too long: {} bytes (max 255)", s.len()),
			});
		}
		self.write_tag(StreamTag::PStr)?;
		self.write_all(&[s.len() as u8])?;
		self.write_all(s.as_bytes())
	}

	fn write_lpstr(&mut self, s: &str) -> RepoResult<()> {
		if s.len() > u16::MAX as usize {
			return Err(RepoError::InvalidArgs {
				message: format!("lpstr too long: {} bytes (max 65535)", s.len()),
			});
		}
		self.write_tag(StreamTag::LPStr)?;
		self.write_all(&(s.len() as u16).to_be_bytes())?;
		self.write_all(s.as_bytes())
	}

	fn write_hash(&mut self, h: &ObjectHash) -> RepoResult<()> {
		self.write_tag(StreamTag::ObjHash)?;
		self.write_all(h.as_bytes())
	}

	fn write_object_info(&mut self, info: &ObjectInfo) -> RepoResult<()> {
		self.write_tag(StreamTag::ObjInfo)?;
		self.write_all(&info.to_bytes())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn typed_roundtrip_rejects_mismatched_tag() {
		let mut m = MemoryStream::new_typed(Vec::new());
		m.write_u32(42).unwrap();
		let mut reader = MemoryStream::from_vec_typed(m.into_inner());
		let err = reader.read_u64();
		assert!(err.is_err());
	}

	#[test]
	fn untyped_roundtrip() {
		let mut m = MemoryStream::new(Vec::new());
		m.write_u32(7).unwrap();
		m.write_pstr("hi").unwrap();
		let mut reader = MemoryStream::from_vec(m.into_inner());
		assert_eq!(reader.read_u32().unwrap(), 7);
		assert_eq!(reader.read_pstr().unwrap(), "hi");
	}

	#[test]
	fn signed_roundtrip_typed_and_untyped() {
		let mut typed = MemoryStream::new_typed(Vec::new());
		typed.write_i8(-1).unwrap();
		typed.write_i16(-1000).unwrap();
		typed.write_i32(-100_000).unwrap();
		typed.write_i64(-10_000_000_000).unwrap();
		let mut reader = MemoryStream::from_vec_typed(typed.into_inner());
		assert_eq!(reader.read_i8().unwrap(), -1);
		assert_eq!(reader.read_i16().unwrap(), -1000);
		assert_eq!(reader.read_i32().unwrap(), -100_000);
		assert_eq!(reader.read_i64().unwrap(), -10_000_000_000);

		let mut untyped = MemoryStream::new(Vec::new());
		untyped.write_i32(-42).unwrap();
		let mut reader = MemoryStream::from_vec(untyped.into_inner());
		assert_eq!(reader.read_i32().unwrap(), -42);
	}
}
