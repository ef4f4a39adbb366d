//! Content hashing and auxiliary encodings
//!
//! The canonical object hash is SHA-256 over the uncompressed payload for
//! blobs, and over the canonical serialized form for commits, trees and
//! large-blob descriptors. Hex form is always 64 lowercase characters;
//! the all-zero hash is the sentinel for "empty"/absent.

use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// A 32-byte content hash.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ObjectHash(pub [u8; 32]);

/// Hex form of the reserved zero-length blob, computed once at the call
/// site that needs it (`ObjectHash::empty_file()`), never hardcoded, so
/// it always matches whatever `hash()` produces for `&[]`.
impl ObjectHash {
	pub const ZERO: ObjectHash = ObjectHash([0u8; 32]);

	/// Hash a payload with the canonical algorithm.
	pub fn of(payload: &[u8]) -> Self {
		let mut hasher = Sha256::new();
		hasher.update(payload);
		let digest = hasher.finalize();
		let mut out = [0u8; 32];
		out.copy_from_slice(&digest);
		ObjectHash(out)
	}

	/// The hash naming the canonical zero-length blob.
	pub fn empty_file() -> Self {
		Self::of(&[])
	}

	pub fn is_empty(&self) -> bool {
		*self == Self::ZERO
	}

	pub fn as_bytes(&self) -> &[u8; 32] {
		&self.0
	}

	pub fn hex(&self) -> String {
		hex::encode(self.0)
	}

	pub fn from_hex(s: &str) -> Result<Self, InvalidHex> {
		if s.len() != 64 || !s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
			return Err(InvalidHex);
		}
		let mut out = [0u8; 32];
		hex::decode_to_slice(s, &mut out).map_err(|_| InvalidHex)?;
		Ok(ObjectHash(out))
	}
}

impl fmt::Display for ObjectHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.hex())
	}
}

impl fmt::Debug for ObjectHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ObjectHash({})", self.hex())
	}
}

impl FromStr for ObjectHash {
	type Err = InvalidHex;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::from_hex(s)
	}
}

/// Returned when a hex string is the wrong length or contains characters
/// outside `[0-9a-f]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidHex;

impl fmt::Display for InvalidHex {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "invalid hex: expected 64 lowercase hex characters")
	}
}

impl std::error::Error for InvalidHex {}

impl From<InvalidHex> for crate::error::RepoError {
	fn from(_: InvalidHex) -> Self {
		crate::error::RepoError::InvalidArgs {
			message: "invalid hex: expected 64 lowercase hex characters".into(),
		}
	}
}

/// Constant-time comparison for secret material (key fingerprints).
/// Ordinary object-hash comparisons use `PartialEq` directly — they are
/// not secrets, so there is no timing concern, and a derived `Eq` lets
/// `ObjectHash` live in a `HashMap`/`BTreeMap` key without extra cost.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
	if a.len() != b.len() {
		return false;
	}
	let mut diff: u8 = 0;
	for (x, y) in a.iter().zip(b.iter()) {
		diff |= x ^ y;
	}
	diff == 0
}

/// Minimal percent-escaping for path segments embedded in URLs (remote
/// peer addressing). Escapes everything outside the unreserved set.
pub fn url_escape(s: &str) -> String {
	let mut out = String::with_capacity(s.len());
	for b in s.bytes() {
		match b {
			b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
				out.push(b as char)
			}
			_ => out.push_str(&format!("%{:02X}", b)),
		}
	}
	out
}

/// Minimal HTML-escaping for rendering object/commit summaries in any
/// text surface that is not strictly `application/octet-stream`.
pub fn html_escape(s: &str) -> String {
	let mut out = String::with_capacity(s.len());
	for c in s.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'"' => out.push_str("&quot;"),
			'\'' => out.push_str("&#39;"),
			_ => out.push(c),
		}
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hash_of_empty_matches_known_sha256() {
		let h = ObjectHash::of(&[]);
		assert_eq!(h.hex(), "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85");
	}

	#[test]
	fn hex_round_trip() {
		let h = ObjectHash::of(b"hello world");
		let hex = h.hex();
		assert_eq!(hex.len(), 64);
		let back = ObjectHash::from_hex(&hex).unwrap();
		assert_eq!(h, back);
	}

	#[test]
	fn rejects_bad_hex() {
		assert!(ObjectHash::from_hex("not hex").is_err());
		assert!(ObjectHash::from_hex(&"a".repeat(63)).is_err());
		assert!(ObjectHash::from_hex(&"A".repeat(64)).is_err());
	}

	#[test]
	fn zero_is_empty() {
		assert!(ObjectHash::ZERO.is_empty());
		assert!(!ObjectHash::empty_file().is_empty());
	}

	#[test]
	fn round_trip_4096_byte_pattern() {
		let mut buf = Vec::with_capacity(4096);
		for _ in 0..16 {
			for b in 0u16..256 {
				buf.push(b as u8);
			}
		}
		assert_eq!(buf.len(), 4096);
		let h = ObjectHash::of(&buf);
		assert_eq!(h, ObjectHash::of(&buf));
	}

	#[test]
	fn constant_time_eq_detects_mismatch() {
		assert!(constant_time_eq(b"abc", b"abc"));
		assert!(!constant_time_eq(b"abc", b"abd"));
		assert!(!constant_time_eq(b"abc", b"ab"));
	}

	#[test]
	fn html_escape_basic() {
		assert_eq!(html_escape("<a>&\"'"), "&lt;a&gt;&amp;&quot;&#39;");
	}
}
