use crate::error::{RepoError, RepoResult};
use std::collections::BTreeMap;

const VERSION_TAG: &[u8; 4] = b"KV00";

/// A single stored value, type-tagged by its first on-wire byte
/// (`S`/`B`/`W`/`D`/`Q`), matching `KVSerializer::KVType`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvValue {
	Str(String),
	U8(u8),
	U16(u16),
	U32(u32),
	U64(u64),
}

impl KvValue {
	fn encode(&self) -> Vec<u8> {
		match self {
			KvValue::Str(s) => {
				let mut out = vec![b'S'];
				out.extend_from_slice(s.as_bytes());
				out
			}
			KvValue::U8(v) => vec![b'B', *v],
			KvValue::U16(v) => {
				let mut out = vec![b'W'];
				out.extend_from_slice(&v.to_be_bytes());
				out
			}
			KvValue::U32(v) => {
				let mut out = vec![b'D'];
				out.extend_from_slice(&v.to_be_bytes());
				out
			}
			KvValue::U64(v) => {
				let mut out = vec![b'Q'];
				out.extend_from_slice(&v.to_be_bytes());
				out
			}
		}
	}

	fn decode(raw: &[u8]) -> RepoResult<Self> {
		if raw.is_empty() {
			return Err(RepoError::BlobStoreCorrupt { message: "empty KV00 value".into() });
		}
		let (tag, body) = (raw[0], &raw[1..]);
		Ok(match tag {
			b'S' => KvValue::Str(
				String::from_utf8(body.to_vec())
					.map_err(|_| RepoError::BlobStoreCorrupt { message: "KV00 string is not utf-8".into() })?,
			),
			b'B' if body.len() == 1 => KvValue::U8(body[0]),
			b'W' if body.len() == 2 => KvValue::U16(u16::from_be_bytes(body.try_into().unwrap())),
			b'D' if body.len() == 4 => KvValue::U32(u32::from_be_bytes(body.try_into().unwrap())),
			b'Q' if body.len() == 8 => KvValue::U64(u64::from_be_bytes(body.try_into().unwrap())),
			_ => {
				return Err(RepoError::BlobStoreCorrupt {
					message: format!("unrecognized KV00 value tag {:#x} (len {})", tag, body.len()),
				})
			}
		})
	}
}

/// Ordered (by key) key-value table serialized to the `KV00` blob
/// format: `KV00 | (u16 keylen | key | u16 vallen | tagged-value)*`.
#[derive(Debug, Clone, Default)]
pub struct KvSerializer {
	table: BTreeMap<String, KvValue>,
}

impl KvSerializer {
	pub fn new() -> Self {
		KvSerializer::default()
	}

	pub fn put_str(&mut self, key: &str, value: &str) {
		self.table.insert(key.to_string(), KvValue::Str(value.to_string()));
	}

	pub fn put_u8(&mut self, key: &str, value: u8) {
		self.table.insert(key.to_string(), KvValue::U8(value));
	}

	pub fn put_u16(&mut self, key: &str, value: u16) {
		self.table.insert(key.to_string(), KvValue::U16(value));
	}

	pub fn put_u32(&mut self, key: &str, value: u32) {
		self.table.insert(key.to_string(), KvValue::U32(value));
	}

	pub fn put_u64(&mut self, key: &str, value: u64) {
		self.table.insert(key.to_string(), KvValue::U64(value));
	}

	pub fn get(&self, key: &str) -> Option<&KvValue> {
		self.table.get(key)
	}

	pub fn remove(&mut self, key: &str) {
		self.table.remove(key);
	}

	pub fn iter(&self) -> impl Iterator<Item = (&String, &KvValue)> {
		self.table.iter()
	}

	pub fn to_blob(&self) -> Vec<u8> {
		let mut out = Vec::new();
		out.extend_from_slice(VERSION_TAG);
		for (key, value) in &self.table {
			let key_bytes = key.as_bytes();
			out.extend_from_slice(&(key_bytes.len() as u16).to_be_bytes());
			out.extend_from_slice(key_bytes);
			let value_bytes = value.encode();
			out.extend_from_slice(&(value_bytes.len() as u16).to_be_bytes());
			out.extend_from_slice(&value_bytes);
		}
		out
	}

	pub fn from_blob(blob: &[u8]) -> RepoResult<Self> {
		if blob.len() < 4 {
			return Err(RepoError::BlobStoreCorrupt { message: "KV00 blob shorter than version tag".into() });
		}
		if &blob[0..4] != VERSION_TAG {
			return Err(RepoError::UnsupportedVersion {
				found: String::from_utf8_lossy(&blob[0..4]).into_owned(),
			});
		}
		let mut table = BTreeMap::new();
		let mut index = 4usize;
		let len = blob.len();
		while index < len {
			if len - index < 2 {
				return Err(RepoError::BlobStoreCorrupt { message: "truncated KV00 key length".into() });
			}
			let key_len = u16::from_be_bytes(blob[index..index + 2].try_into().unwrap()) as usize;
			index += 2;
			if len - index < key_len {
				return Err(RepoError::BlobStoreCorrupt { message: "truncated KV00 key".into() });
			}
			let key = String::from_utf8(blob[index..index + key_len].to_vec())
				.map_err(|_| RepoError::BlobStoreCorrupt { message: "KV00 key is not utf-8".into() })?;
			index += key_len;

			if len - index < 2 {
				return Err(RepoError::BlobStoreCorrupt { message: "truncated KV00 value length".into() });
			}
			let val_len = u16::from_be_bytes(blob[index..index + 2].try_into().unwrap()) as usize;
			index += 2;
			if len - index < val_len {
				return Err(RepoError::BlobStoreCorrupt { message: "truncated KV00 value".into() });
			}
			let value = KvValue::decode(&blob[index..index + val_len])?;
			index += val_len;

			table.insert(key, value);
		}
		Ok(KvSerializer { table })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trip_all_value_types() {
		let mut kv = KvSerializer::new();
		kv.put_str("A", "1");
		kv.put_u8("D", 4);
		kv.put_u16("E", 0x1234);
		kv.put_u32("F", 0x1234_5678);
		kv.put_u64("G", 0x0123_4567_89AB_CDEF);

		let blob = kv.to_blob();
		assert_eq!(&blob[0..4], b"KV00");

		let back = KvSerializer::from_blob(&blob).unwrap();
		assert_eq!(back.get("A"), Some(&KvValue::Str("1".into())));
		assert_eq!(back.get("D"), Some(&KvValue::U8(4)));
		assert_eq!(back.get("E"), Some(&KvValue::U16(0x1234)));
		assert_eq!(back.get("F"), Some(&KvValue::U32(0x1234_5678)));
		assert_eq!(back.get("G"), Some(&KvValue::U64(0x0123_4567_89AB_CDEF)));
	}

	#[test]
	fn rejects_bad_version_tag() {
		let err = KvSerializer::from_blob(b"XX00").unwrap_err();
		assert!(matches!(err, RepoError::UnsupportedVersion { .. }));
	}

	#[test]
	fn rejects_truncated_blob() {
		let mut blob = b"KV00".to_vec();
		blob.extend_from_slice(&[0, 5]);
		blob.extend_from_slice(b"ab");
		assert!(KvSerializer::from_blob(&blob).is_err());
	}
}
