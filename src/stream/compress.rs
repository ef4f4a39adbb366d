use super::WriteStream;
use crate::error::{RepoError, RepoResult};
use crate::object::ObjectFlags;
use std::io::Read;

/// Compression algorithm selected per-object via [`ObjectFlags`].
///
/// Neither of the original two algorithm names this format was
/// designed around has a matching Rust crate, so each is mapped onto
/// the closest crate the example pack actually depends on: the fast
/// block-compression slot onto `lz4_flex`, the high-ratio slot onto
/// `xz2` (liblzma bindings). Object flags still only record "fast" vs
/// "max", keeping the on-disk contract the same even though the bytes
/// of the compressed stream are not interchangeable with the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionAlgo {
	Fast,
	Max,
}

impl CompressionAlgo {
	pub fn from_flags(flags: ObjectFlags) -> Option<Self> {
		if flags.contains(ObjectFlags::COMPRESSED_MAX) {
			Some(CompressionAlgo::Max)
		} else if flags.contains(ObjectFlags::COMPRESSED_FAST) {
			Some(CompressionAlgo::Fast)
		} else {
			None
		}
	}
}

/// Wraps a payload buffer with compress-on-write / decompress-on-read
/// semantics. Packfile records are small enough (bounded by the
/// chunker's 8 KiB max chunk) that whole-buffer codec calls are simpler
/// than a true streaming adapter and match how the teacher's own
/// stream types buffer small payloads in memory before framing them.
pub struct CompressStream;

impl CompressStream {
	pub fn compress(algo: CompressionAlgo, payload: &[u8]) -> RepoResult<Vec<u8>> {
		match algo {
			CompressionAlgo::Fast => Ok(lz4_flex::compress_prepend_size(payload)),
			CompressionAlgo::Max => {
				let mut encoder = xz2::read::XzEncoder::new(payload, 6);
				let mut out = Vec::new();
				encoder
					.read_to_end(&mut out)
					.map_err(|e| RepoError::BlobStoreCorrupt { message: format!("xz compress: {}", e) })?;
				Ok(out)
			}
		}
	}

	pub fn decompress(algo: CompressionAlgo, payload: &[u8]) -> RepoResult<Vec<u8>> {
		match algo {
			CompressionAlgo::Fast => lz4_flex::decompress_size_prepended(payload)
				.map_err(|e| RepoError::BlobStoreCorrupt { message: format!("lz4 decompress: {}", e) }),
			CompressionAlgo::Max => {
				let mut decoder = xz2::read::XzDecoder::new(payload);
				let mut out = Vec::new();
				decoder
					.read_to_end(&mut out)
					.map_err(|e| RepoError::BlobStoreCorrupt { message: format!("xz decompress: {}", e) })?;
				Ok(out)
			}
		}
	}
}

/// Compresses `payload` and writes the result to `out` as a single
/// framed write (no partial-write retry needed since the buffer is
/// already fully materialized).
pub fn write_compressed(
	algo: CompressionAlgo,
	payload: &[u8],
	out: &mut impl WriteStream,
) -> RepoResult<()> {
	let compressed = CompressStream::compress(algo, payload)?;
	out.write_all(&compressed)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fast_round_trip() {
		let data = b"the quick brown fox jumps over the lazy dog".repeat(50);
		let c = CompressStream::compress(CompressionAlgo::Fast, &data).unwrap();
		let d = CompressStream::decompress(CompressionAlgo::Fast, &c).unwrap();
		assert_eq!(d, data);
	}

	#[test]
	fn max_round_trip() {
		let data = b"the quick brown fox jumps over the lazy dog".repeat(50);
		let c = CompressStream::compress(CompressionAlgo::Max, &data).unwrap();
		let d = CompressStream::decompress(CompressionAlgo::Max, &c).unwrap();
		assert_eq!(d, data);
	}
}
