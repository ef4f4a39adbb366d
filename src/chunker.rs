//! Content-defined chunking via a Rabin-Karp rolling hash
//!
//! Boundaries are placed wherever the hash of the trailing `window`
//! bytes matches a target bit pattern, which makes chunk boundaries
//! stable under insertions/deletions elsewhere in the file (the
//! property that makes large-file storage deduplicate well across
//! versions). This is a from-scratch implementation rather than a call
//! into the `rollsum` crate: `rollsum::Bup` finds boundaries under a
//! different rolling hash than this module's bit-for-bit contract, so
//! reusing it would change which boundaries come out for the same
//! input (see DESIGN.md).

/// One chunk boundary result: `[offset, offset + length)` within the
/// logical byte stream being chunked. The caller hashes the payload
/// slice itself — this module only finds the cut points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
	pub offset: u64,
	pub length: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
	pub window: usize,
	pub base: u64,
	pub target: usize,
	pub min: usize,
	pub max: usize,
}

impl Default for ChunkerConfig {
	fn default() -> Self {
		ChunkerConfig { window: 32, base: 31, target: 4096, min: 2048, max: 8192 }
	}
}

/// Rolling Rabin-Karp chunker. Feed bytes via [`push`](Self::push) in
/// any size buffers; a chunk is never split across two calls into
/// `push` — only emitted once its full extent (and boundary, or a
/// forced cut at `max`) has been seen.
pub struct Chunker {
	config: ChunkerConfig,
	target: u64,
	/// `base^(window - 1)`, used to remove the outgoing byte's
	/// contribution when the window slides forward.
	base_pow: u64,
	ring: Vec<u8>,
	ring_pos: usize,
	ring_filled: usize,
	hash: u64,
	/// Bytes since the last emitted boundary.
	current_len: u32,
	/// Absolute offset (since construction, or since the last `reset`)
	/// of the start of the chunk currently being accumulated.
	chunk_start: u64,
	absolute_pos: u64,
}

impl Chunker {
	pub fn new(config: ChunkerConfig) -> Self {
		let mut base_pow = 1u64;
		for _ in 0..config.window.saturating_sub(1) {
			base_pow = base_pow.wrapping_mul(config.base);
		}
		let target = config.target as u64;
		Chunker {
			ring: vec![0u8; config.window],
			ring_pos: 0,
			ring_filled: 0,
			hash: 0,
			current_len: 0,
			chunk_start: 0,
			absolute_pos: 0,
			base_pow,
			target,
			config,
		}
	}

	pub fn with_defaults() -> Self {
		Self::new(ChunkerConfig::default())
	}

	fn roll(&mut self, byte: u8) -> bool {
		if self.ring_filled == self.config.window {
			let outgoing = self.ring[self.ring_pos];
			self.hash = self.hash.wrapping_sub((outgoing as u64).wrapping_mul(self.base_pow));
		} else {
			self.ring_filled += 1;
		}
		self.hash = self.hash.wrapping_mul(self.config.base).wrapping_add(byte as u64);
		self.ring[self.ring_pos] = byte;
		self.ring_pos = (self.ring_pos + 1) % self.config.window;

		self.ring_filled == self.config.window && self.hash % self.target == 1
	}

	/// Feed the next slice of the logical stream. Returns every chunk
	/// boundary that falls within (or is forced by `max` inside) this
	/// call; a boundary's bytes always belong to a single `push` call
	/// relative to where `chunk_start` began, but a chunk may have
	/// begun in an earlier call.
	pub fn push(&mut self, buf: &[u8]) -> Vec<ChunkSpan> {
		let mut spans = Vec::new();
		for &byte in buf {
			let at_boundary = self.roll(byte);
			self.current_len += 1;
			self.absolute_pos += 1;

			let forced = self.current_len as usize >= self.config.max;
			let natural = at_boundary && self.current_len as usize >= self.config.min;

			if natural || forced {
				spans.push(ChunkSpan { offset: self.chunk_start, length: self.current_len });
				self.chunk_start = self.absolute_pos;
				self.current_len = 0;
				self.ring_filled = 0;
				self.hash = 0;
			}
		}
		spans
	}

	/// Flush any partial chunk at end-of-input. Returns `None` if
	/// nothing was pending (the input ended exactly on a boundary, or
	/// no bytes were ever pushed).
	pub fn finish(&mut self) -> Option<ChunkSpan> {
		if self.current_len == 0 {
			return None;
		}
		let span = ChunkSpan { offset: self.chunk_start, length: self.current_len };
		self.chunk_start = self.absolute_pos;
		self.current_len = 0;
		self.ring_filled = 0;
		self.hash = 0;
		Some(span)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn chunk_all(data: &[u8], config: ChunkerConfig) -> Vec<ChunkSpan> {
		let mut c = Chunker::new(config);
		let mut spans = c.push(data);
		if let Some(last) = c.finish() {
			spans.push(last);
		}
		spans
	}

	#[test]
	fn spans_cover_input_contiguously() {
		let data: Vec<u8> = (0..50_000u32).map(|i| (i % 256) as u8).collect();
		let spans = chunk_all(&data, ChunkerConfig::default());
		assert!(!spans.is_empty());
		let mut expect = 0u64;
		let mut total = 0u64;
		for s in &spans {
			assert_eq!(s.offset, expect);
			assert!(s.length as usize >= 1);
			expect += s.length as u64;
			total += s.length as u64;
		}
		assert_eq!(total, data.len() as u64);
	}

	#[test]
	fn respects_min_and_max() {
		let data: Vec<u8> = (0..200_000u32).map(|i| ((i * 7) % 256) as u8).collect();
		let config = ChunkerConfig::default();
		let spans = chunk_all(&data, config);
		for s in &spans[..spans.len() - 1] {
			assert!(s.length as usize >= config.min || s.length as usize == config.max);
			assert!(s.length as usize <= config.max);
		}
	}

	#[test]
	fn identical_prefix_yields_identical_leading_spans() {
		let mut a: Vec<u8> = (0..30_000u32).map(|i| ((i * 13) % 251) as u8).collect();
		let mut b = a.clone();
		b.extend_from_slice(b"extra tail bytes that differ from a entirely");
		a.extend_from_slice(b"unrelated tail for a, different length");

		let spans_a = chunk_all(&a, ChunkerConfig::default());
		let spans_b = chunk_all(&b, ChunkerConfig::default());

		let mut common = 0;
		for (x, y) in spans_a.iter().zip(spans_b.iter()) {
			if x.offset == y.offset && x.length == y.length {
				common += 1;
			} else {
				break;
			}
		}
		assert!(common > 0, "expected shared prefix content to produce shared leading chunk spans");
	}

	#[test]
	fn empty_input_has_no_spans() {
		let mut c = Chunker::with_defaults();
		assert!(c.push(&[]).is_empty());
		assert!(c.finish().is_none());
	}

	#[test]
	fn split_across_multiple_push_calls_matches_single_call() {
		let data: Vec<u8> = (0..20_000u32).map(|i| ((i * 3) % 256) as u8).collect();
		let whole = chunk_all(&data, ChunkerConfig::default());

		let mut c = Chunker::with_defaults();
		let mut piecewise = Vec::new();
		for chunk in data.chunks(777) {
			piecewise.extend(c.push(chunk));
		}
		if let Some(last) = c.finish() {
			piecewise.push(last);
		}
		assert_eq!(whole, piecewise);
	}
}
