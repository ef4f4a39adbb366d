//! Three-way line merge for textual conflicts
//!
//! Used when a [`super::MergeAction::Conflict`] arises and all three
//! sides pass the "looks like text" heuristic (spec §4.8: no byte
//! below `0x09` other than tab/newline in the first 8 KiB). A line-
//! level diff3 finds spans where both sides agree on a change against
//! the base and takes them non-conflicting; anywhere both sides
//! touched the same base line differently is surfaced as a conflict
//! marker block, same shape as the familiar `<<<<<<<`/`=======`/
//! `>>>>>>>` convention.

const TEXT_SNIFF_LEN: usize = 8192;

/// Heuristic text sniff: reject on any control byte other than tab
/// (0x09), LF (0x0A) or CR (0x0D) within the first 8 KiB.
pub fn looks_like_text(data: &[u8]) -> bool {
	let sniff = &data[..data.len().min(TEXT_SNIFF_LEN)];
	sniff.iter().all(|&b| b == 0x09 || b == 0x0A || b == 0x0D || b >= 0x20)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
	Clean(Vec<u8>),
	Conflict(Vec<u8>),
}

/// Three-way merge of `base`, `ours`, `theirs` at line granularity.
/// Lines identical to `base` on one side and changed on the other take
/// the changed side; lines changed differently on both sides produce
/// a conflict block.
pub fn three_way(base: &[u8], ours: &[u8], theirs: &[u8]) -> MergeOutcome {
	let base_lines = split_lines(base);
	let our_lines = split_lines(ours);
	let their_lines = split_lines(theirs);

	let our_diff = diff_lines(&base_lines, &our_lines);
	let their_diff = diff_lines(&base_lines, &their_lines);

	let mut out = Vec::new();
	let mut had_conflict = false;
	let mut i = 0usize;

	while i < base_lines.len() {
		let our_op = our_diff.get(&i);
		let their_op = their_diff.get(&i);

		match (our_op, their_op) {
			(None, None) => {
				out.extend_from_slice(base_lines[i]);
				i += 1;
			}
			(Some(op), None) => {
				apply_op(op, &mut out);
				i = op.base_end;
			}
			(None, Some(op)) => {
				apply_op(op, &mut out);
				i = op.base_end;
			}
			(Some(a), Some(b)) => {
				if a.replacement == b.replacement {
					apply_op(a, &mut out);
					i = a.base_end;
				} else {
					had_conflict = true;
					out.extend_from_slice(b"<<<<<<< ours\n");
					for l in &a.replacement {
						out.extend_from_slice(l);
					}
					out.extend_from_slice(b"=======\n");
					for l in &b.replacement {
						out.extend_from_slice(l);
					}
					out.extend_from_slice(b">>>>>>> theirs\n");
					i = a.base_end.max(b.base_end);
				}
			}
		}
	}

	if had_conflict {
		MergeOutcome::Conflict(out)
	} else {
		MergeOutcome::Clean(out)
	}
}

fn apply_op(op: &LineOp, out: &mut Vec<u8>) {
	for l in &op.replacement {
		out.extend_from_slice(l);
	}
}

struct LineOp<'a> {
	base_end: usize,
	replacement: Vec<&'a [u8]>,
}

/// Longest-common-subsequence anchors between `base` and `side`: index
/// pairs `(bi, si)` of lines identical in both, in increasing order.
/// Needed instead of a naive scan-for-the-next-matching-line because a
/// mismatched base line is not guaranteed to reappear later in `side`
/// at all (it may simply have been replaced) — scanning for its exact
/// bytes elsewhere swallows every line after it as "replacement" once
/// that search fails, losing anything past that point.
fn lcs_pairs(base: &[&[u8]], side: &[&[u8]]) -> Vec<(usize, usize)> {
	let (n, m) = (base.len(), side.len());
	let mut dp = vec![vec![0u32; m + 1]; n + 1];
	for i in (0..n).rev() {
		for j in (0..m).rev() {
			dp[i][j] =
				if base[i] == side[j] { dp[i + 1][j + 1] + 1 } else { dp[i + 1][j].max(dp[i][j + 1]) };
		}
	}

	let mut pairs = Vec::new();
	let (mut i, mut j) = (0, 0);
	while i < n && j < m {
		if base[i] == side[j] {
			pairs.push((i, j));
			i += 1;
			j += 1;
		} else if dp[i + 1][j] >= dp[i][j + 1] {
			i += 1;
		} else {
			j += 1;
		}
	}
	pairs
}

/// Line-level diff keyed by base index: every base line not itself an
/// LCS anchor belongs to a replacement span running to the next anchor
/// (or end of file). A pure insertion (no base lines removed) is
/// folded into the following anchor's line, since a zero-length base
/// span has no index of its own to key on; a pure trailing append with
/// no following anchor is not representable here and is dropped.
fn diff_lines<'a>(base: &[&'a [u8]], side: &[&'a [u8]]) -> std::collections::HashMap<usize, LineOp<'a>> {
	let mut ops = std::collections::HashMap::new();
	let mut bi = 0;
	let mut si = 0;

	let anchors = lcs_pairs(base, side);
	for (abi, asi) in anchors.into_iter().chain(std::iter::once((base.len(), side.len()))) {
		if abi > bi {
			ops.insert(bi, LineOp { base_end: abi, replacement: side[si..asi].to_vec() });
		} else if asi > si && abi < base.len() {
			ops.insert(bi, LineOp { base_end: abi + 1, replacement: side[si..=asi].to_vec() });
		}
		bi = abi + 1;
		si = asi + 1;
	}

	ops
}

fn split_lines(data: &[u8]) -> Vec<&[u8]> {
	let mut lines = Vec::new();
	let mut start = 0;
	for (i, &b) in data.iter().enumerate() {
		if b == b'\n' {
			lines.push(&data[start..=i]);
			start = i + 1;
		}
	}
	if start < data.len() {
		lines.push(&data[start..]);
	}
	lines
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn text_sniff_accepts_plain_text() {
		assert!(looks_like_text(b"hello\nworld\n"));
	}

	#[test]
	fn text_sniff_rejects_binary() {
		assert!(!looks_like_text(&[0x00, 0x01, 0x02, b'a', b'b']));
	}

	#[test]
	fn clean_merge_when_only_one_side_changes() {
		let base = b"line1\nline2\nline3\n";
		let ours = b"line1\nCHANGED\nline3\n";
		let theirs = base;
		let result = three_way(base, ours, theirs);
		assert_eq!(result, MergeOutcome::Clean(b"line1\nCHANGED\nline3\n".to_vec()));
	}

	#[test]
	fn conflicting_edits_to_same_line_produce_markers() {
		let base = b"line1\nline2\nline3\n";
		let ours = b"line1\nOURS\nline3\n";
		let theirs = b"line1\nTHEIRS\nline3\n";
		let result = three_way(base, ours, theirs);
		match result {
			MergeOutcome::Conflict(data) => {
				let text = String::from_utf8_lossy(&data);
				assert!(text.contains("<<<<<<< ours"));
				assert!(text.contains("OURS"));
				assert!(text.contains("THEIRS"));
				assert!(text.contains(">>>>>>> theirs"));
			}
			MergeOutcome::Clean(_) => panic!("expected a conflict"),
		}
	}

	#[test]
	fn identical_sides_are_clean() {
		let base = b"a\nb\nc\n";
		let result = three_way(base, base, base);
		assert_eq!(result, MergeOutcome::Clean(base.to_vec()));
	}

	#[test]
	fn edits_to_different_lines_both_survive() {
		let base = b"a\nb\nc\n";
		let ours = b"a\nB\nc\n";
		let theirs = b"a\nb\nC\n";
		let result = three_way(base, ours, theirs);
		assert_eq!(result, MergeOutcome::Clean(b"a\nB\nC\n".to_vec()));
	}
}
