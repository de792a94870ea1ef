// Copyright 2023 Strixpyrr
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The segmented, single-owner byte container every other piece of this
//! crate builds on. A [`Buffer`] is a deque of [`Segment`]s: bytes are read
//! from the front and written to the back, claiming and releasing segments
//! from a [`SegmentPool`] as it grows and shrinks.

use std::collections::VecDeque;
use crate::byte_string::ByteString;
use crate::error::{Error, Result};
use crate::pattern::{LineTerminator, Pattern};
use crate::pool::{LocalPool, SegmentPool};
use crate::segment::{Segment, SEGMENT_SIZE};

/// Tunable knobs for a [`Buffer`]'s internal bookkeeping. See the crate's
/// design notes for the reasoning behind each default.
#[derive(Copy, Clone, Debug)]
pub struct BufferOptions {
	/// Bytes smaller than this are copied into a Buffer rather than shared
	/// as their own segment; below this size, the bookkeeping of another
	/// shared segment costs more than the copy.
	pub share_threshold: usize,
	/// Once the sum of unused capacity across partially-filled segments
	/// crosses this many bytes, the buffer compacts them.
	pub void_compaction_threshold: usize,
	/// The fraction of `count()` worth of empty segment capacity to retain
	/// for future writes rather than returning to the pool immediately.
	pub retention_ratio: f64,
}

impl Default for BufferOptions {
	fn default() -> Self {
		Self {
			share_threshold: 1024,
			void_compaction_threshold: 4096,
			retention_ratio: 1.0,
		}
	}
}

/// A segmented, growable byte container. The primary in-memory stream type
/// of this crate; [`Reader`](crate::reader::Reader) and
/// [`Writer`](crate::writer::Writer) are buffered facades built on top of
/// one.
///
/// A `Buffer` is a single-owner resource: it is not `Sync`, and mutating it
/// from more than one thread at a time is not supported.
pub struct Buffer<P: SegmentPool = LocalPool> {
	pool: P,
	segments: VecDeque<Segment>,
	count: usize,
	options: BufferOptions,
}

impl Default for Buffer<LocalPool> {
	fn default() -> Self { Self::new() }
}

impl Buffer<LocalPool> {
	/// Creates an empty buffer using the default thread-local segment pool.
	pub fn new() -> Self { Self::with_pool(LocalPool::default()) }
}

impl<P: SegmentPool> Buffer<P> {
	/// Creates an empty buffer drawing segments from `pool`.
	pub fn with_pool(pool: P) -> Self {
		Self { pool, segments: VecDeque::new(), count: 0, options: BufferOptions::default() }
	}

	/// Creates an empty buffer with custom tuning options.
	pub fn with_options(pool: P, options: BufferOptions) -> Self {
		Self { pool, segments: VecDeque::new(), count: 0, options }
	}

	/// The number of bytes currently buffered.
	pub fn count(&self) -> usize { self.count }

	/// The length of the tail segment, if it still has spare writable
	/// capacity (i.e. is still "hot" and likely to receive more writes
	/// before being flushed). Used by
	/// [`Writer::emit`](crate::writer::Writer::emit) to flush only complete
	/// segments downstream. Returns 0 if the buffer is empty or its tail
	/// segment happens to be exactly full.
	pub fn hot_tail_len(&self) -> usize {
		match self.segments.back() {
			Some(seg) if seg.lim() > 0 => seg.len(),
			_ => 0,
		}
	}

	/// `true` if no bytes are buffered.
	pub fn is_empty(&self) -> bool { self.count == 0 }

	/// Drops every segment, returning unshared ones to the pool.
	pub fn clear(&mut self) {
		for segment in self.segments.drain(..) {
			self.pool.recycle(segment);
		}
		self.count = 0;
	}

	fn tail_for_write(&mut self, want: usize) -> &mut Segment {
		let needs_fresh = match self.segments.back() {
			Some(seg) => seg.lim() == 0,
			None => true,
		};
		if needs_fresh {
			self.segments.push_back(self.pool.take());
		}
		let _ = want;
		self.segments.back_mut().expect("segment just pushed")
	}

	/// Appends all of `bytes`, claiming fresh segments as needed.
	pub fn write_from_slice(&mut self, mut bytes: &[u8]) {
		while !bytes.is_empty() {
			let tail = self.tail_for_write(bytes.len());
			let written = tail.push_slice(bytes);
			if written == 0 {
				// Tail segment is full (e.g. exactly at capacity); force a
				// fresh one next loop.
				self.segments.push_back(self.pool.take());
				continue;
			}
			self.count += written;
			bytes = &bytes[written..];
		}
		self.maybe_compact();
	}

	/// Appends a single byte.
	pub fn write_byte(&mut self, byte: u8) { self.write_from_slice(&[byte]); }

	/// Appends the bytes of `value`, sharing its segments directly when
	/// `value` is large enough and segment-backed (see
	/// [`BufferOptions::share_threshold`]); copies otherwise.
	pub fn write_byte_string(&mut self, value: &ByteString) {
		if value.len() >= self.options.share_threshold {
			if let Some(segments) = value.shared_segments() {
				for segment in segments {
					self.count += segment.len();
					self.segments.push_back(segment);
				}
				return;
			}
		}
		self.write_from_slice(value.as_contiguous_slice().as_deref().unwrap_or(&value.to_vec()));
	}

	/// Writes UTF-8-encoded `value` using the ASCII-run fast path: runs of
	/// 7-bit bytes are copied directly, falling back to one-`char`-at-a-time
	/// encoding only where needed (which, since `value` is already a valid
	/// `str`, is just copying each character's existing UTF-8 bytes).
	pub fn write_utf8(&mut self, value: &str) {
		let bytes = value.as_bytes();
		let mut start = 0;
		while start < bytes.len() {
			let run_end = bytes[start..]
				.iter()
				.position(|&b| b >= 0x80)
				.map_or(bytes.len(), |i| start + i);
			if run_end > start {
				self.write_from_slice(&bytes[start..run_end]);
				start = run_end;
				continue;
			}
			// Non-ASCII: find the end of this char's multi-byte sequence.
			let ch_len = utf8_char_len(bytes[start]);
			self.write_from_slice(&bytes[start..start + ch_len]);
			start += ch_len;
		}
	}

	/// Writes `value` as 7-bit ASCII, substituting `?` for any character
	/// `>= 0x80` rather than failing (mirrors [`ByteString::from_ascii_lossy`](crate::byte_string::ByteString::from_ascii_lossy)).
	pub fn write_ascii(&mut self, value: &str) {
		let bytes: Vec<u8> = value.bytes().map(|b| if b < 0x80 { b } else { b'?' }).collect();
		self.write_from_slice(&bytes);
	}

	/// Reads `byte_count` bytes as 7-bit ASCII, failing with
	/// [`Error::character_coding`]-classified error at the first byte `>=
	/// 0x80` and leaving the buffer untouched.
	pub fn read_ascii(&mut self, byte_count: usize) -> Result<String> {
		let bytes = self.peek_bytes(byte_count)?;
		if let Some(bad) = bytes.iter().position(|&b| b >= 0x80) {
			return Err(Error::encoding(AsciiError(bytes[bad])));
		}
		self.skip(bytes.len());
		Ok(bytes.iter().map(|&b| b as char).collect())
	}

	fn peek_bytes(&self, byte_count: usize) -> Result<Vec<u8>> {
		if byte_count > self.count {
			return Err(Error::eof());
		}
		let mut out = Vec::with_capacity(byte_count);
		let mut remaining = byte_count;
		for seg in self.segments.iter() {
			if remaining == 0 { break }
			let take = seg.len().min(remaining);
			out.extend_from_slice(&seg.data()[..take]);
			remaining -= take;
		}
		Ok(out)
	}

	/// Writes `value` as ISO-8859-1 (Latin-1): one byte per character, with
	/// no validation. Fails with [`Error::character_coding`]-classified
	/// error if any code unit is `>= 0x100` (Latin-1 cannot represent it),
	/// leaving the buffer unmodified.
	pub fn write_latin1(&mut self, value: &str) -> Result<()> {
		let mut bytes = Vec::with_capacity(value.len());
		for ch in value.chars() {
			let cp = ch as u32;
			if cp >= 0x100 {
				return Err(Error::encoding(Latin1Error(cp)));
			}
			bytes.push(cp as u8);
		}
		self.write_from_slice(&bytes);
		Ok(())
	}

	/// Reads `byte_count` bytes as ISO-8859-1 (Latin-1): one byte maps
	/// directly to one `char`, no validation possible (every byte value is a
	/// valid Latin-1 code point).
	pub fn read_latin1(&mut self, byte_count: usize) -> Result<String> {
		let mut bytes = vec![0u8; byte_count.min(self.count)];
		self.read_into_slice_exact(&mut bytes)?;
		Ok(bytes.iter().map(|&b| b as char).collect())
	}

	/// Removes up to `byte_count` bytes from the front, returning how many
	/// were actually removed.
	pub fn skip(&mut self, mut byte_count: usize) -> usize {
		let mut skipped = 0;
		while byte_count > 0 {
			let Some(front) = self.segments.front_mut() else { break };
			let n = front.len().min(byte_count);
			front.consume(n);
			self.count -= n;
			skipped += n;
			byte_count -= n;
			if front.is_empty() {
				let seg = self.segments.pop_front().expect("front just checked");
				self.pool.recycle(seg);
			}
		}
		skipped
	}

	/// Drops every buffered byte.
	pub fn skip_all(&mut self) -> usize { self.skip(self.count) }

	/// Reads as many bytes as fit into `dst`, returning how many were read.
	pub fn read_into_slice(&mut self, mut dst: &mut [u8]) -> usize {
		let mut total = 0;
		while !dst.is_empty() {
			let Some(front) = self.segments.front_mut() else { break };
			let n = front.pop_into_slice(dst);
			if n == 0 { break }
			self.count -= n;
			total += n;
			dst = &mut dst[n..];
			if front.is_empty() {
				let seg = self.segments.pop_front().expect("front just checked");
				self.pool.recycle(seg);
			}
		}
		total
	}

	/// Reads exactly `dst.len()` bytes, or fails with [`Error::eof`] leaving
	/// the buffer untouched.
	pub fn read_into_slice_exact(&mut self, dst: &mut [u8]) -> Result<()> {
		if dst.len() > self.count {
			return Err(Error::eof());
		}
		let n = self.read_into_slice(dst);
		debug_assert_eq!(n, dst.len());
		Ok(())
	}

	/// Reads up to `byte_count` bytes into a dense [`ByteString`].
	pub fn read_byte_string(&mut self, byte_count: usize) -> Result<ByteString> {
		let n = byte_count.min(self.count);
		let mut buf = vec![0u8; n];
		self.read_into_slice_exact(&mut buf)?;
		Ok(ByteString::from(buf))
	}

	/// Reads at most `byte_count` bytes, decoding as UTF-8 with W3C
	/// replacement (`U+FFFD`) for malformed sequences, appending the result
	/// to `out` and returning the number of *input bytes* consumed.
	pub fn read_utf8(&mut self, out: &mut String, byte_count: usize) -> usize {
		let n = byte_count.min(self.count);
		let mut remaining = n;
		let mut consumed = 0;
		while remaining > 0 {
			let Some(front) = self.segments.front_mut() else { break };
			let take = front.len().min(remaining);
			let bytes = &front.data()[..take];
			let (decoded, used) = decode_utf8_lossy_prefix(bytes);
			out.push_str(&decoded);
			front.consume(used);
			self.count -= used;
			consumed += used;
			remaining -= used;
			if front.is_empty() {
				let seg = self.segments.pop_front().expect("front just checked");
				self.pool.recycle(seg);
			}
			if used == 0 { break } // malformed tail needing more bytes than available
		}
		consumed
	}

	/// Reads a line terminated by `"\n"` or `"\r\n"`, not including the
	/// terminator, returning `None` if the buffer was exhausted without one
	/// (any trailing partial line is left in the buffer untouched).
	pub fn read_utf8_line(&mut self) -> Result<Option<String>> {
		match self.index_of_pattern(LineTerminator)? {
			Some((at, term_len)) => {
				let mut line = String::new();
				self.read_utf8(&mut line, at);
				self.skip(term_len);
				Ok(Some(line))
			}
			None => Ok(None),
		}
	}

	/// Finds the first occurrence of `byte` at or after `from`, without
	/// materializing a flat copy of the buffer.
	pub fn index_of_byte(&self, byte: u8, from: usize) -> Option<usize> {
		self.index_of_pattern_from(byte, from).ok().flatten()
	}

	pub(crate) fn index_of_pattern(&self, pattern: impl Pattern) -> Result<Option<(usize, usize)>> {
		Ok(pattern.find_in(self.segments.iter().map(Segment::data)))
	}

	/// Like [`Self::index_of_pattern`], but skips the first `from` bytes
	/// before searching; the returned offset (if any) is relative to the
	/// start of the buffer, not to `from`.
	pub(crate) fn index_of_pattern_from(&self, pattern: impl Pattern, from: usize) -> Result<Option<usize>> {
		if from >= self.count {
			return Ok(None);
		}
		let mut skip = from;
		let segments = self.segments.iter().map(Segment::data).filter_map(move |data| {
			if skip >= data.len() {
				skip -= data.len();
				None
			} else {
				let sliced = &data[skip..];
				skip = 0;
				Some(sliced)
			}
		});
		Ok(pattern.find_in(segments).map(|(at, _)| from + at))
	}

	/// Returns a [`ByteString`] snapshot of the buffer's current contents,
	/// sharing segment storage with this buffer (copy-on-write: later
	/// writes here fork rather than mutate the snapshot, and vice versa).
	/// The buffer's own contents are unchanged.
	pub fn snapshot(&self) -> ByteString {
		ByteString::from_shared_segments(self.segments.iter().cloned().collect(), self.count)
	}

	/// Produces an independent `Buffer` sharing this buffer's storage
	/// copy-on-write, without copying any bytes up front.
	pub fn clone_shared(&self) -> Buffer<P> where P: Clone {
		Buffer {
			pool: self.pool.clone(),
			segments: self.segments.iter().map(Segment::share_all).collect(),
			count: self.count,
			options: self.options,
		}
	}

	/// Moves up to `byte_count` bytes from the front of `self` to the tail
	/// of `dst`, sharing whole segments where possible instead of copying.
	/// Returns the number of bytes moved.
	pub fn read_at_most_to<Q: SegmentPool>(&mut self, dst: &mut Buffer<Q>, byte_count: usize) -> usize {
		let mut remaining = byte_count.min(self.count);
		let mut moved = 0;
		while remaining > 0 {
			let Some(mut front) = self.segments.pop_front() else { break };
			let front_len = front.len();

			if front_len <= remaining {
				// Whole segment: splice it onto dst's tail directly.
				self.count -= front_len;
				dst.count += front_len;
				dst.segments.push_back(front);
				moved += front_len;
				remaining -= front_len;
			} else {
				// Partial: share a prefix, keep the remainder at our front.
				let shared = front.share(remaining);
				front.consume(remaining);
				self.count -= remaining;
				dst.count += remaining;
				dst.segments.push_back(shared);
				moved += remaining;
				self.segments.push_front(front);
				remaining = 0;
			}
		}
		dst.maybe_compact();
		moved
	}

	/// Opportunistically merges small adjacent unshared segments and, if
	/// `force` is set, folds shared segments too (copying them). Normally
	/// only triggered once accumulated void space crosses
	/// [`BufferOptions::void_compaction_threshold`].
	pub fn compact(&mut self, force: bool) {
		let mut merged = VecDeque::with_capacity(self.segments.len());
		let mut iter = self.segments.drain(..);
		let mut base = iter.next();
		for mut seg in iter {
			match base.take() {
				Some(mut b) if (force || !b.is_shared()) && b.len() + seg.len() <= SEGMENT_SIZE / 2 => {
					b.shift();
					seg.move_into(&mut b, seg.len());
					base = Some(b);
					if !seg.is_empty() {
						merged.push_back(std::mem::replace(&mut base, Some(seg)).expect("base set above"));
					}
				}
				Some(b) => {
					merged.push_back(b);
					base = Some(seg);
				}
				None => base = Some(seg),
			}
		}
		if let Some(b) = base {
			merged.push_back(b);
		}
		self.segments = merged;
	}

	fn maybe_compact(&mut self) {
		let capacity: usize = self.segments.iter().map(|s| s.len() + s.lim()).sum();
		let void = capacity.saturating_sub(self.count);
		if void >= self.options.void_compaction_threshold {
			self.compact(false);
		}
	}

	/// Applies `f` to each segment's readable bytes in place, front to back,
	/// without copying. This is the low-level escape hatch for transforms
	/// that would otherwise require materializing the whole buffer (e.g. an
	/// XOR/Caesar-style cipher layer). The closure cannot outlive this call,
	/// so the "cursor" it operates through is released unconditionally when
	/// `with_cursor_mut` returns, even if `f` panics.
	pub fn with_cursor_mut(&mut self, mut f: impl FnMut(&mut [u8])) {
		for segment in self.segments.iter_mut() {
			f(segment.data_mut());
		}
	}

	/// Read-only counterpart to [`Self::with_cursor_mut`].
	pub fn with_cursor(&self, mut f: impl FnMut(&[u8])) {
		for segment in self.segments.iter() {
			f(segment.data());
		}
	}

	/// Computes a digest of the buffer's current contents without
	/// consuming them.
	#[cfg(feature = "hash")]
	pub fn hash(&self, mut digest: impl digest::Digest) -> ByteString {
		for segment in self.segments.iter() {
			digest::Digest::update(&mut digest, segment.data());
		}
		ByteString::from(digest.finalize().to_vec())
	}
}

#[derive(Debug, thiserror::Error)]
#[error("code point U+{0:04X} is not representable in Latin-1")]
struct Latin1Error(u32);

#[derive(Debug, thiserror::Error)]
#[error("byte 0x{0:02X} is not 7-bit ASCII")]
struct AsciiError(u8);

fn utf8_char_len(lead: u8) -> usize {
	match lead {
		0x00..=0x7F => 1,
		0xC2..=0xDF => 2,
		0xE0..=0xEF => 3,
		0xF0..=0xF4 => 4,
		_ => 1,
	}
}

/// Decodes as much of `bytes` as forms complete UTF-8 (substituting
/// `U+FFFD` for malformed sequences per the Unicode "maximal subpart"
/// recommendation, advancing exactly one byte per malformed sequence),
/// returning the decoded text and the number of input bytes consumed. A
/// trailing sequence that looks like the start of a valid, but not yet
/// complete, multi-byte character is left unconsumed so a later call with
/// more bytes available can decode it whole.
pub(crate) fn decode_utf8_lossy_prefix(bytes: &[u8]) -> (String, usize) {
	if let Ok(valid) = simdutf8::basic::from_utf8(bytes) {
		return (valid.to_owned(), bytes.len());
	}

	let mut out = String::new();
	let mut i = 0;
	while i < bytes.len() {
		match decode_one(&bytes[i..]) {
			DecodeStep::Complete(ch, len) => {
				out.push(ch);
				i += len;
			}
			DecodeStep::Incomplete => {
				// Might become valid with more bytes; stop here.
				break;
			}
			DecodeStep::Invalid(len) => {
				out.push('\u{FFFD}');
				i += len;
			}
		}
	}
	(out, i)
}

enum DecodeStep {
	Complete(char, usize),
	Incomplete,
	Invalid(usize),
}

fn cont_byte(b: Option<&u8>) -> Option<u8> {
	let &b = b?;
	(0x80..=0xBF).contains(&b).then_some(b & 0x3F)
}

fn decode_one(bytes: &[u8]) -> DecodeStep {
	let lead = bytes[0];
	match lead {
		0x00..=0x7F => DecodeStep::Complete(lead as char, 1),
		0xC2..=0xDF => {
			let Some(c1) = cont_byte(bytes.get(1)) else {
				return if bytes.len() < 2 { DecodeStep::Incomplete } else { DecodeStep::Invalid(1) };
			};
			let cp = ((lead as u32 & 0x1F) << 6) | c1 as u32;
			char::from_u32(cp).map_or(DecodeStep::Invalid(2), |c| DecodeStep::Complete(c, 2))
		}
		0xE0..=0xEF => {
			let Some(c1) = cont_byte(bytes.get(1)) else {
				return if bytes.len() < 2 { DecodeStep::Incomplete } else { DecodeStep::Invalid(1) };
			};
			// Overlong and surrogate exclusion.
			let valid_second = match lead {
				0xE0 => (0xA0..=0xBF).contains(&(c1 | 0x80)) || (0x20..=0x3F).contains(&c1),
				0xED => c1 < 0x20,
				_ => true,
			};
			if !valid_second { return DecodeStep::Invalid(1) }
			let Some(c2) = cont_byte(bytes.get(2)) else {
				return if bytes.len() < 3 { DecodeStep::Incomplete } else { DecodeStep::Invalid(2) };
			};
			let cp = ((lead as u32 & 0x0F) << 12) | ((c1 as u32) << 6) | c2 as u32;
			char::from_u32(cp).map_or(DecodeStep::Invalid(3), |c| DecodeStep::Complete(c, 3))
		}
		0xF0..=0xF4 => {
			let Some(c1) = cont_byte(bytes.get(1)) else {
				return if bytes.len() < 2 { DecodeStep::Incomplete } else { DecodeStep::Invalid(1) };
			};
			let valid_second = match lead {
				0xF0 => (0x30..=0x3F).contains(&c1) || c1 >= 0x10 && c1 < 0x90,
				0xF4 => c1 < 0x10,
				_ => true,
			};
			if !valid_second { return DecodeStep::Invalid(1) }
			let Some(c2) = cont_byte(bytes.get(2)) else {
				return if bytes.len() < 3 { DecodeStep::Incomplete } else { DecodeStep::Invalid(2) };
			};
			let Some(c3) = cont_byte(bytes.get(3)) else {
				return if bytes.len() < 4 { DecodeStep::Incomplete } else { DecodeStep::Invalid(3) };
			};
			let cp = ((lead as u32 & 0x07) << 18) | ((c1 as u32) << 12) | ((c2 as u32) << 6) | c3 as u32;
			char::from_u32(cp).map_or(DecodeStep::Invalid(4), |c| DecodeStep::Complete(c, 4))
		}
		_ => DecodeStep::Invalid(1),
	}
}

macro_rules! gen_int_rw {
	($read_be:ident $read_le:ident $write_be:ident $write_le:ident -> $ty:ident) => {
		impl<P: SegmentPool> Buffer<P> {
			#[doc = concat!(" Reads one big-endian [`", stringify!($ty), "`].")]
			pub fn $read_be(&mut self) -> Result<$ty> {
				const N: usize = std::mem::size_of::<$ty>();
				let mut buf = [0u8; N];
				self.read_into_slice_exact(&mut buf)?;
				Ok($ty::from_be_bytes(buf))
			}

			#[doc = concat!(" Reads one little-endian [`", stringify!($ty), "`].")]
			pub fn $read_le(&mut self) -> Result<$ty> {
				const N: usize = std::mem::size_of::<$ty>();
				let mut buf = [0u8; N];
				self.read_into_slice_exact(&mut buf)?;
				Ok($ty::from_le_bytes(buf))
			}

			#[doc = concat!(" Writes one big-endian [`", stringify!($ty), "`].")]
			pub fn $write_be(&mut self, value: $ty) {
				self.write_from_slice(&value.to_be_bytes());
			}

			#[doc = concat!(" Writes one little-endian [`", stringify!($ty), "`].")]
			pub fn $write_le(&mut self, value: $ty) {
				self.write_from_slice(&value.to_le_bytes());
			}
		}
	};
}

gen_int_rw!(read_u16 read_u16_le write_u16 write_u16_le -> u16);
gen_int_rw!(read_i16 read_i16_le write_i16 write_i16_le -> i16);
gen_int_rw!(read_u32 read_u32_le write_u32 write_u32_le -> u32);
gen_int_rw!(read_i32 read_i32_le write_i32 write_i32_le -> i32);
gen_int_rw!(read_u64 read_u64_le write_u64 write_u64_le -> u64);
gen_int_rw!(read_i64 read_i64_le write_i64 write_i64_le -> i64);

impl<P: SegmentPool> Buffer<P> {
	/// Reads one byte.
	pub fn read_u8(&mut self) -> Result<u8> {
		let mut buf = [0u8; 1];
		self.read_into_slice_exact(&mut buf)?;
		Ok(buf[0])
	}

	/// Reads one signed byte.
	pub fn read_i8(&mut self) -> Result<i8> { self.read_u8().map(|b| b as i8) }

	/// Writes one byte.
	pub fn write_u8(&mut self, value: u8) { self.write_byte(value); }

	/// Writes one signed byte.
	pub fn write_i8(&mut self, value: i8) { self.write_byte(value as u8); }

	/// Reads an ASCII decimal integer (optional leading `-`, then one or
	/// more digits), failing with [`Error::numeric_format`] on a malformed
	/// token or on overflow.
	pub fn read_decimal_long(&mut self) -> Result<i64> {
		let text = self.take_numeric_token(|b| b.is_ascii_digit());
		text.parse().map_err(|_| Error::numeric_format(format!("not a decimal integer: {text:?}")))
	}

	/// Reads an ASCII hexadecimal unsigned integer (`[0-9a-fA-F]+`).
	pub fn read_hex_long(&mut self) -> Result<u64> {
		let text = self.take_numeric_token(|b| b.is_ascii_hexdigit());
		u64::from_str_radix(&text, 16).map_err(|_| Error::numeric_format(format!("not a hex integer: {text:?}")))
	}

	fn take_numeric_token(&mut self, is_digit: impl Fn(u8) -> bool) -> String {
		let mut text = String::new();
		let mut first = true;
		loop {
			let Some(front) = self.segments.front() else { break };
			let data = front.data();
			let mut end = 0;
			while end < data.len() {
				let b = data[end];
				if (first && end == 0 && b == b'-') || is_digit(b) {
					end += 1;
				} else {
					break;
				}
			}
			first = false;
			if end == 0 { break }
			text.push_str(std::str::from_utf8(&data[..end]).unwrap_or_default());
			self.skip(end);
			if end < data.len() { break }
		}
		text
	}
}

impl From<&[u8]> for Buffer<LocalPool> {
	fn from(value: &[u8]) -> Self {
		let mut buf = Self::new();
		buf.write_from_slice(value);
		buf
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn write_then_read_round_trips() {
		let mut buf = Buffer::new();
		buf.write_from_slice(b"abcdef");
		let mut out = String::new();
		buf.read_utf8(&mut out, 6);
		assert_eq!(out, "abcdef");
		assert_eq!(buf.count(), 0);
	}

	#[test]
	fn byte_size_matches_segment_sum() {
		let mut buf = Buffer::new();
		for _ in 0..8 {
			buf.write_from_slice(&[7u8; 2500]);
		}
		let sum: usize = buf.segments.iter().map(Segment::len).sum();
		assert_eq!(sum, buf.count());
		assert_eq!(buf.count(), 20_000);
	}

	#[test]
	fn snapshot_is_independent_of_later_writes() {
		let mut buf = Buffer::new();
		buf.write_from_slice(b"hello");
		let snap = buf.snapshot();
		buf.write_from_slice(b" world");
		assert_eq!(snap.len(), 5);
		assert_eq!(snap.to_vec(), b"hello");
	}

	#[test]
	fn splice_moves_whole_and_partial_segments() {
		let mut src = Buffer::new();
		src.write_from_slice(&[1u8; SEGMENT_SIZE + 10]);
		let mut dst = Buffer::new();
		let moved = src.read_at_most_to(&mut dst, SEGMENT_SIZE + 5);
		assert_eq!(moved, SEGMENT_SIZE + 5);
		assert_eq!(src.count(), 5);
		assert_eq!(dst.count(), SEGMENT_SIZE + 5);
	}

	#[test]
	fn invalid_utf8_start_byte_yields_replacement_char() {
		let mut buf = Buffer::new();
		buf.write_from_slice(&[0xC0]);
		let mut out = String::new();
		let consumed = buf.read_utf8(&mut out, 1);
		assert_eq!(consumed, 1);
		assert_eq!(out, "\u{FFFD}");
	}

	#[test]
	fn surrogate_pair_emoji_round_trips() {
		let mut buf = Buffer::new();
		buf.write_utf8("\u{1F369}");
		let mut out = String::new();
		buf.read_utf8(&mut out, 4);
		assert_eq!(out, "\u{1F369}");
	}

	#[test]
	fn latin1_round_trips_high_bytes() {
		let mut buf = Buffer::new();
		buf.write_latin1("caf\u{e9}").unwrap();
		assert_eq!(buf.read_latin1(4).unwrap(), "caf\u{e9}");
	}

	#[test]
	fn latin1_rejects_code_points_above_0xff() {
		let mut buf = Buffer::new();
		assert!(buf.write_latin1("\u{1F369}").is_err());
		assert!(buf.is_empty(), "a failed write must not leave partial bytes behind");
	}

	#[test]
	fn ascii_write_substitutes_non_ascii() {
		let mut buf = Buffer::new();
		buf.write_ascii("caf\u{e9}");
		assert_eq!(buf.read_ascii(4).unwrap(), "caf?");
	}

	#[test]
	fn ascii_read_rejects_high_bytes_without_consuming() {
		let mut buf = Buffer::new();
		buf.write_from_slice(&[0x41, 0xFF]);
		assert!(buf.read_ascii(2).is_err());
		assert_eq!(buf.count(), 2, "a rejected read must not consume any bytes");
	}

	#[test]
	fn index_of_byte_skips_earlier_matches_before_from() {
		let mut buf = Buffer::new();
		buf.write_from_slice(b"ab a ab");
		assert_eq!(buf.index_of_byte(b'a', 0), Some(0));
		assert_eq!(buf.index_of_byte(b'a', 2), Some(3));
		assert_eq!(buf.index_of_byte(b'a', 4), Some(5));
		assert_eq!(buf.index_of_byte(b'a', 6), None);
	}

	#[test]
	fn decimal_and_hex_tokens_parse() {
		let mut buf = Buffer::new();
		buf.write_from_slice(b"-4200 ");
		assert_eq!(buf.read_decimal_long().unwrap(), -4200);

		let mut buf = Buffer::new();
		buf.write_from_slice(b"1a2B ");
		assert_eq!(buf.read_hex_long().unwrap(), 0x1a2b);
	}
}
