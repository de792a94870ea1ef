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

//! Immutable byte strings. A [`ByteString`] is either `Dense` (one owned
//! `Vec<u8>`) or `Segmented` (a directory of shared [`Segment`]s, typically
//! produced by [`Buffer::snapshot`](crate::buffer::Buffer::snapshot)):
//! cheap to clone either way, and cheap to carve into substrings without
//! copying when segment-backed.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Range};
use std::rc::Rc;

use base64::Engine;

use crate::buffer::Buffer;
use crate::error::{Error, OffsetUtf8Error};
use crate::segment::Segment;

#[derive(Clone)]
enum Repr {
	Dense(Rc<Vec<u8>>),
	Segmented { segments: Rc<[Segment]>, offsets: Rc<[usize]>, len: usize },
}

/// An immutable, cheaply-cloneable byte string.
#[derive(Clone)]
pub struct ByteString {
	repr: Repr,
	is_ascii: Cell<Option<bool>>,
	/// Lazily-decoded, memoized UTF-8 view (mirrors the teacher's
	/// `ByteStr::utf8_cache`): the first successful [`Self::utf8_cached`]
	/// call pays the decode cost once, later clones of the `Rc<str>` are
	/// free.
	utf8_cache: RefCell<Option<Rc<str>>>,
}

impl ByteString {
	/// The number of bytes.
	pub fn len(&self) -> usize {
		match &self.repr {
			Repr::Dense(v) => v.len(),
			Repr::Segmented { len, .. } => *len,
		}
	}

	/// `true` if this is the empty byte string.
	pub fn is_empty(&self) -> bool { self.len() == 0 }

	/// Builds a segment-backed `ByteString` sharing storage with `segments`
	/// (copy-on-write, as with any other [`Segment`] share).
	pub fn from_shared_segments(segments: impl IntoIterator<Item = Segment>, len: usize) -> Self {
		let segments: Vec<Segment> = segments.into_iter().collect();
		let mut offsets = Vec::with_capacity(segments.len());
		let mut acc = 0;
		for seg in &segments {
			offsets.push(acc);
			acc += seg.len();
		}
		Self {
			repr: Repr::Segmented { segments: segments.into(), offsets: offsets.into(), len },
			is_ascii: Cell::new(None),
			utf8_cache: RefCell::new(None),
		}
	}

	/// Returns this byte string's segments, sharing storage, if it is
	/// segment-backed. `Dense` byte strings return `None`.
	pub fn shared_segments(&self) -> Option<Vec<Segment>> {
		match &self.repr {
			Repr::Segmented { segments, .. } => Some(segments.iter().map(Segment::share_all).collect()),
			Repr::Dense(_) => None,
		}
	}

	/// Returns a contiguous view of the bytes, if one is available without
	/// copying (a `Dense` string, or a `Segmented` one backed by exactly one
	/// segment).
	pub fn as_contiguous_slice(&self) -> Option<&[u8]> {
		match &self.repr {
			Repr::Dense(v) => Some(v.as_slice()),
			Repr::Segmented { segments, .. } if segments.len() == 1 => Some(segments[0].data()),
			Repr::Segmented { .. } => None,
		}
	}

	/// Copies the full contents into an owned `Vec<u8>`.
	pub fn to_vec(&self) -> Vec<u8> {
		match &self.repr {
			Repr::Dense(v) => v.as_ref().clone(),
			Repr::Segmented { segments, .. } => {
				let mut out = Vec::with_capacity(self.len());
				for seg in segments.iter() {
					out.extend_from_slice(seg.data());
				}
				out
			}
		}
	}

	/// The byte at `index`.
	///
	/// # Panics
	/// Panics if `index >= self.len()`.
	pub fn byte_at(&self, index: usize) -> u8 {
		assert!(index < self.len(), "byte index {index} out of bounds (len {})", self.len());
		match &self.repr {
			Repr::Dense(v) => v[index],
			Repr::Segmented { segments, offsets, .. } => {
				let seg_idx = directory_lookup(offsets, index);
				let local = index - offsets[seg_idx];
				segments[seg_idx].data()[local]
			}
		}
	}

	/// Returns the byte string covering `range`, sharing storage for
	/// segment-backed strings rather than copying.
	///
	/// # Panics
	/// Panics if `range` is out of bounds.
	pub fn substr(&self, range: Range<usize>) -> ByteString {
		assert!(range.start <= range.end && range.end <= self.len(), "substr range out of bounds");
		let want_len = range.end - range.start;
		match &self.repr {
			Repr::Dense(v) => ByteString::from(v[range].to_vec()),
			Repr::Segmented { segments, offsets, .. } => {
				if want_len == 0 {
					return ByteString::from_shared_segments(Vec::new(), 0);
				}
				let mut pieces = Vec::new();
				let mut cursor = range.start;
				let mut remaining = want_len;
				let mut seg_idx = directory_lookup(offsets, cursor);
				while remaining > 0 {
					let seg_offset = offsets[seg_idx];
					let local_start = cursor - seg_offset;
					let mut piece = segments[seg_idx].share_all();
					if local_start > 0 {
						piece.consume(local_start);
					}
					piece.truncate(remaining);
					let piece_len = piece.len();
					cursor += piece_len;
					remaining -= piece_len;
					pieces.push(piece);
					seg_idx += 1;
				}
				ByteString::from_shared_segments(pieces, want_len)
			}
		}
	}

	/// `true` if every byte is ASCII (7-bit). Memoized after the first call.
	pub fn is_ascii(&self) -> bool {
		if let Some(cached) = self.is_ascii.get() {
			return cached;
		}
		let result = match &self.repr {
			Repr::Dense(v) => v.iter().all(u8::is_ascii),
			Repr::Segmented { segments, .. } => segments.iter().all(|s| s.data().iter().all(u8::is_ascii)),
		};
		self.is_ascii.set(Some(result));
		result
	}

	/// Decodes the bytes as UTF-8, failing with an offset-carrying error on
	/// the first malformed sequence.
	pub fn utf8(&self) -> Result<String, OffsetUtf8Error> {
		if let Some(slice) = self.as_contiguous_slice() {
			return simdutf8::compat::from_utf8(slice)
				.map(str::to_owned)
				.map_err(|e| OffsetUtf8Error::from((e, slice, 0)));
		}
		let bytes = self.to_vec();
		simdutf8::compat::from_utf8(&bytes)
			.map(str::to_owned)
			.map_err(|e| OffsetUtf8Error::from((e, bytes.as_slice(), 0)))
	}

	/// Decodes the bytes as UTF-8 and memoizes the result, so repeated calls
	/// after the first pay only the cost of cloning an `Rc<str>`. Fails the
	/// same way as [`Self::utf8`] on malformed input; a failed decode is not
	/// cached (it is expected to be rare and the offset is only useful once).
	pub fn utf8_cached(&self) -> Result<Rc<str>, OffsetUtf8Error> {
		if let Some(cached) = self.utf8_cache.borrow().as_ref() {
			return Ok(cached.clone());
		}
		let decoded: Rc<str> = self.utf8()?.into();
		*self.utf8_cache.borrow_mut() = Some(decoded.clone());
		Ok(decoded)
	}

	/// Builds an ASCII byte string from `value`, replacing any byte `>=
	/// 0x80` with `?` rather than failing — the construction-from-`&str`
	/// lossy path; construction-from-bytes that must *validate* instead of
	/// substitute is [`Self::from_ascii`].
	pub fn from_ascii_lossy(value: &str) -> Self {
		let bytes: Vec<u8> = value.bytes().map(|b| if b < 0x80 { b } else { b'?' }).collect();
		let result = Self::from(bytes);
		result.is_ascii.set(Some(true));
		result
	}

	/// Builds a byte string from `bytes`, tagging it as valid UTF-8 and
	/// memoizing the decoded `Rc<str>` so a later [`Self::utf8_cached`] call
	/// is free. Fails with a [`crate::error::ErrorKind::CharacterCoding`]
	/// error at the first malformed sequence, the same way [`Self::utf8`]
	/// reports one.
	pub fn from_utf8(bytes: &[u8]) -> Result<Self, Error> {
		match simdutf8::compat::from_utf8(bytes) {
			Ok(decoded) => {
				let result = Self::from(bytes.to_vec());
				*result.utf8_cache.borrow_mut() = Some(Rc::from(decoded));
				Ok(result)
			}
			Err(e) => Err(Error::character_coding(OffsetUtf8Error::from((e, bytes, 0)))),
		}
	}

	/// Builds a byte string from `bytes`, validating that every byte is
	/// 7-bit ASCII and failing with a
	/// [`crate::error::ErrorKind::CharacterCoding`] error at the first byte
	/// `>= 0x80` rather than substituting (contrast [`Self::from_ascii_lossy`]).
	pub fn from_ascii(bytes: &[u8]) -> Result<Self, Error> {
		if let Some(at) = bytes.iter().position(|&b| b >= 0x80) {
			return Err(Error::encoding(AsciiByteError { byte: bytes[at], index: at }));
		}
		let result = Self::from(bytes.to_vec());
		result.is_ascii.set(Some(true));
		Ok(result)
	}

	/// Compares `count` bytes of `self` starting at `offset` against `count`
	/// bytes of `other` starting at `other_offset`, without materializing
	/// either side flat.
	///
	/// # Panics
	/// Panics if either range is out of bounds.
	pub fn range_equals(&self, offset: usize, other: &ByteString, other_offset: usize, count: usize) -> bool {
		assert!(offset + count <= self.len(), "range_equals: self range out of bounds");
		assert!(other_offset + count <= other.len(), "range_equals: other range out of bounds");
		match (self.as_contiguous_slice(), other.as_contiguous_slice()) {
			(Some(a), Some(b)) => a[offset..offset + count] == b[other_offset..other_offset + count],
			_ => (0..count).all(|i| self.byte_at(offset + i) == other.byte_at(other_offset + i)),
		}
	}

	/// Finds the first index at or after `from_index` where `needle` occurs
	/// as a contiguous subsequence, scanning segment-by-segment without
	/// flattening a segmented representation.
	pub fn index_of(&self, needle: &ByteString, from_index: usize) -> Option<usize> {
		if needle.is_empty() { return (from_index <= self.len()).then_some(from_index) }
		if from_index >= self.len() || needle.len() > self.len() - from_index { return None }
		let first = needle.byte_at(0);
		let mut at = from_index;
		while at + needle.len() <= self.len() {
			if self.byte_at(at) == first && self.range_equals(at, needle, 0, needle.len()) {
				return Some(at);
			}
			at += 1;
		}
		None
	}

	/// Appends this byte string's bytes to `dst`, sharing segments where
	/// possible (mirrors [`Buffer::write_byte_string`]).
	pub fn write_to(&self, dst: &mut Buffer) {
		dst.write_byte_string(self);
	}

	/// Lowercase hexadecimal encoding.
	pub fn hex_lower(&self) -> String {
		base16ct::lower::encode_string(&self.to_vec())
	}

	/// Uppercase hexadecimal encoding.
	pub fn hex_upper(&self) -> String {
		base16ct::upper::encode_string(&self.to_vec())
	}

	/// Standard (`+`/`/`, padded) base64 encoding.
	pub fn base64(&self) -> String {
		base64::engine::general_purpose::STANDARD.encode(self.to_vec())
	}

	/// URL- and filename-safe (`-`/`_`, unpadded) base64 encoding.
	pub fn base64_url(&self) -> String {
		base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(self.to_vec())
	}

	#[cfg(feature = "hash")]
	fn digest_with<D: digest::Digest>(&self) -> ByteString {
		let mut hasher = D::new();
		if let Some(slice) = self.as_contiguous_slice() {
			digest::Digest::update(&mut hasher, slice);
		} else {
			digest::Digest::update(&mut hasher, &self.to_vec());
		}
		ByteString::from(hasher.finalize().to_vec())
	}

	/// MD5 digest. Cryptographically broken; kept for interoperability with
	/// legacy protocols only (see the `broken-hash` feature).
	#[cfg(feature = "md5")]
	pub fn md5(&self) -> ByteString { self.digest_with::<md_5::Md5>() }

	/// SHA-1 digest. Cryptographically broken; see [`Self::md5`].
	#[cfg(feature = "sha1")]
	pub fn sha1(&self) -> ByteString { self.digest_with::<sha1::Sha1>() }

	/// SHA-256 digest.
	#[cfg(feature = "sha2")]
	pub fn sha256(&self) -> ByteString { self.digest_with::<sha2::Sha256>() }

	/// SHA-512 digest.
	#[cfg(feature = "sha2")]
	pub fn sha512(&self) -> ByteString { self.digest_with::<sha2::Sha512>() }

	/// SHA3-512 digest.
	#[cfg(feature = "sha3")]
	pub fn sha3_512(&self) -> ByteString { self.digest_with::<sha3::Sha3_512>() }

	/// HMAC-MD5 with `key`.
	#[cfg(feature = "md5")]
	pub fn hmac_md5(&self, key: &[u8]) -> ByteString { self.hmac_with::<md_5::Md5>(key) }

	/// HMAC-SHA1 with `key`.
	#[cfg(feature = "sha1")]
	pub fn hmac_sha1(&self, key: &[u8]) -> ByteString { self.hmac_with::<sha1::Sha1>(key) }

	/// HMAC-SHA256 with `key`.
	#[cfg(feature = "sha2")]
	pub fn hmac_sha256(&self, key: &[u8]) -> ByteString { self.hmac_with::<sha2::Sha256>(key) }

	/// HMAC-SHA512 with `key`.
	#[cfg(feature = "sha2")]
	pub fn hmac_sha512(&self, key: &[u8]) -> ByteString { self.hmac_with::<sha2::Sha512>(key) }

	#[cfg(feature = "hash")]
	fn hmac_with<D>(&self, key: &[u8]) -> ByteString
	where
		D: digest::Digest + digest::core_api::BlockSizeUser,
	{
		use hmac::Mac;
		let mut mac = hmac::SimpleHmac::<D>::new_from_slice(key).expect("HMAC accepts any key length");
		mac.update(&self.to_vec());
		ByteString::from(mac.finalize().into_bytes().to_vec())
	}
}

#[derive(Debug, thiserror::Error)]
#[error("byte 0x{byte:02X} at index {index} is not 7-bit ASCII")]
struct AsciiByteError {
	byte: u8,
	index: usize,
}

fn directory_lookup(offsets: &[usize], index: usize) -> usize {
	match offsets.binary_search(&index) {
		Ok(i) => i,
		Err(i) => i - 1,
	}
}

impl From<Vec<u8>> for ByteString {
	fn from(value: Vec<u8>) -> Self {
		Self { repr: Repr::Dense(Rc::new(value)), is_ascii: Cell::new(None), utf8_cache: RefCell::new(None) }
	}
}

impl From<&[u8]> for ByteString {
	fn from(value: &[u8]) -> Self { Self::from(value.to_vec()) }
}

impl From<&str> for ByteString {
	fn from(value: &str) -> Self { Self::from(value.as_bytes()) }
}

impl PartialEq for ByteString {
	fn eq(&self, other: &Self) -> bool {
		if self.len() != other.len() { return false }
		match (self.as_contiguous_slice(), other.as_contiguous_slice()) {
			(Some(a), Some(b)) => a == b,
			_ => self.to_vec() == other.to_vec(),
		}
	}
}

impl Eq for ByteString {}

impl PartialOrd for ByteString {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for ByteString {
	fn cmp(&self, other: &Self) -> Ordering { self.to_vec().cmp(&other.to_vec()) }
}

impl Hash for ByteString {
	fn hash<H: Hasher>(&self, state: &mut H) {
		// FNV-1a, run over the logical byte sequence regardless of
		// representation so Dense and Segmented strings with equal content
		// hash equally.
		let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
		let fold = |hash: &mut u64, byte: u8| {
			*hash ^= byte as u64;
			*hash = hash.wrapping_mul(0x0000_0100_0000_01B3);
		};
		match &self.repr {
			Repr::Dense(v) => v.iter().copied().for_each(|b| fold(&mut hash, b)),
			Repr::Segmented { segments, .. } => {
				for seg in segments.iter() {
					seg.data().iter().copied().for_each(|b| fold(&mut hash, b));
				}
			}
		}
		state.write_u64(hash);
	}
}

impl fmt::Debug for ByteString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.utf8() {
			Ok(s) if self.is_ascii() => write!(f, "ByteString({s:?})"),
			_ => write!(f, "ByteString({:?})", self.to_vec()),
		}
	}
}

impl Add for ByteString {
	type Output = ByteString;

	fn add(self, rhs: ByteString) -> ByteString {
		match (self.shared_segments(), rhs.shared_segments()) {
			(Some(mut a), Some(b)) => {
				let len = self.len() + rhs.len();
				a.extend(b);
				ByteString::from_shared_segments(a, len)
			}
			_ => {
				let mut bytes = self.to_vec();
				bytes.extend(rhs.to_vec());
				ByteString::from(bytes)
			}
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::buffer::Buffer;

	#[test]
	fn dense_round_trips() {
		let bs = ByteString::from(b"hello world".as_slice());
		assert_eq!(bs.to_vec(), b"hello world");
		assert_eq!(bs.len(), 11);
		assert!(bs.is_ascii());
	}

	#[test]
	fn segmented_substr_shares_storage() {
		let mut buf = Buffer::new();
		buf.write_from_slice(b"0123456789");
		let snap = buf.snapshot();
		let sub = snap.substr(2..5);
		assert_eq!(sub.to_vec(), b"234");
	}

	#[test]
	fn equality_ignores_representation() {
		let dense = ByteString::from(b"abc".as_slice());
		let mut buf = Buffer::new();
		buf.write_from_slice(b"abc");
		let segmented = buf.snapshot();
		assert_eq!(dense, segmented);
	}

	#[test]
	fn hex_and_base64_encode() {
		let bs = ByteString::from(b"abc".as_slice());
		assert_eq!(bs.hex_lower(), "616263");
		assert_eq!(bs.base64(), "YWJj");
	}

	#[test]
	fn concatenation_preserves_bytes() {
		let a = ByteString::from(b"foo".as_slice());
		let b = ByteString::from(b"bar".as_slice());
		assert_eq!((a + b).to_vec(), b"foobar");
	}

	#[test]
	fn utf8_cached_memoizes_across_calls() {
		let bs = ByteString::from(b"caf\xc3\xa9".as_slice());
		let first = bs.utf8_cached().unwrap();
		let second = bs.utf8_cached().unwrap();
		assert_eq!(&*first, "caf\u{e9}");
		assert!(Rc::ptr_eq(&first, &second), "second call must reuse the cached Rc<str>");
	}

	#[test]
	fn ascii_lossy_substitutes_non_ascii() {
		let bs = ByteString::from_ascii_lossy("caf\u{e9}");
		assert_eq!(bs.to_vec(), b"caf?");
		assert!(bs.is_ascii());
	}

	#[test]
	fn index_of_finds_subsequence_across_segments() {
		let mut buf = Buffer::new();
		buf.write_from_slice(&[0u8; 10]);
		buf.write_from_slice(b"needle");
		buf.write_from_slice(&[0u8; 10]);
		let snap = buf.snapshot();
		let needle = ByteString::from(b"needle".as_slice());
		assert_eq!(snap.index_of(&needle, 0), Some(10));
		assert_eq!(snap.index_of(&needle, 11), None);
	}

	#[test]
	fn range_equals_compares_without_flattening() {
		let a = ByteString::from(b"xxhelloxx".as_slice());
		let b = ByteString::from(b"hello".as_slice());
		assert!(a.range_equals(2, &b, 0, 5));
		assert!(!a.range_equals(0, &b, 0, 2));
	}

	#[test]
	fn write_to_appends_into_buffer() {
		let bs = ByteString::from(b"abc".as_slice());
		let mut buf = Buffer::new();
		buf.write_from_slice(b"xyz");
		bs.write_to(&mut buf);
		assert_eq!(buf.read_byte_string(6).unwrap().to_vec(), b"xyzabc");
	}

	#[test]
	fn from_utf8_rejects_malformed_bytes_and_memoizes_on_success() {
		let bs = ByteString::from_utf8(b"caf\xc3\xa9").unwrap();
		assert_eq!(bs.to_vec(), b"caf\xc3\xa9");
		let cached = bs.utf8_cached().unwrap();
		assert_eq!(&*cached, "caf\u{e9}");

		let err = ByteString::from_utf8(b"caf\xc3").unwrap_err();
		assert_eq!(err.kind(), crate::error::ErrorKind::CharacterCoding);
	}

	#[test]
	fn from_ascii_validates_every_byte() {
		let bs = ByteString::from_ascii(b"hello").unwrap();
		assert_eq!(bs.to_vec(), b"hello");
		assert!(bs.is_ascii());

		let err = ByteString::from_ascii(b"caf\xe9").unwrap_err();
		assert_eq!(err.kind(), crate::error::ErrorKind::CharacterCoding);
	}

	#[cfg(feature = "sha2")]
	#[test]
	fn sha256_is_deterministic_and_32_bytes() {
		let a = ByteString::from(b"hello".as_slice()).sha256();
		let b = ByteString::from(b"hello".as_slice()).sha256();
		let c = ByteString::from(b"world".as_slice()).sha256();
		assert_eq!(a, b);
		assert_ne!(a, c);
		assert_eq!(a.len(), 32);
	}
}
