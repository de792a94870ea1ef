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

//! A buffered facade over a raw, push-style byte source.

use crate::buffer::Buffer;
use crate::byte_string::ByteString;
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::segment::SEGMENT_SIZE;

/// The collaborator a [`Reader`] pulls bytes from. Implement this for any
/// upstream byte source; a blanket adapter from [`std::io::Read`] is
/// provided in [`crate::io_adapter`].
pub trait RawReader {
	/// Reads at most `max_bytes` into `sink`'s tail, returning the number of
	/// bytes read. `Ok(0)` means end-of-stream (idiomatic Rust `Read`-style
	/// sentinel), unless `max_bytes == 0`.
	fn read_at_most_to(&mut self, sink: &mut Buffer, max_bytes: usize) -> Result<usize>;
}

/// A buffered reader: consumes from its own readahead [`Buffer`] first,
/// pulling more from `R` only when that buffer cannot satisfy a request.
pub struct Reader<R: RawReader> {
	buffer: Buffer,
	source: R,
	closed: bool,
}

impl<R: RawReader> Reader<R> {
	/// Wraps `source` in a buffered reader.
	pub fn new(source: R) -> Self { Self { buffer: Buffer::new(), source, closed: false } }

	/// A reference to the readahead buffer, for callers that want to drive
	/// reads through [`Buffer`]'s own API once enough data is resident.
	pub fn buffer(&self) -> &Buffer { &self.buffer }

	/// Fills the readahead buffer until it holds at least `byte_count`
	/// bytes or the upstream source is exhausted, returning which happened.
	pub fn request(&mut self, byte_count: usize) -> Result<bool> {
		while self.buffer.count() < byte_count {
			CancelToken::current().throw_if_reached()?;
			if self.closed {
				return Err(Error::closed());
			}
			let want = (byte_count - self.buffer.count()).max(SEGMENT_SIZE);
			let read = self.source.read_at_most_to(&mut self.buffer, want)?;
			CancelToken::current().throw_if_reached()?;
			if read == 0 {
				return Ok(false);
			}
		}
		Ok(true)
	}

	/// `request(byte_count)`, failing with [`Error::eof`] if it could not
	/// be satisfied.
	pub fn require(&mut self, byte_count: usize) -> Result<()> {
		if self.request(byte_count)? {
			Ok(())
		} else {
			Err(Error::eof())
		}
	}

	/// `true` iff the readahead buffer is empty and upstream is exhausted.
	pub fn exhausted(&mut self) -> Result<bool> { Ok(!self.request(1)?) }

	/// Reads one byte.
	pub fn read_u8(&mut self) -> Result<u8> {
		self.require(1)?;
		self.buffer.read_u8()
	}

	/// Reads one signed byte.
	pub fn read_i8(&mut self) -> Result<i8> {
		self.require(1)?;
		self.buffer.read_i8()
	}

	/// Reads exactly `N` bytes into a fixed-size array.
	pub fn read_byte_array<const N: usize>(&mut self) -> Result<[u8; N]> {
		self.require(N)?;
		let mut out = [0u8; N];
		self.buffer.read_into_slice_exact(&mut out)?;
		Ok(out)
	}

	/// Reads `byte_count` bytes into a dense [`ByteString`].
	pub fn read_byte_string(&mut self, byte_count: usize) -> Result<ByteString> {
		self.require(byte_count)?;
		self.buffer.read_byte_string(byte_count)
	}

	/// Reads `byte_count` bytes, decoding as UTF-8 with replacement.
	pub fn read_utf8(&mut self, byte_count: usize) -> Result<String> {
		self.require(byte_count)?;
		let mut out = String::new();
		self.buffer.read_utf8(&mut out, byte_count);
		Ok(out)
	}

	/// Reads `byte_count` bytes as ISO-8859-1 (Latin-1), one byte per `char`.
	pub fn read_latin1(&mut self, byte_count: usize) -> Result<String> {
		self.require(byte_count)?;
		self.buffer.read_latin1(byte_count)
	}

	/// Reads `byte_count` bytes as 7-bit ASCII, failing on the first byte
	/// `>= 0x80`.
	pub fn read_ascii(&mut self, byte_count: usize) -> Result<String> {
		self.require(byte_count)?;
		self.buffer.read_ascii(byte_count)
	}

	/// Reads one line terminated by `"\n"` or `"\r\n"` (not included in the
	/// result), pulling more from upstream as needed. If upstream is
	/// exhausted mid-line, the partial line is returned; `None` is returned
	/// only when there was nothing left to read at all.
	pub fn read_utf8_line(&mut self) -> Result<Option<String>> {
		loop {
			if let Some(line) = self.buffer.read_utf8_line()? {
				return Ok(Some(line));
			}
			let want = self.buffer.count() + SEGMENT_SIZE;
			if self.request(want)? {
				continue;
			}
			if self.buffer.is_empty() {
				return Ok(None);
			}
			let mut out = String::new();
			let n = self.buffer.count();
			self.buffer.read_utf8(&mut out, n);
			return Ok(Some(out));
		}
	}

	/// An ASCII decimal integer token; pulls ahead far enough to cover any
	/// `i64`'s digits before parsing.
	pub fn read_decimal_long(&mut self) -> Result<i64> {
		self.request(self.buffer.count().max(20))?;
		self.buffer.read_decimal_long()
	}

	/// An ASCII hexadecimal integer token; see [`Self::read_decimal_long`].
	pub fn read_hex_long(&mut self) -> Result<u64> {
		self.request(self.buffer.count().max(16))?;
		self.buffer.read_hex_long()
	}

	/// Finds the first occurrence of `byte`, pulling more from upstream as
	/// needed, without materializing a flat copy of the buffer.
	pub fn index_of_byte(&mut self, byte: u8) -> Result<Option<usize>> {
		loop {
			if let Some(at) = self.buffer.index_of_byte(byte, 0) {
				return Ok(Some(at));
			}
			let want = self.buffer.count() + SEGMENT_SIZE;
			if !self.request(want)? {
				return Ok(None);
			}
		}
	}

	/// Marks this reader closed; subsequent operations fail with
	/// [`Error::closed`].
	pub fn close(&mut self) -> Result<()> {
		self.closed = true;
		Ok(())
	}
}

impl<R: RawReader + Clone> Reader<R> {
	/// Returns a reader sharing the same upstream and a copy-on-write
	/// snapshot of the currently-buffered bytes, without consuming them
	/// from `self`.
	pub fn peek(&self) -> Reader<R> {
		Reader { buffer: self.buffer.clone_shared(), source: self.source.clone(), closed: self.closed }
	}
}

macro_rules! gen_reader_int {
	($name:ident -> $ty:ty) => {
		impl<R: RawReader> Reader<R> {
			#[doc = concat!(" Reads one [`", stringify!($ty), "`].")]
			pub fn $name(&mut self) -> Result<$ty> {
				self.require(std::mem::size_of::<$ty>())?;
				self.buffer.$name()
			}
		}
	};
}

gen_reader_int!(read_u16 -> u16);
gen_reader_int!(read_u16_le -> u16);
gen_reader_int!(read_i16 -> i16);
gen_reader_int!(read_i16_le -> i16);
gen_reader_int!(read_u32 -> u32);
gen_reader_int!(read_u32_le -> u32);
gen_reader_int!(read_i32 -> i32);
gen_reader_int!(read_i32_le -> i32);
gen_reader_int!(read_u64 -> u64);
gen_reader_int!(read_u64_le -> u64);
gen_reader_int!(read_i64 -> i64);
gen_reader_int!(read_i64_le -> i64);

#[cfg(test)]
mod test {
	use super::*;

	struct SliceReader<'a> {
		data: &'a [u8],
	}

	impl<'a> RawReader for SliceReader<'a> {
		fn read_at_most_to(&mut self, sink: &mut Buffer, max_bytes: usize) -> Result<usize> {
			let n = max_bytes.min(self.data.len());
			sink.write_from_slice(&self.data[..n]);
			self.data = &self.data[n..];
			Ok(n)
		}
	}

	#[test]
	fn reads_exact_and_reports_eof() {
		let mut reader = Reader::new(SliceReader { data: b"abc" });
		assert_eq!(reader.read_byte_string(3).unwrap().to_vec(), b"abc");
		assert!(reader.read_u8().is_err());
	}

	#[test]
	fn read_utf8_line_splits_on_crlf_and_lf() {
		let mut reader = Reader::new(SliceReader { data: b"one\r\ntwo\nthree" });
		assert_eq!(reader.read_utf8_line().unwrap(), Some("one".to_string()));
		assert_eq!(reader.read_utf8_line().unwrap(), Some("two".to_string()));
		assert_eq!(reader.read_utf8_line().unwrap(), Some("three".to_string()));
		assert_eq!(reader.read_utf8_line().unwrap(), None);
	}

	#[test]
	fn big_endian_integers_round_trip() {
		let mut reader = Reader::new(SliceReader { data: &[0x00, 0x01, 0x00, 0x02] });
		assert_eq!(reader.read_u16().unwrap(), 1);
		assert_eq!(reader.read_u16().unwrap(), 2);
	}
}
