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

//! A buffered facade over a raw, pull-style byte sink: the write-side mirror
//! of [`crate::reader::Reader`].

use crate::buffer::Buffer;
use crate::byte_string::ByteString;
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::reader::RawReader;
use crate::segment::SEGMENT_SIZE;

/// The collaborator a [`Writer`] drains its writebehind buffer into.
pub trait RawWriter {
	/// Consumes exactly `byte_count` bytes from the front of `source`.
	fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result<()>;

	/// Drains any internal buffering of the underlying medium.
	fn flush(&mut self) -> Result<()>;

	/// Closes the underlying medium. Idempotent.
	fn close(&mut self) -> Result<()> { Ok(()) }
}

/// A buffered writer: accumulates into its own writebehind [`Buffer`],
/// flushing complete segments to `W` on [`Self::emit`] or everything on
/// [`Self::flush`].
pub struct Writer<W: RawWriter> {
	buffer: Buffer,
	sink: W,
	closed: bool,
}

impl<W: RawWriter> Writer<W> {
	/// Wraps `sink` in a buffered writer.
	pub fn new(sink: W) -> Self { Self { buffer: Buffer::new(), sink, closed: false } }

	/// A reference to the writebehind buffer.
	pub fn buffer(&self) -> &Buffer { &self.buffer }

	/// A reference to the downstream sink, for callers that want to inspect
	/// it directly (e.g. in tests).
	pub fn sink(&self) -> &W { &self.sink }

	fn check_open(&self) -> Result<()> {
		if self.closed { Err(Error::closed()) } else { Ok(()) }
	}

	/// Writes downstream all complete segments of the writebehind buffer,
	/// keeping any partially-filled tail segment hot for further writes —
	/// this is the throughput-preserving call, minimizing syscalls relative
	/// to [`Self::flush`].
	pub fn emit(&mut self) -> Result<()> {
		self.check_open()?;
		CancelToken::current().throw_if_reached()?;
		let complete = self.buffer.count().saturating_sub(self.buffer.hot_tail_len());
		if complete > 0 {
			self.sink.write(&mut self.buffer, complete)?;
			CancelToken::current().throw_if_reached()?;
		}
		Ok(())
	}

	/// Drains the entire writebehind buffer downstream and flushes the
	/// underlying medium.
	pub fn flush(&mut self) -> Result<()> {
		self.check_open()?;
		CancelToken::current().throw_if_reached()?;
		while !self.buffer.is_empty() {
			let count = self.buffer.count();
			self.sink.write(&mut self.buffer, count)?;
			CancelToken::current().throw_if_reached()?;
		}
		self.sink.flush()
	}

	/// Pulls from `source` until exhaustion, writing everything into this
	/// writer's buffer (without flushing downstream), returning the total
	/// bytes transferred.
	pub fn write_all_from(&mut self, source: &mut impl RawReader) -> Result<u64> {
		self.check_open()?;
		let mut total = 0u64;
		loop {
			CancelToken::current().throw_if_reached()?;
			let read = source.read_at_most_to(&mut self.buffer, SEGMENT_SIZE)?;
			if read == 0 { break }
			total += read as u64;
			self.emit()?;
		}
		Ok(total)
	}

	/// Appends a single byte.
	pub fn write_u8(&mut self, value: u8) -> Result<()> {
		self.check_open()?;
		self.buffer.write_u8(value);
		Ok(())
	}

	/// Appends a single signed byte.
	pub fn write_i8(&mut self, value: i8) -> Result<()> {
		self.check_open()?;
		self.buffer.write_i8(value);
		Ok(())
	}

	/// Appends raw bytes.
	pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
		self.check_open()?;
		self.buffer.write_from_slice(bytes);
		Ok(())
	}

	/// Appends `value`, sharing its segments directly where the
	/// [`Buffer`]'s share threshold allows (see
	/// [`crate::buffer::BufferOptions`]).
	pub fn write_byte_string(&mut self, value: &ByteString) -> Result<()> {
		self.check_open()?;
		self.buffer.write_byte_string(value);
		Ok(())
	}

	/// Appends `value` UTF-8-encoded, via the buffer's ASCII-run fast path.
	pub fn write_utf8(&mut self, value: &str) -> Result<()> {
		self.check_open()?;
		self.buffer.write_utf8(value);
		Ok(())
	}

	/// Appends `value` as ISO-8859-1 (Latin-1); fails if any character is
	/// `>= 0x100`, leaving the writebehind buffer unmodified.
	pub fn write_latin1(&mut self, value: &str) -> Result<()> {
		self.check_open()?;
		self.buffer.write_latin1(value)
	}

	/// Appends `value` as 7-bit ASCII, substituting `?` for any character
	/// `>= 0x80`.
	pub fn write_ascii(&mut self, value: &str) -> Result<()> {
		self.check_open()?;
		self.buffer.write_ascii(value);
		Ok(())
	}

	/// Appends `value` followed by `"\n"`.
	pub fn write_utf8_line(&mut self, value: &str) -> Result<()> {
		self.write_utf8(value)?;
		self.write_u8(b'\n')
	}

	/// Marks this writer closed after flushing, closing the downstream
	/// medium. Subsequent operations fail with [`Error::closed`].
	pub fn close(&mut self) -> Result<()> {
		if self.closed { return Ok(()) }
		let result = self.flush();
		self.closed = true;
		self.sink.close()?;
		result
	}
}

macro_rules! gen_writer_int {
	($name:ident -> $ty:ty) => {
		impl<W: RawWriter> Writer<W> {
			#[doc = concat!(" Writes one [`", stringify!($ty), "`].")]
			pub fn $name(&mut self, value: $ty) -> Result<()> {
				self.check_open()?;
				self.buffer.$name(value);
				Ok(())
			}
		}
	};
}

gen_writer_int!(write_u16 -> u16);
gen_writer_int!(write_u16_le -> u16);
gen_writer_int!(write_i16 -> i16);
gen_writer_int!(write_i16_le -> i16);
gen_writer_int!(write_u32 -> u32);
gen_writer_int!(write_u32_le -> u32);
gen_writer_int!(write_i32 -> i32);
gen_writer_int!(write_i32_le -> i32);
gen_writer_int!(write_u64 -> u64);
gen_writer_int!(write_u64_le -> u64);
gen_writer_int!(write_i64 -> i64);
gen_writer_int!(write_i64_le -> i64);

#[cfg(test)]
mod test {
	use super::*;

	#[derive(Default)]
	struct VecSink {
		out: Vec<u8>,
		flushed: bool,
	}

	impl RawWriter for VecSink {
		fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result<()> {
			let mut buf = vec![0u8; byte_count];
			source.read_into_slice_exact(&mut buf)?;
			self.out.extend_from_slice(&buf);
			Ok(())
		}

		fn flush(&mut self) -> Result<()> {
			self.flushed = true;
			Ok(())
		}
	}

	#[test]
	fn flush_drains_writebehind_buffer() {
		let mut writer = Writer::new(VecSink::default());
		writer.write_bytes(b"hello").unwrap();
		assert_eq!(writer.buffer().count(), 5);
		writer.flush().unwrap();
		assert_eq!(writer.buffer().count(), 0);
		assert!(writer.sink.out == b"hello");
		assert!(writer.sink.flushed);
	}

	#[test]
	fn close_is_idempotent_and_rejects_further_writes() {
		let mut writer = Writer::new(VecSink::default());
		writer.write_bytes(b"x").unwrap();
		writer.close().unwrap();
		writer.close().unwrap();
		assert!(writer.write_bytes(b"y").is_err());
	}

	#[test]
	fn emit_keeps_partial_tail_hot() {
		let mut writer = Writer::new(VecSink::default());
		writer.write_bytes(&[1u8; SEGMENT_SIZE + 10]).unwrap();
		writer.emit().unwrap();
		assert_eq!(writer.sink.out.len(), SEGMENT_SIZE);
		assert_eq!(writer.buffer().count(), 10);
	}
}
