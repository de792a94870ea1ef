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

//! Blanket bridges between this crate's [`RawReader`](crate::reader::RawReader)/
//! [`RawWriter`](crate::writer::RawWriter) collaborator traits and
//! [`std::io::Read`]/[`std::io::Write`], so any existing standard-library I/O
//! type (a `File`, a `TcpStream`, a `Vec<u8>` cursor) can back a
//! [`Reader`](crate::reader::Reader)/[`Writer`](crate::writer::Writer)
//! without a bespoke adapter.

use std::io::{Read, Write};

use crate::buffer::Buffer;
use crate::error::Result;
use crate::reader::RawReader;
use crate::segment::SEGMENT_SIZE;
use crate::writer::RawWriter;

/// Wraps any [`std::io::Read`] as a [`RawReader`].
pub struct FromRead<R: Read>(pub R);

impl<R: Read> RawReader for FromRead<R> {
	fn read_at_most_to(&mut self, sink: &mut Buffer, max_bytes: usize) -> Result<usize> {
		let want = max_bytes.min(SEGMENT_SIZE);
		let mut scratch = [0u8; SEGMENT_SIZE];
		let read = self.0.read(&mut scratch[..want])?;
		if read > 0 {
			sink.write_from_slice(&scratch[..read]);
		}
		Ok(read)
	}
}

/// Wraps any [`std::io::Write`] as a [`RawWriter`].
pub struct FromWrite<W: Write>(pub W);

impl<W: Write> RawWriter for FromWrite<W> {
	fn write(&mut self, source: &mut Buffer, mut byte_count: usize) -> Result<()> {
		let mut scratch = [0u8; SEGMENT_SIZE];
		while byte_count > 0 {
			let chunk = byte_count.min(SEGMENT_SIZE);
			let n = source.read_into_slice(&mut scratch[..chunk]);
			self.0.write_all(&scratch[..n])?;
			byte_count -= n;
		}
		Ok(())
	}

	fn flush(&mut self) -> Result<()> {
		Write::flush(&mut self.0)?;
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::reader::Reader;
	use crate::writer::Writer;

	#[test]
	fn reads_through_std_read() {
		let mut reader = Reader::new(FromRead(std::io::Cursor::new(b"hello world".to_vec())));
		assert_eq!(reader.read_byte_string(11).unwrap().to_vec(), b"hello world");
	}

	#[test]
	fn writes_through_std_write() {
		let mut writer = Writer::new(FromWrite(Vec::<u8>::new()));
		writer.write_bytes(b"hello").unwrap();
		writer.flush().unwrap();
		assert_eq!(writer.sink().0, b"hello");
	}
}
