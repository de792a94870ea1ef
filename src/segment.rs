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

//! Fixed-capacity, copy-on-write byte blocks. A [`Segment`] is the unit of
//! storage shared between [`Buffer`](crate::buffer::Buffer)s and
//! [`ByteString`](crate::byte_string::ByteString)s: reading never copies,
//! only writing past a segment's recorded limit while it is shared forces a
//! copy (see [`Segment::data_mut`]).

use std::rc::Rc;

/// The fixed capacity of every [`Segment`], in bytes.
pub const SEGMENT_SIZE: usize = 8192;

type Block = [u8; SEGMENT_SIZE];

fn empty_block() -> Rc<Block> { Rc::new([0; SEGMENT_SIZE]) }

/// A fixed-capacity, reference-counted, copy-on-write chunk of memory.
///
/// `pos` is the index of the first readable byte, `limit` is the index one
/// past the last readable (and first writable) byte. A segment is *shared*
/// when its backing storage has more than one live reference; writes to a
/// shared segment transparently fork (clone) the storage first, by way of
/// [`Rc::make_mut`], so the sibling segment's view is never disturbed.
#[derive(Clone)]
pub struct Segment {
	data: Rc<Block>,
	pos: usize,
	limit: usize,
}

impl Segment {
	/// Returns a new, empty segment.
	pub fn empty() -> Self {
		Self { data: empty_block(), pos: 0, limit: 0 }
	}

	/// Returns `true` if this segment's storage is referenced elsewhere.
	pub fn is_shared(&self) -> bool { Rc::strong_count(&self.data) > 1 }

	/// Returns `true` if the segment has no readable bytes.
	pub fn is_empty(&self) -> bool { self.pos == self.limit }

	/// Returns `true` if the segment has no writable capacity left.
	pub fn is_full(&self) -> bool { self.limit == SEGMENT_SIZE }

	/// The number of bytes available to read.
	pub fn len(&self) -> usize { self.limit - self.pos }

	/// The number of bytes of spare writable capacity.
	pub fn lim(&self) -> usize { SEGMENT_SIZE - self.limit }

	/// The first readable index.
	pub fn pos(&self) -> usize { self.pos }

	/// The first non-readable (writable) index.
	pub fn limit(&self) -> usize { self.limit }

	/// A new segment sharing this segment's storage in full. Copy-on-write:
	/// later writes to either segment fork the storage rather than mutating
	/// the other's view.
	pub fn share_all(&self) -> Self { self.clone() }

	/// A new segment sharing this segment's storage, bounded to at most
	/// `byte_count` bytes from the current read position.
	pub fn share(&self, byte_count: usize) -> Self {
		let mut seg = self.share_all();
		seg.limit = seg.pos + byte_count.min(seg.len());
		seg
	}

	/// The readable bytes.
	pub fn data(&self) -> &[u8] { &self.data[self.pos..self.limit] }

	/// A mutable view of the readable bytes, forking shared storage first.
	pub fn data_mut(&mut self) -> &mut [u8] {
		let block = Rc::make_mut(&mut self.data);
		&mut block[self.pos..self.limit]
	}

	/// Resets the segment to empty. Only meaningful on an unshared segment
	/// (the pool never recycles a shared one); called on a shared segment
	/// this only clears the caller's own view, the sibling is untouched.
	pub fn clear(&mut self) {
		self.pos = 0;
		self.limit = 0;
	}

	/// Shifts readable bytes so `pos` becomes zero, compacting the unused
	/// prefix. Forks shared storage.
	pub fn shift(&mut self) {
		if self.pos == 0 { return }
		let len = self.len();
		let block = Rc::make_mut(&mut self.data);
		block.copy_within(self.pos..self.limit, 0);
		self.pos = 0;
		self.limit = len;
	}

	/// Marks `n` bytes as consumed (read) from the front.
	pub fn consume(&mut self, n: usize) {
		debug_assert!(self.pos + n <= self.limit, "consume past limit");
		self.pos += n;
	}

	/// Marks `n` bytes as written at the back.
	pub fn add(&mut self, n: usize) {
		debug_assert!(self.limit + n <= SEGMENT_SIZE, "add past capacity");
		self.limit += n;
	}

	/// Truncates the readable range to at most `n` bytes from `pos`.
	pub fn truncate(&mut self, n: usize) {
		self.limit = self.pos + n.min(self.len());
	}

	/// Appends as much of `bytes` as fits, returning the number written.
	pub fn push_slice(&mut self, bytes: &[u8]) -> usize {
		let count = self.lim().min(bytes.len());
		if count > 0 {
			let limit = self.limit;
			let block = Rc::make_mut(&mut self.data);
			block[limit..limit + count].copy_from_slice(&bytes[..count]);
			self.limit += count;
		}
		count
	}

	/// Reads as many bytes as fit into `dst`, returning the number read.
	pub fn pop_into_slice(&mut self, dst: &mut [u8]) -> usize {
		let count = self.len().min(dst.len());
		if count > 0 {
			dst[..count].copy_from_slice(&self.data[self.pos..self.pos + count]);
			self.pos += count;
		}
		count
	}

	/// Moves up to `byte_count` bytes from this segment into `other`,
	/// sharing storage if `other` can take this segment's entire readable
	/// range and is otherwise empty (a pointer move), copying otherwise.
	/// Returns the number of bytes moved.
	pub fn move_into(&mut self, other: &mut Self, byte_count: usize) -> usize {
		let count = self.len().min(byte_count);
		if count == 0 { return 0 }

		if count == self.len() && other.is_empty() {
			// Whole-segment share: `other` adopts our storage directly.
			*other = self.share(count);
			self.pos = self.limit;
			return count
		}

		let moved = other.push_slice(&self.data[self.pos..self.pos + count]);
		self.pos += moved;
		moved
	}
}

impl Default for Segment {
	fn default() -> Self { Self::empty() }
}
