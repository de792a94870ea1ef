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

//! Segment recycling. A pool hands out [`Segment`]s reset to empty and takes
//! them back once a [`Buffer`](crate::buffer::Buffer) is done with them,
//! trading allocation for reuse. Two implementations are provided: a
//! thread-local pool with no locking overhead (the default, matching a
//! Buffer's single-owner contract) and, behind the `shared-pool` feature, an
//! `Arc<Mutex<_>>`-backed pool for the rarer case of segments crossing a
//! thread boundary (e.g. the [`TaskRunner`](crate::task::TaskRunner)'s
//! worker pool closing a socket on a thread other than the one that filled
//! its buffer).

use std::cell::RefCell;
use std::rc::Rc;
use crate::segment::Segment;

/// The number of empty segments a pool retains before discarding the rest.
pub const DEFAULT_RETAINED_SEGMENTS: usize = 64;

/// A source and sink of recyclable [`Segment`]s.
pub trait SegmentPool {
	/// Claims a single segment, recycled if one is available.
	fn take(&self) -> Segment;

	/// Claims `count` segments.
	fn take_many(&self, count: usize) -> Vec<Segment> {
		(0..count).map(|_| self.take()).collect()
	}

	/// Returns an unshared, cleared segment to the pool. Shared segments
	/// must never be passed here; the caller drops them instead, letting
	/// the reference count fall naturally.
	fn recycle(&self, segment: Segment);

	/// Returns many segments to the pool.
	fn recycle_many(&self, segments: impl IntoIterator<Item = Segment>) {
		for segment in segments {
			self.recycle(segment);
		}
	}
}

/// A thread-local segment pool with no synchronization overhead. This is the
/// default pool for [`Buffer`](crate::buffer::Buffer); since a Buffer is a
/// single-owner resource, its segments never need to cross a thread.
#[derive(Clone)]
pub struct LocalPool {
	segments: Rc<RefCell<Vec<Segment>>>,
	retained: usize,
}

thread_local! {
	static LOCAL_POOL: LocalPool = LocalPool::new(DEFAULT_RETAINED_SEGMENTS);
}

impl LocalPool {
	fn new(retained: usize) -> Self {
		Self { segments: Rc::new(RefCell::new(Vec::new())), retained }
	}

	/// Returns this thread's shared pool instance.
	pub fn get() -> Self {
		LOCAL_POOL.with(Clone::clone)
	}
}

impl Default for LocalPool {
	fn default() -> Self { Self::get() }
}

impl SegmentPool for LocalPool {
	fn take(&self) -> Segment {
		let mut segments = self.segments.borrow_mut();
		let segment = segments.pop().unwrap_or_default();
		log::trace!("claimed segment from local pool, {} remaining", segments.len());
		segment
	}

	fn recycle(&self, mut segment: Segment) {
		if segment.is_shared() {
			// Storage is still reachable elsewhere; dropping our handle is
			// enough, the shared storage is freed when the last one drops.
			return;
		}

		segment.clear();
		let mut segments = self.segments.borrow_mut();
		if segments.len() < self.retained {
			segments.push(segment);
			log::trace!("recycled segment into local pool, {} retained", segments.len());
		} else {
			log::trace!("local pool full, discarding segment");
		}
	}
}

#[cfg(feature = "shared-pool")]
pub use shared::SharedPool;

#[cfg(feature = "shared-pool")]
mod shared {
	use std::sync::{Arc, Mutex};
	use crate::segment::Segment;
	use super::{SegmentPool, DEFAULT_RETAINED_SEGMENTS};

	/// A `Send + Sync` segment pool for buffers whose segments must cross a
	/// thread boundary.
	#[derive(Clone)]
	pub struct SharedPool {
		segments: Arc<Mutex<Vec<Segment>>>,
		retained: usize,
	}

	impl SharedPool {
		pub fn new() -> Self {
			Self { segments: Arc::new(Mutex::new(Vec::new())), retained: DEFAULT_RETAINED_SEGMENTS }
		}
	}

	impl Default for SharedPool {
		fn default() -> Self { Self::new() }
	}

	impl SegmentPool for SharedPool {
		fn take(&self) -> Segment {
			let mut segments = self.segments.lock().unwrap_or_else(|e| e.into_inner());
			segments.pop().unwrap_or_default()
		}

		fn recycle(&self, mut segment: Segment) {
			if segment.is_shared() { return }
			segment.clear();
			let mut segments = self.segments.lock().unwrap_or_else(|e| e.into_inner());
			if segments.len() < self.retained {
				segments.push(segment);
			}
		}
	}
}
