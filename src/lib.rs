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

//! ## How it works
//!
//! Data is written to and read from reusable chunks of memory called
//! *segments*. When a segment is drained it is returned to a *pool*; claiming
//! a segment from an exhausted pool allocates a new one. The default pool is
//! thread-local (`RefCell`-backed); behind the `shared-pool` feature an
//! `Arc<Mutex<...>>`-backed pool is also available for cross-thread use.
//!
//! ### Segments and buffers
//!
//! [`Buffer`] holds its segments in a deque rather than a true ring: bytes
//! are written to the back and read from the front, claiming fresh segments
//! from the pool as it grows. Segment storage is copy-on-write, shared
//! between buffers above a size threshold (1024B by default) and forked on
//! write; small writes are copied outright, trading an allocation for
//! avoiding the bookkeeping of sharing. As drained (void) segments
//! accumulate past a threshold the buffer compacts itself, also triggerable
//! manually via [`Buffer::compact`].
//!
//! ### Byte strings
//!
//! [`ByteString`] is the immutable counterpart to [`Buffer`]: a byte
//! sequence that can be held either as one dense allocation or as a
//! structurally-shared run of the segments it was read from, so large reads
//! don't have to flatten into a fresh copy.
//!
//! ### Readers, writers, and raw collaborators
//!
//! [`Reader`](reader::Reader) and [`Writer`](writer::Writer) are buffered
//! facades over a pull-style [`RawReader`](reader::RawReader) or push-style
//! [`RawWriter`](writer::RawWriter) collaborator; [`io_adapter`] bridges
//! those traits to [`std::io::Read`]/[`std::io::Write`].
//!
//! ### Cancellation and scheduling
//!
//! [`CancelScope`](cancel::CancelScope) establishes cooperative deadlines
//! and manual cancellation checked at suspension points via
//! [`CancelToken`](cancel::CancelToken); [`AsyncTimeout`](timeout::AsyncTimeout)
//! is the process-wide watchdog that upgrades an expired scope into a timeout
//! error. [`TaskRunner`](task::TaskRunner) and [`TaskQueue`](task::TaskQueue)
//! run FIFO and scheduled work over a shared worker pool.

mod buffer;
mod byte_string;
mod cancel;
mod codec;
mod error;
mod io_adapter;
mod pattern;
mod pool;
mod reader;
mod segment;
mod task;
mod timeout;
mod writer;

pub use buffer::{Buffer, BufferOptions};
pub use byte_string::ByteString;
pub use cancel::{shield, CancelScope, CancelToken, ScopeGuard};
pub use codec::{decode_base64, decode_base64_url, decode_hex, parse_decimal_i64, parse_hex_u64};
pub use error::{Error, ErrorKind, OffsetUtf8Error, Result, Utf8ErrorKind};
pub use io_adapter::{FromRead, FromWrite};
pub use pattern::{LineTerminator, Pattern};
pub use pool::{LocalPool, SegmentPool};
pub use reader::{RawReader, Reader};
pub use segment::{Segment, SEGMENT_SIZE};
pub use task::{IdleLatch, TaskQueue, TaskRunner, TaskRunnerOptions};
pub use timeout::{shutdown_watchdog, AsyncTimeout, TimeoutNode};
pub use writer::{RawWriter, Writer};

#[cfg(feature = "shared-pool")]
pub use pool::SharedPool;
