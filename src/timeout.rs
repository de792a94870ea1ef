// SPDX-License-Identifier: Apache-2.0

//! A process-wide watchdog that turns a [`CancelScope`](crate::cancel::CancelScope)
//! deadline into an asynchronous abort on blocking I/O that cannot itself be
//! cooperatively cancelled (a blocked socket read, for instance). One
//! [`AsyncTimeout`] is typically owned per resource (e.g. per socket), its
//! `on_timeout` callback closing that resource; [`AsyncTimeout::enter`]/
//! [`AsyncTimeout::exit`] bracket each blocking call.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::error::Result;

struct ScheduledNode {
	wake_at: Instant,
	seq: u64,
	id: u64,
	callback: Arc<dyn Fn() + Send + Sync>,
}

impl PartialEq for ScheduledNode {
	fn eq(&self, other: &Self) -> bool { self.wake_at == other.wake_at && self.seq == other.seq }
}
impl Eq for ScheduledNode {}

impl PartialOrd for ScheduledNode {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> { Some(self.cmp(other)) }
}

impl Ord for ScheduledNode {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		(self.wake_at, self.seq).cmp(&(other.wake_at, other.seq))
	}
}

struct WatchdogState {
	heap: BinaryHeap<Reverse<ScheduledNode>>,
	fired: HashSet<u64>,
	cancelled: HashSet<u64>,
	next_id: u64,
	next_seq: u64,
	shutdown: bool,
}

struct Watchdog {
	state: Mutex<WatchdogState>,
	condvar: Condvar,
}

impl Watchdog {
	fn new() -> Arc<Self> {
		let watchdog = Arc::new(Self {
			state: Mutex::new(WatchdogState {
				heap: BinaryHeap::new(),
				fired: HashSet::new(),
				cancelled: HashSet::new(),
				next_id: 0,
				next_seq: 0,
				shutdown: false,
			}),
			condvar: Condvar::new(),
		});
		let worker = watchdog.clone();
		std::thread::Builder::new()
			.name("byteflow-timeout-watchdog".into())
			.spawn(move || worker.run())
			.expect("failed to spawn timeout watchdog thread");
		watchdog
	}

	fn register(&self, wake_at: Instant, callback: Arc<dyn Fn() + Send + Sync>) -> u64 {
		let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
		let id = state.next_id;
		state.next_id += 1;
		let seq = state.next_seq;
		state.next_seq += 1;
		let wakes_watchdog_now = state.heap.peek().map_or(true, |Reverse(n)| wake_at < n.wake_at);
		state.heap.push(Reverse(ScheduledNode { wake_at, seq, id, callback }));
		log::debug!("registered timeout node {id}, wake in {:?}", wake_at.saturating_duration_since(Instant::now()));
		if wakes_watchdog_now {
			self.condvar.notify_all();
		}
		id
	}

	/// Deregisters `id`, returning `true` iff the watchdog had already fired
	/// it.
	fn deregister(&self, id: u64) -> bool {
		let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
		if state.fired.remove(&id) {
			true
		} else {
			state.cancelled.insert(id);
			false
		}
	}

	fn run(&self) {
		let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
		loop {
			if state.shutdown {
				return;
			}
			match state.heap.peek() {
				None => {
					state = self.condvar.wait(state).unwrap_or_else(|e| e.into_inner());
				}
				Some(Reverse(node)) => {
					let now = Instant::now();
					if node.wake_at <= now {
						let Reverse(node) = state.heap.pop().expect("peeked above");
						if state.cancelled.remove(&node.id) {
							continue;
						}
						state.fired.insert(node.id);
						log::debug!("timeout watchdog firing node {}", node.id);
						drop(state);
						(node.callback)();
						state = self.state.lock().unwrap_or_else(|e| e.into_inner());
					} else {
						let wait_for = node.wake_at - now;
						let (guard, _) = self.condvar.wait_timeout(state, wait_for).unwrap_or_else(|e| e.into_inner());
						state = guard;
					}
				}
			}
		}
	}

	fn shutdown(&self) {
		let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
		state.shutdown = true;
		self.condvar.notify_all();
	}
}

static WATCHDOG: OnceLock<Arc<Watchdog>> = OnceLock::new();

fn watchdog() -> &'static Arc<Watchdog> {
	WATCHDOG.get_or_init(Watchdog::new)
}

/// Shuts down the process-wide watchdog thread. Intended for clean process
/// teardown in embedders that need it (e.g. tests that want to assert no
/// stray threads remain); ordinary use never needs to call this.
pub fn shutdown_watchdog() {
	if let Some(w) = WATCHDOG.get() {
		w.shutdown();
	}
}

/// A handle returned by [`AsyncTimeout::enter`]; pass it to
/// [`AsyncTimeout::exit`] once the bracketed operation completes.
pub struct TimeoutNode {
	id: Option<u64>,
}

/// A watchdog for one resource's blocking operations. See the module docs.
pub struct AsyncTimeout {
	callback: Arc<dyn Fn() + Send + Sync>,
}

impl AsyncTimeout {
	/// Creates a watchdog whose `on_timeout` callback runs on the watchdog
	/// thread when a bracketed operation's deadline elapses. Keep this
	/// callback fast and non-blocking (e.g. closing a socket), since it runs
	/// synchronously inside the shared watchdog thread's loop.
	pub fn new(on_timeout: impl Fn() + Send + Sync + 'static) -> Self {
		Self { callback: Arc::new(on_timeout) }
	}

	/// Registers a wake time computed as the earliest of the current
	/// [`CancelScope`](crate::cancel::CancelScope)'s effective deadline and
	/// `default_timeout` from now. Returns a node carrying no registration
	/// at all if neither yields a deadline ("no timeout").
	pub fn enter(&self, default_timeout: Option<Duration>) -> TimeoutNode {
		let scope_deadline = CancelToken::current().effective_deadline();
		let timeout_deadline = default_timeout.map(|d| Instant::now() + d);
		let wake_at = match (scope_deadline, timeout_deadline) {
			(Some(a), Some(b)) => Some(a.min(b)),
			(Some(a), None) => Some(a),
			(None, Some(b)) => Some(b),
			(None, None) => None,
		};
		let id = wake_at.map(|at| watchdog().register(at, self.callback.clone()));
		TimeoutNode { id }
	}

	/// Deregisters `node`, returning `true` iff the watchdog had already
	/// fired its callback.
	pub fn exit(&self, node: TimeoutNode) -> bool {
		match node.id {
			Some(id) => watchdog().deregister(id),
			None => false,
		}
	}

	/// Runs `f` bracketed by `enter`/`exit`; if the watchdog fired before
	/// `f` returned, a `Closed`-classified error from `f` is upgraded to
	/// `Timeout` so the caller observes a deterministic classification.
	pub fn with_timeout<T>(&self, default_timeout: Option<Duration>, f: impl FnOnce() -> Result<T>) -> Result<T> {
		let node = self.enter(default_timeout);
		let result = f();
		let fired = self.exit(node);
		match result {
			Err(e) if fired => Err(e.upgrade_to_timeout()),
			other => other,
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use std::sync::atomic::{AtomicBool, Ordering};

	#[test]
	fn fires_after_timeout_elapses() {
		let fired = Arc::new(AtomicBool::new(false));
		let fired_cb = fired.clone();
		let watchdog = AsyncTimeout::new(move || fired_cb.store(true, Ordering::SeqCst));

		let node = watchdog.enter(Some(Duration::from_millis(20)));
		std::thread::sleep(Duration::from_millis(100));
		let already_fired = watchdog.exit(node);

		assert!(already_fired);
		assert!(fired.load(Ordering::SeqCst));
	}

	#[test]
	fn exit_before_deadline_never_fires() {
		let fired = Arc::new(AtomicBool::new(false));
		let fired_cb = fired.clone();
		let watchdog = AsyncTimeout::new(move || fired_cb.store(true, Ordering::SeqCst));

		let node = watchdog.enter(Some(Duration::from_secs(10)));
		let already_fired = watchdog.exit(node);

		assert!(!already_fired);
		std::thread::sleep(Duration::from_millis(20));
		assert!(!fired.load(Ordering::SeqCst));
	}

	#[test]
	fn no_timeout_registers_nothing() {
		let watchdog = AsyncTimeout::new(|| {});
		let node = watchdog.enter(None);
		assert!(!watchdog.exit(node));
	}
}
