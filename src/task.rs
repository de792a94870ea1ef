// SPDX-License-Identifier: Apache-2.0

//! A FIFO-plus-scheduled task runner backing the watchdog and any other
//! deferred work a caller wants off the calling thread. A [`TaskRunner`]
//! owns a bounded worker pool and one scheduler thread; callers create one
//! or more [`TaskQueue`]s from it, each guaranteeing at most one of its own
//! tasks runs at a time while different queues run fully in parallel.

use std::any::Any;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::cancel::CancelScope;

/// Tunables for a [`TaskRunner`]'s worker pool.
#[derive(Copy, Clone, Debug)]
pub struct TaskRunnerOptions {
	/// The maximum number of FIFO worker threads spawned on demand.
	pub max_workers: usize,
	/// How long an idle worker waits for new work before exiting.
	pub idle_keep_alive: Duration,
}

impl Default for TaskRunnerOptions {
	fn default() -> Self {
		Self { max_workers: 8, idle_keep_alive: Duration::from_secs(60) }
	}
}

struct FifoTask {
	cancellable: bool,
	body: Box<dyn FnOnce() + Send>,
}

struct LocalSchedEntry {
	wake_at: Instant,
	seq: u64,
	cancellable: bool,
	body: Box<dyn FnMut() -> Option<Duration> + Send>,
}

impl PartialEq for LocalSchedEntry {
	fn eq(&self, other: &Self) -> bool { (self.wake_at, self.seq) == (other.wake_at, other.seq) }
}
impl Eq for LocalSchedEntry {}
impl PartialOrd for LocalSchedEntry {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> { Some(self.cmp(other)) }
}
impl Ord for LocalSchedEntry {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering { (self.wake_at, self.seq).cmp(&(other.wake_at, other.seq)) }
}

struct GlobalSchedEntry {
	wake_at: Instant,
	seq: u64,
	queue: Arc<QueueShared>,
}

impl PartialEq for GlobalSchedEntry {
	fn eq(&self, other: &Self) -> bool { (self.wake_at, self.seq) == (other.wake_at, other.seq) }
}
impl Eq for GlobalSchedEntry {}
impl PartialOrd for GlobalSchedEntry {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> { Some(self.cmp(other)) }
}
impl Ord for GlobalSchedEntry {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering { (self.wake_at, self.seq).cmp(&(other.wake_at, other.seq)) }
}

struct QueueState {
	fifo: VecDeque<FifoTask>,
	scheduled: BinaryHeap<Reverse<LocalSchedEntry>>,
	running: bool,
	in_ready_list: bool,
	drained: bool,
	cancel_active: bool,
	next_seq: u64,
}

struct QueueShared {
	runner: Arc<RunnerShared>,
	state: Mutex<QueueState>,
	idle_condvar: Condvar,
}

struct WorkState {
	ready: VecDeque<Arc<QueueShared>>,
	worker_count: usize,
	idle_workers: usize,
	shutdown: bool,
}

struct SchedulerState {
	heap: BinaryHeap<Reverse<GlobalSchedEntry>>,
	next_seq: u64,
	shutdown: bool,
}

struct RunnerShared {
	options: TaskRunnerOptions,
	work: Mutex<WorkState>,
	work_available: Condvar,
	scheduler: Mutex<SchedulerState>,
	scheduler_wake: Condvar,
}

/// A FIFO-plus-scheduled task executor with a bounded worker pool.
#[derive(Clone)]
pub struct TaskRunner {
	shared: Arc<RunnerShared>,
}

impl TaskRunner {
	/// Creates a runner and starts its scheduler thread. Worker threads are
	/// spawned lazily as work arrives, up to `options.max_workers`.
	pub fn new(options: TaskRunnerOptions) -> Self {
		let shared = Arc::new(RunnerShared {
			options,
			work: Mutex::new(WorkState { ready: VecDeque::new(), worker_count: 0, idle_workers: 0, shutdown: false }),
			work_available: Condvar::new(),
			scheduler: Mutex::new(SchedulerState { heap: BinaryHeap::new(), next_seq: 0, shutdown: false }),
			scheduler_wake: Condvar::new(),
		});
		let scheduler_handle = shared.clone();
		std::thread::Builder::new()
			.name("byteflow-task-scheduler".into())
			.spawn(move || scheduler_loop(scheduler_handle))
			.expect("failed to spawn task scheduler thread");
		Self { shared }
	}

	/// Creates a new queue backed by this runner.
	pub fn new_queue(&self) -> TaskQueue {
		TaskQueue {
			inner: Arc::new(QueueShared {
				runner: self.shared.clone(),
				state: Mutex::new(QueueState {
					fifo: VecDeque::new(),
					scheduled: BinaryHeap::new(),
					running: false,
					in_ready_list: false,
					drained: false,
					cancel_active: false,
					next_seq: 0,
				}),
				idle_condvar: Condvar::new(),
			}),
		}
	}
}

impl Default for TaskRunner {
	fn default() -> Self { Self::new(TaskRunnerOptions::default()) }
}

fn promote(runner: &Arc<RunnerShared>, queue: Arc<QueueShared>) {
	let mut work = runner.work.lock().unwrap_or_else(|e| e.into_inner());
	work.ready.push_back(queue);
	runner.work_available.notify_one();
	if work.idle_workers == 0 && work.worker_count < runner.options.max_workers {
		work.worker_count += 1;
		let handle = runner.clone();
		std::thread::Builder::new()
			.name("byteflow-task-worker".into())
			.spawn(move || worker_loop(handle))
			.expect("failed to spawn task worker thread");
	}
}

fn worker_loop(runner: Arc<RunnerShared>) {
	loop {
		let queue = {
			let mut work = runner.work.lock().unwrap_or_else(|e| e.into_inner());
			loop {
				if let Some(q) = work.ready.pop_front() {
					break Some(q);
				}
				if work.shutdown {
					break None;
				}
				work.idle_workers += 1;
				let (guard, timeout) = runner
					.work_available
					.wait_timeout(work, runner.options.idle_keep_alive)
					.unwrap_or_else(|e| e.into_inner());
				work = guard;
				work.idle_workers -= 1;
				if timeout.timed_out() && work.ready.is_empty() {
					work.worker_count -= 1;
					break None;
				}
			}
		};
		let Some(queue) = queue else { return };
		run_one_fifo_task(&queue);
	}
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
	if let Some(s) = payload.downcast_ref::<&str>() {
		s.to_string()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"non-string panic payload".to_string()
	}
}

fn run_one_fifo_task(queue: &Arc<QueueShared>) {
	let task = {
		let mut state = queue.state.lock().unwrap_or_else(|e| e.into_inner());
		state.in_ready_list = false;
		let task = state.fifo.pop_front();
		state.running = task.is_some();
		task
	};
	let Some(task) = task else {
		queue.idle_condvar.notify_all();
		return;
	};

	let _scope = CancelScope::new().enter();
	if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (task.body)())) {
		log::warn!("task queue worker caught a panicking task: {}", panic_message(&payload));
	}

	let mut state = queue.state.lock().unwrap_or_else(|e| e.into_inner());
	state.running = false;
	let more = !state.fifo.is_empty();
	if more && !state.in_ready_list {
		state.in_ready_list = true;
		drop(state);
		promote(&queue.runner, queue.clone());
	} else {
		drop(state);
	}
	queue.idle_condvar.notify_all();
}

fn mirror_schedule(runner: &Arc<RunnerShared>, queue: Arc<QueueShared>, wake_at: Instant, local_seq: u64) {
	let mut scheduler = runner.scheduler.lock().unwrap_or_else(|e| e.into_inner());
	let global_seq = scheduler.next_seq;
	scheduler.next_seq += 1;
	let is_new_earliest = scheduler.heap.peek().map_or(true, |Reverse(e)| wake_at < e.wake_at);
	let _ = local_seq;
	scheduler.heap.push(Reverse(GlobalSchedEntry { wake_at, seq: global_seq, queue }));
	if is_new_earliest {
		runner.scheduler_wake.notify_all();
	}
}

fn scheduler_loop(runner: Arc<RunnerShared>) {
	let mut state = runner.scheduler.lock().unwrap_or_else(|e| e.into_inner());
	loop {
		if state.shutdown {
			return;
		}
		match state.heap.peek() {
			None => {
				state = runner.scheduler_wake.wait(state).unwrap_or_else(|e| e.into_inner());
			}
			Some(Reverse(entry)) => {
				let now = Instant::now();
				if entry.wake_at <= now {
					let Reverse(entry) = state.heap.pop().expect("peeked above");
					drop(state);
					dispatch_due_scheduled(&runner, entry.queue);
					state = runner.scheduler.lock().unwrap_or_else(|e| e.into_inner());
				} else {
					let wait_for = entry.wake_at - now;
					let (guard, _) = runner.scheduler_wake.wait_timeout(state, wait_for).unwrap_or_else(|e| e.into_inner());
					state = guard;
				}
			}
		}
	}
}

fn dispatch_due_scheduled(runner: &Arc<RunnerShared>, queue: Arc<QueueShared>) {
	let due = {
		let mut state = queue.state.lock().unwrap_or_else(|e| e.into_inner());
		if state.running {
			// Another task from this queue (FIFO or scheduled) is running;
			// retry shortly instead of blocking the shared scheduler thread.
			if let Some(Reverse(mut entry)) = state.scheduled.pop() {
				entry.wake_at = Instant::now() + Duration::from_millis(1);
				let (wake_at, seq) = (entry.wake_at, entry.seq);
				state.scheduled.push(Reverse(entry));
				drop(state);
				mirror_schedule(runner, queue, wake_at, seq);
			}
			return;
		}
		let popped = state.scheduled.pop();
		if popped.is_some() {
			state.running = true;
		}
		popped
	};
	let Some(Reverse(mut entry)) = due else { return };

	let _scope = CancelScope::new().enter();
	let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (entry.body)()));
	drop(_scope);

	let next_delay = match outcome {
		Ok(delay) => delay,
		Err(payload) => {
			log::warn!("scheduled task panicked: {}", panic_message(&payload));
			None
		}
	};

	let mut state = queue.state.lock().unwrap_or_else(|e| e.into_inner());
	state.running = false;

	if let Some(delay) = next_delay {
		if !(state.drained && entry.cancellable) {
			let seq = state.next_seq;
			state.next_seq += 1;
			let wake_at = Instant::now() + delay;
			entry.wake_at = wake_at;
			entry.seq = seq;
			state.scheduled.push(Reverse(entry));
		}
	}

	let next_wake = state.scheduled.peek().map(|Reverse(next)| (next.wake_at, next.seq));
	let promote_fifo = !state.fifo.is_empty() && !state.in_ready_list;
	if promote_fifo {
		state.in_ready_list = true;
	}
	drop(state);

	if let Some((wake_at, seq)) = next_wake {
		mirror_schedule(runner, queue.clone(), wake_at, seq);
	}
	if promote_fifo {
		promote(runner, queue.clone());
	}
	queue.idle_condvar.notify_all();
}

/// One of a [`TaskRunner`]'s queues: an ordinary FIFO stream of one-shot
/// tasks, a stream of scheduled/repeating tasks, or both at once — at most
/// one task from a single `TaskQueue`, FIFO or scheduled, runs at a time.
#[derive(Clone)]
pub struct TaskQueue {
	inner: Arc<QueueShared>,
}

impl TaskQueue {
	fn execute_impl(&self, cancellable: bool, body: Box<dyn FnOnce() + Send>) -> bool {
		let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
		if state.drained && cancellable {
			return false;
		}
		let was_idle = !state.running && state.fifo.is_empty();
		state.fifo.push_back(FifoTask { cancellable, body });
		if !state.running && !state.in_ready_list {
			state.in_ready_list = true;
			drop(state);
			promote(&self.inner.runner, self.inner.clone());
		}
		was_idle
	}

	/// Enqueues `task` for immediate FIFO execution. Returns whether the
	/// queue was idle *before* this call — not whether the task was
	/// accepted, which (outside shutdown) it always is; this mirrors the
	/// distilled spec's documented deviation from a standard `offer`
	/// contract.
	pub fn execute(&self, task: impl FnOnce() + Send + 'static) -> bool {
		self.execute_impl(true, Box::new(task))
	}

	/// Schedules `task` to run after `delay`, and again after whatever
	/// delay it returns, until it returns `None`.
	pub fn schedule(&self, delay: Duration, task: impl FnMut() -> Option<Duration> + Send + 'static) {
		let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
		if state.drained {
			return;
		}
		let seq = state.next_seq;
		state.next_seq += 1;
		let wake_at = Instant::now() + delay;
		let is_new_earliest = state.scheduled.peek().map_or(true, |Reverse(e)| wake_at < e.wake_at);
		state.scheduled.push(Reverse(LocalSchedEntry { wake_at, seq, cancellable: true, body: Box::new(task) }));
		drop(state);
		if is_new_earliest {
			mirror_schedule(&self.inner.runner, self.inner.clone(), wake_at, seq);
		}
	}

	/// `true` once [`Self::cancel_all`] has been called and not superseded
	/// by new work; task bodies that want to cooperate with cancellation
	/// poll this themselves (it is independent of the thread-local
	/// [`CancelToken`](crate::cancel::CancelToken), since a queue's tasks
	/// may run on different worker threads over their lifetime).
	pub fn is_cancelled(&self) -> bool {
		self.inner.state.lock().unwrap_or_else(|e| e.into_inner()).cancel_active
	}

	/// Removes every not-yet-started cancellable task from this queue (both
	/// FIFO and scheduled) and marks the queue as having been cancelled.
	pub fn cancel_all(&self) {
		let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
		state.fifo.retain(|t| !t.cancellable);
		let remaining: Vec<LocalSchedEntry> =
			state.scheduled.drain().map(|Reverse(e)| e).filter(|e| !e.cancellable).collect();
		state.scheduled = remaining.into_iter().map(Reverse).collect();
		state.cancel_active = true;
	}

	/// Marks the queue as drained: no further cancellable submissions are
	/// accepted, though already-queued non-cancellable tasks still run.
	pub fn shutdown(&self) {
		self.inner.state.lock().unwrap_or_else(|e| e.into_inner()).drained = true;
	}

	/// Returns a handle that becomes ready once this queue has no running
	/// or pending (FIFO or scheduled) tasks.
	pub fn idle_latch(&self) -> IdleLatch { IdleLatch { inner: self.inner.clone() } }
}

/// See [`TaskQueue::idle_latch`].
pub struct IdleLatch {
	inner: Arc<QueueShared>,
}

impl IdleLatch {
	fn is_idle(state: &QueueState) -> bool { !state.running && state.fifo.is_empty() && state.scheduled.is_empty() }

	/// Blocks until the queue is idle.
	pub fn wait(&self) {
		let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
		while !Self::is_idle(&state) {
			state = self.inner.idle_condvar.wait(state).unwrap_or_else(|e| e.into_inner());
		}
	}

	/// Blocks until the queue is idle or `timeout` elapses, returning
	/// `true` iff it became idle in time.
	pub fn wait_timeout(&self, timeout: Duration) -> bool {
		let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
		let deadline = Instant::now() + timeout;
		while !Self::is_idle(&state) {
			let now = Instant::now();
			if now >= deadline {
				return false;
			}
			let (guard, _) = self.inner.idle_condvar.wait_timeout(state, deadline - now).unwrap_or_else(|e| e.into_inner());
			state = guard;
		}
		true
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	#[test]
	fn fifo_tasks_run_in_submission_order() {
		let runner = TaskRunner::default();
		let queue = runner.new_queue();
		let order = Arc::new(Mutex::new(Vec::new()));
		for i in 0..5 {
			let order = order.clone();
			queue.execute(move || order.lock().unwrap().push(i));
		}
		queue.idle_latch().wait();
		assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
	}

	#[test]
	fn scheduled_task_runs_after_delay() {
		let runner = TaskRunner::default();
		let queue = runner.new_queue();
		let ran = Arc::new(AtomicUsize::new(0));
		let ran_cb = ran.clone();
		let latch = queue.idle_latch();
		queue.schedule(Duration::from_millis(20), move || {
			ran_cb.fetch_add(1, Ordering::SeqCst);
			None
		});
		assert_eq!(ran.load(Ordering::SeqCst), 0, "must not have run immediately");
		assert!(latch.wait_timeout(Duration::from_secs(2)));
		assert_eq!(ran.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn fifo_task_submitted_during_a_scheduled_task_still_runs() {
		let runner = TaskRunner::default();
		let queue = runner.new_queue();
		let ran = Arc::new(AtomicUsize::new(0));

		queue.schedule(Duration::from_millis(30), || {
			std::thread::sleep(Duration::from_millis(60));
			None
		});
		std::thread::sleep(Duration::from_millis(50));

		let ran_cb = ran.clone();
		queue.execute(move || {
			ran_cb.fetch_add(1, Ordering::SeqCst);
		});

		assert!(queue.idle_latch().wait_timeout(Duration::from_secs(2)), "queue never went idle");
		assert_eq!(ran.load(Ordering::SeqCst), 1, "fifo task parked during a running scheduled task never ran");
	}

	#[test]
	fn cancel_all_drops_unstarted_tasks() {
		let runner = TaskRunner::default();
		let queue = runner.new_queue();
		let ran = Arc::new(AtomicUsize::new(0));
		// Block the queue with a slow first task so the rest are still queued when cancelled.
		queue.execute(|| std::thread::sleep(Duration::from_millis(50)));
		for _ in 0..3 {
			let ran = ran.clone();
			queue.execute(move || {
				ran.fetch_add(1, Ordering::SeqCst);
			});
		}
		queue.cancel_all();
		assert!(queue.is_cancelled());
		queue.idle_latch().wait();
		assert_eq!(ran.load(Ordering::SeqCst), 0);
	}
}
