// SPDX-License-Identifier: Apache-2.0

//! End-to-end scenarios exercising more than one module together.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use byteflow::{
	Buffer, CancelScope, Error, RawReader, RawWriter, Reader, Result, TaskRunner,
	TaskRunnerOptions, Writer,
};

#[test]
fn s1_round_trips_a_short_write_through_utf8() {
	let mut buffer = Buffer::new();
	buffer.write_utf8("abcdef");
	let mut out = String::new();
	buffer.read_utf8(&mut out, 6);
	assert_eq!(out, "abcdef");
	assert_eq!(buffer.count(), 0);
}

#[test]
fn s2_snapshot_survives_clearing_the_source_buffer() {
	let mut buffer = Buffer::new();
	let chunk = vec![0xABu8; 2500];
	for _ in 0..8 {
		buffer.write_from_slice(&chunk);
	}
	assert_eq!(buffer.count(), 20_000);

	let snapshot = buffer.snapshot();
	buffer.clear();
	assert_eq!(buffer.count(), 0);

	assert_eq!(snapshot.len(), 20_000);
	assert_eq!(snapshot.to_vec(), vec![0xABu8; 20_000]);
	let total: usize = snapshot.shared_segments().unwrap().iter().map(|s| s.len()).sum();
	assert_eq!(total, 20_000);
}

#[test]
fn s3_decodes_an_invalid_start_byte_as_replacement_character() {
	let mut buffer = Buffer::new();
	buffer.write_from_slice(&[0xC0]);
	let mut out = String::new();
	let consumed = buffer.read_utf8(&mut out, 1);
	assert_eq!(out, "\u{FFFD}");
	assert_eq!(consumed, 1);
	assert_eq!(buffer.count(), 0);
}

#[test]
fn s4_encodes_and_decodes_a_four_byte_code_point() {
	let mut buffer = Buffer::new();
	buffer.write_utf8("\u{1F369}");
	assert_eq!(buffer.snapshot().to_vec(), vec![0xF0, 0x9F, 0x8D, 0xA9]);
	let mut out = String::new();
	buffer.read_utf8(&mut out, 4);
	assert_eq!(out, "\u{1F369}");
}

#[test]
fn s5_idle_latch_only_fires_after_the_scheduled_task_completes() {
	let runner = TaskRunner::new(TaskRunnerOptions::default());
	let queue = runner.new_queue();
	let latch = queue.idle_latch();
	let done = Arc::new(AtomicBool::new(false));
	let done_in_task = done.clone();

	queue.schedule(Duration::from_millis(100), move || {
		done_in_task.store(true, Ordering::SeqCst);
		None
	});

	assert!(!latch.wait_timeout(Duration::from_millis(40)), "fired before the delay elapsed");
	assert!(latch.wait_timeout(Duration::from_secs(2)), "never became idle");
	assert!(done.load(Ordering::SeqCst));
}

struct SlowReader {
	remaining: usize,
	calls: usize,
}

impl RawReader for SlowReader {
	fn read_at_most_to(&mut self, sink: &mut Buffer, max_bytes: usize) -> Result<usize> {
		if self.remaining == 0 {
			return Ok(0);
		}
		self.calls += 1;
		std::thread::sleep(Duration::from_millis(1 + (self.calls % 5) as u64));
		let n = max_bytes.min(self.remaining).min(1024);
		sink.write_from_slice(&vec![0x5Au8; n]);
		self.remaining -= n;
		Ok(n)
	}
}

#[test]
fn s6_cancel_scope_timeout_interrupts_a_slow_reader() {
	let total = 256 * 1024;

	let ok = CancelScope::new().with_timeout(Duration::from_secs(10)).run(|| {
		let mut reader = Reader::new(SlowReader { remaining: total, calls: 0 });
		let mut read = 0usize;
		while !reader.exhausted()? {
			read += reader.read_byte_string(1024.min(total - read).max(1))?.len();
		}
		Ok::<_, Error>(read)
	});
	assert_eq!(ok.unwrap(), total);

	let timed_out = CancelScope::new().with_timeout(Duration::from_millis(5)).run(|| {
		let mut reader = Reader::new(SlowReader { remaining: total, calls: 0 });
		let mut read = 0usize;
		while !reader.exhausted()? {
			read += reader.read_byte_string(1024.min(total - read).max(1))?.len();
		}
		Ok::<_, Error>(read)
	});
	assert!(timed_out.unwrap_err().is_timeout());
}

struct ShiftSink {
	shift: u8,
	out: Vec<u8>,
}

impl RawWriter for ShiftSink {
	fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result<()> {
		source.with_cursor_mut(|chunk| {
			for b in chunk.iter_mut() {
				*b = b.wrapping_sub(self.shift);
			}
		});
		let mut buf = vec![0u8; byte_count];
		source.read_into_slice_exact(&mut buf)?;
		self.out.extend_from_slice(&buf);
		Ok(())
	}

	fn flush(&mut self) -> Result<()> {
		Ok(())
	}
}

struct ShiftSource {
	shift: u8,
	data: Vec<u8>,
	pos: usize,
}

impl RawReader for ShiftSource {
	fn read_at_most_to(&mut self, sink: &mut Buffer, max_bytes: usize) -> Result<usize> {
		let remaining = self.data.len() - self.pos;
		let n = max_bytes.min(remaining);
		if n == 0 {
			return Ok(0);
		}
		sink.write_from_slice(&self.data[self.pos..self.pos + n]);
		self.pos += n;
		sink.with_cursor_mut(|chunk| {
			for b in chunk.iter_mut() {
				*b = b.wrapping_add(self.shift);
			}
		});
		Ok(n)
	}
}

#[test]
fn s7_shift_cipher_round_trips_through_the_buffer_cursor() {
	let message = b"the quick brown fox jumps over it!!";
	assert_eq!(message.len(), 35);
	let shift = 7u8;

	let mut writer = Writer::new(ShiftSink { shift, out: Vec::new() });
	writer.write_bytes(message).unwrap();
	writer.flush().unwrap();
	let encrypted = writer.sink().out.clone();
	assert_ne!(encrypted, message);

	let mut reader = Reader::new(ShiftSource { shift, data: encrypted, pos: 0 });
	let decrypted = reader.read_byte_string(message.len()).unwrap();
	assert_eq!(decrypted.to_vec(), message);
}
