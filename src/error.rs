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

//! The crate-wide error taxonomy (see the module docs on [`crate`] for the
//! overview). Every fallible operation in this crate returns [`Error`], whose
//! [`ErrorKind`] classifies the failure the way callers actually need to
//! react to it rather than exposing a type hierarchy.

use std::fmt;
use std::io;
use amplify_derive::Display;
use simdutf8::compat::Utf8Error as CompatUtf8Error;

pub type Result<T = ()> = std::result::Result<T, Error>;

/// A coarse classification of what went wrong. Bounds violations are a
/// programmer error and are signaled by panicking instead of this enum; see
/// the module docs for the full rationale.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum ErrorKind {
	/// The requested byte count could not be met before the source was
	/// exhausted.
	#[display("premature end of stream")]
	Eof,
	/// A [`CancelScope`](crate::cancel::CancelScope) deadline or timeout, or
	/// an [`AsyncTimeout`](crate::timeout::AsyncTimeout) watchdog, elapsed.
	#[display("deadline or timeout elapsed")]
	Timeout,
	/// The operation's scope was cancelled.
	#[display("operation was cancelled")]
	Interrupted,
	/// The stream or resource was already closed.
	#[display("stream is closed")]
	Closed,
	/// Malformed encoded text where substitution is not permitted.
	#[display("invalid character encoding")]
	CharacterCoding,
	/// An integer or decimal token failed to parse.
	#[display("invalid numeric format")]
	NumericFormat,
	/// Any other I/O failure from an upstream or downstream collaborator.
	#[display("I/O error")]
	GenericIo,
}

/// The crate's unified error type: an [`ErrorKind`] plus an optional
/// underlying cause.
#[derive(Debug, Display)]
#[display("{kind}")]
pub struct Error {
	kind: ErrorKind,
	source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
	fn new(kind: ErrorKind, source: Option<Box<dyn std::error::Error + Send + Sync>>) -> Self {
		Self { kind, source }
	}

	/// Returns the error's classification.
	pub fn kind(&self) -> ErrorKind { self.kind }

	/// Creates an end-of-stream error.
	pub fn eof() -> Self { Self::new(ErrorKind::Eof, None) }

	/// Creates a timeout error.
	pub fn timeout() -> Self { Self::new(ErrorKind::Timeout, None) }

	/// Creates an interruption (cancellation) error.
	pub fn interrupted() -> Self { Self::new(ErrorKind::Interrupted, None) }

	/// Creates a closed-resource error.
	pub fn closed() -> Self { Self::new(ErrorKind::Closed, None) }

	/// Creates a character-coding error from an offset UTF-8 decode failure.
	pub fn character_coding(error: OffsetUtf8Error) -> Self {
		Self::new(ErrorKind::CharacterCoding, Some(Box::new(error)))
	}

	/// Creates a character-coding error from any other malformed-encoding
	/// cause (e.g. a bad hex digit or base64 alphabet character).
	pub fn encoding(source: impl std::error::Error + Send + Sync + 'static) -> Self {
		Self::new(ErrorKind::CharacterCoding, Some(Box::new(source)))
	}

	/// Creates a numeric-format error with a message describing the token.
	pub fn numeric_format(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::NumericFormat, Some(Box::new(FormatMessage(message.into()))))
	}

	/// Wraps any other I/O failure.
	pub fn generic_io(source: impl std::error::Error + Send + Sync + 'static) -> Self {
		Self::new(ErrorKind::GenericIo, Some(Box::new(source)))
	}

	/// Returns `true` if this is an [`ErrorKind::Eof`] error.
	pub fn is_eof(&self) -> bool { matches!(self.kind, ErrorKind::Eof) }

	/// Returns `true` if this is a [`ErrorKind::Timeout`] error.
	pub fn is_timeout(&self) -> bool { matches!(self.kind, ErrorKind::Timeout) }

	/// Upgrades a [`ErrorKind::Closed`] error to [`ErrorKind::Timeout`], used
	/// by the watchdog to make a timed-out blocking call deterministically
	/// report a timeout even if the resource only reported being closed.
	pub fn upgrade_to_timeout(self) -> Self {
		match self.kind {
			ErrorKind::Closed => Self::timeout(),
			_ => self,
		}
	}

	/// Converts this error into a [`std::io::Error`], preserving the
	/// classification where `io::ErrorKind` has an equivalent.
	pub fn into_io(self) -> io::Error {
		match self.kind {
			ErrorKind::Eof => io::Error::new(io::ErrorKind::UnexpectedEof, self),
			ErrorKind::Timeout => io::Error::new(io::ErrorKind::TimedOut, self),
			ErrorKind::Interrupted => io::Error::new(io::ErrorKind::Interrupted, self),
			ErrorKind::Closed => io::Error::new(io::ErrorKind::NotConnected, self),
			_ => io::Error::other(self),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		self.source.as_deref().map(|e| e as _)
	}
}

impl From<io::Error> for Error {
	fn from(value: io::Error) -> Self {
		if let io::ErrorKind::UnexpectedEof = value.kind() {
			Self::eof()
		} else {
			Self::generic_io(value)
		}
	}
}

#[derive(Debug)]
struct FormatMessage(String);

impl fmt::Display for FormatMessage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl std::error::Error for FormatMessage {}

/// A UTF-8 decode error carrying the byte offset into the original input at
/// which decoding failed, and the offending byte sequence.
#[derive(Copy, Clone, Debug, thiserror::Error)]
#[error("{kind} UTF-8 byte sequence ({bytes:X?}) at offset {valid_up_to}")]
pub struct OffsetUtf8Error {
	/// The length of the valid prefix before the error.
	pub valid_up_to: usize,
	/// The invalid or incomplete byte sequence, zero-padded.
	pub bytes: [u8; 4],
	/// The number of meaningful bytes in `bytes`.
	pub count: usize,
	pub kind: Utf8ErrorKind,
}

#[derive(Copy, Clone, Debug, Display)]
pub enum Utf8ErrorKind {
	#[display("invalid")]
	Invalid,
	#[display("incomplete")]
	Incomplete,
}

impl OffsetUtf8Error {
	pub(crate) fn new(offset: usize, bytes: &[u8], kind: Utf8ErrorKind) -> Self {
		let mut buf = [0u8; 4];
		let count = bytes.len().min(4);
		buf[..count].copy_from_slice(&bytes[..count]);
		Self { valid_up_to: offset, bytes: buf, count, kind }
	}

	/// The offending byte sequence.
	pub fn bytes(&self) -> &[u8] { &self.bytes[..self.count] }
}

impl From<(CompatUtf8Error, &[u8], usize)> for OffsetUtf8Error {
	fn from((err, bytes, base): (CompatUtf8Error, &[u8], usize)) -> Self {
		let valid_up_to = err.valid_up_to();
		let offending = match err.error_len() {
			Some(len) => &bytes[valid_up_to..valid_up_to + len],
			None => &bytes[valid_up_to..],
		};
		let kind = if err.error_len().is_some() { Utf8ErrorKind::Invalid } else { Utf8ErrorKind::Incomplete };
		Self::new(base + valid_up_to, offending, kind)
	}
}
