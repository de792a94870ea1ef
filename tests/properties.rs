// SPDX-License-Identifier: Apache-2.0

//! Property-based tests for the round-trip/equality invariants enumerated in
//! the crate's testable-properties list: UTF-8 round-tripping and malformed
//! tolerance, base64/hex round-tripping, cross-representation equality and
//! hashing, and buffer/snapshot isolation.

use quickcheck::TestResult;
use quickcheck_macros::quickcheck;

use byteflow::{decode_base64, decode_base64_url, decode_hex, Buffer, ByteString};

/// Item 3: for every valid Unicode string, decoding what was just encoded
/// yields the original string back.
#[quickcheck]
fn utf8_round_trips_valid_strings(text: String) -> bool {
	let mut buffer = Buffer::new();
	buffer.write_utf8(&text);
	let mut out = String::new();
	let consumed = buffer.read_utf8(&mut out, text.len());
	consumed == text.len() && out == text
}

/// Item 4: decoding any byte sequence terminates, never yields more
/// replacement characters than input bytes, and consumes every malformed
/// byte one at a time.
#[quickcheck]
fn utf8_lossy_decode_is_bounded_and_terminates(bytes: Vec<u8>) -> bool {
	let mut buffer = Buffer::new();
	buffer.write_from_slice(&bytes);
	let mut out = String::new();
	let mut total_consumed = 0;
	loop {
		let remaining = bytes.len() - total_consumed;
		if remaining == 0 {
			break;
		}
		let consumed = buffer.read_utf8(&mut out, remaining);
		if consumed == 0 {
			// A trailing incomplete sequence that can never be completed
			// (no more bytes are coming); stop here, as a Reader would once
			// upstream is exhausted.
			break;
		}
		total_consumed += consumed;
	}
	let replacement_count = out.chars().filter(|&c| c == '\u{FFFD}').count();
	replacement_count <= bytes.len()
}

/// Item 5: hex and base64/base64url round-trip any byte sequence.
#[quickcheck]
fn hex_round_trips(bytes: Vec<u8>) -> bool {
	let bs = ByteString::from(bytes.as_slice());
	decode_hex(&bs.hex_lower()).unwrap().to_vec() == bytes
}

#[quickcheck]
fn base64_round_trips(bytes: Vec<u8>) -> bool {
	let bs = ByteString::from(bytes.as_slice());
	decode_base64(&bs.base64()).unwrap().to_vec() == bytes
}

#[quickcheck]
fn base64_url_round_trips(bytes: Vec<u8>) -> bool {
	let bs = ByteString::from(bytes.as_slice());
	decode_base64_url(&bs.base64_url()).unwrap().to_vec() == bytes
}

/// Item 6: equal byte strings hash equally, regardless of whether either
/// side is a `Dense` or a `Segmented` representation, and equality tracks
/// byte content only.
#[quickcheck]
fn equal_byte_strings_hash_equally(bytes: Vec<u8>, extra: u8) -> bool {
	use std::collections::hash_map::DefaultHasher;
	use std::hash::{Hash, Hasher};

	let dense = ByteString::from(bytes.as_slice());

	let mut buffer = Buffer::new();
	buffer.write_from_slice(&bytes);
	let segmented = buffer.snapshot();

	let same_content = dense == segmented;
	let hash_of = |bs: &ByteString| {
		let mut hasher = DefaultHasher::new();
		bs.hash(&mut hasher);
		hasher.finish()
	};
	let hashes_match = hash_of(&dense) == hash_of(&segmented);

	let mut different = bytes.clone();
	different.push(extra);
	let different_bs = ByteString::from(different.as_slice());
	let not_equal_to_longer = dense != different_bs;

	same_content && hashes_match && not_equal_to_longer
}

/// Item 9: a snapshot is unaffected by subsequent writes to (or clearing of)
/// the buffer it was taken from, and vice versa.
#[quickcheck]
fn snapshot_is_independent_of_later_buffer_mutation(first: Vec<u8>, second: Vec<u8>) -> TestResult {
	if first.is_empty() {
		return TestResult::discard();
	}
	let mut buffer = Buffer::new();
	buffer.write_from_slice(&first);
	let snapshot = buffer.snapshot();

	buffer.write_from_slice(&second);
	buffer.skip_all();

	TestResult::from_bool(snapshot.to_vec() == first && buffer.is_empty())
}
