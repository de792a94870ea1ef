// SPDX-License-Identifier: Apache-2.0

//! Framing-agnostic codec helpers operating on already-extracted text (a
//! line, a token) rather than a live [`Buffer`](crate::buffer::Buffer).
//! Buffer's own `read_decimal_long`/`read_hex_long` build on the same rules
//! as [`parse_decimal_i64`]/[`parse_hex_u64`] here; these free functions are
//! the entry points for callers that already hold a `&str`/[`ByteString`].

use base64::Engine;
use crate::byte_string::ByteString;
use crate::error::{Error, Result};

/// Parses an optional leading `-` followed by one or more ASCII digits.
pub fn parse_decimal_i64(text: &str) -> Result<i64> {
	text.trim().parse().map_err(|_| Error::numeric_format(format!("not a decimal integer: {text:?}")))
}

/// Parses `[0-9a-fA-F]+` as an unsigned integer.
pub fn parse_hex_u64(text: &str) -> Result<u64> {
	u64::from_str_radix(text.trim(), 16).map_err(|_| Error::numeric_format(format!("not a hex integer: {text:?}")))
}

/// Decodes lowercase or uppercase hex into bytes; rejects odd-length input.
pub fn decode_hex(text: &str) -> Result<ByteString> {
	if text.len() % 2 != 0 {
		return Err(Error::encoding(HexError::OddLength));
	}
	let mut out = vec![0u8; text.len() / 2];
	base16ct::mixed::decode(text, &mut out).map_err(|_| Error::encoding(HexError::Invalid))?;
	Ok(ByteString::from(out))
}

#[derive(Debug, thiserror::Error)]
enum HexError {
	#[error("odd-length hex string")]
	OddLength,
	#[error("invalid hex digit")]
	Invalid,
}

/// Decodes standard-alphabet base64. Padding is required unless the input
/// length is already a multiple of 4 (in which case no trailing `=` was ever
/// needed to begin with).
pub fn decode_base64(text: &str) -> Result<ByteString> {
	if text.len() % 4 != 0 {
		return Err(Error::encoding(Base64Error::MissingPadding));
	}
	base64::engine::general_purpose::STANDARD_NO_PAD
		.decode(text.trim_end_matches('='))
		.map(ByteString::from)
		.map_err(Error::encoding)
}

#[derive(Debug, thiserror::Error)]
enum Base64Error {
	#[error("base64 input is not padded to a multiple of 4 characters")]
	MissingPadding,
}

/// Decodes URL/filename-safe base64. Either padding convention is accepted.
pub fn decode_base64_url(text: &str) -> Result<ByteString> {
	base64::engine::general_purpose::URL_SAFE_NO_PAD
		.decode(text.trim_end_matches('='))
		.or_else(|_| base64::engine::general_purpose::URL_SAFE.decode(text))
		.map(ByteString::from)
		.map_err(Error::encoding)
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn decimal_round_trips() {
		assert_eq!(parse_decimal_i64("-42").unwrap(), -42);
		assert!(parse_decimal_i64("4x2").is_err());
	}

	#[test]
	fn hex_round_trips() {
		let bs = decode_hex("48656c6c6f").unwrap();
		assert_eq!(bs.to_vec(), b"Hello");
		assert!(decode_hex("abc").is_err());
	}

	#[test]
	fn base64_decodes_padded_input() {
		let padded = decode_base64("SGVsbG8=").unwrap();
		assert_eq!(padded.to_vec(), b"Hello");
	}

	#[test]
	fn base64_decodes_unpadded_input_when_already_a_multiple_of_four() {
		// 6 bytes encode to exactly 8 base64 characters; no padding is ever
		// needed for that length, regardless of content.
		let six_bytes = b"abcdef";
		let encoded = base64::engine::general_purpose::STANDARD_NO_PAD.encode(six_bytes);
		assert_eq!(encoded.len() % 4, 0);
		assert_eq!(decode_base64(&encoded).unwrap().to_vec(), six_bytes);
	}

	#[test]
	fn base64_rejects_unpadded_input_not_a_multiple_of_four() {
		assert!(decode_base64("SGVsbG8").is_err());
	}

	#[test]
	fn base64_url_decodes() {
		let bs = decode_base64_url("SGVsbG8").unwrap();
		assert_eq!(bs.to_vec(), b"Hello");
	}
}
