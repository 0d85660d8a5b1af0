//! Base64URL encoding and decoding
//!
//! The URL-safe, unpadded Base64 variant used for JWT segments, PKCE
//! challenges, and JWK parameters. Encoding goes through the `base64`
//! crate's `URL_SAFE_NO_PAD` engine; decoding translates back to the
//! standard alphabet and re-pads explicitly so that wire data with stray
//! padding still decodes and truncated input fails loudly.

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};

use crate::errors::{JoseError, Result};

/// Encode bytes as unpadded URL-safe Base64
pub fn encode(data: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode an unpadded URL-safe Base64 string to bytes
///
/// Accepts input with or without trailing padding. A length of 1 (mod 4)
/// cannot come from any byte string and fails with [`JoseError::Decode`].
///
/// # Errors
/// Returns [`JoseError::Decode`] on malformed input.
pub fn decode(input: &str) -> Result<Vec<u8>> {
    let translated: String = input
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();

    let padded = match translated.len() % 4 {
        0 => translated,
        2 => format!("{translated}=="),
        3 => format!("{translated}="),
        _ => {
            return Err(JoseError::decode(
                "Base64URL input has length 1 (mod 4), which no byte string produces",
            ));
        }
    };

    STANDARD
        .decode(padded.as_bytes())
        .map_err(|e| JoseError::decode(format!("invalid Base64URL input: {e}")))
}

/// Decode an unpadded URL-safe Base64 string to text
///
/// Non-UTF-8 bytes are replaced rather than rejected, mirroring the
/// tolerance legacy callers expect from codepage-decoded text.
///
/// # Errors
/// Returns [`JoseError::Decode`] on malformed Base64URL input.
pub fn decode_text(input: &str) -> Result<String> {
    Ok(String::from_utf8_lossy(&decode(input)?).into_owned())
}
