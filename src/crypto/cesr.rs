//! Self-describing text encoding for keys, digests, signatures, and nonces.
//!
//! The raw bytes are left-padded with zero bytes, one per code character,
//! and base64url encoded; the leading characters, which encode only the
//! zero padding, are then replaced by the code. The text length therefore
//! equals the base64 length of the padded value.

use crate::error::{Error, Result};
use base64ct::{Base64UrlUnpadded, Encoding};

pub const BLAKE3_256: &str = "E";
pub const ED25519_PUBLIC: &str = "D";
pub const ED25519_SIGNATURE: &str = "0B";
pub const SALT_128: &str = "0A";

/// Length of every two-character-coded 64-byte signature.
pub const SIGNATURE_64_LENGTH: usize = 88;

#[must_use]
pub fn encode(code: &str, raw: &[u8]) -> String {
    let pad = code.len();
    let mut padded = vec![0u8; pad];
    padded.extend_from_slice(raw);

    let encoded = Base64UrlUnpadded::encode_string(&padded);
    format!("{code}{}", &encoded[pad..])
}

/// Decode `text`, requiring `code` and a raw payload of exactly `size` bytes.
///
/// # Errors
/// Returns [`Error::InvalidEncoding`] when the code, alphabet, or length is wrong.
pub fn decode(subject: &str, code: &str, text: &str, size: usize) -> Result<Vec<u8>> {
    let body = text
        .strip_prefix(code)
        .ok_or_else(|| Error::encoding(subject, format!("expected code {code}")))?;

    let pad = code.len();
    let padded = format!("{}{body}", "A".repeat(pad));
    let bytes = Base64UrlUnpadded::decode_vec(&padded).map_err(|err| Error::encoding(subject, err))?;

    if bytes.len() != pad + size {
        return Err(Error::encoding(
            subject,
            format!("expected {size} bytes, got {}", bytes.len().saturating_sub(pad)),
        ));
    }
    if bytes[..pad].iter().any(|byte| *byte != 0) {
        return Err(Error::encoding(subject, "non-zero lead bytes"));
    }

    Ok(bytes[pad..].to_vec())
}

/// Length of the signature a text value starts with, judged by its code.
#[must_use]
pub fn signature_length(text: &str) -> Option<usize> {
    match text.get(..2)? {
        // Ed25519, secp256k1, and P-256 signatures are all 64 raw bytes.
        "0B" | "0C" | "0I" => Some(SIGNATURE_64_LENGTH),
        _ => None,
    }
}
