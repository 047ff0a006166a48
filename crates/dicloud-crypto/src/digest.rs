//! MD5 / SHA-1 helpers used for key derivation and request signing.
//!
//! The service derives every symmetric key and signature from these two
//! digests; all values travel as uppercase hex.

use md5::{Digest, Md5};
use sha1::Sha1;

/// Uppercase-hex MD5 of a UTF-8 string.
#[must_use]
pub fn md5_hex_upper(value: &str) -> String {
    hex::encode_upper(Md5::digest(value.as_bytes()))
}

/// Uppercase-hex SHA-1 of a UTF-8 string.
#[must_use]
pub fn sha1_hex_upper(value: &str) -> String {
    hex::encode_upper(Sha1::digest(value.as_bytes()))
}
