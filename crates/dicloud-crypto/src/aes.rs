//! Inner payload cipher: AES-128-CBC, zero IV, PKCS#7, hex-encoded.
//!
//! Keys are 32-hex-character strings, always an MD5 digest: `MD5(password)`
//! for the login exchange, `MD5(encryToken)` (the session content key) for
//! everything after. Ciphertext travels inside the envelope as uppercase hex.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::error::{CryptoError, CryptoResult};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

const KEY_HEX_LEN: usize = 32;
const ZERO_IV: [u8; 16] = [0u8; 16];

fn parse_key(key_hex: &str) -> CryptoResult<[u8; 16]> {
    let trimmed = key_hex.trim();
    if trimmed.len() != KEY_HEX_LEN {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_HEX_LEN,
            actual: trimmed.len(),
        });
    }
    let mut key = [0u8; 16];
    hex::decode_to_slice(trimmed, &mut key).map_err(|_| CryptoError::InvalidHex { field: "key" })?;
    Ok(key)
}

/// Encrypt a UTF-8 string, returning uppercase hex ciphertext.
///
/// # Errors
///
/// Returns an error if the key is not 32 hex characters.
pub fn encrypt_hex(plaintext: &str, key_hex: &str) -> CryptoResult<String> {
    let key = parse_key(key_hex)?;
    let ct = Aes128CbcEnc::new(&key.into(), &ZERO_IV.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
    Ok(hex::encode_upper(ct))
}

/// Decrypt hex ciphertext back to a UTF-8 string.
///
/// # Errors
///
/// Returns an error on a bad key, bad hex, bad padding, or non-UTF-8
/// plaintext.
pub fn decrypt_utf8(cipher_hex: &str, key_hex: &str) -> CryptoResult<String> {
    let key = parse_key(key_hex)?;
    let ct = hex::decode(cipher_hex.trim()).map_err(|_| CryptoError::InvalidHex {
        field: "ciphertext",
    })?;
    if ct.is_empty() || ct.len() % 16 != 0 {
        return Err(CryptoError::BlockMisaligned(ct.len()));
    }
    let plain = Aes128CbcDec::new(&key.into(), &ZERO_IV.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&ct)
        .map_err(|_| CryptoError::InvalidPadding)?;
    String::from_utf8(plain).map_err(|_| CryptoError::InvalidUtf8)
}
