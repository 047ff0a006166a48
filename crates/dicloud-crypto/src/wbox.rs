//! White-box transport codec.
//!
//! The outer envelope cipher is a table-driven AES variant whose key
//! schedule is baked into eight substitution tables (see [`crate::tables`]).
//! Blocks run through a nibble-wise lookup network: nine table rounds plus a
//! final substitution layer on encrypt, the inverse network on decrypt.
//! Mode is CBC with a zero IV and PKCS#7 padding.
//!
//! On the wire the ciphertext is carried as `"F"` + base64.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{CryptoError, CryptoResult};
use crate::tables::{self, WbTables};

const BLOCK: usize = 16;
const ZERO_IV: [u8; BLOCK] = [0u8; BLOCK];

/// Encodes and decodes transport envelopes with the embedded table set.
#[derive(Debug, Clone, Copy)]
pub struct WhiteBoxCodec {
    tables: WbTables,
}

impl WhiteBoxCodec {
    /// Build a codec over the embedded table artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact fails validation.
    pub fn new() -> CryptoResult<Self> {
        Ok(Self {
            tables: tables::embedded()?,
        })
    }

    /// Encrypt raw bytes: PKCS#7 pad, CBC over the table cipher, zero IV.
    #[must_use]
    pub fn encode(&self, plaintext: &[u8]) -> Vec<u8> {
        let padded = pkcs7_pad(plaintext);
        let mut out = vec![0u8; padded.len()];
        let mut prev = ZERO_IV;
        for (src, dst) in padded.chunks(BLOCK).zip(out.chunks_mut(BLOCK)) {
            let mut block = [0u8; BLOCK];
            for i in 0..BLOCK {
                block[i] = src[i] ^ prev[i];
            }
            let enc = encrypt_block(&self.tables, &block);
            dst.copy_from_slice(&enc);
            prev = enc;
        }
        out
    }

    /// Decrypt raw CBC ciphertext and strip padding.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is block-misaligned or the padding is
    /// invalid.
    pub fn decode(&self, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        if ciphertext.is_empty() {
            return Err(CryptoError::EmptyEnvelope);
        }
        if ciphertext.len() % BLOCK != 0 {
            return Err(CryptoError::BlockMisaligned(ciphertext.len()));
        }
        let mut out = vec![0u8; ciphertext.len()];
        let mut prev = ZERO_IV;
        for (src, dst) in ciphertext.chunks(BLOCK).zip(out.chunks_mut(BLOCK)) {
            let mut block = [0u8; BLOCK];
            block.copy_from_slice(src);
            let dec = decrypt_block(&self.tables, &block);
            for i in 0..BLOCK {
                dst[i] = dec[i] ^ prev[i];
            }
            prev = block;
        }
        pkcs7_strip(&mut out)?;
        Ok(out)
    }

    /// Encode plaintext into a wire envelope string (`F` + base64).
    #[must_use]
    pub fn encode_envelope(&self, plaintext: &[u8]) -> String {
        let ct = self.encode(plaintext);
        format!("F{}", STANDARD.encode(ct))
    }

    /// Decode a wire envelope string back to plaintext bytes.
    ///
    /// Tolerates embedded whitespace and the URL-safe base64 alphabet.
    ///
    /// # Errors
    ///
    /// Returns an error on a missing marker, bad base64, or bad ciphertext.
    pub fn decode_envelope(&self, envelope: &str) -> CryptoResult<Vec<u8>> {
        let payload = normalize_envelope(envelope)?;
        let ct = STANDARD
            .decode(payload.as_bytes())
            .map_err(|e| CryptoError::InvalidBase64(e.to_string()))?;
        self.decode(&ct)
    }
}

/// Strip whitespace, normalize the alphabet, drop the `F` marker, re-pad.
fn normalize_envelope(envelope: &str) -> CryptoResult<String> {
    let mut cleaned: String = envelope
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();

    if cleaned.is_empty() {
        return Err(CryptoError::EmptyEnvelope);
    }
    if !cleaned.starts_with('F') {
        return Err(CryptoError::MissingMarker);
    }
    cleaned.remove(0);
    let rem = cleaned.len() % 4;
    if rem != 0 {
        cleaned.extend(std::iter::repeat('=').take(4 - rem));
    }
    Ok(cleaned)
}

pub(crate) fn pkcs7_pad(data: &[u8]) -> Vec<u8> {
    let pad = BLOCK - (data.len() % BLOCK);
    let mut out = Vec::with_capacity(data.len() + pad);
    out.extend_from_slice(data);
    out.extend(std::iter::repeat(pad as u8).take(pad));
    out
}

pub(crate) fn pkcs7_strip(data: &mut Vec<u8>) -> CryptoResult<()> {
    let last = *data.last().ok_or(CryptoError::InvalidPadding)?;
    let pad = last as usize;
    if pad == 0 || pad > BLOCK || pad > data.len() {
        return Err(CryptoError::InvalidPadding);
    }
    if data[data.len() - pad..].iter().any(|&b| b != last) {
        return Err(CryptoError::InvalidPadding);
    }
    data.truncate(data.len() - pad);
    Ok(())
}

/// Transpose a 4x4 block into the working state layout (`col*8 + row`).
fn prepare_matrix(block: &[u8; BLOCK], state: &mut [u8; 32]) {
    for col in 0..4 {
        for row in 0..4 {
            state[col * 8 + row] = block[col + row * 4];
        }
    }
}

fn collect_output(state: &[u8; 32]) -> [u8; BLOCK] {
    let mut out = [0u8; BLOCK];
    for col in 0..4 {
        for row in 0..4 {
            out[col + row * 4] = state[col * 8 + row];
        }
    }
    out
}

/// Run one direction of the nibble XOR network over `temp64`.
fn xor_network(xor_table: &[u8], temp64: &[u8; 64], state: &mut [u8; 32], rnd: usize) {
    let mut chain = 1usize;
    for col in 0..4 {
        let mut pb = col;
        for row in 0..4 {
            let first = temp64[pb];
            let mut lo = (first & 0x0F) as usize;
            let mut hi = (first & 0xF0) as usize;
            let others = [temp64[pb + 0x10], temp64[pb + 0x20], temp64[pb + 0x30]];
            let base = row * 0x18 + rnd * 0x60;
            let mut step = chain;
            for b in others {
                let lo_idx = lo | (((b as usize) << 4) & 0xFF);
                hi = ((hi >> 4) | (((b as usize) >> 4) << 4)) & 0xFF;
                lo = (xor_table[(base + step - 1) * 256 + lo_idx] & 0x0F) as usize;
                hi = ((xor_table[(base + step) * 256 + hi] & 0x0F) << 4) as usize;
                step += 2;
            }
            state[row + col * 8] = (hi | lo) as u8;
            pb += 4;
        }
        chain += 6;
    }
}

/// Encrypt a single 16-byte block through the table network.
fn encrypt_block(tables: &WbTables, block: &[u8; BLOCK]) -> [u8; BLOCK] {
    let mut state = [0u8; 32];
    let mut temp64 = [0u8; 64];
    prepare_matrix(block, &mut state);

    for rnd in 0..9 {
        let round_base = rnd * 4;
        let mut perm_at = 0usize;
        for group in 0..4 {
            let perm = tables.perm_encrypt[perm_at] as usize;
            for word in 0..4 {
                let row = (perm + word) & 3;
                let byte = state[group * 8 + row] as usize;
                let idx = byte + (group + (round_base + row) * 4) * 256;
                temp64[group * 16 + word * 4..group * 16 + word * 4 + 4]
                    .copy_from_slice(&tables.round[idx * 4..idx * 4 + 4]);
            }
            perm_at += 2;
        }
        xor_network(tables.xor, &temp64, &mut state, rnd);
    }

    // Final substitution layer with per-column row rotation.
    let snapshot = state;
    for row in 0..4 {
        for col in 0..4 {
            let row_in = (col + row) & 3;
            let idx = snapshot[col * 8 + row_in] as usize + row_in * 0x400 + col * 0x100;
            state[col * 8 + row] = tables.final_[idx];
        }
    }

    collect_output(&state)
}

/// Decrypt a single 16-byte block through the inverse table network.
fn decrypt_block(tables: &WbTables, block: &[u8; BLOCK]) -> [u8; BLOCK] {
    let mut state = [0u8; 32];
    let mut temp64 = [0u8; 64];
    prepare_matrix(block, &mut state);

    for rnd in (1..=9).rev() {
        let round_base = rnd * 4;
        let mut perm_at = 0usize;
        for group in 0..4 {
            let perm = tables.perm_decrypt[perm_at] as usize;
            for word in 0..4 {
                let row = (perm + word) & 3;
                let byte = state[group * 8 + row] as usize;
                let idx = byte + (group + (round_base + row) * 4) * 256;
                temp64[group * 16 + word * 4..group * 16 + word * 4 + 4]
                    .copy_from_slice(&tables.inv_round[idx * 4..idx * 4 + 4]);
            }
            perm_at += 2;
        }
        xor_network(tables.inv_xor, &temp64, &mut state, rnd);
    }

    // First-layer inverse: per-column rotated byte substitution.
    let snapshot = state;
    for row in 0..4 {
        for col in 0..4 {
            let row_in = (row + 4 - col) & 3;
            let idx = snapshot[col * 8 + row_in] as usize + row_in * 0x400 + col * 0x100;
            state[col * 8 + row] = tables.inv_first[idx];
        }
    }

    collect_output(&state)
}
