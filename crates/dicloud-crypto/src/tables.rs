//! Loader for the white-box substitution table artifact.
//!
//! The eight tables embedding the transport key schedule ship as a fixed
//! binary blob. The cipher consumes them as-is; nothing here derives or
//! regenerates table content.
//!
//! Container layout (all integers little-endian):
//!
//! ```text
//! magic   b"DWBT"                      4 bytes
//! version u16 (= 1)                    2 bytes
//! count   u16 (= 8)                    2 bytes
//! index   8 x (offset u32, len u32)   64 bytes
//! data    concatenated table bytes
//! ```

use std::sync::OnceLock;

use crate::error::{CryptoError, CryptoResult};

const MAGIC: &[u8; 4] = b"DWBT";
const VERSION: u16 = 1;
const TABLE_COUNT: usize = 8;
const HEADER_SIZE: usize = 8;
const INDEX_ENTRY_SIZE: usize = 8;

/// Expected byte length of each table, in artifact order.
const TABLE_SPECS: [(&str, usize); TABLE_COUNT] = [
    ("inv_round", 0x28000),
    ("inv_xor", 0x3C000),
    ("inv_first", 0x1000),
    ("round", 0x28000),
    ("xor", 0x3C000),
    ("final", 0x1000),
    ("perm_decrypt", 8),
    ("perm_encrypt", 8),
];

static ARTIFACT: &[u8] = include_bytes!("../data/wb_tables.bin");

static TABLES: OnceLock<WbTables> = OnceLock::new();

/// Borrowed views into the eight substitution tables.
#[derive(Debug, Clone, Copy)]
pub struct WbTables {
    pub inv_round: &'static [u8],
    pub inv_xor: &'static [u8],
    pub inv_first: &'static [u8],
    pub round: &'static [u8],
    pub xor: &'static [u8],
    pub final_: &'static [u8],
    pub perm_decrypt: &'static [u8],
    pub perm_encrypt: &'static [u8],
}

fn read_u16(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn parse(data: &'static [u8]) -> CryptoResult<WbTables> {
    if data.len() < HEADER_SIZE + TABLE_COUNT * INDEX_ENTRY_SIZE {
        return Err(CryptoError::TableArtifact("artifact too short".into()));
    }
    if &data[..4] != MAGIC {
        return Err(CryptoError::TableArtifact(format!(
            "bad magic {:02x?}",
            &data[..4]
        )));
    }
    let version = read_u16(data, 4);
    if version != VERSION {
        return Err(CryptoError::TableArtifact(format!(
            "unsupported version {version}"
        )));
    }
    let count = read_u16(data, 6) as usize;
    if count != TABLE_COUNT {
        return Err(CryptoError::TableArtifact(format!(
            "expected {TABLE_COUNT} tables, found {count}"
        )));
    }

    let mut slices: [&'static [u8]; TABLE_COUNT] = [&[]; TABLE_COUNT];
    for (i, (name, expected_len)) in TABLE_SPECS.iter().enumerate() {
        let at = HEADER_SIZE + i * INDEX_ENTRY_SIZE;
        let offset = read_u32(data, at) as usize;
        let len = read_u32(data, at + 4) as usize;
        if len != *expected_len {
            return Err(CryptoError::TableArtifact(format!(
                "table {name}: expected {expected_len} bytes, got {len}"
            )));
        }
        let end = offset
            .checked_add(len)
            .ok_or_else(|| CryptoError::TableArtifact(format!("table {name}: offset overflow")))?;
        if end > data.len() {
            return Err(CryptoError::TableArtifact(format!(
                "table {name}: extends beyond artifact"
            )));
        }
        slices[i] = &data[offset..end];
    }

    Ok(WbTables {
        inv_round: slices[0],
        inv_xor: slices[1],
        inv_first: slices[2],
        round: slices[3],
        xor: slices[4],
        final_: slices[5],
        perm_decrypt: slices[6],
        perm_encrypt: slices[7],
    })
}

/// Access the embedded tables, parsing and validating the artifact once.
///
/// # Errors
///
/// Returns an error if the embedded artifact fails validation. After the
/// first successful call this is infallible.
pub fn embedded() -> CryptoResult<WbTables> {
    if let Some(t) = TABLES.get() {
        return Ok(*t);
    }
    let parsed = parse(ARTIFACT)?;
    Ok(*TABLES.get_or_init(|| parsed))
}
