//! Envelope cryptography for the dicloud telematics client.
//!
//! Every request and push message to the vehicle cloud passes through two
//! cipher layers plus a signing scheme; this crate provides all three as
//! synchronous, I/O-free building blocks.
//!
//! # Layers
//!
//! - **Outer codec** ([`wbox`]) - a table-driven white-box AES variant in
//!   CBC mode (zero IV, PKCS#7) whose key schedule ships as a fixed binary
//!   artifact ([`tables`]). Ciphertext travels as `"F"` + base64.
//! - **Inner cipher** ([`aes`]) - AES-128-CBC (zero IV, PKCS#7) over the
//!   session content key, exchanged as uppercase hex.
//! - **Signing** ([`sign`], [`digest`]) - canonical-sorted SHA-1 request
//!   signatures and the MD5 checkcode, both uppercase hex.
//!
//! # Example: envelope round trip
//!
//! ```rust
//! use dicloud_crypto::wbox::WhiteBoxCodec;
//!
//! let codec = WhiteBoxCodec::new().unwrap();
//! let env = codec.encode_envelope(b"{\"code\":\"0\"}");
//! assert!(env.starts_with('F'));
//! assert_eq!(codec.decode_envelope(&env).unwrap(), b"{\"code\":\"0\"}");
//! ```

pub mod aes;
pub mod digest;
pub mod error;
pub mod sign;
pub mod tables;
pub mod wbox;

pub use error::{CryptoError, CryptoResult};
pub use wbox::WhiteBoxCodec;
