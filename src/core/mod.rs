//! Pure protocol pieces: wire vocabulary, sanitization, proofs, links.

pub mod keys;
pub mod link;
pub mod proof;
pub mod protocol;
pub mod sanitize;

/// Random 128-bit id, hex encoded.
pub fn random_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}
