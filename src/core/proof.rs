//! Connect proof: signed statement that the wallet owns an address, bound to
//! the requesting application's domain and a server-chosen payload.

use crate::error::{ConnectError, ConnectResult};
use crate::core::protocol::ProtocolError;
use sha2::{Digest, Sha256};

const PROOF_PREFIX: &[u8] = b"ton-proof-item-v2/";
const CONNECT_PREFIX: &[u8] = b"ton-connect";

/// Raw address `<workchain>:<64 hex chars>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAddress {
    pub workchain: i32,
    pub hash: [u8; 32],
}

impl RawAddress {
    pub fn parse(value: &str) -> ConnectResult<Self> {
        let (wc, hash_hex) = value
            .split_once(':')
            .ok_or_else(|| invalid(format!("address not in raw form: {value}")))?;
        let workchain: i32 = wc.parse().map_err(|_| invalid(format!("bad workchain: {wc}")))?;
        let bytes = hex::decode(hash_hex).map_err(|e| invalid(format!("bad address hash: {e}")))?;
        let hash: [u8; 32] = bytes
            .try_into()
            .map_err(|_| invalid("address hash must be 32 bytes".to_string()))?;
        Ok(Self { workchain, hash })
    }
}

fn invalid(message: String) -> ConnectError {
    ConnectError::Protocol(ProtocolError::bad_request(message))
}

/// Unsigned proof statement.
#[derive(Debug, Clone)]
pub struct ProofMessage {
    pub address: RawAddress,
    pub domain: String,
    pub timestamp: u64,
    pub payload: String,
}

impl ProofMessage {
    pub fn message_bytes(&self) -> Vec<u8> {
        let domain = self.domain.as_bytes();
        let mut out = Vec::with_capacity(PROOF_PREFIX.len() + 4 + 32 + 4 + domain.len() + 8 + self.payload.len());
        out.extend_from_slice(PROOF_PREFIX);
        out.extend_from_slice(&self.address.workchain.to_be_bytes());
        out.extend_from_slice(&self.address.hash);
        out.extend_from_slice(&(domain.len() as u32).to_le_bytes());
        out.extend_from_slice(domain);
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(self.payload.as_bytes());
        out
    }

    /// Bytes handed to the signer.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let inner = Sha256::digest(self.message_bytes());
        let mut full = Vec::with_capacity(2 + CONNECT_PREFIX.len() + 32);
        full.extend_from_slice(&[0xff, 0xff]);
        full.extend_from_slice(CONNECT_PREFIX);
        full.extend_from_slice(&inner);
        Sha256::digest(full).to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ProofMessage {
        ProofMessage {
            address: RawAddress { workchain: 0, hash: [7u8; 32] },
            domain: "app.example".into(),
            timestamp: 1_700_000_000,
            payload: "nonce".into(),
        }
    }

    #[test]
    fn parses_raw_address() {
        let addr = RawAddress::parse(&format!("-1:{}", "ab".repeat(32))).unwrap();
        assert_eq!(addr.workchain, -1);
        assert_eq!(addr.hash, [0xab; 32]);
        assert!(RawAddress::parse("EQabc").is_err());
        assert!(RawAddress::parse("0:abcd").is_err());
    }

    #[test]
    fn message_layout() {
        let bytes = sample().message_bytes();
        assert!(bytes.starts_with(PROOF_PREFIX));
        let mut at = PROOF_PREFIX.len();
        assert_eq!(&bytes[at..at + 4], &0i32.to_be_bytes());
        at += 4 + 32;
        assert_eq!(&bytes[at..at + 4], &11u32.to_le_bytes());
        at += 4;
        assert_eq!(&bytes[at..at + 11], b"app.example");
        at += 11;
        assert_eq!(&bytes[at..at + 8], &1_700_000_000u64.to_le_bytes());
        assert!(bytes.ends_with(b"nonce"));
    }

    #[test]
    fn signing_bytes_are_a_digest() {
        let a = sample().signing_bytes();
        let mut other = sample();
        other.payload = "other".into();
        assert_eq!(a.len(), 32);
        assert_ne!(a, other.signing_bytes());
    }
}
