//! Types for DNS3 alias resolution

use std::fmt;

use crate::key::PUBLIC_KEY_SIZE;
use crate::record;

/// Size of a peer address: public key, nospam, checksum.
pub const TOX_ADDRESS_SIZE: usize = PUBLIC_KEY_SIZE + 4 + 2;

/// Longest name the resolver library accepts; its length field is one byte.
pub const MAX_NAME_LEN: usize = u8::MAX as usize;

/// Long-term peer address recovered from a TXT record.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ToxAddress([u8; TOX_ADDRESS_SIZE]);

impl ToxAddress {
    pub const fn new(bytes: [u8; TOX_ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; TOX_ADDRESS_SIZE] {
        &self.0
    }

    /// The peer's long-term public key.
    pub fn public_key(&self) -> &[u8] {
        &self.0[..PUBLIC_KEY_SIZE]
    }

    pub fn nospam(&self) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.0[PUBLIC_KEY_SIZE..PUBLIC_KEY_SIZE + 4]);
        u32::from_be_bytes(raw)
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.0[TOX_ADDRESS_SIZE - 2], self.0[TOX_ADDRESS_SIZE - 1]])
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl fmt::Display for ToxAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ToxAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ToxAddress({})", self.to_hex())
    }
}

/// A generated resolution request.
///
/// `request_id` must be handed back unchanged when decrypting the answer; there is
/// no expiry, so correlation and timeouts are up to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dns3Request {
    pub request_id: u32,
    /// Encrypted label to look up, without the `_` prefix or `._tox` suffix.
    pub query_name: String,
}

impl Dns3Request {
    /// Full TXT query name under `domain`, e.g. `_<label>._tox.example.org`.
    pub fn query_name_for(&self, domain: &str) -> String {
        record::query_name(&self.query_name, domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_fields() {
        let mut raw = [0u8; TOX_ADDRESS_SIZE];
        raw[..32].copy_from_slice(&[0xAB; 32]);
        raw[32..36].copy_from_slice(&0xDEADBEEFu32.to_be_bytes());
        raw[36..].copy_from_slice(&[0x12, 0x34]);
        let address = ToxAddress::new(raw);

        assert_eq!(address.public_key(), &[0xAB; 32]);
        assert_eq!(address.nospam(), 0xDEADBEEF);
        assert_eq!(address.checksum(), 0x1234);
        assert_eq!(address.to_hex().len(), TOX_ADDRESS_SIZE * 2);
        assert!(address.to_hex().ends_with("DEADBEEF1234"));
    }
}
