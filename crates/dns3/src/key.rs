//! Resolution server public keys

use std::fmt;
use std::str::FromStr;

use crate::errors::{ResolverError, Result};

pub const PUBLIC_KEY_SIZE: usize = 32;

/// Public key of the default resolution server, hex encoded.
pub const DEFAULT_RESOLVER_KEY_HEX: &str =
    "57AA48BB8CB1CC9FC67837964A28DB0184137E37BB158B5409815382F9257FBF";

const DEFAULT_RESOLVER_KEY: [u8; PUBLIC_KEY_SIZE] = [
    0x57, 0xAA, 0x48, 0xBB, 0x8C, 0xB1, 0xCC, 0x9F, 0xC6, 0x78, 0x37, 0x96, 0x4A, 0x28, 0xDB, 0x01,
    0x84, 0x13, 0x7E, 0x37, 0xBB, 0x15, 0x8B, 0x54, 0x09, 0x81, 0x53, 0x82, 0xF9, 0x25, 0x7F, 0xBF,
];

/// Raw public key a resolver handle is bound to.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolverPublicKey([u8; PUBLIC_KEY_SIZE]);

impl ResolverPublicKey {
    pub const fn new(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub const fn default_key() -> Self {
        Self(DEFAULT_RESOLVER_KEY)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; PUBLIC_KEY_SIZE] =
            bytes
                .try_into()
                .map_err(|_| ResolverError::InvalidKeyLength {
                    expected: PUBLIC_KEY_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(Self(key))
    }

    /// Parse a hex key; case-insensitive, surrounding whitespace ignored.
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let raw = hex::decode(hex_key.trim())?;
        Self::from_slice(&raw)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl Default for ResolverPublicKey {
    fn default() -> Self {
        Self::default_key()
    }
}

impl FromStr for ResolverPublicKey {
    type Err = ResolverError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl fmt::Display for ResolverPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ResolverPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResolverPublicKey({})", self.to_hex())
    }
}

/// Key material accepted when binding a resolver: raw bytes or a hex string.
#[derive(Debug, Clone, Copy)]
pub enum KeySource<'a> {
    Key(ResolverPublicKey),
    Bytes(&'a [u8]),
    Hex(&'a str),
}

impl KeySource<'_> {
    pub fn into_key(self) -> Result<ResolverPublicKey> {
        match self {
            KeySource::Key(key) => Ok(key),
            KeySource::Bytes(bytes) => ResolverPublicKey::from_slice(bytes),
            KeySource::Hex(hex_key) => ResolverPublicKey::from_hex(hex_key),
        }
    }
}

impl From<ResolverPublicKey> for KeySource<'_> {
    fn from(key: ResolverPublicKey) -> Self {
        KeySource::Key(key)
    }
}

impl<'a> From<&'a [u8]> for KeySource<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        KeySource::Bytes(bytes)
    }
}

impl<'a> From<&'a [u8; PUBLIC_KEY_SIZE]> for KeySource<'a> {
    fn from(bytes: &'a [u8; PUBLIC_KEY_SIZE]) -> Self {
        KeySource::Bytes(bytes)
    }
}

impl<'a> From<&'a Vec<u8>> for KeySource<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self {
        KeySource::Bytes(bytes)
    }
}

impl<'a> From<&'a str> for KeySource<'a> {
    fn from(hex_key: &'a str) -> Self {
        KeySource::Hex(hex_key)
    }
}

impl<'a> From<&'a String> for KeySource<'a> {
    fn from(hex_key: &'a String) -> Self {
        KeySource::Hex(hex_key)
    }
}
