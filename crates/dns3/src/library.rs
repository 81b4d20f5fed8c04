//! The DNS3 resolver library surface.
//!
//! Four calls, mirroring the native library: create a handle bound to a server
//! key, destroy it, generate an encrypted request for a name, and decrypt the
//! server's TXT answer. Status codes are passed through untouched; the client maps
//! them onto [`ResolverError`](crate::ResolverError).

use crate::key::{ResolverPublicKey, PUBLIC_KEY_SIZE};
use crate::types::TOX_ADDRESS_SIZE;

const REQUEST_ID_SIZE: usize = 4;
const MAC_SIZE: usize = 16;
const BASE32_GROUP_BYTES: usize = 5;
const BASE32_GROUP_CHARS: usize = 8;
const DOT_INTERVAL: usize = 6 * BASE32_GROUP_BYTES;

pub trait Dns3Library: Send + Sync + 'static {
    /// Opaque per-session state owned by the library.
    type Handle: Send + 'static;

    /// `None` when the library rejects the key or cannot allocate a session.
    fn new_handle(&self, server_key: &ResolverPublicKey) -> Option<Self::Handle>;

    fn kill_handle(&self, handle: Self::Handle);

    /// Bytes `generate` may write for a `name_len`-byte name.
    fn request_capacity(&self, name_len: usize) -> usize {
        dns3_string_capacity(name_len)
    }

    /// Write the request label for `name` into `out` and its id into `request_id`.
    /// Returns the label length, or a negative code on failure.
    fn generate(
        &self,
        handle: &mut Self::Handle,
        out: &mut [u8],
        request_id: &mut u32,
        name: &[u8],
    ) -> i32;

    /// Decrypt `record` into `address_out`. Returns 0 on success.
    fn decrypt(
        &self,
        handle: &mut Self::Handle,
        address_out: &mut [u8; TOX_ADDRESS_SIZE],
        record: &[u8],
        request_id: u32,
    ) -> i32;
}

/// Output capacity the library needs to generate a request for a `name_len`-byte name.
pub fn dns3_string_capacity(name_len: usize) -> usize {
    let total = REQUEST_ID_SIZE + PUBLIC_KEY_SIZE + name_len + MAC_SIZE;
    total.div_ceil(BASE32_GROUP_BYTES) * BASE32_GROUP_CHARS + total.div_ceil(DOT_INTERVAL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_grows_with_name() {
        // 4 + 32 + 5 + 16 = 57 bytes -> 12 groups of 8 chars plus 2 dots.
        assert_eq!(dns3_string_capacity(5), 98);
        assert!(dns3_string_capacity(5) > 64);
        assert!(dns3_string_capacity(255) > dns3_string_capacity(5));
    }
}
