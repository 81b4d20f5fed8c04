//! In-process DNS3 resolver.
//!
//! Plays both ends of the exchange: as a [`Dns3Library`] it issues request labels
//! like the native library, and [`LoopbackDns3::answer`] replies to them like a
//! resolution server would. Lets hosts and tests run the whole resolution flow
//! without `libtoxdns` or network access.
//!
//! Labels and records are hex rather than base32. Answers are sealed with a blake3
//! keystream and tag derived from the server key and request id, so a record only
//! opens under the request id it was produced for. This binds answers to requests;
//! it does not hide the queried name.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::key::ResolverPublicKey;
use crate::library::Dns3Library;
use crate::record::{self, TXT_VERSION};
use crate::types::{ToxAddress, TOX_ADDRESS_SIZE};

const DERIVE_CONTEXT: &[u8] = b"toxbridge loopback dns3 v1";
const TAG_SIZE: usize = 8;
const REQUEST_ID_SIZE: usize = 4;

/// Status codes returned by the loopback library.
pub const ERR_INVALID_NAME: i32 = -1;
pub const ERR_BUFFER_TOO_SMALL: i32 = -2;
pub const ERR_MALFORMED_RECORD: i32 = -1;
pub const ERR_RECORD_MISMATCH: i32 = -3;

#[derive(Debug)]
struct LoopbackState {
    directory: RwLock<HashMap<String, ToxAddress>>,
    rejected_keys: RwLock<HashSet<ResolverPublicKey>>,
    next_request_id: AtomicU32,
    opened: AtomicUsize,
    killed: AtomicUsize,
}

impl Default for LoopbackState {
    fn default() -> Self {
        Self {
            directory: RwLock::new(HashMap::new()),
            rejected_keys: RwLock::new(HashSet::new()),
            next_request_id: AtomicU32::new(1),
            opened: AtomicUsize::new(0),
            killed: AtomicUsize::new(0),
        }
    }
}

/// Cloning shares the directory and counters.
#[derive(Debug, Clone, Default)]
pub struct LoopbackDns3 {
    state: Arc<LoopbackState>,
}

#[derive(Debug)]
pub struct LoopbackHandle {
    server_key: ResolverPublicKey,
}

impl LoopbackDns3 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `name` → `address` in the server-side directory. Names are case-insensitive.
    pub fn register(&self, name: impl Into<String>, address: ToxAddress) {
        self.state
            .directory
            .write()
            .insert(name.into().to_lowercase(), address);
    }

    /// Make handle creation fail for `key`.
    pub fn reject_key(&self, key: ResolverPublicKey) {
        self.state.rejected_keys.write().insert(key);
    }

    pub fn handles_opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub fn handles_killed(&self) -> usize {
        self.state.killed.load(Ordering::SeqCst)
    }

    /// Server side: answer a generated query (bare label or full query name) with a
    /// `v=tox3;id=...` TXT value, or `None` for unknown names and foreign labels.
    pub fn answer(&self, server_key: &ResolverPublicKey, query: &str) -> Option<String> {
        let raw = hex::decode(record::query_label(query)).ok()?;
        if raw.len() <= REQUEST_ID_SIZE {
            return None;
        }
        let (id_bytes, name) = raw.split_at(REQUEST_ID_SIZE);
        let request_id = u32::from_be_bytes(id_bytes.try_into().ok()?);
        let name = std::str::from_utf8(name).ok()?;
        let address = *self.state.directory.read().get(name)?;

        let stream = keystream(server_key, request_id);
        let mut sealed: Vec<u8> = address
            .as_bytes()
            .iter()
            .zip(stream.iter())
            .map(|(byte, key)| byte ^ key)
            .collect();
        let tag = seal_tag(server_key, request_id, &sealed);
        sealed.extend_from_slice(&tag);

        Some(format!("{TXT_VERSION};id={}", hex::encode_upper(sealed)))
    }
}

impl Dns3Library for LoopbackDns3 {
    type Handle = LoopbackHandle;

    fn new_handle(&self, server_key: &ResolverPublicKey) -> Option<LoopbackHandle> {
        if self.state.rejected_keys.read().contains(server_key) {
            return None;
        }
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Some(LoopbackHandle {
            server_key: *server_key,
        })
    }

    fn kill_handle(&self, _handle: LoopbackHandle) {
        self.state.killed.fetch_add(1, Ordering::SeqCst);
    }

    /// Hex of the request id and the name.
    fn request_capacity(&self, name_len: usize) -> usize {
        2 * (REQUEST_ID_SIZE + name_len)
    }

    fn generate(
        &self,
        _handle: &mut LoopbackHandle,
        out: &mut [u8],
        request_id: &mut u32,
        name: &[u8],
    ) -> i32 {
        let Ok(name) = std::str::from_utf8(name) else {
            return ERR_INVALID_NAME;
        };
        if name.is_empty() {
            return ERR_INVALID_NAME;
        }

        let id = self.state.next_request_id.fetch_add(1, Ordering::SeqCst);
        let mut raw = id.to_be_bytes().to_vec();
        raw.extend_from_slice(name.to_lowercase().as_bytes());
        let label = hex::encode_upper(raw);
        if label.len() > out.len() {
            return ERR_BUFFER_TOO_SMALL;
        }

        out[..label.len()].copy_from_slice(label.as_bytes());
        *request_id = id;
        i32::try_from(label.len()).unwrap_or(ERR_BUFFER_TOO_SMALL)
    }

    fn decrypt(
        &self,
        handle: &mut LoopbackHandle,
        address_out: &mut [u8; TOX_ADDRESS_SIZE],
        record: &[u8],
        request_id: u32,
    ) -> i32 {
        let Some(raw) = std::str::from_utf8(record)
            .ok()
            .and_then(|text| hex::decode(text.trim()).ok())
        else {
            return ERR_MALFORMED_RECORD;
        };
        if raw.len() != TOX_ADDRESS_SIZE + TAG_SIZE {
            return ERR_MALFORMED_RECORD;
        }

        let (sealed, tag) = raw.split_at(TOX_ADDRESS_SIZE);
        if seal_tag(&handle.server_key, request_id, sealed).as_slice() != tag {
            return ERR_RECORD_MISMATCH;
        }

        let stream = keystream(&handle.server_key, request_id);
        for ((out, byte), key) in address_out.iter_mut().zip(sealed).zip(stream.iter()) {
            *out = byte ^ key;
        }
        0
    }
}

fn keystream(server_key: &ResolverPublicKey, request_id: u32) -> [u8; TOX_ADDRESS_SIZE] {
    let mut hasher = blake3::Hasher::new_keyed(server_key.as_bytes());
    hasher.update(DERIVE_CONTEXT);
    hasher.update(b"stream");
    hasher.update(&request_id.to_be_bytes());

    let mut stream = [0u8; TOX_ADDRESS_SIZE];
    hasher.finalize_xof().fill(&mut stream);
    stream
}

fn seal_tag(server_key: &ResolverPublicKey, request_id: u32, sealed: &[u8]) -> [u8; TAG_SIZE] {
    let mut hasher = blake3::Hasher::new_keyed(server_key.as_bytes());
    hasher.update(DERIVE_CONTEXT);
    hasher.update(b"tag");
    hasher.update(&request_id.to_be_bytes());
    hasher.update(sealed);

    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(&hasher.finalize().as_bytes()[..TAG_SIZE]);
    tag
}
