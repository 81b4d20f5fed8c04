//! toxbridge DNS3
//!
//! Resolves human-readable aliases to long-term peer addresses through the DNS3
//! TXT lookup protocol.
//!
//! ## Modules
//! - `handle`: resolver handle lifecycle, serialised foreign access
//! - `client`: request generation and answer decryption, blocking and async
//! - `library`: the four-call resolver library surface
//! - `ffi`: `libtoxdns` loaded at runtime (feature `native`)
//! - `loopback`: in-process resolver and answering server
//! - `key`, `record`, `types`: keys, TXT helpers, peer addresses

pub mod client;
pub mod errors;
#[cfg(feature = "native")]
pub mod ffi;
pub mod handle;
pub mod key;
pub mod library;
pub mod loopback;
pub mod record;
pub mod types;

pub use client::AliasResolutionClient;
pub use errors::{ResolverError, Result};
#[cfg(feature = "native")]
pub use ffi::{NativeDns3, NativeHandle, DEFAULT_LIBRARY_NAME};
pub use handle::{HandleStatus, ResolverHandleManager};
pub use key::{KeySource, ResolverPublicKey, DEFAULT_RESOLVER_KEY_HEX, PUBLIC_KEY_SIZE};
pub use library::{dns3_string_capacity, Dns3Library};
pub use loopback::{LoopbackDns3, LoopbackHandle};
pub use record::{extract_record_id, is_dns3_answer, query_name, TXT_VERSION};
pub use types::{Dns3Request, ToxAddress, MAX_NAME_LEN, TOX_ADDRESS_SIZE};
