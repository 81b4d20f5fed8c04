//! Runtime binding to `libtoxdns`.
//!
//! The library is opened with `libloading` from a caller-chosen path, or from the
//! platform's default search path as `libtoxdns`.

use std::ffi::{c_void, OsStr};
use std::fmt;
use std::os::raw::c_int;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::Arc;

use libloading::{Library, Symbol};
use tracing::info;

use crate::errors::{ResolverError, Result};
use crate::key::ResolverPublicKey;
use crate::library::Dns3Library;
use crate::types::TOX_ADDRESS_SIZE;

/// Library name used when no path is configured.
pub const DEFAULT_LIBRARY_NAME: &str = "libtoxdns";

type Dns3NewFn = unsafe extern "C" fn(server_public_key: *const u8) -> *mut c_void;
type Dns3KillFn = unsafe extern "C" fn(dns3_object: *mut c_void);
type GenerateFn = unsafe extern "C" fn(
    dns3_object: *mut c_void,
    string: *mut u8,
    string_max_len: u16,
    request_id: *mut u32,
    name: *const u8,
    name_len: u8,
) -> c_int;
type DecryptFn = unsafe extern "C" fn(
    dns3_object: *mut c_void,
    tox_id: *mut u8,
    id_record: *const u8,
    id_record_len: u32,
    request_id: u32,
) -> c_int;

/// Status returned without calling into the library when an argument does not
/// fit the C signature.
const ERR_ARGUMENT_RANGE: i32 = -1;

/// `libtoxdns` as a [`Dns3Library`].
///
/// Cloning shares the loaded library; it is unloaded when the last clone drops.
#[derive(Clone)]
pub struct NativeDns3 {
    new: Dns3NewFn,
    kill: Dns3KillFn,
    generate: GenerateFn,
    decrypt: DecryptFn,
    path: PathBuf,
    // Keeps the function pointers above valid.
    _library: Arc<Library>,
}

/// Pointer to a `DNS_Object` allocated by `tox_dns3_new`.
#[derive(Debug)]
pub struct NativeHandle(NonNull<c_void>);

// SAFETY: the library keeps no thread-local state for a handle, and
// `ResolverHandleManager` serialises every call that touches it.
unsafe impl Send for NativeHandle {}

impl NativeDns3 {
    /// Load `libtoxdns` from the default search path.
    pub fn load_default() -> Result<Self> {
        Self::load(DEFAULT_LIBRARY_NAME)
    }

    /// Load the library at `path`. A path without an extension gets the
    /// platform's shared library extension, so `libtoxdns` and `/opt/lib/libtoxdns`
    /// both work.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = library_path(path.as_ref());
        let load_error = |err: libloading::Error| ResolverError::LibraryLoad {
            path: path.display().to_string(),
            reason: err.to_string(),
        };

        // SAFETY: loading runs the library's initialisers; `libtoxdns` has none
        // with preconditions.
        let library = unsafe { Library::new(&path) }.map_err(load_error)?;

        // SAFETY: each symbol is looked up with the C signature the library exports.
        let (new, kill, generate, decrypt) = unsafe {
            let new: Symbol<Dns3NewFn> = library.get(b"tox_dns3_new\0").map_err(load_error)?;
            let kill: Symbol<Dns3KillFn> = library.get(b"tox_dns3_kill\0").map_err(load_error)?;
            let generate: Symbol<GenerateFn> = library
                .get(b"tox_generate_dns3_string\0")
                .map_err(load_error)?;
            let decrypt: Symbol<DecryptFn> = library
                .get(b"tox_decrypt_dns3_TXT\0")
                .map_err(load_error)?;
            (*new, *kill, *generate, *decrypt)
        };

        info!(path = %path.display(), "loaded resolver library");
        Ok(Self {
            new,
            kill,
            generate,
            decrypt,
            path,
            _library: Arc::new(library),
        })
    }

    /// Path the library was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for NativeDns3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeDns3").field("path", &self.path).finish()
    }
}

fn library_path(path: &Path) -> PathBuf {
    if path.extension().is_some() {
        path.to_path_buf()
    } else {
        path.with_extension(OsStr::new(std::env::consts::DLL_EXTENSION))
    }
}

impl Dns3Library for NativeDns3 {
    type Handle = NativeHandle;

    fn new_handle(&self, server_key: &ResolverPublicKey) -> Option<NativeHandle> {
        // SAFETY: the key is exactly the 32 bytes the library reads.
        let raw = unsafe { (self.new)(server_key.as_bytes().as_ptr()) };
        NonNull::new(raw).map(NativeHandle)
    }

    fn kill_handle(&self, handle: NativeHandle) {
        // SAFETY: `handle` came from `tox_dns3_new` and is consumed here, so it is
        // released exactly once.
        unsafe { (self.kill)(handle.0.as_ptr()) }
    }

    fn generate(
        &self,
        handle: &mut NativeHandle,
        out: &mut [u8],
        request_id: &mut u32,
        name: &[u8],
    ) -> i32 {
        let Ok(name_len) = u8::try_from(name.len()) else {
            return ERR_ARGUMENT_RANGE;
        };
        let out_len = u16::try_from(out.len()).unwrap_or(u16::MAX);

        // SAFETY: every pointer is valid for the length passed alongside it.
        unsafe {
            (self.generate)(
                handle.0.as_ptr(),
                out.as_mut_ptr(),
                out_len,
                request_id,
                name.as_ptr(),
                name_len,
            )
        }
    }

    fn decrypt(
        &self,
        handle: &mut NativeHandle,
        address_out: &mut [u8; TOX_ADDRESS_SIZE],
        record: &[u8],
        request_id: u32,
    ) -> i32 {
        let Ok(record_len) = u32::try_from(record.len()) else {
            return ERR_ARGUMENT_RANGE;
        };

        // SAFETY: `address_out` has room for a full address; `record` is valid for
        // `record_len` bytes.
        unsafe {
            (self.decrypt)(
                handle.0.as_ptr(),
                address_out.as_mut_ptr(),
                record.as_ptr(),
                record_len,
                request_id,
            )
        }
    }
}
