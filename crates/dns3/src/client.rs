//! Alias resolution client
//!
//! Each operation has one blocking routine; the async forms run it on the blocking
//! pool so callers on a tokio runtime never stall while the library works.

use std::sync::Arc;

use tracing::debug;

use crate::errors::{ResolverError, Result};
use crate::handle::ResolverHandleManager;
use crate::key::KeySource;
use crate::library::Dns3Library;
use crate::record;
use crate::types::{Dns3Request, ToxAddress, MAX_NAME_LEN, TOX_ADDRESS_SIZE};

pub struct AliasResolutionClient<L: Dns3Library> {
    manager: Arc<ResolverHandleManager<L>>,
}

impl<L: Dns3Library> Clone for AliasResolutionClient<L> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
        }
    }
}

impl<L: Dns3Library> AliasResolutionClient<L> {
    pub fn new(manager: Arc<ResolverHandleManager<L>>) -> Self {
        Self { manager }
    }

    /// Bind `key` and open a handle in one step.
    pub fn open<'a>(library: L, key: impl Into<KeySource<'a>>) -> Result<Self> {
        let manager = ResolverHandleManager::new(library);
        manager.bind_key(key)?;
        manager.open_handle()?;
        Ok(Self::new(Arc::new(manager)))
    }

    pub fn manager(&self) -> &Arc<ResolverHandleManager<L>> {
        &self.manager
    }

    /// Generate an encrypted request for `name`.
    pub fn generate_blocking(&self, name: &str) -> Result<Dns3Request> {
        if name.len() > MAX_NAME_LEN {
            return Err(ResolverError::NameTooLong {
                len: name.len(),
                max: MAX_NAME_LEN,
            });
        }

        let mut out = vec![0u8; self.manager.library().request_capacity(name.len())];
        let mut request_id = 0u32;
        let code = self.manager.with_handle(|library, handle| {
            library.generate(handle, &mut out, &mut request_id, name.as_bytes())
        })?;
        if code < 0 {
            return Err(ResolverError::GenerationFailed(code));
        }

        let len = usize::try_from(code).map_or(out.len(), |len| len.min(out.len()));
        let query_name = String::from_utf8_lossy(&out[..len]).into_owned();
        debug!(name, request_id, "generated dns3 request");
        Ok(Dns3Request {
            request_id,
            query_name,
        })
    }

    /// Decrypt a TXT answer for the request identified by `request_id`.
    ///
    /// `txt` may be the full answer (`v=tox3;id=...`) or just the record.
    pub fn decrypt_blocking(&self, txt: &str, request_id: u32) -> Result<ToxAddress> {
        let record = record::extract_record_id(txt);
        let mut address = [0u8; TOX_ADDRESS_SIZE];
        let code = self.manager.with_handle(|library, handle| {
            library.decrypt(handle, &mut address, record.as_bytes(), request_id)
        })?;
        if code != 0 {
            debug!(request_id, code, "dns3 record rejected");
            return Err(ResolverError::DecryptionFailed(code));
        }
        Ok(ToxAddress::new(address))
    }

    pub async fn generate(&self, name: impl Into<String>) -> Result<Dns3Request> {
        let client = self.clone();
        let name = name.into();
        tokio::task::spawn_blocking(move || client.generate_blocking(&name))
            .await
            .map_err(|e| ResolverError::Task(e.to_string()))?
    }

    pub async fn decrypt(&self, txt: impl Into<String>, request_id: u32) -> Result<ToxAddress> {
        let client = self.clone();
        let txt = txt.into();
        tokio::task::spawn_blocking(move || client.decrypt_blocking(&txt, request_id))
            .await
            .map_err(|e| ResolverError::Task(e.to_string()))?
    }
}
