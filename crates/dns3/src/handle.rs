//! Resolver handle lifecycle
//!
//! `Uninitialized → KeyBound → Active → Killed`. The foreign handle never leaves
//! the manager: callers borrow it through [`ResolverHandleManager::with_handle`]
//! or [`ResolverHandleManager::handle`], both of which hold the state lock, so
//! foreign calls on one handle never overlap and `close` waits for an in-flight
//! call to finish before releasing it.

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::errors::{ResolverError, Result};
use crate::key::{KeySource, ResolverPublicKey};
use crate::library::Dns3Library;

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleStatus {
    Uninitialized,
    KeyBound,
    Active,
    Killed,
}

enum HandleState<H> {
    Uninitialized,
    KeyBound(ResolverPublicKey),
    Active { key: ResolverPublicKey, handle: H },
    Killed,
}

impl<H> HandleState<H> {
    fn status(&self) -> HandleStatus {
        match self {
            HandleState::Uninitialized => HandleStatus::Uninitialized,
            HandleState::KeyBound(_) => HandleStatus::KeyBound,
            HandleState::Active { .. } => HandleStatus::Active,
            HandleState::Killed => HandleStatus::Killed,
        }
    }
}

/// Exclusive owner of one resolver handle.
pub struct ResolverHandleManager<L: Dns3Library> {
    library: L,
    state: Mutex<HandleState<L::Handle>>,
}

impl<L: Dns3Library> ResolverHandleManager<L> {
    pub fn new(library: L) -> Self {
        Self {
            library,
            state: Mutex::new(HandleState::Uninitialized),
        }
    }

    /// Bind `key`, accepting raw bytes or hex. Rebinding before the handle is
    /// opened replaces the key.
    pub fn bind_key<'a>(&self, key: impl Into<KeySource<'a>>) -> Result<()> {
        let key = key.into().into_key()?;
        let mut state = self.state.lock();
        match *state {
            HandleState::Uninitialized | HandleState::KeyBound(_) => {
                *state = HandleState::KeyBound(key);
                debug!(key = %key, "resolver key bound");
                Ok(())
            }
            HandleState::Active { .. } => Err(ResolverError::KeyAlreadyBound),
            HandleState::Killed => Err(ResolverError::HandleClosed),
        }
    }

    pub fn bind_default_key(&self) -> Result<()> {
        self.bind_key(ResolverPublicKey::default_key())
    }

    /// Create the foreign handle for the bound key. Opening an already active
    /// manager is a no-op.
    pub fn open_handle(&self) -> Result<()> {
        let mut state = self.state.lock();
        let key = match *state {
            HandleState::KeyBound(key) => key,
            HandleState::Active { .. } => return Ok(()),
            HandleState::Uninitialized => return Err(ResolverError::KeyNotBound),
            HandleState::Killed => return Err(ResolverError::HandleClosed),
        };

        let handle = self.library.new_handle(&key).ok_or_else(|| {
            warn!(key = %key, "resolver library refused handle");
            ResolverError::HandleCreationFailed
        })?;
        *state = HandleState::Active { key, handle };
        info!(key = %key, "resolver handle opened");
        Ok(())
    }

    /// Release the foreign handle. Afterwards every operation fails with
    /// [`ResolverError::HandleClosed`]; closing again is a no-op.
    pub fn close(&self) {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, HandleState::Killed) {
            HandleState::Active { handle, .. } => {
                self.library.kill_handle(handle);
                info!("resolver handle released");
            }
            HandleState::KeyBound(_) => debug!("resolver closed before a handle was opened"),
            HandleState::Uninitialized => *state = HandleState::Uninitialized,
            HandleState::Killed => {}
        }
    }

    /// Borrow the active handle for the duration of the guard.
    pub fn handle(&self) -> Result<MappedMutexGuard<'_, L::Handle>> {
        MutexGuard::try_map(self.state.lock(), |state| match state {
            HandleState::Active { handle, .. } => Some(handle),
            _ => None,
        })
        .map_err(|state| inactive_error(state.status()))
    }

    /// Run `f` against the library and the active handle, serialised with every
    /// other foreign call on this manager.
    pub fn with_handle<R>(&self, f: impl FnOnce(&L, &mut L::Handle) -> R) -> Result<R> {
        let mut handle = self.handle()?;
        Ok(f(&self.library, &mut handle))
    }

    pub fn status(&self) -> HandleStatus {
        self.state.lock().status()
    }

    pub fn key(&self) -> Option<ResolverPublicKey> {
        match *self.state.lock() {
            HandleState::KeyBound(key) | HandleState::Active { key, .. } => Some(key),
            HandleState::Uninitialized | HandleState::Killed => None,
        }
    }

    pub fn library(&self) -> &L {
        &self.library
    }
}

impl<L: Dns3Library> Drop for ResolverHandleManager<L> {
    fn drop(&mut self) {
        if let HandleState::Active { handle, .. } =
            std::mem::replace(self.state.get_mut(), HandleState::Killed)
        {
            self.library.kill_handle(handle);
            debug!("resolver handle released on drop");
        }
    }
}

fn inactive_error(status: HandleStatus) -> ResolverError {
    match status {
        HandleStatus::Killed => ResolverError::HandleClosed,
        _ => ResolverError::NoActiveHandle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackDns3;

    #[test]
    fn lifecycle_follows_state_machine() {
        let manager = ResolverHandleManager::new(LoopbackDns3::new());
        assert_eq!(manager.status(), HandleStatus::Uninitialized);
        assert!(matches!(manager.handle(), Err(ResolverError::NoActiveHandle)));
        assert_eq!(manager.open_handle(), Err(ResolverError::KeyNotBound));

        manager.bind_default_key().unwrap();
        assert_eq!(manager.status(), HandleStatus::KeyBound);
        assert!(matches!(manager.handle(), Err(ResolverError::NoActiveHandle)));

        manager.open_handle().unwrap();
        assert_eq!(manager.status(), HandleStatus::Active);
        assert!(manager.handle().is_ok());
        assert_eq!(manager.key(), Some(ResolverPublicKey::default_key()));

        manager.close();
        assert_eq!(manager.status(), HandleStatus::Killed);
        assert!(matches!(manager.handle(), Err(ResolverError::HandleClosed)));
    }

    #[test]
    fn close_releases_exactly_once() {
        let library = LoopbackDns3::new();
        let manager = ResolverHandleManager::new(library.clone());
        manager.bind_default_key().unwrap();
        manager.open_handle().unwrap();

        manager.close();
        manager.close();
        drop(manager);
        assert_eq!(library.handles_killed(), 1);
    }

    #[test]
    fn closed_manager_rejects_everything() {
        let manager = ResolverHandleManager::new(LoopbackDns3::new());
        manager.bind_default_key().unwrap();
        manager.open_handle().unwrap();
        manager.close();

        assert_eq!(manager.bind_default_key(), Err(ResolverError::HandleClosed));
        assert_eq!(manager.open_handle(), Err(ResolverError::HandleClosed));
        assert!(matches!(
            manager.with_handle(|_, _| ()),
            Err(ResolverError::HandleClosed)
        ));
    }

    #[test]
    fn close_before_bind_is_a_no_op() {
        let manager = ResolverHandleManager::new(LoopbackDns3::new());
        manager.close();
        assert_eq!(manager.status(), HandleStatus::Uninitialized);
        manager.bind_default_key().unwrap();
    }

    #[test]
    fn key_is_fixed_once_open() {
        let manager = ResolverHandleManager::new(LoopbackDns3::new());
        manager.bind_key(&[3u8; 32]).unwrap();
        manager.bind_default_key().unwrap();
        manager.open_handle().unwrap();
        manager.open_handle().unwrap();
        assert_eq!(
            manager.bind_key(&[4u8; 32]),
            Err(ResolverError::KeyAlreadyBound)
        );
    }

    #[test]
    fn rejected_key_fails_creation() {
        let library = LoopbackDns3::new();
        library.reject_key(ResolverPublicKey::default_key());
        let manager = ResolverHandleManager::new(library);
        manager.bind_default_key().unwrap();
        assert_eq!(
            manager.open_handle(),
            Err(ResolverError::HandleCreationFailed)
        );
        assert_eq!(manager.status(), HandleStatus::KeyBound);
    }

    #[test]
    fn drop_releases_active_handle() {
        let library = LoopbackDns3::new();
        {
            let manager = ResolverHandleManager::new(library.clone());
            manager.bind_default_key().unwrap();
            manager.open_handle().unwrap();
        }
        assert_eq!(library.handles_killed(), 1);
    }
}
