//! Process-wide table of devices currently driven by a remote client.
//!
//! The registry is the only state shared between connection dispatches. All
//! operations take one mutex and are O(1); the lock is never held across an
//! `.await`.

use crate::core::session::{SessionId, SessionState};
use crate::domain::error::{RemoteUartError, RemoteUartResult};
use crate::domain::params::DeviceId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;
use tracing::{debug, warn};

/// What the registry knows about the session holding a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub session_id: SessionId,
    pub peer: Option<SocketAddr>,
    pub state: SessionState,
    pub acquired_at: SystemTime,
}

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    entries: Mutex<HashMap<DeviceId, RegistryEntry>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<DeviceId, RegistryEntry>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim `device` for `session_id`. Fails with `DeviceBusy` if another
    /// session already holds it.
    pub fn acquire(
        self: &Arc<Self>,
        device: &DeviceId,
        session_id: &SessionId,
        peer: Option<SocketAddr>,
    ) -> RemoteUartResult<DeviceLease> {
        let mut entries = self.entries();
        if let Some(existing) = entries.get(device) {
            debug!(
                "Device '{}' already held by session '{}'",
                device, existing.session_id
            );
            return Err(RemoteUartError::DeviceBusy {
                device: device.to_string(),
            });
        }

        entries.insert(
            device.clone(),
            RegistryEntry {
                session_id: session_id.clone(),
                peer,
                state: SessionState::Opening,
                acquired_at: SystemTime::now(),
            },
        );
        debug!("Device '{}' acquired by session '{}'", device, session_id);

        Ok(DeviceLease {
            registry: Arc::clone(self),
            device: device.clone(),
            session_id: session_id.clone(),
            released: false,
        })
    }

    /// Remove the entry for `device`. Returns whether an entry was removed.
    pub fn release(&self, device: &DeviceId) -> bool {
        let removed = self.entries().remove(device).is_some();
        if removed {
            debug!("Device '{}' released", device);
        }
        removed
    }

    fn release_owned(&self, device: &DeviceId, session_id: &SessionId) -> bool {
        let mut entries = self.entries();
        match entries.get(device) {
            Some(entry) if &entry.session_id == session_id => {
                entries.remove(device);
                debug!("Device '{}' released by session '{}'", device, session_id);
                true
            }
            _ => false,
        }
    }

    fn set_owned_state(&self, device: &DeviceId, session_id: &SessionId, state: SessionState) {
        let mut entries = self.entries();
        if let Some(entry) = entries.get_mut(device) {
            if &entry.session_id != session_id {
                return;
            }
            if entry.state.can_transition_to(state) {
                entry.state = state;
            } else if entry.state != state {
                warn!(
                    "Ignoring state change {} -> {} for device '{}'",
                    entry.state, state, device
                );
            }
        }
    }

    pub fn state_of(&self, device: &DeviceId) -> Option<SessionState> {
        self.entries().get(device).map(|entry| entry.state)
    }

    pub fn get(&self, device: &DeviceId) -> Option<RegistryEntry> {
        self.entries().get(device).cloned()
    }

    pub fn contains(&self, device: &DeviceId) -> bool {
        self.entries().contains_key(device)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Copy of every entry, sorted by device.
    pub fn snapshot(&self) -> Vec<(DeviceId, RegistryEntry)> {
        let mut entries: Vec<_> = self
            .entries()
            .iter()
            .map(|(device, entry)| (device.clone(), entry.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

/// Proof that a session holds a device. The entry is removed exactly once,
/// by [`DeviceLease::release`] or when the lease is dropped.
#[derive(Debug)]
pub struct DeviceLease {
    registry: Arc<DeviceRegistry>,
    device: DeviceId,
    session_id: SessionId,
    released: bool,
}

impl DeviceLease {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn set_state(&self, state: SessionState) {
        self.registry.set_owned_state(&self.device, &self.session_id, state);
    }

    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.registry.release_owned(&self.device, &self.session_id);
        }
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.release_once();
    }
}
