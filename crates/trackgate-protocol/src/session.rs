//! Device identity resolution and per-connection sessions.
//!
//! A device announces itself with a declared identifier (usually an IMEI);
//! the directory resolves that to a stable internal identity. The registry
//! caches the resolution per connection so protocols that declare identity
//! once at login can resume it on every later frame without another
//! directory lookup.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Identifier of one accepted connection. Never reused within a process.
pub type ConnectionId = u64;

/// The stable internal record a declared identifier resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Opaque internal device id
    pub id: u64,
    /// The declared unique identifier that resolved to it
    pub unique_id: String,
}

/// The device directory collaborator. Lookup may be backed by a database or
/// an in-memory table; the core only requires that it is safe to call
/// repeatedly with the same input.
pub trait DeviceDirectory: Send + Sync {
    fn lookup_by_unique_id(&self, unique_id: &str) -> Option<DeviceIdentity>;
}

/// In-memory device directory.
///
/// Used by the server binary (seeded from configuration) and by tests. With
/// `register_unknown` enabled, unseen identifiers are registered on first
/// sight with a freshly allocated id.
pub struct MemoryDeviceDirectory {
    devices: RwLock<HashMap<String, DeviceIdentity>>,
    register_unknown: bool,
    next_id: AtomicU64,
}

impl MemoryDeviceDirectory {
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            register_unknown: false,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_register_unknown(mut self) -> Self {
        self.register_unknown = true;
        self
    }

    /// Register a device under an explicit id.
    pub fn register(&self, id: u64, unique_id: &str) {
        let identity = DeviceIdentity {
            id,
            unique_id: unique_id.to_string(),
        };
        self.devices
            .write()
            .unwrap()
            .insert(unique_id.to_string(), identity);
        // Keep allocated ids clear of explicit ones.
        self.next_id.fetch_max(id + 1, Ordering::Relaxed);
    }
}

impl Default for MemoryDeviceDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceDirectory for MemoryDeviceDirectory {
    fn lookup_by_unique_id(&self, unique_id: &str) -> Option<DeviceIdentity> {
        if let Some(identity) = self.devices.read().unwrap().get(unique_id) {
            return Some(identity.clone());
        }
        if self.register_unknown {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let identity = DeviceIdentity {
                id,
                unique_id: unique_id.to_string(),
            };
            self.devices
                .write()
                .unwrap()
                .insert(unique_id.to_string(), identity.clone());
            debug!(unique_id, id, "registered unknown device");
            return Some(identity);
        }
        None
    }
}

/// Per-connection identity cache in front of the device directory.
///
/// A connection is either unidentified (no entry) or identified (exactly one
/// entry). Entries are created only by a successful [`identify`], replaced
/// by a later successful re-identification, and removed when the connection
/// closes; a new connection never inherits another connection's entry.
///
/// [`identify`]: DeviceSessionRegistry::identify
pub struct DeviceSessionRegistry {
    directory: Arc<dyn DeviceDirectory>,
    sessions: RwLock<HashMap<ConnectionId, DeviceIdentity>>,
}

impl DeviceSessionRegistry {
    pub fn new(directory: Arc<dyn DeviceDirectory>) -> Self {
        Self {
            directory,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a declared identifier against the directory and cache the
    /// result for this connection.
    ///
    /// Candidates are tried in order - the declared identifier verbatim
    /// first, protocol-specific normalized variants after - and the first
    /// hit wins. A miss caches nothing, so a later frame may retry.
    pub fn identify(&self, connection: ConnectionId, candidates: &[&str]) -> Option<DeviceIdentity> {
        for candidate in candidates {
            if let Some(identity) = self.directory.lookup_by_unique_id(candidate) {
                debug!(connection, unique_id = %identity.unique_id, "device identified");
                self.sessions
                    .write()
                    .unwrap()
                    .insert(connection, identity.clone());
                return Some(identity);
            }
        }
        warn!(connection, ?candidates, "unknown device");
        None
    }

    /// The cached identity for this connection, without any directory
    /// lookup.
    pub fn resume(&self, connection: ConnectionId) -> Option<DeviceIdentity> {
        self.sessions.read().unwrap().get(&connection).cloned()
    }

    /// Discard the connection's session. Called exactly once, when the
    /// connection closes.
    pub fn close(&self, connection: ConnectionId) {
        if self.sessions.write().unwrap().remove(&connection).is_some() {
            debug!(connection, "session closed");
        }
    }

    /// Number of currently identified connections.
    pub fn session_count(&self) -> usize {
        self.sessions.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> DeviceSessionRegistry {
        let directory = MemoryDeviceDirectory::new();
        directory.register(1, "359586015829802");
        directory.register(2, "490154203237518");
        DeviceSessionRegistry::new(Arc::new(directory))
    }

    #[test]
    fn test_identify_then_resume() {
        let registry = registry();
        let identity = registry.identify(10, &["359586015829802"]).unwrap();
        assert_eq!(identity.id, 1);

        let resumed = registry.resume(10).unwrap();
        assert_eq!(resumed, identity);
    }

    #[test]
    fn test_candidate_order_first_wins() {
        let registry = registry();
        // Verbatim id unknown, normalized variant known.
        let identity = registry
            .identify(10, &["49015420323751", "490154203237518"])
            .unwrap();
        assert_eq!(identity.id, 2);
        assert_eq!(identity.unique_id, "490154203237518");
    }

    #[test]
    fn test_unknown_id_caches_nothing() {
        let registry = registry();
        assert!(registry.identify(10, &["000000000000000"]).is_none());
        assert!(registry.resume(10).is_none());

        // A later frame with a resolvable id may still identify.
        assert!(registry.identify(10, &["359586015829802"]).is_some());
        assert!(registry.resume(10).is_some());
    }

    #[test]
    fn test_identity_isolation_between_connections() {
        let registry = registry();
        registry.identify(10, &["359586015829802"]).unwrap();
        registry.identify(11, &["490154203237518"]).unwrap();

        assert_eq!(registry.resume(10).unwrap().id, 1);
        assert_eq!(registry.resume(11).unwrap().id, 2);
    }

    #[test]
    fn test_reidentification_overwrites() {
        let registry = registry();
        registry.identify(10, &["359586015829802"]).unwrap();
        registry.identify(10, &["490154203237518"]).unwrap();
        assert_eq!(registry.resume(10).unwrap().id, 2);
        assert_eq!(registry.session_count(), 1);
    }

    #[test]
    fn test_close_discards_session() {
        let registry = registry();
        registry.identify(10, &["359586015829802"]).unwrap();
        registry.close(10);
        assert!(registry.resume(10).is_none());

        // A new connection does not inherit the old session even for the
        // same physical device.
        assert!(registry.resume(12).is_none());
    }

    #[test]
    fn test_register_unknown_directory() {
        let directory = MemoryDeviceDirectory::new().with_register_unknown();
        let first = directory.lookup_by_unique_id("123456789012345").unwrap();
        let second = directory.lookup_by_unique_id("123456789012345").unwrap();
        assert_eq!(first, second);
    }
}
