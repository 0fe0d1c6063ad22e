//! Host dataplane collaborators.
//!
//! The engine does not own interfaces or the packet pipeline. It asks the
//! host which interfaces exist and tells it when an (interface, direction)
//! gains or loses its last ACL, so the host can steer traffic through the
//! classifier only where needed.

use std::collections::HashSet;

use parking_lot::RwLock;

use crate::types::Direction;

/// Live-interface lookup provided by the host.
pub trait InterfaceRegistry: Send + Sync {
    /// Whether `sw_if_index` names an existing interface.
    fn is_valid(&self, sw_if_index: u32) -> bool;
}

/// Registry that accepts every interface index.
pub struct AnyInterface;

impl AnyInterface {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AnyInterface {
    fn default() -> Self {
        Self::new()
    }
}

impl InterfaceRegistry for AnyInterface {
    fn is_valid(&self, _sw_if_index: u32) -> bool {
        true
    }
}

/// Registry backed by an explicit set of interface indices.
#[derive(Debug, Default)]
pub struct StaticInterfaces {
    live: RwLock<HashSet<u32>>,
}

impl StaticInterfaces {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding `indices`.
    pub fn with_interfaces(indices: impl IntoIterator<Item = u32>) -> Self {
        Self {
            live: RwLock::new(indices.into_iter().collect()),
        }
    }

    pub fn add(&self, sw_if_index: u32) {
        self.live.write().insert(sw_if_index);
    }

    pub fn remove(&self, sw_if_index: u32) -> bool {
        self.live.write().remove(&sw_if_index)
    }
}

impl InterfaceRegistry for StaticInterfaces {
    fn is_valid(&self, sw_if_index: u32) -> bool {
        self.live.read().contains(&sw_if_index)
    }
}

/// Feature-arc control: route an interface's traffic through the engine.
pub trait TrafficSteering: Send + Sync {
    /// The list for (`sw_if_index`, `direction`) became non-empty.
    fn hook(&self, sw_if_index: u32, direction: Direction);
    /// The list for (`sw_if_index`, `direction`) became empty.
    fn unhook(&self, sw_if_index: u32, direction: Direction);
}

/// Steering that does nothing.
pub struct NoopSteering;

impl NoopSteering {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NoopSteering {
    fn default() -> Self {
        Self::new()
    }
}

impl TrafficSteering for NoopSteering {
    fn hook(&self, _sw_if_index: u32, _direction: Direction) {}
    fn unhook(&self, _sw_if_index: u32, _direction: Direction) {}
}
