//! Control-plane state published to the data plane as one snapshot.

use std::sync::Arc;

use crate::binding::BindingTable;
use crate::error::{AclError, Result};
use crate::pairing::PairTable;
use crate::store::RuleStore;
use crate::types::{Acl, AclHandle, Direction};

/// Rule store, binding table and interface pairings.
///
/// Readers hold an immutable `Arc<Tables>`; writers clone, mutate and
/// republish, so a reader never observes a half-applied operation.
#[derive(Debug, Clone)]
pub struct Tables {
    pub(crate) store: RuleStore,
    pub(crate) bindings: BindingTable,
    pub(crate) pairs: PairTable,
}

impl Tables {
    pub fn new(max_acls: usize, max_rules: usize) -> Self {
        Self {
            store: RuleStore::new(max_acls, max_rules),
            bindings: BindingTable::new(),
            pairs: PairTable::new(),
        }
    }

    pub fn add_acl(&mut self, acl: Acl) -> Result<AclHandle> {
        self.store.add(acl)
    }

    /// Unbind `handle` everywhere, then free it.
    ///
    /// Returns the (interface, direction) lists that referenced it.
    pub fn delete_acl(&mut self, handle: AclHandle) -> Result<Vec<(u32, Direction)>> {
        if !self.store.contains(handle) {
            return Err(AclError::AclNotFound(handle));
        }
        let touched = self.bindings.remove_all(handle);
        self.store.remove(handle)?;
        Ok(touched)
    }

    pub fn get_acl(&self, handle: AclHandle) -> Result<Arc<Acl>> {
        self.store
            .get(handle)
            .cloned()
            .ok_or(AclError::AclNotFound(handle))
    }

    pub fn bind(&mut self, sw_if_index: u32, direction: Direction, handle: AclHandle) -> Result<()> {
        if !self.store.contains(handle) {
            return Err(AclError::AclNotFound(handle));
        }
        self.bindings.bind(sw_if_index, direction, handle);
        Ok(())
    }

    pub fn unbind(&mut self, sw_if_index: u32, direction: Direction, handle: AclHandle) -> Result<()> {
        self.bindings.unbind(sw_if_index, direction, handle)
    }

    pub fn list_for(&self, sw_if_index: u32, direction: Direction) -> &[AclHandle] {
        self.bindings.list_for(sw_if_index, direction)
    }

    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    pub fn pairs(&self) -> &PairTable {
        &self.pairs
    }
}
