//! Rule store.
//!
//! ACLs live in a pool of slots. Freed slots go on a free list and are
//! reused, but each reuse bumps the slot generation so handles issued for
//! the previous occupant stop resolving.

use std::sync::Arc;

use crate::error::{AclError, CapacityKind, Result};
use crate::types::{Acl, AclHandle};

#[derive(Debug, Clone, Default)]
struct Slot {
    generation: u32,
    acl: Option<Arc<Acl>>,
}

/// Pool of ACLs addressed by generation-checked handles.
///
/// Cloning is shallow (ACL bodies are shared), which keeps copy-on-write
/// publication cheap.
#[derive(Debug, Clone)]
pub struct RuleStore {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    max_acls: usize,
    max_rules: usize,
}

impl RuleStore {
    pub fn new(max_acls: usize, max_rules: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            max_acls,
            max_rules,
        }
    }

    /// Insert an ACL and return its handle.
    ///
    /// The rules are validated up front; nothing is stored on failure.
    pub fn add(&mut self, acl: Acl) -> Result<AclHandle> {
        if acl.rules.len() > self.max_rules {
            return Err(AclError::CapacityExceeded {
                kind: CapacityKind::Rules,
                limit: self.max_rules,
            });
        }
        for rule in &acl.rules {
            rule.validate()?;
        }

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                if self.slots.len() >= self.max_acls || self.slots.len() >= u32::MAX as usize {
                    return Err(AclError::CapacityExceeded {
                        kind: CapacityKind::Acl,
                        limit: self.max_acls,
                    });
                }
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.acl = Some(Arc::new(acl));
        self.live += 1;
        Ok(AclHandle::new(index, slot.generation))
    }

    /// Free the slot behind `handle`, returning the ACL it held.
    pub fn remove(&mut self, handle: AclHandle) -> Result<Arc<Acl>> {
        let slot = self
            .slots
            .get_mut(handle.index() as usize)
            .filter(|s| s.generation == handle.generation())
            .ok_or(AclError::AclNotFound(handle))?;
        let acl = slot.acl.take().ok_or(AclError::AclNotFound(handle))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index());
        self.live -= 1;
        Ok(acl)
    }

    pub fn get(&self, handle: AclHandle) -> Option<&Arc<Acl>> {
        self.slots
            .get(handle.index() as usize)
            .filter(|s| s.generation == handle.generation())
            .and_then(|s| s.acl.as_ref())
    }

    pub fn contains(&self, handle: AclHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Live ACLs in slot order
    pub fn iter(&self) -> impl Iterator<Item = (AclHandle, &Arc<Acl>)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.acl
                .as_ref()
                .map(|acl| (AclHandle::new(i as u32, s.generation), acl))
        })
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn capacity(&self) -> usize {
        self.max_acls
    }
}
