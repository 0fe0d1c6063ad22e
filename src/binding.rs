//! Binding table.
//!
//! Maps (interface, direction) to the ordered list of ACL handles evaluated
//! for traffic on that side of the interface. Order is insertion order and
//! duplicates are kept: binding an ACL twice evaluates it twice.

use std::collections::HashMap;

use crate::error::{AclError, Result};
use crate::types::{AclHandle, Direction};

#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    by_interface: HashMap<u32, [Vec<AclHandle>; 2]>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `acl` to the list for (sw_if_index, direction).
    pub fn bind(&mut self, sw_if_index: u32, direction: Direction, acl: AclHandle) {
        self.by_interface.entry(sw_if_index).or_default()[direction.slot()].push(acl);
    }

    /// Remove the first occurrence of `acl`; later duplicates stay bound.
    pub fn unbind(&mut self, sw_if_index: u32, direction: Direction, acl: AclHandle) -> Result<()> {
        let not_found = || AclError::BindingNotFound {
            sw_if_index,
            direction,
            acl,
        };
        let lists = self.by_interface.get_mut(&sw_if_index).ok_or_else(not_found)?;
        let list = &mut lists[direction.slot()];
        let pos = list.iter().position(|h| *h == acl).ok_or_else(not_found)?;
        list.remove(pos);
        if lists.iter().all(Vec::is_empty) {
            self.by_interface.remove(&sw_if_index);
        }
        Ok(())
    }

    /// Ordered handles for (sw_if_index, direction); empty if never bound.
    pub fn list_for(&self, sw_if_index: u32, direction: Direction) -> &[AclHandle] {
        self.by_interface
            .get(&sw_if_index)
            .map(|lists| lists[direction.slot()].as_slice())
            .unwrap_or(&[])
    }

    /// Drop every reference to `acl` on every interface and direction.
    ///
    /// Returns the (interface, direction) pairs that referenced it.
    pub fn remove_all(&mut self, acl: AclHandle) -> Vec<(u32, Direction)> {
        let mut touched = Vec::new();
        for (sw_if_index, lists) in self.by_interface.iter_mut() {
            for direction in [Direction::Input, Direction::Output] {
                let list = &mut lists[direction.slot()];
                let before = list.len();
                list.retain(|h| *h != acl);
                if list.len() != before {
                    touched.push((*sw_if_index, direction));
                }
            }
        }
        self.by_interface
            .retain(|_, lists| lists.iter().any(|l| !l.is_empty()));
        touched.sort_by_key(|(i, d)| (*i, d.slot()));
        touched
    }

    pub fn is_bound(&self, sw_if_index: u32) -> bool {
        self.by_interface.contains_key(&sw_if_index)
    }

    /// Interfaces with at least one binding, ascending
    pub fn interfaces(&self) -> Vec<u32> {
        let mut ifs: Vec<u32> = self.by_interface.keys().copied().collect();
        ifs.sort_unstable();
        ifs
    }

    /// Total number of (interface, direction, handle) entries
    pub fn len(&self) -> usize {
        self.by_interface
            .values()
            .map(|lists| lists[0].len() + lists[1].len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_interface.is_empty()
    }
}
