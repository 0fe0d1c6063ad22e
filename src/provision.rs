//! Management API surface.
//!
//! Request/reply shaped wrappers over the engine's control plane. Every call
//! returns an `ApiStatus`; ACL indices cross the boundary as raw integers
//! (see `AclHandle::to_raw`).

use std::sync::Arc;

use crate::engine::AclEngine;
use crate::error::{AclError, ApiStatus, Result};
use crate::types::{Acl, AclHandle, Direction, Rule};

/// Index reported when no ACL was created
pub const INVALID_ACL_INDEX: u64 = u64::MAX;

/// Reply to `acl_add`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AclAddReply {
    pub retval: i32,
    pub acl_index: u64,
}

/// Which interfaces `acl_dump` reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpFilter {
    All,
    Interface(u32),
}

/// One dumped binding: an ACL as bound to an interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclDetails {
    pub sw_if_index: u32,
    pub direction: Direction,
    pub acl_index: u64,
    pub tag: String,
    pub rules: Vec<Rule>,
}

/// Provisioning front end for one engine.
#[derive(Clone)]
pub struct Provisioner {
    engine: Arc<AclEngine>,
}

impl Provisioner {
    pub fn new(engine: Arc<AclEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<AclEngine> {
        &self.engine
    }

    /// Create an ACL from `rules`.
    pub fn acl_add(&self, rules: Vec<Rule>) -> AclAddReply {
        self.acl_add_tagged("", rules)
    }

    pub fn acl_add_tagged(&self, tag: &str, rules: Vec<Rule>) -> AclAddReply {
        let res = self.engine.add_acl(Acl::new(rules).with_tag(tag));
        AclAddReply {
            retval: ApiStatus::from(&res).retval(),
            acl_index: res.map_or(INVALID_ACL_INDEX, AclHandle::to_raw),
        }
    }

    pub fn acl_del(&self, acl_index: u64) -> ApiStatus {
        ApiStatus::from(&self.engine.delete_acl(AclHandle::from_raw(acl_index)))
    }

    /// Bind or unbind an ACL. The interface is checked first; on any failure
    /// nothing changes.
    pub fn acl_interface_add_del(
        &self,
        sw_if_index: u32,
        is_add: bool,
        is_input: bool,
        acl_index: u64,
    ) -> ApiStatus {
        let direction = Direction::from_is_input(is_input);
        let handle = AclHandle::from_raw(acl_index);
        let res = if is_add {
            self.engine.bind(sw_if_index, direction, handle)
        } else {
            self.engine.unbind(sw_if_index, direction, handle)
        };
        ApiStatus::from(&res)
    }

    /// Bound ACLs with their rules, input list then output list per interface.
    ///
    /// `All` walks every interface that still exists and has bindings; a
    /// named interface that does not exist yields `InvalidInterface`.
    pub fn acl_dump(&self, filter: DumpFilter) -> Result<Vec<AclDetails>> {
        let tables = self.engine.snapshot();
        let interfaces = match filter {
            DumpFilter::All => tables
                .bindings()
                .interfaces()
                .into_iter()
                .filter(|&i| self.engine.interface_is_valid(i))
                .collect(),
            DumpFilter::Interface(sw_if_index) => {
                if !self.engine.interface_is_valid(sw_if_index) {
                    return Err(AclError::InvalidInterface(sw_if_index));
                }
                vec![sw_if_index]
            }
        };

        let mut out = Vec::new();
        for sw_if_index in interfaces {
            for direction in [Direction::Input, Direction::Output] {
                for &handle in tables.list_for(sw_if_index, direction) {
                    let acl = tables.get_acl(handle)?;
                    out.push(AclDetails {
                        sw_if_index,
                        direction,
                        acl_index: handle.to_raw(),
                        tag: acl.tag.clone(),
                        rules: acl.rules.clone(),
                    });
                }
            }
        }
        Ok(out)
    }

    /// Pair two interfaces for session mirroring; `None` unpairs `fwd`.
    pub fn session_bind(&self, fwd: u32, rev: Option<u32>) -> ApiStatus {
        ApiStatus::from(&self.engine.bind_pair(fwd, rev))
    }
}
