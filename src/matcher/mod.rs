mod prefix;
mod rule;

pub use prefix::{match_addr, match_prefix_bytes};

use crate::tables::Tables;
use crate::types::{Classification, Direction, FiveTuple, Verdict};

/// Trait for flow matchers
pub trait TupleMatcher: Send + Sync {
    /// Check if the flow matches this matcher
    fn matches(&self, tuple: &FiveTuple) -> bool;
}

/// Evaluate the ACLs bound to (sw_if_index, direction) against `tuple`.
///
/// ACLs are scanned in binding order and rules in ACL order; the first rule
/// whose every predicate holds decides. When nothing matches, `default`
/// becomes the verdict and `matched_acl` stays `None`. Reads only the
/// snapshot: no locking, no allocation.
pub fn classify(
    tables: &Tables,
    tuple: &FiveTuple,
    sw_if_index: u32,
    direction: Direction,
    default: Verdict,
) -> Classification {
    for &handle in tables.list_for(sw_if_index, direction) {
        // Bindings only name live ACLs within one snapshot.
        let Some(acl) = tables.store().get(handle) else {
            continue;
        };
        for (index, rule) in acl.rules.iter().enumerate() {
            if rule.matches(tuple) {
                return Classification::matched(handle, index, rule.action);
            }
        }
    }
    Classification::unmatched(default)
}
