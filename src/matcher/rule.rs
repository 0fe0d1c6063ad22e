use super::prefix::match_addr;
use super::TupleMatcher;
use crate::types::{FiveTuple, Rule};

impl TupleMatcher for Rule {
    #[inline]
    fn matches(&self, tuple: &FiveTuple) -> bool {
        if self.is_ipv6() != tuple.is_ipv6() {
            return false;
        }
        if !match_addr(&tuple.dst, &self.dst) {
            return false;
        }
        if !match_addr(&tuple.src, &self.src) {
            return false;
        }
        if self.proto != 0 && self.proto != tuple.proto {
            return false;
        }
        if self.dst_port != 0 && self.dst_port != tuple.dst_port {
            return false;
        }
        self.src_port == 0 || self.src_port == tuple.src_port
    }
}
