//! Bidirectional pairing of interfaces for session mirroring.
//!
//! By default a session created on (if, dir) installs its mirrored key on
//! (if, opposite dir). Pairing `fwd` with `rev` sends the mirrored key to
//! `rev` instead, so a flow entering on one port and leaving on another has
//! its reply recognised where the reply arrives. The relation is symmetric.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct PairTable {
    peers: HashMap<u32, u32>,
}

impl PairTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pair `fwd` with `rev`, or break `fwd`'s pairing when `rev` is `None`.
    ///
    /// Existing pairings of either member are broken first.
    pub fn bind(&mut self, fwd: u32, rev: Option<u32>) {
        match rev {
            Some(rev) => {
                if let Some(old) = self.peers.remove(&rev) {
                    self.peers.remove(&old);
                }
                if let Some(old) = self.peers.remove(&fwd) {
                    self.peers.remove(&old);
                }
                self.peers.insert(fwd, rev);
                self.peers.insert(rev, fwd);
            }
            None => {
                if let Some(old) = self.peers.remove(&fwd) {
                    self.peers.remove(&old);
                }
            }
        }
    }

    pub fn peer_of(&self, sw_if_index: u32) -> Option<u32> {
        self.peers.get(&sw_if_index).copied()
    }

    /// Interface receiving the mirrored session key for traffic on `sw_if_index`
    pub fn mirror_interface(&self, sw_if_index: u32) -> u32 {
        self.peer_of(sw_if_index).unwrap_or(sw_if_index)
    }

    /// All (interface, peer) entries, ascending; each pair appears twice.
    pub fn entries(&self) -> Vec<(u32, u32)> {
        let mut out: Vec<(u32, u32)> = self.peers.iter().map(|(a, b)| (*a, *b)).collect();
        out.sort_unstable();
        out
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
