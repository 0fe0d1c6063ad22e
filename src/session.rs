//! Session table.
//!
//! Flow entries for stateful matching. Each session is reachable under two
//! keys: the direct key of the packet that created it, and the mirrored key
//! a reply carries (addresses and ports swapped, opposite direction, on the
//! paired interface). Both keys hash to the same shard, so a lookup touches
//! exactly one lock and workers on different flows rarely contend.
//!
//! Every shard is pre-sized: slots, free list and key index are allocated
//! up front and never grow, so the steady state does not allocate. Capacity
//! is split evenly per shard, so "full" means the flow's shard is full even
//! when other shards have room.
//!
//! Sessions idle past their timeout are removed outright by the reaper; no
//! entry is ever observable in an expired state.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{AclError, CapacityKind, Result};
use crate::types::{Direction, FiveTuple, IPPROTO_TCP};

/// Key a session is filed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub sw_if_index: u32,
    pub direction: Direction,
    pub tuple: FiveTuple,
}

impl SessionKey {
    pub fn new(sw_if_index: u32, direction: Direction, tuple: FiveTuple) -> Self {
        Self {
            sw_if_index,
            direction,
            tuple,
        }
    }

    /// The key a reply to this flow carries when seen on `sw_if_index`
    pub fn mirrored_on(&self, sw_if_index: u32) -> Self {
        Self {
            sw_if_index,
            direction: self.direction.opposite(),
            tuple: self.tuple.mirrored(),
        }
    }
}

/// Which idle timeout applies to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutClass {
    Tcp,
    /// UDP and everything else
    Udp,
}

impl TimeoutClass {
    pub fn for_proto(proto: u8) -> Self {
        if proto == IPPROTO_TCP {
            TimeoutClass::Tcp
        } else {
            TimeoutClass::Udp
        }
    }
}

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    /// Both sides sent FIN; lingers for the closing timeout so the last ACKs pass
    Closing,
    /// Torn down explicitly (TCP RST, interface purge, manual removal)
    Reset,
}

/// Side of a session a packet was seen on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowSide {
    /// Same direction as the packet that created the session
    Original,
    /// Reply direction, matched through the mirrored key
    Reply,
}

impl FlowSide {
    fn slot(self) -> usize {
        match self {
            FlowSide::Original => 0,
            FlowSide::Reply => 1,
        }
    }
}

/// A tracked flow. Returned by value; the live record stays in its shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionEntry {
    pub key: SessionKey,
    /// Mirrored key, if it was installed
    pub mirror: Option<SessionKey>,
    pub class: TimeoutClass,
    pub state: SessionState,
    pub created: Instant,
    pub last_active: Instant,
    /// Packets per side, indexed original then reply
    pub packets: [u64; 2],
    pub bytes: [u64; 2],
    /// FIN seen per side, indexed like `packets`
    pub fin: [bool; 2],
}

impl SessionEntry {
    pub fn total_packets(&self) -> u64 {
        self.packets[0] + self.packets[1]
    }

    pub fn total_bytes(&self) -> u64 {
        self.bytes[0] + self.bytes[1]
    }

    fn touch(&mut self, side: FlowSide, byte_len: usize, now: Instant) {
        let i = side.slot();
        self.packets[i] += 1;
        self.bytes[i] += byte_len as u64;
        if now > self.last_active {
            self.last_active = now;
        }
    }

    fn timeout(&self, timeouts: &SessionTimeouts) -> Duration {
        match self.state {
            SessionState::Closing => timeouts.closing,
            _ => timeouts.for_class(self.class),
        }
    }

    fn is_expired(&self, now: Instant, timeouts: &SessionTimeouts) -> bool {
        now.saturating_duration_since(self.last_active) > self.timeout(timeouts)
    }

    fn on_interface(&self, sw_if_index: u32) -> bool {
        self.key.sw_if_index == sw_if_index
            || self.mirror.is_some_and(|m| m.sw_if_index == sw_if_index)
    }
}

/// Stable reference to a session; stale once the session is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId {
    shard: u32,
    slot: u32,
    generation: u32,
}

/// Outcome of a session lookup
#[derive(Debug, Clone, Copy)]
pub struct SessionHit {
    pub id: SessionId,
    /// Entry state after this packet was counted
    pub entry: SessionEntry,
    pub side: FlowSide,
    pub created: bool,
}

/// Idle timeouts per class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    pub tcp: Duration,
    pub udp: Duration,
    /// Applies once both sides of a TCP session sent FIN
    pub closing: Duration,
}

impl SessionTimeouts {
    pub fn for_class(&self, class: TimeoutClass) -> Duration {
        match class {
            TimeoutClass::Tcp => self.tcp,
            TimeoutClass::Udp => self.udp,
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entry: Option<SessionEntry>,
}

#[derive(Debug)]
struct Shard {
    index: HashMap<SessionKey, u32>,
    slots: Vec<Slot>,
    free: Vec<u32>,
    cursor: usize,
}

impl Shard {
    fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, Slot::default);
        Self {
            index: HashMap::with_capacity(capacity * 2),
            slots,
            free: (0..capacity as u32).rev().collect(),
            cursor: 0,
        }
    }

    fn find(&self, key: &SessionKey) -> Option<(u32, FlowSide)> {
        let slot = *self.index.get(key)?;
        let entry = self.slots[slot as usize].entry.as_ref()?;
        let side = if entry.key == *key {
            FlowSide::Original
        } else {
            FlowSide::Reply
        };
        Some((slot, side))
    }

    fn insert(&mut self, key: SessionKey, mirror: SessionKey, now: Instant) -> Option<u32> {
        let slot = self.free.pop()?;
        self.index.insert(key, slot);
        // Never steal a key another session already owns.
        let mirror = if mirror != key && !self.index.contains_key(&mirror) {
            self.index.insert(mirror, slot);
            Some(mirror)
        } else {
            None
        };
        self.slots[slot as usize].entry = Some(SessionEntry {
            key,
            mirror,
            class: TimeoutClass::for_proto(key.tuple.proto),
            state: SessionState::Active,
            created: now,
            last_active: now,
            packets: [0; 2],
            bytes: [0; 2],
            fin: [false; 2],
        });
        Some(slot)
    }

    fn release(&mut self, slot: u32, state: SessionState) -> Option<SessionEntry> {
        let s = &mut self.slots[slot as usize];
        let mut entry = s.entry.take()?;
        s.generation = s.generation.wrapping_add(1);
        if self.index.get(&entry.key) == Some(&slot) {
            self.index.remove(&entry.key);
        }
        if let Some(mirror) = entry.mirror {
            if self.index.get(&mirror) == Some(&slot) {
                self.index.remove(&mirror);
            }
        }
        self.free.push(slot);
        entry.state = state;
        Some(entry)
    }

    fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

/// Sharded, pre-sized table of flow sessions.
pub struct SessionTable {
    shards: Vec<Mutex<Shard>>,
    per_shard: usize,
    timeouts: SessionTimeouts,
    hasher: RandomState,
}

impl SessionTable {
    /// Create a table holding up to `capacity` sessions across `shards` shards.
    pub fn new(capacity: usize, shards: usize, timeouts: SessionTimeouts) -> Self {
        let shards = shards.max(1);
        let per_shard = capacity.div_ceil(shards).max(1);
        Self {
            shards: (0..shards)
                .map(|_| Mutex::new(Shard::with_capacity(per_shard)))
                .collect(),
            per_shard,
            timeouts,
            hasher: RandomState::new(),
        }
    }

    pub fn timeouts(&self) -> SessionTimeouts {
        self.timeouts
    }

    /// Slots actually allocated. Rounds up to a multiple of the shard count.
    pub fn capacity(&self) -> usize {
        self.per_shard * self.shards.len()
    }

    /// Sessions one shard can hold
    pub fn shard_capacity(&self) -> usize {
        self.per_shard
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Shard index, identical for a tuple and its mirror.
    fn shard_for(&self, tuple: &FiveTuple) -> usize {
        let a: (IpAddr, u16) = (tuple.src, tuple.src_port);
        let b: (IpAddr, u16) = (tuple.dst, tuple.dst_port);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        (self.hasher.hash_one((tuple.proto, lo, hi)) % self.shards.len() as u64) as usize
    }

    /// Find the session `key` belongs to and count the packet on it.
    pub fn lookup(&self, key: &SessionKey, byte_len: usize, now: Instant) -> Option<SessionHit> {
        let shard_idx = self.shard_for(&key.tuple);
        let mut shard = self.shards[shard_idx].lock();
        let (slot, side) = shard.find(key)?;
        let s = &mut shard.slots[slot as usize];
        let entry = s.entry.as_mut()?;
        entry.touch(side, byte_len, now);
        Some(SessionHit {
            id: SessionId {
                shard: shard_idx as u32,
                slot,
                generation: s.generation,
            },
            entry: *entry,
            side,
            created: false,
        })
    }

    /// Look `key` up, creating the session on a miss.
    ///
    /// A new session is filed under `key` and under its mirror on
    /// `mirror_sw_if_index`. Fails with `CapacityExceeded` carrying the
    /// per-shard limit when the flow's shard is full; the caller decides
    /// whether the packet still passes.
    pub fn lookup_or_create(
        &self,
        key: SessionKey,
        mirror_sw_if_index: u32,
        byte_len: usize,
        now: Instant,
    ) -> Result<SessionHit> {
        let shard_idx = self.shard_for(&key.tuple);
        let mut shard = self.shards[shard_idx].lock();

        let (slot, side, created) = match shard.find(&key) {
            Some((slot, side)) => (slot, side, false),
            None => {
                let mirror = key.mirrored_on(mirror_sw_if_index);
                let slot = shard.insert(key, mirror, now).ok_or(AclError::CapacityExceeded {
                    kind: CapacityKind::Session,
                    limit: self.per_shard,
                })?;
                (slot, FlowSide::Original, true)
            }
        };

        let s = &mut shard.slots[slot as usize];
        let generation = s.generation;
        let entry = s.entry.as_mut().ok_or(AclError::SessionNotFound)?;
        entry.touch(side, byte_len, now);
        Ok(SessionHit {
            id: SessionId {
                shard: shard_idx as u32,
                slot,
                generation,
            },
            entry: *entry,
            side,
            created,
        })
    }

    /// Count a packet on a known session and refresh its idle timer.
    pub fn touch(&self, id: SessionId, side: FlowSide, byte_len: usize, now: Instant) -> Result<SessionEntry> {
        let mut shard = self
            .shards
            .get(id.shard as usize)
            .ok_or(AclError::SessionNotFound)?
            .lock();
        let s = shard
            .slots
            .get_mut(id.slot as usize)
            .filter(|s| s.generation == id.generation)
            .ok_or(AclError::SessionNotFound)?;
        let entry = s.entry.as_mut().ok_or(AclError::SessionNotFound)?;
        entry.touch(side, byte_len, now);
        Ok(*entry)
    }

    /// Record a FIN from `side`. Once both sides have sent one the session
    /// switches to `Closing` and ages out on the closing timeout.
    pub fn observe_fin(&self, id: SessionId, side: FlowSide) -> Result<SessionEntry> {
        let mut shard = self
            .shards
            .get(id.shard as usize)
            .ok_or(AclError::SessionNotFound)?
            .lock();
        let s = shard
            .slots
            .get_mut(id.slot as usize)
            .filter(|s| s.generation == id.generation)
            .ok_or(AclError::SessionNotFound)?;
        let entry = s.entry.as_mut().ok_or(AclError::SessionNotFound)?;
        entry.fin[side.slot()] = true;
        if entry.fin == [true, true] {
            entry.state = SessionState::Closing;
        }
        Ok(*entry)
    }

    /// Current state of a session without counting a packet
    pub fn get(&self, key: &SessionKey) -> Option<SessionEntry> {
        let shard = self.shards[self.shard_for(&key.tuple)].lock();
        let (slot, _) = shard.find(key)?;
        shard.slots[slot as usize].entry
    }

    /// Tear down the session `key` belongs to (either of its keys works).
    pub fn remove(&self, key: &SessionKey) -> Result<SessionEntry> {
        let mut shard = self.shards[self.shard_for(&key.tuple)].lock();
        let (slot, _) = shard.find(key).ok_or(AclError::SessionNotFound)?;
        shard
            .release(slot, SessionState::Reset)
            .ok_or(AclError::SessionNotFound)
    }

    /// Remove every session with a key on `sw_if_index`.
    pub fn purge_interface(&self, sw_if_index: u32) -> usize {
        let mut removed = 0;
        for shard in &self.shards {
            let mut shard = shard.lock();
            for slot in 0..shard.slots.len() {
                let hit = shard.slots[slot]
                    .entry
                    .as_ref()
                    .is_some_and(|e| e.on_interface(sw_if_index));
                if hit && shard.release(slot as u32, SessionState::Reset).is_some() {
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Remove every session idle past its timeout.
    ///
    /// Shards are swept one at a time, so workers are only ever held off
    /// the shard being swept.
    pub fn reap(&self, now: Instant) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                let mut shard = shard.lock();
                let n = shard.slots.len();
                sweep(&mut shard, now, &self.timeouts, n)
            })
            .sum()
    }

    /// Examine at most `budget` slots per shard, resuming where the previous
    /// call stopped. Repeated calls cover the whole table.
    pub fn reap_budgeted(&self, now: Instant, budget: usize) -> usize {
        self.shards
            .iter()
            .map(|shard| sweep(&mut shard.lock(), now, &self.timeouts, budget))
            .sum()
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().live()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every live session, for introspection
    pub fn entries(&self) -> Vec<SessionEntry> {
        let mut out = Vec::new();
        for shard in &self.shards {
            let shard = shard.lock();
            out.extend(shard.slots.iter().filter_map(|s| s.entry));
        }
        out
    }
}

fn sweep(shard: &mut Shard, now: Instant, timeouts: &SessionTimeouts, budget: usize) -> usize {
    let n = shard.slots.len();
    if n == 0 {
        return 0;
    }
    let mut removed = 0;
    for _ in 0..budget.min(n) {
        let slot = shard.cursor;
        shard.cursor = (shard.cursor + 1) % n;
        let expired = shard.slots[slot]
            .entry
            .as_ref()
            .is_some_and(|e| e.is_expired(now, timeouts));
        if expired && shard.release(slot as u32, SessionState::Reset).is_some() {
            removed += 1;
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IPPROTO_UDP;

    const TIMEOUTS: SessionTimeouts = SessionTimeouts {
        tcp: Duration::from_secs(86400),
        udp: Duration::from_secs(600),
        closing: Duration::from_secs(4),
    };

    fn key(proto: u8) -> SessionKey {
        SessionKey::new(
            1,
            Direction::Input,
            FiveTuple::new(
                "10.0.0.1".parse().unwrap(),
                "10.0.0.2".parse().unwrap(),
                proto,
                40000,
                53,
            ),
        )
    }

    #[test]
    fn test_create_then_hit() {
        let table = SessionTable::new(64, 4, TIMEOUTS);
        let now = Instant::now();
        let k = key(IPPROTO_UDP);

        let first = table.lookup_or_create(k, 1, 100, now).unwrap();
        assert!(first.created);
        assert_eq!(first.side, FlowSide::Original);

        let second = table.lookup_or_create(k, 1, 50, now).unwrap();
        assert!(!second.created);
        assert_eq!(second.id, first.id);
        assert_eq!(second.entry.packets, [2, 0]);
        assert_eq!(second.entry.bytes, [150, 0]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_reply_hits_mirrored_key() {
        let table = SessionTable::new(64, 4, TIMEOUTS);
        let now = Instant::now();
        let k = key(IPPROTO_UDP);
        let created = table.lookup_or_create(k, 1, 100, now).unwrap();

        let reply = k.mirrored_on(1);
        assert_eq!(reply.direction, Direction::Output);
        let hit = table.lookup(&reply, 300, now).unwrap();
        assert_eq!(hit.id, created.id);
        assert_eq!(hit.side, FlowSide::Reply);
        assert_eq!(hit.entry.packets, [1, 1]);
        assert_eq!(hit.entry.total_packets(), 2);
        assert_eq!(hit.entry.total_bytes(), 400);
    }

    #[test]
    fn test_reply_on_wrong_side_misses() {
        let table = SessionTable::new(64, 4, TIMEOUTS);
        let k = key(IPPROTO_UDP);
        table.lookup_or_create(k, 1, 1, Instant::now()).unwrap();

        // Same swapped tuple but arriving in the same direction is a different flow.
        let other = SessionKey::new(1, Direction::Input, k.tuple.mirrored());
        assert!(table.lookup(&other, 1, Instant::now()).is_none());
    }

    #[test]
    fn test_capacity_exceeded() {
        let table = SessionTable::new(1, 1, TIMEOUTS);
        let now = Instant::now();
        table.lookup_or_create(key(IPPROTO_UDP), 1, 1, now).unwrap();
        let res = table.lookup_or_create(key(IPPROTO_TCP), 1, 1, now);
        assert!(matches!(
            res,
            Err(AclError::CapacityExceeded {
                kind: CapacityKind::Session,
                ..
            })
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_capacity_error_reports_shard_limit() {
        let table = SessionTable::new(5, 4, TIMEOUTS);
        assert_eq!(table.shard_capacity(), 2);
        assert_eq!(table.capacity(), 8);

        let now = Instant::now();
        let mut limit = None;
        for port in 0..16u16 {
            let mut k = key(IPPROTO_UDP);
            k.tuple.src_port = 1000 + port;
            if let Err(AclError::CapacityExceeded { limit: l, .. }) = table.lookup_or_create(k, 1, 1, now) {
                limit = Some(l);
                break;
            }
        }
        // Some shard fills before the table as a whole does.
        assert_eq!(limit, Some(2));
        assert!(table.len() <= 8);
    }

    #[test]
    fn test_fin_from_both_sides_closes() {
        let table = SessionTable::new(16, 2, TIMEOUTS);
        let start = Instant::now();
        let k = key(IPPROTO_TCP);
        let hit = table.lookup_or_create(k, 1, 1, start).unwrap();

        let e = table.observe_fin(hit.id, FlowSide::Original).unwrap();
        assert_eq!(e.state, SessionState::Active);
        assert_eq!(e.fin, [true, false]);
        // A repeated FIN from the same side changes nothing.
        let e = table.observe_fin(hit.id, FlowSide::Original).unwrap();
        assert_eq!(e.state, SessionState::Active);

        let e = table.observe_fin(hit.id, FlowSide::Reply).unwrap();
        assert_eq!(e.state, SessionState::Closing);
        assert_eq!(table.get(&k.mirrored_on(1)).unwrap().state, SessionState::Closing);

        assert_eq!(table.reap(start + Duration::from_secs(4)), 0);
        assert_eq!(table.reap(start + Duration::from_secs(5)), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn test_remove_by_either_key() {
        let table = SessionTable::new(16, 2, TIMEOUTS);
        let k = key(IPPROTO_TCP);
        table.lookup_or_create(k, 1, 1, Instant::now()).unwrap();

        let removed = table.remove(&k.mirrored_on(1)).unwrap();
        assert_eq!(removed.state, SessionState::Reset);
        assert!(table.get(&k).is_none());
        assert!(matches!(table.remove(&k), Err(AclError::SessionNotFound)));
    }

    #[test]
    fn test_stale_id_rejected() {
        let table = SessionTable::new(4, 1, TIMEOUTS);
        let now = Instant::now();
        let hit = table.lookup_or_create(key(IPPROTO_UDP), 1, 1, now).unwrap();
        table.remove(&hit.entry.key).unwrap();
        table.lookup_or_create(key(IPPROTO_TCP), 1, 1, now).unwrap();
        assert!(matches!(
            table.touch(hit.id, FlowSide::Original, 1, now),
            Err(AclError::SessionNotFound)
        ));
    }

    #[test]
    fn test_reap_by_class() {
        let table = SessionTable::new(16, 2, TIMEOUTS);
        let start = Instant::now();
        table.lookup_or_create(key(IPPROTO_UDP), 1, 1, start).unwrap();
        table.lookup_or_create(key(IPPROTO_TCP), 1, 1, start).unwrap();

        assert_eq!(table.reap(start + Duration::from_secs(600)), 0);
        assert_eq!(table.reap(start + Duration::from_secs(601)), 1);
        assert!(table.get(&key(IPPROTO_UDP)).is_none());
        assert!(table.get(&key(IPPROTO_TCP)).is_some());
        assert_eq!(table.reap(start + Duration::from_secs(86401)), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn test_touch_defers_expiry() {
        let table = SessionTable::new(16, 2, TIMEOUTS);
        let start = Instant::now();
        let hit = table.lookup_or_create(key(IPPROTO_UDP), 1, 1, start).unwrap();
        table
            .touch(hit.id, FlowSide::Reply, 10, start + Duration::from_secs(500))
            .unwrap();
        assert_eq!(table.reap(start + Duration::from_secs(700)), 0);
        assert_eq!(table.reap(start + Duration::from_secs(1101)), 1);
    }

    #[test]
    fn test_reap_budgeted_covers_table() {
        let table = SessionTable::new(8, 1, TIMEOUTS);
        let start = Instant::now();
        for port in 0..8u16 {
            let mut k = key(IPPROTO_UDP);
            k.tuple.src_port = 1000 + port;
            table.lookup_or_create(k, 1, 1, start).unwrap();
        }
        let later = start + Duration::from_secs(601);
        let mut removed = 0;
        for _ in 0..4 {
            removed += table.reap_budgeted(later, 2);
        }
        assert_eq!(removed, 8);
        assert!(table.is_empty());
    }

    #[test]
    fn test_purge_interface() {
        let table = SessionTable::new(16, 2, TIMEOUTS);
        let now = Instant::now();
        let a = key(IPPROTO_UDP);
        let mut b = key(IPPROTO_UDP);
        b.sw_if_index = 2;
        b.tuple.src_port = 1;
        table.lookup_or_create(a, 1, 1, now).unwrap();
        // Paired: mirror lands on interface 3.
        table.lookup_or_create(b, 3, 1, now).unwrap();

        assert_eq!(table.purge_interface(3), 1);
        assert_eq!(table.len(), 1);
        assert_eq!(table.purge_interface(1), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn test_mirror_shares_shard() {
        let table = SessionTable::new(64, 16, TIMEOUTS);
        let t = key(IPPROTO_TCP).tuple;
        assert_eq!(table.shard_for(&t), table.shard_for(&t.mirrored()));
    }
}
