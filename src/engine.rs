//! The ACL engine context.
//!
//! One `AclEngine` owns everything: the published rule/binding snapshot, the
//! session table, the rewrite cache and the counters. Control-plane calls
//! serialise on a writer lock and publish a fresh snapshot; data-plane calls
//! read the current snapshot without locking and touch exactly one session
//! shard.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::cache::RewriteCache;
use crate::config::EngineOptions;
use crate::error::{AclError, Result};
use crate::host::{AnyInterface, InterfaceRegistry, NoopSteering, TrafficSteering};
use crate::matcher;
use crate::packet::{self, PacketHeaders};
use crate::session::{SessionId, SessionKey, SessionTable, SessionTimeouts};
use crate::stats::{bump, EngineStats, StatsSnapshot};
use crate::tables::Tables;
use crate::types::{Acl, AclHandle, Action, Classification, Direction, FiveTuple, Verdict};

/// Why a packet got its verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReason {
    /// Matched an existing session
    Session,
    /// Matched a rule
    Rule,
    /// No rule matched; default policy applied
    Default,
    /// Not an IPv4/IPv6 frame
    NotIp,
    /// Headers could not be parsed
    Malformed,
}

/// Result of processing one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub verdict: Verdict,
    pub reason: DecisionReason,
    /// Present whenever ACLs were evaluated
    pub classification: Option<Classification>,
    /// Session the packet hit or created
    pub session: Option<SessionId>,
}

impl Decision {
    pub fn is_permit(&self) -> bool {
        self.verdict.is_permit()
    }
}

/// Packet classifier and session tracker for one dataplane.
pub struct AclEngine {
    options: EngineOptions,
    tables: ArcSwap<Tables>,
    version: AtomicU64,
    writer: Mutex<()>,
    sessions: SessionTable,
    rewrites: RewriteCache,
    stats: EngineStats,
    interfaces: Arc<dyn InterfaceRegistry>,
    steering: Arc<dyn TrafficSteering>,
}

impl AclEngine {
    /// Create an engine that accepts every interface and steers nothing.
    pub fn new(options: EngineOptions) -> Result<Self> {
        Self::with_host(options, Arc::new(AnyInterface), Arc::new(NoopSteering))
    }

    /// Create an engine wired to the host's interface registry and steering.
    pub fn with_host(
        options: EngineOptions,
        interfaces: Arc<dyn InterfaceRegistry>,
        steering: Arc<dyn TrafficSteering>,
    ) -> Result<Self> {
        options.validate()?;
        let sessions = SessionTable::new(
            options.session_capacity,
            options.session_shards,
            SessionTimeouts {
                tcp: options.tcp_idle_timeout,
                udp: options.udp_idle_timeout,
                closing: options.tcp_closing_timeout,
            },
        );
        let rewrites = RewriteCache::new(options.rewrite_cache_size, options.rewrite_cache_timeout);
        Ok(Self {
            tables: ArcSwap::from_pointee(Tables::new(options.max_acls, options.max_rules_per_acl)),
            version: AtomicU64::new(0),
            writer: Mutex::new(()),
            sessions,
            rewrites,
            stats: EngineStats::default(),
            interfaces,
            steering,
            options,
        })
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Current published snapshot
    pub fn snapshot(&self) -> Arc<Tables> {
        self.tables.load_full()
    }

    /// Number of snapshots published so far
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn publish(&self, next: Tables) {
        self.tables.store(Arc::new(next));
        self.version.fetch_add(1, Ordering::Release);
    }

    fn check_interface(&self, sw_if_index: u32) -> Result<()> {
        if self.interfaces.is_valid(sw_if_index) {
            Ok(())
        } else {
            Err(AclError::InvalidInterface(sw_if_index))
        }
    }

    pub(crate) fn interface_is_valid(&self, sw_if_index: u32) -> bool {
        self.interfaces.is_valid(sw_if_index)
    }

    // ---- Control plane -------------------------------------------------

    /// Commit `acl` to the rule store.
    pub fn add_acl(&self, acl: Acl) -> Result<AclHandle> {
        let _guard = self.writer.lock();
        let mut next = Tables::clone(&self.tables.load());
        let handle = next.add_acl(acl).inspect_err(|e| warn!("add_acl rejected: {}", e))?;
        self.publish(next);
        info!(acl = %handle, "ACL added");
        Ok(handle)
    }

    /// Unbind `handle` from every interface, then free it, in one snapshot.
    pub fn delete_acl(&self, handle: AclHandle) -> Result<()> {
        let _guard = self.writer.lock();
        let mut next = Tables::clone(&self.tables.load());
        let touched = next.delete_acl(handle)?;

        for &(sw_if_index, direction) in &touched {
            if next.list_for(sw_if_index, direction).is_empty() {
                self.steering.unhook(sw_if_index, direction);
            }
        }
        self.publish(next);

        let snapshot = self.tables.load();
        let mut purged = 0;
        let mut last = None;
        for &(sw_if_index, _) in &touched {
            if last == Some(sw_if_index) {
                continue;
            }
            last = Some(sw_if_index);
            if !snapshot.bindings().is_bound(sw_if_index) {
                purged += self.sessions.purge_interface(sw_if_index);
            }
        }
        info!(acl = %handle, unbound = touched.len(), purged, "ACL deleted");
        Ok(())
    }

    pub fn get_acl(&self, handle: AclHandle) -> Result<Arc<Acl>> {
        self.tables.load().get_acl(handle)
    }

    /// Append `handle` to the list for (`sw_if_index`, `direction`).
    pub fn bind(&self, sw_if_index: u32, direction: Direction, handle: AclHandle) -> Result<()> {
        self.check_interface(sw_if_index)?;
        let _guard = self.writer.lock();
        let mut next = Tables::clone(&self.tables.load());
        let was_empty = next.list_for(sw_if_index, direction).is_empty();
        next.bind(sw_if_index, direction, handle)?;
        self.publish(next);
        if was_empty {
            self.steering.hook(sw_if_index, direction);
        }
        debug!(sw_if_index, %direction, acl = %handle, "ACL bound");
        Ok(())
    }

    /// Remove the first occurrence of `handle` from (`sw_if_index`, `direction`).
    pub fn unbind(&self, sw_if_index: u32, direction: Direction, handle: AclHandle) -> Result<()> {
        self.check_interface(sw_if_index)?;
        let _guard = self.writer.lock();
        let mut next = Tables::clone(&self.tables.load());
        next.unbind(sw_if_index, direction, handle)?;
        if next.list_for(sw_if_index, direction).is_empty() {
            self.steering.unhook(sw_if_index, direction);
        }
        let still_bound = next.bindings().is_bound(sw_if_index);
        self.publish(next);
        if !still_bound {
            let purged = self.sessions.purge_interface(sw_if_index);
            debug!(sw_if_index, purged, "interface left without ACLs");
        }
        debug!(sw_if_index, %direction, acl = %handle, "ACL unbound");
        Ok(())
    }

    /// ACLs bound to (`sw_if_index`, `direction`) in evaluation order
    pub fn list_for(&self, sw_if_index: u32, direction: Direction) -> Vec<AclHandle> {
        self.tables.load().list_for(sw_if_index, direction).to_vec()
    }

    /// Pair `fwd` with `rev` for session mirroring; `None` breaks the pairing.
    pub fn bind_pair(&self, fwd: u32, rev: Option<u32>) -> Result<()> {
        self.check_interface(fwd)?;
        if let Some(rev) = rev {
            self.check_interface(rev)?;
        }
        let _guard = self.writer.lock();
        let mut next = Tables::clone(&self.tables.load());
        next.pairs.bind(fwd, rev);
        self.publish(next);
        info!(fwd, ?rev, "session pairing updated");
        Ok(())
    }

    pub fn peer_of(&self, sw_if_index: u32) -> Option<u32> {
        self.tables.load().pairs().peer_of(sw_if_index)
    }

    // ---- Data plane ----------------------------------------------------

    /// Evaluate the bound ACLs against a parsed tuple.
    #[inline]
    pub fn classify(&self, tuple: &FiveTuple, sw_if_index: u32, direction: Direction) -> Classification {
        let tables = self.tables.load();
        matcher::classify(
            &tables,
            tuple,
            sw_if_index,
            direction,
            self.options.default_policy.verdict(),
        )
    }

    /// Parse an Ethernet frame and classify it. `Ok(None)` for non-IP frames.
    pub fn classify_frame(
        &self,
        frame: &[u8],
        sw_if_index: u32,
        direction: Direction,
    ) -> Result<Option<Classification>> {
        Ok(packet::parse_ethernet(frame)?
            .map(|headers| self.classify(&headers.tuple, sw_if_index, direction)))
    }

    /// Full per-packet path: parse, session lookup, classify, track.
    pub fn process_packet(
        &self,
        frame: &[u8],
        sw_if_index: u32,
        direction: Direction,
        now: Instant,
    ) -> Decision {
        bump(&self.stats.packets);
        let headers = match packet::parse_ethernet(frame) {
            Ok(Some(headers)) => headers,
            Ok(None) => {
                bump(&self.stats.non_ip);
                return self.unmatchable(DecisionReason::NotIp);
            }
            Err(e) => {
                trace!(sw_if_index, "malformed packet: {}", e);
                bump(&self.stats.malformed);
                return self.unmatchable(DecisionReason::Malformed);
            }
        };
        self.process_headers(&headers, frame.len(), sw_if_index, direction, now)
    }

    /// Per-packet path for headers the caller already parsed.
    pub fn process_headers(
        &self,
        headers: &PacketHeaders,
        byte_len: usize,
        sw_if_index: u32,
        direction: Direction,
        now: Instant,
    ) -> Decision {
        let tuple = headers.tuple;
        let teardown = headers.tcp_flags.is_some_and(|f| f.is_teardown());
        let key = SessionKey::new(sw_if_index, direction, tuple);

        if self.options.session_tracking {
            if let Some(hit) = self.sessions.lookup(&key, byte_len, now) {
                bump(&self.stats.session_hits);
                match headers.tcp_flags {
                    Some(f) if f.is_rst() => {
                        self.sessions.remove(&key).ok();
                        trace!(sw_if_index, %tuple, "session reset");
                    }
                    Some(f) if f.is_fin() => {
                        if let Ok(entry) = self.sessions.observe_fin(hit.id, hit.side) {
                            trace!(sw_if_index, %tuple, state = ?entry.state, "FIN seen");
                        }
                    }
                    _ => {}
                }
                bump(&self.stats.permitted);
                return Decision {
                    verdict: Verdict::Permit,
                    reason: DecisionReason::Session,
                    classification: None,
                    session: Some(hit.id),
                };
            }
        }

        let tables = self.tables.load();
        let classification = matcher::classify(
            &tables,
            &tuple,
            sw_if_index,
            direction,
            self.options.default_policy.verdict(),
        );

        let mut session = None;
        if classification.action == Some(Action::PermitReflect)
            && self.options.session_tracking
            && !teardown
        {
            let mirror_if = tables.pairs().mirror_interface(sw_if_index);
            session = self.track(key, mirror_if, byte_len, now);
        }

        let reason = if classification.is_match() {
            DecisionReason::Rule
        } else {
            bump(&self.stats.unmatched);
            DecisionReason::Default
        };
        self.count_verdict(classification.verdict);
        trace!(sw_if_index, %direction, %tuple, verdict = ?classification.verdict, "classified");
        Decision {
            verdict: classification.verdict,
            reason,
            classification: Some(classification),
            session,
        }
    }

    /// Create or refresh the session for a reflexive permit.
    ///
    /// The verdict came from a snapshot that may since have been replaced by
    /// one leaving the interface unbound, with its sessions already purged.
    /// Re-check against the current snapshot after inserting so such a
    /// session does not outlive its bindings.
    fn track(&self, key: SessionKey, mirror_if: u32, byte_len: usize, now: Instant) -> Option<SessionId> {
        let hit = match self.sessions.lookup_or_create(key, mirror_if, byte_len, now) {
            Ok(hit) => hit,
            Err(e) => {
                bump(&self.stats.session_create_failures);
                debug!(sw_if_index = key.sw_if_index, tuple = %key.tuple, "session not tracked: {}", e);
                return None;
            }
        };
        if !self.tables.load().bindings().is_bound(key.sw_if_index) {
            if hit.created {
                self.sessions.remove(&key).ok();
            }
            debug!(sw_if_index = key.sw_if_index, "interface unbound while tracking; session dropped");
            return None;
        }
        if hit.created {
            bump(&self.stats.session_creates);
        }
        Some(hit.id)
    }

    fn unmatchable(&self, reason: DecisionReason) -> Decision {
        let verdict = self.options.unmatchable_policy.verdict();
        self.count_verdict(verdict);
        Decision {
            verdict,
            reason,
            classification: None,
            session: None,
        }
    }

    fn count_verdict(&self, verdict: Verdict) {
        match verdict {
            Verdict::Permit => bump(&self.stats.permitted),
            Verdict::Deny => bump(&self.stats.denied),
        }
    }

    // ---- Maintenance ---------------------------------------------------

    /// One reaper step: a budgeted session sweep plus rewrite-cache expiry.
    pub fn reap_tick(&self, now: Instant) -> usize {
        let reaped = self.sessions.reap_budgeted(now, self.options.reap_budget);
        let expired = self.rewrites.expire(now);
        self.stats.add_reaped(reaped);
        if reaped > 0 || expired > 0 {
            debug!(reaped, expired, live = self.sessions.len(), "reaper sweep");
        }
        reaped
    }

    /// Sweep the whole session table at once.
    pub fn reap_all(&self, now: Instant) -> usize {
        let reaped = self.sessions.reap(now);
        self.stats.add_reaped(reaped);
        reaped
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn rewrite_cache(&self) -> &RewriteCache {
        &self.rewrites
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}
