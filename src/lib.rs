//! ACL Dataplane - per-packet access control and session tracking
//!
//! This library decides, for every packet crossing an interface, whether it
//! is permitted or denied:
//! - Ordered ACLs of 5-tuple rules (IPv4 and IPv6 prefixes, protocol, ports)
//! - Per-interface, per-direction binding lists; first match wins
//! - Lock-free reads of the rule/binding snapshot from any worker
//! - Sharded session table for reflexive (stateful) permits
//! - Periodic idle-session reaping
//!
//! # Example
//!
//! ```rust
//! use std::time::Instant;
//! use acl_dataplane::{parse_acl, AclEngine, Direction, EngineOptions, FiveTuple, Verdict};
//!
//! let rules_text = "
//! tag: web-in
//! permit(any, 10.0.0.0/24, tcp/80)   # web servers
//! deny(any, 10.0.0.0/24)
//! ";
//!
//! let engine = AclEngine::new(EngineOptions::default()).unwrap();
//! let acl = engine.add_acl(parse_acl(rules_text).unwrap()).unwrap();
//! engine.bind(1, Direction::Input, acl).unwrap();
//!
//! let flow = FiveTuple::new(
//!     "192.0.2.7".parse().unwrap(),
//!     "10.0.0.5".parse().unwrap(),
//!     6,
//!     40000,
//!     80,
//! );
//! let c = engine.classify(&flow, 1, Direction::Input);
//! assert_eq!(c.verdict, Verdict::Permit);
//! assert_eq!(c.matched_rule_index, Some(0));
//! ```
//!
//! # Rule Syntax
//!
//! ```text
//! action(src, dst[, proto/dport][, sport])
//! ```
//!
//! | Field | Example | Description |
//! |-------|---------|-------------|
//! | action | `permit`, `deny`, `permit+reflect` | Verdict; reflect also tracks the flow |
//! | address | `10.0.0.0/8`, `2001:db8::1`, `any` | Prefix, host, or wildcard |
//! | proto/dport | `tcp/443`, `udp/53`, `*/80`, `47` | Protocol and destination port |
//! | sport | `1024`, `*` | Source port |
//!
//! Lines starting with `tag:` name the ACL; `file:` includes another file.

pub mod binding;
pub mod cache;
pub mod cli;
pub mod compile;
pub mod config;
pub mod engine;
pub mod error;
pub mod host;
pub mod matcher;
pub mod packet;
pub mod pairing;
pub mod parser;
pub mod provision;
#[cfg(feature = "async")]
pub mod reaper;
pub mod session;
pub mod stats;
pub mod store;
pub mod tables;
pub mod types;

// Re-export commonly used items
pub use binding::BindingTable;
pub use cache::RewriteCache;
pub use compile::{compile, parse_acl, parse_acl_from_file};
pub use config::{DefaultPolicy, EngineOptions};
pub use engine::{AclEngine, Decision, DecisionReason};
pub use error::{AclError, ApiStatus, CapacityKind, MalformedKind, Result};
pub use host::{AnyInterface, InterfaceRegistry, NoopSteering, StaticInterfaces, TrafficSteering};
pub use matcher::{classify, TupleMatcher};
pub use packet::{parse_ethernet, parse_ip, PacketHeaders, TcpFlags};
pub use parser::{parse_proto_port, parse_rules, TextAcl, TextRule};
pub use provision::{AclAddReply, AclDetails, DumpFilter, Provisioner};
pub use session::{FlowSide, SessionEntry, SessionId, SessionKey, SessionState, SessionTable};
pub use stats::StatsSnapshot;
pub use store::RuleStore;
pub use tables::Tables;
pub use types::{
    Acl, AclHandle, Action, Classification, Direction, FiveTuple, Rule, Verdict, IPPROTO_TCP,
    IPPROTO_UDP,
};

#[cfg(feature = "async")]
pub use reaper::spawn_reaper;
