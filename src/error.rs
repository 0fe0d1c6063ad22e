use thiserror::Error;

use crate::types::{AclHandle, Direction};

/// Classifies pool exhaustion errors for programmatic matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityKind {
    /// The ACL pool has no free slot
    Acl,
    /// A single ACL carries more rules than allowed
    Rules,
    /// The session shard for this flow is full
    Session,
}

/// Classifies header parse failures. Never fatal: the packet is simply not matchable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedKind {
    /// Buffer ended before a header field could be read
    Truncated,
    /// IP version nibble is neither 4 nor 6, or disagrees with the Ethertype
    BadIpVersion,
    /// IPv4 IHL or an IPv6 extension header length is out of range
    BadHeaderLength,
}

/// ACL dataplane error types
#[derive(Error, Debug)]
pub enum AclError {
    #[error("Invalid interface index: {0}")]
    InvalidInterface(u32),

    #[error("ACL not found: {0}")]
    AclNotFound(AclHandle),

    #[error("ACL {acl} is not bound to interface {sw_if_index} ({direction})")]
    BindingNotFound {
        sw_if_index: u32,
        direction: Direction,
        acl: AclHandle,
    },

    #[error("Session not found")]
    SessionNotFound,

    #[error("Capacity exceeded: {kind:?} (limit {limit})")]
    CapacityExceeded { kind: CapacityKind, limit: usize },

    #[error("Malformed packet: {kind:?}")]
    MalformedPacket { kind: MalformedKind },

    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    #[error("Parse error at line {line}: {message}")]
    ParseErrorAtLine { line: usize, message: String },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl AclError {
    pub(crate) fn truncated() -> Self {
        AclError::MalformedPacket {
            kind: MalformedKind::Truncated,
        }
    }

    pub(crate) fn malformed(kind: MalformedKind) -> Self {
        AclError::MalformedPacket { kind }
    }
}

pub type Result<T> = std::result::Result<T, AclError>;

/// Status codes returned across the management API boundary.
///
/// Values follow the host's negative-retval convention; `Ok` is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ApiStatus {
    Ok = 0,
    Unspecified = -1,
    InvalidSwIfIndex = -2,
    NoSuchEntry = -6,
    InvalidValue = -7,
    TableTooBig = -12,
}

impl ApiStatus {
    /// Numeric retval as sent back to the management client.
    pub fn retval(self) -> i32 {
        self as i32
    }

    pub fn is_ok(self) -> bool {
        self == ApiStatus::Ok
    }
}

impl From<&AclError> for ApiStatus {
    fn from(err: &AclError) -> Self {
        match err {
            AclError::InvalidInterface(_) => ApiStatus::InvalidSwIfIndex,
            AclError::AclNotFound(_)
            | AclError::BindingNotFound { .. }
            | AclError::SessionNotFound => ApiStatus::NoSuchEntry,
            AclError::CapacityExceeded { .. } => ApiStatus::TableTooBig,
            AclError::InvalidRule(_)
            | AclError::ParseErrorAtLine { .. }
            | AclError::ParseError(_)
            | AclError::ConfigError(_) => ApiStatus::InvalidValue,
            _ => ApiStatus::Unspecified,
        }
    }
}

impl<T> From<&Result<T>> for ApiStatus {
    fn from(res: &Result<T>) -> Self {
        match res {
            Ok(_) => ApiStatus::Ok,
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_kind_is_matchable() {
        let err = AclError::CapacityExceeded {
            kind: CapacityKind::Session,
            limit: 16,
        };
        match &err {
            AclError::CapacityExceeded { kind, limit } => {
                assert!(matches!(kind, CapacityKind::Session));
                assert_eq!(*limit, 16);
            }
            _ => panic!("expected CapacityExceeded"),
        }
    }

    #[test]
    fn test_malformed_kind_is_matchable() {
        let err = AclError::truncated();
        match &err {
            AclError::MalformedPacket { kind } => {
                assert_eq!(*kind, MalformedKind::Truncated);
            }
            _ => panic!("expected MalformedPacket"),
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiStatus::from(&AclError::InvalidInterface(999)),
            ApiStatus::InvalidSwIfIndex
        );
        assert_eq!(
            ApiStatus::from(&AclError::AclNotFound(AclHandle::new(3, 1))),
            ApiStatus::NoSuchEntry
        );
        assert_eq!(
            ApiStatus::from(&AclError::CapacityExceeded {
                kind: CapacityKind::Acl,
                limit: 1
            }),
            ApiStatus::TableTooBig
        );
        assert_eq!(ApiStatus::InvalidSwIfIndex.retval(), -2);
    }

    #[test]
    fn test_status_from_result() {
        let ok: Result<()> = Ok(());
        assert!(ApiStatus::from(&ok).is_ok());

        let err: Result<()> = Err(AclError::InvalidInterface(7));
        assert_eq!(ApiStatus::from(&err), ApiStatus::InvalidSwIfIndex);
    }

    #[test]
    fn test_error_display_includes_interface() {
        let err = AclError::InvalidInterface(999);
        let display = format!("{}", err);
        assert!(display.contains("999"), "got: {}", display);
    }
}
