//! Debug command surface.
//!
//! ```text
//! show acl [<acl>]
//! show acl interface [<sw_if_index>]
//! show session bind [<sw_if_index>]
//! session bind <fwd> <rev|none>
//! show session stats
//! ```
//!
//! `<acl>` is a slot index (`3`) or a full handle (`3/1`).

use std::fmt::Write;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::engine::AclEngine;
use crate::error::{AclError, Result};
use crate::types::{Acl, AclHandle, Direction};

static SHOW_ACL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^show\s+acl(?:\s+(\d+)(?:/(\d+))?)?$").expect("SHOW_ACL: hardcoded regex is invalid")
});

static SHOW_ACL_INTERFACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^show\s+acl\s+interface(?:\s+(\d+))?$")
        .expect("SHOW_ACL_INTERFACE: hardcoded regex is invalid")
});

static SHOW_SESSION_BIND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^show\s+session\s+bind(?:\s+(\d+))?$")
        .expect("SHOW_SESSION_BIND: hardcoded regex is invalid")
});

static SESSION_BIND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^session\s+bind\s+(\d+)\s+(\d+|none|~0)$")
        .expect("SESSION_BIND: hardcoded regex is invalid")
});

static SHOW_SESSION_STATS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^show\s+session\s+stats$").expect("SHOW_SESSION_STATS: hardcoded regex is invalid")
});

/// Run one command line against `engine` and return its output.
pub fn execute(engine: &AclEngine, line: &str) -> Result<String> {
    let line = line.trim();

    if let Some(c) = SHOW_ACL_INTERFACE.captures(line) {
        let filter = c.get(1).map(|m| parse_u32(m.as_str())).transpose()?;
        return Ok(show_acl_interface(engine, filter));
    }
    if let Some(c) = SHOW_ACL.captures(line) {
        let index = c.get(1).map(|m| parse_u32(m.as_str())).transpose()?;
        let generation = c.get(2).map(|m| parse_u32(m.as_str())).transpose()?;
        return show_acl(engine, index, generation);
    }
    if let Some(c) = SHOW_SESSION_BIND.captures(line) {
        let filter = c.get(1).map(|m| parse_u32(m.as_str())).transpose()?;
        return Ok(show_session_bind(engine, filter));
    }
    if let Some(c) = SESSION_BIND.captures(line) {
        let fwd = parse_u32(&c[1])?;
        let rev = match &c[2] {
            "none" | "~0" => None,
            n => Some(parse_u32(n)?).filter(|&r| r != u32::MAX),
        };
        engine.bind_pair(fwd, rev)?;
        return Ok(match rev {
            Some(rev) => format!("bound {} <-> {}\n", fwd, rev),
            None => format!("unbound {}\n", fwd),
        });
    }
    if SHOW_SESSION_STATS.is_match(line) {
        return show_session_stats(engine);
    }

    Err(AclError::UnknownCommand(line.to_string()))
}

fn parse_u32(s: &str) -> Result<u32> {
    s.parse()
        .map_err(|_| AclError::ParseError(format!("Invalid number: {}", s)))
}

fn write_acl(out: &mut String, handle: AclHandle, acl: &Acl) {
    let _ = writeln!(out, "acl {} tag '{}' rules {}", handle, acl.tag, acl.len());
    for (i, rule) in acl.rules.iter().enumerate() {
        let _ = writeln!(out, "  {:>4}: {}", i, rule);
    }
}

fn show_acl(engine: &AclEngine, index: Option<u32>, generation: Option<u32>) -> Result<String> {
    let tables = engine.snapshot();
    let mut out = String::new();
    match index {
        None => {
            for (handle, acl) in tables.store().iter() {
                write_acl(&mut out, handle, acl);
            }
        }
        Some(index) => {
            let (handle, acl) = tables
                .store()
                .iter()
                .find(|(h, _)| h.index() == index && generation.map_or(true, |g| h.generation() == g))
                .ok_or_else(|| AclError::AclNotFound(AclHandle::new(index, generation.unwrap_or(0))))?;
            write_acl(&mut out, handle, acl);
        }
    }
    Ok(out)
}

fn show_acl_interface(engine: &AclEngine, filter: Option<u32>) -> String {
    let tables = engine.snapshot();
    let interfaces = match filter {
        Some(i) => vec![i],
        None => tables.bindings().interfaces(),
    };
    let mut out = String::new();
    for sw_if_index in interfaces {
        let _ = writeln!(out, "sw_if_index {}:", sw_if_index);
        for direction in [Direction::Input, Direction::Output] {
            let list: Vec<String> = tables
                .list_for(sw_if_index, direction)
                .iter()
                .map(ToString::to_string)
                .collect();
            let _ = writeln!(out, "  {}: [{}]", direction, list.join(", "));
        }
    }
    out
}

fn show_session_bind(engine: &AclEngine, filter: Option<u32>) -> String {
    let tables = engine.snapshot();
    let mut out = String::new();
    for (sw_if_index, peer) in tables.pairs().entries() {
        if filter.is_some_and(|f| f != sw_if_index) {
            continue;
        }
        let _ = writeln!(out, "{} -> {}", sw_if_index, peer);
    }
    out
}

fn show_session_stats(engine: &AclEngine) -> Result<String> {
    let sessions = engine.sessions();
    let mut out = format!(
        "sessions {} / {} ({} shards)\n",
        sessions.len(),
        sessions.capacity(),
        sessions.shard_count()
    );
    out.push_str(&serde_json::to_string_pretty(&engine.stats())?);
    out.push('\n');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineOptions;
    use crate::types::{Action, Rule};

    fn engine() -> AclEngine {
        AclEngine::new(EngineOptions::default()).unwrap()
    }

    #[test]
    fn test_show_acl() {
        let engine = engine();
        let a = engine
            .add_acl(Acl::new(vec![Rule::any_v4(Action::Deny)]).with_tag("drop-all"))
            .unwrap();
        let out = execute(&engine, "show acl").unwrap();
        assert!(out.contains("tag 'drop-all'"));
        assert!(out.contains("deny 0.0.0.0/0 0.0.0.0/0"));

        let one = execute(&engine, &format!("show acl {}", a.index())).unwrap();
        assert_eq!(one, out);
        assert!(matches!(
            execute(&engine, "show acl 7"),
            Err(AclError::AclNotFound(_))
        ));
    }

    #[test]
    fn test_show_acl_interface() {
        let engine = engine();
        let a = engine.add_acl(Acl::default()).unwrap();
        engine.bind(5, Direction::Output, a).unwrap();
        let out = execute(&engine, "show acl interface 5").unwrap();
        assert_eq!(out, format!("sw_if_index 5:\n  input: []\n  output: [{}]\n", a));
    }

    #[test]
    fn test_session_bind_commands() {
        let engine = engine();
        assert_eq!(execute(&engine, "session bind 1 2").unwrap(), "bound 1 <-> 2\n");
        assert_eq!(execute(&engine, "show session bind").unwrap(), "1 -> 2\n2 -> 1\n");
        assert_eq!(execute(&engine, "show session bind 2").unwrap(), "2 -> 1\n");
        assert_eq!(execute(&engine, "session bind 2 ~0").unwrap(), "unbound 2\n");
        assert_eq!(execute(&engine, "show session bind").unwrap(), "");
    }

    #[test]
    fn test_show_session_stats() {
        let out = execute(&engine(), "show session stats").unwrap();
        assert!(out.starts_with("sessions 0 / 65536 (16 shards)"));
        assert!(out.contains("\"packets\": 0"));
    }

    #[test]
    fn test_unknown_command() {
        assert!(matches!(
            execute(&engine(), "clear everything"),
            Err(AclError::UnknownCommand(_))
        ));
    }
}
