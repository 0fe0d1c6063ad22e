use std::net::IpAddr;
use std::path::Path;

use ipnet::{IpNet, Ipv4Net, Ipv6Net};

use crate::error::{AclError, Result};
use crate::parser::{parse_port, parse_proto_port, parse_rules, parse_rules_from_file, TextAcl, TextRule};
use crate::types::{Acl, Action, Rule};

/// Parse and compile a rule list in one step.
pub fn parse_acl(text: &str) -> Result<Acl> {
    compile(&parse_rules(text)?)
}

/// Parse and compile a rule list file.
pub fn parse_acl_from_file(path: impl AsRef<Path>) -> Result<Acl> {
    compile(&parse_rules_from_file(path)?)
}

/// Compile text rules into an ACL
pub fn compile(text: &TextAcl) -> Result<Acl> {
    let rules = text
        .rules
        .iter()
        .map(|rule| {
            compile_rule(rule).map_err(|e| match e {
                AclError::InvalidRule(message) => AclError::ParseErrorAtLine {
                    line: rule.line_num,
                    message,
                },
                other => other,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let acl = Acl::new(rules);
    Ok(match &text.tag {
        Some(tag) => acl.with_tag(tag.as_str()),
        None => acl,
    })
}

/// Parse an action name
pub fn parse_action(name: &str) -> Result<Action> {
    match name.trim().to_lowercase().as_str() {
        "permit" | "allow" => Ok(Action::Permit),
        "deny" | "drop" => Ok(Action::Deny),
        "permit+reflect" | "reflect" => Ok(Action::PermitReflect),
        other => Err(AclError::InvalidRule(format!("Unknown action: {}", other))),
    }
}

/// Compile a single rule
fn compile_rule(rule: &TextRule) -> Result<Rule> {
    let action = parse_action(&rule.action)?;

    let (src, dst) = match (parse_prefix(&rule.src)?, parse_prefix(&rule.dst)?) {
        (Some(src), Some(dst)) => (src, dst),
        (Some(src), None) => (src, any_like(&src)),
        (None, Some(dst)) => (any_like(&dst), dst),
        (None, None) => {
            let any = IpNet::V4(Ipv4Net::default());
            (any, any)
        }
    };

    let (proto, dst_port) = match rule.proto_port {
        Some(ref pp) => parse_proto_port(pp)?,
        None => (0, 0),
    };
    let src_port = match rule.src_port {
        Some(ref sp) => parse_port(sp)?,
        None => 0,
    };

    Rule::new(action, src, dst, proto, src_port, dst_port)
}

/// `None` for the wildcard spellings
fn parse_prefix(address: &str) -> Result<Option<IpNet>> {
    let address = address.trim().to_lowercase();
    if matches!(address.as_str(), "any" | "all" | "*") {
        return Ok(None);
    }
    if let Ok(ip) = address.parse::<IpAddr>() {
        return Ok(Some(IpNet::from(ip)));
    }
    address
        .parse::<IpNet>()
        .map(Some)
        .map_err(|_| AclError::InvalidRule(format!("Invalid address: {}", address)))
}

/// Zero-length prefix in the same family as `net`
fn any_like(net: &IpNet) -> IpNet {
    match net {
        IpNet::V4(_) => IpNet::V4(Ipv4Net::default()),
        IpNet::V6(_) => IpNet::V6(Ipv6Net::default()),
    }
}
