use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;

use crate::error::{AclError, Result};
use crate::types::{IPPROTO_TCP, IPPROTO_UDP};

/// Regex pattern for parsing ACL rules
/// Format: action(src, dst[, proto/dport][, sport])
static RULE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([\w+\-]+)\s*\(([^,]+),([^,]+)(?:,([^,]+))?(?:,([^,]+))?\)$")
        .expect("RULE_PATTERN: hardcoded regex is invalid")
});

/// Maximum nesting depth for `file:` include directives.
const MAX_INCLUDE_DEPTH: usize = 10;

/// A rule as written, before address and port parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRule {
    pub action: String,
    pub src: String,
    pub dst: String,
    pub proto_port: Option<String>,
    pub src_port: Option<String>,
    /// 1-based line in the file the rule came from
    pub line_num: usize,
}

/// A parsed rule list with its optional `tag:` name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextAcl {
    pub tag: Option<String>,
    pub rules: Vec<TextRule>,
}

/// Parse ACL rules from text.
///
/// Supports `file: /path/to/rules.acl` to include rules from another file and
/// `tag: name` to name the list. The first `tag:` seen wins.
pub fn parse_rules(text: &str) -> Result<TextAcl> {
    let mut acl = TextAcl::default();
    parse_rules_inner(text, 0, &mut acl)?;
    Ok(acl)
}

fn parse_rules_inner(text: &str, depth: usize, acl: &mut TextAcl) -> Result<()> {
    if depth > MAX_INCLUDE_DEPTH {
        return Err(AclError::ParseError(format!(
            "file include depth exceeds maximum ({MAX_INCLUDE_DEPTH}), possible circular include"
        )));
    }

    for (line_num, line) in text.lines().enumerate() {
        let line_num = line_num + 1;

        let line = match line.find('#') {
            Some(pos) => &line[..pos],
            None => line,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(path) = line.strip_prefix("file:") {
            parse_rules_from_file_inner(path.trim(), depth + 1, acl)?;
            continue;
        }

        if let Some(tag) = line.strip_prefix("tag:") {
            let tag = tag.trim();
            if tag.is_empty() {
                return Err(AclError::ParseErrorAtLine {
                    line: line_num,
                    message: "Empty tag".to_string(),
                });
            }
            acl.tag.get_or_insert_with(|| tag.to_string());
            continue;
        }

        acl.rules.push(parse_single_rule(line, line_num)?);
    }

    Ok(())
}

/// Parse ACL rules from a file.
pub fn parse_rules_from_file(path: impl AsRef<Path>) -> Result<TextAcl> {
    let mut acl = TextAcl::default();
    parse_rules_from_file_inner(path, 0, &mut acl)?;
    Ok(acl)
}

fn parse_rules_from_file_inner(path: impl AsRef<Path>, depth: usize, acl: &mut TextAcl) -> Result<()> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| {
        AclError::ParseError(format!(
            "Failed to read rules file '{}': {}",
            path.display(),
            e
        ))
    })?;
    parse_rules_inner(&text, depth, acl)
}

/// Parse a single rule line
fn parse_single_rule(line: &str, line_num: usize) -> Result<TextRule> {
    let invalid = |message: String| AclError::ParseErrorAtLine {
        line: line_num,
        message,
    };
    let captures = RULE_PATTERN
        .captures(line)
        .ok_or_else(|| invalid(format!("Invalid rule format: {}", line)))?;

    let field = |i: usize| captures.get(i).map(|m| m.as_str().trim().to_string());
    let action = field(1).unwrap_or_default();
    let src = field(2).unwrap_or_default();
    let dst = field(3).unwrap_or_default();
    if src.is_empty() || dst.is_empty() {
        return Err(invalid("Empty address".to_string()));
    }

    Ok(TextRule {
        action,
        src,
        dst,
        proto_port: field(4),
        src_port: field(5),
        line_num,
    })
}

/// Parse a protocol name or number: `tcp`, `udp`, `icmp`, `icmpv6`, `*`/`any`, or 0-255.
pub fn parse_proto(value: &str) -> Result<u8> {
    let value = value.trim().to_lowercase();
    match value.as_str() {
        "tcp" => Ok(IPPROTO_TCP),
        "udp" => Ok(IPPROTO_UDP),
        "icmp" => Ok(1),
        "icmpv6" => Ok(58),
        "*" | "any" => Ok(0),
        n => n
            .parse()
            .map_err(|_| AclError::InvalidRule(format!("Unknown protocol: {}", value))),
    }
}

/// Parse a single port; `*` and `any` mean wildcard (0). Ranges are rejected.
pub fn parse_port(value: &str) -> Result<u16> {
    let value = value.trim();
    if value == "*" || value.eq_ignore_ascii_case("any") {
        return Ok(0);
    }
    if value.contains('-') {
        return Err(AclError::InvalidRule(format!(
            "Port ranges are not supported: {}",
            value
        )));
    }
    value.parse()
        .map_err(|_| AclError::InvalidRule(format!("Invalid port: {}", value)))
}

/// Parse a protocol/port pair
/// Examples: "tcp/443", "udp/53", "*/80", "17/53", "tcp"
pub fn parse_proto_port(value: &str) -> Result<(u8, u16)> {
    match value.trim().split_once('/') {
        Some((proto, port)) => Ok((parse_proto(proto)?, parse_port(port)?)),
        None => Ok((parse_proto(value)?, 0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_pattern_regex_compiles() {
        assert!(RULE_PATTERN.is_match("permit(any, any)"));
    }

    #[test]
    fn test_parse_simple_rule() {
        let acl = parse_rules("deny(192.168.0.0/16, any)").unwrap();
        assert_eq!(acl.rules.len(), 1);
        let r = &acl.rules[0];
        assert_eq!(r.action, "deny");
        assert_eq!(r.src, "192.168.0.0/16");
        assert_eq!(r.dst, "any");
        assert!(r.proto_port.is_none());
        assert!(r.src_port.is_none());
        assert!(acl.tag.is_none());
    }

    #[test]
    fn test_parse_full_rule() {
        let acl = parse_rules("permit+reflect(any, 10.0.0.0/24, tcp/80, 1024)").unwrap();
        let r = &acl.rules[0];
        assert_eq!(r.action, "permit+reflect");
        assert_eq!(r.proto_port.as_deref(), Some("tcp/80"));
        assert_eq!(r.src_port.as_deref(), Some("1024"));
    }

    #[test]
    fn test_parse_tag_and_comments() {
        let text = r#"
tag: web-in   # inbound web
# allow web
permit(any, 10.0.0.0/24, tcp/80)
permit(any, 10.0.0.0/24, tcp/443)

tag: ignored
deny(any, any)
"#;
        let acl = parse_rules(text).unwrap();
        assert_eq!(acl.tag.as_deref(), Some("web-in"));
        assert_eq!(acl.rules.len(), 3);
        assert_eq!(acl.rules[2].line_num, 8);
    }

    #[test]
    fn test_parse_invalid_rule_reports_line() {
        let err = parse_rules("permit(any, any)\nnot a rule").unwrap_err();
        assert!(matches!(err, AclError::ParseErrorAtLine { line: 2, .. }));
    }

    #[test]
    fn test_parse_rejects_empty_address() {
        assert!(parse_rules("deny(   , any)").is_err());
        assert!(parse_rules("deny(any)").is_err());
    }

    #[test]
    fn test_parse_proto_port() {
        assert_eq!(parse_proto_port("tcp/443").unwrap(), (6, 443));
        assert_eq!(parse_proto_port("UDP/53").unwrap(), (17, 53));
        assert_eq!(parse_proto_port("*/80").unwrap(), (0, 80));
        assert_eq!(parse_proto_port("47").unwrap(), (47, 0));
        assert_eq!(parse_proto_port("tcp/*").unwrap(), (6, 0));
        assert!(parse_proto_port("tcp/8000-9000").is_err());
        assert!(parse_proto_port("tcp/443/extra").is_err());
        assert!(parse_proto_port("sctp/1").is_err());
        assert!(parse_proto_port("300").is_err());
    }

    #[test]
    fn test_parse_file_directive() {
        use std::io::Write;
        let dir = std::env::temp_dir().join("acl_dataplane_parser_include");
        let _ = fs::create_dir_all(&dir);
        let file_path = dir.join("included.acl");
        let mut f = fs::File::create(&file_path).unwrap();
        writeln!(f, "tag: from-file").unwrap();
        writeln!(f, "deny(10.0.0.0/8, any)").unwrap();
        drop(f);

        let text = format!(
            "permit(192.168.0.0/16, any)\nfile: {}\ndeny(any, any)",
            file_path.display()
        );
        let acl = parse_rules(&text).unwrap();
        assert_eq!(acl.tag.as_deref(), Some("from-file"));
        let srcs: Vec<_> = acl.rules.iter().map(|r| r.src.as_str()).collect();
        assert_eq!(srcs, vec!["192.168.0.0/16", "10.0.0.0/8", "any"]);

        let _ = fs::remove_file(&file_path);
        let _ = fs::remove_dir(&dir);
    }

    #[test]
    fn test_parse_file_directive_not_found() {
        assert!(parse_rules("file: /nonexistent/path/rules.acl").is_err());
    }

    #[test]
    fn test_parse_file_circular_include() {
        use std::io::Write;
        let dir = std::env::temp_dir().join("acl_dataplane_parser_circular");
        let _ = fs::create_dir_all(&dir);
        let file_a = dir.join("a.acl");
        let file_b = dir.join("b.acl");

        let mut f = fs::File::create(&file_a).unwrap();
        writeln!(f, "deny(10.0.0.0/8, any)").unwrap();
        writeln!(f, "file: {}", file_b.display()).unwrap();
        drop(f);
        let mut f = fs::File::create(&file_b).unwrap();
        writeln!(f, "permit(any, any)").unwrap();
        writeln!(f, "file: {}", file_a.display()).unwrap();
        drop(f);

        let err = parse_rules_from_file(&file_a).unwrap_err();
        assert!(err.to_string().contains("include depth"));

        let _ = fs::remove_file(&file_a);
        let _ = fs::remove_file(&file_b);
        let _ = fs::remove_dir(&dir);
    }
}
