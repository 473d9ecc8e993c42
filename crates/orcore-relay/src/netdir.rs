//! Builds a [`RouterSet`] from this relay's static config, standing in
//! for the real consensus-document directory (spec §6's "external
//! collaborator" the relay itself never parses). `upsert_router` /
//! `remove_router` on the real `RouterSet` are still the only write
//! path; this module just turns one config section into the calls a
//! real directory-fetch task would make.

use std::net::Ipv4Addr;
use std::str::FromStr;

use orcore_llcrypto::pk::rsa::RsaIdentity;
use orcore_netdir::exitpolicy::{AddrSpec, ExitPattern, ExitPolicy, PortSpec, Rule};
use orcore_netdir::{RouterDescriptor, RouterFlags, RouterSet};
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;

use crate::config::StaticRouterConfig;
use crate::err::{Error, Result};

/// Build a [`RouterSet`] from every entry in `routers`.
pub fn load(routers: &[StaticRouterConfig]) -> Result<RouterSet> {
    let mut set = RouterSet::new();
    for entry in routers {
        let (identity, descriptor) = to_descriptor(entry)?;
        set.upsert(identity, descriptor);
    }
    Ok(set)
}

fn to_descriptor(entry: &StaticRouterConfig) -> Result<(RsaIdentity, RouterDescriptor)> {
    let identity_bytes = hex::decode(&entry.identity)
        .map_err(|e| Error::Identity(format!("router {:?}: bad identity hex: {e}", entry.nickname)))?;
    let identity = RsaIdentity::from_bytes(&identity_bytes)
        .ok_or_else(|| Error::Identity(format!("router {:?}: identity must be 20 bytes", entry.nickname)))?;

    let onion_key = parse_onion_key(&entry.onion_key)
        .map_err(|e| Error::Identity(format!("router {:?}: bad onion key: {e}", entry.nickname)))?;

    let family = entry
        .family
        .iter()
        .map(|hex_id| {
            hex::decode(hex_id)
                .ok()
                .and_then(|bytes| RsaIdentity::from_bytes(&bytes))
                .ok_or_else(|| Error::Identity(format!("router {:?}: bad family member {hex_id:?}", entry.nickname)))
        })
        .collect::<Result<Vec<_>>>()?;

    let exit_policy = parse_exit_policy(&entry.exit_policy)
        .map_err(|e| Error::Identity(format!("router {:?}: bad exit policy: {e}", entry.nickname)))?;

    let flags = parse_flags(&entry.flags);

    let descriptor = RouterDescriptor::new(
        identity,
        entry.nickname.clone(),
        entry.addr,
        entry.or_port,
        onion_key,
        entry.bandwidth_bytes_per_sec,
        family,
        exit_policy,
        flags,
    );
    Ok((identity, descriptor))
}

/// Accepts either PEM or raw base64 of a DER-encoded
/// SubjectPublicKeyInfo.
fn parse_onion_key(text: &str) -> std::result::Result<RsaPublicKey, String> {
    let trimmed = text.trim();
    if trimmed.starts_with("-----BEGIN") {
        return RsaPublicKey::from_public_key_pem(trimmed).map_err(|e| e.to_string());
    }
    use base64::Engine as _;
    let der = base64::engine::general_purpose::STANDARD
        .decode(trimmed)
        .map_err(|e| e.to_string())?;
    RsaPublicKey::from_public_key_der(&der).map_err(|e| e.to_string())
}

fn parse_flags(names: &[String]) -> RouterFlags {
    let mut flags = RouterFlags::empty();
    for name in names {
        flags |= match name.to_ascii_lowercase().as_str() {
            "valid" => RouterFlags::VALID,
            "running" => RouterFlags::RUNNING,
            "fast" => RouterFlags::FAST,
            "stable" => RouterFlags::STABLE,
            "exit" => RouterFlags::EXIT,
            "guard" => RouterFlags::GUARD,
            "badexit" | "bad_exit" => RouterFlags::BAD_EXIT,
            _ => RouterFlags::empty(),
        };
    }
    flags
}

/// Parses the textual exit-policy format from spec §6: an ordered list
/// of `accept|reject addr[/prefix]:port_range` rules, first match wins,
/// with an implicit trailing `reject *:*` (already the behavior of an
/// empty/exhausted [`ExitPolicy`]).
///
/// Shared with `exit.rs`, which parses this same textual form for the
/// relay's own `[RelayConfig::exit_policy]`, not just a peer router's.
pub fn parse_exit_policy(rules: &[String]) -> std::result::Result<ExitPolicy, String> {
    let mut patterns = Vec::with_capacity(rules.len());
    for rule in rules {
        patterns.push(parse_exit_pattern(rule)?);
    }
    Ok(ExitPolicy::new(patterns))
}

fn parse_exit_pattern(rule: &str) -> std::result::Result<ExitPattern, String> {
    let mut parts = rule.split_whitespace();
    let verb = parts.next().ok_or("empty rule")?;
    let target = parts.next().ok_or("missing addr:port")?;
    if parts.next().is_some() {
        return Err(format!("unexpected trailing tokens in {rule:?}"));
    }

    let rule = match verb.to_ascii_lowercase().as_str() {
        "accept" => Rule::Accept,
        "reject" => Rule::Reject,
        other => return Err(format!("unknown verb {other:?}")),
    };

    let (addr_part, port_part) = target.split_once(':').ok_or("missing ':' in addr:port")?;

    let addr = if addr_part == "*" {
        AddrSpec::Wildcard
    } else if let Some((net, prefix)) = addr_part.split_once('/') {
        AddrSpec::Cidr {
            addr: Ipv4Addr::from_str(net).map_err(|e| e.to_string())?,
            prefix: prefix.parse::<u8>().map_err(|e| e.to_string())?,
        }
    } else {
        AddrSpec::Cidr {
            addr: Ipv4Addr::from_str(addr_part).map_err(|e| e.to_string())?,
            prefix: 32,
        }
    };

    let port = if port_part == "*" {
        PortSpec::Wildcard
    } else if let Some((lo, hi)) = port_part.split_once('-') {
        PortSpec::Range(lo.parse().map_err(|e: std::num::ParseIntError| e.to_string())?, hi
            .parse()
            .map_err(|e: std::num::ParseIntError| e.to_string())?)
    } else {
        PortSpec::Port(port_part.parse().map_err(|e: std::num::ParseIntError| e.to_string())?)
    };

    Ok(ExitPattern { rule, addr, port })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_wildcard_accept() {
        let pattern = parse_exit_pattern("accept *:*").unwrap();
        assert_eq!(pattern.rule, Rule::Accept);
        assert_eq!(pattern.addr, AddrSpec::Wildcard);
        assert_eq!(pattern.port, PortSpec::Wildcard);
    }

    #[test]
    fn parses_cidr_reject_with_port_range() {
        let pattern = parse_exit_pattern("reject 10.0.0.0/8:1-1024").unwrap();
        assert_eq!(pattern.rule, Rule::Reject);
        assert_eq!(pattern.addr, AddrSpec::Cidr { addr: Ipv4Addr::new(10, 0, 0, 0), prefix: 8 });
        assert_eq!(pattern.port, PortSpec::Range(1, 1024));
    }

    #[test]
    fn rejects_malformed_rule() {
        assert!(parse_exit_pattern("accept").is_err());
        assert!(parse_exit_pattern("maybe *:*").is_err());
    }

    #[test]
    fn flags_are_case_insensitive() {
        let flags = parse_flags(&["Guard".to_string(), "FAST".to_string()]);
        assert!(flags.contains(RouterFlags::GUARD));
        assert!(flags.contains(RouterFlags::FAST));
        assert!(!flags.contains(RouterFlags::EXIT));
    }
}
