//! Exit policies: an ordered list of accept/reject rules over an
//! (address, port) pair, as described in spec §6.

use std::net::Ipv4Addr;

/// Whether a matching rule permits or forbids the connection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Rule {
    /// Allow connections matching this pattern.
    Accept,
    /// Deny connections matching this pattern.
    Reject,
}

/// An address pattern: either every address, or a CIDR block.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddrSpec {
    /// Matches any IPv4 address.
    Wildcard,
    /// Matches addresses within `addr/prefix`.
    Cidr {
        /// Network address.
        addr: Ipv4Addr,
        /// Prefix length, 0..=32.
        prefix: u8,
    },
}

impl AddrSpec {
    fn matches(&self, addr: Ipv4Addr) -> bool {
        match self {
            AddrSpec::Wildcard => true,
            AddrSpec::Cidr { addr: net, prefix } => {
                if *prefix == 0 {
                    return true;
                }
                let mask = u32::MAX.checked_shl(32 - *prefix as u32).unwrap_or(0);
                (u32::from(addr) & mask) == (u32::from(*net) & mask)
            }
        }
    }
}

/// A port pattern: every port, one port, or an inclusive range.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PortSpec {
    /// Matches any port.
    Wildcard,
    /// Matches exactly one port.
    Port(u16),
    /// Matches a closed range `lo..=hi`.
    Range(u16, u16),
}

impl PortSpec {
    fn matches(&self, port: u16) -> bool {
        match self {
            PortSpec::Wildcard => true,
            PortSpec::Port(p) => *p == port,
            PortSpec::Range(lo, hi) => (*lo..=*hi).contains(&port),
        }
    }
}

/// One directive in an exit policy.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ExitPattern {
    /// Accept or reject.
    pub rule: Rule,
    /// Address pattern to match.
    pub addr: AddrSpec,
    /// Port pattern to match.
    pub port: PortSpec,
}

/// An ordered, first-match-wins list of [`ExitPattern`]s, with an implicit
/// trailing `reject *:*`.
#[derive(Clone, Debug, Default)]
pub struct ExitPolicy(Vec<ExitPattern>);

impl ExitPolicy {
    /// Build a policy from an ordered rule list.
    pub fn new(rules: Vec<ExitPattern>) -> Self {
        ExitPolicy(rules)
    }

    /// Evaluate the policy against a destination. The first matching rule
    /// wins; if none match, the destination is rejected.
    pub fn permits(&self, addr: Ipv4Addr, port: u16) -> bool {
        for pattern in &self.0 {
            if pattern.addr.matches(addr) && pattern.port.matches(port) {
                return pattern.rule == Rule::Accept;
            }
        }
        false
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn first_match_wins_and_default_is_reject() {
        let policy = ExitPolicy::new(vec![
            ExitPattern {
                rule: Rule::Reject,
                addr: AddrSpec::Cidr { addr: Ipv4Addr::new(10, 0, 0, 0), prefix: 8 },
                port: PortSpec::Wildcard,
            },
            ExitPattern {
                rule: Rule::Accept,
                addr: AddrSpec::Wildcard,
                port: PortSpec::Range(1, 65535),
            },
        ]);

        assert!(!policy.permits(Ipv4Addr::new(10, 1, 2, 3), 80));
        assert!(policy.permits(Ipv4Addr::new(93, 184, 216, 34), 80));
        assert!(!policy.permits(Ipv4Addr::new(93, 184, 216, 34), 0));
    }

    #[test]
    fn empty_policy_rejects_everything() {
        let policy = ExitPolicy::default();
        assert!(!policy.permits(Ipv4Addr::new(1, 2, 3, 4), 443));
    }
}
