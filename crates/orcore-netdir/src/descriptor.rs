//! A single router's identity and routing-relevant attributes (spec §3's
//! `RouterDescriptor`).

use crate::exitpolicy::ExitPolicy;
use bitflags::bitflags;
use orcore_llcrypto::pk::rsa::RsaIdentity;
use std::net::Ipv4Addr;

bitflags! {
    /// Flags a router may be tagged with by the directory feed.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct RouterFlags: u16 {
        /// Conforms to current directory requirements; not known-broken.
        const VALID = 1 << 0;
        /// Believed to currently be up and reachable.
        const RUNNING = 1 << 1;
        /// High-bandwidth relay, suitable for performance-sensitive hops.
        const FAST = 1 << 2;
        /// Stable uptime, suitable for long-lived circuits.
        const STABLE = 1 << 3;
        /// Usable as the last hop of a general-purpose circuit.
        const EXIT = 1 << 4;
        /// Usable as the first hop of a circuit.
        const GUARD = 1 << 5;
        /// Known to behave badly as an exit even though it has an exit
        /// policy; must never be selected as one.
        const BAD_EXIT = 1 << 6;
    }
}

/// The onion public key a client encrypts a `CREATE` payload to when
/// extending a circuit to this router.
pub type OnionPublicKey = rsa::RsaPublicKey;

/// Identity, address, and routing attributes of one relay.
#[derive(Clone)]
pub struct RouterDescriptor {
    identity: RsaIdentity,
    nickname: String,
    addr: Ipv4Addr,
    or_port: u16,
    onion_key: OnionPublicKey,
    bandwidth_bytes_per_sec: u64,
    family: Vec<RsaIdentity>,
    exit_policy: ExitPolicy,
    flags: RouterFlags,
}

impl RouterDescriptor {
    /// Construct a descriptor from its attributes.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: RsaIdentity,
        nickname: String,
        addr: Ipv4Addr,
        or_port: u16,
        onion_key: OnionPublicKey,
        bandwidth_bytes_per_sec: u64,
        family: Vec<RsaIdentity>,
        exit_policy: ExitPolicy,
        flags: RouterFlags,
    ) -> Self {
        RouterDescriptor {
            identity,
            nickname,
            addr,
            or_port,
            onion_key,
            bandwidth_bytes_per_sec,
            family,
            exit_policy,
            flags,
        }
    }

    /// This router's identity fingerprint.
    pub fn identity(&self) -> RsaIdentity {
        self.identity
    }

    /// This router's nickname.
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// This router's address and OR-port.
    pub fn addr_port(&self) -> (Ipv4Addr, u16) {
        (self.addr, self.or_port)
    }

    /// The public key used in this router's create-handshake.
    pub fn onion_key(&self) -> &OnionPublicKey {
        &self.onion_key
    }

    /// Declared bandwidth, in bytes per second.
    pub fn bandwidth(&self) -> u64 {
        self.bandwidth_bytes_per_sec
    }

    /// Identities this router declares as administratively related.
    pub fn family(&self) -> &[RsaIdentity] {
        &self.family
    }

    /// This router's exit policy.
    pub fn exit_policy(&self) -> &ExitPolicy {
        &self.exit_policy
    }

    /// This router's flags.
    pub fn flags(&self) -> RouterFlags {
        self.flags
    }

    /// True if this router permits exiting to `addr:port`.
    pub fn permits_exit_to(&self, addr: Ipv4Addr, port: u16) -> bool {
        self.exit_policy.permits(addr, port)
    }
}

/// Two routers are in the same family if each declares the other — a
/// one-sided declaration doesn't count (spec §4.D point 5).
pub fn mutually_in_family(a: &RouterDescriptor, b: &RouterDescriptor) -> bool {
    a.family().contains(&b.identity()) && b.family().contains(&a.identity())
}

/// True if `a` and `b` share the same IPv4 /16 network.
pub fn shares_slash16(a: &RouterDescriptor, b: &RouterDescriptor) -> bool {
    let (addr_a, _) = a.addr_port();
    let (addr_b, _) = b.addr_port();
    addr_a.octets()[..2] == addr_b.octets()[..2]
}
