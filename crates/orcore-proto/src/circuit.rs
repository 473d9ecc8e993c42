//! Circuit lifecycle and state (spec §3, §4.E).
//!
//! A [`Circuit`] is this relay's view of one layered tunnel. Every relay
//! on a circuit's path holds one `Circuit` value; only the originator's
//! also carries a populated `cpath`. An intermediate's single
//! [`crate::crypto::HopCrypto`] layer and an origin's `cpath` are mutually
//! exclusive, mirrored here as the `role` field rather than two optional
//! fields that could both be set or both be empty by mistake.

use crate::crypto::OriginCrypt;
use crate::err::{Error, Result};
use crate::sendme::Window;
use orcore_cell::CircId;
use orcore_llcrypto::pk::rsa::RsaIdentity;
use std::net::Ipv4Addr;

/// A circuit's lifecycle state, from the perspective of any relay on the
/// path (spec §4.E).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CircuitState {
    /// An intermediate is waiting on the onion-skin worker for a `CREATE`
    /// it just received.
    OnionskinPending,
    /// An origin is waiting for its first-hop link to reach `Open`.
    OrLinkWait,
    /// Handshake(s) are in flight; not yet ready to carry stream data.
    Building,
    /// Fully keyed and ready to carry relay traffic.
    Open,
    /// Build failed; the circuit will never become `Open`.
    Failed,
    /// Torn down, by `DESTROY`, link loss, or idle timeout.
    Closed,
}

/// Why a circuit exists, mirrored from the `RELAY_BEGIN`/extend context
/// that created it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CircuitPurpose {
    /// An ordinary circuit carrying application streams.
    General,
    /// Fetching directory information.
    DirectoryFetch,
}

/// A single hop of an origin circuit's `cpath` (spec §3's `HopState`).
pub struct HopState {
    /// The hop's IPv4 address.
    pub address: Ipv4Addr,
    /// The hop's OR port.
    pub or_port: u16,
    /// The hop's identity digest.
    pub identity: RsaIdentity,
    /// This hop's circuit-level flow-control window, origin's view.
    pub window: Window,
    /// Lifecycle state of this one hop's handshake.
    pub state: HopStateLifecycle,
}

/// Lifecycle of one `cpath` entry. At most the last hop may be
/// `AwaitingKeys`; every predecessor must be `Open`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HopStateLifecycle {
    /// Not yet extended to.
    Closed,
    /// `CREATE`/`EXTEND` sent, waiting for `CREATED`/`EXTENDED`.
    AwaitingKeys,
    /// Handshake complete; this hop's crypto layer is keyed.
    Open,
}

/// This relay's position on a circuit: either the originator (holding a
/// full `cpath`) or a pass-through hop (holding one crypto layer and the
/// neighboring links).
pub enum CircuitRole {
    /// This relay originated the circuit.
    Origin {
        /// Ordered hop records, nearest to farthest.
        cpath: Vec<HopState>,
        /// The layered crypto state matching `cpath`.
        crypt: OriginCrypt,
    },
    /// This relay is an intermediate or exit hop of someone else's
    /// circuit.
    Relay {
        /// The upstream link this circuit arrived on.
        prev_link_id: LinkId,
        /// This circuit's ID on the upstream link.
        prev_circ_id: CircId,
        /// The downstream link and circuit ID, once `EXTEND` succeeds.
        /// Absent if this relay is the circuit's exit.
        next: Option<(LinkId, CircId)>,
        /// This hop's one crypto layer.
        crypt: crate::crypto::HopCrypto,
    },
}

/// Opaque handle identifying one OR-link, scoped by whatever a caller's
/// link manager uses as a key (typically the peer's identity digest).
pub type LinkId = RsaIdentity;

/// A circuit, as tracked by whichever relay holds this value.
pub struct Circuit {
    /// This circuit's role and role-specific state.
    pub role: CircuitRole,
    /// Circuit-level package window (how much more this side may send).
    pub package_window: Window,
    /// Why this circuit was built.
    pub purpose: CircuitPurpose,
    /// Current lifecycle state.
    pub state: CircuitState,
}

impl Circuit {
    /// Start a new origin circuit with an empty `cpath`, in
    /// `OrLinkWait`.
    pub fn new_origin(purpose: CircuitPurpose) -> Self {
        Circuit {
            role: CircuitRole::Origin { cpath: Vec::new(), crypt: OriginCrypt::new() },
            package_window: Window::new_circuit(),
            purpose,
            state: CircuitState::OrLinkWait,
        }
    }

    /// Start a new pass-through circuit record for an intermediate, once
    /// its `CREATE`/`CREATED` exchange has completed.
    pub fn new_relay(
        prev_link_id: LinkId,
        prev_circ_id: CircId,
        crypt: crate::crypto::HopCrypto,
        purpose: CircuitPurpose,
    ) -> Self {
        Circuit {
            role: CircuitRole::Relay { prev_link_id, prev_circ_id, next: None, crypt },
            package_window: Window::new_circuit(),
            purpose,
            state: CircuitState::Building,
        }
    }

    /// True once every `cpath` entry (for an origin) is `Open`, or once an
    /// intermediate's own layer is keyed.
    pub fn is_open(&self) -> bool {
        self.state == CircuitState::Open
    }

    /// Append a freshly-completed hop to an origin's `cpath`, keying its
    /// crypto layer. Errors if this circuit isn't an origin, or if the
    /// previous hop (if any) isn't yet `Open` — a circuit's hops must
    /// complete their handshakes in order.
    pub fn push_hop(&mut self, hop: HopState, hop_crypto: crate::crypto::HopCrypto) -> Result<()> {
        let CircuitRole::Origin { cpath, crypt } = &mut self.role else {
            return Err(Error::ProtocolViolation("push_hop on a non-origin circuit".into()));
        };
        if let Some(prev) = cpath.last() {
            if prev.state != HopStateLifecycle::Open {
                return Err(Error::ProtocolViolation(
                    "extended past a hop that has not finished its own handshake".into(),
                ));
            }
        }
        crypt.push_hop(hop_crypto);
        cpath.push(hop);
        Ok(())
    }

    /// Mark the circuit fully built: every `cpath` hop `Open` (origin) or
    /// this relay's own layer keyed (intermediate).
    pub fn mark_open(&mut self) {
        self.state = CircuitState::Open;
    }

    /// Tear the circuit down, e.g. on `DESTROY` or link loss.
    pub fn mark_closed(&mut self) {
        self.state = CircuitState::Closed;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fresh_origin_circuit_starts_in_or_link_wait_with_full_windows() {
        let c = Circuit::new_origin(CircuitPurpose::General);
        assert_eq!(c.state, CircuitState::OrLinkWait);
        assert_eq!(c.package_window.package_window(), 1000);
        assert!(matches!(c.role, CircuitRole::Origin { ref cpath, .. } if cpath.is_empty()));
    }

    #[test]
    fn push_hop_rejects_out_of_order_extension() {
        let mut c = Circuit::new_origin(CircuitPurpose::General);
        let hop = |state| HopState {
            address: Ipv4Addr::new(127, 0, 0, 1),
            or_port: 9001,
            identity: RsaIdentity::from_bytes(&[1; 20]).unwrap(),
            window: Window::new_circuit(),
            state,
        };
        // First hop: fine even though it's immediately AwaitingKeys.
        let kdf_material = orcore_llcrypto::kdf::kdf(b"test shared secret", 72).unwrap();
        let hop_crypto_a = crate::crypto::HopCrypto::from_kdf_output(&kdf_material);
        c.push_hop(hop(HopStateLifecycle::AwaitingKeys), hop_crypto_a).unwrap();

        // Second hop: rejected, because the first hop never became Open.
        let hop_crypto_b = crate::crypto::HopCrypto::from_kdf_output(&kdf_material);
        assert!(c.push_hop(hop(HopStateLifecycle::AwaitingKeys), hop_crypto_b).is_err());
    }
}
