//! OR-link framing, the circuit-creation handshake, and the layered
//! relay-cell engine: the parts of the circuit engine that need an async
//! runtime and a live network connection, built on the wire formats from
//! `orcore-cell` and the primitives from `orcore-llcrypto`.

#![warn(missing_docs)]

pub mod channel;
pub mod circmap;
pub mod circuit;
pub mod crypto;
pub mod err;
pub mod extend;
pub mod forwarding;
pub mod handshake;
pub mod linkhandshake;
pub mod relaypayload;
pub mod sendme;
pub mod streammap;
pub mod token_bucket;

pub use channel::{Channel, LinkState};
pub use circmap::{CircIdRange, CircMap};
pub use circuit::{Circuit, CircuitPurpose, CircuitRole, CircuitState, HopState, HopStateLifecycle, LinkId};
pub use crypto::{HopCrypto, OriginCrypt, RollingDigest};
pub use err::{Error, Result};
pub use extend::ExtendPayload;
pub use forwarding::{originate_backward, process_backward, process_forward, BackwardOutcome, ForwardOutcome};
pub use handshake::{respond as handshake_respond, ClientHandshake, HandshakeOutput, AUTH_TAG_LEN, CREATE_ONION_SKIN_LEN};
pub use linkhandshake::{NetInfo, LINK_PROTOCOL_VERSION};
pub use relaypayload::{BeginPayload, ConnectedPayload, EndReason};
pub use sendme::Window;
pub use streammap::{HalfStream, ShouldSendEnd, StreamEnt, StreamMap, StreamState};
pub use token_bucket::TokenBucket;
