//! Origin-side circuit build: `CREATE`/`CREATED` for the first hop, then
//! `RELAY_EXTEND`/`RELAY_EXTENDED` for each subsequent one (spec §4.E's
//! extend protocol).
//!
//! This drives the handshake by taking the first-hop link's lock for the
//! duration of the build and reading directly off it. A relay that is
//! itself carrying many other circuits over the same link needs a
//! dispatcher that demultiplexes inbound cells by circuit ID and hands
//! this routine only the ones addressed to it; that dispatcher belongs to
//! the event loop (spec §4.H) and doesn't exist yet in this workspace, so
//! for now a build simply monopolizes the link's receive side — correct
//! for an origin building one circuit at a time over an otherwise-idle
//! link, not yet correct for a busy relay extending many circuits
//! concurrently over a shared link.

use crate::err::{Error, Result};
use orcore_cell::{ChanCell, ChanCmd, CircId, RelayCmd, RelayMsg};
use orcore_chanmgr::SharedChannel;
use orcore_netdir::RouterDescriptor;
use orcore_proto::{
    handshake::AUTH_TAG_LEN, Circuit, CircuitPurpose, CircuitRole, CircuitState, ClientHandshake,
    HandshakeOutput, HopState, HopStateLifecycle,
};
use orcore_llcrypto::dh::DH_LEN;
use rand::{CryptoRng, RngCore};
use std::time::Instant;

/// Build a fresh origin circuit over `channel` along `path`, using
/// `circ_id` (already allocated in the link's owned ID half).
pub async fn build_origin_circuit<R: CryptoRng + RngCore>(
    channel: &SharedChannel,
    circ_id: CircId,
    path: &[RouterDescriptor],
    purpose: CircuitPurpose,
    rng: &mut R,
) -> Result<Circuit> {
    assert!(!path.is_empty(), "build_origin_circuit called with an empty path");

    let mut circuit = Circuit::new_origin(purpose);
    circuit.state = CircuitState::Building;

    let first = &path[0];
    let (handshake, onion_skin) = ClientHandshake::begin(first.onion_key(), rng).map_err(Error::Proto)?;
    send_chan_cell(channel, circ_id, ChanCmd::CREATE, onion_skin).await?;
    let reply = recv_chan_cell(channel, circ_id, ChanCmd::CREATED).await?;
    let HandshakeOutput { hop_crypto } =
        handshake.finish(&reply[..DH_LEN + AUTH_TAG_LEN]).map_err(Error::Proto)?;
    circuit
        .push_hop(hop_state(first), hop_crypto)
        .map_err(Error::Proto)?;

    for (hop_index, target) in path.iter().enumerate().skip(1) {
        extend_to(&mut circuit, channel, circ_id, hop_index, target, rng).await?;
    }

    circuit.mark_open();
    Ok(circuit)
}

/// Extend an already-partially-built origin circuit by one hop.
async fn extend_to<R: CryptoRng + RngCore>(
    circuit: &mut Circuit,
    channel: &SharedChannel,
    circ_id: CircId,
    hop_index: usize,
    target: &RouterDescriptor,
    rng: &mut R,
) -> Result<()> {
    let (handshake, onion_skin) = ClientHandshake::begin(target.onion_key(), rng).map_err(Error::Proto)?;
    let (address, or_port) = target.addr_port();
    let payload = orcore_proto::extend::encode(address, or_port, &onion_skin, &target.identity());
    let msg = RelayMsg::new(RelayCmd::EXTEND, 0, payload).map_err(orcore_proto::Error::from)?;
    let mut cell_body = msg.encode_with_placeholder_digest().map_err(orcore_proto::Error::from)?;

    let CircuitRole::Origin { crypt, .. } = &mut circuit.role else {
        return Err(Error::Proto(orcore_proto::Error::NotFound("origin circuit role")));
    };
    crypt.encrypt_forward(hop_index - 1, &mut cell_body);
    send_chan_cell(channel, circ_id, ChanCmd::RELAY_EARLY, cell_body.to_vec()).await?;

    let mut reply_body = recv_relay_body(channel, circ_id).await?;
    let CircuitRole::Origin { crypt, .. } = &mut circuit.role else {
        return Err(Error::Proto(orcore_proto::Error::NotFound("origin circuit role")));
    };
    let recognizer = crypt
        .decrypt_backward(&mut reply_body)
        .ok_or_else(|| Error::UnexpectedReply("no hop recognized the extend reply".into()))?;
    if recognizer != hop_index - 1 {
        return Err(Error::UnexpectedReply(format!(
            "extend reply was recognized at hop {recognizer}, expected {}",
            hop_index - 1
        )));
    }

    let reply = RelayMsg::decode(&reply_body).map_err(orcore_proto::Error::from)?;
    match reply.cmd() {
        RelayCmd::EXTENDED => {
            let HandshakeOutput { hop_crypto } =
                handshake.finish(&reply.data()[..DH_LEN + AUTH_TAG_LEN]).map_err(Error::Proto)?;
            circuit.push_hop(hop_state(target), hop_crypto).map_err(Error::Proto)?;
            Ok(())
        }
        RelayCmd::TRUNCATED => {
            let reason = reply.data().first().copied().unwrap_or(0);
            Err(Error::Truncated { hop: hop_index, reason })
        }
        other => Err(Error::UnexpectedReply(format!("expected EXTENDED or TRUNCATED, got {other:?}"))),
    }
}

fn hop_state(router: &RouterDescriptor) -> HopState {
    let (address, or_port) = router.addr_port();
    HopState {
        address,
        or_port,
        identity: router.identity(),
        window: orcore_proto::Window::new_circuit(),
        state: HopStateLifecycle::Open,
    }
}

async fn send_chan_cell(channel: &SharedChannel, circ_id: CircId, cmd: ChanCmd, body: Vec<u8>) -> Result<()> {
    let cell = ChanCell::new_fixed(Some(circ_id), cmd, body).map_err(orcore_proto::Error::from)?;
    let mut guard = channel.lock().await;
    guard.send_cell(cell, Instant::now()).await.map_err(Error::Proto)?;
    Ok(())
}

/// Receive cells off `channel` until one matches `circ_id` and `want`.
/// Cells for other circuits are dropped; see the module doc for why that's
/// an accepted simplification for now.
async fn recv_chan_cell(channel: &SharedChannel, circ_id: CircId, want: ChanCmd) -> Result<Vec<u8>> {
    loop {
        let mut guard = channel.lock().await;
        let cell = guard
            .recv_cell(Instant::now())
            .await
            .map_err(Error::Proto)?
            .ok_or_else(|| Error::Proto(orcore_proto::Error::LinkFailure("link closed while building circuit".into())))?;
        drop(guard);
        if cell.circid() != Some(circ_id) {
            continue;
        }
        if cell.cmd() != want {
            return Err(Error::UnexpectedReply(format!("expected {want:?}, got {:?}", cell.cmd())));
        }
        return Ok(cell.body().as_bytes().to_vec());
    }
}

/// Like [`recv_chan_cell`], but for a `RELAY` cell, returning its raw
/// fixed-size body for the caller to peel layers off of.
async fn recv_relay_body(channel: &SharedChannel, circ_id: CircId) -> Result<[u8; orcore_cell::CELL_DATA_LEN]> {
    let body = recv_chan_cell(channel, circ_id, ChanCmd::RELAY).await?;
    let mut arr = [0_u8; orcore_cell::CELL_DATA_LEN];
    arr.copy_from_slice(&body);
    Ok(arr)
}
