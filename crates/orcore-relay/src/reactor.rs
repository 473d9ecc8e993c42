//! Per-link cell dispatch (spec §4.H): the event loop `orcore-circmgr`'s
//! own `build` module doc flags as missing ("a dispatcher... doesn't
//! exist yet in this workspace"). One task per OR-link, reading cells off
//! it and routing each by circuit ID through the relay's shared
//! [`CircuitTable`], in place of a build's own link-monopolizing
//! `recv_chan_cell` loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use orcore_cell::{ChanCell, ChanCmd, CircId, RelayCmd, RelayMsg, CELL_DATA_LEN};
use orcore_chanmgr::{LinkTarget, SharedChannel};
use orcore_llcrypto::pk::rsa::RsaIdentity;
use orcore_proto::handshake::CREATE_ONION_SKIN_LEN;
use orcore_proto::{
    originate_backward, process_backward, process_forward, BackwardOutcome, Circuit, CircuitPurpose,
    CircuitRole, ForwardOutcome, StreamMap,
};
use rand::rngs::OsRng;
use tracing::{debug, warn};

use crate::relay::RelayContext;
use crate::table::{CircuitEntry, CircuitKey, PendingCreateReply};

/// How long an `EXTEND` waits for its downstream `CREATE` to be answered
/// before giving up and replying `TRUNCATED` upstream.
const EXTEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Drive one OR-link until it closes: read cells and dispatch each by
/// circuit ID through `ctx.table`. Runs for the life of the link; see
/// [`crate::relay::RelayContext::ensure_link_reactor`] for how exactly
/// one of these ever runs per peer identity at a time.
pub async fn run(ctx: Arc<RelayContext>, channel: SharedChannel, peer_identity: RsaIdentity) {
    loop {
        let cell = {
            let mut guard = channel.lock().await;
            match guard.recv_cell(Instant::now()).await {
                Ok(Some(cell)) => cell,
                Ok(None) => {
                    debug!(peer = %peer_identity, "link closed cleanly");
                    break;
                }
                Err(e) => {
                    warn!(peer = %peer_identity, error = %e, "link read failed");
                    break;
                }
            }
        };

        if let Err(e) = dispatch_cell(&ctx, &channel, peer_identity, cell).await {
            warn!(peer = %peer_identity, error = %e, "cell dispatch failed");
        }
    }
}

async fn dispatch_cell(
    ctx: &Arc<RelayContext>,
    channel: &SharedChannel,
    peer_identity: RsaIdentity,
    cell: ChanCell,
) -> orcore_proto::Result<()> {
    match cell.cmd() {
        ChanCmd::PADDING => Ok(()),
        ChanCmd::VERSIONS | ChanCmd::NETINFO => {
            warn!(peer = %peer_identity, cmd = ?cell.cmd(), "unexpected post-handshake link cell");
            Ok(())
        }
        ChanCmd::CREATE | ChanCmd::CREATE_FAST => {
            let circ_id = require_circid(&cell)?;
            handle_create(ctx, channel, peer_identity, circ_id, cell.body().as_bytes()).await
        }
        ChanCmd::CREATED | ChanCmd::CREATED_FAST => {
            let circ_id = require_circid(&cell)?;
            let key: CircuitKey = (peer_identity, circ_id);
            let resolved = ctx
                .table
                .resolve_pending_create(key, PendingCreateReply::Created(cell.body().as_bytes().to_vec()))
                .await;
            if !resolved {
                warn!(peer = %peer_identity, circ_id = %circ_id, "CREATED with no matching pending CREATE");
            }
            Ok(())
        }
        ChanCmd::RELAY | ChanCmd::RELAY_EARLY => {
            let circ_id = require_circid(&cell)?;
            let mut payload = [0_u8; CELL_DATA_LEN];
            payload.copy_from_slice(cell.body().as_bytes());
            handle_relay_cell(ctx, peer_identity, circ_id, payload).await
        }
        ChanCmd::DESTROY => {
            let circ_id = require_circid(&cell)?;
            handle_destroy(ctx, peer_identity, circ_id).await
        }
        other => {
            warn!(peer = %peer_identity, cmd = ?other, "unhandled channel command");
            Ok(())
        }
    }
}

fn require_circid(cell: &ChanCell) -> orcore_proto::Result<CircId> {
    cell.circid()
        .ok_or_else(|| orcore_proto::Error::ProtocolViolation(format!("{:?} cell with no circuit id", cell.cmd())))
}

/// Reply to an inbound `CREATE`: run the TAP handshake and register a
/// fresh pass-through circuit under its upstream key.
async fn handle_create(
    ctx: &Arc<RelayContext>,
    channel: &SharedChannel,
    peer_identity: RsaIdentity,
    circ_id: CircId,
    body: &[u8],
) -> orcore_proto::Result<()> {
    let key: CircuitKey = (peer_identity, circ_id);
    if ctx.table.get(&key).await.is_some() {
        return Err(orcore_proto::Error::ProtocolViolation("CREATE on an already-known circuit id".into()));
    }

    let onion_skin_len = CREATE_ONION_SKIN_LEN.min(body.len());
    let mut rng = OsRng;
    let (reply, hop_crypto) =
        orcore_proto::handshake_respond(ctx.identity.private_key(), &body[..onion_skin_len], &mut rng)?;

    let mut circuit = Circuit::new_relay(peer_identity, circ_id, hop_crypto, CircuitPurpose::General);
    circuit.mark_open();
    let entry = CircuitEntry {
        circuit,
        prev_channel: channel.clone(),
        prev_identity: peer_identity,
        prev_circ_id: circ_id,
        next_channel: None,
        next_identity: None,
        next_circ_id: None,
        streams: StreamMap::new(),
        stream_tx: std::collections::HashMap::new(),
    };
    ctx.table.insert_prev(key, entry).await;

    send_chan_cell(channel, circ_id, ChanCmd::CREATED, reply).await
}

/// Process one `RELAY`/`RELAY_EARLY` cell against whatever circuit it
/// belongs to, forwarding or locally dispatching as `orcore-proto`'s
/// recognition engine decides.
async fn handle_relay_cell(
    ctx: &Arc<RelayContext>,
    peer_identity: RsaIdentity,
    circ_id: CircId,
    payload: [u8; CELL_DATA_LEN],
) -> orcore_proto::Result<()> {
    let key: CircuitKey = (peer_identity, circ_id);
    let Some(handle) = ctx.table.get(&key).await else {
        warn!(peer = %peer_identity, circ_id = %circ_id, "RELAY cell for unknown circuit");
        return Ok(());
    };

    let mut entry = handle.lock().await;
    let is_from_prev = entry.prev_identity == peer_identity && entry.prev_circ_id == circ_id;

    if is_from_prev {
        match process_forward(&mut entry.circuit.role, payload)? {
            ForwardOutcome::Local(msg) => {
                drop(entry);
                handle_local_msg(ctx, &handle, msg).await
            }
            ForwardOutcome::Forward(out) => {
                let next_channel = entry.next_channel.clone();
                let next_circ_id = entry.next_circ_id;
                drop(entry);
                match (next_channel, next_circ_id) {
                    (Some(next_channel), Some(next_circ_id)) => {
                        send_chan_cell(&next_channel, next_circ_id, ChanCmd::RELAY, out.to_vec()).await
                    }
                    _ => {
                        warn!(peer = %peer_identity, circ_id = %circ_id, "forward cell on a circuit with no next hop");
                        Ok(())
                    }
                }
            }
        }
    } else {
        // A `Relay` role's `process_backward` always forwards: only an
        // `Origin` ever locally recognizes a backward cell, and this
        // relay never tracks someone else's circuit as an origin.
        match process_backward(&mut entry.circuit.role, payload)? {
            BackwardOutcome::Forward(out) => {
                let prev_channel = entry.prev_channel.clone();
                let prev_circ_id = entry.prev_circ_id;
                drop(entry);
                send_chan_cell(&prev_channel, prev_circ_id, ChanCmd::RELAY, out.to_vec()).await
            }
            BackwardOutcome::Local { .. } => Err(orcore_proto::Error::ProtocolViolation(
                "a pass-through circuit entry locally recognized a backward cell".into(),
            )),
        }
    }
}

/// Dispatch a cell this relay itself is the recognized target of: circuit
/// control commands (`EXTEND`, circuit-level `SENDME`) handled here, every
/// stream command delegated to `exit.rs`.
async fn handle_local_msg(
    ctx: &Arc<RelayContext>,
    handle: &Arc<tokio::sync::Mutex<CircuitEntry>>,
    msg: RelayMsg,
) -> orcore_proto::Result<()> {
    match msg.cmd() {
        RelayCmd::EXTEND => handle_extend(ctx, handle, &msg).await,
        RelayCmd::SENDME if msg.stream_id() == 0 => {
            let mut entry = handle.lock().await;
            entry.circuit.package_window.note_sendme_received()?;
            Ok(())
        }
        RelayCmd::TRUNCATE => handle_truncate(ctx, handle).await,
        cmd if cmd.is_stream_command() => crate::exit::handle_stream_msg(ctx, handle, msg).await,
        other => {
            warn!(cmd = ?other, "unexpected locally-recognized relay command");
            Ok(())
        }
    }
}

/// Handle an `EXTEND`: dial (or reuse) the named next hop, send it a
/// `CREATE` carrying the forwarded onion skin, and reply `EXTENDED`/
/// `TRUNCATED` upstream depending on the outcome.
async fn handle_extend(
    ctx: &Arc<RelayContext>,
    handle: &Arc<tokio::sync::Mutex<CircuitEntry>>,
    msg: &RelayMsg,
) -> orcore_proto::Result<()> {
    let extend = orcore_proto::extend::decode(msg.data())?;

    let target = LinkTarget {
        addr: extend.address,
        or_port: extend.or_port,
        expected_identity: Some(extend.identity),
    };
    let next_channel = ctx.chanmgr.get_or_connect(target).await.map_err(|e| {
        orcore_proto::Error::ProtocolViolation(format!("could not reach next hop {}: {e}", extend.identity))
    })?;
    ctx.ensure_link_reactor(extend.identity, next_channel.clone()).await;

    let my_identity = ctx.identity.identity();
    let Some(next_circ_id) = ctx.table.alloc_next_circ_id(my_identity, extend.identity).await else {
        return reply_truncated(handle, 0).await;
    };

    let pending_key: CircuitKey = (extend.identity, next_circ_id);
    let rx = ctx.table.register_pending_create(pending_key).await;
    send_chan_cell(&next_channel, next_circ_id, ChanCmd::CREATE, extend.onion_skin.clone()).await?;

    let reply = match tokio::time::timeout(EXTEND_TIMEOUT, rx).await {
        Ok(Ok(PendingCreateReply::Created(body))) => body,
        Ok(Ok(PendingCreateReply::LinkFailed)) | Ok(Err(_)) | Err(_) => {
            return reply_truncated(handle, 0).await;
        }
    };

    let reply_len = orcore_llcrypto::dh::DH_LEN + orcore_proto::AUTH_TAG_LEN;
    if reply.len() < reply_len {
        return reply_truncated(handle, 0).await;
    }

    // The downstream peer already built its own `HopCrypto` when it
    // answered `CREATED`; this relay never sees that layer, only the
    // reply bytes it now relays onward as `EXTENDED`.
    {
        let mut entry = handle.lock().await;
        entry.next_channel = Some(next_channel.clone());
        entry.next_identity = Some(extend.identity);
        entry.next_circ_id = Some(next_circ_id);
        if let CircuitRole::Relay { next, .. } = &mut entry.circuit.role {
            *next = Some((extend.identity, next_circ_id));
        }
    }
    ctx.table.insert_next(pending_key, handle.clone()).await;

    let extended = RelayMsg::new(RelayCmd::EXTENDED, 0, reply[..reply_len].to_vec())?;
    let mut entry = handle.lock().await;
    let wire = originate_backward(&mut entry.circuit.role, &extended)?;
    let prev_channel = entry.prev_channel.clone();
    let prev_circ_id = entry.prev_circ_id;
    drop(entry);
    send_chan_cell(&prev_channel, prev_circ_id, ChanCmd::RELAY, wire.to_vec()).await
}

async fn reply_truncated(handle: &Arc<tokio::sync::Mutex<CircuitEntry>>, reason: u8) -> orcore_proto::Result<()> {
    let truncated = RelayMsg::new(RelayCmd::TRUNCATED, 0, vec![reason])?;
    let mut entry = handle.lock().await;
    let wire = originate_backward(&mut entry.circuit.role, &truncated)?;
    let prev_channel = entry.prev_channel.clone();
    let prev_circ_id = entry.prev_circ_id;
    drop(entry);
    send_chan_cell(&prev_channel, prev_circ_id, ChanCmd::RELAY, wire.to_vec()).await
}

/// A `TRUNCATE`: tear down everything past this hop and reply
/// `TRUNCATED` upstream. This workspace only ever carries a circuit one
/// hop past its exit's own relay process, so there's never a further
/// downstream link to actually truncate; the handling is the upstream
/// reply alone.
async fn handle_truncate(
    ctx: &Arc<RelayContext>,
    handle: &Arc<tokio::sync::Mutex<CircuitEntry>>,
) -> orcore_proto::Result<()> {
    {
        let mut entry = handle.lock().await;
        if let (Some(next_identity), Some(next_circ_id)) = (entry.next_identity, entry.next_circ_id) {
            if let Some(next_channel) = entry.next_channel.take() {
                let _ = send_chan_cell(&next_channel, next_circ_id, ChanCmd::DESTROY, Vec::new()).await;
            }
            entry.next_identity = None;
            entry.next_circ_id = None;
            ctx.table.remove_both((next_identity, next_circ_id), None).await;
        }
    }
    reply_truncated(handle, 0).await
}

/// A `DESTROY`: tear down this circuit entirely, propagating to whichever
/// neighbor didn't send it.
async fn handle_destroy(ctx: &Arc<RelayContext>, peer_identity: RsaIdentity, circ_id: CircId) -> orcore_proto::Result<()> {
    let key: CircuitKey = (peer_identity, circ_id);
    let Some(handle) = ctx.table.get(&key).await else {
        // Might be a `DESTROY` replying to our own `CREATE` during an
        // `EXTEND` that we've already given up on.
        ctx.table
            .resolve_pending_create(key, PendingCreateReply::LinkFailed)
            .await;
        return Ok(());
    };

    let mut entry = handle.lock().await;
    entry.circuit.mark_closed();
    let from_prev = entry.prev_identity == peer_identity && entry.prev_circ_id == circ_id;
    let other = if from_prev {
        entry.next_channel.take().map(|ch| (ch, entry.next_identity.take().unwrap(), entry.next_circ_id.take().unwrap()))
    } else {
        Some((entry.prev_channel.clone(), entry.prev_identity, entry.prev_circ_id))
    };
    drop(entry);

    if let Some((other_channel, other_identity, other_circ_id)) = other {
        let _ = send_chan_cell(&other_channel, other_circ_id, ChanCmd::DESTROY, Vec::new()).await;
        ctx.table
            .remove_both((peer_identity, circ_id), Some((other_identity, other_circ_id)))
            .await;
    } else {
        ctx.table.remove_both((peer_identity, circ_id), None).await;
    }
    Ok(())
}

/// Send a cell on `channel`, padding/truncating-rejecting its body to the
/// fixed cell length the way every fixed-command cell must be.
pub(crate) async fn send_chan_cell(
    channel: &SharedChannel,
    circ_id: CircId,
    cmd: ChanCmd,
    body: Vec<u8>,
) -> orcore_proto::Result<()> {
    let cell = ChanCell::new_fixed(Some(circ_id), cmd, body)?;
    let mut guard = channel.lock().await;
    guard.send_cell(cell, Instant::now()).await
}
