//! Exit-hop stream handling (spec §4.G): the far end of a circuit that
//! recognizes `RELAY_BEGIN`/`RELAY_DATA`/`RELAY_END`/`RELAY_RESOLVE` and
//! actually opens a TCP connection out to the requested destination.
//!
//! Grounded on the teacher's exit-stream proxy loop
//! (`arti-relay/src/stream.rs`'s copy-both-ways task), adapted to this
//! workspace's cell-at-a-time relay cryptography instead of a stream
//! abstraction the teacher's `tor-proto` already provides.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use orcore_cell::{RelayCmd, RelayMsg, RELAY_PAYLOAD_LEN};
use orcore_proto::relaypayload::{decode_begin, encode_connected, encode_end, EndReason};
use orcore_proto::{originate_backward, StreamEnt, StreamState, Window};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, warn};

use crate::relay::RelayContext;
use crate::table::CircuitEntry;

/// How long `RELAY_BEGIN` waits for the destination to accept before
/// replying `RELAY_END(ConnectTimeout)`.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Dispatch one locally-recognized stream-command relay message to the
/// right handler.
pub async fn handle_stream_msg(
    ctx: &Arc<RelayContext>,
    handle: &Arc<AsyncMutex<CircuitEntry>>,
    msg: RelayMsg,
) -> orcore_proto::Result<()> {
    match msg.cmd() {
        RelayCmd::BEGIN | RelayCmd::BEGIN_DIR => handle_begin(ctx, handle, &msg).await,
        RelayCmd::DATA => handle_data(handle, &msg).await,
        RelayCmd::END => handle_end(handle, msg.stream_id()).await,
        RelayCmd::SENDME => handle_stream_sendme(handle, msg.stream_id()).await,
        RelayCmd::RESOLVE => handle_resolve(handle, &msg).await,
        other => {
            warn!(cmd = ?other, "unexpected stream command");
            Ok(())
        }
    }
}

/// `RELAY_BEGIN`: resolve the destination, check this relay's own exit
/// policy, connect out, and reply `RELAY_CONNECTED` or `RELAY_END`.
/// `RELAY_BEGIN_DIR` is a degenerate case of the same cell this relay
/// never actually serves a directory over, so it's always denied.
async fn handle_begin(
    ctx: &Arc<RelayContext>,
    handle: &Arc<AsyncMutex<CircuitEntry>>,
    msg: &RelayMsg,
) -> orcore_proto::Result<()> {
    let stream_id = msg.stream_id();
    if msg.cmd() == RelayCmd::BEGIN_DIR {
        return end_stream(handle, stream_id, EndReason::ExitPolicy).await;
    }

    let begin = decode_begin(msg.data())?;

    let addr = match resolve_host(&begin.host, begin.port).await {
        Some(addr) => addr,
        None => return end_stream(handle, stream_id, EndReason::ResolveFailed).await,
    };

    if !ctx.exit_policy.permits(addr, begin.port) {
        debug!(%addr, port = begin.port, "exit policy denied RELAY_BEGIN destination");
        return end_stream(handle, stream_id, EndReason::ExitPolicy).await;
    }

    let connect = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((addr, begin.port))).await;
    let stream = match connect {
        Ok(Ok(stream)) => stream,
        Ok(Err(_)) => return end_stream(handle, stream_id, EndReason::ConnectRefused).await,
        Err(_) => return end_stream(handle, stream_id, EndReason::ConnectTimeout).await,
    };

    let (mut read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    {
        let mut entry = handle.lock().await;
        entry
            .streams
            .insert_at(stream_id, StreamEnt::Open { state: StreamState::Open, window: Window::new_stream() });
        entry.stream_tx.insert(stream_id, tx);
    }

    send_backward(handle, stream_id, RelayCmd::CONNECTED, encode_connected(addr, 60)).await?;

    // Inbound half: whatever `RELAY_DATA` cells arrive gets written
    // straight to the socket.
    let write_handle = handle.clone();
    tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            if write_half.write_all(&chunk).await.is_err() {
                break;
            }
        }
        let _ = write_half.shutdown().await;
        drop(write_handle);
    });

    // Outbound half: whatever arrives on the socket becomes `RELAY_DATA`
    // cells back toward the origin.
    let handle = handle.clone();
    tokio::spawn(async move {
        let mut buf = [0_u8; RELAY_PAYLOAD_LEN];
        loop {
            let n = match read_half.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!(error = %e, stream_id, "exit socket read failed");
                    break;
                }
            };
            if !wait_for_send_window(&handle, stream_id).await {
                break;
            }
            if send_backward(&handle, stream_id, RelayCmd::DATA, buf[..n].to_vec()).await.is_err() {
                break;
            }
        }
        let _ = end_stream(&handle, stream_id, EndReason::Done).await;
    });

    Ok(())
}

/// Block (via short polling backoff) until both the stream's and the
/// circuit's package windows have room to send one more `RELAY_DATA`
/// cell, or the stream has disappeared entirely.
async fn wait_for_send_window(handle: &Arc<AsyncMutex<CircuitEntry>>, stream_id: u16) -> bool {
    loop {
        let mut entry = handle.lock().await;
        let Some(StreamEnt::Open { window, .. }) = entry.streams.get_mut(stream_id) else {
            return false;
        };
        if window.send_blocked() || entry.circuit.package_window.send_blocked() {
            drop(entry);
            tokio::time::sleep(Duration::from_millis(50)).await;
            continue;
        }
        window.note_sent().ok();
        entry.circuit.package_window.note_sent().ok();
        return true;
    }
}

/// `RELAY_DATA`: forward the payload to the stream's socket and account
/// for it against both the stream's and circuit's delivery windows,
/// emitting a stream-level `SENDME` once the threshold is crossed.
async fn handle_data(handle: &Arc<AsyncMutex<CircuitEntry>>, msg: &RelayMsg) -> orcore_proto::Result<()> {
    let stream_id = msg.stream_id();
    let should_sendme = {
        let mut entry = handle.lock().await;
        let Some(StreamEnt::Open { window, .. }) = entry.streams.get_mut(stream_id) else {
            debug!(stream_id, "RELAY_DATA for an unknown or closed stream");
            return Ok(());
        };
        let stream_sendme = window.note_received()?;
        let circuit_sendme = entry.circuit.package_window.note_received()?;
        if stream_sendme {
            window.note_sendme_sent();
        }
        if circuit_sendme {
            entry.circuit.package_window.note_sendme_sent();
        }
        let tx = entry.stream_tx.get(&stream_id).cloned();
        if let Some(tx) = tx {
            let _ = tx.send(msg.data().to_vec());
        }
        stream_sendme
    };

    if should_sendme {
        let sendme = RelayMsg::new(RelayCmd::SENDME, stream_id, Vec::new())?;
        send_backward_msg(handle, &sendme).await?;
    }
    Ok(())
}

/// `RELAY_END`: close this stream's socket half and forget it.
async fn handle_end(handle: &Arc<AsyncMutex<CircuitEntry>>, stream_id: u16) -> orcore_proto::Result<()> {
    let mut entry = handle.lock().await;
    entry.streams.ending_msg_received(stream_id);
    entry.stream_tx.remove(&stream_id);
    Ok(())
}

/// Stream-level `SENDME`: replenish this stream's send allowance.
async fn handle_stream_sendme(handle: &Arc<AsyncMutex<CircuitEntry>>, stream_id: u16) -> orcore_proto::Result<()> {
    let mut entry = handle.lock().await;
    if let Some(StreamEnt::Open { window, .. }) = entry.streams.get_mut(stream_id) {
        window.note_sendme_received()?;
    }
    Ok(())
}

/// `RELAY_RESOLVE`: look up a hostname and reply with the resolved
/// address (reusing `RELAY_CONNECTED`'s addr+TTL wire shape, since this
/// workspace never needs `RESOLVED`'s multi-answer form).
async fn handle_resolve(handle: &Arc<AsyncMutex<CircuitEntry>>, msg: &RelayMsg) -> orcore_proto::Result<()> {
    let host = String::from_utf8_lossy(msg.data()).trim_end_matches('\0').to_string();
    let stream_id = msg.stream_id();
    match resolve_host(&host, 0).await {
        Some(addr) => send_backward(handle, stream_id, RelayCmd::RESOLVED, encode_connected(addr, 60)).await,
        None => end_stream(handle, stream_id, EndReason::ResolveFailed).await,
    }
}

async fn resolve_host(host: &str, port: u16) -> Option<Ipv4Addr> {
    if let Ok(addr) = host.parse::<Ipv4Addr>() {
        return Some(addr);
    }
    let lookup_target = format!("{host}:{port}");
    let mut addrs = tokio::net::lookup_host(lookup_target).await.ok()?;
    addrs.find_map(|sa| match sa.ip() {
        std::net::IpAddr::V4(v4) => Some(v4),
        std::net::IpAddr::V6(_) => None,
    })
}

/// Reply `RELAY_END(reason)` and tear down whatever local state exists
/// for `stream_id`.
async fn end_stream(handle: &Arc<AsyncMutex<CircuitEntry>>, stream_id: u16, reason: EndReason) -> orcore_proto::Result<()> {
    let should_send = {
        let mut entry = handle.lock().await;
        entry.stream_tx.remove(&stream_id);
        entry.streams.terminate(stream_id, false)
    };
    if should_send == orcore_proto::ShouldSendEnd::Send {
        send_backward(handle, stream_id, RelayCmd::END, encode_end(reason)).await
    } else {
        Ok(())
    }
}

async fn send_backward(
    handle: &Arc<AsyncMutex<CircuitEntry>>,
    stream_id: u16,
    cmd: RelayCmd,
    data: Vec<u8>,
) -> orcore_proto::Result<()> {
    let msg = RelayMsg::new(cmd, stream_id, data)?;
    send_backward_msg(handle, &msg).await
}

async fn send_backward_msg(handle: &Arc<AsyncMutex<CircuitEntry>>, msg: &RelayMsg) -> orcore_proto::Result<()> {
    let mut entry = handle.lock().await;
    let wire = originate_backward(&mut entry.circuit.role, msg)?;
    let prev_channel = entry.prev_channel.clone();
    let prev_circ_id = entry.prev_circ_id;
    drop(entry);
    crate::reactor::send_chan_cell(&prev_channel, prev_circ_id, orcore_cell::ChanCmd::RELAY, wire.to_vec()).await
}
