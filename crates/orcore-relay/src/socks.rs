//! The client-facing SOCKS listener: accept a local application's
//! SOCKS4/4a/5 CONNECT, build a fresh origin circuit for
//! it, and proxy bytes over a `RELAY_BEGIN`/`RELAY_DATA` stream.
//!
//! Each accepted connection gets its own circuit and monopolizes that
//! circuit's first-hop link for the life of the one stream it opens,
//! extending `orcore-circmgr/src/build.rs`'s own documented
//! simplification ("a build simply monopolizes the link's receive
//! side") past the build itself and through the stream's whole
//! lifetime — the shared per-link reactor in `reactor.rs`/`table.rs`
//! only ever serves pass-through circuits arriving over an inbound
//! OR-link, never a circuit this relay itself originates.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use orcore_cell::{ChanCell, ChanCmd, CircId, RelayCmd, RelayMsg, CELL_DATA_LEN, RELAY_PAYLOAD_LEN};
use orcore_chanmgr::SharedChannel;
use orcore_circmgr::BuiltCircuit;
use orcore_netdir::{CircuitPurpose, PathPolicy};
use orcore_proto::relaypayload::{decode_connected, encode_begin, EndReason};
use orcore_proto::{BackwardOutcome, Circuit, CircuitRole, Window};
use orcore_socksproto::{
    encode_command_not_supported, encode_method_selection, encode_reply, parse_method_negotiation, parse_request,
    SocksAddr, SocksCmd, SocksVersion,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, warn};

use crate::err::{Error, Result};
use crate::relay::RelayContext;

/// Hops a locally-originated circuit uses. Real Tor's default is also
/// three.
const DEFAULT_HOP_COUNT: usize = 3;

/// How long a stream waits for `RELAY_CONNECTED`/`RELAY_END` after
/// sending `RELAY_BEGIN`.
const BEGIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Run the SOCKS accept loop until the listener socket itself fails.
pub async fn serve(ctx: Arc<RelayContext>) -> Result<()> {
    let listener = TcpListener::bind(ctx.config.socks_listen).await.map_err(|e| Error::Socks(Arc::new(e)))?;
    debug!(addr = %ctx.config.socks_listen, "SOCKS listener listening");

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "SOCKS accept failed");
                continue;
            }
        };
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(ctx, stream).await {
                debug!(peer = %peer_addr, error = %e, "SOCKS connection ended");
            }
        });
    }
}

/// One end-to-end request: parse the client's handshake, build a
/// circuit, open a stream, reply, then proxy until either side closes.
async fn handle_connection(ctx: Arc<RelayContext>, mut client: TcpStream) -> Result<()> {
    let version = read_version(&mut client).await?;

    if version == 5 {
        negotiate_socks5_method(&mut client).await?;
    }

    let mut buf = vec![version];
    let request = loop {
        match parse_request(&buf) {
            Ok((req, _consumed)) => break req,
            Err(orcore_socksproto::Error::Incomplete { more_bytes }) => {
                read_more(&mut client, &mut buf, more_bytes).await?;
            }
            Err(e) => return Err(Error::Socks(Arc::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())))),
        }
    };

    if request.command() != SocksCmd::CONNECT {
        let reply = encode_command_not_supported(request.version());
        let _ = client.write_all(&reply).await;
        return Ok(());
    }

    let host = match request.addr() {
        SocksAddr::Ip(ip) => ip.to_string(),
        SocksAddr::Hostname(name) => name.clone(),
    };
    let port = request.port();

    let built = match build_circuit(&ctx).await {
        Ok(built) => built,
        Err(e) => {
            reply_failure(&mut client, request.version()).await;
            return Err(e);
        }
    };

    let origin = Arc::new(OriginStream::new(built));
    match origin.begin(&host, port).await {
        Ok(()) => {
            let reply = encode_reply(request.version(), true, Ipv4Addr::UNSPECIFIED, 0);
            client.write_all(&reply).await.map_err(|e| Error::Socks(Arc::new(e)))?;
        }
        Err(e) => {
            reply_failure(&mut client, request.version()).await;
            return Err(e);
        }
    }

    proxy(origin, client).await
}

async fn reply_failure(client: &mut TcpStream, version: SocksVersion) {
    let reply = encode_reply(version, false, Ipv4Addr::UNSPECIFIED, 0);
    let _ = client.write_all(&reply).await;
}

async fn read_version(client: &mut TcpStream) -> Result<u8> {
    let mut byte = [0_u8; 1];
    client.read_exact(&mut byte).await.map_err(|e| Error::Socks(Arc::new(e)))?;
    Ok(byte[0])
}

async fn read_more(client: &mut TcpStream, buf: &mut Vec<u8>, more_bytes: usize) -> Result<()> {
    let start = buf.len();
    buf.resize(start + more_bytes.max(1), 0);
    client
        .read_exact(&mut buf[start..])
        .await
        .map_err(|e| Error::Socks(Arc::new(e)))?;
    Ok(())
}

async fn negotiate_socks5_method(client: &mut TcpStream) -> Result<()> {
    let mut buf = vec![5_u8];
    let neg = loop {
        match parse_method_negotiation(&buf) {
            Ok((neg, _consumed)) => break neg,
            Err(orcore_socksproto::Error::Incomplete { more_bytes }) => {
                read_more(client, &mut buf, more_bytes).await?;
            }
            Err(e) => return Err(Error::Socks(Arc::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())))),
        }
    };
    let method = neg.choose_method();
    client
        .write_all(&encode_method_selection(method))
        .await
        .map_err(|e| Error::Socks(Arc::new(e)))?;
    if method == orcore_socksproto::METHOD_NONE_ACCEPTABLE {
        return Err(Error::Socks(Arc::new(std::io::Error::new(std::io::ErrorKind::Other, "no acceptable SOCKS5 auth method"))));
    }
    Ok(())
}

async fn build_circuit(ctx: &Arc<RelayContext>) -> Result<BuiltCircuit> {
    let routers = ctx.routers.read().await;
    let policy = PathPolicy::default();
    ctx.circmgr
        .get_circuit(&routers, &policy, DEFAULT_HOP_COUNT, CircuitPurpose::General)
        .await
        .map_err(Error::Circ)
}

/// A freshly-built origin circuit monopolized for exactly one stream:
/// the circuit-ID/`OriginCrypt` state guarded by one lock, a single
/// stream's send/receive windows tracked directly (no `StreamMap`
/// needed when a circuit only ever opens one stream).
struct OriginStream {
    channel: SharedChannel,
    circ_id: CircId,
    circuit: AsyncMutex<Circuit>,
    last_hop: usize,
    send_window: AsyncMutex<Window>,
    stream_id: u16,
}

impl OriginStream {
    fn new(built: BuiltCircuit) -> Self {
        let last_hop = match &built.circuit.role {
            CircuitRole::Origin { cpath, .. } => cpath.len().saturating_sub(1),
            CircuitRole::Relay { .. } => 0,
        };
        OriginStream {
            channel: built.channel,
            circ_id: built.circ_id,
            circuit: AsyncMutex::new(built.circuit),
            last_hop,
            send_window: AsyncMutex::new(Window::new_stream()),
            stream_id: 1,
        }
    }

    /// Send `RELAY_BEGIN` and block until `RELAY_CONNECTED` or
    /// `RELAY_END` arrives.
    async fn begin(&self, host: &str, port: u16) -> Result<()> {
        let payload = encode_begin(host, port, 0);
        let msg = RelayMsg::new(RelayCmd::BEGIN, self.stream_id, payload).map_err(|e| Error::Proto(e.into()))?;
        self.send_forward(&msg).await?;

        match tokio::time::timeout(BEGIN_TIMEOUT, self.recv_local()).await {
            Ok(Ok(reply)) if reply.cmd() == RelayCmd::CONNECTED => {
                let _ = decode_connected(reply.data());
                Ok(())
            }
            Ok(Ok(reply)) if reply.cmd() == RelayCmd::END => {
                Err(Error::Proto(orcore_proto::Error::ProtocolViolation(format!(
                    "RELAY_BEGIN refused: {:?}",
                    orcore_proto::relaypayload::decode_end(reply.data())
                ))))
            }
            Ok(Ok(_)) => Err(Error::Proto(orcore_proto::Error::ProtocolViolation("unexpected reply to RELAY_BEGIN".into()))),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Proto(orcore_proto::Error::Timeout)),
        }
    }

    async fn send_forward(&self, msg: &RelayMsg) -> Result<()> {
        let mut cell_body = msg.encode_with_placeholder_digest().map_err(|e| Error::Proto(e.into()))?;
        {
            let mut circuit = self.circuit.lock().await;
            let CircuitRole::Origin { crypt, .. } = &mut circuit.role else {
                return Err(Error::Proto(orcore_proto::Error::NotFound("origin circuit role")));
            };
            crypt.encrypt_forward(self.last_hop, &mut cell_body);
        }
        let cell = ChanCell::new_fixed(Some(self.circ_id), ChanCmd::RELAY, cell_body.to_vec()).map_err(|e| Error::Proto(e.into()))?;
        let mut guard = self.channel.lock().await;
        guard.send_cell(cell, Instant::now()).await.map_err(Error::Proto)
    }

    /// Read and decrypt cells off this circuit's channel until one is
    /// recognized at `last_hop` (the only hop we ever built `cpath`
    /// state for this circuit's recognition to land on).
    async fn recv_local(&self) -> Result<RelayMsg> {
        loop {
            let cell = {
                let mut guard = self.channel.lock().await;
                guard
                    .recv_cell(Instant::now())
                    .await
                    .map_err(Error::Proto)?
                    .ok_or_else(|| Error::Proto(orcore_proto::Error::LinkFailure("link closed mid-stream".into())))?
            };
            if cell.cmd() != ChanCmd::RELAY && cell.cmd() != ChanCmd::RELAY_EARLY {
                continue;
            }
            let Some(circ_id) = cell.circid() else { continue };
            if circ_id != self.circ_id {
                continue;
            }
            let mut payload = [0_u8; CELL_DATA_LEN];
            payload.copy_from_slice(cell.body().as_bytes());

            let mut circuit = self.circuit.lock().await;
            match orcore_proto::process_backward(&mut circuit.role, payload).map_err(Error::Proto)? {
                BackwardOutcome::Local { hop_index, msg } if hop_index == self.last_hop => return Ok(msg),
                BackwardOutcome::Local { .. } => continue,
                BackwardOutcome::Forward(_) => {
                    return Err(Error::Proto(orcore_proto::Error::ProtocolViolation(
                        "an origin circuit cannot forward a backward cell".into(),
                    )))
                }
            }
        }
    }
}

/// Proxy bytes between `client` and the circuit's one open stream until
/// either side closes.
async fn proxy(origin: Arc<OriginStream>, client: TcpStream) -> Result<()> {
    let (mut read_half, mut write_half) = client.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let reader_origin = origin.clone();
    let reader = tokio::spawn(async move {
        loop {
            match reader_origin.recv_local().await {
                Ok(msg) if msg.cmd() == RelayCmd::DATA => {
                    if tx.send(msg.data().to_vec()).is_err() {
                        break;
                    }
                }
                Ok(msg) if msg.cmd() == RelayCmd::SENDME => {
                    let mut window = reader_origin.send_window.lock().await;
                    let _ = window.note_sendme_received();
                }
                Ok(msg) if msg.cmd() == RelayCmd::END => break,
                Ok(_) => continue,
                Err(_) => break,
            }
        }
    });

    let writer = tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            if write_half.write_all(&chunk).await.is_err() {
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    let mut buf = [0_u8; RELAY_PAYLOAD_LEN];
    let outcome = loop {
        let n = match read_half.read(&mut buf).await {
            Ok(0) => break Ok(()),
            Ok(n) => n,
            Err(e) => break Err(Error::Socks(Arc::new(e))),
        };
        if !wait_for_send_window(&origin).await {
            break Ok(());
        }
        let msg = match RelayMsg::new(RelayCmd::DATA, origin.stream_id, buf[..n].to_vec()).map_err(|e| Error::Proto(e.into())) {
            Ok(msg) => msg,
            Err(e) => break Err(e),
        };
        if origin.send_forward(&msg).await.is_err() {
            break Ok(());
        }
    };

    let end_msg = RelayMsg::new(RelayCmd::END, origin.stream_id, orcore_proto::relaypayload::encode_end(EndReason::Done));
    if let Ok(end_msg) = end_msg {
        let _ = origin.send_forward(&end_msg).await;
    }

    reader.abort();
    let _ = writer.await;
    outcome
}

async fn wait_for_send_window(origin: &Arc<OriginStream>) -> bool {
    loop {
        let mut window = origin.send_window.lock().await;
        if window.send_blocked() {
            drop(window);
            tokio::time::sleep(Duration::from_millis(50)).await;
            continue;
        }
        window.note_sent().ok();
        return true;
    }
}
