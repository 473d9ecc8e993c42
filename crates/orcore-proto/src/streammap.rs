//! Stream-ID allocation and the per-hop stream table (spec §3's `Stream`,
//! §4.G).
//!
//! Mirrors the circuit-ID allocator's shape at a smaller scale: a
//! `next_stream_id` counter that wraps (skipping 0, which marks
//! circuit-level relay cells) and a retry loop on collision, plus a
//! half-closed state so a stream that has sent `END` but not yet received
//! one doesn't simply vanish — an adversary who can still route cells at
//! it could otherwise use the sudden silence as a timing signal (a
//! "DropMark" attack).

use crate::sendme::Window;
use rand::Rng;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// A stream's lifecycle state (spec §3).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StreamState {
    /// Waiting for a SOCKS client to finish its request.
    SocksWait,
    /// Waiting for a circuit to attach to.
    CircuitWait,
    /// `RELAY_BEGIN` sent, waiting for `RELAY_CONNECTED`/`RELAY_END`.
    ConnectWait,
    /// Open and carrying data.
    Open,
    /// Fully closed (both directions ended, or torn down with the
    /// circuit).
    Closed,
}

/// Whether terminating a stream should also emit `RELAY_END` on the wire.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ShouldSendEnd {
    /// Send `RELAY_END` before discarding the stream.
    Send,
    /// The peer already told us it's ending; don't send our own.
    DontSend,
}

/// The state a stream survives in after we've sent `RELAY_END` but before
/// its matching `RELAY_END` (or a final `RELAY_CONNECTED`/`RELAY_DATA` in
/// flight when we sent ours) arrives. Tracks just enough to validate what
/// arrives next without keeping the full stream alive.
pub struct HalfStream {
    send_window: Window,
    recv_window: Window,
    connected_ok: bool,
}

/// What processing an inbound cell against a [`HalfStream`] decided.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HalfStreamStatus {
    /// Keep waiting for more cells on this half-closed stream.
    Open,
    /// This half-closed stream is now fully done and can be forgotten.
    Closed,
}

impl HalfStream {
    /// Start tracking a stream that just had `RELAY_END` sent on it.
    pub fn new(send_window: Window, recv_window: Window, connected_ok: bool) -> Self {
        HalfStream { send_window, recv_window, connected_ok }
    }

    /// Process one more relay command arriving on a half-closed stream.
    pub fn handle_cmd(&mut self, cmd: orcore_cell::RelayCmd) -> crate::err::Result<HalfStreamStatus> {
        use orcore_cell::RelayCmd;
        match cmd {
            RelayCmd::SENDME => {
                self.send_window.note_sendme_received()?;
                Ok(HalfStreamStatus::Open)
            }
            RelayCmd::DATA => {
                self.recv_window.note_received()?;
                Ok(HalfStreamStatus::Open)
            }
            RelayCmd::CONNECTED if !self.connected_ok => {
                self.connected_ok = true;
                Ok(HalfStreamStatus::Open)
            }
            RelayCmd::END => Ok(HalfStreamStatus::Closed),
            _ => Err(crate::err::Error::ProtocolViolation(format!(
                "unexpected relay command {cmd:?} on a half-closed stream"
            ))),
        }
    }
}

/// The entry for one stream ID on a circuit's (or hop's) stream table.
pub enum StreamEnt {
    /// A live stream.
    Open {
        /// This stream's lifecycle state.
        state: StreamState,
        /// This stream's flow-control window.
        window: Window,
    },
    /// We've received `RELAY_END` but haven't yet torn the stream object
    /// down.
    EndReceived,
    /// We've sent `RELAY_END` but not yet received one back.
    EndSent(HalfStream),
}

/// A map from stream ID to stream entry, one per hop of a circuit that
/// terminates streams there (the exit hop, on the relay side; any hop,
/// on the origin side).
pub struct StreamMap {
    entries: HashMap<u16, StreamEnt>,
    next_stream_id: u16,
}

impl Default for StreamMap {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamMap {
    /// An empty stream table, with `next_stream_id` seeded randomly
    /// rather than starting at a predictable value.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        let next_stream_id: u16 = loop {
            let v: u16 = rng.gen();
            if v != 0 {
                break v;
            }
        };
        StreamMap { entries: HashMap::new(), next_stream_id }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no entries exist.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Allocate a fresh, non-zero stream ID and insert `ent` under it.
    /// Retries on collision; fails only if every one of the 65535
    /// possible IDs is already in use.
    pub fn add_ent(&mut self, ent: StreamEnt) -> Option<u16> {
        for _ in 0..u16::MAX as u32 {
            let candidate = self.next_stream_id;
            self.next_stream_id = self.next_stream_id.wrapping_add(1);
            if self.next_stream_id == 0 {
                self.next_stream_id = 1;
            }
            if let Entry::Vacant(v) = self.entries.entry(candidate) {
                v.insert(ent);
                return Some(candidate);
            }
        }
        None
    }

    /// Insert `ent` under a caller-chosen `id`, replacing whatever was
    /// there. Unlike [`StreamMap::add_ent`], this doesn't allocate — it's
    /// for the side that doesn't get to pick the stream ID, namely an
    /// exit hop recording a stream under the ID a `RELAY_BEGIN` already
    /// named.
    pub fn insert_at(&mut self, id: u16, ent: StreamEnt) -> Option<StreamEnt> {
        self.entries.insert(id, ent)
    }

    /// Look up a stream's entry.
    pub fn get(&self, id: u16) -> Option<&StreamEnt> {
        self.entries.get(&id)
    }

    /// Look up a stream's entry, mutably.
    pub fn get_mut(&mut self, id: u16) -> Option<&mut StreamEnt> {
        self.entries.get_mut(&id)
    }

    /// Record that `RELAY_END` arrived for `id`. Returns the entry that
    /// was replaced, if any.
    pub fn ending_msg_received(&mut self, id: u16) -> Option<StreamEnt> {
        self.entries.insert(id, StreamEnt::EndReceived)
    }

    /// Terminate our side of stream `id`: if it was `Open`, downgrade it
    /// to `EndSent` (tracking a [`HalfStream`]) rather than dropping it
    /// outright, and report whether the caller must still emit
    /// `RELAY_END`.
    pub fn terminate(&mut self, id: u16, connected_ok: bool) -> ShouldSendEnd {
        match self.entries.remove(&id) {
            Some(StreamEnt::Open { window, .. }) => {
                self.entries.insert(
                    id,
                    StreamEnt::EndSent(HalfStream::new(window, Window::new_stream(), connected_ok)),
                );
                ShouldSendEnd::Send
            }
            Some(StreamEnt::EndReceived) => ShouldSendEnd::Send,
            Some(entry @ StreamEnt::EndSent(_)) => {
                self.entries.insert(id, entry);
                ShouldSendEnd::DontSend
            }
            None => ShouldSendEnd::DontSend,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stream_ids_never_reuse_zero() {
        let mut map = StreamMap::new();
        map.next_stream_id = u16::MAX;
        let id = map.add_ent(StreamEnt::EndReceived).unwrap();
        assert_eq!(id, u16::MAX);
        let next = map.add_ent(StreamEnt::EndReceived).unwrap();
        assert_ne!(next, 0);
    }

    #[test]
    fn terminate_on_open_stream_starts_a_half_close() {
        let mut map = StreamMap::new();
        let id = map
            .add_ent(StreamEnt::Open { state: StreamState::Open, window: Window::new_stream() })
            .unwrap();
        assert_eq!(map.terminate(id, true), ShouldSendEnd::Send);
        assert!(matches!(map.get(id), Some(StreamEnt::EndSent(_))));
    }

    #[test]
    fn half_stream_accepts_trailing_data_then_closes_on_end() {
        let mut half = HalfStream::new(Window::new_stream(), Window::new_stream(), true);
        assert_eq!(half.handle_cmd(orcore_cell::RelayCmd::DATA).unwrap(), HalfStreamStatus::Open);
        assert_eq!(half.handle_cmd(orcore_cell::RelayCmd::END).unwrap(), HalfStreamStatus::Closed);
    }

    #[test]
    fn half_stream_rejects_a_second_connected() {
        let mut half = HalfStream::new(Window::new_stream(), Window::new_stream(), true);
        assert!(half.handle_cmd(orcore_cell::RelayCmd::CONNECTED).is_err());
    }
}
