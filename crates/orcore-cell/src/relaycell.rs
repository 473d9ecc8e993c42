//! The relay-cell sub-frame carried inside `RELAY`/`RELAY_EARLY` cells.

use crate::chancell::CELL_DATA_LEN;
use crate::err::{Error, Result};
use caret::caret_int;
use orcore_bytes::{Reader, Writer};

/// Maximum length of the `data` field inside a relay cell.
pub const RELAY_PAYLOAD_LEN: usize = CELL_DATA_LEN - HEADER_LEN;

/// Length of the relay-cell sub-header (everything but `data`).
pub const HEADER_LEN: usize = 1 + 2 + 2 + 4 + 2;

caret_int! {
    /// The relay command of a relay cell — what a hop that recognizes the
    /// cell should do with it.
    pub struct RelayCmd(u8) {
        /// Open a stream to a destination.
        BEGIN = 1,
        /// Carry stream application data.
        DATA = 2,
        /// Close a stream (or report why it couldn't open).
        END = 3,
        /// Acknowledge a successful `BEGIN`.
        CONNECTED = 4,
        /// Flow-control acknowledgement, circuit- or stream-level.
        SENDME = 5,
        /// Ask the hop to extend the circuit by one more relay.
        EXTEND = 6,
        /// Reply to `EXTEND`.
        EXTENDED = 7,
        /// Ask a hop to tear down everything past it.
        TRUNCATE = 8,
        /// Reply to `TRUNCATE`.
        TRUNCATED = 9,
        /// No-op cell, used to pad traffic.
        DROP = 10,
        /// Ask the exit hop to resolve a hostname.
        RESOLVE = 11,
        /// Reply to `RESOLVE`.
        RESOLVED = 12,
        /// Like `BEGIN`, but targeting this relay's own directory port.
        BEGIN_DIR = 13,
    }
}

impl RelayCmd {
    /// True if this command is meaningful on a stream (carries or expects
    /// a nonzero `stream_id`); false for circuit-level commands
    /// (`SENDME` at the circuit level, and `EXTEND`/`EXTENDED`/`TRUNCATE`/
    /// `TRUNCATED`, which act on the circuit itself).
    pub fn is_stream_command(self) -> bool {
        !matches!(
            self,
            RelayCmd::EXTEND | RelayCmd::EXTENDED | RelayCmd::TRUNCATE | RelayCmd::TRUNCATED
        )
    }
}

/// A parsed relay-cell sub-frame (spec §6's "Wire — relay payload").
#[derive(Clone, Debug)]
pub struct RelayMsg {
    relay_cmd: RelayCmd,
    stream_id: u16,
    data: Vec<u8>,
}

impl RelayMsg {
    /// Build a new relay message. `stream_id` of `0` means circuit-level.
    pub fn new(relay_cmd: RelayCmd, stream_id: u16, data: Vec<u8>) -> Result<Self> {
        if data.len() > RELAY_PAYLOAD_LEN {
            return Err(Error::OversizedRelayLength(data.len() as u16));
        }
        Ok(RelayMsg { relay_cmd, stream_id, data })
    }

    /// This message's relay command.
    pub fn cmd(&self) -> RelayCmd {
        self.relay_cmd
    }

    /// This message's stream ID (`0` = circuit-level).
    pub fn stream_id(&self) -> u16 {
        self.stream_id
    }

    /// This message's data payload.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Encode this message's header and data into a full 509-byte relay
    /// payload, with `recognized` and `digest` left as placeholders
    /// (zeroed) for the caller (the relay-cell crypto engine) to fill in
    /// once it knows the rolling digest value.
    pub fn encode_with_placeholder_digest(&self) -> Result<[u8; CELL_DATA_LEN]> {
        let mut out = [0_u8; CELL_DATA_LEN];
        let mut v = Vec::with_capacity(HEADER_LEN);
        v.write_u8(self.relay_cmd.into());
        v.write_u16(0); // recognized
        v.write_u16(self.stream_id);
        v.write_u32(0); // digest placeholder
        let len: u16 = self
            .data
            .len()
            .try_into()
            .map_err(|_| orcore_bytes::EncodeError::Oversized)?;
        v.write_u16(len);
        v.write_all(&self.data);
        out[..v.len()].copy_from_slice(&v);
        Ok(out)
    }

    /// Parse a relay message out of a decrypted 509-byte relay payload.
    ///
    /// Does not itself verify `recognized`/`digest` — that's the relay-cell
    /// crypto engine's job, once per candidate layer; this just interprets
    /// the bytes assuming the caller has already decided the layer is the
    /// right one.
    pub fn decode(payload: &[u8; CELL_DATA_LEN]) -> Result<Self> {
        let mut r = Reader::from_slice(&payload[..]);
        let relay_cmd = RelayCmd::from(r.take_u8()?);
        let _recognized = r.take_u16()?;
        let stream_id = r.take_u16()?;
        let _digest = r.take_u32()?;
        let len = r.take_u16()?;
        if len as usize > RELAY_PAYLOAD_LEN {
            return Err(Error::OversizedRelayLength(len));
        }
        let data = r.take_vec(len as usize)?;
        Ok(RelayMsg { relay_cmd, stream_id, data })
    }

    /// Read the `recognized` field (bytes 1..3) out of a raw relay
    /// payload, without fully parsing it.
    pub fn peek_recognized(payload: &[u8; CELL_DATA_LEN]) -> u16 {
        u16::from_be_bytes([payload[1], payload[2]])
    }

    /// Read the `digest` field (bytes 5..9), without fully parsing.
    pub fn peek_digest(payload: &[u8; CELL_DATA_LEN]) -> u32 {
        u32::from_be_bytes([payload[5], payload[6], payload[7], payload[8]])
    }

    /// Return a copy of `payload` with the `digest` field zeroed, which is
    /// the form the rolling digest is computed over.
    pub fn zero_digest_field(payload: &[u8; CELL_DATA_LEN]) -> [u8; CELL_DATA_LEN] {
        let mut out = *payload;
        out[5..9].fill(0);
        out
    }

    /// Return a copy of `payload` with the `recognized` and `digest`
    /// fields set.
    pub fn with_recognized_and_digest(
        payload: &[u8; CELL_DATA_LEN],
        digest: u32,
    ) -> [u8; CELL_DATA_LEN] {
        let mut out = *payload;
        out[1] = 0;
        out[2] = 0;
        out[5..9].copy_from_slice(&digest.to_be_bytes());
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_through_encode_decode() {
        let msg = RelayMsg::new(RelayCmd::DATA, 0xABCD, vec![9; 50]).unwrap();
        let mut payload = msg.encode_with_placeholder_digest().unwrap();
        payload = RelayMsg::with_recognized_and_digest(&payload, 0);
        let decoded = RelayMsg::decode(&payload).unwrap();
        assert_eq!(decoded.cmd(), RelayCmd::DATA);
        assert_eq!(decoded.stream_id(), 0xABCD);
        assert_eq!(decoded.data(), &[9; 50][..]);
    }

    #[test]
    fn zero_length_relay_cell_is_legal() {
        let msg = RelayMsg::new(RelayCmd::DROP, 0, vec![]).unwrap();
        let payload = msg.encode_with_placeholder_digest().unwrap();
        let decoded = RelayMsg::decode(&payload).unwrap();
        assert!(decoded.data().is_empty());
    }

    #[test]
    fn oversized_length_is_rejected() {
        assert!(RelayMsg::new(RelayCmd::DATA, 0, vec![0; RELAY_PAYLOAD_LEN + 1]).is_err());
    }

    #[test]
    fn decode_rejects_oversized_length_field() {
        let mut payload = [0_u8; CELL_DATA_LEN];
        payload[9..11].copy_from_slice(&499_u16.to_be_bytes());
        assert!(RelayMsg::decode(&payload).is_err());
    }
}
