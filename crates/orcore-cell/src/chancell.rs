//! The OR-link cell: a fixed 512-byte frame, with one variable-length
//! exception for `VERSIONS`.

use crate::err::{Error, Result};
use caret::caret_int;
use orcore_bytes::{Reader, Writer};
use std::num::NonZeroU16;

/// Size of the data area in a fixed-length cell.
///
/// This relay engine targets the historical (pre-v4) link protocol, where
/// circuit IDs are 2 bytes long and cells are 512 bytes total.
pub const CELL_DATA_LEN: usize = 509;

/// Total size of a fixed-length cell on the wire.
pub const CELL_LEN: usize = 2 + 1 + CELL_DATA_LEN;

/// A cell body considered as a raw array of bytes.
pub type RawCellBody = [u8; CELL_DATA_LEN];

/// Link-local identifier for a circuit.
///
/// Two bytes, never zero — a zero circuit ID addresses the link itself,
/// so it's represented as `Option<CircId>` rather than a variant of this
/// type.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct CircId(NonZeroU16);

impl CircId {
    /// Construct a `CircId` from a nonzero value.
    pub fn new(val: u16) -> Option<Self> {
        NonZeroU16::new(val).map(Self)
    }

    /// Convert an `Option<CircId>` to its wire representation (`0` for
    /// `None`).
    pub fn get_or_zero(id: Option<Self>) -> u16 {
        match id {
            Some(id) => id.0.get(),
            None => 0,
        }
    }
}

impl From<NonZeroU16> for CircId {
    fn from(v: NonZeroU16) -> Self {
        CircId(v)
    }
}

impl From<CircId> for u16 {
    fn from(id: CircId) -> u16 {
        id.0.get()
    }
}

impl std::fmt::Display for CircId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

caret_int! {
    /// The command byte of a channel cell, determining its meaning and
    /// (for all but `VERSIONS`) confirming its fixed length.
    pub struct ChanCmd(u8) {
        /// Dropped on receipt; used for keepalives.
        PADDING = 0,
        /// Begin a circuit-creation handshake (legacy TAP format).
        CREATE = 1,
        /// Finish a circuit-creation handshake (legacy TAP format).
        CREATED = 2,
        /// Relay cell, carried over a circuit.
        RELAY = 3,
        /// Tear down a circuit.
        DESTROY = 4,
        /// Begin a circuit-creation handshake (no public key; unused by
        /// this relay engine's own circuits, recognized for compatibility).
        CREATE_FAST = 5,
        /// Finish a circuit-creation handshake started with `CREATE_FAST`.
        CREATED_FAST = 6,
        /// Variable-length: negotiate the link protocol version.
        VERSIONS = 7,
        /// Exchange address and timestamp information after the link
        /// handshake completes.
        NETINFO = 8,
        /// Relay cell restricted to the first few hops of circuit
        /// extension, to resist a denial-of-service pattern against
        /// half-open circuits.
        RELAY_EARLY = 9,
    }
}

impl ChanCmd {
    /// True if this command uses the variable-length cell framing.
    pub fn is_var_cell(self) -> bool {
        self == ChanCmd::VERSIONS
    }

    /// True if this command requires (or forbids) a nonzero circuit ID.
    pub fn accepts_circid(self, id: Option<CircId>) -> bool {
        match self {
            ChanCmd::PADDING | ChanCmd::VERSIONS | ChanCmd::NETINFO => id.is_none(),
            ChanCmd::CREATE
            | ChanCmd::CREATED
            | ChanCmd::RELAY
            | ChanCmd::DESTROY
            | ChanCmd::CREATE_FAST
            | ChanCmd::CREATED_FAST
            | ChanCmd::RELAY_EARLY => id.is_some(),
            _ => true,
        }
    }
}

/// The body of a channel cell: a fixed 509-byte array for ordinary cells,
/// or an arbitrary-length payload for `VERSIONS`.
#[derive(Clone, Debug)]
pub enum ChanCellBody {
    /// Body of a fixed-length cell, always exactly [`CELL_DATA_LEN`] bytes
    /// (including any padding).
    Fixed(Box<RawCellBody>),
    /// Body of a variable-length cell.
    Var(Vec<u8>),
}

impl ChanCellBody {
    /// View the body as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ChanCellBody::Fixed(b) => &b[..],
            ChanCellBody::Var(v) => &v[..],
        }
    }
}

/// A decoded channel cell: a circuit ID, a command, and a body.
#[derive(Clone, Debug)]
pub struct ChanCell {
    circid: Option<CircId>,
    cmd: ChanCmd,
    body: ChanCellBody,
}

impl ChanCell {
    /// Construct a fixed-length cell, padding or truncating-rejecting the
    /// body to exactly [`CELL_DATA_LEN`] bytes.
    pub fn new_fixed(circid: Option<CircId>, cmd: ChanCmd, mut body: Vec<u8>) -> Result<Self> {
        if cmd.is_var_cell() {
            return Err(Error::MalformedCell(
                "fixed-length constructor used for a variable-length command",
            ));
        }
        if body.len() > CELL_DATA_LEN {
            return Err(Error::MalformedCell("cell body longer than 509 bytes"));
        }
        body.resize(CELL_DATA_LEN, 0);
        let mut arr = Box::new([0_u8; CELL_DATA_LEN]);
        arr.copy_from_slice(&body);
        Ok(ChanCell {
            circid,
            cmd,
            body: ChanCellBody::Fixed(arr),
        })
    }

    /// Construct a variable-length cell (only legal for `VERSIONS`-class
    /// commands).
    pub fn new_var(circid: Option<CircId>, cmd: ChanCmd, body: Vec<u8>) -> Result<Self> {
        if !cmd.is_var_cell() {
            return Err(Error::MalformedCell(
                "variable-length constructor used for a fixed-length command",
            ));
        }
        Ok(ChanCell { circid, cmd, body: ChanCellBody::Var(body) })
    }

    /// This cell's circuit ID, if any.
    pub fn circid(&self) -> Option<CircId> {
        self.circid
    }

    /// This cell's command.
    pub fn cmd(&self) -> ChanCmd {
        self.cmd
    }

    /// This cell's body.
    pub fn body(&self) -> &ChanCellBody {
        &self.body
    }

    /// Consume the cell, returning its parts.
    pub fn into_parts(self) -> (Option<CircId>, ChanCmd, ChanCellBody) {
        (self.circid, self.cmd, self.body)
    }

    /// Encode this cell's wire bytes (not including any framing the codec
    /// adds beyond what's described in spec §6) onto `w`.
    pub fn encode_onto<W: Writer>(&self, w: &mut W) -> Result<()> {
        w.write_u16(CircId::get_or_zero(self.circid));
        w.write_u8(self.cmd.into());
        match &self.body {
            ChanCellBody::Fixed(b) => w.write_all(&b[..]),
            ChanCellBody::Var(v) => {
                let len: u16 = v
                    .len()
                    .try_into()
                    .map_err(|_| orcore_bytes::EncodeError::Oversized)?;
                w.write_u16(len);
                w.write_all(v);
            }
        }
        Ok(())
    }

    /// Parse a fixed-length cell body out of `r`, given its command.
    pub fn decode_fixed(circid: Option<CircId>, cmd: ChanCmd, r: &mut Reader<'_>) -> Result<Self> {
        let body = r.take_array::<CELL_DATA_LEN>()?;
        Ok(ChanCell {
            circid,
            cmd,
            body: ChanCellBody::Fixed(Box::new(body)),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fixed_cells_pad_short_bodies() {
        let c = ChanCell::new_fixed(CircId::new(1), ChanCmd::DESTROY, vec![1, 2, 3]).unwrap();
        assert_eq!(c.body().as_bytes().len(), CELL_DATA_LEN);
        assert_eq!(&c.body().as_bytes()[..3], &[1, 2, 3]);
        assert!(c.body().as_bytes()[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn versions_cell_must_be_var() {
        assert!(ChanCell::new_fixed(None, ChanCmd::VERSIONS, vec![]).is_err());
        assert!(ChanCell::new_var(None, ChanCmd::VERSIONS, vec![0, 3]).is_ok());
    }

    #[test]
    fn circid_requirement_matches_command() {
        assert!(ChanCmd::PADDING.accepts_circid(None));
        assert!(!ChanCmd::PADDING.accepts_circid(CircId::new(1)));
        assert!(ChanCmd::CREATE.accepts_circid(CircId::new(1)));
        assert!(!ChanCmd::CREATE.accepts_circid(None));
    }
}
