//! Circuit- and stream-level flow-control windows (spec §4.F).
//!
//! Both granularities run the identical scheme at different starting
//! values and increments: a `package_window` bounding how much more data
//! this side may send before waiting for acknowledgement, and a
//! `deliver_window` counting how much has arrived without yet being
//! acknowledged. `SENDME` generation is triggered the instant
//! `deliver_window` crosses a multiple of the increment, not on a timer.

use crate::err::{Error, Result};

/// Starting value and per-`SENDME` increment for circuit-level windows.
pub const CIRCUIT_WINDOW_START: u32 = 1000;
/// Increment for circuit-level windows.
pub const CIRCUIT_WINDOW_INCREMENT: u32 = 100;
/// Starting value for stream-level windows.
pub const STREAM_WINDOW_START: u32 = 500;
/// Increment for stream-level windows.
pub const STREAM_WINDOW_INCREMENT: u32 = 50;

/// One direction's worth of flow-control bookkeeping for a circuit or a
/// stream: what we're still allowed to send, and what we've received but
/// not yet acknowledged.
#[derive(Clone, Copy, Debug)]
pub struct Window {
    start: u32,
    increment: u32,
    package_window: u32,
    deliver_window: u32,
}

impl Window {
    /// A fresh window at the circuit-level defaults (1000, increment 100).
    pub fn new_circuit() -> Self {
        Window::new(CIRCUIT_WINDOW_START, CIRCUIT_WINDOW_INCREMENT)
    }

    /// A fresh window at the stream-level defaults (500, increment 50).
    pub fn new_stream() -> Self {
        Window::new(STREAM_WINDOW_START, STREAM_WINDOW_INCREMENT)
    }

    fn new(start: u32, increment: u32) -> Self {
        Window { start, increment, package_window: start, deliver_window: start }
    }

    /// How much more data this side may currently send.
    pub fn package_window(&self) -> u32 {
        self.package_window
    }

    /// How much has arrived without yet being acknowledged.
    pub fn deliver_window(&self) -> u32 {
        self.deliver_window
    }

    /// True if `package_window` is exhausted: sending must stop and wait
    /// for a `SENDME` from the peer.
    pub fn send_blocked(&self) -> bool {
        self.package_window == 0
    }

    /// Account for sending one data cell. Errors if the window was
    /// already exhausted — callers must check [`Window::send_blocked`]
    /// first; this is the last-resort guard against a logic bug that
    /// would otherwise silently underflow.
    pub fn note_sent(&mut self) -> Result<()> {
        self.package_window = self
            .package_window
            .checked_sub(1)
            .ok_or(Error::WindowExhausted)?;
        Ok(())
    }

    /// Account for a `SENDME` from the peer, returning `package_window` to
    /// the peer's ack of our sends. Errors if this would overshoot
    /// `start` by more than one increment's worth of slack — a peer
    /// sending spurious `SENDME`s is a protocol violation.
    pub fn note_sendme_received(&mut self) -> Result<()> {
        let next = self.package_window + self.increment;
        if next > self.start {
            return Err(Error::ProtocolViolation(
                "received SENDME would overshoot the window's starting value".into(),
            ));
        }
        self.package_window = next;
        Ok(())
    }

    /// Account for receiving one data cell. Returns `true` if
    /// `deliver_window` just crossed a multiple of `increment`, meaning
    /// the caller must emit a `SENDME` now. Errors if delivery would drive
    /// the window negative — a protocol violation per spec §4.F.
    pub fn note_received(&mut self) -> Result<bool> {
        let next = self
            .deliver_window
            .checked_sub(1)
            .ok_or(Error::WindowExhausted)?;
        self.deliver_window = next;
        Ok(next % self.increment == 0)
    }

    /// Account for having sent a `SENDME`, restoring `deliver_window` by
    /// one increment.
    pub fn note_sendme_sent(&mut self) {
        self.deliver_window = (self.deliver_window + self.increment).min(self.start);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn circuit_window_emits_sendme_every_hundred_cells() {
        let mut w = Window::new_circuit();
        let mut sendmes = 0;
        for _ in 0..250 {
            if w.note_received().unwrap() {
                sendmes += 1;
                w.note_sendme_sent();
            }
        }
        assert_eq!(sendmes, 2);
        assert_eq!(w.deliver_window(), 900);
    }

    #[test]
    fn exhausting_package_window_blocks_further_sends() {
        let mut w = Window::new_stream();
        for _ in 0..STREAM_WINDOW_START {
            w.note_sent().unwrap();
        }
        assert!(w.send_blocked());
        assert!(w.note_sent().is_err());
    }

    #[test]
    fn sendme_replenishes_package_window() {
        let mut w = Window::new_stream();
        for _ in 0..50 {
            w.note_sent().unwrap();
        }
        assert_eq!(w.package_window(), 450);
        w.note_sendme_received().unwrap();
        assert_eq!(w.package_window(), 500);
    }

    #[test]
    fn over_replenishing_package_window_is_rejected() {
        let mut w = Window::new_stream();
        assert!(w.note_sendme_received().is_err());
    }

    #[test]
    fn over_delivering_is_a_protocol_violation() {
        let mut w = Window::new_stream();
        for _ in 0..STREAM_WINDOW_START {
            w.note_received().unwrap();
        }
        assert!(w.note_received().is_err());
    }
}
