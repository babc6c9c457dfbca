//! A scripted in-memory link.
//!
//! Stands in for the NIC in tests: transmitted frames are captured for
//! inspection, inbound frames are injected by the test and delivered into
//! the oldest posted receive buffer on the next poll. Receive completions
//! are delivered ahead of transmit completions, so a driver is naturally
//! exercised against the peer's reply arriving before its own transmit
//! completion.
use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::pool::{BufId, Pool};
use crate::time::Instant;

use super::{Batch, Error, Event, Result, Transport};

/// A software link with scripted peers and failures.
#[derive(Debug, Default)]
pub struct SimLink {
    /// Receive buffers in posting order.
    fill: VecDeque<BufId>,
    /// Frames queued for delivery.
    inbound: VecDeque<Vec<u8>>,
    rx_events: VecDeque<Event>,
    tx_events: VecDeque<Event>,
    sent: Vec<Vec<u8>>,
    refuse_transmits: usize,
    fail_transmits: usize,
    stamp: Option<Instant>,
}

impl SimLink {
    /// Create an idle link.
    pub fn new() -> Self {
        SimLink::default()
    }

    /// Queue a frame for delivery into the next posted receive buffer.
    pub fn inject(&mut self, frame: &[u8]) {
        self.inbound.push_back(frame.to_vec());
    }

    /// Refuse the next `count` transmit posts outright.
    pub fn refuse_transmits(&mut self, count: usize) {
        self.refuse_transmits = count;
    }

    /// Accept but fail the next `count` posted transmits with `TxError`.
    pub fn fail_transmits(&mut self, count: usize) {
        self.fail_transmits = count;
    }

    /// Deliver future receives as timestamped events with this stamp.
    pub fn stamp_receives(&mut self, at: Instant) {
        self.stamp = Some(at);
    }

    /// All successfully transmitted frames, oldest first.
    pub fn transmitted(&self) -> &[Vec<u8>] {
        &self.sent
    }

    /// The number of receive buffers currently posted.
    pub fn posted_receives(&self) -> usize {
        self.fill.len()
    }
}

impl Transport for SimLink {
    fn post_receive(&mut self, pool: &mut Pool, id: BufId) -> Result<()> {
        pool.post_rx(id)?;
        self.fill.push_back(id);
        Ok(())
    }

    fn transmit(&mut self, pool: &mut Pool, id: BufId, len: usize) -> Result<()> {
        if self.refuse_transmits > 0 {
            self.refuse_transmits -= 1;
            return Err(Error::Illegal);
        }
        if len > pool.frame(id).len() {
            return Err(Error::Illegal);
        }

        pool.post_tx(id)?;
        if self.fail_transmits > 0 {
            self.fail_transmits -= 1;
            self.tx_events.push_back(Event::TxError { id });
        } else {
            self.sent.push(pool.frame(id)[..len].to_vec());
            self.tx_events.push_back(Event::TxDone { id });
        }
        Ok(())
    }

    fn poll(&mut self, pool: &mut Pool) -> Result<Batch> {
        // Move queued frames into posted buffers first.
        while !self.inbound.is_empty() && !self.fill.is_empty() {
            let id = self.fill.pop_front().ok_or(Error::Desync)?;
            let frame = self.inbound.pop_front().ok_or(Error::Desync)?;
            let region = pool.frame_mut(id);
            if frame.len() > region.len() {
                return Err(Error::Illegal);
            }
            region[..frame.len()].copy_from_slice(&frame);
            let event = match self.stamp {
                Some(at) => Event::RxStamped { id, len: frame.len(), at },
                None => Event::RxDone { id, len: frame.len() },
            };
            self.rx_events.push_back(event);
        }

        let mut batch = Batch::new();
        while batch.has_space() {
            let event = match self.rx_events.pop_front() {
                Some(event) => event,
                None => match self.tx_events.pop_front() {
                    Some(event) => event,
                    None => break,
                },
            };
            match batch.push(event) {
                Ok(()) => (),
                // Does not happen, we checked for space.
                Err(event) => {
                    self.rx_events.push_front(event);
                    break;
                }
            }
        }
        Ok(batch)
    }
}
