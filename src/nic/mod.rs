//! The seam towards a network device.
//!
//! The core never talks to hardware directly. It posts buffers for receive,
//! posts built frames for transmit, and later learns what became of them
//! from typed completion events, the model DMA-capable interfaces expose.
//! Everything device-specific (opening a handle, registering memory, the
//! actual event queue) lives behind the [`Transport`] trait.
//!
//! Transmission is fire-and-forget: `transmit` enqueues work and returns,
//! the matching [`Event::TxDone`] or [`Event::TxError`] shows up in a later
//! poll. `poll` itself never blocks; waiting until at least one event is
//! available, and bounding that wait, is the caller's loop.
//!
//! Within one returned [`Batch`] the event order is stable but otherwise
//! unspecified. In particular a caller must not assume its own transmit
//! completion precedes the peer's reply.
//!
//! [`Transport`]: trait.Transport.html
//! [`Batch`]: struct.Batch.html
//! [`Event::TxDone`]: enum.Event.html
//! [`Event::TxError`]: enum.Event.html
pub mod sim;

#[cfg(all(feature = "std", target_os = "linux"))]
pub mod sys;

use core::fmt;

use crate::pool::{BufId, Pool};
use crate::time::Instant;

/// A completion event reported by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A posted transmit left the wire.
    TxDone {
        /// The buffer the frame was transmitted from.
        id: BufId,
    },
    /// A posted transmit failed in the device.
    TxError {
        /// The buffer whose frame was not transmitted.
        id: BufId,
    },
    /// A posted receive buffer was filled with a frame.
    RxDone {
        /// The buffer the frame landed in.
        id: BufId,
        /// The frame length in bytes.
        len: usize,
    },
    /// A filled receive buffer with a hardware timestamp.
    RxStamped {
        /// The buffer the frame landed in.
        id: BufId,
        /// The frame length in bytes.
        len: usize,
        /// When the device saw the frame.
        at: Instant,
    },
}

impl Event {
    /// The buffer this event refers to.
    pub fn buf_id(&self) -> BufId {
        match *self {
            Event::TxDone { id }
            | Event::TxError { id }
            | Event::RxDone { id, .. }
            | Event::RxStamped { id, .. } => id,
        }
    }
}

/// One poll's worth of completion events, in delivery order.
#[derive(Debug, Clone, Copy, Default)]
pub struct Batch {
    events: [Option<Event>; Batch::CAPACITY],
    len: usize,
}

impl Batch {
    /// The most events a single poll returns.
    pub const CAPACITY: usize = 16;

    /// An empty batch.
    pub fn new() -> Self {
        Batch::default()
    }

    /// The number of events in the batch.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the batch carries no events.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether another event still fits.
    pub fn has_space(&self) -> bool {
        self.len < Self::CAPACITY
    }

    /// Append an event.
    ///
    /// Returns the event back when the batch is full.
    pub fn push(&mut self, event: Event) -> core::result::Result<(), Event> {
        if self.has_space() {
            self.events[self.len] = Some(event);
            self.len += 1;
            Ok(())
        } else {
            Err(event)
        }
    }

    /// Iterate the events in delivery order.
    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.events[..self.len].iter().filter_map(|event| *event)
    }
}

/// The error type for transport operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The operation was refused by the device.
    ///
    /// A post that the device queue has no room for, an I/O error from the
    /// underlying descriptor, or an operation the device cannot perform.
    Illegal,
    /// The buffer was not in the ownership state the operation requires.
    Desync,
}

/// The result type for transport operations.
pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Illegal => write!(f, "operation refused by the device"),
            Error::Desync => write!(f, "buffer ownership violated"),
        }
    }
}

impl From<crate::pool::Error> for Error {
    fn from(err: crate::pool::Error) -> Self {
        match err {
            crate::pool::Error::Exhausted => Error::Illegal,
            crate::pool::Error::Desync => Error::Desync,
        }
    }
}

/// A device that moves frames between packet buffers and the network.
///
/// The pool is threaded through every call instead of being captured at
/// construction so that exactly one of the core and the transport can reach
/// a buffer's memory at any time; implementations take ownership of posted
/// slots through the pool's transition methods and must report each posted
/// buffer in exactly one completion event.
pub trait Transport {
    /// Post an empty buffer the next inbound frame may be written into.
    fn post_receive(&mut self, pool: &mut Pool, id: BufId) -> Result<()>;

    /// Post the first `len` bytes of a built frame for transmission.
    fn transmit(&mut self, pool: &mut Pool, id: BufId, len: usize) -> Result<()>;

    /// Collect pending completion events, without blocking.
    fn poll(&mut self, pool: &mut Pool) -> Result<Batch>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_keeps_order_and_caps() {
        let mut batch = Batch::new();
        for i in 0..Batch::CAPACITY {
            batch.push(Event::TxDone { id: BufId(i as u32) }).unwrap();
        }
        let overflow = Event::TxDone { id: BufId(99) };
        assert_eq!(batch.push(overflow), Err(overflow));
        let ids: alloc::vec::Vec<_> = batch.iter().map(|ev| ev.buf_id().0).collect();
        assert_eq!(ids, (0..Batch::CAPACITY as u32).collect::<alloc::vec::Vec<_>>());
    }
}
