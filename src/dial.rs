//! The handshake state machine.
//!
//! Drives one connection attempt over a [`Transport`]: SYN out, SYN/ACK in,
//! ACK out, one data segment out. There is exactly one logical flow of
//! control; the only suspension point is the poll loop, bounded by an
//! [`Expiration`] deadline. Nothing is retried. Any transmit failure,
//! unexpected segment or bookkeeping violation ends the attempt, and the
//! caller restarts from scratch if it wants another try.
//!
//! Flag validation is permissive on purpose: a received segment passes when
//! every *required* flag bit is present, extra bits are not rejected. Each
//! required bit is tested against the received flags independently.
//!
//! [`Transport`]: ../nic/trait.Transport.html
//! [`Expiration`]: ../time/enum.Expiration.html
use core::fmt;

use crate::frame::{Segment, Session};
use crate::nic::{Event, Transport};
use crate::pool::{self, BufId, Pool};
use crate::time::{Expiration, Instant};
use crate::wire::{ethernet_frame, ipv4_packet, tcp_segment, TcpFlags, TcpSeqNumber};

/// How many receive buffers are posted before the attempt starts.
const RX_PRIME_BATCH: usize = 64;

/// Buffers kept back from receive priming for the attempt's transmissions.
///
/// At most the SYN, the ACK and the data segment are in flight at once.
const TX_RESERVE: usize = 3;

/// The phase a connection attempt is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing sent yet.
    Idle,
    /// SYN transmitted, waiting for the peer's SYN/ACK.
    SynSent,
    /// SYN/ACK seen, our ACK not yet transmitted.
    AckWait,
    /// Handshake complete, data segment transmitted.
    Established,
    /// The attempt ended without establishing the connection.
    Failed,
}

/// The negotiated values of one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    /// The next sequence number we would send.
    pub local_seq: TcpSeqNumber,
    /// The next sequence number we expect from the peer.
    pub peer_seq: TcpSeqNumber,
    /// Where the attempt stands.
    pub phase: Phase,
}

/// The error type for a connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The buffer pool ran out of free buffers.
    Exhausted,
    /// A frame did not fit its destination buffer.
    ///
    /// Detected before anything is written.
    BadSize,
    /// A received segment lacked a required flag.
    UnexpectedFlags,
    /// The transport refused a post or reported a transmit error event.
    Transmit,
    /// An event was inconsistent with the pool's bookkeeping.
    ///
    /// A completion for a buffer that was never posted, or a receive length
    /// larger than the buffer. This is an invariant violation, not a
    /// network condition.
    Desync,
    /// The deadline passed while waiting for events.
    Timeout,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Exhausted => write!(f, "packet buffer pool exhausted"),
            Error::BadSize => write!(f, "frame does not fit its buffer"),
            Error::UnexpectedFlags => write!(f, "received segment lacks a required flag"),
            Error::Transmit => write!(f, "transmit failed"),
            Error::Desync => write!(f, "transport and pool bookkeeping diverged"),
            Error::Timeout => write!(f, "deadline passed while waiting for the peer"),
        }
    }
}

/// The result type for a connection attempt.
pub type Result<T> = core::result::Result<T, Error>;

impl From<pool::Error> for Error {
    fn from(err: pool::Error) -> Self {
        match err {
            pool::Error::Exhausted => Error::Exhausted,
            pool::Error::Desync => Error::Desync,
        }
    }
}

impl From<crate::nic::Error> for Error {
    fn from(err: crate::nic::Error) -> Self {
        match err {
            crate::nic::Error::Illegal => Error::Transmit,
            crate::nic::Error::Desync => Error::Desync,
        }
    }
}

/// Run one connection attempt to completion.
///
/// Transmits a SYN carrying `isn`, waits for a segment with SYN and ACK
/// set, acknowledges it and pushes `payload` in a single data segment. The
/// returned [`Connection`] is in [`Phase::Established`]; every error is
/// terminal for the attempt and leaves the pool reclaimed as far as the
/// transport reported completions.
///
/// `clock` feeds the `deadline` check between polls; pass
/// [`Expiration::Never`] to wait indefinitely.
///
/// [`Connection`]: struct.Connection.html
/// [`Phase::Established`]: enum.Phase.html
/// [`Expiration::Never`]: ../time/enum.Expiration.html
pub fn run<T, C>(
    session: &Session,
    pool: &mut Pool,
    link: &mut T,
    isn: TcpSeqNumber,
    payload: &[u8],
    deadline: Expiration,
    clock: C,
) -> Result<Connection>
where
    T: Transport,
    C: FnMut() -> Instant,
{
    let mut dial = Dial {
        session,
        pool,
        link,
        conn: Connection {
            local_seq: isn,
            peer_seq: TcpSeqNumber::default(),
            phase: Phase::Idle,
        },
        deadline,
        clock,
        outstanding_tx: 0,
    };

    match dial.attempt(isn, payload) {
        Ok(()) => Ok(dial.conn),
        Err(err) => {
            dial.conn.phase = Phase::Failed;
            Err(err)
        }
    }
}

struct Dial<'a, T, C> {
    session: &'a Session,
    pool: &'a mut Pool,
    link: &'a mut T,
    conn: Connection,
    deadline: Expiration,
    clock: C,
    outstanding_tx: usize,
}

impl<T: Transport, C: FnMut() -> Instant> Dial<'_, T, C> {
    fn attempt(&mut self, isn: TcpSeqNumber, payload: &[u8]) -> Result<()> {
        self.prime_receives()?;

        self.send(Segment {
            seq: isn,
            ack: TcpSeqNumber::default(),
            flags: TcpFlags::SYN,
            payload: &[],
        })?;
        self.conn.phase = Phase::SynSent;
        // The SYN consumes one sequence number.
        self.conn.local_seq = isn + 1;

        let peer_isn = self.await_syn_ack()?;
        self.conn.phase = Phase::AckWait;
        self.conn.peer_seq = peer_isn + 1;
        net_trace!("dial: peer isn {}", peer_isn);

        self.send(Segment {
            seq: self.conn.local_seq,
            ack: self.conn.peer_seq,
            flags: TcpFlags::ACK,
            payload: &[],
        })?;

        // The empty ACK occupies no sequence space; the data segment goes
        // out under the same numbers.
        self.send(Segment {
            seq: self.conn.local_seq,
            ack: self.conn.peer_seq,
            flags: TcpFlags::ACK,
            payload,
        })?;
        self.conn.phase = Phase::Established;
        self.conn.local_seq = self.conn.local_seq + payload.len();

        self.drain_transmits()
    }

    /// Fill the receive side before anything is sent, keeping enough
    /// buffers back for the attempt's own transmissions.
    fn prime_receives(&mut self) -> Result<()> {
        let target = self.pool.available()
            .saturating_sub(TX_RESERVE)
            .min(RX_PRIME_BATCH);

        for posted in 0..target.max(1) {
            let id = match self.pool.acquire() {
                Ok(id) => id,
                Err(pool::Error::Exhausted) if posted > 0 => break,
                Err(err) => return Err(err.into()),
            };
            if let Err(err) = self.link.post_receive(self.pool, id) {
                let _ = self.pool.release(id);
                return Err(err.into());
            }
        }
        Ok(())
    }

    fn send(&mut self, segment: Segment) -> Result<()> {
        let id = self.pool.acquire()?;

        let len = match self.session.emit(segment, self.pool.frame_mut(id)) {
            Ok(len) => len,
            Err(_) => {
                let _ = self.pool.release(id);
                return Err(Error::BadSize);
            }
        };

        net_trace!("dial: tx {} seq {} ack {} len {}",
                   id, segment.seq, segment.ack, len);
        match self.link.transmit(self.pool, id, len) {
            Ok(()) => {
                self.outstanding_tx += 1;
                Ok(())
            }
            Err(_) => {
                // A refused post leaves the buffer with the core.
                let _ = self.pool.release(id);
                Err(Error::Transmit)
            }
        }
    }

    /// Poll until a segment with SYN and ACK arrives, returning the peer's
    /// sequence number.
    fn await_syn_ack(&mut self) -> Result<TcpSeqNumber> {
        loop {
            let batch = self.link.poll(self.pool).map_err(Error::from)?;
            if let Some(peer_isn) = self.process_batch(batch.iter(), true)? {
                return Ok(peer_isn);
            }
            self.check_deadline()?;
        }
    }

    /// Poll until every posted transmit has completed, so the pool is
    /// reclaimed before the attempt reports success.
    fn drain_transmits(&mut self) -> Result<()> {
        while self.outstanding_tx > 0 {
            let batch = self.link.poll(self.pool).map_err(Error::from)?;
            self.process_batch(batch.iter(), false)?;
            self.check_deadline()?;
        }
        Ok(())
    }

    /// Handle every event of a batch in order, even past a failure; the
    /// first failure wins, the first matching segment is reported.
    fn process_batch(
        &mut self,
        events: impl Iterator<Item = Event>,
        expect_syn_ack: bool,
    ) -> Result<Option<TcpSeqNumber>> {
        let mut found = None;
        let mut failure = None;

        for event in events {
            match self.handle_event(event, expect_syn_ack) {
                Ok(Some(peer_isn)) => {
                    if found.is_none() {
                        found = Some(peer_isn);
                    }
                }
                Ok(None) => (),
                Err(err) => {
                    if failure.is_none() {
                        failure = Some(err);
                    }
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(found),
        }
    }

    fn handle_event(
        &mut self,
        event: Event,
        expect_syn_ack: bool,
    ) -> Result<Option<TcpSeqNumber>> {
        match event {
            Event::TxDone { id } => {
                self.pool.complete_tx(id)?;
                self.pool.release(id)?;
                self.outstanding_tx = self.outstanding_tx.saturating_sub(1);
                Ok(None)
            }
            Event::TxError { id } => {
                self.pool.complete_tx(id)?;
                let _ = self.pool.release(id);
                self.outstanding_tx = self.outstanding_tx.saturating_sub(1);
                Err(Error::Transmit)
            }
            Event::RxDone { id, len } | Event::RxStamped { id, len, .. } => {
                self.pool.complete_rx(id)?;
                self.handle_receive(id, len, expect_syn_ack)
            }
        }
    }

    fn handle_receive(
        &mut self,
        id: BufId,
        len: usize,
        expect_syn_ack: bool,
    ) -> Result<Option<TcpSeqNumber>> {
        if len > self.pool.frame(id).len() {
            let _ = self.pool.release(id);
            return Err(Error::Desync);
        }

        if !expect_syn_ack || !self.session.accepts(&self.pool.frame(id)[..len]) {
            // Not this session's traffic; keep the ring primed with it.
            net_trace!("dial: rx {} ignored, {} bytes", id, len);
            return self.repost(id);
        }

        // `accepts` has validated the layering and lengths.
        let frame = &self.pool.frame(id)[..len];
        let ip = ipv4_packet::new_unchecked(ethernet_frame::new_unchecked(frame).payload_slice());
        let tcp = tcp_segment::new_unchecked(ip.payload_slice());
        let flags = tcp.flags();

        if !flags.syn() || !flags.ack() {
            net_trace!("dial: rx {} flags {:?} lack SYN/ACK", id, flags);
            let _ = self.pool.release(id);
            return Err(Error::UnexpectedFlags);
        }

        let peer_isn = tcp.seq_number();
        self.pool.release(id)?;
        Ok(Some(peer_isn))
    }

    fn repost(&mut self, id: BufId) -> Result<Option<TcpSeqNumber>> {
        match self.link.post_receive(self.pool, id) {
            Ok(()) => Ok(None),
            Err(err) => {
                let _ = self.pool.release(id);
                Err(err.into())
            }
        }
    }

    fn check_deadline(&mut self) -> Result<()> {
        let now = (self.clock)();
        if self.deadline.is_elapsed(now) {
            Err(Error::Timeout)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nic::sim::SimLink;
    use crate::wire::EthernetAddress;
    use crate::wire::Ipv4Address;

    fn session() -> Session {
        Session::new(
            EthernetAddress([0x00, 0x0f, 0x53, 0x4b, 0xe6, 0xb1]),
            Ipv4Address::new(192, 168, 13, 21),
            1234,
            EthernetAddress([0x00, 0x0f, 0x53, 0x59, 0xa5, 0xe0]),
            Ipv4Address::new(192, 168, 13, 10),
            12345,
        )
    }

    fn peer_of(session: &Session) -> Session {
        Session::new(
            session.peer_mac, session.peer_ip, session.peer_port,
            session.local_mac, session.local_ip, session.local_port,
        )
    }

    fn peer_frame(session: &Session, flags: TcpFlags, seq: i32, ack: i32) -> alloc::vec::Vec<u8> {
        let mut frame = alloc::vec![0u8; 512];
        let len = peer_of(session).emit(Segment {
            seq: TcpSeqNumber(seq),
            ack: TcpSeqNumber(ack),
            flags,
            payload: &[],
        }, &mut frame).unwrap();
        frame.truncate(len);
        frame
    }

    fn pool() -> Pool {
        Pool::new(512, 8)
    }

    fn frozen_clock() -> impl FnMut() -> Instant {
        || Instant::from_millis(0)
    }

    fn tcp_of(frame: &[u8]) -> &tcp_segment {
        tcp_segment::new_unchecked(&frame[34..])
    }

    #[test]
    fn establishes_and_acks_peer_isn() {
        let ses = session();
        let mut pool = pool();
        let mut link = SimLink::new();
        link.inject(&peer_frame(&ses, TcpFlags::SYN | TcpFlags::ACK, 500, 2));

        let conn = run(
            &ses, &mut pool, &mut link,
            TcpSeqNumber(1), b"Hello World\n",
            Expiration::Never, frozen_clock(),
        ).unwrap();

        assert_eq!(conn.phase, Phase::Established);
        assert_eq!(conn.peer_seq, TcpSeqNumber(501));
        assert_eq!(conn.local_seq, TcpSeqNumber(2) + b"Hello World\n".len());

        let sent = link.transmitted();
        assert_eq!(sent.len(), 3);

        let syn = tcp_of(&sent[0]);
        assert!(syn.flags().syn() && !syn.flags().ack());
        assert_eq!(syn.seq_number(), TcpSeqNumber(1));
        assert_eq!(syn.ack_number(), TcpSeqNumber(0));

        let ack = tcp_of(&sent[1]);
        assert!(ack.flags().ack() && !ack.flags().syn());
        assert_eq!(ack.seq_number(), TcpSeqNumber(2));
        assert_eq!(ack.ack_number(), TcpSeqNumber(501));

        let data = tcp_of(&sent[2]);
        assert_eq!(data.seq_number(), TcpSeqNumber(2));
        assert_eq!(data.ack_number(), TcpSeqNumber(501));
        assert_eq!(&sent[2][54..], b"Hello World\n");

        // Every transmit buffer came back; only rx postings remain out.
        assert_eq!(pool.available(), pool.capacity() - link.posted_receives());
    }

    #[test]
    fn extra_flags_are_tolerated() {
        let ses = session();
        let mut pool = pool();
        let mut link = SimLink::new();
        let flags = TcpFlags::SYN | TcpFlags::ACK | TcpFlags::PSH | TcpFlags::FIN;
        link.inject(&peer_frame(&ses, flags, 77, 2));

        let conn = run(
            &ses, &mut pool, &mut link,
            TcpSeqNumber(1), b"x",
            Expiration::Never, frozen_clock(),
        ).unwrap();
        assert_eq!(conn.peer_seq, TcpSeqNumber(78));
    }

    #[test]
    fn missing_syn_is_unexpected_flags() {
        let ses = session();
        let mut pool = pool();
        let mut link = SimLink::new();
        link.inject(&peer_frame(&ses, TcpFlags::ACK, 500, 2));

        let err = run(
            &ses, &mut pool, &mut link,
            TcpSeqNumber(1), b"x",
            Expiration::Never, frozen_clock(),
        ).unwrap_err();
        assert_eq!(err, Error::UnexpectedFlags);
    }

    #[test]
    fn missing_ack_is_unexpected_flags() {
        let ses = session();
        let mut pool = pool();
        let mut link = SimLink::new();
        link.inject(&peer_frame(&ses, TcpFlags::SYN, 500, 0));

        let err = run(
            &ses, &mut pool, &mut link,
            TcpSeqNumber(1), b"x",
            Expiration::Never, frozen_clock(),
        ).unwrap_err();
        assert_eq!(err, Error::UnexpectedFlags);
    }

    #[test]
    fn refused_transmit_fails_the_attempt() {
        let ses = session();
        let mut pool = pool();
        let mut link = SimLink::new();
        link.refuse_transmits(1);

        let err = run(
            &ses, &mut pool, &mut link,
            TcpSeqNumber(1), b"x",
            Expiration::Never, frozen_clock(),
        ).unwrap_err();
        assert_eq!(err, Error::Transmit);
    }

    #[test]
    fn transmit_error_event_fails_the_attempt() {
        let ses = session();
        let mut pool = pool();
        let mut link = SimLink::new();
        link.fail_transmits(1);

        let err = run(
            &ses, &mut pool, &mut link,
            TcpSeqNumber(1), b"x",
            Expiration::Never, frozen_clock(),
        ).unwrap_err();
        assert_eq!(err, Error::Transmit);
    }

    #[test]
    fn deadline_bounds_the_wait() {
        let ses = session();
        let mut pool = pool();
        let mut link = SimLink::new();

        let mut now = 0;
        let clock = move || {
            now += 10;
            Instant::from_millis(now)
        };
        let err = run(
            &ses, &mut pool, &mut link,
            TcpSeqNumber(1), b"x",
            Expiration::When(Instant::from_millis(100)), clock,
        ).unwrap_err();
        assert_eq!(err, Error::Timeout);
    }

    #[test]
    fn foreign_traffic_is_ignored_and_reposted() {
        let ses = session();
        let mut pool = pool();
        let mut link = SimLink::new();

        // Same hosts, wrong port pair.
        let mut other = ses;
        other.peer_port = 4321;
        link.inject(&peer_frame(&other, TcpFlags::SYN | TcpFlags::ACK, 1000, 2));
        link.inject(&peer_frame(&ses, TcpFlags::SYN | TcpFlags::ACK, 500, 2));

        let conn = run(
            &ses, &mut pool, &mut link,
            TcpSeqNumber(1), b"x",
            Expiration::Never, frozen_clock(),
        ).unwrap();
        assert_eq!(conn.peer_seq, TcpSeqNumber(501));
    }

    #[test]
    fn timestamped_receives_are_handled() {
        let ses = session();
        let mut pool = pool();
        let mut link = SimLink::new();
        link.stamp_receives(Instant::from_millis(3));
        link.inject(&peer_frame(&ses, TcpFlags::SYN | TcpFlags::ACK, 500, 2));

        let conn = run(
            &ses, &mut pool, &mut link,
            TcpSeqNumber(1), b"x",
            Expiration::Never, frozen_clock(),
        ).unwrap();
        assert_eq!(conn.phase, Phase::Established);
    }
}
