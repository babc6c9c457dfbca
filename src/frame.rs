//! Assembling complete frames from session constants and per-segment values.
//!
//! A [`Session`] carries everything that never changes while a connection
//! attempt runs: the MAC pair, the IPv4 pair, the port pair, TTL, IP
//! identification and the advertised window. A [`Segment`] carries what
//! changes per transmission: flags, sequence and acknowledgment numbers and
//! the payload. [`Session::emit`] composes the two into wire bytes.
//!
//! [`Session`]: struct.Session.html
//! [`Segment`]: struct.Segment.html
//! [`Session::emit`]: struct.Session.html#method.emit
use crate::wire::{
    ethernet_frame, ipv4_packet, tcp_segment,
    EthernetAddress, EthernetProtocol, EthernetRepr,
    IpProtocol, Ipv4Address, Ipv4Repr,
    TcpFlags, TcpSeqNumber,
    Error, Result,
};

const ETH_HEADER_LEN: usize = 14;
const IP_HEADER_LEN: usize = 20;
const TCP_HEADER_LEN: usize = 20;

/// Ethernet, IPv4 and TCP headers, with no options anywhere.
pub const HEADER_LEN: usize = ETH_HEADER_LEN + IP_HEADER_LEN + TCP_HEADER_LEN;

/// The session-constant header fields of one connection attempt.
///
/// An explicit value set rather than compiled-in constants, so several
/// sessions can coexist and tests can pick their own endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    /// Our hardware address.
    pub local_mac: EthernetAddress,
    /// The peer's (or gateway's) hardware address.
    pub peer_mac: EthernetAddress,
    /// Our IPv4 address.
    pub local_ip: Ipv4Address,
    /// The peer's IPv4 address.
    pub peer_ip: Ipv4Address,
    /// Our TCP port.
    pub local_port: u16,
    /// The peer's TCP port.
    pub peer_port: u16,
    /// Time-to-live of every emitted packet.
    pub hop_limit: u8,
    /// IP identification of every emitted packet.
    pub ident: u16,
    /// Advertised receive window.
    pub window: u16,
}

/// The per-transmission values of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    /// Sequence number.
    pub seq: TcpSeqNumber,
    /// Acknowledgment number.
    pub ack: TcpSeqNumber,
    /// Flags; the data offset is filled in by the emitter.
    pub flags: TcpFlags,
    /// Application data, possibly empty.
    pub payload: &'a [u8],
}

impl Session {
    /// A session between the given endpoints, with the defaults for TTL
    /// (64), identification (0) and window (maximum).
    pub fn new(
        local_mac: EthernetAddress, local_ip: Ipv4Address, local_port: u16,
        peer_mac: EthernetAddress, peer_ip: Ipv4Address, peer_port: u16,
    ) -> Self {
        Session {
            local_mac,
            peer_mac,
            local_ip,
            peer_ip,
            local_port,
            peer_port,
            hop_limit: 64,
            ident: 0,
            window: u16::max_value(),
        }
    }

    /// The frame length `emit` will produce for a payload of this size.
    pub fn frame_len(payload_len: usize) -> usize {
        HEADER_LEN + payload_len
    }

    /// Whether a received frame belongs to this session's 4-tuple.
    ///
    /// Checks EtherType, IP protocol and the reversed address and port
    /// pairs; the length must already have been validated.
    pub fn accepts(&self, frame: &[u8]) -> bool {
        let eth = match ethernet_frame::new_checked(frame) {
            Ok(eth) => eth,
            Err(_) => return false,
        };
        if eth.ethertype() != EthernetProtocol::Ipv4 {
            return false;
        }
        let ip = match ipv4_packet::new_checked(eth.payload_slice()) {
            Ok(ip) => ip,
            Err(_) => return false,
        };
        if ip.protocol() != IpProtocol::Tcp
            || ip.src_addr() != self.peer_ip
            || ip.dst_addr() != self.local_ip
        {
            return false;
        }
        let tcp = match tcp_segment::new_checked(ip.payload_slice()) {
            Ok(tcp) => tcp,
            Err(_) => return false,
        };
        tcp.src_port() == self.peer_port && tcp.dst_port() == self.local_port
    }

    /// Write a complete frame for `segment` into `frame`.
    ///
    /// The destination capacity is checked before anything is written; on
    /// `Err(Error::Truncated)` the buffer is untouched. Returns the total
    /// frame length. The output is fully determined by the session and the
    /// segment.
    pub fn emit(&self, segment: Segment, frame: &mut [u8]) -> Result<usize> {
        let total_len = Self::frame_len(segment.payload.len());
        if frame.len() < total_len {
            return Err(Error::Truncated);
        }
        let frame = &mut frame[..total_len];

        let eth = ethernet_frame::new_unchecked_mut(frame);
        EthernetRepr {
            src_addr: self.local_mac,
            dst_addr: self.peer_mac,
            ethertype: EthernetProtocol::Ipv4,
        }.emit(eth);

        let ip = ipv4_packet::new_unchecked_mut(eth.payload_mut_slice());
        Ipv4Repr {
            src_addr: self.local_ip,
            dst_addr: self.peer_ip,
            protocol: IpProtocol::Tcp,
            hop_limit: self.hop_limit,
        }.emit(ip);
        ip.set_total_len((IP_HEADER_LEN + TCP_HEADER_LEN + segment.payload.len()) as u16);
        ip.set_ident(self.ident);
        ip.fill_checksum();

        let tcp = tcp_segment::new_unchecked_mut(ip.payload_mut_slice());
        tcp.set_src_port(self.local_port);
        tcp.set_dst_port(self.peer_port);
        tcp.set_seq_number(segment.seq);
        tcp.set_ack_number(segment.ack);
        tcp.set_header_len(TCP_HEADER_LEN as u8);
        tcp.set_flags(segment.flags);
        tcp.set_window_len(self.window);
        tcp.set_urgent_at(0);
        tcp.payload_mut_slice().copy_from_slice(segment.payload);
        // Last write: every other field contributes to this checksum.
        let (local_ip, peer_ip) = (self.local_ip, self.peer_ip);
        tcp.fill_checksum(&local_ip, &peer_ip);

        Ok(total_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn emit(segment: Segment) -> alloc::vec::Vec<u8> {
        let mut frame = alloc::vec![0u8; 2048];
        let len = session().emit(segment, &mut frame).unwrap();
        frame.truncate(len);
        frame
    }

    fn checksums_round_trip(frame: &[u8]) {
        let ses = session();
        let ip = ipv4_packet::new_checked(&frame[14..]).unwrap();
        assert!(ip.verify_checksum());
        let tcp_end = 14 + ip.total_len() as usize;
        let tcp = tcp_segment::new_checked(&frame[34..tcp_end]).unwrap();
        assert!(tcp.verify_checksum(&ses.local_ip, &ses.peer_ip));
        assert_ne!(tcp.checksum(), 0x0000);
        assert_ne!(tcp.checksum(), 0xffff);
    }

    #[test]
    fn syn_segment() {
        let frame = emit(Segment {
            seq: TcpSeqNumber(1),
            ack: TcpSeqNumber(0),
            flags: TcpFlags::SYN,
            payload: &[],
        });

        assert_eq!(frame.len(), 54);
        let ip = ipv4_packet::new_checked(&frame[14..]).unwrap();
        assert_eq!(ip.total_len(), 40);
        assert_eq!(ip.header_len(), 20);
        // Flags byte carries SYN alone, data offset words match the fixed
        // header.
        assert_eq!(frame[46], 0x50);
        assert_eq!(frame[47], 0x02);
        checksums_round_trip(&frame);
    }

    #[test]
    fn data_segment() {
        let payload = b"Hello World\n";
        let frame = emit(Segment {
            seq: TcpSeqNumber(2),
            ack: TcpSeqNumber(101),
            flags: TcpFlags::ACK,
            payload,
        });

        assert_eq!(frame.len(), 54 + 12);
        let ip = ipv4_packet::new_checked(&frame[14..]).unwrap();
        assert_eq!(ip.total_len(), 52);
        assert_eq!(&frame[54..], &payload[..]);
        let tcp = tcp_segment::new_checked(&frame[34..]).unwrap();
        assert_eq!(tcp.seq_number(), TcpSeqNumber(2));
        assert_eq!(tcp.ack_number(), TcpSeqNumber(101));
        assert!(tcp.flags().ack());
        checksums_round_trip(&frame);
    }

    #[test]
    fn odd_payload_checksum() {
        let frame = emit(Segment {
            seq: TcpSeqNumber(7),
            ack: TcpSeqNumber(8),
            flags: TcpFlags::ACK,
            payload: &[0xab],
        });
        assert_eq!(frame.len(), 55);
        checksums_round_trip(&frame);
    }

    #[test]
    fn deterministic() {
        let segment = Segment {
            seq: TcpSeqNumber(42),
            ack: TcpSeqNumber(17),
            flags: TcpFlags::SYN | TcpFlags::ACK,
            payload: b"abc",
        };
        assert_eq!(emit(segment), emit(segment));
    }

    #[test]
    fn rejects_short_buffers() {
        let mut frame = [0u8; HEADER_LEN - 1];
        let before = frame;
        let err = session().emit(Segment {
            seq: TcpSeqNumber(1),
            ack: TcpSeqNumber(0),
            flags: TcpFlags::SYN,
            payload: &[],
        }, &mut frame);
        assert_eq!(err, Err(Error::Truncated));
        assert_eq!(frame, before);
    }

    #[test]
    fn session_constants_land_at_fixed_offsets() {
        let frame = emit(Segment {
            seq: TcpSeqNumber(1),
            ack: TcpSeqNumber(0),
            flags: TcpFlags::SYN,
            payload: &[],
        });

        assert_eq!(&frame[0..6], &[0x00, 0x0f, 0x53, 0x59, 0xa5, 0xe0]);
        assert_eq!(&frame[6..12], &[0x00, 0x0f, 0x53, 0x4b, 0xe6, 0xb1]);
        assert_eq!(&frame[12..14], &[0x08, 0x00]);
        assert_eq!(frame[14], 0x45);
        assert_eq!(frame[22], 64);
        assert_eq!(frame[23], 6);
        assert_eq!(&frame[26..30], &[192, 168, 13, 21]);
        assert_eq!(&frame[30..34], &[192, 168, 13, 10]);
        assert_eq!(&frame[34..36], &1234u16.to_be_bytes()[..]);
        assert_eq!(&frame[36..38], &12345u16.to_be_bytes()[..]);
        assert_eq!(&frame[48..50], &[0xff, 0xff]);
        assert_eq!(&frame[52..54], &[0x00, 0x00]);
    }

    #[test]
    fn four_tuple_filter() {
        let ses = session();
        // A frame from the peer back to us.
        let peer = Session::new(
            ses.peer_mac, ses.peer_ip, ses.peer_port,
            ses.local_mac, ses.local_ip, ses.local_port,
        );
        let mut frame = alloc::vec![0u8; 2048];
        let len = peer.emit(Segment {
            seq: TcpSeqNumber(500),
            ack: TcpSeqNumber(2),
            flags: TcpFlags::SYN | TcpFlags::ACK,
            payload: &[],
        }, &mut frame).unwrap();

        assert!(ses.accepts(&frame[..len]));
        // Our own transmissions do not match the reversed tuple.
        let own = emit(Segment {
            seq: TcpSeqNumber(1),
            ack: TcpSeqNumber(0),
            flags: TcpFlags::SYN,
            payload: &[],
        });
        assert!(!ses.accepts(&own));
        assert!(!ses.accepts(&frame[..20]));
    }
}
