use core::{cmp, fmt, ops};
use byteorder::{ByteOrder, NetworkEndian};

use super::{checksum, Error, IpProtocol, Ipv4Address, Result};

/// A TCP sequence number.
///
/// A sequence number is a monotonically advancing integer modulo
/// 2<sup>32</sup>. Sequence numbers do not have a discontiguity when
/// compared pairwise across a signed overflow.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Hash)]
pub struct SeqNumber(pub i32);

impl SeqNumber {
    /// Construct a sequence number from its on-wire unsigned value.
    pub fn from_u32(value: u32) -> SeqNumber {
        SeqNumber(value as i32)
    }

    /// Return the on-wire unsigned value.
    pub fn to_u32(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0 as u32)
    }
}

impl ops::Add<usize> for SeqNumber {
    type Output = SeqNumber;

    fn add(self, rhs: usize) -> SeqNumber {
        if rhs > i32::max_value() as usize {
            panic!("attempt to add to sequence number with unsigned overflow")
        }
        SeqNumber(self.0.wrapping_add(rhs as i32))
    }
}

impl ops::AddAssign<usize> for SeqNumber {
    fn add_assign(&mut self, rhs: usize) {
        *self = *self + rhs;
    }
}

impl cmp::PartialOrd for SeqNumber {
    fn partial_cmp(&self, other: &SeqNumber) -> Option<cmp::Ordering> {
        self.0.wrapping_sub(other.0).partial_cmp(&0)
    }
}

/// A set of TCP flags.
///
/// Reads and writes ignore the data offset nibble sharing the same on-wire
/// word; only the nine flag bits are represented.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Flags(pub u16);

mod field {
    #![allow(non_snake_case)]

    use crate::wire::field::Field;

    pub(crate) const SRC_PORT: Field = 0..2;
    pub(crate) const DST_PORT: Field = 2..4;
    pub(crate) const SEQ_NUM:  Field = 4..8;
    pub(crate) const ACK_NUM:  Field = 8..12;
    pub(crate) const FLAGS:    Field = 12..14;
    pub(crate) const WIN_SIZE: Field = 14..16;
    pub(crate) const CHECKSUM: Field = 16..18;
    pub(crate) const URGENT:   Field = 18..20;

    pub(crate) const FLG_FIN: u16 = 0x001;
    pub(crate) const FLG_SYN: u16 = 0x002;
    pub(crate) const FLG_RST: u16 = 0x004;
    pub(crate) const FLG_PSH: u16 = 0x008;
    pub(crate) const FLG_ACK: u16 = 0x010;
    pub(crate) const FLG_URG: u16 = 0x020;
}

impl Flags {
    /// The FIN flag alone.
    pub const FIN: Flags = Flags(field::FLG_FIN);
    /// The SYN flag alone.
    pub const SYN: Flags = Flags(field::FLG_SYN);
    /// The RST flag alone.
    pub const RST: Flags = Flags(field::FLG_RST);
    /// The PSH flag alone.
    pub const PSH: Flags = Flags(field::FLG_PSH);
    /// The ACK flag alone.
    pub const ACK: Flags = Flags(field::FLG_ACK);

    /// Return the FIN flag.
    pub fn fin(&self) -> bool {
        self.0 & field::FLG_FIN != 0
    }

    /// Return the SYN flag.
    pub fn syn(&self) -> bool {
        self.0 & field::FLG_SYN != 0
    }

    /// Return the RST flag.
    pub fn rst(&self) -> bool {
        self.0 & field::FLG_RST != 0
    }

    /// Return the PSH flag.
    pub fn psh(&self) -> bool {
        self.0 & field::FLG_PSH != 0
    }

    /// Return the ACK flag.
    pub fn ack(&self) -> bool {
        self.0 & field::FLG_ACK != 0
    }

    /// Return the URG flag.
    pub fn urg(&self) -> bool {
        self.0 & field::FLG_URG != 0
    }
}

impl ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

byte_wrapper! {
    /// A byte sequence representing a TCP segment, header plus payload.
    ///
    /// The wrapped slice must be bounded to the segment, not to the
    /// containing buffer, for the checksum methods to be meaningful.
    #[derive(Debug, PartialEq, Eq)]
    pub struct tcp([u8]);
}

impl tcp {
    /// Imbue a raw octet buffer with TCP segment structure.
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(data)
    }

    /// Imbue a mutable octet buffer with TCP segment structure.
    pub fn new_unchecked_mut(data: &mut [u8]) -> &mut Self {
        Self::__from_macro_new_unchecked_mut(data)
    }

    /// Wrap a buffer after ensuring no accessor will panic.
    pub fn new_checked(data: &[u8]) -> Result<&Self> {
        Self::new_unchecked(data).check_len()?;
        Ok(Self::new_unchecked(data))
    }

    /// Wrap a mutable buffer after ensuring no accessor will panic.
    pub fn new_checked_mut(data: &mut [u8]) -> Result<&mut Self> {
        Self::new_checked(&data[..])?;
        Ok(Self::new_unchecked_mut(data))
    }

    /// Unwrap the segment as a raw byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Unwrap the segment as a mutable raw byte slice.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }

    /// Ensure that no accessor method will panic if called.
    ///
    /// Returns `Err(Error::Truncated)` if the buffer is shorter than the
    /// minimal header or than the length the data offset claims,
    /// `Err(Error::Malformed)` if the data offset claims a header shorter
    /// than the minimal one.
    pub fn check_len(&self) -> Result<()> {
        let len = self.0.len();
        if len < field::URGENT.end {
            Err(Error::Truncated)
        } else {
            let header_len = self.header_len() as usize;
            if header_len < field::URGENT.end {
                Err(Error::Malformed)
            } else if len < header_len {
                Err(Error::Truncated)
            } else {
                Ok(())
            }
        }
    }

    /// Return the source port field.
    pub fn src_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::SRC_PORT])
    }

    /// Return the destination port field.
    pub fn dst_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::DST_PORT])
    }

    /// Return the sequence number field.
    pub fn seq_number(&self) -> SeqNumber {
        SeqNumber(NetworkEndian::read_i32(&self.0[field::SEQ_NUM]))
    }

    /// Return the acknowledgment number field.
    pub fn ack_number(&self) -> SeqNumber {
        SeqNumber(NetworkEndian::read_i32(&self.0[field::ACK_NUM]))
    }

    /// Read all flags at once.
    pub fn flags(&self) -> Flags {
        Flags(NetworkEndian::read_u16(&self.0[field::FLAGS]) & 0x1ff)
    }

    /// Return the header length, in octets.
    pub fn header_len(&self) -> u8 {
        let raw = NetworkEndian::read_u16(&self.0[field::FLAGS]);
        ((raw >> 12) * 4) as u8
    }

    /// Return the window size field.
    pub fn window_len(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::WIN_SIZE])
    }

    /// Return the checksum field.
    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::CHECKSUM])
    }

    /// Return the urgent pointer field.
    pub fn urgent_at(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::URGENT])
    }

    /// Set the source port field.
    pub fn set_src_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::SRC_PORT], value)
    }

    /// Set the destination port field.
    pub fn set_dst_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::DST_PORT], value)
    }

    /// Set the sequence number field.
    pub fn set_seq_number(&mut self, value: SeqNumber) {
        NetworkEndian::write_i32(&mut self.0[field::SEQ_NUM], value.0)
    }

    /// Set the acknowledgment number field.
    pub fn set_ack_number(&mut self, value: SeqNumber) {
        NetworkEndian::write_i32(&mut self.0[field::ACK_NUM], value.0)
    }

    /// Set a combination of flags, clearing all others.
    pub fn set_flags(&mut self, Flags(flags): Flags) {
        let raw = NetworkEndian::read_u16(&self.0[field::FLAGS]) & !0x0fff;
        NetworkEndian::write_u16(&mut self.0[field::FLAGS], raw | (flags & 0x1ff))
    }

    /// Set the header length, in octets.
    pub fn set_header_len(&mut self, value: u8) {
        let raw = NetworkEndian::read_u16(&self.0[field::FLAGS]);
        let raw = (raw & !0xf000) | (u16::from(value) / 4) << 12;
        NetworkEndian::write_u16(&mut self.0[field::FLAGS], raw)
    }

    /// Set the window size field.
    pub fn set_window_len(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::WIN_SIZE], value)
    }

    /// Set the checksum field.
    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::CHECKSUM], value)
    }

    /// Set the urgent pointer field.
    pub fn set_urgent_at(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::URGENT], value)
    }

    /// Return the payload as a byte slice.
    pub fn payload_slice(&self) -> &[u8] {
        &self.0[self.header_len() as usize..]
    }

    /// Return the payload as a mutable byte slice.
    pub fn payload_mut_slice(&mut self) -> &mut [u8] {
        let header_len = self.header_len() as usize;
        &mut self.0[header_len..]
    }

    /// Validate the segment checksum against the IPv4 pseudo header.
    pub fn verify_checksum(&self, src_addr: &Ipv4Address, dst_addr: &Ipv4Address) -> bool {
        checksum::combine(&[
            checksum::pseudo_header(src_addr, dst_addr, IpProtocol::Tcp,
                                    self.0.len() as u32),
            checksum::data(&self.0),
        ]) == !0
    }

    /// Compute and fill in the segment checksum.
    ///
    /// Every other header field, and the payload, must be final before this
    /// is called; any later write invalidates the stored checksum.
    pub fn fill_checksum(&mut self, src_addr: &Ipv4Address, dst_addr: &Ipv4Address) {
        self.set_checksum(0);
        let value = !checksum::combine(&[
            checksum::pseudo_header(src_addr, dst_addr, IpProtocol::Tcp,
                                    self.0.len() as u32),
            checksum::data(&self.0),
        ]);
        self.set_checksum(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static SEGMENT_BYTES: [u8; 24] =
        [0x04, 0xd2, 0x30, 0x39,
         0x00, 0x00, 0x00, 0x01,
         0x00, 0x00, 0x00, 0x00,
         0x50, 0x02, 0xff, 0xff,
         0x34, 0x63, 0x00, 0x00,
         0xaa, 0x00, 0x00, 0xff];

    const SRC: Ipv4Address = Ipv4Address::new(192, 168, 13, 21);
    const DST: Ipv4Address = Ipv4Address::new(192, 168, 13, 10);

    #[test]
    fn deconstruct() {
        let segment = tcp::new_checked(&SEGMENT_BYTES[..]).unwrap();
        assert_eq!(segment.src_port(), 1234);
        assert_eq!(segment.dst_port(), 12345);
        assert_eq!(segment.seq_number(), SeqNumber(1));
        assert_eq!(segment.ack_number(), SeqNumber(0));
        assert_eq!(segment.header_len(), 20);
        assert!(segment.flags().syn());
        assert!(!segment.flags().ack());
        assert_eq!(segment.window_len(), 0xffff);
        assert_eq!(segment.payload_slice(), &[0xaa, 0x00, 0x00, 0xff]);
        assert!(segment.verify_checksum(&SRC, &DST));
    }

    #[test]
    fn construct() {
        let mut bytes = [0u8; 24];
        let segment = tcp::new_unchecked_mut(&mut bytes);
        segment.set_src_port(1234);
        segment.set_dst_port(12345);
        segment.set_seq_number(SeqNumber(1));
        segment.set_ack_number(SeqNumber(0));
        segment.set_header_len(20);
        segment.set_flags(Flags::SYN);
        segment.set_window_len(0xffff);
        segment.set_urgent_at(0);
        segment.payload_mut_slice().copy_from_slice(&[0xaa, 0x00, 0x00, 0xff]);
        segment.fill_checksum(&SRC, &DST);
        assert_eq!(segment.as_bytes(), &SEGMENT_BYTES[..]);
    }

    #[test]
    fn flag_order_does_not_clobber_offset() {
        let mut bytes = [0u8; 20];
        let segment = tcp::new_unchecked_mut(&mut bytes);
        segment.set_flags(Flags::SYN | Flags::ACK);
        segment.set_header_len(20);
        assert_eq!(bytes[12], 0x50);
        assert_eq!(bytes[13], 0x12);
    }

    #[test]
    fn sequence_numbers_wrap() {
        let near_wrap = SeqNumber::from_u32(0xffff_ffff);
        assert_eq!(near_wrap + 1, SeqNumber::from_u32(0));
        assert!(near_wrap < near_wrap + 1);
    }
}
