use core::{fmt, str::FromStr};
use byteorder::{ByteOrder, NetworkEndian};

use super::{checksum, Error, Result};

enum_with_unknown! {
    /// The protocol carried inside an IP packet.
    pub enum Protocol(u8) {
        /// Internet control message protocol.
        Icmp = 1,
        /// Transmission control protocol.
        Tcp  = 6,
        /// User datagram protocol.
        Udp  = 17,
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Protocol::Icmp => write!(f, "ICMP"),
            Protocol::Tcp  => write!(f, "TCP"),
            Protocol::Udp  => write!(f, "UDP"),
            Protocol::Unknown(id) => write!(f, "0x{:02x}", id),
        }
    }
}

/// A four-octet IPv4 address.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub struct Address(pub [u8; 4]);

impl Address {
    /// An unspecified address.
    pub const UNSPECIFIED: Address = Address([0x00; 4]);

    /// Construct an IPv4 address from parts.
    pub const fn new(a0: u8, a1: u8, a2: u8, a3: u8) -> Address {
        Address([a0, a1, a2, a3])
    }

    /// Construct an IPv4 address from a sequence of octets, in big-endian.
    ///
    /// # Panics
    /// The function panics if `data` is not four octets long.
    pub fn from_bytes(data: &[u8]) -> Address {
        let mut bytes = [0; 4];
        bytes.copy_from_slice(data);
        Address(bytes)
    }

    /// Return an IPv4 address as a sequence of octets, in big-endian.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Query whether the address is an unicast address.
    pub fn is_unicast(&self) -> bool {
        !(self.is_broadcast() || self.is_multicast() || self.is_unspecified())
    }

    /// Query whether the address is the limited broadcast address.
    pub fn is_broadcast(&self) -> bool {
        self.0 == [255; 4]
    }

    /// Query whether the address is a multicast address.
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0xf0 == 224
    }

    /// Query whether the address is unspecified.
    pub fn is_unspecified(&self) -> bool {
        self.0[0] == 0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bytes = self.0;
        write!(f, "{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3])
    }
}

/// An error produced when parsing an IPv4 address from text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseAddressError {
    _private: (),
}

impl fmt::Display for ParseAddressError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("invalid dotted-decimal IPv4 address")
    }
}

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(src: &str) -> core::result::Result<Self, ParseAddressError> {
        let mut parsed = [0; 4];
        let mut components = src.split('.');
        for c in parsed.iter_mut() {
            let part = components
                .next()
                .ok_or(ParseAddressError { _private: () })?;
            *c = part.parse::<u8>()
                .map_err(|_| ParseAddressError { _private: () })?;
        }

        if components.next().is_some() {
            Err(ParseAddressError { _private: () })
        } else {
            Ok(Address(parsed))
        }
    }
}

byte_wrapper! {
    /// A byte sequence representing an IPv4 packet.
    #[derive(Debug, PartialEq, Eq)]
    pub struct ipv4([u8]);
}

mod field {
    use crate::wire::field::*;

    pub(crate) const VER_IHL:  usize = 0;
    pub(crate) const DSCP_ECN: usize = 1;
    pub(crate) const LENGTH:   Field = 2..4;
    pub(crate) const IDENT:    Field = 4..6;
    pub(crate) const FLG_OFF:  Field = 6..8;
    pub(crate) const TTL:      usize = 8;
    pub(crate) const PROTOCOL: usize = 9;
    pub(crate) const CHECKSUM: Field = 10..12;
    pub(crate) const SRC_ADDR: Field = 12..16;
    pub(crate) const DST_ADDR: Field = 16..20;
    pub(crate) const PAYLOAD:  Rest  = 20..;
}

impl ipv4 {
    /// Imbue a raw octet buffer with IPv4 packet structure.
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(data)
    }

    /// Imbue a mutable octet buffer with IPv4 packet structure.
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

    /// Unwrap the packet as a raw byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Unwrap the packet as a mutable raw byte slice.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }

    /// Ensure that no accessor method will panic if called.
    ///
    /// Returns `Err(Error::Truncated)` if the buffer is shorter than the
    /// fixed header, `Err(Error::Malformed)` if the IHL field claims a
    /// header shorter than that.
    pub fn check_len(&self) -> Result<()> {
        if self.0.len() < field::PAYLOAD.start {
            Err(Error::Truncated)
        } else if (self.header_len() as usize) < field::PAYLOAD.start {
            Err(Error::Malformed)
        } else {
            Ok(())
        }
    }

    /// Return the version field.
    pub fn version(&self) -> u8 {
        self.0[field::VER_IHL] >> 4
    }

    /// Return the header length, in octets.
    pub fn header_len(&self) -> u8 {
        (self.0[field::VER_IHL] & 0x0f) * 4
    }

    /// Return the combined DSCP/ECN byte.
    pub fn dscp_ecn(&self) -> u8 {
        self.0[field::DSCP_ECN]
    }

    /// Return the total length field.
    pub fn total_len(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::LENGTH])
    }

    /// Return the fragment identification field.
    pub fn ident(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::IDENT])
    }

    /// Return the combined flags and fragment offset word.
    pub fn flags_frag_offset(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::FLG_OFF])
    }

    /// Return the time-to-live field.
    pub fn hop_limit(&self) -> u8 {
        self.0[field::TTL]
    }

    /// Return the protocol field.
    pub fn protocol(&self) -> Protocol {
        Protocol::from(self.0[field::PROTOCOL])
    }

    /// Return the header checksum field.
    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::CHECKSUM])
    }

    /// Return the source address field.
    pub fn src_addr(&self) -> Address {
        Address::from_bytes(&self.0[field::SRC_ADDR])
    }

    /// Return the destination address field.
    pub fn dst_addr(&self) -> Address {
        Address::from_bytes(&self.0[field::DST_ADDR])
    }

    /// Validate the header checksum.
    pub fn verify_checksum(&self) -> bool {
        checksum::data(&self.0[..self.header_len() as usize]) == !0
    }

    /// Set the version field.
    pub fn set_version(&mut self, value: u8) {
        self.0[field::VER_IHL] = (self.0[field::VER_IHL] & 0x0f) | (value << 4);
    }

    /// Set the header length, in octets.
    pub fn set_header_len(&mut self, value: u8) {
        self.0[field::VER_IHL] = (self.0[field::VER_IHL] & 0xf0) | (value / 4);
    }

    /// Set the combined DSCP/ECN byte.
    pub fn set_dscp_ecn(&mut self, value: u8) {
        self.0[field::DSCP_ECN] = value;
    }

    /// Set the total length field.
    pub fn set_total_len(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::LENGTH], value)
    }

    /// Set the fragment identification field.
    pub fn set_ident(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::IDENT], value)
    }

    /// Clear the flags and fragment offset word (no fragmentation).
    pub fn clear_flags_frag_offset(&mut self) {
        NetworkEndian::write_u16(&mut self.0[field::FLG_OFF], 0)
    }

    /// Set the time-to-live field.
    pub fn set_hop_limit(&mut self, value: u8) {
        self.0[field::TTL] = value;
    }

    /// Set the protocol field.
    pub fn set_protocol(&mut self, value: Protocol) {
        self.0[field::PROTOCOL] = value.into();
    }

    /// Set the header checksum field.
    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::CHECKSUM], value)
    }

    /// Set the source address field.
    pub fn set_src_addr(&mut self, value: Address) {
        self.0[field::SRC_ADDR].copy_from_slice(value.as_bytes())
    }

    /// Set the destination address field.
    pub fn set_dst_addr(&mut self, value: Address) {
        self.0[field::DST_ADDR].copy_from_slice(value.as_bytes())
    }

    /// Compute and fill in the header checksum.
    ///
    /// The checksum covers all other header fields; they must be final
    /// before this is called.
    pub fn fill_checksum(&mut self) {
        self.set_checksum(0);
        let value = {
            let header = &self.0[..self.header_len() as usize];
            !checksum::data(header)
        };
        self.set_checksum(value)
    }

    /// Return the payload as a byte slice.
    ///
    /// This is the slice after the fixed header; the caller bounds it by
    /// `total_len` where that matters.
    pub fn payload_slice(&self) -> &[u8] {
        &self.0[field::PAYLOAD]
    }

    /// Return the payload as a mutable byte slice.
    pub fn payload_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0[field::PAYLOAD]
    }
}

/// A high-level representation of the session-constant IPv4 header fields.
///
/// The total length, identification and checksum are per-packet values and
/// are set through the packet wrapper instead.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    /// The sender address.
    pub src_addr: Address,
    /// The receiver address.
    pub dst_addr: Address,
    /// The contained upper-layer protocol.
    pub protocol: Protocol,
    /// The time-to-live value.
    pub hop_limit: u8,
}

impl Repr {
    /// Return the header length of this representation.
    ///
    /// Always the fixed 20 octets; this library never emits IP options.
    pub fn header_len(&self) -> usize {
        field::PAYLOAD.start
    }

    /// Emit this high-level representation into a packet.
    ///
    /// Writes the constant fields only; the per-packet fields and the
    /// checksum stay untouched.
    pub fn emit(&self, packet: &mut ipv4) {
        packet.set_version(4);
        packet.set_header_len(field::PAYLOAD.start as u8);
        packet.set_dscp_ecn(0);
        packet.clear_flags_frag_offset();
        packet.set_hop_limit(self.hop_limit);
        packet.set_protocol(self.protocol);
        packet.set_src_addr(self.src_addr);
        packet.set_dst_addr(self.dst_addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A 20-byte header carrying a 4-byte payload, checksum filled.
    static PACKET_BYTES: [u8; 24] =
        [0x45, 0x00, 0x00, 0x18,
         0x00, 0x00, 0x00, 0x00,
         0x40, 0x06, 0xdf, 0x70,
         0xc0, 0xa8, 0x0d, 0x15,
         0xc0, 0xa8, 0x0d, 0x0a,
         0xaa, 0x00, 0x00, 0xff];

    #[test]
    fn deconstruct() {
        let packet = ipv4::new_checked(&PACKET_BYTES[..]).unwrap();
        assert_eq!(packet.version(), 4);
        assert_eq!(packet.header_len(), 20);
        assert_eq!(packet.total_len(), 24);
        assert_eq!(packet.hop_limit(), 64);
        assert_eq!(packet.protocol(), Protocol::Tcp);
        assert_eq!(packet.src_addr(), Address::new(192, 168, 13, 21));
        assert_eq!(packet.dst_addr(), Address::new(192, 168, 13, 10));
        assert!(packet.verify_checksum());
    }

    #[test]
    fn construct_round_trips_checksum() {
        let mut bytes = [0u8; 24];
        let packet = ipv4::new_unchecked_mut(&mut bytes);
        Repr {
            src_addr: Address::new(192, 168, 13, 21),
            dst_addr: Address::new(192, 168, 13, 10),
            protocol: Protocol::Tcp,
            hop_limit: 64,
        }.emit(packet);
        packet.set_total_len(24);
        packet.set_ident(0);
        packet.fill_checksum();
        packet.payload_mut_slice().copy_from_slice(&[0xaa, 0x00, 0x00, 0xff]);
        assert_eq!(packet.as_bytes(), &PACKET_BYTES[..]);
        assert!(ipv4::new_unchecked(&bytes).verify_checksum());
    }

    #[test]
    fn malformed_ihl() {
        let mut bytes = PACKET_BYTES;
        bytes[0] = 0x44;
        assert_eq!(ipv4::new_checked(&bytes[..]), Err(Error::Malformed));
    }

    #[test]
    fn address_text_round_trip() {
        let addr: Address = "192.168.13.21".parse().unwrap();
        assert_eq!(addr, Address::new(192, 168, 13, 21));
        assert!("192.168.13".parse::<Address>().is_err());
        assert!("192.168.13.256".parse::<Address>().is_err());
    }
}
