use core::{fmt, str::FromStr};
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Result};

enum_with_unknown! {
    /// Ethernet protocol type.
    pub enum EtherType(u16) {
        /// Internet protocol, version 4.
        Ipv4 = 0x0800,
        /// Address resolution protocol.
        Arp  = 0x0806,
        /// Internet protocol, version 6.
        Ipv6 = 0x86DD,
    }
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EtherType::Ipv4 => write!(f, "IPv4"),
            EtherType::Arp  => write!(f, "ARP"),
            EtherType::Ipv6 => write!(f, "IPv6"),
            EtherType::Unknown(id) => write!(f, "0x{:04x}", id),
        }
    }
}

/// A six-octet Ethernet II address.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub struct Address(pub [u8; 6]);

impl Address {
    /// The broadcast address.
    pub const BROADCAST: Address = Address([0xff; 6]);

    /// Construct an Ethernet address from a sequence of octets, in big-endian.
    ///
    /// # Panics
    /// The function panics if `data` is not six octets long.
    pub fn from_bytes(data: &[u8]) -> Address {
        let mut bytes = [0; 6];
        bytes.copy_from_slice(data);
        Address(bytes)
    }

    /// Return an Ethernet address as a sequence of octets, in big-endian.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Query whether this address is the broadcast address.
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Query whether the "multicast" bit in the OUI is set.
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// Query whether the address is an unicast address.
    pub fn is_unicast(&self) -> bool {
        !(self.is_broadcast() || self.is_multicast())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bytes = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
               bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5])
    }
}

/// An error produced when parsing an Ethernet address from text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseAddressError {
    kind: ParseAddressErrorKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ParseAddressErrorKind {
    ComponentError,
    SeparatorError,
}

impl fmt::Display for ParseAddressError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self.kind {
            ParseAddressErrorKind::ComponentError =>
                "invalid ethernet address component",
            ParseAddressErrorKind::SeparatorError =>
                "unexpected number of ethernet address components (should be 6)",
        })
    }
}

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(src: &str) -> core::result::Result<Self, ParseAddressError> {
        let mut parsed = [0; 6];
        let mut components = src.split(':');
        for c in parsed.iter_mut() {
            let part = components
                .next()
                .ok_or(ParseAddressError {
                    kind: ParseAddressErrorKind::SeparatorError,
                })?;
            *c = u8::from_str_radix(part, 16)
                .map_err(|_| ParseAddressError {
                    kind: ParseAddressErrorKind::ComponentError,
                })?;
        }

        if components.next().is_some() {
            Err(ParseAddressError {
                kind: ParseAddressErrorKind::SeparatorError,
            })
        } else {
            Ok(Address(parsed))
        }
    }
}

byte_wrapper! {
    /// A byte sequence representing an Ethernet II frame.
    #[derive(Debug, PartialEq, Eq)]
    pub struct ethernet([u8]);
}

mod field {
    use crate::wire::field::*;

    pub(crate) const DESTINATION: Field =  0..6;
    pub(crate) const SOURCE:      Field =  6..12;
    pub(crate) const ETHERTYPE:   Field = 12..14;
    pub(crate) const PAYLOAD:     Rest  = 14..;
}

impl ethernet {
    /// Imbue a raw octet buffer with Ethernet frame structure.
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(data)
    }

    /// Imbue a mutable octet buffer with Ethernet frame structure.
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

    /// Unwrap the frame as a raw byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Unwrap the frame as a mutable raw byte slice.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }

    /// Ensure that no accessor method will panic if called.
    ///
    /// Returns `Err(Error::Truncated)` if the buffer is too short.
    pub fn check_len(&self) -> Result<()> {
        if self.0.len() < field::PAYLOAD.start {
            Err(Error::Truncated)
        } else {
            Ok(())
        }
    }

    /// Return the length of a frame header.
    pub fn header_len() -> usize {
        field::PAYLOAD.start
    }

    /// Return the length of a buffer required for a payload of given length.
    pub fn buffer_len(payload_len: usize) -> usize {
        field::PAYLOAD.start + payload_len
    }

    /// Return the destination address field.
    pub fn dst_addr(&self) -> Address {
        Address::from_bytes(&self.0[field::DESTINATION])
    }

    /// Return the source address field.
    pub fn src_addr(&self) -> Address {
        Address::from_bytes(&self.0[field::SOURCE])
    }

    /// Return the EtherType field.
    pub fn ethertype(&self) -> EtherType {
        let raw = NetworkEndian::read_u16(&self.0[field::ETHERTYPE]);
        EtherType::from(raw)
    }

    /// Set the destination address field.
    pub fn set_dst_addr(&mut self, value: Address) {
        self.0[field::DESTINATION].copy_from_slice(value.as_bytes())
    }

    /// Set the source address field.
    pub fn set_src_addr(&mut self, value: Address) {
        self.0[field::SOURCE].copy_from_slice(value.as_bytes())
    }

    /// Set the EtherType field.
    pub fn set_ethertype(&mut self, value: EtherType) {
        NetworkEndian::write_u16(&mut self.0[field::ETHERTYPE], value.into())
    }

    /// Return the payload as a byte slice.
    pub fn payload_slice(&self) -> &[u8] {
        &self.0[field::PAYLOAD]
    }

    /// Return the payload as a mutable byte slice.
    pub fn payload_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0[field::PAYLOAD]
    }
}

impl AsRef<[u8]> for ethernet {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl AsMut<[u8]> for ethernet {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

/// A high-level representation of an Ethernet II header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    /// The sender address.
    pub src_addr: Address,
    /// The receiver address.
    pub dst_addr: Address,
    /// The contained protocol.
    pub ethertype: EtherType,
}

impl Repr {
    /// Parse an Ethernet frame and return a high-level representation.
    pub fn parse(frame: &ethernet) -> Result<Repr> {
        frame.check_len()?;
        Ok(Repr {
            src_addr: frame.src_addr(),
            dst_addr: frame.dst_addr(),
            ethertype: frame.ethertype(),
        })
    }

    /// Return the header length of this representation.
    pub fn header_len(&self) -> usize {
        field::PAYLOAD.start
    }

    /// Emit this high-level representation into a frame.
    pub fn emit(&self, frame: &mut ethernet) {
        frame.set_src_addr(self.src_addr);
        frame.set_dst_addr(self.dst_addr);
        frame.set_ethertype(self.ethertype);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static FRAME_BYTES: [u8; 18] =
        [0x01, 0x02, 0x03, 0x04, 0x05, 0x06,
         0x11, 0x12, 0x13, 0x14, 0x15, 0x16,
         0x08, 0x00,
         0xaa, 0xbb, 0xcc, 0xdd];

    #[test]
    fn deconstruct() {
        let frame = ethernet::new_checked(&FRAME_BYTES[..]).unwrap();
        assert_eq!(frame.dst_addr(), Address([0x01, 0x02, 0x03, 0x04, 0x05, 0x06]));
        assert_eq!(frame.src_addr(), Address([0x11, 0x12, 0x13, 0x14, 0x15, 0x16]));
        assert_eq!(frame.ethertype(), EtherType::Ipv4);
        assert_eq!(frame.payload_slice(), &[0xaa, 0xbb, 0xcc, 0xdd]);
    }

    #[test]
    fn construct() {
        let mut bytes = [0xa5; 18];
        let frame = ethernet::new_unchecked_mut(&mut bytes);
        frame.set_dst_addr(Address([0x01, 0x02, 0x03, 0x04, 0x05, 0x06]));
        frame.set_src_addr(Address([0x11, 0x12, 0x13, 0x14, 0x15, 0x16]));
        frame.set_ethertype(EtherType::Ipv4);
        frame.payload_mut_slice().copy_from_slice(&[0xaa, 0xbb, 0xcc, 0xdd]);
        assert_eq!(frame.as_bytes(), &FRAME_BYTES[..]);
    }

    #[test]
    fn too_short() {
        assert_eq!(ethernet::new_checked(&FRAME_BYTES[..13]), Err(Error::Truncated));
    }

    #[test]
    fn address_text_round_trip() {
        let addr: Address = "00:0f:53:4b:e6:b1".parse().unwrap();
        assert_eq!(addr, Address([0x00, 0x0f, 0x53, 0x4b, 0xe6, 0xb1]));
        assert!("00:0f:53:4b:e6".parse::<Address>().is_err());
        assert!("00:0f:53:4b:e6:zz".parse::<Address>().is_err());
    }
}
