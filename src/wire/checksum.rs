//! One's-complement internet checksums (RFC 1071).
//!
//! All sums run over the bytes exactly as they sit in memory, i.e. over
//! network-byte-order words. Values that only exist on the side, such as the
//! pseudo-header protocol and length, are re-encoded into network order
//! before they enter the sum; feeding host-order values in would corrupt the
//! checksum silently.
use byteorder::{ByteOrder, NetworkEndian};

use super::{Ipv4Address, IpProtocol};

fn propagate_carries(word: u32) -> u16 {
    let sum = (word >> 16) + (word & 0xffff);
    ((sum >> 16) as u16) + (sum as u16)
}

/// Compute an RFC 1071 compliant checksum (without the final complement).
pub(crate) fn data(mut data: &[u8]) -> u16 {
    let mut accum = 0u32;

    while data.len() >= 2 {
        accum += u32::from(NetworkEndian::read_u16(data));
        data = &data[2..];
    }

    // The last remaining odd byte is summed as the high octet of a
    // zero-padded word.
    if let Some(&value) = data.first() {
        accum += u32::from(value) << 8;
    }

    propagate_carries(accum)
}

/// Combine several RFC 1071 compliant checksums.
pub(crate) fn combine(checksums: &[u16]) -> u16 {
    let mut accum: u32 = 0;
    for &word in checksums {
        accum += u32::from(word);
    }
    propagate_carries(accum)
}

/// Compute the IPv4 pseudo header checksum for an upper-layer protocol.
///
/// `length` is the upper-layer segment length, header plus payload.
pub(crate) fn pseudo_header(
    src_addr: &Ipv4Address,
    dst_addr: &Ipv4Address,
    protocol: IpProtocol,
    length: u32,
) -> u16 {
    let mut proto_len = [0u8; 4];
    proto_len[1] = protocol.into();
    NetworkEndian::write_u16(&mut proto_len[2..4], length as u16);

    combine(&[
        data(src_addr.as_bytes()),
        data(dst_addr.as_bytes()),
        data(&proto_len[..]),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_words() {
        // 0x0102 + 0x0304 = 0x0406
        assert_eq!(data(&[0x01, 0x02, 0x03, 0x04]), 0x0406);
    }

    #[test]
    fn odd_trailing_byte_pads_low() {
        // 0x0102 + 0xff00
        assert_eq!(data(&[0x01, 0x02, 0xff]), 0x0003);
    }

    #[test]
    fn carries_fold() {
        assert_eq!(data(&[0xff, 0xff, 0x00, 0x01]), 0x0001);
        assert_eq!(combine(&[0xffff, 0x0002]), 0x0002);
    }

    #[test]
    fn pseudo_header_is_order_normalized() {
        let src = Ipv4Address::new(192, 168, 13, 21);
        let dst = Ipv4Address::new(192, 168, 13, 10);
        // src words + dst words + protocol + length, folded.
        let expect = combine(&[
            0xc0a8, 0x0d15,
            0xc0a8, 0x0d0a,
            u16::from(u8::from(IpProtocol::Tcp)),
            32,
        ]);
        assert_eq!(pseudo_header(&src, &dst, IpProtocol::Tcp, 32), expect);
    }
}
