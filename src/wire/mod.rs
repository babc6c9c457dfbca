/*! Low-level packet access and construction.

The `wire` module deals with the packet *representation*. The lowercase
structures ([`ethernet_frame`], [`ipv4_packet`], [`tcp_segment`]) extract
fields from sequences of octets and insert fields into sequences of octets;
they are thin wrappers over `[u8]` and never copy. The `Repr` structs are
compact high-level header representations that can be parsed from and
emitted into such a wrapper.

Every multi-byte field is stored in network byte order. The wrappers
guarantee that, if `check_len()` returned `Ok(())`, no field accessor or
setter will panic.

[`ethernet_frame`]: struct.ethernet_frame.html
[`ipv4_packet`]: struct.ipv4_packet.html
[`tcp_segment`]: struct.tcp_segment.html
*/
// Copyright (C) 2016 whitequark@whitequark.org
// Copyright (C) 2019 Andreas Molzer <andreas.molzer@tum.de>
//
// in large parts from `smoltcp` originally distributed under 0-clause BSD
//
// Applies to files in this folder unless otherwise noted. These are:
// * `checksum.rs`
// * `ethernet.rs`
// * `ipv4.rs`
// * `mod.rs` (this file)
// * `tcp.rs`

use core::fmt;

mod field {
    pub(crate) type Field = ::core::ops::Range<usize>;
    pub(crate) type Rest  = ::core::ops::RangeFrom<usize>;
}

pub(crate) mod checksum;
mod ethernet;
mod ipv4;
mod tcp;

/// The error type for packet parsing and emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A buffer was shorter than the structure written into or read from it.
    ///
    /// On the parsing side the packet may be shorter than the minimum length
    /// of its protocol; on the emission side the destination did not have
    /// capacity for the frame about to be built. In both cases no access
    /// past the buffer end has happened.
    Truncated,

    /// An incoming packet had an incorrect checksum and was dropped.
    WrongChecksum,

    /// An incoming packet was recognized but was self-contradictory.
    ///
    /// Example: a TCP segment whose data offset is smaller than the minimal
    /// header length.
    Malformed,
}

/// The result type for the wire module.
pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Truncated     => write!(f, "truncated packet"),
            Error::WrongChecksum => write!(f, "checksum error"),
            Error::Malformed     => write!(f, "malformed packet"),
        }
    }
}

pub use self::ethernet::{
    ethernet as ethernet_frame,
    Address as EthernetAddress,
    EtherType as EthernetProtocol,
    ParseAddressError as ParseEthernetAddressError,
    Repr as EthernetRepr};

pub use self::ipv4::{
    ipv4 as ipv4_packet,
    Address as Ipv4Address,
    ParseAddressError as ParseIpv4AddressError,
    Protocol as IpProtocol,
    Repr as Ipv4Repr};

pub use self::tcp::{
    tcp as tcp_segment,
    Flags as TcpFlags,
    SeqNumber as TcpSeqNumber};
