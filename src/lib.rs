//! Hand-built Ethernet/IPv4/TCP frames and a minimal user-space handshake.
//!
//! This library is the user-space counterpart to a kernel's TCP/IP stack,
//! stripped to what one connection attempt needs: byte-exact header
//! construction with correct one's-complement checksums ([`wire`]), a fixed
//! arena of packet buffers with an exactly-one-owner discipline ([`pool`]),
//! a completion-event transport seam modelled on DMA-capable NICs ([`nic`]),
//! and the SYN → SYN/ACK → ACK → data sequence driving them ([`dial`]).
//!
//! Nothing here allocates after setup. The pool is sized once, every frame
//! is written into caller-owned memory, and the transport only ever refers
//! to buffers by their dense integer id. There is no retransmission, no
//! congestion control and no reassembly; a failed attempt is reported to the
//! caller, who may start over from scratch.
//!
//! [`wire`]: wire/index.html
//! [`pool`]: pool/index.html
//! [`nic`]: nic/index.html
//! [`dial`]: dial/index.html
#![warn(missing_docs)]
#![warn(unreachable_pub)]

// tests should be able to use `std`
#![cfg_attr(all(
    not(feature = "std"),
    not(test)),
no_std)]

extern crate alloc;

#[macro_use] mod macros;
pub mod dial;
pub mod frame;
pub mod nic;
pub mod pool;
pub mod time;
pub mod wire;
