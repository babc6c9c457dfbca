//! An AF_PACKET raw-socket link.
//!
//! Binds a `SOCK_RAW` packet socket to one interface and adapts it to the
//! completion-event [`Transport`] model. Sockets have no transmit ring, so
//! a successful `send` is reported as `TxDone` on the next poll; receives
//! are drained non-blocking into the posted buffers in posting order.
//!
//! The socket sees all traffic on the interface, not only the session's;
//! filtering is the caller's job.
//!
//! [`Transport`]: ../trait.Transport.html
// Copyright (C) 2016 whitequark@whitequark.org
// Copyright (C) 2019 Andreas Molzer <andreas.molzer@tum.de>
//
// in large parts from `smoltcp` originally distributed under 0-clause BSD
#![allow(unsafe_code)]
use core::{fmt, mem};
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};

use alloc::collections::VecDeque;

use crate::pool::{BufId, Pool};

use super::{Batch, Error, Event, Result, Transport};

const ETH_P_ALL: libc::c_short = 0x0003;

/// An errno value.
///
/// This is the error representation of raw libc calls. It can be converted
/// into a `std::io::Error`, which carries the extensive error information.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Errno(pub libc::c_int);

impl Errno {
    fn last() -> Errno {
        Errno(unsafe { *libc::__errno_location() })
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", io::Error::from_raw_os_error(self.0))
    }
}

impl From<Errno> for io::Error {
    fn from(err: Errno) -> io::Error {
        io::Error::from_raw_os_error(err.0)
    }
}

#[derive(Clone, Copy)]
struct FdResult(libc::c_int);

#[derive(Clone, Copy)]
struct IoLenResult(libc::ssize_t);

/// Trait for interpreting integer return values.
trait LibcResult: Copy {
    fn is_fail(self) -> bool;

    fn errno(self) -> core::result::Result<(), Errno> {
        if self.is_fail() {
            Err(Errno::last())
        } else {
            Ok(())
        }
    }
}

impl LibcResult for FdResult {
    fn is_fail(self) -> bool {
        self.0 == -1
    }
}

impl LibcResult for IoLenResult {
    fn is_fail(self) -> bool {
        self.0 == -1
    }
}

/// Base for an if ioctl request, carrying the interface name.
#[repr(C)]
#[derive(Clone, Copy)]
struct ifreq {
    ifr_name: [libc::c_char; libc::IF_NAMESIZE],
}

impl ifreq {
    const SIOCGIFINDEX: libc::c_ulong = 0x8933;

    fn new(name: &str) -> Self {
        let mut ifr_name = [0; libc::IF_NAMESIZE];
        for (dst, byte) in ifr_name.iter_mut().zip(name.as_bytes()) {
            *dst = *byte as libc::c_char;
        }
        ifreq { ifr_name }
    }

    fn get_if_index(&mut self, fd: libc::c_int) -> core::result::Result<libc::c_int, Errno> {
        #[repr(C)]
        struct Request {
            interface: ifreq,
            ifr_ifindex: libc::c_int,
        }

        let mut request = Request {
            interface: *self,
            ifr_ifindex: 0,
        };

        let res = unsafe {
            libc::ioctl(fd, Self::SIOCGIFINDEX as _, &mut request as *mut _)
        };
        FdResult(res).errno()?;

        Ok(request.ifr_ifindex)
    }
}

/// A packet socket bound to one interface, usable as a [`Transport`].
///
/// Uses the errno principle for the last underlying error of a failed
/// operation.
///
/// [`Transport`]: ../trait.Transport.html
#[derive(Debug)]
pub struct RawLink {
    lower: libc::c_int,
    fill: VecDeque<BufId>,
    pending: VecDeque<Event>,
    last_err: Option<Errno>,
}

impl RawLink {
    /// Open a non-blocking packet socket and bind it to the named interface.
    pub fn new(name: &str) -> core::result::Result<RawLink, Errno> {
        let lower = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW | libc::SOCK_NONBLOCK,
                ETH_P_ALL.to_be() as i32)
        };
        FdResult(lower).errno()?;

        let link = RawLink {
            lower,
            fill: VecDeque::new(),
            pending: VecDeque::new(),
            last_err: None,
        };
        link.bind_interface(name)?;

        Ok(link)
    }

    fn bind_interface(&self, name: &str) -> core::result::Result<(), Errno> {
        let mut ifreq = ifreq::new(name);
        let sockaddr = libc::sockaddr_ll {
            sll_family:   libc::AF_PACKET as u16,
            sll_protocol: ETH_P_ALL.to_be() as u16,
            sll_ifindex:  ifreq.get_if_index(self.lower)?,
            sll_hatype:   1,
            sll_pkttype:  0,
            sll_halen:    6,
            sll_addr:     [0; 8],
        };

        let res = unsafe {
            libc::bind(
                self.lower,
                &sockaddr as *const libc::sockaddr_ll as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as u32)
        };
        FdResult(res).errno()
    }

    /// Take the last io error returned by the OS.
    pub fn last_err(&mut self) -> Option<Errno> {
        self.last_err.take()
    }

    fn send(&mut self, frame: &[u8]) -> core::result::Result<(), Errno> {
        let len = unsafe {
            libc::send(
                self.lower,
                frame.as_ptr() as *const libc::c_void,
                frame.len(),
                0)
        };
        IoLenResult(len).errno()
    }

    fn recv(&mut self, frame: &mut [u8]) -> core::result::Result<Option<usize>, Errno> {
        let len = unsafe {
            libc::recv(
                self.lower,
                frame.as_mut_ptr() as *mut libc::c_void,
                frame.len(),
                0)
        };
        match IoLenResult(len).errno() {
            Ok(()) => Ok(Some(len as usize)),
            Err(ref err) if err.0 == libc::EWOULDBLOCK => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn store_err(&mut self, err: Errno) -> Error {
        self.last_err = Some(err);
        Error::Illegal
    }
}

impl AsRawFd for RawLink {
    fn as_raw_fd(&self) -> RawFd {
        self.lower
    }
}

impl Drop for RawLink {
    fn drop(&mut self) {
        unsafe { libc::close(self.lower); }
    }
}

impl Transport for RawLink {
    fn post_receive(&mut self, pool: &mut Pool, id: BufId) -> Result<()> {
        pool.post_rx(id)?;
        self.fill.push_back(id);
        Ok(())
    }

    fn transmit(&mut self, pool: &mut Pool, id: BufId, len: usize) -> Result<()> {
        if len > pool.frame(id).len() {
            return Err(Error::Illegal);
        }
        pool.post_tx(id)?;

        match self.send(&pool.frame(id)[..len]) {
            Ok(()) => {
                self.pending.push_back(Event::TxDone { id });
                Ok(())
            }
            Err(err) => {
                // The frame never left; hand the buffer back to the core.
                pool.complete_tx(id)?;
                Err(self.store_err(err))
            }
        }
    }

    fn poll(&mut self, pool: &mut Pool) -> Result<Batch> {
        let mut batch = Batch::new();

        while batch.has_space() {
            let id = match self.fill.front() {
                Some(&id) => id,
                None => break,
            };
            match self.recv(pool.frame_mut(id)) {
                Ok(Some(len)) => {
                    self.fill.pop_front();
                    // Full batch was checked above, the push succeeds.
                    let _ = batch.push(Event::RxDone { id, len });
                }
                Ok(None) => break,
                Err(err) => return Err(self.store_err(err)),
            }
        }

        while batch.has_space() {
            match self.pending.pop_front() {
                Some(event) => {
                    let _ = batch.push(event);
                }
                None => break,
            }
        }

        Ok(batch)
    }
}
