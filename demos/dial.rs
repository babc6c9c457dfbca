//! A raw-frame dial client.
//!
//! Establishes one TCP connection over an AF_PACKET socket with hand-built
//! frames and pushes a single message, then exits. The kernel stack on the
//! interface is bypassed entirely; the given addresses are written into the
//! frames verbatim.
//!
//! Call example:
//!
//! * `dial enp1s0f1 00:0f:53:4b:e6:b1 192.168.13.21 1234 00:0f:53:59:a5:e0
//!   192.168.13.10 12345 --timeout-ms 5000`
use std::process;

use structopt::StructOpt;

use rawdial::dial;
use rawdial::frame::Session;
use rawdial::nic::sys::RawLink;
use rawdial::pool::Pool;
use rawdial::time::{Duration, Instant};
use rawdial::wire::{EthernetAddress, Ipv4Address, TcpSeqNumber};

#[derive(StructOpt)]
struct Config {
    /// Interface to bind the packet socket to.
    iface: String,
    local_mac: EthernetAddress,
    local_ip: Ipv4Address,
    local_port: u16,
    peer_mac: EthernetAddress,
    peer_ip: Ipv4Address,
    peer_port: u16,

    #[structopt(long = "message", default_value = "Hello World\n")]
    message: String,
    #[structopt(long = "isn", default_value = "1")]
    isn: u32,
    /// Give up after this many milliseconds; waits forever when absent.
    #[structopt(long = "timeout-ms")]
    timeout_ms: Option<u64>,
}

fn main() {
    let config = Config::from_args();

    let session = Session::new(
        config.local_mac, config.local_ip, config.local_port,
        config.peer_mac, config.peer_ip, config.peer_port,
    );
    let mut pool = Pool::with_default_rings();
    let mut link = match RawLink::new(&config.iface) {
        Ok(link) => link,
        Err(err) => {
            eprintln!("[-] couldn't open interface {}: {}", config.iface, err);
            process::exit(1);
        }
    };

    println!("[+] dialing {}:{} from {}:{} on {}",
             session.peer_ip, session.peer_port,
             session.local_ip, session.local_port,
             config.iface);

    let deadline = config.timeout_ms
        .map(|millis| Instant::now() + Duration::from_millis(millis))
        .into();

    let result = dial::run(
        &session, &mut pool, &mut link,
        TcpSeqNumber::from_u32(config.isn),
        config.message.as_bytes(),
        deadline,
        Instant::now,
    );

    match result {
        Ok(conn) => {
            println!("[+] established, peer seq {}, next local seq {}",
                     conn.peer_seq, conn.local_seq);
        }
        Err(err) => {
            eprintln!("[-] handshake failed: {}", err);
            if let Some(errno) = link.last_err() {
                eprintln!("[-] last os error: {}", errno);
            }
            process::exit(1);
        }
    }
}
