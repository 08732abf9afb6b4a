//! Asynchronous TCP and UDP endpoints.
//!
//! Everything here bridges non-blocking sockets to the suspension
//! contract of [`crate::stream`]: operations attempt the syscall, and on
//! zero progress register interest with a reactor and suspend until its
//! polling thread reports readiness.
//!
//! The convenience constructors ([`tcp::connect`], [`tcp::listen`],
//! [`udp::open`], [`udp::connect`]) use the process-wide default reactor;
//! the `_with` variants take an explicit [`ReactorHandle`].
//!
//! [`ReactorHandle`]: crate::reactor::ReactorHandle

pub mod tcp;
pub mod udp;

pub(crate) mod stream;

pub use stream::SocketStream;
pub use tcp::Listener;
pub use udp::UdpSocket;

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

pub(crate) fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    (host, port).to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "host name did not resolve to any address",
        )
    })
}
