//! UDP endpoints.
//!
//! [`open`] gives a multi-peer socket with addressed [`send`] and
//! [`receive`]; [`connect`] binds a fixed remote peer and exposes the
//! connectionless socket as an ordinary stream, reusing the
//! [`SocketStream`] suspension machinery directly.
//!
//! Datagrams are never fragmented by this layer: a send either queues the
//! whole buffer or fails.
//!
//! [`send`]: UdpSocket::send
//! [`receive`]: UdpSocket::receive

use super::stream::{self, Dir, Shared, SocketStream};
use crate::reactor::poller::Interest;
use crate::reactor::poller::unix::{
    sys_bind, sys_close, sys_connect, sys_recvfrom, sys_sendto, sys_socket, sys_sockname,
};
use crate::reactor::{self, ReactorHandle};
use crate::sync;

use libc::SOCK_DGRAM;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

/// Opens a multi-peer UDP socket on the default reactor.
///
/// Without a local port the socket stays unbound until the first send
/// assigns an ephemeral address.
pub fn open(local_port: Option<u16>) -> io::Result<UdpSocket> {
    open_with(&reactor::global().handle(), local_port.map(wildcard))
}

/// Opens a multi-peer UDP socket resumed by the given reactor.
pub fn open_with(reactor: &ReactorHandle, local: Option<SocketAddr>) -> io::Result<UdpSocket> {
    let template = local.unwrap_or_else(|| wildcard(0));
    let fd = sys_socket(&template, SOCK_DGRAM)?;

    if let Some(addr) = local {
        if let Err(err) = sys_bind(fd, &addr) {
            sys_close(fd);
            return Err(err);
        }
    }

    let shared = stream::register_shared(reactor, fd, Interest::NONE)?;

    Ok(UdpSocket {
        shared,
        reactor: reactor.clone(),
        send_lock: sync::Mutex::new(()),
    })
}

/// Connects two UDP endpoints point-to-point on the default reactor.
///
/// The peer can be a UDP server or a socket opened the same way with the
/// ports swapped.
pub fn connect(host: &str, port: u16, local_port: Option<u16>) -> io::Result<SocketStream> {
    let remote = super::resolve(host, port)?;
    connect_with(
        &reactor::global().handle(),
        remote,
        local_port.map(wildcard),
    )
}

/// Connects a fixed-peer UDP socket, resumed by the given reactor.
pub fn connect_with(
    reactor: &ReactorHandle,
    remote: SocketAddr,
    local: Option<SocketAddr>,
) -> io::Result<SocketStream> {
    let fd = sys_socket(&remote, SOCK_DGRAM)?;

    let prepared = match local {
        Some(addr) => sys_bind(fd, &addr),
        None => Ok(()),
    }
    .and_then(|_| sys_connect(fd, &remote));

    if let Err(err) = prepared {
        sys_close(fd);
        return Err(err);
    }

    SocketStream::register(
        reactor,
        fd,
        remote,
        Interest {
            read: true,
            write: true,
            ..Interest::NONE
        },
    )
}

fn wildcard(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
}

/// A UDP endpoint that can send to and receive from different remote
/// endpoints simultaneously.
pub struct UdpSocket {
    shared: Arc<Mutex<Shared>>,
    reactor: ReactorHandle,
    send_lock: sync::Mutex<()>,
}

impl UdpSocket {
    /// Receives one datagram, suspending while none is available.
    ///
    /// Returns the datagram length and the sender address. A datagram
    /// longer than `buf` is truncated by the kernel.
    pub async fn receive(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        if buf.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "buffer must have space remaining",
            ));
        }

        loop {
            let fd = stream::check_open(&self.shared)?;

            let (n, addr) = sys_recvfrom(fd, buf);
            if n >= 0 {
                let addr = addr?;
                log::trace!("received {n} bytes from {addr}");
                return Ok((n as usize, addr));
            }

            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::WouldBlock => {
                    stream::suspend(&self.shared, &self.reactor, Dir::Read).await?;
                }
                io::ErrorKind::Interrupted => continue,
                _ => {
                    self.close();
                    return Err(err);
                }
            }
        }
    }

    /// Sends one whole datagram to `dest`.
    ///
    /// Concurrent senders are serialized by an exclusion lock. The kernel
    /// reporting fewer bytes than requested is a contract violation and
    /// fails the call; it is never treated as partial progress.
    pub async fn send(&self, buf: &[u8], dest: SocketAddr) -> io::Result<()> {
        let _guard = self.send_lock.lock().await;

        loop {
            let fd = stream::check_open(&self.shared)?;

            let n = sys_sendto(fd, buf, &dest);
            if n >= 0 {
                let n = n as usize;
                if n != buf.len() {
                    return Err(io::Error::other(format!(
                        "short datagram send: {n} of {} bytes",
                        buf.len()
                    )));
                }
                log::trace!("sent {n} bytes to {dest}");
                return Ok(());
            }

            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::WouldBlock => {
                    stream::suspend(&self.shared, &self.reactor, Dir::Write).await?;
                }
                io::ErrorKind::Interrupted => continue,
                _ => return Err(err),
            }
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        sys_sockname(stream::check_open(&self.shared)?)
    }

    /// Closes the socket; idempotent, suspended receives fail promptly.
    pub fn close(&self) {
        if let Some(token) = stream::close_shared(&self.shared) {
            self.reactor.deregister(token);
        }
    }
}

impl Drop for UdpSocket {
    fn drop(&mut self) {
        self.close();
    }
}
