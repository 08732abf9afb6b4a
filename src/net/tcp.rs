//! TCP connect and listen.
//!
//! [`connect`] opens a non-blocking socket, registers connect interest
//! and suspends until the handshake finishes. [`listen`] binds a
//! listening socket whose reactor-side handler accepts pending
//! connections and delivers them, already registered for read and write
//! interest, through a bounded hand-off queue consumed by
//! [`Listener::accept`]. Closing the listener closes the queue and
//! releases the listening socket; the accepted-connection sequence is
//! lazy and cannot be restarted.

use super::stream::SocketStream;
use crate::reactor::handler::EventHandler;
use crate::reactor::poller::Interest;
use crate::reactor::poller::unix::{
    sys_accept, sys_bind, sys_close, sys_connect, sys_listen, sys_set_reuseaddr, sys_socket,
    sys_sockname,
};
use crate::reactor::{self, ReactorHandle};
use crate::sync::handoff::Handoff;

use libc::SOCK_STREAM;
use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::sync::{Arc, Mutex};

/// How many accepted connections may sit between the reactor thread and
/// the consumer. The reactor blocks on a full queue until the consumer
/// catches up or the listener is closed.
const ACCEPT_QUEUE_CAPACITY: usize = 16;

/// Opens a TCP connection to a remote host on the default reactor.
pub async fn connect(host: &str, port: u16) -> io::Result<SocketStream> {
    let addr = super::resolve(host, port)?;
    connect_with(&reactor::global().handle(), addr).await
}

/// Opens a TCP connection to `addr`, resumed by the given reactor.
pub async fn connect_with(reactor: &ReactorHandle, addr: SocketAddr) -> io::Result<SocketStream> {
    let fd = sys_socket(&addr, SOCK_STREAM)?;

    match sys_connect(fd, &addr) {
        Ok(()) => SocketStream::register(reactor, fd, addr, Interest::NONE),
        Err(err) if connect_in_progress(&err) => {
            SocketStream::finish_connect(reactor, fd, addr).await
        }
        Err(err) => {
            sys_close(fd);
            Err(err)
        }
    }
}

fn connect_in_progress(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EINPROGRESS) || err.kind() == io::ErrorKind::WouldBlock
}

/// Starts listening on `addr` using the default reactor.
pub fn listen(addr: SocketAddr) -> io::Result<Listener> {
    listen_with(&reactor::global().handle(), addr)
}

/// Starts listening on `addr`, accepting on the given reactor.
pub fn listen_with(reactor: &ReactorHandle, addr: SocketAddr) -> io::Result<Listener> {
    let fd = sys_socket(&addr, SOCK_STREAM)?;

    let prepared = sys_set_reuseaddr(fd)
        .and_then(|_| sys_bind(fd, &addr))
        .and_then(|_| sys_listen(fd))
        .and_then(|_| sys_sockname(fd));

    let local = match prepared {
        Ok(local) => local,
        Err(err) => {
            sys_close(fd);
            return Err(err);
        }
    };

    let state = Arc::new(ListenerState {
        shared: Mutex::new(ListenerShared {
            fd,
            token: None,
            closed: false,
        }),
        queue: Handoff::new(ACCEPT_QUEUE_CAPACITY),
        reactor: reactor.clone(),
    });

    if let Err(err) = reactor.register(fd, Arc::new(ListenerHandler { state: state.clone() })) {
        state.close();
        return Err(err);
    }

    Ok(Listener { state, local })
}

/// A listening TCP socket yielding accepted connections.
pub struct Listener {
    state: Arc<ListenerState>,
    local: SocketAddr,
}

impl Listener {
    /// Suspends until the next connection has been accepted.
    ///
    /// Fails once the listener is closed and the queue is drained.
    pub async fn accept(&self) -> io::Result<SocketStream> {
        match self.state.queue.recv().await {
            Some(stream) => Ok(stream),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "listener is closed",
            )),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Stops accepting and releases the listening socket.
    ///
    /// Idempotent. Connections already accepted but not yet consumed are
    /// dropped and thereby closed.
    pub fn close(&self) {
        self.state.close();
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.close();
    }
}

struct ListenerShared {
    fd: RawFd,
    token: Option<usize>,
    closed: bool,
}

struct ListenerState {
    shared: Mutex<ListenerShared>,
    queue: Handoff<SocketStream>,
    reactor: ReactorHandle,
}

impl ListenerState {
    fn close(&self) {
        self.queue.close();

        let token = {
            let mut shared = self.shared.lock().unwrap();
            if shared.closed {
                return;
            }
            shared.closed = true;
            sys_close(shared.fd);
            shared.token
        };

        if let Some(token) = token {
            self.reactor.deregister(token);
        }
    }
}

struct ListenerHandler {
    state: Arc<ListenerState>,
}

impl EventHandler for ListenerHandler {
    fn bind(&self, token: usize) {
        self.state.shared.lock().unwrap().token = Some(token);
    }

    fn interest(&self) -> Interest {
        if self.state.shared.lock().unwrap().closed || self.state.queue.is_closed() {
            Interest::NONE
        } else {
            Interest {
                accept: true,
                ..Interest::NONE
            }
        }
    }

    fn acceptable(&self) {
        let fd = {
            let shared = self.state.shared.lock().unwrap();
            if shared.closed {
                return;
            }
            shared.fd
        };

        match sys_accept(fd) {
            Ok((client_fd, remote)) => {
                let registered = SocketStream::register(
                    &self.state.reactor,
                    client_fd,
                    remote,
                    Interest {
                        read: true,
                        write: true,
                        ..Interest::NONE
                    },
                );

                match registered {
                    Ok(stream) => {
                        log::trace!("accepted connection from {remote}");
                        if self.state.queue.send(stream).is_err() {
                            // Consumer is gone; stop accepting.
                            self.state.close();
                        }
                    }
                    Err(err) => log::warn!("failed to register accepted connection: {err}"),
                }
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
            Err(err) => log::warn!("accept failed: {err}"),
        }
    }

    fn close(&self) {
        self.state.close();
    }
}
