//! The suspension endpoint: one connected socket, two directions.
//!
//! A [`SocketStream`] turns non-blocking syscalls plus reactor readiness
//! events into suspend/resume pairs. Per direction it keeps one readiness
//! flag and at most one waiting task; both are mutated only under the lock
//! shared with the reactor-side handler, which closes the race between a
//! failed syscall attempt and the readiness event arriving.
//!
//! The same machinery serves TCP connections and connected (point-to-point)
//! UDP sockets.

use crate::reactor::handler::EventHandler;
use crate::reactor::poller::Interest;
use crate::reactor::poller::unix::{
    sys_close, sys_read, sys_sockname, sys_take_socket_error, sys_write,
};
use crate::reactor::ReactorHandle;
use crate::stream::{ReadPort, RemoteStream, Stream, WritePort};

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

/// The direction an operation drives.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Dir {
    Read,
    Write,
}

/// Per-direction readiness state.
///
/// Invariant: at most one waiter. A second concurrent suspension on the
/// same direction is a contract violation, not a queued request.
#[derive(Default)]
struct Direction {
    ready: bool,
    waiter: Option<Waker>,
}

/// Endpoint state shared between the caller-facing stream and the
/// reactor-side handler.
pub(crate) struct Shared {
    fd: RawFd,
    token: Option<usize>,
    interest: Interest,
    closed: bool,
    connecting: bool,
    connect_result: Option<io::Result<()>>,
    connect_waiter: Option<Waker>,
    read: Direction,
    write: Direction,
}

impl Shared {
    pub(crate) fn open(fd: RawFd, interest: Interest) -> Self {
        Self {
            fd,
            token: None,
            interest,
            closed: false,
            connecting: false,
            connect_result: None,
            connect_waiter: None,
            read: Direction::default(),
            write: Direction::default(),
        }
    }

    pub(crate) fn connecting(fd: RawFd) -> Self {
        let mut shared = Self::open(
            fd,
            Interest {
                connect: true,
                ..Interest::NONE
            },
        );
        shared.connecting = true;
        shared
    }

    fn direction_mut(&mut self, dir: Dir) -> &mut Direction {
        match dir {
            Dir::Read => &mut self.read,
            Dir::Write => &mut self.write,
        }
    }
}

pub(crate) fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "endpoint is closed")
}

fn terminated_error() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "channel terminated")
}

fn busy_error(dir: Dir) -> io::Error {
    match dir {
        Dir::Read => io::Error::other("only a single suspended read is supported"),
        Dir::Write => io::Error::other("only a single suspended write is supported"),
    }
}

/// Closes the endpoint once: wakes both directions and any pending
/// connect, releases the descriptor, and reports the registration token
/// (if any) so the caller can deregister.
pub(crate) fn close_shared(shared: &Arc<Mutex<Shared>>) -> Option<usize> {
    let (fd, token, wakers) = {
        let mut shared = shared.lock().unwrap();
        if shared.closed {
            return None;
        }

        shared.closed = true;
        shared.connecting = false;
        shared.interest = Interest::NONE;

        (
            shared.fd,
            shared.token,
            [
                shared.read.waiter.take(),
                shared.write.waiter.take(),
                shared.connect_waiter.take(),
            ],
        )
    };

    for waker in wakers.into_iter().flatten() {
        waker.wake();
    }

    sys_close(fd);
    token
}

/// Returns the descriptor if the endpoint is still open.
pub(crate) fn check_open(shared: &Arc<Mutex<Shared>>) -> io::Result<RawFd> {
    let shared = shared.lock().unwrap();
    if shared.closed {
        Err(closed_error())
    } else {
        Ok(shared.fd)
    }
}

/// Arms the direction for a suspension and waits for readiness.
///
/// Under the shared lock the readiness flag is cleared and the interest
/// bit set; the reactor is then nudged to apply the new interest, and the
/// returned [`Readiness`] future re-checks the flag under the same lock
/// before storing the waiter, so an event arriving in between resumes
/// immediately instead of being lost.
pub(crate) async fn suspend(
    shared: &Arc<Mutex<Shared>>,
    reactor: &ReactorHandle,
    dir: Dir,
) -> io::Result<()> {
    let token = {
        let mut locked = shared.lock().unwrap();
        if locked.closed {
            return Err(closed_error());
        }

        locked.direction_mut(dir).ready = false;
        match dir {
            Dir::Read => locked.interest.read = true,
            Dir::Write => locked.interest.write = true,
        }

        locked.token
    };

    if let Some(token) = token {
        reactor.refresh(token);
    }

    Readiness {
        shared,
        dir,
        claimed: false,
    }
    .await
}

/// Future resolving once the armed direction reports readiness.
struct Readiness<'a> {
    shared: &'a Arc<Mutex<Shared>>,
    dir: Dir,
    claimed: bool,
}

impl Future for Readiness<'_> {
    type Output = io::Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut shared = this.shared.lock().unwrap();

        if shared.closed {
            if this.claimed {
                shared.direction_mut(this.dir).waiter = None;
                this.claimed = false;
            }
            return Poll::Ready(Err(closed_error()));
        }

        let direction = shared.direction_mut(this.dir);

        if direction.ready {
            log::trace!("{:?} resume fast", this.dir);
            if this.claimed {
                direction.waiter = None;
                this.claimed = false;
            }
            return Poll::Ready(Ok(()));
        }

        if this.claimed {
            // Re-polled while still suspended: refresh our stored waker.
            direction.waiter = Some(cx.waker().clone());
            return Poll::Pending;
        }

        if direction.waiter.is_some() {
            return Poll::Ready(Err(busy_error(this.dir)));
        }

        log::trace!("{:?} suspend", this.dir);
        direction.waiter = Some(cx.waker().clone());
        this.claimed = true;
        Poll::Pending
    }
}

impl Drop for Readiness<'_> {
    /// A cancelled suspension must release its waiter slot before any
    /// reactor-side resume can race it.
    fn drop(&mut self) {
        if self.claimed {
            let mut shared = self.shared.lock().unwrap();
            shared.direction_mut(self.dir).waiter = None;
        }
    }
}

/// Wraps a descriptor's shared state in a handler and registers it.
///
/// On failure the descriptor is closed before returning.
pub(crate) fn register_shared(
    reactor: &ReactorHandle,
    fd: RawFd,
    interest: Interest,
) -> io::Result<Arc<Mutex<Shared>>> {
    let shared = Arc::new(Mutex::new(Shared::open(fd, interest)));

    if let Err(err) = reactor.register(
        fd,
        Arc::new(SocketHandler {
            shared: shared.clone(),
        }),
    ) {
        sys_close(fd);
        return Err(err);
    }

    Ok(shared)
}

/// Reactor-side handler of a [`SocketStream`].
pub(crate) struct SocketHandler {
    shared: Arc<Mutex<Shared>>,
}

impl SocketHandler {
    fn resume(&self, dir: Dir) {
        let waker = {
            let mut shared = self.shared.lock().unwrap();

            if shared.direction_mut(dir).ready {
                return;
            }

            match dir {
                Dir::Read => shared.interest.read = false,
                Dir::Write => shared.interest.write = false,
            }

            let direction = shared.direction_mut(dir);
            direction.ready = true;
            direction.waiter.take()
        };

        log::trace!("{dir:?} ready");
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

impl EventHandler for SocketHandler {
    fn bind(&self, token: usize) {
        self.shared.lock().unwrap().token = Some(token);
    }

    fn interest(&self) -> Interest {
        self.shared.lock().unwrap().interest
    }

    fn connectable(&self) {
        let waker = {
            let mut shared = self.shared.lock().unwrap();
            if !shared.connecting {
                return;
            }

            shared.connecting = false;
            shared.interest.connect = false;
            shared.connect_result = Some(sys_take_socket_error(shared.fd));
            shared.connect_waiter.take()
        };

        if let Some(waker) = waker {
            waker.wake();
        }
    }

    fn readable(&self) {
        self.resume(Dir::Read);
    }

    fn writable(&self) {
        self.resume(Dir::Write);
    }

    fn close(&self) {
        close_shared(&self.shared);
    }
}

/// A connected byte stream over a non-blocking socket.
///
/// Reads and writes take `&self`: one task may read while another writes.
/// Within one direction, operations are strictly sequential — a second
/// read issued while one is suspended fails immediately and leaves the
/// first one undisturbed.
pub struct SocketStream {
    shared: Arc<Mutex<Shared>>,
    reactor: ReactorHandle,
    remote: SocketAddr,
}

impl SocketStream {
    /// Registers an already connected descriptor with the reactor.
    pub(crate) fn register(
        reactor: &ReactorHandle,
        fd: RawFd,
        remote: SocketAddr,
        interest: Interest,
    ) -> io::Result<SocketStream> {
        let shared = register_shared(reactor, fd, interest)?;

        Ok(SocketStream {
            shared,
            reactor: reactor.clone(),
            remote,
        })
    }

    /// Completes a non-blocking connect already in flight on `fd`.
    ///
    /// Registers with connect interest and suspends until the reactor
    /// reports the outcome; a failed connect closes the descriptor.
    pub(crate) async fn finish_connect(
        reactor: &ReactorHandle,
        fd: RawFd,
        remote: SocketAddr,
    ) -> io::Result<SocketStream> {
        let shared = Arc::new(Mutex::new(Shared::connecting(fd)));

        if let Err(err) = reactor.register(
            fd,
            Arc::new(SocketHandler {
                shared: shared.clone(),
            }),
        ) {
            sys_close(fd);
            return Err(err);
        }

        let stream = SocketStream {
            shared,
            reactor: reactor.clone(),
            remote,
        };

        match (Connected {
            shared: &stream.shared,
        })
        .await
        {
            Ok(()) => Ok(stream),
            Err(err) => {
                stream.close();
                Err(err)
            }
        }
    }

    /// Reads at least one byte, suspending while no data is available.
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            let fd = check_open(&self.shared)?;

            let n = sys_read(fd, buf);
            if n > 0 {
                log::trace!("read {n}");
                return Ok(n as usize);
            }
            if n == 0 {
                self.close();
                return Err(terminated_error());
            }

            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::WouldBlock => {
                    suspend(&self.shared, &self.reactor, Dir::Read).await?;
                }
                io::ErrorKind::Interrupted => continue,
                _ => {
                    self.close();
                    return Err(err);
                }
            }
        }
    }

    /// Writes at least one byte, suspending while the socket is full.
    pub async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            let fd = check_open(&self.shared)?;

            let n = sys_write(fd, buf);
            if n > 0 {
                log::trace!("written {n}");
                return Ok(n as usize);
            }

            if n == 0 {
                suspend(&self.shared, &self.reactor, Dir::Write).await?;
                continue;
            }

            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::WouldBlock => {
                    suspend(&self.shared, &self.reactor, Dir::Write).await?;
                }
                io::ErrorKind::Interrupted => continue,
                _ => {
                    self.close();
                    return Err(err);
                }
            }
        }
    }

    /// Closes the endpoint. Idempotent; suspended operations fail rather
    /// than hang, and the descriptor is released exactly once.
    pub fn close(&self) {
        if let Some(token) = close_shared(&self.shared) {
            self.reactor.deregister(token);
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        sys_sockname(check_open(&self.shared)?)
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }
}

impl Drop for SocketStream {
    fn drop(&mut self) {
        self.close();
    }
}

impl ReadPort for SocketStream {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        SocketStream::read(self, buf).await
    }
}

impl WritePort for SocketStream {
    async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        SocketStream::write(self, buf).await
    }
}

impl Stream for SocketStream {
    fn close(&self) {
        SocketStream::close(self);
    }
}

impl RemoteStream for SocketStream {
    fn remote_addr(&self) -> SocketAddr {
        self.remote
    }
}

/// Future resolving once an in-flight connect completes.
struct Connected<'a> {
    shared: &'a Arc<Mutex<Shared>>,
}

impl Future for Connected<'_> {
    type Output = io::Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut shared = self.shared.lock().unwrap();

        if let Some(result) = shared.connect_result.take() {
            return Poll::Ready(result);
        }

        if shared.closed {
            return Poll::Ready(Err(closed_error()));
        }

        shared.connect_waiter = Some(cx.waker().clone());
        Poll::Pending
    }
}
