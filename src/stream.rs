//! Port and stream contracts.
//!
//! A *port* is a one-directional byte-transfer capability: it moves at
//! least one byte between the stream and a caller-supplied buffer, or
//! suspends until it can. A return of `Ok(0)` means the stream has reached
//! a hard limit (end of stream) with zero bytes moved — it is not an error
//! and is never retried internally.
//!
//! A [`Stream`] is a closable pair of ports. Narrowed views are built by
//! composition: [`Limited`] caps the number of bytes a port will move,
//! [`Disabled`] refuses every transfer.

use std::io;
use std::net::SocketAddr;

/// A data port to receive bytes.
pub trait ReadPort {
    /// Reads up to `buf.len()` bytes, suspending until at least one byte
    /// arrives. Returns `Ok(0)` only if the stream is limited and no byte
    /// was moved.
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Suspends until the whole buffer has been filled.
    ///
    /// Returns `Ok(false)` if the stream ended before the buffer was full.
    async fn read_fully(&self, buf: &mut [u8]) -> io::Result<bool> {
        let mut offset = 0;
        while offset < buf.len() {
            let n = self.read(&mut buf[offset..]).await?;
            if n == 0 {
                return Ok(false);
            }
            offset += n;
        }
        Ok(true)
    }
}

/// A data port to send bytes.
pub trait WritePort {
    /// Writes up to `buf.len()` bytes, suspending until at least one byte
    /// was accepted. Returns `Ok(0)` only if the stream is limited and no
    /// byte was moved.
    async fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Suspends until the whole buffer has been written.
    ///
    /// Returns `Ok(false)` if the stream ended before the buffer was
    /// drained.
    async fn write_fully(&self, buf: &[u8]) -> io::Result<bool> {
        let mut offset = 0;
        while offset < buf.len() {
            let n = self.write(&buf[offset..]).await?;
            if n == 0 {
                return Ok(false);
            }
            offset += n;
        }
        Ok(true)
    }
}

/// A closable pair of read and write ports.
pub trait Stream: ReadPort + WritePort {
    /// Closes the stream and releases the underlying resource.
    ///
    /// Closing is idempotent; the resource is released exactly once.
    /// Operations suspended at the time of the close complete with an
    /// error instead of hanging.
    fn close(&self);
}

/// A stream with a resolved peer address.
///
/// Only exists once a connection (TCP) or a point-to-point association
/// (UDP) has been established.
pub trait RemoteStream: Stream {
    /// The remote endpoint address of this stream.
    fn remote_addr(&self) -> SocketAddr;
}

impl<P: ReadPort> ReadPort for &P {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf).await
    }
}

impl<P: WritePort> WritePort for &P {
    async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf).await
    }
}

impl<S: Stream> Stream for &S {
    fn close(&self) {
        (**self).close();
    }
}

impl<S: RemoteStream> RemoteStream for &S {
    fn remote_addr(&self) -> SocketAddr {
        (**self).remote_addr()
    }
}

/// Wraps a port so it reaches end of stream after `limit` bytes have been
/// moved through it, or sooner if the underlying port ends first.
pub fn with_limit<P>(port: P, limit: u64) -> Limited<P> {
    Limited::new(port, limit)
}

/// A length-limited view over a port.
///
/// The limit counts every byte moved through this wrapper, in either
/// direction if the wrapped value is both a read and a write port.
pub struct Limited<P> {
    inner: P,
    left: std::sync::atomic::AtomicU64,
}

impl<P> Limited<P> {
    pub fn new(inner: P, limit: u64) -> Self {
        Self {
            inner,
            left: std::sync::atomic::AtomicU64::new(limit),
        }
    }

    fn budget(&self, want: usize) -> usize {
        let left = self.left.load(std::sync::atomic::Ordering::Acquire);
        want.min(usize::try_from(left).unwrap_or(usize::MAX))
    }

    fn consume(&self, n: usize) {
        self.left
            .fetch_sub(n as u64, std::sync::atomic::Ordering::AcqRel);
    }
}

impl<P: ReadPort> ReadPort for Limited<P> {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.budget(buf.len());
        if n == 0 && !buf.is_empty() {
            return Ok(0);
        }
        let moved = self.inner.read(&mut buf[..n]).await?;
        self.consume(moved);
        Ok(moved)
    }
}

impl<P: WritePort> WritePort for Limited<P> {
    async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let n = self.budget(buf.len());
        if n == 0 && !buf.is_empty() {
            return Ok(0);
        }
        let moved = self.inner.write(&buf[..n]).await?;
        self.consume(moved);
        Ok(moved)
    }
}

/// Returns a port that fails every transfer with the given message.
pub fn disabled_port(message: &'static str) -> Disabled {
    Disabled { message }
}

/// A port that refuses every transfer.
pub struct Disabled {
    message: &'static str,
}

impl ReadPort for Disabled {
    async fn read(&self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::other(self.message))
    }
}

impl WritePort for Disabled {
    async fn write(&self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::other(self.message))
    }
}
