//! TLS adapter over any [`Stream`].
//!
//! [`TlsStream`] wraps a caller-supplied ciphertext stream and exposes
//! the same port contract in plaintext. The TLS engine (`rustls`) never
//! touches the transport: ciphertext moves through fixed-capacity
//! loopback buffers that are pumped explicitly — outgoing records drain
//! to the transport after every engine step that produced some, incoming
//! records arrive one suspending transport read at a time.
//!
//! Protocol policy is fixed at TLS 1.3 with the provider's static cipher
//! suite list; neither is negotiable by the caller.
//!
//! Closing the adapter closes only the TLS session (queueing a
//! best-effort close_notify); the transport's lifecycle stays with
//! whoever supplied it. Wrap a borrowed stream (`&stream`) to keep using
//! the transport afterwards.

mod pem;

pub use pem::{load_certificates, load_private_key};

use crate::stream::{ReadPort, Stream, WritePort};
use crate::sync;
use crate::time;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, ClientConnection, Connection, RootCertStore, ServerConfig,
    ServerConnection};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

/// Capacity of each ciphertext loopback buffer. A message larger than
/// this crosses the transport in multiple pump rounds.
const TRANSFER_BUFFER_SIZE: usize = 4096;

/// Back-off before the read path retries a handshake the write path is
/// currently driving.
const HANDSHAKE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Wraps `transport` as the server side of a TLS session.
///
/// `certs` is the certificate chain presented to clients, `key` the
/// matching private key.
pub fn wrap_server<S: Stream>(
    transport: S,
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> io::Result<TlsStream<S>> {
    let config = ServerConfig::builder_with_protocol_versions(&[&rustls::version::TLS13])
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(tls_error)?;

    let session = ServerConnection::new(Arc::new(config)).map_err(tls_error)?;

    Ok(TlsStream::new(transport, Connection::Server(session)))
}

/// Like [`wrap_server`], taking the chain and key as PEM-encoded bytes.
pub fn wrap_server_pem<S: Stream>(
    transport: S,
    certs_pem: &[u8],
    key_pem: &[u8],
) -> io::Result<TlsStream<S>> {
    wrap_server(transport, load_certificates(certs_pem)?, load_private_key(key_pem)?)
}

/// Wraps `transport` as the client side of a TLS session.
///
/// The peer must present a chain for `server_name` anchored in `roots`.
pub fn wrap_client<S: Stream>(
    transport: S,
    server_name: &str,
    roots: Vec<CertificateDer<'static>>,
) -> io::Result<TlsStream<S>> {
    let mut store = RootCertStore::empty();
    for root in roots {
        store.add(root).map_err(tls_error)?;
    }

    let config = ClientConfig::builder_with_protocol_versions(&[&rustls::version::TLS13])
        .with_root_certificates(store)
        .with_no_client_auth();

    let name = ServerName::try_from(server_name.to_owned())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "invalid server name"))?;

    let session = ClientConnection::new(Arc::new(config), name).map_err(tls_error)?;

    Ok(TlsStream::new(transport, Connection::Client(session)))
}

/// Like [`wrap_client`], taking the trusted roots as PEM-encoded bytes.
pub fn wrap_client_pem<S: Stream>(
    transport: S,
    server_name: &str,
    roots_pem: &[u8],
) -> io::Result<TlsStream<S>> {
    wrap_client(transport, server_name, load_certificates(roots_pem)?)
}

fn tls_error(err: rustls::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

/// What the engine needs next to make handshake progress.
enum HandshakeStatus {
    Done,
    NeedsInput,
    NeedsOutput,
}

/// A TLS session layered over a ciphertext stream.
///
/// Reads and writes take `&self` and may run concurrently; the plaintext
/// write path is guarded by a send-exclusion lock, the read path by a
/// receive-exclusion lock. The handshake runs exactly once, before any
/// application byte crosses the plaintext ports, driven by whichever of
/// the two paths is called first; there is no renegotiation.
pub struct TlsStream<S> {
    transport: S,
    session: StdMutex<Connection>,
    need_handshake: AtomicBool,
    send_lock: sync::Mutex<()>,
    recv_lock: sync::Mutex<()>,
    closed: AtomicBool,
}

impl<S: Stream> TlsStream<S> {
    fn new(transport: S, session: Connection) -> Self {
        Self {
            transport,
            session: StdMutex::new(session),
            need_handshake: AtomicBool::new(true),
            send_lock: sync::Mutex::new(()),
            recv_lock: sync::Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// The wrapped ciphertext stream.
    pub fn transport(&self) -> &S {
        &self.transport
    }

    /// Reads at least one plaintext byte.
    ///
    /// Returns `Ok(0)` after the peer's close_notify — the orderly TLS
    /// end of stream.
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut recv = self.recv_lock.lock().await;

        while self.need_handshake.load(Ordering::Acquire) {
            match self.send_lock.try_lock() {
                Some(_send) => {
                    self.drive_handshake().await?;
                }
                None => {
                    // A write call is mid-handshake and needs our lock to
                    // finish; give it up, back off, reacquire and recheck.
                    drop(recv);
                    time::sleep(HANDSHAKE_RETRY_DELAY).await;
                    recv = self.recv_lock.lock().await;
                }
            }
        }

        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(session_closed());
            }

            {
                let mut session = self.session.lock().unwrap();
                match session.reader().read(buf) {
                    Ok(n) => return Ok(n),
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
                    Err(err) => return Err(err),
                }
            }

            self.pump_incoming().await?;
        }
    }

    /// Writes the buffer as TLS application data, pumping the produced
    /// ciphertext to the transport before returning.
    pub async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let _send = self.send_lock.lock().await;

        if self.need_handshake.load(Ordering::Acquire) {
            let _recv = self.recv_lock.lock().await;
            if self.need_handshake.load(Ordering::Acquire) {
                self.drive_handshake().await?;
            }
        }

        if self.closed.load(Ordering::Acquire) {
            return Err(session_closed());
        }

        let n = {
            let mut session = self.session.lock().unwrap();
            session.writer().write(buf)?
        };

        self.flush_outgoing().await?;

        Ok(n)
    }

    /// Closes the TLS session, queueing a best-effort close_notify.
    ///
    /// The underlying transport is left open; its owner decides when to
    /// release it.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.session.lock().unwrap().send_close_notify();
    }

    /// Runs the handshake to completion. Caller holds both exclusion
    /// locks.
    async fn drive_handshake(&self) -> io::Result<()> {
        log::trace!("starting tls handshake");

        loop {
            let status = {
                let session = self.session.lock().unwrap();
                if !session.is_handshaking() {
                    HandshakeStatus::Done
                } else if session.wants_write() {
                    HandshakeStatus::NeedsOutput
                } else {
                    HandshakeStatus::NeedsInput
                }
            };

            let progress = match status {
                HandshakeStatus::Done => {
                    self.flush_outgoing().await?;
                    self.need_handshake.store(false, Ordering::Release);
                    log::trace!("finished tls handshake");
                    return Ok(());
                }
                HandshakeStatus::NeedsOutput => self.flush_outgoing().await,
                HandshakeStatus::NeedsInput => {
                    match self.flush_outgoing().await {
                        Ok(()) => self.pump_incoming().await,
                        err => err,
                    }
                }
            };

            if let Err(err) = progress {
                self.closed.store(true, Ordering::Release);
                return Err(err);
            }
        }
    }

    /// Drains pending ciphertext to the transport, one bounded loopback
    /// buffer per round.
    async fn flush_outgoing(&self) -> io::Result<()> {
        loop {
            let chunk = {
                let mut session = self.session.lock().unwrap();
                if !session.wants_write() {
                    break;
                }

                let mut sink = BoundedSink::new(TRANSFER_BUFFER_SIZE);
                session.write_tls(&mut sink)?;
                sink.buf
            };

            if chunk.is_empty() {
                break;
            }

            log::trace!("sending {} ciphertext bytes", chunk.len());
            if !self.transport.write_fully(&chunk).await? {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "transport ended during tls write",
                ));
            }
        }

        Ok(())
    }

    /// Moves one round of ciphertext from the transport into the engine.
    ///
    /// Suspends on the transport read; a transport that ends here ended
    /// mid-record, which TLS treats as truncation.
    async fn pump_incoming(&self) -> io::Result<()> {
        let mut buffer = [0u8; TRANSFER_BUFFER_SIZE];

        let n = self.transport.read(&mut buffer).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "transport ended during tls exchange",
            ));
        }

        log::trace!("received {n} ciphertext bytes");

        let mut session = self.session.lock().unwrap();
        let mut offset = 0;
        while offset < n {
            let consumed = session.read_tls(&mut &buffer[offset..n])?;
            if consumed == 0 {
                break;
            }
            offset += consumed;

            session.process_new_packets().map_err(tls_error)?;
        }

        Ok(())
    }
}

fn session_closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "tls session is closed")
}

impl<S: Stream> ReadPort for TlsStream<S> {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        TlsStream::read(self, buf).await
    }
}

impl<S: Stream> WritePort for TlsStream<S> {
    async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        TlsStream::write(self, buf).await
    }
}

impl<S: Stream> Stream for TlsStream<S> {
    fn close(&self) {
        TlsStream::close(self);
    }
}

/// An `io::Write` sink with a hard capacity, standing in for the bounded
/// loopback buffer the engine writes ciphertext into.
struct BoundedSink {
    buf: Vec<u8>,
    capacity: usize,
}

impl BoundedSink {
    fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }
}

impl Write for BoundedSink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let space = self.capacity - self.buf.len();
        let n = data.len().min(space);
        self.buf.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
