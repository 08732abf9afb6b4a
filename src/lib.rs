//! # Rill
//!
//! **Rill** is a small asynchronous byte-stream I/O library built around a
//! suspension contract: every read or write attempts a non-blocking
//! operation and, on zero progress, suspends the calling task until a
//! dedicated reactor thread observes readiness and resumes it.
//!
//! Unlike a full runtime, Rill brings no executor of its own. Everything it
//! returns is a plain [`Future`](std::future::Future) that any executor can
//! drive; the only thread the library owns is the reactor's polling thread.
//!
//! The pieces, bottom up:
//!
//! - [`stream`] — the [`ReadPort`]/[`WritePort`]/[`Stream`] contracts and
//!   the derived full-drain, length-limited and disabled views
//! - [`reactor`] — one background thread owning an `epoll` instance and a
//!   registration queue; resumes suspended operations on readiness
//! - [`net`] — TCP and UDP endpoints bridging non-blocking sockets to the
//!   suspension contract
//! - [`tls`] — a TLS adapter that wraps any [`Stream`] as its ciphertext
//!   transport and exposes the same contract in plaintext
//! - [`memory`] — an in-process connected stream pair, useful for tests and
//!   for layering protocol adapters without a socket
//! - [`time`] — reactor-backed `sleep` and `timeout`
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use rill::stream::{ReadPort, WritePort};
//!
//! let stream = rill::net::tcp::connect("localhost", 8080).await?;
//! stream.write_fully(b"hello").await?;
//! let mut buf = [0u8; 5];
//! stream.read_fully(&mut buf).await?;
//! ```

mod utils;

pub mod memory;
pub mod net;
pub mod reactor;
pub mod stream;
pub mod sync;
pub mod time;
pub mod tls;

pub use stream::{ReadPort, RemoteStream, Stream, WritePort};
