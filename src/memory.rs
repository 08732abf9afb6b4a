//! In-process connected stream pair.
//!
//! [`pair`] returns two [`Stream`] endpoints joined by a pair of bounded
//! packet channels, one per direction. Writers suspend when a channel is
//! full, readers when it is empty, so the pair behaves like a socket with
//! small kernel buffers — which makes it the natural transport for tests
//! and for layering protocol adapters without touching the network.
//!
//! Closing either endpoint closes both directions: buffered packets stay
//! readable, then reads observe end-of-stream while writes fail.

use crate::stream::{ReadPort, Stream, WritePort};
use crate::sync;

use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use std::io;
use std::sync::Mutex as StdMutex;

/// Largest packet a single write moves through the channel.
const MAX_PACKET_SIZE: usize = 8 * 1024;

/// Packets buffered per direction.
const CHANNEL_CAPACITY: usize = 8;

/// Creates a connected pair with the default channel capacity.
pub fn pair() -> (MemoryStream, MemoryStream) {
    pair_with_capacity(CHANNEL_CAPACITY)
}

/// Creates a connected pair buffering `capacity` packets per direction.
pub fn pair_with_capacity(capacity: usize) -> (MemoryStream, MemoryStream) {
    let (front_tx, front_rx) = mpsc::channel(capacity);
    let (back_tx, back_rx) = mpsc::channel(capacity);

    let front = MemoryStream::new(front_tx.clone(), back_rx, vec![front_tx.clone(), back_tx.clone()]);
    let back = MemoryStream::new(back_tx.clone(), front_rx, vec![front_tx, back_tx]);

    (front, back)
}

/// One endpoint of an in-process stream pair.
pub struct MemoryStream {
    outgoing: sync::Mutex<mpsc::Sender<Vec<u8>>>,
    incoming: sync::Mutex<Incoming>,
    closers: StdMutex<Vec<mpsc::Sender<Vec<u8>>>>,
}

struct Incoming {
    receiver: mpsc::Receiver<Vec<u8>>,
    packet: Vec<u8>,
    offset: usize,
}

impl MemoryStream {
    fn new(
        outgoing: mpsc::Sender<Vec<u8>>,
        receiver: mpsc::Receiver<Vec<u8>>,
        closers: Vec<mpsc::Sender<Vec<u8>>>,
    ) -> Self {
        Self {
            outgoing: sync::Mutex::new(outgoing),
            incoming: sync::Mutex::new(Incoming {
                receiver,
                packet: Vec::new(),
                offset: 0,
            }),
            closers: StdMutex::new(closers),
        }
    }

    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut incoming = self.incoming.lock().await;

        if incoming.offset >= incoming.packet.len() {
            match incoming.receiver.next().await {
                Some(packet) => {
                    incoming.packet = packet;
                    incoming.offset = 0;
                }
                None => return Ok(0),
            }
        }

        let n = buf.len().min(incoming.packet.len() - incoming.offset);
        buf[..n].copy_from_slice(&incoming.packet[incoming.offset..incoming.offset + n]);
        incoming.offset += n;

        Ok(n)
    }

    pub async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let n = buf.len().min(MAX_PACKET_SIZE);
        let packet = buf[..n].to_vec();

        let mut outgoing = self.outgoing.lock().await;
        outgoing
            .send(packet)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "memory stream is closed"))?;

        Ok(n)
    }

    /// Closes both directions of the pair. Idempotent.
    pub fn close(&self) {
        for closer in self.closers.lock().unwrap().iter_mut() {
            closer.close_channel();
        }
    }
}

impl ReadPort for MemoryStream {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        MemoryStream::read(self, buf).await
    }
}

impl WritePort for MemoryStream {
    async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        MemoryStream::write(self, buf).await
    }
}

impl Stream for MemoryStream {
    fn close(&self) {
        MemoryStream::close(self);
    }
}
