use super::handler::EventHandler;

use std::os::fd::RawFd;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::task::Waker;
use std::time::Instant;

/// An action enqueued for the reactor thread.
///
/// The command queue is the only multi-producer structure in the reactor;
/// it is drained exclusively by the reactor thread before every poll.
pub(crate) enum Command {
    /// Bind a descriptor and its handler into the reactor.
    Register {
        fd: RawFd,
        handler: Arc<dyn EventHandler>,
    },

    /// Re-apply a registration's current interest to the poller.
    Refresh { token: usize },

    /// Drop a registration. The descriptor itself is closed by its owner.
    Deregister { token: usize },

    /// Schedule a wake-up at `deadline` unless cancelled first.
    SetTimer {
        deadline: Instant,
        waker: Waker,
        cancelled: Arc<AtomicBool>,
    },

    /// Close the multiplexer and terminate the reactor loop.
    Shutdown,
}
