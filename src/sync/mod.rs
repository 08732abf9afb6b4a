//! Task synchronization primitives.
//!
//! These are the few pieces of shared-state plumbing the I/O layer needs:
//! an async mutex whose waiters suspend instead of blocking a thread, and
//! a bounded hand-off queue bridging the reactor thread to a suspending
//! consumer.

mod mutex;

pub(crate) mod handoff;

pub use mutex::{Mutex, MutexGuard};
