//! Reactor core and event dispatch.
//!
//! One background thread per reactor performs all readiness polling:
//! it drains the pending-registration queue, blocks on the multiplexer,
//! fires due timers, and dispatches at most one readiness callback per
//! registration per iteration.
//!
//! Reactors are explicit objects. Create one per test or server scope
//! with [`Reactor::new`], or share the process-wide default from
//! [`global`], which is initialized on first use and runs until
//! explicitly closed.

mod core;
mod event;
mod timer;

pub(crate) mod command;

pub mod handler;
pub mod poller;

pub use self::core::{Reactor, ReactorHandle};
pub use handler::EventHandler;
pub use poller::Interest;

use std::sync::OnceLock;

static GLOBAL: OnceLock<Reactor> = OnceLock::new();

/// The process-wide default reactor.
///
/// Started lazily on first use with a thread named `rill-reactor`.
/// Closing it is allowed but global: endpoints created through the
/// convenience constructors stop resuming afterwards.
///
/// # Panics
///
/// Panics if the reactor thread cannot be spawned on first use.
pub fn global() -> &'static Reactor {
    GLOBAL.get_or_init(|| Reactor::new("rill-reactor").expect("failed to start default reactor"))
}
